use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use crate::error::{Error, Result};

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Eof,
    Int(i32),
    Str(String),
    Ident(String),
    Kwd(Keyword),
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    Dollar,
    Assign,
    Eq,
    Ne,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Plus,
    Minus,
    Star,
    Slash,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    SliceFrom,
    SliceTo,
    InsertArrow,
}

#[derive(Debug, PartialEq, Clone)]
pub struct TokenSpan {
    pub token: Token,
    pub line: usize,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Keyword {
    Among,
    And,
    As,
    Atleast,
    Atlimit,
    Atmark,
    Attach,
    Backwardmode,
    Backwards,
    Booleans,
    Cursor,
    Decimal,
    Define,
    Delete,
    Do,
    Externals,
    Fail,
    False,
    For,
    From,
    Gopast,
    Goto,
    Groupings,
    Hex,
    Hop,
    Insert,
    Integers,
    Limit,
    Loop,
    Maxint,
    Minint,
    Next,
    Non,
    Not,
    Or,
    Repeat,
    Reverse,
    Routines,
    Set,
    Setlimit,
    Setmark,
    Size,
    Sizeof,
    Slice,
    Stringdef,
    Stringescapes,
    Strings,
    Substring,
    Test,
    To,
    Tolimit,
    Tomark,
    True,
    Try,
    Unset,
}

impl Display for Keyword {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let name = match self {
            Keyword::Among => "among",
            Keyword::And => "and",
            Keyword::As => "as",
            Keyword::Atleast => "atleast",
            Keyword::Atlimit => "atlimit",
            Keyword::Atmark => "atmark",
            Keyword::Attach => "attach",
            Keyword::Backwardmode => "backwardmode",
            Keyword::Backwards => "backwards",
            Keyword::Booleans => "booleans",
            Keyword::Cursor => "cursor",
            Keyword::Decimal => "decimal",
            Keyword::Define => "define",
            Keyword::Delete => "delete",
            Keyword::Do => "do",
            Keyword::Externals => "externals",
            Keyword::Fail => "fail",
            Keyword::False => "false",
            Keyword::For => "for",
            Keyword::From => "from",
            Keyword::Gopast => "gopast",
            Keyword::Goto => "goto",
            Keyword::Groupings => "groupings",
            Keyword::Hex => "hex",
            Keyword::Hop => "hop",
            Keyword::Insert => "insert",
            Keyword::Integers => "integers",
            Keyword::Limit => "limit",
            Keyword::Loop => "loop",
            Keyword::Maxint => "maxint",
            Keyword::Minint => "minint",
            Keyword::Next => "next",
            Keyword::Non => "non",
            Keyword::Not => "not",
            Keyword::Or => "or",
            Keyword::Repeat => "repeat",
            Keyword::Reverse => "reverse",
            Keyword::Routines => "routines",
            Keyword::Set => "set",
            Keyword::Setlimit => "setlimit",
            Keyword::Setmark => "setmark",
            Keyword::Size => "size",
            Keyword::Sizeof => "sizeof",
            Keyword::Slice => "slice",
            Keyword::Stringdef => "stringdef",
            Keyword::Stringescapes => "stringescapes",
            Keyword::Strings => "strings",
            Keyword::Substring => "substring",
            Keyword::Test => "test",
            Keyword::To => "to",
            Keyword::Tolimit => "tolimit",
            Keyword::Tomark => "tomark",
            Keyword::True => "true",
            Keyword::Try => "try",
            Keyword::Unset => "unset",
        };
        write!(f, "{}", name)
    }
}

fn keyword_lookup(name: String) -> Token {
    match name.as_str() {
        "among" => Token::Kwd(Keyword::Among),
        "and" => Token::Kwd(Keyword::And),
        "as" => Token::Kwd(Keyword::As),
        "atleast" => Token::Kwd(Keyword::Atleast),
        "atlimit" => Token::Kwd(Keyword::Atlimit),
        "atmark" => Token::Kwd(Keyword::Atmark),
        "attach" => Token::Kwd(Keyword::Attach),
        "backwardmode" => Token::Kwd(Keyword::Backwardmode),
        "backwards" => Token::Kwd(Keyword::Backwards),
        "booleans" => Token::Kwd(Keyword::Booleans),
        "cursor" => Token::Kwd(Keyword::Cursor),
        "decimal" => Token::Kwd(Keyword::Decimal),
        "define" => Token::Kwd(Keyword::Define),
        "delete" => Token::Kwd(Keyword::Delete),
        "do" => Token::Kwd(Keyword::Do),
        "externals" => Token::Kwd(Keyword::Externals),
        "fail" => Token::Kwd(Keyword::Fail),
        "false" => Token::Kwd(Keyword::False),
        "for" => Token::Kwd(Keyword::For),
        "from" => Token::Kwd(Keyword::From),
        "gopast" => Token::Kwd(Keyword::Gopast),
        "goto" => Token::Kwd(Keyword::Goto),
        "groupings" => Token::Kwd(Keyword::Groupings),
        "hex" => Token::Kwd(Keyword::Hex),
        "hop" => Token::Kwd(Keyword::Hop),
        "insert" => Token::Kwd(Keyword::Insert),
        "integers" => Token::Kwd(Keyword::Integers),
        "limit" => Token::Kwd(Keyword::Limit),
        "loop" => Token::Kwd(Keyword::Loop),
        "maxint" => Token::Kwd(Keyword::Maxint),
        "minint" => Token::Kwd(Keyword::Minint),
        "next" => Token::Kwd(Keyword::Next),
        "non" => Token::Kwd(Keyword::Non),
        "not" => Token::Kwd(Keyword::Not),
        "or" => Token::Kwd(Keyword::Or),
        "repeat" => Token::Kwd(Keyword::Repeat),
        "reverse" => Token::Kwd(Keyword::Reverse),
        "routines" => Token::Kwd(Keyword::Routines),
        "set" => Token::Kwd(Keyword::Set),
        "setlimit" => Token::Kwd(Keyword::Setlimit),
        "setmark" => Token::Kwd(Keyword::Setmark),
        "size" => Token::Kwd(Keyword::Size),
        "sizeof" => Token::Kwd(Keyword::Sizeof),
        "slice" => Token::Kwd(Keyword::Slice),
        "stringdef" => Token::Kwd(Keyword::Stringdef),
        "stringescapes" => Token::Kwd(Keyword::Stringescapes),
        "strings" => Token::Kwd(Keyword::Strings),
        "substring" => Token::Kwd(Keyword::Substring),
        "test" => Token::Kwd(Keyword::Test),
        "to" => Token::Kwd(Keyword::To),
        "tolimit" => Token::Kwd(Keyword::Tolimit),
        "tomark" => Token::Kwd(Keyword::Tomark),
        "true" => Token::Kwd(Keyword::True),
        "try" => Token::Kwd(Keyword::Try),
        "unset" => Token::Kwd(Keyword::Unset),
        _ => Token::Ident(name),
    }
}

/// Tokenize a Snowball source text.
///
/// String escapes are expanded here: `stringescapes` and `stringdef`
/// directives are consumed by the lexer and never reach the parser, and
/// every `Token::Str` carries the fully expanded character sequence.
pub fn tokenize(input: &str) -> Result<Vec<TokenSpan>> {
    let mut lexer = Lexer::new(input);
    lexer.run()?;
    Ok(lexer.tokens)
}

struct Lexer {
    chars: Vec<char>,
    index: usize,
    line: usize,
    line_start: usize,
    tokens: Vec<TokenSpan>,
    // left/right escape delimiters, active from the start of the input
    escapes: (char, char),
    defs: HashMap<String, String>,
    saw_stringescapes: bool,
}

impl Lexer {
    fn new(input: &str) -> Self {
        let mut defs = HashMap::new();
        defs.insert("'".to_string(), "'".to_string());
        defs.insert("{".to_string(), "{".to_string());
        Self {
            chars: input.chars().collect(),
            index: 0,
            line: 1,
            line_start: 0,
            tokens: vec![],
            escapes: ('{', '}'),
            defs,
            saw_stringescapes: false,
        }
    }

    fn cur(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index + 1).copied()
    }

    fn col(&self) -> usize {
        self.index - self.line_start + 1
    }

    fn newline(&mut self) {
        self.line += 1;
        self.line_start = self.index;
    }

    fn push(&mut self, token: Token, start: usize) {
        self.tokens.push(TokenSpan {
            token,
            line: self.line,
            // saturate for tokens that happen to span a line break
            start: start.saturating_sub(self.line_start) + 1,
            end: self.col(),
        });
    }

    fn run(&mut self) -> Result<()> {
        while let Some(c) = self.cur() {
            let start = self.index;
            match c {
                ' ' | '\t' => {
                    self.index += 1;
                }
                '\r' => {
                    self.index += 1;
                    if self.cur() == Some('\n') {
                        self.index += 1;
                    }
                    self.newline();
                }
                '\n' => {
                    self.index += 1;
                    self.newline();
                }
                '0'..='9' => {
                    while let Some('0'..='9') = self.cur() {
                        self.index += 1;
                    }
                    let text: String = self.chars[start..self.index].iter().collect();
                    let value = text.parse::<i32>().map_err(|_| {
                        Error::lex(
                            self.line,
                            start - self.line_start + 1,
                            format!("integer literal '{text}' out of range"),
                        )
                    })?;
                    self.push(Token::Int(value), start);
                }
                'a'..='z' | 'A'..='Z' => {
                    self.index += 1;
                    while let Some('a'..='z' | 'A'..='Z' | '0'..='9' | '_') = self.cur() {
                        self.index += 1;
                    }
                    let name: String = self.chars[start..self.index].iter().collect();
                    match keyword_lookup(name) {
                        Token::Kwd(Keyword::Stringescapes) => self.lex_stringescapes()?,
                        Token::Kwd(Keyword::Stringdef) => self.lex_stringdef()?,
                        token => self.push(token, start),
                    }
                }
                '\'' => {
                    let value = self.lex_string()?;
                    self.push(Token::Str(value), start);
                }
                '(' => {
                    self.index += 1;
                    self.push(Token::OpenParen, start);
                }
                ')' => {
                    self.index += 1;
                    self.push(Token::CloseParen, start);
                }
                '[' => {
                    self.index += 1;
                    self.push(Token::OpenBracket, start);
                }
                ']' => {
                    self.index += 1;
                    self.push(Token::CloseBracket, start);
                }
                '$' => {
                    self.index += 1;
                    self.push(Token::Dollar, start);
                }
                '+' => {
                    self.index += 1;
                    if self.cur() == Some('=') {
                        self.index += 1;
                        self.push(Token::PlusAssign, start);
                    } else {
                        self.push(Token::Plus, start);
                    }
                }
                '-' => {
                    self.index += 1;
                    match self.cur() {
                        Some('=') => {
                            self.index += 1;
                            self.push(Token::MinusAssign, start);
                        }
                        Some('>') => {
                            self.index += 1;
                            self.push(Token::SliceTo, start);
                        }
                        _ => self.push(Token::Minus, start),
                    }
                }
                '*' => {
                    self.index += 1;
                    if self.cur() == Some('=') {
                        self.index += 1;
                        self.push(Token::StarAssign, start);
                    } else {
                        self.push(Token::Star, start);
                    }
                }
                '/' => {
                    self.index += 1;
                    match self.cur() {
                        Some('/') => {
                            while let Some(c) = self.cur() {
                                if c == '\n' || c == '\r' {
                                    break;
                                }
                                self.index += 1;
                            }
                        }
                        Some('*') => {
                            self.index += 1;
                            self.lex_block_comment()?;
                        }
                        Some('=') => {
                            self.index += 1;
                            self.push(Token::SlashAssign, start);
                        }
                        _ => self.push(Token::Slash, start),
                    }
                }
                '=' => {
                    self.index += 1;
                    if self.cur() == Some('=') {
                        self.index += 1;
                        self.push(Token::Eq, start);
                    } else {
                        self.push(Token::Assign, start);
                    }
                }
                '!' => {
                    self.index += 1;
                    if self.cur() == Some('=') {
                        self.index += 1;
                        self.push(Token::Ne, start);
                    } else {
                        return Err(Error::lex(
                            self.line,
                            start - self.line_start + 1,
                            "unknown token '!'",
                        ));
                    }
                }
                '<' => {
                    self.index += 1;
                    match self.cur() {
                        Some('-') => {
                            self.index += 1;
                            self.push(Token::SliceFrom, start);
                        }
                        Some('+') => {
                            self.index += 1;
                            self.push(Token::InsertArrow, start);
                        }
                        Some('=') => {
                            self.index += 1;
                            self.push(Token::LessEq, start);
                        }
                        _ => self.push(Token::Less, start),
                    }
                }
                '>' => {
                    self.index += 1;
                    if self.cur() == Some('=') {
                        self.index += 1;
                        self.push(Token::GreaterEq, start);
                    } else {
                        self.push(Token::Greater, start);
                    }
                }
                unknown => {
                    return Err(Error::lex(
                        self.line,
                        self.col(),
                        format!("unknown token '{unknown}'"),
                    ));
                }
            }
        }
        let start = self.index;
        self.push(Token::Eof, start);
        Ok(())
    }

    fn lex_block_comment(&mut self) -> Result<()> {
        loop {
            match self.cur() {
                Some('\n') => {
                    self.index += 1;
                    self.newline();
                }
                Some('*') if self.peek() == Some('/') => {
                    self.index += 2;
                    return Ok(());
                }
                Some(_) => self.index += 1,
                None => {
                    return Err(Error::lex(self.line, self.col(), "unterminated comment"));
                }
            }
        }
    }

    fn skip_blanks(&mut self) {
        while let Some(' ' | '\t') = self.cur() {
            self.index += 1;
        }
    }

    /// Read a run of printable non-whitespace characters (stringdef names
    /// are not restricted to identifier characters).
    fn lex_word(&mut self) -> String {
        let start = self.index;
        while let Some(c) = self.cur() {
            if c.is_whitespace() {
                break;
            }
            self.index += 1;
        }
        self.chars[start..self.index].iter().collect()
    }

    fn lex_stringescapes(&mut self) -> Result<()> {
        self.skip_blanks();
        let line = self.line;
        let column = self.col();
        let mut delims = vec![];
        for _ in 0..2 {
            self.skip_blanks();
            match self.cur() {
                Some(c) if !c.is_whitespace() => {
                    delims.push(c);
                    self.index += 1;
                }
                _ => {
                    return Err(Error::lex(
                        line,
                        column,
                        "stringescapes needs two delimiter characters",
                    ));
                }
            }
        }
        self.escapes = (delims[0], delims[1]);
        self.defs.insert("'".to_string(), "'".to_string());
        self.defs.insert(delims[0].to_string(), delims[0].to_string());
        self.saw_stringescapes = true;
        Ok(())
    }

    fn lex_stringdef(&mut self) -> Result<()> {
        let line = self.line;
        let column = self.col();
        if !self.saw_stringescapes {
            return Err(Error::escape(
                line,
                column,
                "stringdef before any stringescapes directive",
            ));
        }
        self.skip_blanks();
        let name = self.lex_word();
        if name.is_empty() {
            return Err(Error::lex(self.line, self.col(), "stringdef needs a name"));
        }
        self.skip_blanks();
        let mode = match self.cur() {
            Some('\'') => None,
            _ => {
                let word = self.lex_word();
                match word.as_str() {
                    "hex" => Some(16),
                    "decimal" => Some(10),
                    other => {
                        return Err(Error::lex(
                            self.line,
                            self.col(),
                            format!("expected hex, decimal or a string literal, got '{other}'"),
                        ));
                    }
                }
            }
        };
        self.skip_blanks();
        if self.cur() != Some('\'') {
            return Err(Error::lex(
                self.line,
                self.col(),
                "stringdef needs a string literal value",
            ));
        }
        let raw = self.lex_string()?;
        let value = match mode {
            None => raw,
            Some(radix) => {
                let mut decoded = String::new();
                for word in raw.split_whitespace() {
                    let code = u32::from_str_radix(word, radix).ok().and_then(char::from_u32);
                    match code {
                        Some(c) => decoded.push(c),
                        None => {
                            return Err(Error::lex(
                                line,
                                column,
                                format!("invalid character code '{word}' in stringdef"),
                            ));
                        }
                    }
                }
                decoded
            }
        };
        self.defs.insert(name, value);
        Ok(())
    }

    /// Scan a single-quoted string literal, expanding escape references
    /// between the active delimiters. The opening quote is at the current
    /// position.
    fn lex_string(&mut self) -> Result<String> {
        let line = self.line;
        let column = self.col();
        self.index += 1; // opening quote
        let (left, right) = self.escapes;
        let mut value = String::new();
        loop {
            match self.cur() {
                None => {
                    return Err(Error::lex(line, column, "unterminated string literal"));
                }
                Some(c) if c == left => {
                    self.index += 1;
                    let ref_col = self.col();
                    let mut name = String::new();
                    loop {
                        match self.cur() {
                            None => {
                                return Err(Error::escape(
                                    self.line,
                                    ref_col,
                                    "unterminated string escape",
                                ));
                            }
                            Some(c) if c == right => {
                                self.index += 1;
                                break;
                            }
                            Some('\n') => {
                                return Err(Error::escape(
                                    self.line,
                                    ref_col,
                                    "unterminated string escape",
                                ));
                            }
                            Some(c) => {
                                name.push(c);
                                self.index += 1;
                            }
                        }
                    }
                    match self.defs.get(&name) {
                        Some(replacement) => value.push_str(replacement),
                        None => {
                            return Err(Error::escape(
                                self.line,
                                ref_col,
                                format!("undefined string escape '{name}'"),
                            ));
                        }
                    }
                }
                Some('\'') => {
                    self.index += 1;
                    return Ok(value);
                }
                Some('\n') => {
                    value.push('\n');
                    self.index += 1;
                    self.newline();
                }
                Some(c) => {
                    value.push(c);
                    self.index += 1;
                }
            }
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Token::Eof => write!(f, "end of file"),
            Token::Int(i) => write!(f, "{}", i),
            Token::Str(s) => write!(f, "'{}'", s),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Kwd(k) => write!(f, "{}", k),
            Token::OpenParen => write!(f, "("),
            Token::CloseParen => write!(f, ")"),
            Token::OpenBracket => write!(f, "["),
            Token::CloseBracket => write!(f, "]"),
            Token::Dollar => write!(f, "$"),
            Token::Assign => write!(f, "="),
            Token::Eq => write!(f, "=="),
            Token::Ne => write!(f, "!="),
            Token::Less => write!(f, "<"),
            Token::LessEq => write!(f, "<="),
            Token::Greater => write!(f, ">"),
            Token::GreaterEq => write!(f, ">="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::PlusAssign => write!(f, "+="),
            Token::MinusAssign => write!(f, "-="),
            Token::StarAssign => write!(f, "*="),
            Token::SlashAssign => write!(f, "/="),
            Token::SliceFrom => write!(f, "<-"),
            Token::SliceTo => write!(f, "->"),
            Token::InsertArrow => write!(f, "<+"),
        }
    }
}
