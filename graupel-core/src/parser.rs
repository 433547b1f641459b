use crate::error::{Error, Result};
use crate::tokens::{Keyword, Token, TokenSpan};

/// A declared or referenced name together with its source position.
#[derive(Debug, PartialEq, Clone)]
pub struct NameSpan {
    pub name: String,
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, PartialEq, Clone)]
pub struct SourceUnit {
    pub strings: Vec<NameSpan>,
    pub integers: Vec<NameSpan>,
    pub booleans: Vec<NameSpan>,
    pub routines: Vec<NameSpan>,
    pub externals: Vec<NameSpan>,
    pub groupings: Vec<NameSpan>,
    pub grouping_defs: Vec<GroupingDef>,
    pub routine_defs: Vec<RoutineDef>,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum GroupingOp {
    Union,
    Difference,
}

#[derive(Debug, PartialEq, Clone)]
pub enum GroupingItem {
    Chars(String),
    Ref(NameSpan),
}

/// `define g 'aeiou' + other - 'xy'`
#[derive(Debug, PartialEq, Clone)]
pub struct GroupingDef {
    pub name: NameSpan,
    pub items: Vec<(GroupingOp, GroupingItem)>,
}

/// `define name as <command>`, flagged when it appeared inside a
/// `backwardmode ( ... )` section.
#[derive(Debug, PartialEq, Clone)]
pub struct RoutineDef {
    pub name: NameSpan,
    pub body: CmdSpan,
    pub backward_mode: bool,
}

#[derive(Debug, PartialEq, Clone)]
pub struct CmdSpan {
    pub cmd: Cmd,
    pub line: usize,
    pub col: usize,
}

/// A string operand: either a literal or a string variable.
#[derive(Debug, PartialEq, Clone)]
pub enum StrArg {
    Literal(String),
    Ref(NameSpan),
}

#[derive(Debug, PartialEq, Clone)]
pub enum IntOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expr {
    Int(i32),
    IntRef(NameSpan),
    MaxInt,
    MinInt,
    Cursor,
    Limit,
    Size,
    SizeOf(NameSpan),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
}

#[derive(Debug, PartialEq, Clone)]
pub struct AmongPattern {
    pub text: String,
    pub routine: Option<NameSpan>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct AmongArm {
    pub patterns: Vec<AmongPattern>,
    pub action: Option<CmdSpan>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Among {
    /// Node id, shared counter with `Cmd::Substring` ids. The analyzer
    /// uses these to link a `substring` probe to its dispatching `among`.
    pub id: usize,
    pub common: Option<Box<CmdSpan>>,
    pub arms: Vec<AmongArm>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Cmd {
    /// Match a string literal at the cursor.
    Literal(String),
    /// A bare identifier in command position: routine call, grouping
    /// check, boolean test or string-variable match. The analyzer
    /// classifies it.
    NameRef(NameSpan),
    Sequence(Vec<CmdSpan>),
    Or(Vec<CmdSpan>),
    And(Vec<CmdSpan>),
    Not(Box<CmdSpan>),
    Test(Box<CmdSpan>),
    Try(Box<CmdSpan>),
    Do(Box<CmdSpan>),
    Fail(Box<CmdSpan>),
    Repeat(Box<CmdSpan>),
    Goto(Box<CmdSpan>),
    GoPast(Box<CmdSpan>),
    Backwards(Box<CmdSpan>),
    Loop(Expr, Box<CmdSpan>),
    AtLeast(Expr, Box<CmdSpan>),
    Next,
    Hop(Expr),
    ToLimit,
    AtLimit,
    SetMark(NameSpan),
    ToMark(Expr),
    AtMark(Expr),
    SetLimit(Box<CmdSpan>, Box<CmdSpan>),
    LeftMark,
    RightMark,
    SliceFrom(StrArg),
    SliceTo(NameSpan),
    Insert(StrArg),
    Attach(StrArg),
    Delete,
    NonGrouping(NameSpan),
    Set(NameSpan),
    Unset(NameSpan),
    IntCmd {
        name: NameSpan,
        op: IntOp,
        expr: Expr,
    },
    Substring(usize),
    Among(Among),
    True,
    False,
    Empty,
}

pub fn parse(tokens: Vec<TokenSpan>) -> Result<SourceUnit> {
    let mut state = State {
        tokens: &tokens,
        index: 0,
        next_id: 0,
    };
    let mut unit = SourceUnit {
        strings: vec![],
        integers: vec![],
        booleans: vec![],
        routines: vec![],
        externals: vec![],
        groupings: vec![],
        grouping_defs: vec![],
        routine_defs: vec![],
    };

    while state.peek() != &Token::Eof {
        parse_program_atom(&mut state, &mut unit, false)?;
    }
    Ok(unit)
}

struct State<'a> {
    tokens: &'a [TokenSpan],
    index: usize,
    next_id: usize,
}

impl<'a> State<'a> {
    fn at(&self) -> &'a TokenSpan {
        // tokenize always appends Eof, so the last span is a safe resting point
        self.tokens
            .get(self.index)
            .unwrap_or_else(|| &self.tokens[self.tokens.len() - 1])
    }

    fn peek(&self) -> &'a Token {
        &self.at().token
    }

    fn bump(&mut self) -> &'a TokenSpan {
        let span = self.at();
        self.index += 1;
        span
    }

    fn claim_id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    fn error(&self, expected: impl Into<String>) -> Error {
        let span = self.at();
        Error::parse(span.line, span.start, expected, &span.token)
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        if self.peek() == &token {
            self.index += 1;
            Ok(())
        } else {
            Err(self.error(token.to_string()))
        }
    }

    fn expect_kwd(&mut self, kwd: Keyword) -> Result<()> {
        self.expect(Token::Kwd(kwd))
    }

    fn expect_ident(&mut self, what: &str) -> Result<NameSpan> {
        match self.peek() {
            Token::Ident(name) => {
                let span = self.bump();
                Ok(NameSpan {
                    name: name.clone(),
                    line: span.line,
                    col: span.start,
                })
            }
            _ => Err(self.error(what)),
        }
    }
}

fn parse_program_atom(state: &mut State, unit: &mut SourceUnit, backward: bool) -> Result<()> {
    match state.peek() {
        Token::Kwd(Keyword::Strings) => {
            state.bump();
            parse_name_list(state, &mut unit.strings)
        }
        Token::Kwd(Keyword::Integers) => {
            state.bump();
            parse_name_list(state, &mut unit.integers)
        }
        Token::Kwd(Keyword::Booleans) => {
            state.bump();
            parse_name_list(state, &mut unit.booleans)
        }
        Token::Kwd(Keyword::Routines) => {
            state.bump();
            parse_name_list(state, &mut unit.routines)
        }
        Token::Kwd(Keyword::Externals) => {
            state.bump();
            parse_name_list(state, &mut unit.externals)
        }
        Token::Kwd(Keyword::Groupings) => {
            state.bump();
            parse_name_list(state, &mut unit.groupings)
        }
        Token::Kwd(Keyword::Backwardmode) => {
            if backward {
                return Err(state.error("a declaration (backwardmode does not nest)"));
            }
            state.bump();
            state.expect(Token::OpenParen)?;
            while state.peek() != &Token::CloseParen {
                if state.peek() == &Token::Eof {
                    return Err(state.error(")"));
                }
                parse_program_atom(state, unit, true)?;
            }
            state.expect(Token::CloseParen)
        }
        Token::Kwd(Keyword::Define) => {
            state.bump();
            let name = state.expect_ident("a routine or grouping name")?;
            if state.peek() == &Token::Kwd(Keyword::As) {
                state.bump();
                let body = parse_cmd(state)?;
                unit.routine_defs.push(RoutineDef {
                    name,
                    body,
                    backward_mode: backward,
                });
            } else {
                let items = parse_grouping_items(state)?;
                unit.grouping_defs.push(GroupingDef { name, items });
            }
            Ok(())
        }
        _ => Err(state.error("a declaration")),
    }
}

fn parse_name_list(state: &mut State, target: &mut Vec<NameSpan>) -> Result<()> {
    state.expect(Token::OpenParen)?;
    while state.peek() != &Token::CloseParen {
        let name = state.expect_ident("a name or ')'")?;
        target.push(name);
    }
    state.expect(Token::CloseParen)
}

fn parse_grouping_items(state: &mut State) -> Result<Vec<(GroupingOp, GroupingItem)>> {
    let mut items = vec![(GroupingOp::Union, parse_grouping_atom(state)?)];
    loop {
        let op = match state.peek() {
            Token::Plus => GroupingOp::Union,
            Token::Minus => GroupingOp::Difference,
            _ => break,
        };
        state.bump();
        items.push((op, parse_grouping_atom(state)?));
    }
    Ok(items)
}

fn parse_grouping_atom(state: &mut State) -> Result<GroupingItem> {
    match state.peek() {
        Token::Str(chars) => {
            state.bump();
            Ok(GroupingItem::Chars(chars.clone()))
        }
        Token::Ident(_) => Ok(GroupingItem::Ref(state.expect_ident("a grouping name")?)),
        _ => Err(state.error("a string literal or grouping name")),
    }
}

/// True when the token can open a command; used to delimit sequences.
fn starts_command(token: &Token) -> bool {
    match token {
        Token::Str(_)
        | Token::Ident(_)
        | Token::Dollar
        | Token::OpenParen
        | Token::OpenBracket
        | Token::CloseBracket
        | Token::SliceFrom
        | Token::SliceTo
        | Token::InsertArrow => true,
        Token::Kwd(kwd) => matches!(
            kwd,
            Keyword::Among
                | Keyword::Atleast
                | Keyword::Atlimit
                | Keyword::Atmark
                | Keyword::Attach
                | Keyword::Backwards
                | Keyword::Delete
                | Keyword::Do
                | Keyword::Fail
                | Keyword::False
                | Keyword::Gopast
                | Keyword::Goto
                | Keyword::Hop
                | Keyword::Insert
                | Keyword::Loop
                | Keyword::Next
                | Keyword::Non
                | Keyword::Not
                | Keyword::Repeat
                | Keyword::Reverse
                | Keyword::Set
                | Keyword::Setlimit
                | Keyword::Setmark
                | Keyword::Substring
                | Keyword::Test
                | Keyword::Tolimit
                | Keyword::Tomark
                | Keyword::True
                | Keyword::Try
                | Keyword::Unset
        ),
        _ => false,
    }
}

// Juxtaposition binds loosest, then `or`, then `and`, then the unary
// prefix commands. This is what idioms like `['er' or 'en'] R1 delete`
// rely on: the alternation groups inside the sequence.
fn parse_cmd(state: &mut State) -> Result<CmdSpan> {
    parse_seq(state)
}

fn parse_seq(state: &mut State) -> Result<CmdSpan> {
    let first = parse_or(state)?;
    if !starts_command(state.peek()) {
        return Ok(first);
    }
    let (line, col) = (first.line, first.col);
    let mut items = vec![first];
    while starts_command(state.peek()) {
        items.push(parse_or(state)?);
    }
    Ok(CmdSpan {
        cmd: Cmd::Sequence(items),
        line,
        col,
    })
}

fn parse_or(state: &mut State) -> Result<CmdSpan> {
    let first = parse_and(state)?;
    if state.peek() != &Token::Kwd(Keyword::Or) {
        return Ok(first);
    }
    let (line, col) = (first.line, first.col);
    let mut branches = vec![first];
    while state.peek() == &Token::Kwd(Keyword::Or) {
        state.bump();
        branches.push(parse_and(state)?);
    }
    Ok(CmdSpan {
        cmd: Cmd::Or(branches),
        line,
        col,
    })
}

fn parse_and(state: &mut State) -> Result<CmdSpan> {
    let first = parse_unary(state)?;
    if state.peek() != &Token::Kwd(Keyword::And) {
        return Ok(first);
    }
    let (line, col) = (first.line, first.col);
    let mut parts = vec![first];
    while state.peek() == &Token::Kwd(Keyword::And) {
        state.bump();
        parts.push(parse_unary(state)?);
    }
    Ok(CmdSpan {
        cmd: Cmd::And(parts),
        line,
        col,
    })
}

fn parse_unary(state: &mut State) -> Result<CmdSpan> {
    let span = state.at();
    let (line, col) = (span.line, span.start);
    macro_rules! unary {
        ($variant: ident) => {{
            state.bump();
            let operand = parse_unary(state)?;
            Ok(CmdSpan {
                cmd: Cmd::$variant(Box::new(operand)),
                line,
                col,
            })
        }};
    }
    match state.peek() {
        Token::Kwd(Keyword::Not) => unary!(Not),
        Token::Kwd(Keyword::Test) => unary!(Test),
        Token::Kwd(Keyword::Try) => unary!(Try),
        Token::Kwd(Keyword::Do) => unary!(Do),
        Token::Kwd(Keyword::Fail) => unary!(Fail),
        Token::Kwd(Keyword::Repeat) => unary!(Repeat),
        Token::Kwd(Keyword::Goto) => unary!(Goto),
        Token::Kwd(Keyword::Gopast) => unary!(GoPast),
        // `reverse` is accepted as a synonym of `backwards`
        Token::Kwd(Keyword::Backwards) | Token::Kwd(Keyword::Reverse) => unary!(Backwards),
        Token::Kwd(Keyword::Loop) => {
            state.bump();
            let count = parse_expr(state)?;
            let operand = parse_unary(state)?;
            Ok(CmdSpan {
                cmd: Cmd::Loop(count, Box::new(operand)),
                line,
                col,
            })
        }
        Token::Kwd(Keyword::Atleast) => {
            state.bump();
            let count = parse_expr(state)?;
            let operand = parse_unary(state)?;
            Ok(CmdSpan {
                cmd: Cmd::AtLeast(count, Box::new(operand)),
                line,
                col,
            })
        }
        _ => parse_atom(state),
    }
}

fn parse_atom(state: &mut State) -> Result<CmdSpan> {
    let span = state.at();
    let (line, col) = (span.line, span.start);
    let with = |cmd| CmdSpan { cmd, line, col };
    match state.peek() {
        Token::Str(s) => {
            let text = s.clone();
            state.bump();
            Ok(with(Cmd::Literal(text)))
        }
        Token::Ident(_) => {
            let name = state.expect_ident("a name")?;
            Ok(with(Cmd::NameRef(name)))
        }
        Token::OpenParen => parse_paren_cmd(state),
        Token::OpenBracket => {
            state.bump();
            Ok(with(Cmd::LeftMark))
        }
        Token::CloseBracket => {
            state.bump();
            Ok(with(Cmd::RightMark))
        }
        Token::Dollar => {
            state.bump();
            let name = state.expect_ident("an integer name")?;
            let op = match state.peek() {
                Token::Assign => IntOp::Assign,
                Token::PlusAssign => IntOp::AddAssign,
                Token::MinusAssign => IntOp::SubAssign,
                Token::StarAssign => IntOp::MulAssign,
                Token::SlashAssign => IntOp::DivAssign,
                Token::Eq => IntOp::Eq,
                Token::Ne => IntOp::Ne,
                Token::Less => IntOp::Lt,
                Token::Greater => IntOp::Gt,
                Token::LessEq => IntOp::Le,
                Token::GreaterEq => IntOp::Ge,
                _ => return Err(state.error("an integer operator")),
            };
            state.bump();
            let expr = parse_expr(state)?;
            Ok(with(Cmd::IntCmd { name, op, expr }))
        }
        Token::SliceFrom => {
            state.bump();
            Ok(with(Cmd::SliceFrom(parse_str_arg(state)?)))
        }
        Token::SliceTo => {
            state.bump();
            let name = state.expect_ident("a string name")?;
            Ok(with(Cmd::SliceTo(name)))
        }
        Token::InsertArrow => {
            state.bump();
            Ok(with(Cmd::Insert(parse_str_arg(state)?)))
        }
        Token::Kwd(Keyword::Insert) => {
            state.bump();
            Ok(with(Cmd::Insert(parse_str_arg(state)?)))
        }
        Token::Kwd(Keyword::Attach) => {
            state.bump();
            Ok(with(Cmd::Attach(parse_str_arg(state)?)))
        }
        Token::Kwd(Keyword::Delete) => {
            state.bump();
            Ok(with(Cmd::Delete))
        }
        Token::Kwd(Keyword::Next) => {
            state.bump();
            Ok(with(Cmd::Next))
        }
        Token::Kwd(Keyword::Hop) => {
            state.bump();
            Ok(with(Cmd::Hop(parse_expr(state)?)))
        }
        Token::Kwd(Keyword::Tolimit) => {
            state.bump();
            Ok(with(Cmd::ToLimit))
        }
        Token::Kwd(Keyword::Atlimit) => {
            state.bump();
            Ok(with(Cmd::AtLimit))
        }
        Token::Kwd(Keyword::Setmark) => {
            state.bump();
            let name = state.expect_ident("an integer name")?;
            Ok(with(Cmd::SetMark(name)))
        }
        Token::Kwd(Keyword::Tomark) => {
            state.bump();
            Ok(with(Cmd::ToMark(parse_expr(state)?)))
        }
        Token::Kwd(Keyword::Atmark) => {
            state.bump();
            Ok(with(Cmd::AtMark(parse_expr(state)?)))
        }
        Token::Kwd(Keyword::Setlimit) => {
            state.bump();
            let bound = parse_cmd(state)?;
            state.expect_kwd(Keyword::For)?;
            let body = parse_unary(state)?;
            Ok(with(Cmd::SetLimit(Box::new(bound), Box::new(body))))
        }
        Token::Kwd(Keyword::Set) => {
            state.bump();
            let name = state.expect_ident("a boolean name")?;
            Ok(with(Cmd::Set(name)))
        }
        Token::Kwd(Keyword::Unset) => {
            state.bump();
            let name = state.expect_ident("a boolean name")?;
            Ok(with(Cmd::Unset(name)))
        }
        Token::Kwd(Keyword::Non) => {
            state.bump();
            if state.peek() == &Token::Minus {
                state.bump();
            }
            let name = state.expect_ident("a grouping name")?;
            Ok(with(Cmd::NonGrouping(name)))
        }
        Token::Kwd(Keyword::Substring) => {
            state.bump();
            let id = state.claim_id();
            Ok(with(Cmd::Substring(id)))
        }
        Token::Kwd(Keyword::Among) => {
            state.bump();
            let among = parse_among(state)?;
            Ok(with(Cmd::Among(among)))
        }
        Token::Kwd(Keyword::True) => {
            state.bump();
            Ok(with(Cmd::True))
        }
        Token::Kwd(Keyword::False) => {
            state.bump();
            Ok(with(Cmd::False))
        }
        _ => Err(state.error("a command")),
    }
}

fn parse_paren_cmd(state: &mut State) -> Result<CmdSpan> {
    let span = state.at();
    let (line, col) = (span.line, span.start);
    state.expect(Token::OpenParen)?;
    if state.peek() == &Token::CloseParen {
        state.bump();
        return Ok(CmdSpan {
            cmd: Cmd::Empty,
            line,
            col,
        });
    }
    let cmd = parse_cmd(state)?;
    state.expect(Token::CloseParen)?;
    Ok(cmd)
}

fn parse_str_arg(state: &mut State) -> Result<StrArg> {
    match state.peek() {
        Token::Str(s) => {
            let text = s.clone();
            state.bump();
            Ok(StrArg::Literal(text))
        }
        Token::Ident(_) => Ok(StrArg::Ref(state.expect_ident("a string name")?)),
        _ => Err(state.error("a string literal or string name")),
    }
}

fn parse_among(state: &mut State) -> Result<Among> {
    state.expect(Token::OpenParen)?;
    let common = if state.peek() == &Token::OpenParen {
        Some(Box::new(parse_paren_cmd(state)?))
    } else {
        None
    };
    let mut arms = vec![];
    loop {
        match state.peek() {
            Token::CloseParen => {
                state.bump();
                break;
            }
            Token::Str(_) => {
                let mut patterns = vec![];
                while let Token::Str(text) = state.peek() {
                    let text = text.clone();
                    state.bump();
                    let routine = match state.peek() {
                        Token::Ident(_) => Some(state.expect_ident("a routine name")?),
                        _ => None,
                    };
                    patterns.push(AmongPattern { text, routine });
                }
                let action = if state.peek() == &Token::OpenParen {
                    Some(parse_paren_cmd(state)?)
                } else {
                    None
                };
                arms.push(AmongArm { patterns, action });
            }
            _ => return Err(state.error("a string pattern or ')'")),
        }
    }
    if arms.is_empty() {
        return Err(state.error("at least one among arm"));
    }
    Ok(Among {
        id: state.claim_id(),
        common,
        arms,
    })
}

fn parse_expr(state: &mut State) -> Result<Expr> {
    parse_additive(state)
}

fn parse_additive(state: &mut State) -> Result<Expr> {
    let mut lhs = parse_multiplicative(state)?;
    loop {
        match state.peek() {
            Token::Plus => {
                state.bump();
                lhs = Expr::Add(Box::new(lhs), Box::new(parse_multiplicative(state)?));
            }
            Token::Minus => {
                state.bump();
                lhs = Expr::Sub(Box::new(lhs), Box::new(parse_multiplicative(state)?));
            }
            _ => return Ok(lhs),
        }
    }
}

fn parse_multiplicative(state: &mut State) -> Result<Expr> {
    let mut lhs = parse_unary_expr(state)?;
    loop {
        match state.peek() {
            Token::Star => {
                state.bump();
                lhs = Expr::Mul(Box::new(lhs), Box::new(parse_unary_expr(state)?));
            }
            Token::Slash => {
                state.bump();
                lhs = Expr::Div(Box::new(lhs), Box::new(parse_unary_expr(state)?));
            }
            _ => return Ok(lhs),
        }
    }
}

fn parse_unary_expr(state: &mut State) -> Result<Expr> {
    if state.peek() == &Token::Minus {
        state.bump();
        return Ok(Expr::Neg(Box::new(parse_unary_expr(state)?)));
    }
    parse_expr_atom(state)
}

fn parse_expr_atom(state: &mut State) -> Result<Expr> {
    match state.peek() {
        Token::Int(value) => {
            let value = *value;
            state.bump();
            Ok(Expr::Int(value))
        }
        Token::Ident(_) => Ok(Expr::IntRef(state.expect_ident("an integer name")?)),
        Token::Kwd(Keyword::Maxint) => {
            state.bump();
            Ok(Expr::MaxInt)
        }
        Token::Kwd(Keyword::Minint) => {
            state.bump();
            Ok(Expr::MinInt)
        }
        Token::Kwd(Keyword::Cursor) => {
            state.bump();
            Ok(Expr::Cursor)
        }
        Token::Kwd(Keyword::Limit) => {
            state.bump();
            Ok(Expr::Limit)
        }
        Token::Kwd(Keyword::Size) => {
            state.bump();
            Ok(Expr::Size)
        }
        Token::Kwd(Keyword::Sizeof) => {
            state.bump();
            let name = state.expect_ident("a string name")?;
            Ok(Expr::SizeOf(name))
        }
        Token::OpenParen => {
            state.bump();
            let expr = parse_expr(state)?;
            state.expect(Token::CloseParen)?;
            Ok(expr)
        }
        _ => Err(state.error("an integer expression")),
    }
}
