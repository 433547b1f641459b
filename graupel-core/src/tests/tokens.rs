#[cfg(test)]
mod tests {
    use crate::tokens::*;
    use pretty_assertions::assert_eq;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn empty_input() {
        assert_eq!(
            tokenize("").unwrap(),
            vec![TokenSpan {
                token: Token::Eof,
                line: 1,
                start: 1,
                end: 1
            }]
        );
    }

    #[test]
    fn spans() {
        assert_eq!(
            tokenize("hop 2").unwrap(),
            vec![
                TokenSpan {
                    token: Token::Kwd(Keyword::Hop),
                    line: 1,
                    start: 1,
                    end: 4
                },
                TokenSpan {
                    token: Token::Int(2),
                    line: 1,
                    start: 5,
                    end: 6
                },
                TokenSpan {
                    token: Token::Eof,
                    line: 1,
                    start: 6,
                    end: 6
                }
            ]
        );
        assert_eq!(
            tokenize("$p1 <= 2").unwrap(),
            vec![
                TokenSpan {
                    token: Token::Dollar,
                    line: 1,
                    start: 1,
                    end: 2
                },
                TokenSpan {
                    token: Token::Ident("p1".to_string()),
                    line: 1,
                    start: 2,
                    end: 4
                },
                TokenSpan {
                    token: Token::LessEq,
                    line: 1,
                    start: 5,
                    end: 7
                },
                TokenSpan {
                    token: Token::Int(2),
                    line: 1,
                    start: 8,
                    end: 9
                },
                TokenSpan {
                    token: Token::Eof,
                    line: 1,
                    start: 9,
                    end: 9
                }
            ]
        );
    }

    #[test]
    fn lines() {
        let tokens = tokenize("next\nnext\r\nnext").unwrap();
        let lines: Vec<usize> = tokens.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![1, 2, 3, 3]);
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("define stem as p1"),
            vec![
                Token::Kwd(Keyword::Define),
                Token::Ident("stem".to_string()),
                Token::Kwd(Keyword::As),
                Token::Ident("p1".to_string()),
                Token::Eof
            ]
        );
        // keywords are case sensitive; `Define` is an identifier
        assert_eq!(
            kinds("Define"),
            vec![Token::Ident("Define".to_string()), Token::Eof]
        );
    }

    #[test]
    fn operators() {
        assert_eq!(
            kinds("<- -> <+ <= < >= > == != = += -= *= /= + - * / [ ] ( ) $"),
            vec![
                Token::SliceFrom,
                Token::SliceTo,
                Token::InsertArrow,
                Token::LessEq,
                Token::Less,
                Token::GreaterEq,
                Token::Greater,
                Token::Eq,
                Token::Ne,
                Token::Assign,
                Token::PlusAssign,
                Token::MinusAssign,
                Token::StarAssign,
                Token::SlashAssign,
                Token::Plus,
                Token::Minus,
                Token::Star,
                Token::Slash,
                Token::OpenBracket,
                Token::CloseBracket,
                Token::OpenParen,
                Token::CloseParen,
                Token::Dollar,
                Token::Eof
            ]
        );
    }

    #[test]
    fn comments() {
        assert_eq!(
            kinds("next // trailing comment\nnext"),
            vec![Token::Kwd(Keyword::Next), Token::Kwd(Keyword::Next), Token::Eof]
        );
        let tokens = tokenize("next /* multi\nline */ next").unwrap();
        assert_eq!(tokens[1].token, Token::Kwd(Keyword::Next));
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn string_literals() {
        assert_eq!(
            kinds("'foo' ''"),
            vec![
                Token::Str("foo".to_string()),
                Token::Str("".to_string()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn quote_escape_is_predefined() {
        assert_eq!(
            kinds("'a{'}b'"),
            vec![Token::Str("a'b".to_string()), Token::Eof]
        );
    }

    #[test]
    fn stringdef_hex_expansion() {
        assert_eq!(
            kinds("stringescapes {}\nstringdef a\" hex 'E4'\n'x{a\"}y'"),
            vec![Token::Str("x\u{e4}y".to_string()), Token::Eof]
        );
    }

    #[test]
    fn stringdef_decimal_expansion() {
        assert_eq!(
            kinds("stringescapes {}\nstringdef uu decimal '228 228'\n'{uu}'"),
            vec![Token::Str("\u{e4}\u{e4}".to_string()), Token::Eof]
        );
    }

    #[test]
    fn stringescapes_changes_delimiters() {
        // after redefining the delimiters, braces are plain characters
        assert_eq!(
            kinds("stringescapes <>\n'{'"),
            vec![Token::Str("{".to_string()), Token::Eof]
        );
    }

    #[test]
    fn left_delimiter_escapes_itself() {
        assert_eq!(
            kinds("'{{}'"),
            vec![Token::Str("{".to_string()), Token::Eof]
        );
    }
}
