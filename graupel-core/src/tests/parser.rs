#[cfg(test)]
mod tests {
    use crate::parser::*;
    use crate::tokens::tokenize;
    use pretty_assertions::assert_eq;

    fn parse_source(input: &str) -> SourceUnit {
        parse(tokenize(input).unwrap()).unwrap()
    }

    fn body(input: &str) -> CmdSpan {
        parse_source(input).routine_defs.remove(0).body
    }

    #[test]
    fn literal_routine() {
        assert_eq!(
            parse_source("define check as 'foo'"),
            SourceUnit {
                strings: vec![],
                integers: vec![],
                booleans: vec![],
                routines: vec![],
                externals: vec![],
                groupings: vec![],
                grouping_defs: vec![],
                routine_defs: vec![RoutineDef {
                    name: NameSpan {
                        name: "check".to_string(),
                        line: 1,
                        col: 8
                    },
                    body: CmdSpan {
                        cmd: Cmd::Literal("foo".to_string()),
                        line: 1,
                        col: 17
                    },
                    backward_mode: false
                }],
            }
        );
    }

    #[test]
    fn declarations() {
        let unit = parse_source(
            "strings (s)\nintegers (p1 p2)\nbooleans (b)\nroutines (r)\nexternals (stem)\ngroupings (v)\ndefine r as next\ndefine stem as r",
        );
        let names = |section: &[NameSpan]| -> Vec<String> {
            section.iter().map(|n| n.name.clone()).collect()
        };
        assert_eq!(names(&unit.strings), vec!["s"]);
        assert_eq!(names(&unit.integers), vec!["p1", "p2"]);
        assert_eq!(names(&unit.booleans), vec!["b"]);
        assert_eq!(names(&unit.routines), vec!["r"]);
        assert_eq!(names(&unit.externals), vec!["stem"]);
        assert_eq!(names(&unit.groupings), vec!["v"]);
        assert_eq!(unit.routine_defs.len(), 2);
    }

    #[test]
    fn grouping_definition() {
        let unit = parse_source("groupings (v w)\ndefine v 'ab'\ndefine w v + 'd' - 'b'");
        assert_eq!(unit.grouping_defs.len(), 2);
        let def = &unit.grouping_defs[1];
        assert_eq!(def.name.name, "w");
        assert_eq!(def.items.len(), 3);
        assert!(matches!(
            &def.items[0],
            (GroupingOp::Union, GroupingItem::Ref(name)) if name.name == "v"
        ));
        assert!(matches!(
            &def.items[1],
            (GroupingOp::Union, GroupingItem::Chars(chars)) if chars == "d"
        ));
        assert!(matches!(
            &def.items[2],
            (GroupingOp::Difference, GroupingItem::Chars(chars)) if chars == "b"
        ));
    }

    #[test]
    fn backwardmode_flags_definitions() {
        let unit = parse_source("routines (r)\nbackwardmode ( define r as next )\ndefine s as next");
        assert!(unit.routine_defs[0].backward_mode);
        assert!(!unit.routine_defs[1].backward_mode);
    }

    // juxtaposition binds loosest, `or` looser than `and`, unary tightest
    #[test]
    fn command_precedence() {
        let cmd = body("define check as 'a' or 'b' 'c'");
        let Cmd::Sequence(items) = cmd.cmd else {
            panic!("expected a sequence, got {:?}", cmd.cmd);
        };
        assert_eq!(items.len(), 2);
        let Cmd::Or(branches) = &items[0].cmd else {
            panic!("expected or, got {:?}", items[0].cmd);
        };
        assert_eq!(branches[0].cmd, Cmd::Literal("a".to_string()));
        assert_eq!(branches[1].cmd, Cmd::Literal("b".to_string()));
        assert_eq!(items[1].cmd, Cmd::Literal("c".to_string()));
    }

    #[test]
    fn marks_group_inside_sequence() {
        // `['er' or 'en'] delete` keeps the alternation between the marks
        let cmd = body("define check as ['er' or 'en'] delete");
        let Cmd::Sequence(items) = cmd.cmd else {
            panic!("expected a sequence");
        };
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].cmd, Cmd::LeftMark);
        assert!(matches!(items[1].cmd, Cmd::Or(_)));
        assert_eq!(items[2].cmd, Cmd::RightMark);
        assert_eq!(items[3].cmd, Cmd::Delete);
    }

    #[test]
    fn unary_binds_tighter_than_or() {
        let cmd = body("define check as not 'x' or next");
        let Cmd::Or(branches) = cmd.cmd else {
            panic!("expected or");
        };
        assert!(matches!(branches[0].cmd, Cmd::Not(_)));
        assert_eq!(branches[1].cmd, Cmd::Next);
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let cmd = body("define check as 'a' or 'b' and 'c'");
        let Cmd::Or(branches) = cmd.cmd else {
            panic!("expected or");
        };
        assert!(matches!(branches[1].cmd, Cmd::And(_)));
    }

    #[test]
    fn unary_chain() {
        let cmd = body("define check as test repeat 'x'");
        let Cmd::Test(inner) = cmd.cmd else {
            panic!("expected test");
        };
        assert!(matches!(inner.cmd, Cmd::Repeat(_)));
    }

    #[test]
    fn loop_and_atleast_take_counts() {
        let cmd = body("define check as loop 2 'x'");
        let Cmd::Loop(count, inner) = cmd.cmd else {
            panic!("expected loop");
        };
        assert_eq!(count, Expr::Int(2));
        assert_eq!(inner.cmd, Cmd::Literal("x".to_string()));

        let cmd = body("define check as atleast 1 next");
        assert!(matches!(cmd.cmd, Cmd::AtLeast(Expr::Int(1), _)));
    }

    #[test]
    fn integer_commands() {
        let cmd = body("define check as ($i = cursor - 2)");
        let Cmd::IntCmd { name, op, expr } = cmd.cmd else {
            panic!("expected an integer command");
        };
        assert_eq!(name.name, "i");
        assert_eq!(op, IntOp::Assign);
        assert_eq!(
            expr,
            Expr::Sub(Box::new(Expr::Cursor), Box::new(Expr::Int(2)))
        );
    }

    #[test]
    fn expressions() {
        let cmd = body("define check as hop -1 + 2 * sizeof s");
        let Cmd::Hop(expr) = cmd.cmd else {
            panic!("expected hop");
        };
        let Expr::Add(lhs, rhs) = expr else {
            panic!("expected addition, got {expr:?}");
        };
        assert_eq!(*lhs, Expr::Neg(Box::new(Expr::Int(1))));
        assert!(matches!(*rhs, Expr::Mul(_, _)));
    }

    #[test]
    fn setlimit_takes_bound_and_body() {
        let cmd = body("define check as ( setlimit tomark 3 for ('x') next )");
        let Cmd::Sequence(items) = cmd.cmd else {
            panic!("expected a sequence");
        };
        let Cmd::SetLimit(bound, limited) = &items[0].cmd else {
            panic!("expected setlimit");
        };
        assert!(matches!(bound.cmd, Cmd::ToMark(Expr::Int(3))));
        assert_eq!(limited.cmd, Cmd::Literal("x".to_string()));
        assert_eq!(items[1].cmd, Cmd::Next);
    }

    #[test]
    fn non_grouping_with_optional_dash() {
        assert!(matches!(
            body("define check as non-v").cmd,
            Cmd::NonGrouping(name) if name.name == "v"
        ));
        assert!(matches!(
            body("define check as non v").cmd,
            Cmd::NonGrouping(name) if name.name == "v"
        ));
    }

    #[test]
    fn among_arms_share_trailing_action() {
        let cmd = body("define check as among( (next) 'a' 'b' (true) 'c' r1 )");
        let Cmd::Among(among) = cmd.cmd else {
            panic!("expected among");
        };
        assert!(matches!(among.common.as_ref().unwrap().cmd, Cmd::Next));
        assert_eq!(among.arms.len(), 2);
        assert_eq!(among.arms[0].patterns.len(), 2);
        assert_eq!(among.arms[0].patterns[0].text, "a");
        assert_eq!(among.arms[0].patterns[1].text, "b");
        assert_eq!(among.arms[0].action.as_ref().unwrap().cmd, Cmd::True);
        assert_eq!(among.arms[1].patterns[0].text, "c");
        assert_eq!(
            among.arms[1].patterns[0].routine.as_ref().unwrap().name,
            "r1"
        );
        assert!(among.arms[1].action.is_none());
    }

    #[test]
    fn substring_and_among_get_distinct_ids() {
        let cmd = body("define check as ([substring] among('x'))");
        let Cmd::Sequence(items) = cmd.cmd else {
            panic!("expected a sequence");
        };
        let Cmd::Substring(substring_id) = &items[1].cmd else {
            panic!("expected substring");
        };
        let Cmd::Among(among) = &items[3].cmd else {
            panic!("expected among");
        };
        assert_ne!(*substring_id, among.id);
    }

    #[test]
    fn empty_parens_are_a_command() {
        let cmd = body("define check as ( 'a' or () )");
        let Cmd::Or(branches) = cmd.cmd else {
            panic!("expected or");
        };
        assert_eq!(branches[1].cmd, Cmd::Empty);
    }

    #[test]
    fn reverse_is_backwards() {
        assert!(matches!(
            body("define check as reverse 'x'").cmd,
            Cmd::Backwards(_)
        ));
    }
}
