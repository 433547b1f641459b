#[cfg(test)]
mod tests {
    use crate::analyzer::*;
    use crate::parser::{parse, Among, AmongArm, AmongPattern};
    use crate::tokens::tokenize;
    use pretty_assertions::assert_eq;

    fn analyze_source(input: &str) -> Analysis {
        analyze(&parse(tokenize(input).unwrap()).unwrap()).unwrap()
    }

    fn make_among(arms: Vec<Vec<&str>>) -> Among {
        Among {
            id: 1,
            common: None,
            arms: arms
                .into_iter()
                .map(|patterns| AmongArm {
                    patterns: patterns
                        .into_iter()
                        .map(|text| AmongPattern {
                            text: text.to_string(),
                            routine: None,
                        })
                        .collect(),
                    action: None,
                })
                .collect(),
        }
    }

    fn probe_order(compiled: &CompiledAmong) -> Vec<(&str, usize)> {
        compiled
            .entries
            .iter()
            .map(|e| (e.text.as_str(), e.arm))
            .collect()
    }

    #[test]
    fn symbol_kinds() {
        let analysis = analyze_source(
            "strings (s)\nintegers (i)\nbooleans (b)\nexternals (stem)\ngroupings (v)\ndefine v 'a'\ndefine stem as next",
        );
        assert_eq!(analysis.kinds.get("s"), Some(&Kind::String));
        assert_eq!(analysis.kinds.get("i"), Some(&Kind::Integer));
        assert_eq!(analysis.kinds.get("b"), Some(&Kind::Boolean));
        assert_eq!(analysis.kinds.get("stem"), Some(&Kind::Routine));
        assert_eq!(analysis.kinds.get("v"), Some(&Kind::Grouping));
        assert_eq!(analysis.externals, vec!["stem"]);
    }

    #[test]
    fn grouping_materialization() {
        let analysis = analyze_source(
            "externals (stem)\ngroupings (x y z)\ndefine x 'ab'\ndefine y x + 'd' - 'b'\ndefine z y - x\ndefine stem as next",
        );
        let sets: Vec<(String, String)> = analysis
            .groupings
            .iter()
            .map(|(name, set)| (name.clone(), set.iter().collect()))
            .collect();
        assert_eq!(
            sets,
            vec![
                ("x".to_string(), "ab".to_string()),
                ("y".to_string(), "ad".to_string()),
                ("z".to_string(), "d".to_string()),
            ]
        );
    }

    #[test]
    fn longest_match_wins() {
        let compiled = make_among(vec![vec!["f"], vec!["foo"], vec!["fo"]]);
        let compiled = compile_among(&compiled, Mode::Forward);
        assert_eq!(probe_order(&compiled), vec![("foo", 1), ("fo", 2), ("f", 0)]);
    }

    #[test]
    fn equal_length_keys_keep_declaration_order() {
        let compiled = compile_among(&make_among(vec![vec!["ab"], vec!["cd"], vec!["e"]]), Mode::Forward);
        assert_eq!(
            probe_order(&compiled),
            vec![("ab", 0), ("cd", 1), ("e", 2)]
        );
    }

    #[test]
    fn duplicate_pattern_resolves_to_first_arm() {
        let compiled = compile_among(&make_among(vec![vec!["x"], vec!["x"]]), Mode::Forward);
        assert_eq!(probe_order(&compiled), vec![("x", 0)]);
    }

    #[test]
    fn empty_pattern_is_probed_last() {
        let compiled = compile_among(&make_among(vec![vec![""], vec!["ab"], vec!["c"]]), Mode::Forward);
        assert_eq!(
            probe_order(&compiled),
            vec![("ab", 1), ("c", 2), ("", 0)]
        );
    }

    #[test]
    fn backward_compilation_keeps_source_order_texts() {
        // keys are reversed inside the trie; the linearized probe table
        // still carries source-order texts for the runtime matcher
        let among = make_among(vec![vec!["ern"], vec!["er"], vec!["e"]]);
        let forward = compile_among(&among, Mode::Forward);
        let backward = compile_among(&among, Mode::Backward);
        assert_eq!(probe_order(&forward), probe_order(&backward));
        assert_eq!(
            probe_order(&backward),
            vec![("ern", 0), ("er", 1), ("e", 2)]
        );
    }

    #[test]
    fn substring_links_to_following_among() {
        let analysis = analyze_source(
            "externals (check)\ndefine check as ([substring] among('x' (next)))",
        );
        assert_eq!(analysis.substring_links.len(), 1);
        assert_eq!(analysis.amongs_with_substring.len(), 1);
        let (&substring_id, &among_id) = analysis.substring_links.iter().next().unwrap();
        assert_ne!(substring_id, among_id);
        assert!(analysis.amongs_with_substring.contains(&among_id));
    }

    #[test]
    fn backwardmode_routine_is_backward() {
        let analysis = analyze_source(
            "routines (r)\nexternals (stem)\nbackwardmode ( define r as next )\ndefine stem as backwards r",
        );
        let info = &analysis.routines["r"];
        assert_eq!(info.def_mode, Mode::Backward);
        assert_eq!(info.modes, vec![Mode::Backward]);
        assert!(!info.is_dual());
        assert_eq!(analysis.routines["stem"].modes, vec![Mode::Forward]);
    }

    #[test]
    fn direction_sensitive_routine_used_both_ways_is_dual() {
        let analysis = analyze_source(
            "routines (r)\nexternals (stem)\ndefine r as among('x')\ndefine stem as (r backwards r)",
        );
        let info = &analysis.routines["r"];
        assert!(info.is_dual());
        assert_eq!(info.modes, vec![Mode::Forward, Mode::Backward]);
        // the among is compiled for both directions
        assert_eq!(analysis.amongs.len(), 2);
    }

    #[test]
    fn insensitive_routine_used_both_ways_stays_single() {
        let analysis = analyze_source(
            "routines (r)\nexternals (stem)\ndefine r as next\ndefine stem as (r backwards r)",
        );
        let info = &analysis.routines["r"];
        assert!(!info.is_dual());
        assert_eq!(info.modes, vec![Mode::Forward]);
    }

    #[test]
    fn duality_propagates_to_callers() {
        // helper calls a dual routine outside any backwards wrapper, so
        // helper needs two forms as well once it is used both ways
        let analysis = analyze_source(
            "routines (r helper)\nexternals (stem)\ndefine r as among('x')\ndefine helper as r\ndefine stem as (helper backwards helper)",
        );
        assert!(analysis.routines["helper"].is_dual());
        assert!(analysis.routines["r"].is_dual());
    }

    #[test]
    fn among_gating_routine_is_used_in_among_mode() {
        let analysis = analyze_source(
            "routines (r)\nexternals (stem)\nbackwardmode ( define r as 'x' )\ndefine stem as backwards among('a' r (next))",
        );
        assert_eq!(analysis.routines["r"].modes, vec![Mode::Backward]);
    }
}
