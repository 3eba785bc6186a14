//! Property tests for pattern selection and chunked matching

use consolebench::expect::Automaton;
use consolebench::pattern::CompiledPatterns;
use consolebench::session::ScriptedTransport;
use consolebench::{Pattern, Session};
use proptest::prelude::*;
use std::time::Duration;

/// Earliest start offset wins; ties go to the lower index.
fn naive_earliest(haystack: &str, needles: &[String]) -> Option<(usize, usize)> {
    needles
        .iter()
        .enumerate()
        .filter_map(|(idx, n)| haystack.find(n.as_str()).map(|start| (start, idx)))
        .min()
        .map(|(start, idx)| (idx, start))
}

proptest! {
    #[test]
    fn test_earliest_match_agrees_with_naive_search(
        haystack in "[ab#>]{0,40}",
        needles in prop::collection::vec("[ab#>]{1,3}", 1..5),
    ) {
        let patterns: Vec<Pattern> = needles.iter().map(|n| Pattern::exact(n.as_str())).collect();
        let compiled = CompiledPatterns::compile(&patterns).unwrap();

        let got = compiled
            .earliest(haystack.as_bytes())
            .map(|(idx, m)| (idx, m.start));
        prop_assert_eq!(got, naive_earliest(&haystack, &needles));
    }

    #[test]
    fn test_chunking_does_not_change_the_match(
        prefix in "[a-z \r\n]{0,60}",
        cuts in prop::collection::vec(0usize..80, 0..6),
    ) {
        let text = format!("{prefix}READY>");
        let mut cuts: Vec<usize> = cuts.into_iter().map(|c| c % (text.len() + 1)).collect();
        cuts.sort_unstable();
        cuts.dedup();

        let script = ScriptedTransport::new();
        let handle = script.handle();
        let mut last = 0;
        for cut in cuts.into_iter().chain(std::iter::once(text.len())) {
            if cut > last {
                handle.push_output(&text[last..cut]);
                last = cut;
            }
        }

        let mut session = Session::from_transport("prop", script);
        let mut automaton = Automaton::new("prop", 64 * 1024, false);
        let m = automaton
            .expect_any(&mut session, &[Pattern::exact("READY>")], Some(Duration::from_secs(2)))
            .unwrap();
        prop_assert_eq!(m.pattern_index, 0);
        prop_assert_eq!(m.before, prefix);
    }
}
