//! Fuzzy name suggestion for an unresolved tool call.
//!
//! This never changes which tool is invoked — it only produces a string
//! for the caller (planner retry prompt, or a human) to consider. Plain
//! Levenshtein distance over the candidate list, closest match wins, with
//! a cutoff past which nothing is considered "close enough" to suggest.

/// Candidates farther than this from `name` (relative to its length)
/// aren't worth suggesting.
const MAX_RELATIVE_DISTANCE: f32 = 0.5;

pub fn suggest(name: &str, candidates: &[String]) -> Option<String> {
    if name.is_empty() || candidates.is_empty() {
        return None;
    }

    candidates
        .iter()
        .map(|c| (c, strsim::levenshtein(name, c)))
        .min_by_key(|(_, dist)| *dist)
        .filter(|(c, dist)| {
            let longest = name.len().max(c.len()).max(1) as f32;
            (*dist as f32 / longest) <= MAX_RELATIVE_DISTANCE
        })
        .map(|(c, _)| c.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_closest_candidate() {
        let candidates = vec!["read_file".to_string(), "write_file".to_string(), "exec".to_string()];
        assert_eq!(suggest("read_fil", &candidates), Some("read_file".to_string()));
    }

    #[test]
    fn no_suggestion_when_nothing_close() {
        let candidates = vec!["exec".to_string(), "file_list".to_string()];
        assert_eq!(suggest("totally_unrelated_tool_name", &candidates), None);
    }

    #[test]
    fn empty_inputs_yield_none() {
        assert_eq!(suggest("exec", &[]), None);
        assert_eq!(suggest("", &["exec".to_string()]), None);
    }

    #[test]
    fn exact_match_has_zero_distance() {
        assert_eq!(strsim::levenshtein("exec", "exec"), 0);
    }
}
