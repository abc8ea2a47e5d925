//! Scope-elevation rules: keyword/regex matches that promote an otherwise
//! conversational-looking message into an explicit task scope, steering
//! the decomposition prompt toward a known domain.
//!
//! Only one scope is recognized today — content creation — grounded in the
//! kind of "write me a lesson plan" request that reads like a chat message
//! but is really a multi-step authoring task.

use regex::Regex;
use std::sync::OnceLock;

/// A scope hint attached to the decomposition prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    ContentCreation,
}

impl Scope {
    pub fn hint(self) -> &'static str {
        match self {
            Scope::ContentCreation => {
                "This request is in the content-creation scope: prefer tasks that \
                 draft, outline, or write structured educational or documentation \
                 content rather than generic file/shell operations."
            }
        }
    }
}

fn content_creation_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(lesson plan|worksheet|quiz|curriculum|syllabus|study guide|slide deck|lecture notes)\b",
        )
        .unwrap()
    })
}

/// Detect a scope elevation for `text`, if any keyword/regex rule matches.
pub fn detect(text: &str) -> Option<Scope> {
    if content_creation_pattern().is_match(text) {
        return Some(Scope::ContentCreation);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_lesson_plan() {
        assert_eq!(
            detect("can you help me draft a lesson plan for fractions"),
            Some(Scope::ContentCreation)
        );
    }

    #[test]
    fn no_match_on_unrelated_text() {
        assert_eq!(detect("read the file /tmp/a.txt"), None);
    }
}
