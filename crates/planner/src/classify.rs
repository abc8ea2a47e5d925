//! Fast-path classification: decide "task or conversation?" without an AI
//! call when the input is unambiguous.
//!
//! A handful of single-word greetings and acknowledgements are common enough
//! that burning an AI round-trip on them would be wasteful; everything else
//! goes to [`crate::decompose`]'s AI classification step.

use regex::Regex;
use std::sync::OnceLock;

/// A canned conversational reply for a fast-path match.
pub struct FastPathReply {
    pub text: &'static str,
}

fn greeting_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(hi|hello|hey|yo|sup|你好|嗨)[.!?\s]*$").unwrap()
    })
}

fn thanks_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(thanks|thank you|thx|ty|谢谢)[.!?\s]*$").unwrap()
    })
}

fn ack_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(ok|okay|sure|got it|sounds good|cool|alright|好的)[.!?\s]*$").unwrap()
    })
}

fn farewell_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*(bye|goodbye|see ya|再见)[.!?\s]*$").unwrap())
}

/// Return a canned reply if `text` matches a deterministic conversational
/// pattern, bypassing the AI classification call entirely.
pub fn fast_path(text: &str) -> Option<FastPathReply> {
    if greeting_pattern().is_match(text) {
        return Some(FastPathReply {
            text: "Hello! What can I help you with?",
        });
    }
    if thanks_pattern().is_match(text) {
        return Some(FastPathReply {
            text: "You're welcome!",
        });
    }
    if farewell_pattern().is_match(text) {
        return Some(FastPathReply { text: "Goodbye!" });
    }
    if ack_pattern().is_match(text) {
        return Some(FastPathReply {
            text: "Understood.",
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_matches() {
        assert!(fast_path("hello").is_some());
        assert!(fast_path("  Hi!  ").is_some());
        assert!(fast_path("你好").is_some());
    }

    #[test]
    fn thanks_matches() {
        assert!(fast_path("thanks").is_some());
        assert!(fast_path("thank you!").is_some());
    }

    #[test]
    fn task_like_input_does_not_match() {
        assert!(fast_path("read the file /tmp/a.txt").is_none());
        assert!(fast_path("hello, can you list my files?").is_none());
    }
}
