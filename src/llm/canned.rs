//! Local canned replies used when generation is unavailable

use rand::Rng;

/// Replies served with `source: fallback`
pub const CANNED_REPLIES: &[&str] = &[
    "I couldn't find that in my notes, and the assistant service is unavailable right now. Please try again shortly.",
    "Sorry, I don't have an answer for that at the moment. Try rephrasing, or ask again in a little while.",
    "That one is outside what I know offhand, and I can't reach the assistant service right now.",
    "I'm having trouble answering right now. Please try again in a moment.",
];

/// Reply used when a restricted-domain question has no matching fact
pub const NO_RELEVANT_INFO: &str = "No relevant info found.";

/// Chooses an index into the canned reply list
pub trait ReplySelector: Send + Sync {
    /// Return an index in `0..len`; `len` is never zero
    fn pick(&self, len: usize) -> usize;
}

/// Uniformly random choice
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSelector;

impl ReplySelector for RandomSelector {
    fn pick(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

/// Always the same index (wrapped into range)
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSelector(pub usize);

impl ReplySelector for FixedSelector {
    fn pick(&self, len: usize) -> usize {
        self.0 % len
    }
}

/// Pick a canned reply
pub fn canned_reply(selector: &dyn ReplySelector) -> &'static str {
    let idx = selector.pick(CANNED_REPLIES.len()).min(CANNED_REPLIES.len() - 1);
    CANNED_REPLIES[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_selector_is_deterministic() {
        assert_eq!(canned_reply(&FixedSelector(0)), CANNED_REPLIES[0]);
        assert_eq!(canned_reply(&FixedSelector(1)), CANNED_REPLIES[1]);
        assert_eq!(
            canned_reply(&FixedSelector(CANNED_REPLIES.len() + 2)),
            CANNED_REPLIES[2]
        );
    }

    #[test]
    fn test_random_selector_stays_in_set() {
        for _ in 0..50 {
            let reply = canned_reply(&RandomSelector);
            assert!(CANNED_REPLIES.contains(&reply));
        }
    }

    #[test]
    fn test_replies_are_non_empty() {
        assert!(CANNED_REPLIES.iter().all(|r| !r.trim().is_empty()));
    }
}
