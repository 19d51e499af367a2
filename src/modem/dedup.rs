//! Inbound message identity and deduplication.
//!
//! Within one extraction the same message can arrive twice (inline push and
//! store-and-notify are not mutually exclusive). [`dedup_in_order`] removes
//! those repeats. Across extractions nothing is remembered unless the
//! configured [`RedeliveryPolicy`] asks for it.

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// A received text message. Identity is the `(remote, content)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InboundMessage {
    pub remote: String,
    pub content: String,
}

impl InboundMessage {
    pub fn new(remote: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            content: content.into(),
        }
    }

    fn key(&self) -> (String, String) {
        (self.remote.clone(), self.content.clone())
    }
}

/// Drop later repeats of the same `(remote, content)`, keeping first-seen order.
pub fn dedup_in_order(messages: Vec<InboundMessage>) -> Vec<InboundMessage> {
    let mut seen = HashSet::with_capacity(messages.len());
    messages
        .into_iter()
        .filter(|m| seen.insert(m.key()))
        .collect()
}

/// Whether a message re-reported by the modem on a later poll is delivered again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RedeliveryPolicy {
    /// Every extraction stands alone.
    #[default]
    Allow,
    /// Remember recently delivered messages and filter them out.
    Suppress,
}

/// Bounded memory of delivered message identities. Oldest entries are
/// forgotten first once `capacity` is reached.
#[derive(Debug)]
pub struct SeenFilter {
    capacity: usize,
    order: VecDeque<(String, String)>,
    keys: HashSet<(String, String)>,
}

impl SeenFilter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            keys: HashSet::with_capacity(capacity),
        }
    }

    /// Keep only messages not remembered as delivered. Nothing is recorded
    /// here; callers [`SeenFilter::remember`] what they actually handed off.
    pub fn unseen(&self, messages: Vec<InboundMessage>) -> Vec<InboundMessage> {
        messages
            .into_iter()
            .filter(|m| !self.keys.contains(&m.key()))
            .collect()
    }

    /// Record a delivered message. Returns `false` if it was already known.
    pub fn remember(&mut self, message: &InboundMessage) -> bool {
        let key = message.key();
        if self.keys.contains(&key) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.keys.remove(&oldest);
            }
        }
        self.keys.insert(key.clone());
        self.order.push_back(key);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(remote: &str, content: &str) -> InboundMessage {
        InboundMessage::new(remote, content)
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let input = vec![
            msg("+1", "a"),
            msg("+2", "b"),
            msg("+1", "a"),
            msg("+1", "c"),
            msg("+2", "b"),
        ];
        let out = dedup_in_order(input);
        assert_eq!(out, vec![msg("+1", "a"), msg("+2", "b"), msg("+1", "c")]);
    }

    #[test]
    fn same_content_different_sender_is_distinct() {
        let out = dedup_in_order(vec![msg("+1", "hi"), msg("+2", "hi")]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn seen_filter_only_suppresses_remembered() {
        let mut filter = SeenFilter::new(8);
        let batch = vec![msg("+1", "a"), msg("+2", "b")];
        // filtering alone records nothing
        assert_eq!(filter.unseen(batch.clone()), batch);
        assert!(filter.is_empty());

        assert!(filter.remember(&msg("+1", "a")));
        assert!(!filter.remember(&msg("+1", "a")));
        let later = filter.unseen(vec![msg("+1", "a"), msg("+3", "c")]);
        assert_eq!(later, vec![msg("+3", "c")]);
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn seen_filter_forgets_oldest_at_capacity() {
        let mut filter = SeenFilter::new(2);
        for m in [msg("+1", "a"), msg("+2", "b"), msg("+3", "c")] {
            filter.remember(&m);
        }
        assert_eq!(filter.len(), 2);
        // "+1/a" was evicted, so it is delivered again
        let again = filter.unseen(vec![msg("+1", "a"), msg("+2", "b")]);
        assert_eq!(again, vec![msg("+1", "a")]);
    }

    #[test]
    fn policy_parses_lowercase() {
        let p: RedeliveryPolicy = serde_json::from_str("\"suppress\"").unwrap();
        assert_eq!(p, RedeliveryPolicy::Suppress);
        assert_eq!(RedeliveryPolicy::default(), RedeliveryPolicy::Allow);
    }
}
