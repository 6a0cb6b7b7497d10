//! Message Reconciler
//!
//! Merges REST history and the live feed into one ordered, de-duplicated
//! sequence (oldest first). History load and transport connect race each
//! other; live messages that arrive before history is seeded are held back
//! and appended after it, so the result is always history-then-live.

use std::collections::HashSet;

use crate::message::{ChatMessage, MessageId};

#[derive(Debug, Default)]
pub struct MessageReconciler {
    messages: Vec<ChatMessage>,
    seen: HashSet<MessageId>,
    seeded: bool,
    pending: Vec<ChatMessage>,
}

impl MessageReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the sequence with `history` (oldest first), then flush any
    /// live messages received while history was loading
    pub fn seed(&mut self, history: Vec<ChatMessage>) {
        self.messages.clear();
        self.seen.clear();

        for message in history {
            if self.seen.insert(message.message_id) {
                self.messages.push(message);
            }
        }
        self.seeded = true;
        let history_len = self.messages.len();

        let pending = std::mem::take(&mut self.pending);
        let buffered = pending.len();
        for message in pending {
            self.append(message);
        }

        tracing::debug!(history = history_len, buffered, "Seeded message history");
    }

    /// Append a live message. Returns false for a duplicate id.
    pub fn append(&mut self, message: ChatMessage) -> bool {
        if !self.seeded {
            if self.pending.iter().any(|m| m.message_id == message.message_id) {
                return false;
            }
            self.pending.push(message);
            return true;
        }

        if !self.seen.insert(message.message_id) {
            tracing::trace!(message_id = message.message_id, "Ignoring duplicate message");
            return false;
        }
        self.messages.push(message);
        true
    }

    /// The settled sequence, oldest first
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Live messages waiting for history
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.seen.contains(&id) || self.pending.iter().any(|m| m.message_id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::sample_message;

    fn ids(reconciler: &MessageReconciler) -> Vec<MessageId> {
        reconciler.messages().iter().map(|m| m.message_id).collect()
    }

    #[test]
    fn test_distinct_ids_all_kept() {
        let mut reconciler = MessageReconciler::new();
        reconciler.seed(Vec::new());

        for id in [5, 3, 9, 1, 7] {
            assert!(reconciler.append(sample_message(id)));
        }

        assert_eq!(reconciler.len(), 5);
        assert_eq!(ids(&reconciler), vec![5, 3, 9, 1, 7]);
    }

    #[test]
    fn test_redelivery_is_idempotent() {
        let mut reconciler = MessageReconciler::new();
        reconciler.seed(vec![sample_message(1), sample_message(2)]);
        reconciler.append(sample_message(3));

        assert!(!reconciler.append(sample_message(2)));
        assert!(!reconciler.append(sample_message(3)));
        assert!(!reconciler.append(sample_message(1)));

        assert_eq!(ids(&reconciler), vec![1, 2, 3]);
    }

    #[test]
    fn test_live_before_history_is_appended_after_it() {
        let mut reconciler = MessageReconciler::new();

        assert!(reconciler.append(sample_message(3)));
        assert!(reconciler.is_empty());
        assert_eq!(reconciler.pending_len(), 1);

        reconciler.seed(vec![sample_message(1), sample_message(2)]);

        assert_eq!(ids(&reconciler), vec![1, 2, 3]);
        assert_eq!(reconciler.pending_len(), 0);
    }

    #[test]
    fn test_buffered_echo_of_history_message_is_dropped() {
        let mut reconciler = MessageReconciler::new();

        reconciler.append(sample_message(2));
        reconciler.append(sample_message(2));
        reconciler.append(sample_message(4));
        assert_eq!(reconciler.pending_len(), 2);

        reconciler.seed(vec![sample_message(1), sample_message(2), sample_message(3)]);

        assert_eq!(ids(&reconciler), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_seed_replaces_wholesale() {
        let mut reconciler = MessageReconciler::new();
        reconciler.seed(vec![sample_message(1)]);
        reconciler.append(sample_message(2));

        reconciler.seed(vec![sample_message(10), sample_message(10), sample_message(11)]);

        assert_eq!(ids(&reconciler), vec![10, 11]);
        assert!(!reconciler.contains(2));
        assert!(reconciler.append(sample_message(2)));
    }

    #[test]
    fn test_empty_history_flushes_buffer() {
        let mut reconciler = MessageReconciler::new();
        reconciler.append(sample_message(8));
        reconciler.append(sample_message(6));

        reconciler.seed(Vec::new());

        assert!(reconciler.is_seeded());
        assert_eq!(ids(&reconciler), vec![8, 6]);
    }
}
