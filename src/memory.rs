//! Sliding-window conversation memory.
//!
//! Only the last `capacity` exchanges are kept; they are the sole context
//! the generation service ever sees about earlier turns.

use std::collections::VecDeque;

use serde::Serialize;

use crate::constants::MEMORY_WINDOW;

/// One completed user/assistant exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}

#[derive(Debug, Clone)]
pub struct ConversationMemory {
    capacity: usize,
    pairs: VecDeque<Exchange>,
}

impl ConversationMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            pairs: VecDeque::with_capacity(capacity),
        }
    }

    /// Record an exchange, evicting the oldest ones past capacity.
    pub fn append(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        while self.pairs.len() >= self.capacity {
            self.pairs.pop_front();
        }
        self.pairs.push_back(Exchange {
            user: user.into(),
            assistant: assistant.into(),
        });
    }

    /// Retained exchanges, oldest first.
    pub fn replay(&self) -> Vec<Exchange> {
        self.pairs.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(MEMORY_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_memory_is_empty() {
        let memory = ConversationMemory::default();
        assert!(memory.is_empty());
        assert_eq!(memory.capacity(), 6);
        assert!(memory.replay().is_empty());
    }

    #[test]
    fn test_replay_is_chronological() {
        let mut memory = ConversationMemory::new(3);
        memory.append("u1", "a1");
        memory.append("u2", "a2");

        let replay = memory.replay();
        assert_eq!(replay.len(), 2);
        assert_eq!(replay[0].user, "u1");
        assert_eq!(replay[1].assistant, "a2");
    }

    #[test]
    fn test_oldest_pairs_evicted_first() {
        let mut memory = ConversationMemory::new(2);
        memory.append("u1", "a1");
        memory.append("u2", "a2");
        memory.append("u3", "a3");

        let users: Vec<_> = memory.replay().into_iter().map(|e| e.user).collect();
        assert_eq!(users, vec!["u2", "u3"]);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        for capacity in 0..8 {
            let mut memory = ConversationMemory::new(capacity);
            for i in 0..20usize {
                memory.append(format!("u{i}"), format!("a{i}"));
                assert!(memory.len() <= capacity);

                // The newest pairs survive, in order.
                let replay = memory.replay();
                let first = (i + 1).saturating_sub(capacity);
                for (offset, exchange) in replay.iter().enumerate() {
                    assert_eq!(exchange.user, format!("u{}", first + offset));
                }
            }
        }
    }

    #[test]
    fn test_clear() {
        let mut memory = ConversationMemory::default();
        memory.append("hi", "hello");
        memory.clear();
        assert!(memory.is_empty());
    }
}
