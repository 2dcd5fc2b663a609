//! Outbound message queue.
//!
//! Holds user messages that could not be written to an open transport.
//! Entries keep submission order; each is removed exactly once, either when
//! it is delivered or when its retry counter reaches the cap.

use std::collections::VecDeque;

use talentdesk_protocol::new_id;

use crate::ChatError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub id: String,
    pub content: String,
    pub retries: u32,
}

/// Result of recording a failed retry tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Still queued with this many retries recorded
    Pending(u32),
    /// Cap reached; the entry was removed
    Dropped(QueuedMessage),
    /// The entry is no longer queued
    Gone,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub sent: usize,
    pub remaining: usize,
}

#[derive(Debug, Default)]
pub struct OutboundQueue {
    entries: VecDeque<QueuedMessage>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message with zero retries, returning its id
    pub fn enqueue(&mut self, content: impl Into<String>) -> String {
        let id = new_id();
        self.entries.push_back(QueuedMessage {
            id: id.clone(),
            content: content.into(),
            retries: 0,
        });
        id
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&QueuedMessage> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn remove(&mut self, id: &str) -> Option<QueuedMessage> {
        let index = self.entries.iter().position(|entry| entry.id == id)?;
        self.entries.remove(index)
    }

    /// Count one failed tick against `id`, dropping it once `max_retries` is hit.
    pub fn record_retry(&mut self, id: &str, max_retries: u32) -> RetryOutcome {
        let Some(entry) = self.entries.iter_mut().find(|entry| entry.id == id) else {
            return RetryOutcome::Gone;
        };
        entry.retries += 1;
        if entry.retries < max_retries {
            return RetryOutcome::Pending(entry.retries);
        }
        match self.remove(id) {
            Some(dropped) => RetryOutcome::Dropped(dropped),
            None => RetryOutcome::Gone,
        }
    }

    /// Send queued entries head to tail, stopping at the first failure.
    pub fn flush<F>(&mut self, mut send: F) -> FlushReport
    where
        F: FnMut(&QueuedMessage) -> Result<(), ChatError>,
    {
        let mut sent = 0;
        while let Some(head) = self.entries.front() {
            if send(head).is_err() {
                break;
            }
            self.entries.pop_front();
            sent += 1;
        }
        FlushReport {
            sent,
            remaining: self.entries.len(),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_sends_in_submission_order() {
        let mut queue = OutboundQueue::new();
        for content in ["m1", "m2", "m3"] {
            queue.enqueue(content);
        }

        let mut wire = Vec::new();
        let report = queue.flush(|entry| {
            wire.push(entry.content.clone());
            Ok(())
        });

        assert_eq!(wire, vec!["m1", "m2", "m3"]);
        assert_eq!(report, FlushReport { sent: 3, remaining: 0 });
        assert!(queue.is_empty());
    }

    #[test]
    fn flush_stops_at_first_failure() {
        let mut queue = OutboundQueue::new();
        for content in ["a", "b", "c"] {
            queue.enqueue(content);
        }

        let mut calls = 0;
        let report = queue.flush(|entry| {
            calls += 1;
            if entry.content == "b" {
                Err(ChatError::Transport("socket gone".into()))
            } else {
                Ok(())
            }
        });

        assert_eq!(calls, 2);
        assert_eq!(report, FlushReport { sent: 1, remaining: 2 });
        let left: Vec<_> = queue.entries.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(left, vec!["b", "c"]);
    }

    #[test]
    fn flush_on_empty_queue_writes_nothing() {
        let mut queue = OutboundQueue::new();
        let mut calls = 0;
        let report = queue.flush(|_| {
            calls += 1;
            Ok(())
        });
        assert_eq!(calls, 0);
        assert_eq!(report, FlushReport::default());
    }

    #[test]
    fn entry_is_dropped_on_fifth_retry() {
        let mut queue = OutboundQueue::new();
        let id = queue.enqueue("stuck");

        for expected in 1..5 {
            assert_eq!(queue.record_retry(&id, 5), RetryOutcome::Pending(expected));
        }
        match queue.record_retry(&id, 5) {
            RetryOutcome::Dropped(entry) => {
                assert_eq!(entry.content, "stuck");
                assert_eq!(entry.retries, 5);
            }
            other => panic!("expected drop, got {:?}", other),
        }
        assert!(!queue.contains(&id));
        assert_eq!(queue.record_retry(&id, 5), RetryOutcome::Gone);
    }

    #[test]
    fn remove_is_exactly_once() {
        let mut queue = OutboundQueue::new();
        let id = queue.enqueue("once");
        assert!(queue.remove(&id).is_some());
        assert!(queue.remove(&id).is_none());
    }
}
