use crate::midi::Message;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Beat time usable as an ordered map key
#[derive(Debug, Clone, Copy)]
struct TimeKey(f64);

impl PartialEq for TimeKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimeKey {}

impl PartialOrd for TimeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Pending messages ordered by scheduled time
///
/// Messages sharing a timestamp are kept together in insertion order and
/// leave the queue as one batch. The queue is not synchronised; the clock
/// guards it with its own lock.
#[derive(Debug, Default)]
pub struct MessageQueue {
    messages: BTreeMap<TimeKey, Vec<Message>>,
    len: usize,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&mut self, msg: Message) {
        // -0.0 and 0.0 share a batch
        let key = TimeKey(msg.time() + 0.0);
        self.messages.entry(key).or_default().push(msg);
        self.len += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of pending messages
    pub fn len(&self) -> usize {
        self.len
    }

    /// Time of the earliest pending message
    pub fn earliest_timestamp(&self) -> Option<f64> {
        self.messages.keys().next().map(|key| key.0)
    }

    /// Removes every message scheduled at the earliest timestamp
    pub fn pop_earliest(&mut self) -> Vec<Message> {
        match self.messages.pop_first() {
            Some((_, batch)) => {
                self.len -= batch.len();
                batch
            }
            None => Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.len = 0;
    }
}
