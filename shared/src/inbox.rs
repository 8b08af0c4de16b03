use std::sync::Mutex;

use crate::payload::Payload;
use crate::utils::lock;

/// Thread-safe holding area for received payloads
///
/// Payloads are drained by channel. Draining one channel leaves the others
/// queued in arrival order.
#[derive(Debug)]
pub struct Inbox<T> {
    items: Mutex<Vec<T>>,
}

impl<T: Payload> Inbox<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, item: T) {
        lock(&self.items).push(item);
    }

    /// Removes and returns every queued payload of `channel`
    pub fn poll(&self, channel: T::Channel) -> Vec<T> {
        let mut items = lock(&self.items);
        let (matching, rest): (Vec<T>, Vec<T>) = std::mem::take(&mut *items)
            .into_iter()
            .partition(|item| item.channel() == channel);
        *items = rest;
        matching
    }

    /// Drops every queued payload that does not belong to `channel`
    pub fn discard_not_of(&self, channel: T::Channel) -> usize {
        let mut items = lock(&self.items);
        let before = items.len();
        items.retain(|item| item.channel() == channel);
        before - items.len()
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.items).is_empty()
    }
}

impl<T: Payload> Default for Inbox<T> {
    fn default() -> Self {
        Self::new()
    }
}
