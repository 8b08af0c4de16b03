use crate::ids::MessageId;

/// Fixed-capacity record of recently seen reliable message ids
///
/// Insertion overwrites the oldest slot, so memory stays bounded no matter
/// how many messages a peer sends. The price is that an id is forgotten
/// once `capacity` newer ids have been recorded after it: a duplicate that
/// arrives later than that is treated as a new message. Size the capacity
/// above the number of reliable messages a single peer can have in flight.
///
/// Not synchronized; the owner keeps it behind its own lock.
#[derive(Debug, Clone)]
pub struct DedupRing {
    slots: Vec<Option<MessageId>>,
    next: usize,
}

impl DedupRing {
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "dedup ring needs at least one slot");
        Self {
            slots: vec![None; capacity],
            next: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.slots.contains(&Some(id))
    }

    pub fn record(&mut self, id: MessageId) {
        self.slots[self.next] = Some(id);
        self.next = (self.next + 1) % self.slots.len();
    }

    /// Records `id` and reports whether it was new
    pub fn check_and_record(&mut self, id: MessageId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.record(id);
        true
    }
}
