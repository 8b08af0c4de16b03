//! Reliable sends awaiting confirmation
//!
//! An entry is inserted before the first transmission of a reliable message
//! and removed exactly once, either by the matching confirmation or, when a
//! retransmission ceiling is configured, by giving up on it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::ids::MessageId;
use crate::utils::lock;

/// A reliable message that has not been confirmed yet
#[derive(Debug, Clone)]
pub struct PendingSend {
    pub message_id: MessageId,
    pub destination: SocketAddr,
    /// The framed envelope, encoded once and never modified
    pub datagram: Arc<[u8]>,
    pub created: Instant,
    pub last_sent: Instant,
    /// Every transmission, initial burst included
    pub transmissions: u32,
    /// Transmissions made by the resend loop
    pub resends: u32,
}

/// Read-only view of a pending send
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSendInfo {
    pub message_id: MessageId,
    pub destination: SocketAddr,
    pub transmissions: u32,
    pub age: Duration,
}

/// A datagram the resend loop should put on the wire again
#[derive(Debug, Clone)]
pub struct Retransmission {
    pub message_id: MessageId,
    pub destination: SocketAddr,
    pub datagram: Arc<[u8]>,
}

/// Result of one resend scan
#[derive(Debug, Default)]
pub struct DueSends {
    pub resend: Vec<Retransmission>,
    pub abandoned: Vec<PendingSendInfo>,
}

#[derive(Debug, Default)]
pub struct Outbox {
    pending: Mutex<HashMap<MessageId, PendingSend>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, message_id: MessageId, destination: SocketAddr, datagram: Arc<[u8]>, now: Instant) {
        let entry = PendingSend {
            message_id,
            destination,
            datagram,
            created: now,
            last_sent: now,
            transmissions: 0,
            resends: 0,
        };
        lock(&self.pending).insert(message_id, entry);
    }

    /// Notes an initial-burst transmission; false if already confirmed
    pub fn record_transmission(&self, message_id: MessageId, at: Instant) -> bool {
        match lock(&self.pending).get_mut(&message_id) {
            Some(entry) => {
                entry.transmissions += 1;
                entry.last_sent = at;
                true
            }
            None => false,
        }
    }

    /// Removes the entry for `message_id`; false if there was none
    pub fn confirm(&self, message_id: MessageId) -> bool {
        lock(&self.pending).remove(&message_id).is_some()
    }

    /// Collects entries last sent at least `resend_delay` ago
    ///
    /// Returned entries are stamped as sent at `now`, so the caller only has
    /// to put them on the wire. Entries that already used up
    /// `max_retransmissions` resends are removed and reported as abandoned.
    pub fn due(&self, now: Instant, resend_delay: Duration, max_retransmissions: Option<u32>) -> DueSends {
        let mut pending = lock(&self.pending);
        let mut due = DueSends::default();

        pending.retain(|_, entry| {
            if now.saturating_duration_since(entry.last_sent) < resend_delay {
                return true;
            }
            if max_retransmissions.is_some_and(|limit| entry.resends >= limit) {
                due.abandoned.push(info(entry, now));
                return false;
            }

            entry.last_sent = now;
            entry.transmissions += 1;
            entry.resends += 1;
            due.resend.push(Retransmission {
                message_id: entry.message_id,
                destination: entry.destination,
                datagram: Arc::clone(&entry.datagram),
            });
            true
        });

        due
    }

    pub fn transmissions(&self, message_id: MessageId) -> Option<u32> {
        lock(&self.pending)
            .get(&message_id)
            .map(|entry| entry.transmissions)
    }

    pub fn snapshot(&self, now: Instant) -> Vec<PendingSendInfo> {
        lock(&self.pending)
            .values()
            .map(|entry| info(entry, now))
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.pending).is_empty()
    }
}

fn info(entry: &PendingSend, now: Instant) -> PendingSendInfo {
    PendingSendInfo {
        message_id: entry.message_id,
        destination: entry.destination,
        transmissions: entry.transmissions,
        age: now.saturating_duration_since(entry.created),
    }
}
