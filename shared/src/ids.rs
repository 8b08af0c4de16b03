//! Opaque 32-bit identifiers for peers and reliable messages.
//!
//! Both identifiers are drawn from the same random source but live in
//! separate types so a peer id can never be confused with a message id.
//! Uniqueness is probabilistic: collisions inside one session are possible
//! in principle and are ignored.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::utils::lock;

/// Identifies a logical participant, independent of its network address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u32);

/// Identifies one logical reliable send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer:{:08x}", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg:{:08x}", self.0)
    }
}

/// Source of fresh peer and message identifiers
///
/// Cloning is cheap and clones share the underlying generator, so a single
/// generator can be threaded through every component that needs ids.
#[derive(Clone)]
pub struct IdGenerator {
    rng: Arc<Mutex<StdRng>>,
}

impl IdGenerator {
    /// Creates a generator seeded from operating system entropy
    pub fn new() -> Self {
        Self {
            rng: Arc::new(Mutex::new(StdRng::from_entropy())),
        }
    }

    /// Creates a deterministic generator, for reproducible tests
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    pub fn peer_id(&self) -> PeerId {
        PeerId(self.next_u32())
    }

    pub fn message_id(&self) -> MessageId {
        MessageId(self.next_u32())
    }

    fn next_u32(&self) -> u32 {
        lock(&self.rng).gen()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdGenerator").finish_non_exhaustive()
    }
}
