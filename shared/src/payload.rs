//! Application payload contract and the client-to-server sender wrapper

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::ids::PeerId;

/// A value the transport can carry between server and clients
///
/// Every payload belongs to exactly one channel. Channels are disjoint
/// categories (for example lobby traffic versus in-game traffic) used to
/// drain only the messages a given consumer understands.
pub trait Payload: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    type Channel: Copy + Eq + Debug + Send + Sync + 'static;

    fn channel(&self) -> Self::Channel;
}

/// A payload tagged with the peer that sent it
///
/// Clients wrap everything they send to the server in this type so the
/// server can tell senders apart regardless of their network address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Addressed<M> {
    pub sender_id: PeerId,
    pub payload: M,
}

impl<M> Addressed<M> {
    pub fn new(sender_id: PeerId, payload: M) -> Self {
        Self { sender_id, payload }
    }
}

impl<M: Payload> Payload for Addressed<M> {
    type Channel = M::Channel;

    fn channel(&self) -> Self::Channel {
        self.payload.channel()
    }
}
