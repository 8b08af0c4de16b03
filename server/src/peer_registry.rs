//! Server-side bookkeeping of remote peers
//!
//! A peer is registered the first time any payload from its [`PeerId`]
//! arrives and stays registered for the lifetime of the server unless
//! idle peers are evicted explicitly. Each peer carries its own dedup ring,
//! so reliable message ids only need to be unique per sender.

use log::{info, warn};
use shared::dedup::DedupRing;
use shared::{MessageId, PeerId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;

/// A remote peer known to the server
#[derive(Debug)]
pub struct PeerHandle {
    pub id: PeerId,
    /// Address the peer's first datagram came from
    pub addr: SocketAddr,
    /// Last time any payload from this peer arrived
    pub last_seen: Instant,
    /// Reliable message ids recently received from this peer
    pub seen: DedupRing,
}

impl PeerHandle {
    pub fn new(id: PeerId, addr: SocketAddr, dedup_capacity: usize) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            seen: DedupRing::new(dedup_capacity),
        }
    }

    pub fn is_idle(&self, max_idle: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) > max_idle
    }
}

/// All remote peers, keyed by id
///
/// Not synchronized; the server keeps it behind a mutex that is never held
/// across a socket operation.
#[derive(Debug)]
pub struct PeerRegistry {
    peers: HashMap<PeerId, PeerHandle>,
    dedup_capacity: usize,
}

impl PeerRegistry {
    pub fn new(dedup_capacity: usize) -> Self {
        Self {
            peers: HashMap::new(),
            dedup_capacity,
        }
    }

    /// Returns the handle for `id`, registering it at `addr` if unseen
    ///
    /// An existing peer keeps the address it was registered with. An unseen
    /// peer at an address nothing can be sent to is not registered.
    pub fn touch(&mut self, id: PeerId, addr: SocketAddr) -> Option<&mut PeerHandle> {
        if !self.peers.contains_key(&id) && !is_routable(addr) {
            warn!("Refusing to register peer {} from unroutable {}", id, addr);
            return None;
        }

        let dedup_capacity = self.dedup_capacity;
        let peer = self.peers.entry(id).or_insert_with(|| {
            info!("Peer {} registered from {}", id, addr);
            PeerHandle::new(id, addr, dedup_capacity)
        });
        peer.last_seen = Instant::now();
        Some(peer)
    }

    /// Records a reliable message from `id`; false if it is a redelivery
    /// or the sender could not be registered
    pub fn first_delivery(&mut self, id: PeerId, addr: SocketAddr, message_id: MessageId) -> bool {
        match self.touch(id, addr) {
            Some(peer) => peer.seen.check_and_record(message_id),
            None => false,
        }
    }

    /// Plants a peer without the routability check
    #[cfg(test)]
    pub(crate) fn insert(&mut self, peer: PeerHandle) {
        self.peers.insert(peer.id, peer);
    }

    pub fn address_of(&self, id: PeerId) -> Option<SocketAddr> {
        self.peers.get(&id).map(|peer| peer.addr)
    }

    pub fn addresses(&self) -> Vec<(PeerId, SocketAddr)> {
        self.peers
            .iter()
            .map(|(id, peer)| (*id, peer.addr))
            .collect()
    }

    pub fn ids(&self) -> Vec<PeerId> {
        self.peers.keys().copied().collect()
    }

    /// Removes peers silent for longer than `max_idle` and returns their ids
    pub fn evict_idle(&mut self, max_idle: Duration) -> Vec<PeerId> {
        let now = Instant::now();
        let idle: Vec<PeerId> = self
            .peers
            .values()
            .filter(|peer| peer.is_idle(max_idle, now))
            .map(|peer| peer.id)
            .collect();

        for id in &idle {
            if let Some(peer) = self.peers.remove(id) {
                info!("Peer {} at {} evicted after inactivity", peer.id, peer.addr);
            }
        }
        idle
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

fn is_routable(addr: SocketAddr) -> bool {
    addr.port() != 0 && !addr.ip().is_unspecified()
}
