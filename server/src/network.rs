//! Server network layer: peer routing on top of a UDP endpoint

use log::{info, warn};
use shared::endpoint::{Endpoint, Inbound};
use shared::inbox::Inbox;
use shared::outbox::PendingSendInfo;
use shared::utils::lock;
use shared::{
    Addressed, IdGenerator, MessageId, Payload, PeerId, RunState, StopMode, TransportConfig,
    TransportError,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::hosting::HostingClient;
use crate::peer_registry::PeerRegistry;

/// The in-process client attached to this server, seen from the server side
struct HostedPeer<M> {
    id: PeerId,
    inbox: Arc<Inbox<M>>,
}

pub(crate) struct ServerInner<M: Payload> {
    endpoint: Endpoint<Addressed<M>, M>,
    inbox: Inbox<Addressed<M>>,
    peers: Mutex<PeerRegistry>,
    hosting: Mutex<Option<HostedPeer<M>>>,
}

impl<M: Payload> ServerInner<M> {
    /// Entry point for payloads from the hosting client, which bypass the socket
    ///
    /// Only the currently attached hosting client is accepted.
    pub(crate) fn accept_from_host(&self, payload: Addressed<M>) -> Result<(), TransportError> {
        let sender = payload.sender_id;
        let attached = lock(&self.hosting).as_ref().map(|hosted| hosted.id);
        if attached != Some(sender) {
            warn!("Dropping payload from hosting client {}, which is no longer attached", sender);
            return Err(TransportError::UnknownPeer(sender));
        }
        self.inbox.push(payload);
        Ok(())
    }

    fn hosted_inbox(&self, peer: Option<PeerId>) -> Option<Arc<Inbox<M>>> {
        let hosting = lock(&self.hosting);
        hosting
            .as_ref()
            .filter(|hosted| peer.map_or(true, |peer| peer == hosted.id))
            .map(|hosted| Arc::clone(&hosted.inbox))
    }
}

impl<M: Payload> Inbound<Addressed<M>> for ServerInner<M> {
    fn is_first_delivery(&self, message_id: MessageId, payload: &Addressed<M>, source: SocketAddr) -> bool {
        lock(&self.peers).first_delivery(payload.sender_id, source, message_id)
    }

    fn handle_message(&self, payload: Addressed<M>, source: SocketAddr) {
        if lock(&self.peers).touch(payload.sender_id, source).is_none() {
            return;
        }
        self.inbox.push(payload);
    }
}

/// Authoritative end of the transport
///
/// Receives payloads from any number of internet clients, registers each
/// sender the first time it is heard from, and routes outgoing payloads to
/// one peer or all of them. An optional hosting client living in the same
/// process is served by direct hand-off instead of the socket.
///
/// Cloning yields another handle to the same server.
pub struct Server<M: Payload> {
    inner: Arc<ServerInner<M>>,
}

impl<M: Payload> Clone for Server<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Payload> Server<M> {
    pub async fn bind(addr: &str, config: TransportConfig) -> Result<Self, TransportError> {
        Self::bind_with_ids(addr, config, IdGenerator::new()).await
    }

    pub async fn bind_with_ids(
        addr: &str,
        config: TransportConfig,
        ids: IdGenerator,
    ) -> Result<Self, TransportError> {
        let dedup_capacity = config.dedup_capacity;
        let endpoint = Endpoint::bind(addr, config, ids).await?;
        info!("Server listening on {}", endpoint.local_addr()?);

        Ok(Server {
            inner: Arc::new(ServerInner {
                endpoint,
                inbox: Inbox::new(),
                peers: Mutex::new(PeerRegistry::new(dedup_capacity)),
                hosting: Mutex::new(None),
            }),
        })
    }

    pub fn start(&self) -> Result<(), TransportError> {
        self.inner.endpoint.start(Arc::downgrade(&self.inner))
    }

    pub async fn stop(&self, mode: StopMode) -> Result<(), TransportError> {
        self.inner.endpoint.stop(mode).await
    }

    pub fn state(&self) -> RunState {
        self.inner.endpoint.state()
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.inner.endpoint.local_addr()
    }

    /// Creates the in-process client for a player hosting this server
    ///
    /// Replaces any previously attached hosting client.
    pub fn attach_hosting_client(&self) -> HostingClient<M> {
        let id = self.inner.endpoint.ids().peer_id();
        let inbox = Arc::new(Inbox::new());

        let previous = lock(&self.inner.hosting).replace(HostedPeer {
            id,
            inbox: Arc::clone(&inbox),
        });
        if let Some(previous) = previous {
            warn!("Hosting client {} replaced by {}", previous.id, id);
        } else {
            info!("Hosting client {} attached", id);
        }

        HostingClient::new(id, inbox, Arc::clone(&self.inner))
    }

    /// Stops forwarding to the hosting client; false if none was attached
    pub fn detach_hosting_client(&self) -> bool {
        lock(&self.inner.hosting).take().is_some()
    }

    pub fn hosting_client_id(&self) -> Option<PeerId> {
        lock(&self.inner.hosting).as_ref().map(|hosted| hosted.id)
    }

    /// Sends `payload` once to every peer and the hosting client
    ///
    /// A peer that cannot be sent to does not hold up the others; the first
    /// such failure is returned once everyone else has been served.
    pub async fn send_to_all(&self, payload: M) -> Result<(), TransportError> {
        let peers = lock(&self.inner.peers).addresses();
        let mut outcome = Ok(());
        if !peers.is_empty() {
            let datagram = self.inner.endpoint.encode_unreliable(&payload)?;
            for (peer, addr) in peers {
                let sent = self.inner.endpoint.send_datagram(&datagram, addr).await;
                keep_first_failure(&mut outcome, peer, sent);
            }
        }

        if let Some(inbox) = self.inner.hosted_inbox(None) {
            inbox.push(payload);
        }
        outcome
    }

    /// Sends `payload` reliably to every peer and hands it to the hosting client
    ///
    /// Every peer gets its own envelope with a fresh message id. Failures
    /// are handled as in [`Server::send_to_all`].
    pub async fn send_to_all_reliable(&self, payload: M) -> Result<(), TransportError> {
        let peers = lock(&self.inner.peers).addresses();
        let mut outcome = Ok(());
        for (peer, addr) in peers {
            let sent = self.inner.endpoint.send_reliable(&payload, addr).await.map(|_| ());
            keep_first_failure(&mut outcome, peer, sent);
        }

        if let Some(inbox) = self.inner.hosted_inbox(None) {
            inbox.push(payload);
        }
        outcome
    }

    pub async fn send_to(&self, payload: M, peer: PeerId) -> Result<(), TransportError> {
        if let Some(inbox) = self.inner.hosted_inbox(Some(peer)) {
            inbox.push(payload);
            return Ok(());
        }
        let addr = self.peer_address(peer).ok_or(TransportError::UnknownPeer(peer))?;
        self.inner.endpoint.send(&payload, addr).await
    }

    pub async fn send_reliable_to(&self, payload: M, peer: PeerId) -> Result<(), TransportError> {
        if let Some(inbox) = self.inner.hosted_inbox(Some(peer)) {
            inbox.push(payload);
            return Ok(());
        }
        let addr = self.peer_address(peer).ok_or(TransportError::UnknownPeer(peer))?;
        self.inner.endpoint.send_reliable(&payload, addr).await?;
        Ok(())
    }

    /// Drains received payloads of `channel`, each tagged with its sender
    pub fn poll_messages(&self, channel: M::Channel) -> Vec<Addressed<M>> {
        self.inner.inbox.poll(channel)
    }

    pub fn discard_messages_not_of(&self, channel: M::Channel) {
        let dropped = self.inner.inbox.discard_not_of(channel);
        if dropped > 0 {
            info!("Discarded {} queued messages outside {:?}", dropped, channel);
        }
    }

    pub fn peer_count(&self) -> usize {
        lock(&self.inner.peers).len()
    }

    pub fn peer_address(&self, peer: PeerId) -> Option<SocketAddr> {
        lock(&self.inner.peers).address_of(peer)
    }

    pub fn peers(&self) -> Vec<PeerId> {
        lock(&self.inner.peers).ids()
    }

    /// Forgets peers that sent nothing for longer than `max_idle`
    ///
    /// Peers are never evicted automatically. Reliable sends already queued
    /// for an evicted peer keep being retried.
    pub fn evict_idle_peers(&self, max_idle: Duration) -> Vec<PeerId> {
        lock(&self.inner.peers).evict_idle(max_idle)
    }

    pub fn pending_sends(&self) -> Vec<PendingSendInfo> {
        self.inner.endpoint.pending_sends()
    }
}

fn keep_first_failure(outcome: &mut Result<(), TransportError>, peer: PeerId, sent: Result<(), TransportError>) {
    if let Err(error) = sent {
        warn!("Broadcast to {} failed: {}", peer, error);
        if outcome.is_ok() {
            *outcome = Err(error);
        }
    }
}
