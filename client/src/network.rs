//! Client side of the UDP transport

use log::info;
use shared::dedup::DedupRing;
use shared::endpoint::{Endpoint, Inbound};
use shared::inbox::Inbox;
use shared::outbox::PendingSendInfo;
use shared::utils::lock;
use shared::{
    Addressed, CommunicationClient, IdGenerator, MessageId, Payload, PeerId, RunState, StopMode,
    TransportConfig, TransportError,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

struct ClientInner<M: Payload> {
    id: PeerId,
    server_addr: SocketAddr,
    endpoint: Endpoint<M, Addressed<M>>,
    inbox: Inbox<M>,
    seen: Mutex<DedupRing>,
}

impl<M: Payload> Inbound<M> for ClientInner<M> {
    fn is_first_delivery(&self, message_id: MessageId, _payload: &M, _source: SocketAddr) -> bool {
        lock(&self.seen).check_and_record(message_id)
    }

    fn handle_message(&self, payload: M, _source: SocketAddr) {
        self.inbox.push(payload);
    }
}

/// A client talking to a remote server over UDP
///
/// The client picks a random [`PeerId`] when it is bound and tags every
/// outgoing payload with it; the server knows the client by that id alone.
pub struct InternetClient<M: Payload> {
    inner: Arc<ClientInner<M>>,
}

impl<M: Payload> InternetClient<M> {
    /// Binds `local_addr` without starting the background loops
    pub async fn bind(
        local_addr: &str,
        server_addr: SocketAddr,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        Self::bind_with_ids(local_addr, server_addr, config, IdGenerator::new()).await
    }

    pub async fn bind_with_ids(
        local_addr: &str,
        server_addr: SocketAddr,
        config: TransportConfig,
        ids: IdGenerator,
    ) -> Result<Self, TransportError> {
        let endpoint = Endpoint::bind(local_addr, config, ids).await?;
        let seen = DedupRing::new(endpoint.config().dedup_capacity);
        let id = endpoint.ids().peer_id();
        info!(
            "Client {} bound to {}, server at {}",
            id,
            endpoint.local_addr()?,
            server_addr
        );

        Ok(InternetClient {
            inner: Arc::new(ClientInner {
                id,
                server_addr,
                endpoint,
                inbox: Inbox::new(),
                seen: Mutex::new(seen),
            }),
        })
    }

    /// Binds and starts in one step
    pub async fn connect(
        local_addr: &str,
        server_addr: SocketAddr,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        let client = Self::bind(local_addr, server_addr, config).await?;
        client.start()?;
        Ok(client)
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

    pub fn server_addr(&self) -> SocketAddr {
        self.inner.server_addr
    }

    /// Reliable messages sent to the server that are still unconfirmed
    pub fn pending_sends(&self) -> Vec<PendingSendInfo> {
        self.inner.endpoint.pending_sends()
    }

    pub fn transmissions(&self, message_id: MessageId) -> Option<u32> {
        self.inner.endpoint.transmissions(message_id)
    }

    /// Like [`CommunicationClient::send_reliable`] but returns the message id
    pub async fn send_reliable_tracked(&self, payload: M) -> Result<MessageId, TransportError> {
        let wrapped = Addressed::new(self.inner.id, payload);
        self.inner
            .endpoint
            .send_reliable(&wrapped, self.inner.server_addr)
            .await
    }
}

impl<M: Payload> CommunicationClient<M> for InternetClient<M> {
    fn id(&self) -> PeerId {
        self.inner.id
    }

    async fn send(&self, payload: M) -> Result<(), TransportError> {
        let wrapped = Addressed::new(self.inner.id, payload);
        self.inner.endpoint.send(&wrapped, self.inner.server_addr).await
    }

    async fn send_reliable(&self, payload: M) -> Result<(), TransportError> {
        self.send_reliable_tracked(payload).await?;
        Ok(())
    }

    fn poll_messages(&self, channel: M::Channel) -> Vec<M> {
        self.inner.inbox.poll(channel)
    }

    fn discard_messages_not_of(&self, channel: M::Channel) {
        self.inner.inbox.discard_not_of(channel);
    }
}
