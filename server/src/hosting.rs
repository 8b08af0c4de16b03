use shared::inbox::Inbox;
use shared::{Addressed, CommunicationClient, Payload, PeerId, TransportError};
use std::sync::Arc;

use crate::network::ServerInner;

/// Client for the player who runs the server in their own process
///
/// Sending hands the payload straight to the server's inbox and the server
/// pushes broadcasts and unicasts straight into this client's inbox. Nothing
/// is encoded and nothing can be lost, so reliable and unreliable sends
/// behave the same and never need the endpoint to be running. Once the
/// client is detached or replaced its sends fail with `UnknownPeer`.
pub struct HostingClient<M: Payload> {
    id: PeerId,
    inbox: Arc<Inbox<M>>,
    server: Arc<ServerInner<M>>,
}

impl<M: Payload> HostingClient<M> {
    pub(crate) fn new(id: PeerId, inbox: Arc<Inbox<M>>, server: Arc<ServerInner<M>>) -> Self {
        Self { id, inbox, server }
    }

    fn deliver(&self, payload: M) -> Result<(), TransportError> {
        self.server.accept_from_host(Addressed::new(self.id, payload))
    }
}

impl<M: Payload> CommunicationClient<M> for HostingClient<M> {
    fn id(&self) -> PeerId {
        self.id
    }

    async fn send(&self, payload: M) -> Result<(), TransportError> {
        self.deliver(payload)
    }

    async fn send_reliable(&self, payload: M) -> Result<(), TransportError> {
        self.deliver(payload)
    }

    fn poll_messages(&self, channel: M::Channel) -> Vec<M> {
        self.inbox.poll(channel)
    }

    fn discard_messages_not_of(&self, channel: M::Channel) {
        self.inbox.discard_not_of(channel);
    }
}
