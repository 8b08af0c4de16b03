use std::future::Future;

use crate::error::TransportError;
use crate::ids::PeerId;
use crate::payload::Payload;

/// What game code needs from its connection to the server
///
/// Implemented both by the internet client, which talks to a remote server
/// over UDP, and by the hosting client, which lives in the server's process
/// and hands payloads over directly.
pub trait CommunicationClient<M: Payload>: Send + Sync {
    /// The id every payload from this client is tagged with
    fn id(&self) -> PeerId;

    /// Sends `payload` to the server at most once
    fn send(&self, payload: M) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Sends `payload` to the server, retrying until it is confirmed
    fn send_reliable(&self, payload: M) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Drains the received payloads of `channel`, leaving others queued
    fn poll_messages(&self, channel: M::Channel) -> Vec<M>;

    /// Drops every queued payload that does not belong to `channel`
    fn discard_messages_not_of(&self, channel: M::Channel);
}
