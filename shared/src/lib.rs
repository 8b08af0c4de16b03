//! # Shared Transport Library
//!
//! Reliable messaging on top of UDP, shared by the game server and its
//! clients. Every datagram carries one [`wire::WireMessage`]: a plain
//! payload, a reliable envelope that the receiver must confirm, or such a
//! confirmation.
//!
//! ## Delivery model
//!
//! Unreliable sends go out once. Reliable sends enter the sender's
//! [`outbox::Outbox`], are transmitted a few times back to back and are then
//! retransmitted on a fixed delay until a confirmation arrives. Receivers
//! confirm every reliable envelope, duplicates included, and use a
//! [`dedup::DedupRing`] so each payload reaches the inbox once. The result is
//! at-least-once transport with duplicate suppression; there is no ordering
//! between independent sends.
//!
//! ## Module Organization
//!
//! - `ids`: peer and message identifiers and their generator
//! - `payload`: the [`Payload`] contract and the [`Addressed`] wrapper
//! - `wire`: datagram framing and the closed wire schema
//! - `dedup`, `inbox`, `outbox`: the per-endpoint bookkeeping
//! - `endpoint`: socket ownership plus the receive and resend loops
//! - `communication`: the capability set game code uses on the client side
//! - `messages`: the game's concrete message schema
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use shared::endpoint::{Endpoint, Inbound};
//! use shared::messages::GameMessage;
//! use shared::{IdGenerator, MessageId, TransportConfig};
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl Inbound<GameMessage> for Printer {
//!     fn is_first_delivery(&self, _: MessageId, _: &GameMessage, _: SocketAddr) -> bool {
//!         true
//!     }
//!
//!     fn handle_message(&self, payload: GameMessage, source: SocketAddr) {
//!         println!("{} sent {:?}", source, payload);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let endpoint: Endpoint<GameMessage, GameMessage> =
//!         Endpoint::bind("127.0.0.1:0", TransportConfig::default(), IdGenerator::new()).await?;
//!     let printer = Arc::new(Printer);
//!     endpoint.start(Arc::downgrade(&printer))?;
//!
//!     let peer: SocketAddr = "127.0.0.1:29801".parse()?;
//!     endpoint.send_reliable(&GameMessage::StartGame, peer).await?;
//!     Ok(())
//! }
//! ```

pub mod communication;
pub mod config;
pub mod dedup;
pub mod endpoint;
pub mod error;
pub mod ids;
pub mod inbox;
pub mod lifecycle;
pub mod messages;
pub mod outbox;
pub mod payload;
pub mod utils;
pub mod wire;

pub use communication::CommunicationClient;
pub use config::{TransportConfig, DEFAULT_CLIENT_PORT, DEFAULT_SERVER_PORT};
pub use error::{CodecError, TransportError};
pub use ids::{IdGenerator, MessageId, PeerId};
pub use lifecycle::{RunState, StopMode};
pub use payload::{Addressed, Payload};
