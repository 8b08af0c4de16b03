//! # Game Server Library
//!
//! The authoritative end of the UDP transport. A [`network::Server`] owns one
//! socket, learns about peers from the payloads they send, and routes
//! outgoing payloads to a single peer or to all of them.
//!
//! ## Peers
//!
//! There is no handshake. Every payload a client sends is tagged with the
//! client's [`shared::PeerId`]; the first payload from an unseen id
//! registers that id together with the address it came from. Each peer has
//! its own dedup ring, so reliable message ids are only compared within one
//! sender.
//!
//! ## Hosting
//!
//! A player may run the server inside their own game. That player talks to
//! the server through a [`hosting::HostingClient`], which skips the socket
//! entirely: payloads are handed over in memory and therefore always arrive,
//! even ones the wire codec could not encode.
//!
//! ## Module Organization
//!
//! - `peer_registry`: per-peer address, dedup ring and activity time
//! - `network`: the [`network::Server`] and its routing operations
//! - `hosting`: the in-process client
//! - `game`: the lobby and game phases driven on a fixed tick
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::game::GameSession;
//! use server::network::Server;
//! use shared::messages::GameMessage;
//! use shared::{StopMode, TransportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server: Server<GameMessage> =
//!         Server::bind("0.0.0.0:29801", TransportConfig::default()).await?;
//!     server.start()?;
//!
//!     let mut session = GameSession::new();
//!     for _ in 0..500 {
//!         session.tick(&server).await?;
//!         tokio::time::sleep(std::time::Duration::from_millis(20)).await;
//!     }
//!
//!     server.stop(StopMode::Synchronous).await?;
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod hosting;
pub mod network;
pub mod peer_registry;
