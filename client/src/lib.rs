//! # Game Client Library
//!
//! Client side of the game transport. Game code talks to the server through
//! the [`shared::CommunicationClient`] capability, which has two
//! implementations:
//!
//! - [`network::InternetClient`]: owns a UDP socket and exchanges datagrams
//!   with a remote server, retrying reliable payloads until they are confirmed
//! - `server::hosting::HostingClient`: for the player running the server in
//!   the same process; payloads are handed over in memory
//!
//! Both tag everything they send with their own [`shared::PeerId`] and keep
//! received payloads in an inbox split by channel, so the lobby screen and the
//! game loop each poll only their own traffic.
//!
//! ## Module Organization
//!
//! - `network`: the internet client
//! - `game`: client-side view of the lobby and game phases
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::game::ClientGameState;
//! use client::network::InternetClient;
//! use shared::messages::GameMessage;
//! use shared::{CommunicationClient, StopMode, TransportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client: InternetClient<GameMessage> = InternetClient::connect(
//!         "0.0.0.0:29802",
//!         "127.0.0.1:29801".parse()?,
//!         TransportConfig::default(),
//!     )
//!     .await?;
//!
//!     client
//!         .send_reliable(GameMessage::JoinLobby { name: "ada".into() })
//!         .await?;
//!
//!     let mut state = ClientGameState::new();
//!     state.update(&client);
//!
//!     client.stop(StopMode::Synchronous).await?;
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod network;
