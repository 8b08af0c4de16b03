//! Message schema exchanged between the game server and its clients
//!
//! The schema is a closed, tagged enum: the decoder only ever builds one of
//! the variants listed here. Adding or reordering variants changes the wire
//! layout, so any such change must bump [`crate::wire::SCHEMA_VERSION`].

use serde::{Deserialize, Serialize};

use crate::ids::PeerId;
use crate::payload::Payload;

/// Channels the game separates its traffic into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Pre-game roster and start signal
    Lobby,
    /// In-game state updates and actions
    Game,
}

/// A point or direction in world space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// One row of the lobby roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyEntry {
    pub player_id: PeerId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameMessage {
    // Lobby channel
    JoinLobby {
        name: String,
    },
    LobbyState {
        players: Vec<LobbyEntry>,
    },
    StartGame,

    // Game channel
    MousePosition {
        aim: Vec2,
    },
    PlayerState {
        player_id: PeerId,
        aim: Vec2,
    },
    Shoot {
        aim: Vec2,
        relative_size: f32,
    },
    ShotFired {
        shooter: PeerId,
        aim: Vec2,
        relative_size: f32,
    },
}

impl Payload for GameMessage {
    type Channel = Channel;

    fn channel(&self) -> Channel {
        match self {
            GameMessage::JoinLobby { .. } | GameMessage::LobbyState { .. } | GameMessage::StartGame => {
                Channel::Lobby
            }
            GameMessage::MousePosition { .. }
            | GameMessage::PlayerState { .. }
            | GameMessage::Shoot { .. }
            | GameMessage::ShotFired { .. } => Channel::Game,
        }
    }
}
