//! Authoritative game-phase driver
//!
//! The session starts in the lobby, where joining players are collected and
//! the roster is rebroadcast whenever it changes. A `StartGame` request from
//! any player moves everyone into the game phase, after which the session
//! tracks where each player is aiming and relays their shots.

use log::{debug, info};
use shared::messages::{Channel, GameMessage, LobbyEntry, Vec2};
use shared::{Addressed, PeerId, TransportError};
use std::collections::BTreeMap;

use crate::network::Server;

/// Session updates per second
pub const TICK_RATE: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lobby,
    Game,
}

#[derive(Debug)]
pub struct GameSession {
    phase: Phase,
    roster: Vec<LobbyEntry>,
    aims: BTreeMap<PeerId, Vec2>,
    tick: u64,
}

impl GameSession {
    pub fn new() -> Self {
        Self {
            phase: Phase::Lobby,
            roster: Vec::new(),
            aims: BTreeMap::new(),
            tick: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Players in the order they joined
    pub fn roster(&self) -> &[LobbyEntry] {
        &self.roster
    }

    pub fn aim_of(&self, player: PeerId) -> Option<Vec2> {
        self.aims.get(&player).copied()
    }

    /// Number of game-phase ticks run so far
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    /// Forgets a player, e.g. after the server evicted it
    pub fn remove_player(&mut self, player: PeerId) {
        self.roster.retain(|entry| entry.player_id != player);
        if self.aims.remove(&player).is_some() {
            info!("Player {} left the game", player);
        }
    }

    /// Processes everything received since the last tick and sends updates
    pub async fn tick(&mut self, server: &Server<GameMessage>) -> Result<(), TransportError> {
        match self.phase {
            Phase::Lobby => self.tick_lobby(server).await,
            Phase::Game => self.tick_game(server).await,
        }
    }

    /// Leaves the lobby and tells every player the game has begun
    pub async fn start_game(&mut self, server: &Server<GameMessage>) -> Result<(), TransportError> {
        if self.phase == Phase::Game {
            return Ok(());
        }

        info!("Starting game with {} players", self.roster.len());
        self.phase = Phase::Game;
        self.aims = self
            .roster
            .iter()
            .map(|entry| (entry.player_id, Vec2::ZERO))
            .collect();

        server.discard_messages_not_of(Channel::Game);
        server.send_to_all_reliable(GameMessage::StartGame).await
    }

    async fn tick_lobby(&mut self, server: &Server<GameMessage>) -> Result<(), TransportError> {
        let mut roster_changed = false;
        let mut start_requested = false;

        for Addressed { sender_id, payload } in server.poll_messages(Channel::Lobby) {
            match payload {
                GameMessage::JoinLobby { name } => {
                    if self.roster.iter().all(|entry| entry.player_id != sender_id) {
                        info!("{} joined the lobby as {:?}", sender_id, name);
                        self.roster.push(LobbyEntry {
                            player_id: sender_id,
                            name,
                        });
                        roster_changed = true;
                    }
                }
                GameMessage::StartGame => start_requested = true,
                other => debug!("Ignoring {:?} from {} in lobby", other, sender_id),
            }
        }

        if roster_changed {
            server
                .send_to_all_reliable(GameMessage::LobbyState {
                    players: self.roster.clone(),
                })
                .await?;
        }
        if start_requested {
            self.start_game(server).await?;
        }
        Ok(())
    }

    async fn tick_game(&mut self, server: &Server<GameMessage>) -> Result<(), TransportError> {
        server.discard_messages_not_of(Channel::Game);
        for Addressed { sender_id, payload } in server.poll_messages(Channel::Game) {
            match payload {
                GameMessage::MousePosition { aim } => {
                    self.aims.insert(sender_id, aim);
                }
                GameMessage::Shoot { aim, relative_size } => {
                    server
                        .send_to_all_reliable(GameMessage::ShotFired {
                            shooter: sender_id,
                            aim,
                            relative_size,
                        })
                        .await?;
                }
                other => debug!("Ignoring {:?} from {}", other, sender_id),
            }
        }

        for (&player_id, &aim) in &self.aims {
            server
                .send_to_all(GameMessage::PlayerState { player_id, aim })
                .await?;
        }

        self.tick += 1;
        Ok(())
    }
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new()
    }
}
