use log::{debug, info};
use shared::messages::{Channel, GameMessage, LobbyEntry, Vec2};
use shared::{CommunicationClient, PeerId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    Lobby,
    Game,
}

/// A shot another player (or this one) fired, as relayed by the server
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shot {
    pub shooter: PeerId,
    pub aim: Vec2,
    pub relative_size: f32,
}

/// What a client knows about the session, built only from server messages
#[derive(Debug)]
pub struct ClientGameState {
    phase: ClientPhase,
    lobby: Vec<LobbyEntry>,
    aims: HashMap<PeerId, Vec2>,
    shots: Vec<Shot>,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self {
            phase: ClientPhase::Lobby,
            lobby: Vec::new(),
            aims: HashMap::new(),
            shots: Vec::new(),
        }
    }

    pub fn phase(&self) -> ClientPhase {
        self.phase
    }

    pub fn lobby(&self) -> &[LobbyEntry] {
        &self.lobby
    }

    pub fn aim_of(&self, player: PeerId) -> Option<Vec2> {
        self.aims.get(&player).copied()
    }

    /// Players with a known aim, ordered by id
    pub fn players(&self) -> Vec<PeerId> {
        let mut players: Vec<PeerId> = self.aims.keys().copied().collect();
        players.sort();
        players
    }

    /// Shots received since the last call
    pub fn take_shots(&mut self) -> Vec<Shot> {
        std::mem::take(&mut self.shots)
    }

    /// Drains the client's inbox for the current phase and applies it
    ///
    /// Returns how many messages were taken from the inbox.
    pub fn update<C: CommunicationClient<GameMessage>>(&mut self, client: &C) -> usize {
        let mut applied = 0;

        if self.phase == ClientPhase::Lobby {
            for message in client.poll_messages(Channel::Lobby) {
                self.apply(message);
                applied += 1;
            }
        }

        if self.phase == ClientPhase::Game {
            client.discard_messages_not_of(Channel::Game);
            for message in client.poll_messages(Channel::Game) {
                self.apply(message);
                applied += 1;
            }
        }

        applied
    }

    /// Applies one message from the server
    pub fn apply(&mut self, message: GameMessage) {
        match (self.phase, message) {
            (ClientPhase::Lobby, GameMessage::LobbyState { players }) => {
                self.lobby = players;
            }
            (ClientPhase::Lobby, GameMessage::StartGame) => {
                info!("Game started with {} players", self.lobby.len());
                self.phase = ClientPhase::Game;
            }
            (ClientPhase::Game, GameMessage::PlayerState { player_id, aim }) => {
                self.aims.insert(player_id, aim);
            }
            (
                ClientPhase::Game,
                GameMessage::ShotFired {
                    shooter,
                    aim,
                    relative_size,
                },
            ) => {
                self.shots.push(Shot {
                    shooter,
                    aim,
                    relative_size,
                });
            }
            (phase, other) => debug!("Ignoring {:?} during {:?}", other, phase),
        }
    }
}

impl Default for ClientGameState {
    fn default() -> Self {
        Self::new()
    }
}
