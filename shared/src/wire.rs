//! Datagram framing: `MAGIC || bincode(WireMessage)`
//!
//! Only [`WireMessage`] over a closed payload enum is ever decoded, so the
//! bytes of a datagram can at most select one of the variants the schema
//! declares. The decoder enforces a size limit and rejects trailing bytes.

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::ids::MessageId;

/// Version of the message schema carried in the last marker byte
pub const SCHEMA_VERSION: u8 = 1;

/// Marker every datagram starts with
pub const MAGIC: [u8; 4] = [b'P', b'S', b'H', SCHEMA_VERSION];

/// Everything that can travel in one datagram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireMessage<T> {
    /// Acknowledges receipt of a reliable message
    Confirmation { message_id: MessageId },
    /// A payload the receiver must confirm
    Reliable { message_id: MessageId, payload: T },
    /// A fire-and-forget payload
    Unreliable(T),
}

/// Encodes and decodes framed datagrams up to a fixed size
#[derive(Debug, Clone, Copy)]
pub struct WireCodec {
    max_datagram_size: usize,
}

impl WireCodec {
    pub fn new(max_datagram_size: usize) -> Self {
        Self { max_datagram_size }
    }

    pub fn max_datagram_size(&self) -> usize {
        self.max_datagram_size
    }

    pub fn encode<T: Serialize>(&self, message: &WireMessage<T>) -> Result<Vec<u8>, CodecError> {
        let mut datagram = Vec::with_capacity(64);
        datagram.extend_from_slice(&MAGIC);
        bincode::DefaultOptions::new()
            .serialize_into(&mut datagram, message)
            .map_err(CodecError::Encode)?;

        if datagram.len() > self.max_datagram_size {
            return Err(CodecError::Oversized {
                len: datagram.len(),
                max: self.max_datagram_size,
            });
        }
        Ok(datagram)
    }

    pub fn decode<T: DeserializeOwned>(&self, datagram: &[u8]) -> Result<WireMessage<T>, CodecError> {
        let body = datagram
            .strip_prefix(&MAGIC[..])
            .ok_or(CodecError::BadMagic)?;

        bincode::DefaultOptions::new()
            .with_limit(self.max_datagram_size as u64)
            .reject_trailing_bytes()
            .deserialize(body)
            .map_err(CodecError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PeerId;
    use crate::messages::{GameMessage, LobbyEntry, Vec2};
    use crate::payload::Addressed;

    fn codec() -> WireCodec {
        WireCodec::new(4096)
    }

    #[test]
    fn test_roundtrip_all_wire_kinds() {
        let payload = Addressed::new(
            PeerId(77),
            GameMessage::Shoot {
                aim: Vec2::new(1.5, -2.0),
                relative_size: 0.25,
            },
        );

        let messages = vec![
            WireMessage::Confirmation {
                message_id: MessageId(1),
            },
            WireMessage::Reliable {
                message_id: MessageId(2),
                payload: payload.clone(),
            },
            WireMessage::Unreliable(payload),
        ];

        for message in messages {
            let datagram = codec().encode(&message).unwrap();
            assert_eq!(&datagram[..4], &MAGIC);
            let decoded: WireMessage<Addressed<GameMessage>> = codec().decode(&datagram).unwrap();
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn test_roundtrip_every_game_message() {
        let messages = vec![
            GameMessage::JoinLobby {
                name: "grace".to_string(),
            },
            GameMessage::LobbyState {
                players: vec![
                    LobbyEntry {
                        player_id: PeerId(1),
                        name: "a".to_string(),
                    },
                    LobbyEntry {
                        player_id: PeerId(2),
                        name: "b".to_string(),
                    },
                ],
            },
            GameMessage::StartGame,
            GameMessage::MousePosition {
                aim: Vec2::new(3.0, 4.0),
            },
            GameMessage::PlayerState {
                player_id: PeerId(5),
                aim: Vec2::ZERO,
            },
            GameMessage::Shoot {
                aim: Vec2::new(-1.0, 0.5),
                relative_size: 1.0,
            },
            GameMessage::ShotFired {
                shooter: PeerId(6),
                aim: Vec2::new(0.0, 9.0),
                relative_size: 0.1,
            },
        ];

        for message in messages {
            let datagram = codec().encode(&WireMessage::Unreliable(&message)).unwrap();
            let decoded: WireMessage<GameMessage> = codec().decode(&datagram).unwrap();
            assert_eq!(decoded, WireMessage::Unreliable(message));
        }
    }

    #[test]
    fn test_borrowed_and_owned_payloads_encode_identically() {
        let message = GameMessage::StartGame;
        let borrowed = codec().encode(&WireMessage::Unreliable(&message)).unwrap();
        let owned = codec().encode(&WireMessage::Unreliable(message)).unwrap();
        assert_eq!(borrowed, owned);
    }

    #[test]
    fn test_bad_magic_is_rejected() {
        let mut datagram = codec()
            .encode(&WireMessage::Unreliable(GameMessage::StartGame))
            .unwrap();
        datagram[0] = b'X';

        let result = codec().decode::<GameMessage>(&datagram);
        assert!(matches!(result, Err(CodecError::BadMagic)));
    }

    #[test]
    fn test_other_schema_version_is_rejected() {
        let mut datagram = codec()
            .encode(&WireMessage::Unreliable(GameMessage::StartGame))
            .unwrap();
        datagram[3] = SCHEMA_VERSION + 1;

        let result = codec().decode::<GameMessage>(&datagram);
        assert!(matches!(result, Err(CodecError::BadMagic)));
    }

    #[test]
    fn test_short_datagram_is_rejected() {
        assert!(matches!(
            codec().decode::<GameMessage>(&MAGIC[..2]),
            Err(CodecError::BadMagic)
        ));
        assert!(matches!(
            codec().decode::<GameMessage>(&MAGIC),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_unknown_variant_tag_is_rejected() {
        let mut datagram = MAGIC.to_vec();
        datagram.push(200);

        let result = codec().decode::<GameMessage>(&datagram);
        assert!(matches!(result, Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut datagram = codec()
            .encode(&WireMessage::Unreliable(GameMessage::StartGame))
            .unwrap();
        datagram.extend_from_slice(&[0, 0, 0]);

        let result = codec().decode::<GameMessage>(&datagram);
        assert!(matches!(result, Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_oversized_message_is_rejected() {
        let message = GameMessage::JoinLobby {
            name: "x".repeat(200),
        };

        let result = WireCodec::new(64).encode(&WireMessage::Unreliable(message));
        match result {
            Err(CodecError::Oversized { len, max }) => {
                assert!(len > 200);
                assert_eq!(max, 64);
            }
            other => panic!("expected oversized error, got {:?}", other),
        }
    }

    #[test]
    fn test_hostile_length_prefix_is_rejected() {
        // JoinLobby tag followed by a string length far beyond the limit
        let mut datagram = MAGIC.to_vec();
        datagram.push(2); // Unreliable
        datagram.push(0); // JoinLobby
        datagram.push(253); // varint u64 follows
        datagram.extend_from_slice(&u64::MAX.to_le_bytes());

        let result = codec().decode::<GameMessage>(&datagram);
        assert!(matches!(result, Err(CodecError::Malformed(_))));
    }
}
