//! Error taxonomy for the transport
//!
//! Codec errors are local to a single datagram and are recovered by the
//! receive loop. Everything else in [`TransportError`] is surfaced to the
//! caller of `start`, `stop` or a send operation.

use std::io;
use std::net::SocketAddr;

use crate::ids::PeerId;

/// Failures of the wire codec
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The datagram does not start with the expected marker
    #[error("malformed packet: bad marker")]
    BadMagic,

    /// The marker matched but the body is not a valid message
    #[error("malformed packet: {0}")]
    Malformed(#[source] bincode::Error),

    /// The message could not be serialized
    #[error("encode failed: {0}")]
    Encode(#[source] bincode::Error),

    /// The encoded message does not fit into one datagram
    #[error("encoded message is {len} bytes, limit is {max}")]
    Oversized { len: usize, max: usize },
}

impl CodecError {
    /// True for errors caused by the bytes received rather than by us
    pub fn is_malformed_packet(&self) -> bool {
        matches!(self, CodecError::BadMagic | CodecError::Malformed(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("send to {dest} failed: {source}")]
    Send {
        dest: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Unicast to a peer the server has never heard from
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),

    #[error("endpoint is not running")]
    NotRunning,

    /// A background loop stopped the endpoint; holds that loop's error
    #[error("endpoint stopped after a socket failure: {0}")]
    Failed(String),

    #[error("endpoint is already running")]
    AlreadyRunning,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl TransportError {
    /// True for socket errors a loop should log and survive
    ///
    /// Some platforms report an ICMP "port unreachable" for an earlier
    /// datagram as a reset on the next socket call. That only means one
    /// peer went away, not that our socket is broken.
    pub fn is_transient(&self) -> bool {
        let source = match self {
            TransportError::Send { source, .. } => source,
            TransportError::Receive(source) => source,
            _ => return false,
        };

        matches!(
            source.kind(),
            io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionRefused
                | io::ErrorKind::Interrupted
                | io::ErrorKind::WouldBlock
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send_error(kind: io::ErrorKind) -> TransportError {
        TransportError::Send {
            dest: "127.0.0.1:9".parse().unwrap(),
            source: io::Error::from(kind),
        }
    }

    #[test]
    fn test_reset_and_refused_are_transient() {
        assert!(send_error(io::ErrorKind::ConnectionReset).is_transient());
        assert!(send_error(io::ErrorKind::ConnectionRefused).is_transient());
        assert!(TransportError::Receive(io::Error::from(io::ErrorKind::ConnectionReset)).is_transient());
    }

    #[test]
    fn test_other_errors_are_fatal() {
        assert!(!send_error(io::ErrorKind::PermissionDenied).is_transient());
        assert!(!TransportError::Receive(io::Error::from(io::ErrorKind::Other)).is_transient());
        assert!(!TransportError::UnknownPeer(PeerId(3)).is_transient());
        assert!(!TransportError::NotRunning.is_transient());
        assert!(!TransportError::Failed("boom".to_string()).is_transient());
    }

    #[test]
    fn test_malformed_classification() {
        assert!(CodecError::BadMagic.is_malformed_packet());
        assert!(!CodecError::Oversized { len: 10, max: 5 }.is_malformed_packet());
    }

    #[test]
    fn test_error_message_formatting() {
        assert_eq!(
            TransportError::UnknownPeer(PeerId(0x10)).to_string(),
            "unknown peer peer:00000010"
        );
        assert_eq!(
            CodecError::Oversized { len: 5000, max: 4096 }.to_string(),
            "encoded message is 5000 bytes, limit is 4096"
        );
    }
}
