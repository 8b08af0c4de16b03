use std::time::Duration;

use crate::error::TransportError;

/// Port the dedicated or hosting server listens on by default
pub const DEFAULT_SERVER_PORT: u16 = 29801;
/// Port internet clients bind locally by default
pub const DEFAULT_CLIENT_PORT: u16 = 29802;

/// Tuning knobs shared by every endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    /// How many recent reliable message ids are remembered per sender
    ///
    /// A redelivery that arrives after this many newer reliable messages from
    /// the same sender is no longer recognized as a duplicate.
    pub dedup_capacity: usize,
    /// How often a reliable message is sent back to back when first queued
    pub initial_send_count: u32,
    /// How long to wait for a confirmation before sending again
    pub resend_delay: Duration,
    /// How often the resend loop scans for overdue messages
    pub resend_check_interval: Duration,
    /// Upper bound on an encoded datagram, also the receive buffer size
    pub max_datagram_size: usize,
    /// Resends after which an unconfirmed message is given up
    ///
    /// `None` keeps retrying for as long as the endpoint runs.
    pub max_retransmissions: Option<u32>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            dedup_capacity: 1024,
            initial_send_count: 2,
            resend_delay: Duration::from_millis(30),
            resend_check_interval: Duration::from_millis(15),
            max_datagram_size: 4096,
            max_retransmissions: None,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.dedup_capacity == 0 {
            return Err(TransportError::InvalidConfig(
                "dedup_capacity must be at least 1".to_string(),
            ));
        }
        if self.initial_send_count == 0 {
            return Err(TransportError::InvalidConfig(
                "initial_send_count must be at least 1".to_string(),
            ));
        }
        if self.resend_check_interval.is_zero() {
            return Err(TransportError::InvalidConfig(
                "resend_check_interval must be positive".to_string(),
            ));
        }
        // Marker plus at least a variant tag
        if self.max_datagram_size < 8 || self.max_datagram_size > 65_507 {
            return Err(TransportError::InvalidConfig(format!(
                "max_datagram_size {} is outside 8..=65507",
                self.max_datagram_size
            )));
        }
        Ok(())
    }
}
