//! Receiver configuration.

use thiserror::Error;

use crate::net::Endpoint;
use crate::types::ChannelId;

use super::congestion::CongestionControlKind;

/// Smallest term the conductor will allocate.
pub const TERM_LENGTH_MIN: usize = 64 * 1024;

/// Largest term the conductor will allocate.
pub const TERM_LENGTH_MAX: usize = 1024 * 1024 * 1024;

pub const TERM_LENGTH_DEFAULT: usize = 1024 * 1024;

pub const INITIAL_WINDOW_LENGTH_DEFAULT: u32 = 128 * 1024;

/// Configuration for one receiver destination.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Local address the destination's UDP socket binds to.
    pub bind_addr: Endpoint,
    /// Bytes allocated per term buffer. Power of two.
    pub term_length: usize,
    /// Upper bound for the window advertised in status messages.
    pub initial_window_length: u32,
    /// Strategy built for each new session.
    pub congestion_control: CongestionControlKind,
    /// Channels registered before the first datagram is read.
    pub channels: Vec<ChannelId>,
    /// `SO_RCVBUF` override; `None` keeps the OS default.
    pub socket_rcvbuf: Option<usize>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_addr: Endpoint::any(0),
            term_length: TERM_LENGTH_DEFAULT,
            initial_window_length: INITIAL_WINDOW_LENGTH_DEFAULT,
            congestion_control: CongestionControlKind::default(),
            channels: Vec::new(),
            socket_rcvbuf: None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("term length {0} must be a power of two in [{TERM_LENGTH_MIN}, {TERM_LENGTH_MAX}]")]
    TermLength(usize),
    #[error("initial window length must be greater than zero")]
    ZeroWindow,
    #[error("unknown congestion control: {0}")]
    UnknownCongestionControl(String),
}

impl ReceiverConfig {
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let term = self.term_length;
        if !term.is_power_of_two() || !(TERM_LENGTH_MIN..=TERM_LENGTH_MAX).contains(&term) {
            return Err(ConfigError::TermLength(term));
        }
        if self.initial_window_length == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(ReceiverConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_odd_term_length() {
        let config = ReceiverConfig {
            term_length: 100_000,
            ..ReceiverConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::TermLength(100_000)));
    }

    #[test]
    fn rejects_tiny_term_length() {
        let config = ReceiverConfig {
            term_length: 4096,
            ..ReceiverConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::TermLength(4096)));
    }

    #[test]
    fn rejects_zero_window() {
        let config = ReceiverConfig {
            initial_window_length: 0,
            ..ReceiverConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroWindow));
    }
}
