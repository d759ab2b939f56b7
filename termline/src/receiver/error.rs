//! Receiver error taxonomy.
//!
//! Frames for channels or sessions nobody registered are not errors; they
//! are dropped before any of these can arise.

use std::io;

use thiserror::Error;

use crate::types::{ChannelId, SessionId};

use super::config::ConfigError;

#[derive(Debug, Error)]
pub enum ReceiverError {
    /// Interest removed for a channel that holds no registration.
    #[error("no channel registered on {0}")]
    NotRegistered(ChannelId),

    /// A callback named a channel this dispatcher does not track.
    #[error("channel {0} not found")]
    ChannelNotFound(ChannelId),

    /// A callback named a session this dispatcher never created.
    #[error("session {session} not found on channel {channel}")]
    SessionNotFound {
        channel: ChannelId,
        session: SessionId,
    },

    /// Sending a datagram or polling the socket failed.
    #[error("transport I/O failed: {0}")]
    Transport(#[from] io::Error),

    /// The RX thread has not drained earlier commands yet.
    #[error("receiver command queue full")]
    CommandQueueFull,

    /// Binding or configuring the destination socket failed.
    #[error("failed to bind socket: {0}")]
    Bind(io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A receiver thread panicked instead of returning.
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

impl ReceiverError {
    /// Whether the error means dispatcher and conductor state have diverged.
    #[must_use]
    pub const fn is_state_inconsistency(&self) -> bool {
        matches!(self, Self::ChannelNotFound(_) | Self::SessionNotFound { .. })
    }
}
