//! Per-stream interest state.

use std::collections::HashMap;

use crate::net::Endpoint;
use crate::types::{ChannelId, SessionId};

use super::congestion::CongestionControl;
use super::session::Session;

/// A channel this destination has registered interest in.
///
/// Lives in the registry while `references > 0`.
pub struct Channel {
    channel_id: ChannelId,
    references: usize,
    sessions: HashMap<SessionId, Session>,
}

impl Channel {
    /// New channel holding a single reference.
    #[must_use]
    pub fn new(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            references: 1,
            sessions: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    #[must_use]
    pub const fn references(&self) -> usize {
        self.references
    }

    /// Returns the new count.
    pub fn increment_reference(&mut self) -> usize {
        self.references += 1;
        self.references
    }

    /// Returns the new count. The registry removes the channel at zero.
    pub fn decrement_reference(&mut self) -> usize {
        debug_assert!(self.references > 0, "channel {} over-released", self.channel_id);
        self.references = self.references.saturating_sub(1);
        self.references
    }

    #[must_use]
    pub fn session(&self, session_id: SessionId) -> Option<&Session> {
        self.sessions.get(&session_id)
    }

    pub fn session_mut(&mut self, session_id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&session_id)
    }

    /// Registers a new publisher session.
    ///
    /// Callers look the session up first. If it already exists the existing
    /// session is returned untouched, so at most one `Session` per id exists.
    pub fn create_session(
        &mut self,
        session_id: SessionId,
        source: Endpoint,
        congestion_control: Box<dyn CongestionControl>,
    ) -> &mut Session {
        debug_assert!(
            !self.sessions.contains_key(&session_id),
            "session {session_id} already exists on channel {}",
            self.channel_id
        );
        self.sessions
            .entry(session_id)
            .or_insert_with(|| Session::new(source, congestion_control))
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
