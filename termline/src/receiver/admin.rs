//! Handoff of term buffer creation to the conductor.

use crate::net::Endpoint;
use crate::sync::spsc::Producer;
use crate::trace::warn;
use crate::types::{ChannelId, SessionId, TermId};

use super::commands::{ADMIN_QUEUE_CAPACITY, AdminCommand};

/// Fire-and-forget channel to the admin (conductor) subsystem.
///
/// Implementations must never block the RX thread. The allocated buffer
/// comes back later as an independent call to
/// [`FrameDispatcher::attach_buffer_state`](super::FrameDispatcher::attach_buffer_state).
pub trait AdminCommandChannel {
    /// Asks for a receive term buffer.
    ///
    /// Returns `true` if the request was handed off, `false` if it was
    /// dropped (the caller may ask again on a later frame).
    fn request_create_receive_term_buffer(
        &mut self,
        destination: Endpoint,
        session: SessionId,
        channel: ChannelId,
        term: TermId,
    ) -> bool;

    /// Tells the conductor that every buffer it holds for `channel` on
    /// `destination` can be freed.
    ///
    /// Returns `false` if the request was dropped.
    fn request_release_channel(&mut self, destination: Endpoint, channel: ChannelId) -> bool;
}

/// [`AdminCommandChannel`] over the RX → conductor SPSC queue.
pub struct SpscAdminChannel {
    commands: Producer<AdminCommand, ADMIN_QUEUE_CAPACITY>,
}

impl SpscAdminChannel {
    #[must_use]
    pub const fn new(commands: Producer<AdminCommand, ADMIN_QUEUE_CAPACITY>) -> Self {
        Self { commands }
    }
}

impl AdminCommandChannel for SpscAdminChannel {
    fn request_create_receive_term_buffer(
        &mut self,
        destination: Endpoint,
        session: SessionId,
        channel: ChannelId,
        term: TermId,
    ) -> bool {
        let command = AdminCommand::CreateReceiveTermBuffer {
            destination,
            session,
            channel,
            term,
        };
        if self.commands.push(command).is_err() {
            warn!(
                channel = %channel,
                session = %session,
                term = %term,
                "conductor queue full, dropping term buffer request"
            );
            return false;
        }
        true
    }

    fn request_release_channel(&mut self, destination: Endpoint, channel: ChannelId) -> bool {
        let command = AdminCommand::ReleaseChannel {
            destination,
            channel,
        };
        if self.commands.push(command).is_err() {
            warn!(channel = %channel, "conductor queue full, term buffers of removed channel stay allocated");
            return false;
        }
        true
    }
}
