//! Messages passed between the receiver's threads.
//!
//! Flows:
//! - Handle → RX: interest changes ([`RxCommand`]).
//! - RX → Conductor: term buffer creation and release requests
//!   ([`AdminCommand`]).
//! - Conductor → RX: allocated buffers to attach ([`AdminEvent`]).
//!
//! All three travel over [`crate::sync::spsc`] queues; none of them carry
//! a reply channel. Shutdown is a shared flag, not a message, so a full
//! queue cannot hold it back.

use crate::net::Endpoint;
use crate::types::{ChannelId, SessionId, TermId};

use super::term::TermBufferRef;

/// Capacity of the handle → RX command queue. Cold path.
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Capacity of the RX ↔ conductor queues.
///
/// Sized for a burst of new sessions; a full queue drops the request and the
/// next data frame for the same term asks again.
pub const ADMIN_QUEUE_CAPACITY: usize = 1024;

/// Commands from the [`Receiver`](super::Receiver) handle to the RX thread.
#[derive(Debug)]
pub enum RxCommand {
    AddChannels(Vec<ChannelId>),
    RemoveChannels(Vec<ChannelId>),
}

/// Requests from the RX thread to the conductor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    CreateReceiveTermBuffer {
        destination: Endpoint,
        session: SessionId,
        channel: ChannelId,
        term: TermId,
    },
    /// Interest in `channel` dropped to zero; its sessions are gone.
    ReleaseChannel {
        destination: Endpoint,
        channel: ChannelId,
    },
}

/// Completions from the conductor, applied on the RX thread.
#[derive(Debug)]
pub enum AdminEvent {
    AttachTermBuffer {
        channel: ChannelId,
        session: SessionId,
        term: TermId,
        buffer: TermBufferRef,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}

    #[test]
    fn messages_cross_threads() {
        assert_send::<RxCommand>();
        assert_send::<AdminCommand>();
        assert_send::<AdminEvent>();
    }
}
