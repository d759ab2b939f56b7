//! Receive side: frame dispatch, term buffer handoff and status messages.
//!
//! # Architecture
//!
//! A [`Receiver`] owns one destination (a bound UDP socket) and spawns two
//! threads:
//! - **RX thread**: polls the socket, decodes headers and runs the
//!   [`FrameDispatcher`]. All channel and session state lives here.
//! - **Conductor thread**: allocates term buffers on request and hands them
//!   back for attachment.
//!
//! ```text
//!  publisher ──DATA──> [socket] ─> RX thread ─CreateReceiveTermBuffer─> conductor
//!      ^                              │  ^                                  │
//!      │                              │  └────────AttachTermBuffer──────────┘
//!      └────────────SM────────────────┘
//! ```
//!
//! ## Session lifecycle
//!
//! 1. The first DATA frame for a registered channel creates the session and
//!    records the sender's address. Frames for unregistered channels are
//!    dropped.
//! 2. Each term without a buffer is requested once from the conductor. A full
//!    queue drops the request; the next frame for that term asks again.
//! 3. When the buffer arrives the RX thread attaches it and sends the first
//!    status message, carrying the session strategy's initial window.
//!
//! ## Flow control
//!
//! Status messages carry the highest contiguous sequence number and the
//! receiver window. The window comes from the session's
//! [`CongestionControl`] strategy; [`StaticWindowCongestionControl`]
//! advertises `min(term_length / 2, initial_window_length)` regardless of
//! loss or RTT.
//!
//! # Example
//!
//! ```no_run
//! use termline::net::Endpoint;
//! use termline::receiver::{Receiver, ReceiverConfig};
//! use termline::types::ChannelId;
//!
//! let mut receiver = Receiver::spawn(ReceiverConfig {
//!     bind_addr: Endpoint::any(40_123),
//!     channels: vec![ChannelId::new(7)],
//!     ..ReceiverConfig::default()
//! })?;
//!
//! // ... publishers send on channel 7 ...
//!
//! receiver.remove_channels(&[ChannelId::new(7)])?;
//! receiver.shutdown()?;
//! # Ok::<(), termline::receiver::ReceiverError>(())
//! ```

pub mod admin;
pub mod channel;
mod commands;
pub mod conductor;
pub mod config;
pub mod congestion;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod rx_thread;
pub mod session;
pub mod term;
pub mod transport;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crate::net::{Endpoint, UdpSocket};
use crate::sync::spsc::{self, Producer};
use crate::trace::{debug, error, info};
use crate::types::ChannelId;

pub use admin::{AdminCommandChannel, SpscAdminChannel};
pub use channel::Channel;
pub use commands::{ADMIN_QUEUE_CAPACITY, AdminCommand, AdminEvent, COMMAND_QUEUE_CAPACITY};
pub use config::{ConfigError, ReceiverConfig};
pub use congestion::{
    CcOutcome, CongestionControl, CongestionControlKind, StaticWindowCongestionControl,
    TrackRebuild,
};
pub use dispatcher::FrameDispatcher;
pub use error::ReceiverError;
pub use registry::{ChannelInterest, ChannelRegistry};
pub use session::Session;
pub use term::{PARTITION_COUNT, TermBuffer, TermBufferRef, TermWindow};
pub use transport::Transport;

use commands::RxCommand;
use conductor::Conductor;
use rx_thread::RxThread;

/// Handle to a running receiver destination.
///
/// Dropping the handle signals shutdown but does not wait for the threads.
/// Use [`Receiver::shutdown`] to join them.
pub struct Receiver {
    local_addr: Endpoint,
    commands: Producer<RxCommand, COMMAND_QUEUE_CAPACITY>,
    /// Interest as the RX thread will hold it once queued commands apply.
    interest: ChannelRegistry,
    shutdown_flag: Arc<AtomicBool>,
    rx_handle: Option<JoinHandle<Result<(), ReceiverError>>>,
    conductor_handle: Option<JoinHandle<()>>,
}

impl Receiver {
    /// Validates `config`, binds the socket and spawns the RX and conductor
    /// threads. Channels in `config.channels` are registered before the
    /// first datagram is read.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the socket cannot be
    /// bound or configured, or the poller cannot be created.
    ///
    /// # Panics
    ///
    /// Panics if thread spawning fails.
    pub fn spawn(config: ReceiverConfig) -> Result<Self, ReceiverError> {
        config.validate()?;
        info!(
            bind_addr = %config.bind_addr,
            term_length = config.term_length,
            initial_window_length = config.initial_window_length,
            channels = ?config.channels,
            "receiver starting"
        );

        let socket = Arc::new(UdpSocket::bind(config.bind_addr).map_err(|e| {
            error!(bind_addr = %config.bind_addr, error = %e, "failed to bind UDP socket");
            ReceiverError::Bind(e)
        })?);
        if let Some(size) = config.socket_rcvbuf {
            socket
                .set_recv_buffer_size(size)
                .map_err(ReceiverError::Bind)?;
            debug!(requested = size, actual = ?socket.recv_buffer_size().ok(), "SO_RCVBUF set");
        }
        let local_addr = socket.local_addr().map_err(ReceiverError::Bind)?;

        let (cmd_producer, cmd_consumer) = spsc::channel::<RxCommand, COMMAND_QUEUE_CAPACITY>();
        let (admin_producer, admin_consumer) =
            spsc::channel::<AdminCommand, ADMIN_QUEUE_CAPACITY>();
        let (event_producer, event_consumer) = spsc::channel::<AdminEvent, ADMIN_QUEUE_CAPACITY>();
        let shutdown_flag = Arc::new(AtomicBool::new(false));

        let mut dispatcher = FrameDispatcher::new(
            local_addr,
            Arc::clone(&socket),
            SpscAdminChannel::new(admin_producer),
            &config,
        );
        dispatcher.add_channels(&config.channels);
        let mut interest = ChannelRegistry::new();
        interest.add_interest(&config.channels);

        let rx = RxThread::new(
            socket,
            dispatcher,
            cmd_consumer,
            event_consumer,
            Arc::clone(&shutdown_flag),
        )?;
        let mut conductor = Conductor::new(
            admin_consumer,
            event_producer,
            config.term_length,
            Arc::clone(&shutdown_flag),
        );

        debug!("spawning RX thread");
        let rx_handle = thread::Builder::new()
            .name("termline-rx".into())
            .spawn(move || {
                info!("RX thread started");
                let result = rx.run();
                info!("RX thread exiting");
                result
            })
            .expect("failed to spawn RX thread");

        debug!("spawning conductor thread");
        let conductor_handle = thread::Builder::new()
            .name("termline-conductor".into())
            .spawn(move || {
                info!("conductor thread started");
                conductor.run();
                info!("conductor thread exiting");
            })
            .expect("failed to spawn conductor thread");

        info!(local_addr = %local_addr, "receiver started");

        Ok(Self {
            local_addr,
            commands: cmd_producer,
            interest,
            shutdown_flag,
            rx_handle: Some(rx_handle),
            conductor_handle: Some(conductor_handle),
        })
    }

    /// Address the destination socket is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> Endpoint {
        self.local_addr
    }

    /// Queues an interest increment for each id.
    ///
    /// # Errors
    ///
    /// [`ReceiverError::CommandQueueFull`] if the RX thread is backed up.
    pub fn add_channels(&mut self, channel_ids: &[ChannelId]) -> Result<(), ReceiverError> {
        self.send(RxCommand::AddChannels(channel_ids.to_vec()))?;
        self.interest.add_interest(channel_ids);
        Ok(())
    }

    /// Queues an interest decrement for each id.
    ///
    /// The batch is checked here against the interest this handle has
    /// queued, so the RX thread never sees one it would reject.
    ///
    /// # Errors
    ///
    /// [`ReceiverError::NotRegistered`] naming the first id with no
    /// registration left; nothing is queued.
    /// [`ReceiverError::CommandQueueFull`] if the RX thread is backed up.
    pub fn remove_channels(&mut self, channel_ids: &[ChannelId]) -> Result<(), ReceiverError> {
        self.interest.remove_interest(channel_ids)?;
        if let Err(e) = self.send(RxCommand::RemoveChannels(channel_ids.to_vec())) {
            self.interest.add_interest(channel_ids);
            return Err(e);
        }
        Ok(())
    }

    /// Channels this handle has registered interest in, ordered by id.
    /// Session counts are not tracked here and read zero.
    #[must_use]
    pub fn channel_interest(&self) -> Vec<ChannelInterest> {
        self.interest.snapshot()
    }

    fn send(&self, command: RxCommand) -> Result<(), ReceiverError> {
        self.commands
            .push(command)
            .map_err(|_| ReceiverError::CommandQueueFull)
    }

    /// Returns a clone of the shutdown flag for external signal handling.
    #[must_use]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown_flag)
    }

    /// Signals shutdown and waits for both threads.
    ///
    /// # Errors
    ///
    /// The fatal error that ended the RX loop, if any, or
    /// [`ReceiverError::ThreadPanicked`] if either thread panicked.
    pub fn shutdown(mut self) -> Result<(), ReceiverError> {
        info!("receiver shutdown initiated");
        self.shutdown_flag.store(true, Ordering::Release);

        let conductor = match self.conductor_handle.take() {
            Some(handle) => {
                debug!("waiting for conductor thread to exit");
                join(handle, "conductor")
            }
            None => Ok(()),
        };

        let rx = match self.rx_handle.take() {
            Some(handle) => {
                debug!("waiting for RX thread to exit");
                join(handle, "RX").and_then(|result| result)
            }
            None => Ok(()),
        };

        info!("receiver shutdown complete");
        rx.and(conductor)
    }
}

/// Joins `handle`, turning a panic into [`ReceiverError::ThreadPanicked`].
fn join<T>(handle: JoinHandle<T>, name: &'static str) -> Result<T, ReceiverError> {
    handle.join().map_err(|_| {
        error!(thread = name, "thread panicked");
        ReceiverError::ThreadPanicked(name)
    })
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.shutdown_flag.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joined_panic_is_reported() {
        let handle = thread::spawn(|| -> Result<(), ReceiverError> { panic!("boom") });
        let err = join(handle, "RX").and_then(|result| result).unwrap_err();
        assert!(matches!(err, ReceiverError::ThreadPanicked("RX")));
        assert_eq!(err.to_string(), "RX thread panicked");
    }

    #[test]
    fn joined_result_passes_through() {
        let handle = thread::spawn(|| Err::<(), _>(ReceiverError::CommandQueueFull));
        assert!(matches!(
            join(handle, "RX").and_then(|result| result),
            Err(ReceiverError::CommandQueueFull)
        ));
        assert_eq!(join(thread::spawn(|| 7), "conductor").unwrap(), 7);
    }
}
