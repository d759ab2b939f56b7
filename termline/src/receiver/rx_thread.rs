//! Receiver RX thread runtime.
//!
//! Responsibilities:
//! - Apply interest changes from the [`Receiver`](super::Receiver) handle.
//! - Attach term buffers completed by the conductor.
//! - Receive UDP datagrams and hand decoded frames to the dispatcher.

use std::io::ErrorKind;
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

use crate::net::{Endpoint, UdpSocket};
use crate::protocol::{DataHeader, FrameClass};
use crate::sync::spsc::Consumer;
use crate::trace::{error, info, trace, warn};

use super::admin::SpscAdminChannel;
use super::commands::{ADMIN_QUEUE_CAPACITY, AdminEvent, COMMAND_QUEUE_CAPACITY, RxCommand};
use super::dispatcher::FrameDispatcher;
use super::error::ReceiverError;

/// Maximum UDP datagram size we'll receive.
const MAX_DATAGRAM_SIZE: usize = 65535;

/// Upper bound on how long a queued command waits for the loop.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

const SOCKET: Token = Token(0);

/// RX thread state and event loop.
pub struct RxThread {
    /// Receive side of the socket the dispatcher sends on.
    socket: Arc<UdpSocket>,
    dispatcher: FrameDispatcher<Arc<UdpSocket>, SpscAdminChannel>,
    commands: Consumer<RxCommand, COMMAND_QUEUE_CAPACITY>,
    /// Completions from the conductor.
    admin_events: Consumer<AdminEvent, ADMIN_QUEUE_CAPACITY>,
    shutdown: Arc<AtomicBool>,
    poll: Poll,
    events: Events,
    /// Reusable buffer for receiving datagrams.
    recv_buf: Vec<u8>,
}

impl RxThread {
    /// # Errors
    ///
    /// Fails if the poller cannot be created or the socket registered with it.
    pub fn new(
        socket: Arc<UdpSocket>,
        dispatcher: FrameDispatcher<Arc<UdpSocket>, SpscAdminChannel>,
        commands: Consumer<RxCommand, COMMAND_QUEUE_CAPACITY>,
        admin_events: Consumer<AdminEvent, ADMIN_QUEUE_CAPACITY>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, ReceiverError> {
        let poll = Poll::new()?;
        let fd: RawFd = socket.as_fd().as_raw_fd();
        poll.registry()
            .register(&mut SourceFd(&fd), SOCKET, Interest::READABLE)?;

        Ok(Self {
            socket,
            dispatcher,
            commands,
            admin_events,
            shutdown,
            poll,
            events: Events::with_capacity(16),
            recv_buf: vec![0u8; MAX_DATAGRAM_SIZE],
        })
    }

    /// Runs the RX event loop until the shutdown flag is set, then closes the
    /// dispatcher.
    ///
    /// # Errors
    ///
    /// Returns a state-inconsistency error from the dispatcher, or a poll
    /// failure. Either ends the loop.
    pub fn run(mut self) -> Result<(), ReceiverError> {
        let result = self.event_loop();
        if let Err(ref _e) = result {
            error!(error = %_e, "RX: fatal error, leaving loop");
        }
        self.dispatcher.close();
        result
    }

    fn event_loop(&mut self) -> Result<(), ReceiverError> {
        while !self.shutdown.load(Ordering::Acquire) {
            // Control commands first (cold path)
            self.process_commands();
            self.process_admin_events()?;

            match self.poll.poll(&mut self.events, Some(POLL_INTERVAL)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            // Edge-triggered: drain until the socket reports WouldBlock.
            if !self.events.is_empty() {
                self.receive_and_dispatch();
            }
        }
        info!("RX: shutdown flag set");
        Ok(())
    }

    fn process_commands(&mut self) {
        while let Some(cmd) = self.commands.pop() {
            match cmd {
                RxCommand::AddChannels(channels) => {
                    self.dispatcher.add_channels(&channels);
                }
                RxCommand::RemoveChannels(channels) => {
                    if let Err(_e) = self.dispatcher.remove_channels(&channels) {
                        warn!(error = %_e, channels = ?channels, "RX: interest removal rejected");
                    }
                }
            }
        }
    }

    fn process_admin_events(&mut self) -> Result<(), ReceiverError> {
        while let Some(event) = self.admin_events.pop() {
            match event {
                AdminEvent::AttachTermBuffer {
                    channel,
                    session,
                    term,
                    buffer,
                } => match self
                    .dispatcher
                    .attach_buffer_state(channel, session, term, buffer)
                {
                    Ok(_) => {}
                    Err(e) if e.is_state_inconsistency() => return Err(e),
                    // The term stays owed; its next data frame resends.
                    Err(_e) => {
                        warn!(channel = %channel, session = %session, error = %_e, "RX: status message not sent");
                    }
                },
            }
        }
        Ok(())
    }

    fn receive_and_dispatch(&mut self) {
        loop {
            let (len, from) = match self.socket.try_recv_from(&mut self.recv_buf) {
                Ok(Some(received)) => received,
                Ok(None) => return,
                Err(_e) => {
                    warn!(error = %_e, "RX: recv failed");
                    return;
                }
            };
            self.dispatch(len, from);
        }
    }

    fn dispatch(&mut self, len: usize, from: Endpoint) {
        let datagram = &self.recv_buf[..len];
        match FrameClass::classify(datagram) {
            Ok(FrameClass::Data) => match DataHeader::decode(datagram) {
                Ok(header) => self.dispatcher.on_data_frame(&header, from),
                Err(_e) => {
                    trace!(from = %from, error = %_e, "RX: malformed data frame");
                }
            },
            Ok(FrameClass::Control(_)) => self.dispatcher.on_control_frame(datagram, from),
            Err(_e) => {
                trace!(from = %from, len, error = %_e, "RX: runt datagram");
            }
        }
    }
}
