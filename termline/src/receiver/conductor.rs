//! Conductor thread: allocates receive term buffers off the RX thread.
//!
//! Each `CreateReceiveTermBuffer` is answered by an `AttachTermBuffer` event.
//! Buffers are retained here per destination, session and channel, so a
//! repeated request gets the same buffer back. Each stream keeps only its
//! newest [`PARTITION_COUNT`](super::term::PARTITION_COUNT) terms, and `ReleaseChannel` frees every stream
//! of a channel.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::net::Endpoint;
use crate::sync::spsc::{Consumer, Producer};
use crate::trace::{debug, info, warn};
use crate::types::{ChannelId, SessionId};

use super::commands::{ADMIN_QUEUE_CAPACITY, AdminCommand, AdminEvent};
use super::term::{TermBuffer, TermWindow};

/// How long the conductor waits on an empty queue before checking shutdown.
const IDLE_WAIT: Duration = Duration::from_millis(10);

type StreamKey = (Endpoint, SessionId, ChannelId);

pub struct Conductor {
    commands: Consumer<AdminCommand, ADMIN_QUEUE_CAPACITY>,
    events: Producer<AdminEvent, ADMIN_QUEUE_CAPACITY>,
    term_length: usize,
    streams: HashMap<StreamKey, TermWindow>,
    /// Completions the RX thread had no room for yet.
    backlog: VecDeque<AdminEvent>,
    shutdown: Arc<AtomicBool>,
}

impl Conductor {
    pub fn new(
        commands: Consumer<AdminCommand, ADMIN_QUEUE_CAPACITY>,
        events: Producer<AdminEvent, ADMIN_QUEUE_CAPACITY>,
        term_length: usize,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            commands,
            events,
            term_length,
            streams: HashMap::new(),
            backlog: VecDeque::new(),
            shutdown,
        }
    }

    /// Runs until the shutdown flag is set.
    pub fn run(&mut self) {
        while !self.shutdown.load(Ordering::Acquire) {
            self.flush_backlog();
            if let Some(command) = self.commands.pop_timeout(IDLE_WAIT) {
                self.on_command(command);
            }
        }
        info!(
            buffers = self.buffer_count(),
            "conductor: shutdown, releasing term buffers"
        );
    }

    fn on_command(&mut self, command: AdminCommand) {
        match command {
            AdminCommand::CreateReceiveTermBuffer {
                destination,
                session,
                channel,
                term,
            } => {
                let term_length = self.term_length;
                let window = self
                    .streams
                    .entry((destination, session, channel))
                    .or_default();
                let buffer = if let Some(held) = window.get(term) {
                    Arc::clone(held)
                } else {
                    debug!(
                        destination = %destination,
                        channel = %channel,
                        session = %session,
                        term = %term,
                        term_length,
                        "conductor: allocating term buffer"
                    );
                    let buffer = TermBuffer::allocate(term, term_length);
                    let released = window.insert(term, Arc::clone(&buffer));
                    if released > 0 {
                        debug!(
                            channel = %channel,
                            session = %session,
                            released,
                            "conductor: released rotated-out terms"
                        );
                    }
                    buffer
                };

                self.send(AdminEvent::AttachTermBuffer {
                    channel,
                    session,
                    term,
                    buffer,
                });
            }
            AdminCommand::ReleaseChannel {
                destination,
                channel,
            } => {
                let _released = self.release_channel(destination, channel);
                info!(
                    destination = %destination,
                    channel = %channel,
                    released = _released,
                    "conductor: channel released"
                );
            }
        }
    }

    /// Drops every stream of `channel` on `destination`. Returns the number
    /// of term buffers freed.
    fn release_channel(&mut self, destination: Endpoint, channel: ChannelId) -> usize {
        let before = self.buffer_count();
        self.streams
            .retain(|&(dest, _, chan), _| dest != destination || chan != channel);
        before - self.buffer_count()
    }

    fn send(&mut self, event: AdminEvent) {
        if !self.backlog.is_empty() {
            self.backlog.push_back(event);
            return;
        }
        if let Err(event) = self.events.push(event) {
            warn!("conductor: RX event queue full, deferring attach");
            self.backlog.push_back(event);
        }
    }

    fn flush_backlog(&mut self) {
        while let Some(event) = self.backlog.pop_front() {
            if let Err(event) = self.events.push(event) {
                self.backlog.push_front(event);
                return;
            }
        }
    }

    /// Number of term buffers currently retained.
    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.streams.values().map(TermWindow::len).sum()
    }
}
