//! Per-destination frame dispatcher.
//!
//! Runs on the RX thread only. Every method is run-to-completion and the
//! only I/O it performs is the outbound status message send.

use crate::net::Endpoint;
use crate::protocol::{DataHeader, STATUS_MESSAGE_LENGTH, StatusMessage};
use crate::trace::{debug, info, trace, warn};
use crate::types::{ChannelId, SessionId, TermId};

use super::admin::AdminCommandChannel;
use super::config::ReceiverConfig;
use super::congestion::{CcOutcome, CongestionControlKind, TrackRebuild};
use super::error::ReceiverError;
use super::registry::{ChannelInterest, ChannelRegistry};
use super::session::Session;
use super::term::TermBufferRef;
use super::transport::Transport;

/// Routes inbound frames to channel and session state and sends status
/// messages back to publishers.
pub struct FrameDispatcher<T: Transport, A: AdminCommandChannel> {
    /// Local endpoint this dispatcher serves; named in buffer requests.
    destination: Endpoint,
    transport: T,
    admin: A,
    registry: ChannelRegistry,
    /// Reused for every status message; single writer.
    send_buffer: [u8; STATUS_MESSAGE_LENGTH],
    congestion_control: CongestionControlKind,
    term_length: usize,
    initial_window_length: u32,
}

impl<T: Transport, A: AdminCommandChannel> FrameDispatcher<T, A> {
    #[must_use]
    pub fn new(destination: Endpoint, transport: T, admin: A, config: &ReceiverConfig) -> Self {
        Self {
            destination,
            transport,
            admin,
            registry: ChannelRegistry::new(),
            send_buffer: [0u8; STATUS_MESSAGE_LENGTH],
            congestion_control: config.congestion_control,
            term_length: config.term_length,
            initial_window_length: config.initial_window_length,
        }
    }

    #[must_use]
    pub const fn destination(&self) -> Endpoint {
        self.destination
    }

    pub fn add_channels(&mut self, channel_ids: &[ChannelId]) {
        info!(destination = %self.destination, channels = ?channel_ids, "adding channel interest");
        self.registry.add_interest(channel_ids);
    }

    /// Drops one reference per id. Channels left without interest take
    /// their sessions with them, and the conductor is asked to free their
    /// term buffers.
    ///
    /// # Errors
    ///
    /// [`ReceiverError::NotRegistered`] if any id holds no registration; the
    /// registry is then left unchanged.
    pub fn remove_channels(&mut self, channel_ids: &[ChannelId]) -> Result<(), ReceiverError> {
        info!(destination = %self.destination, channels = ?channel_ids, "removing channel interest");
        for channel_id in self.registry.remove_interest(channel_ids)? {
            debug!(channel = %channel_id, "channel released");
            self.admin
                .request_release_channel(self.destination, channel_id);
        }
        Ok(())
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.registry.count()
    }

    #[must_use]
    pub fn channel_interest_snapshot(&self) -> Vec<ChannelInterest> {
        self.registry.snapshot()
    }

    #[must_use]
    pub const fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Handles a data frame from `source`.
    ///
    /// Frames for unregistered channels are dropped. A frame for a term with
    /// an attached buffer needs nothing from the dispatcher unless that
    /// term's initial status message is still owed, in which case it is sent
    /// again. Otherwise the session is created if new and a term buffer is
    /// requested from the conductor, once per term while the request is in
    /// flight. Frames for terms the session has rotated past are dropped.
    pub fn on_data_frame(&mut self, header: &DataHeader, source: Endpoint) {
        let session_id = header.session_id();
        let channel_id = header.channel_id();
        let term_id = header.term_id();

        let Some(channel) = self.registry.get_mut(channel_id) else {
            trace!(channel = %channel_id, from = %source, "no interest in channel, dropping");
            return;
        };

        match channel.session(session_id).map(|session| {
            (
                session.term_buffer(term_id).is_some(),
                session.owes_status(term_id),
            )
        }) {
            // Payload placement into the term belongs to the term writer.
            Some((true, false)) => return,
            Some((true, true)) => {
                if let Err(_e) = self.send_initial_status(channel_id, session_id, term_id) {
                    warn!(channel = %channel_id, session = %session_id, term = %term_id, error = %_e, "status message still not sent");
                }
                return;
            }
            Some((false, _)) => {}
            None => {
                debug!(
                    channel = %channel_id,
                    session = %session_id,
                    from = %source,
                    "new publisher session"
                );
                let congestion_control = self.congestion_control.build(
                    channel_id,
                    session_id,
                    self.term_length,
                    self.initial_window_length,
                );
                channel.create_session(session_id, source, congestion_control);
            }
        }

        let Some(session) = channel.session_mut(session_id) else {
            return;
        };
        if session.is_retired(term_id) {
            trace!(channel = %channel_id, session = %session_id, term = %term_id, "term already rotated out, dropping");
            return;
        }
        if session.is_pending(term_id) {
            return;
        }

        if self.admin.request_create_receive_term_buffer(
            self.destination,
            session_id,
            channel_id,
            term_id,
        ) {
            trace!(channel = %channel_id, session = %session_id, term = %term_id, "requested term buffer");
            session.mark_pending(term_id);
        }
    }

    /// Control frames (SM, NAK) are not expected on the data path and are ignored.
    pub fn on_control_frame(&mut self, frame: &[u8], source: Endpoint) {
        trace!(from = %source, len = frame.len(), "ignoring control frame on receive path");
        let _ = (frame, source);
    }

    /// Attaches a buffer the conductor allocated and sends the first status
    /// message so a publisher waiting for window can start.
    ///
    /// # Errors
    ///
    /// [`ReceiverError::ChannelNotFound`] or [`ReceiverError::SessionNotFound`]
    /// if the request this answers no longer matches any state; nothing is
    /// changed. [`ReceiverError::Transport`] if the status message cannot be
    /// sent. The buffer stays attached and the next data frame for the term
    /// sends the status message again.
    pub fn attach_buffer_state(
        &mut self,
        channel_id: ChannelId,
        session_id: SessionId,
        term_id: TermId,
        buffer: TermBufferRef,
    ) -> Result<usize, ReceiverError> {
        debug_assert_eq!(buffer.term_id(), term_id, "buffer allocated for another term");

        let session = Self::session_in(&mut self.registry, channel_id, session_id)?;
        session.attach_term_buffer(term_id, buffer);
        debug!(
            channel = %channel_id,
            session = %session_id,
            term = %term_id,
            "term buffer attached"
        );

        self.send_initial_status(channel_id, session_id, term_id)
    }

    /// Feeds a receive-tracking update to the session's strategy and reports
    /// the resulting window to the publisher.
    ///
    /// # Errors
    ///
    /// As [`attach_buffer_state`](Self::attach_buffer_state).
    pub fn on_track_rebuild(
        &mut self,
        channel_id: ChannelId,
        session_id: SessionId,
        term_id: TermId,
        now_ns: u64,
        rebuild: &TrackRebuild,
    ) -> Result<CcOutcome, ReceiverError> {
        let session = Self::session_in(&mut self.registry, channel_id, session_id)?;
        let outcome = session
            .congestion_control_mut()
            .on_track_rebuild(now_ns, rebuild);
        let source = session.source_address();

        // Sequence numbers are 32 bits on the wire and wrap with the position.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let highest_contiguous_sequence_number = rebuild.new_consumption_position as u32;

        self.send_status_message(
            &StatusMessage {
                session_id,
                channel_id,
                term_id,
                highest_contiguous_sequence_number,
                receiver_window: outcome.window_length(),
            },
            source,
        )?;
        Ok(outcome)
    }

    /// Whether the session's strategy wants an RTT sample. Unknown sessions
    /// never do.
    #[must_use]
    pub fn should_measure_rtt(
        &self,
        channel_id: ChannelId,
        session_id: SessionId,
        now_ns: u64,
    ) -> bool {
        self.registry
            .get(channel_id)
            .and_then(|channel| channel.session(session_id))
            .is_some_and(|session| session.congestion_control().should_measure_rtt(now_ns))
    }

    /// Passes an RTT sample to the session's strategy. Unknown sessions are ignored.
    pub fn on_rtt_measurement(
        &mut self,
        channel_id: ChannelId,
        session_id: SessionId,
        now_ns: u64,
        rtt_ns: u64,
    ) {
        if let Some(session) = self
            .registry
            .get_mut(channel_id)
            .and_then(|channel| channel.session_mut(session_id))
        {
            let source = session.source_address();
            session
                .congestion_control_mut()
                .on_rtt_measurement(now_ns, rtt_ns, source);
        }
    }

    /// Sends `buf` to the publisher of `session_id` on `channel_id`.
    ///
    /// Returns `Ok(0)` without sending when either is unknown.
    ///
    /// # Errors
    ///
    /// [`ReceiverError::Transport`] on send failure.
    pub fn send_to_session(
        &self,
        buf: &[u8],
        session_id: SessionId,
        channel_id: ChannelId,
    ) -> Result<usize, ReceiverError> {
        let Some(source) = self
            .registry
            .get(channel_id)
            .and_then(|channel| channel.session(session_id))
            .map(Session::source_address)
        else {
            return Ok(0);
        };
        self.send_to(buf, source)
    }

    /// # Errors
    ///
    /// [`ReceiverError::Transport`] on send failure.
    pub fn send_to(&self, buf: &[u8], dest: Endpoint) -> Result<usize, ReceiverError> {
        Ok(self.transport.send_to(buf, dest)?)
    }

    /// Releases the transport. Consumes the dispatcher so it happens once.
    pub fn close(self) {
        info!(destination = %self.destination, "closing destination");
        self.transport.close();
    }

    fn session_in(
        registry: &mut ChannelRegistry,
        channel_id: ChannelId,
        session_id: SessionId,
    ) -> Result<&mut Session, ReceiverError> {
        registry
            .get_mut(channel_id)
            .ok_or(ReceiverError::ChannelNotFound(channel_id))?
            .session_mut(session_id)
            .ok_or(ReceiverError::SessionNotFound {
                channel: channel_id,
                session: session_id,
            })
    }

    /// Sends the status message that opens `term_id`, carrying the
    /// strategy's initial window. The term stays owed until a send succeeds.
    fn send_initial_status(
        &mut self,
        channel_id: ChannelId,
        session_id: SessionId,
        term_id: TermId,
    ) -> Result<usize, ReceiverError> {
        let session = Self::session_in(&mut self.registry, channel_id, session_id)?;
        let window = session.congestion_control().initial_window_length();
        let source = session.source_address();
        session.owe_status(term_id);

        let sent = self.send_status_message(
            &StatusMessage {
                session_id,
                channel_id,
                term_id,
                highest_contiguous_sequence_number: 0,
                receiver_window: window,
            },
            source,
        )?;
        if let Ok(session) = Self::session_in(&mut self.registry, channel_id, session_id) {
            session.settle_status(term_id);
        }
        Ok(sent)
    }

    fn send_status_message(
        &mut self,
        message: &StatusMessage,
        dest: Endpoint,
    ) -> Result<usize, ReceiverError> {
        message.encode_into(&mut self.send_buffer);
        trace!(
            to = %dest,
            session = %message.session_id,
            channel = %message.channel_id,
            term = %message.term_id,
            window = message.receiver_window,
            "sending status message"
        );
        Ok(self.transport.send_to(&self.send_buffer, dest)?)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::io;
    use std::rc::Rc;
    use std::sync::Arc;

    use super::*;
    use crate::protocol::HDR_TYPE_SM;
    use crate::protocol::status::flags_and_length;
    use crate::receiver::commands::AdminCommand;
    use crate::receiver::term::TermBuffer;

    type Sent = Rc<RefCell<Vec<(Vec<u8>, Endpoint)>>>;
    type Requests = Rc<RefCell<Vec<AdminCommand>>>;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Sent,
        /// Sends left to fail before sends succeed again.
        failures: Cell<usize>,
    }

    impl Transport for RecordingTransport {
        fn send_to(&self, buf: &[u8], dest: Endpoint) -> io::Result<usize> {
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
            }
            self.sent.borrow_mut().push((buf.to_vec(), dest));
            Ok(buf.len())
        }
    }

    #[derive(Default)]
    struct RecordingAdmin {
        requests: Requests,
        refuse: bool,
    }

    impl AdminCommandChannel for RecordingAdmin {
        fn request_create_receive_term_buffer(
            &mut self,
            destination: Endpoint,
            session: SessionId,
            channel: ChannelId,
            term: TermId,
        ) -> bool {
            if self.refuse {
                return false;
            }
            self.requests
                .borrow_mut()
                .push(AdminCommand::CreateReceiveTermBuffer {
                    destination,
                    session,
                    channel,
                    term,
                });
            true
        }

        fn request_release_channel(&mut self, destination: Endpoint, channel: ChannelId) -> bool {
            self.requests.borrow_mut().push(AdminCommand::ReleaseChannel {
                destination,
                channel,
            });
            true
        }
    }

    const DEST: Endpoint = Endpoint::new_v4(127, 0, 0, 1, 40_100);
    const SOURCE_A: Endpoint = Endpoint::new_v4(10, 0, 0, 1, 50_000);
    const TERM_LENGTH: usize = 64 * 1024;

    struct Fixture {
        dispatcher: FrameDispatcher<RecordingTransport, RecordingAdmin>,
        sent: Sent,
        requests: Requests,
    }

    fn fixture() -> Fixture {
        let transport = RecordingTransport::default();
        let admin = RecordingAdmin::default();
        let sent = Rc::clone(&transport.sent);
        let requests = Rc::clone(&admin.requests);
        let config = ReceiverConfig {
            term_length: TERM_LENGTH,
            initial_window_length: 128 * 1024,
            ..ReceiverConfig::default()
        };
        Fixture {
            dispatcher: FrameDispatcher::new(DEST, transport, admin, &config),
            sent,
            requests,
        }
    }

    fn data(session: u32, channel: u32, term: u32) -> DataHeader {
        DataHeader::new(
            SessionId::new(session),
            ChannelId::new(channel),
            TermId::new(term),
            0,
        )
    }

    fn request(session: u32, channel: u32, term: u32) -> AdminCommand {
        AdminCommand::CreateReceiveTermBuffer {
            destination: DEST,
            session: SessionId::new(session),
            channel: ChannelId::new(channel),
            term: TermId::new(term),
        }
    }

    fn session(f: &Fixture, channel: u32, session: u32) -> Option<&Session> {
        f.dispatcher
            .registry()
            .get(ChannelId::new(channel))
            .and_then(|c| c.session(SessionId::new(session)))
    }

    #[test]
    fn uninteresting_channel_is_dropped() {
        let mut f = fixture();
        f.dispatcher.on_data_frame(&data(42, 7, 1), SOURCE_A);

        assert!(f.requests.borrow().is_empty());
        assert_eq!(f.dispatcher.channel_count(), 0);
        assert!(f.sent.borrow().is_empty());
    }

    #[test]
    fn first_frame_creates_session_and_requests_buffer() {
        let mut f = fixture();
        f.dispatcher.add_channels(&[ChannelId::new(7)]);
        f.dispatcher.on_data_frame(&data(42, 7, 1), SOURCE_A);

        assert_eq!(*f.requests.borrow(), vec![request(42, 7, 1)]);
        let s = session(&f, 7, 42).expect("session created");
        assert_eq!(s.source_address(), SOURCE_A);
        assert!(f.sent.borrow().is_empty());
    }

    #[test]
    fn repeat_frame_before_attach_does_not_duplicate() {
        let mut f = fixture();
        f.dispatcher.add_channels(&[ChannelId::new(7)]);
        f.dispatcher.on_data_frame(&data(42, 7, 1), SOURCE_A);
        f.dispatcher
            .on_data_frame(&data(42, 7, 1), Endpoint::localhost(1));

        assert_eq!(f.requests.borrow().len(), 1);
        let channel = f.dispatcher.registry().get(ChannelId::new(7)).unwrap();
        assert_eq!(channel.session_count(), 1);
        // The first source wins.
        assert_eq!(session(&f, 7, 42).unwrap().source_address(), SOURCE_A);
    }

    #[test]
    fn new_term_on_known_session_requests_again() {
        let mut f = fixture();
        f.dispatcher.add_channels(&[ChannelId::new(7)]);
        f.dispatcher.on_data_frame(&data(42, 7, 1), SOURCE_A);
        f.dispatcher.on_data_frame(&data(42, 7, 2), SOURCE_A);

        assert_eq!(
            *f.requests.borrow(),
            vec![request(42, 7, 1), request(42, 7, 2)]
        );
    }

    #[test]
    fn refused_request_is_retried_by_next_frame() {
        let mut f = fixture();
        f.dispatcher.add_channels(&[ChannelId::new(7)]);
        f.dispatcher.admin.refuse = true;
        f.dispatcher.on_data_frame(&data(42, 7, 1), SOURCE_A);
        assert!(f.requests.borrow().is_empty());
        assert!(!session(&f, 7, 42).unwrap().is_pending(TermId::new(1)));

        f.dispatcher.admin.refuse = false;
        f.dispatcher.on_data_frame(&data(42, 7, 1), SOURCE_A);
        assert_eq!(*f.requests.borrow(), vec![request(42, 7, 1)]);
    }

    #[test]
    fn attach_sends_initial_status_message() {
        let mut f = fixture();
        f.dispatcher.add_channels(&[ChannelId::new(7)]);
        f.dispatcher.on_data_frame(&data(42, 7, 1), SOURCE_A);

        let buffer = TermBuffer::allocate(TermId::new(1), TERM_LENGTH);
        let sent_len = f
            .dispatcher
            .attach_buffer_state(
                ChannelId::new(7),
                SessionId::new(42),
                TermId::new(1),
                Arc::clone(&buffer),
            )
            .unwrap();
        assert_eq!(sent_len, STATUS_MESSAGE_LENGTH);

        assert!(session(&f, 7, 42).unwrap().holds(&buffer));

        let sent = f.sent.borrow();
        assert_eq!(sent.len(), 1);
        let (bytes, to) = &sent[0];
        assert_eq!(*to, SOURCE_A);
        assert_eq!(bytes.len(), STATUS_MESSAGE_LENGTH);

        let sm = StatusMessage::decode(bytes).unwrap();
        assert_eq!(sm.session_id, SessionId::new(42));
        assert_eq!(sm.channel_id, ChannelId::new(7));
        assert_eq!(sm.term_id, TermId::new(1));
        assert_eq!(sm.highest_contiguous_sequence_number, 0);
        // min(64 KiB / 2, 128 KiB)
        assert_eq!(sm.receiver_window, 32 * 1024);

        let fixed: &[u8; STATUS_MESSAGE_LENGTH] = bytes.as_slice().try_into().unwrap();
        assert_eq!(flags_and_length(fixed), (0, STATUS_MESSAGE_LENGTH as u32));
        assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), HDR_TYPE_SM);
    }

    #[test]
    fn attached_term_takes_the_hot_path() {
        let mut f = fixture();
        f.dispatcher.add_channels(&[ChannelId::new(7)]);
        f.dispatcher.on_data_frame(&data(42, 7, 1), SOURCE_A);
        f.dispatcher
            .attach_buffer_state(
                ChannelId::new(7),
                SessionId::new(42),
                TermId::new(1),
                TermBuffer::allocate(TermId::new(1), TERM_LENGTH),
            )
            .unwrap();

        f.dispatcher.on_data_frame(&data(42, 7, 1), SOURCE_A);
        assert_eq!(f.requests.borrow().len(), 1);
        assert_eq!(f.sent.borrow().len(), 1);
    }

    #[test]
    fn attach_to_unknown_channel_is_fatal() {
        let mut f = fixture();
        let err = f
            .dispatcher
            .attach_buffer_state(
                ChannelId::new(7),
                SessionId::new(42),
                TermId::new(1),
                TermBuffer::allocate(TermId::new(1), 64),
            )
            .unwrap_err();
        assert!(matches!(err, ReceiverError::ChannelNotFound(c) if c == ChannelId::new(7)));
        assert!(err.is_state_inconsistency());
        assert!(f.sent.borrow().is_empty());
    }

    #[test]
    fn attach_to_unknown_session_is_fatal_and_mutates_nothing() {
        let mut f = fixture();
        f.dispatcher.add_channels(&[ChannelId::new(7)]);
        let err = f
            .dispatcher
            .attach_buffer_state(
                ChannelId::new(7),
                SessionId::new(42),
                TermId::new(1),
                TermBuffer::allocate(TermId::new(1), 64),
            )
            .unwrap_err();
        assert!(matches!(err, ReceiverError::SessionNotFound { .. }));
        assert_eq!(
            f.dispatcher.registry().get(ChannelId::new(7)).unwrap().session_count(),
            0
        );
        assert!(f.sent.borrow().is_empty());
    }

    #[test]
    fn late_attach_after_channel_removal_is_fatal() {
        let mut f = fixture();
        f.dispatcher.add_channels(&[ChannelId::new(7)]);
        f.dispatcher.on_data_frame(&data(42, 7, 1), SOURCE_A);
        f.dispatcher.remove_channels(&[ChannelId::new(7)]).unwrap();

        let err = f
            .dispatcher
            .attach_buffer_state(
                ChannelId::new(7),
                SessionId::new(42),
                TermId::new(1),
                TermBuffer::allocate(TermId::new(1), 64),
            )
            .unwrap_err();
        assert!(err.is_state_inconsistency());
    }

    #[test]
    fn transport_failure_surfaces_from_attach() {
        let mut f = fixture();
        f.dispatcher.transport.failures.set(1);
        f.dispatcher.add_channels(&[ChannelId::new(7)]);
        f.dispatcher.on_data_frame(&data(42, 7, 1), SOURCE_A);

        let err = f
            .dispatcher
            .attach_buffer_state(
                ChannelId::new(7),
                SessionId::new(42),
                TermId::new(1),
                TermBuffer::allocate(TermId::new(1), 64),
            )
            .unwrap_err();
        assert!(matches!(err, ReceiverError::Transport(ref e) if e.kind() == io::ErrorKind::ConnectionRefused));
    }

    #[test]
    fn failed_initial_status_is_resent_once_by_next_frame() {
        let mut f = fixture();
        f.dispatcher.transport.failures.set(1);
        f.dispatcher.add_channels(&[ChannelId::new(7)]);
        f.dispatcher.on_data_frame(&data(42, 7, 1), SOURCE_A);

        assert!(
            f.dispatcher
                .attach_buffer_state(
                    ChannelId::new(7),
                    SessionId::new(42),
                    TermId::new(1),
                    TermBuffer::allocate(TermId::new(1), TERM_LENGTH),
                )
                .is_err()
        );
        assert!(f.sent.borrow().is_empty());
        assert!(session(&f, 7, 42).unwrap().owes_status(TermId::new(1)));

        for _ in 0..100 {
            f.dispatcher.on_data_frame(&data(42, 7, 1), SOURCE_A);
        }

        let sent = f.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(f.requests.borrow().len(), 1);
        let sm = StatusMessage::decode(&sent[0].0).unwrap();
        assert_eq!(sm.term_id, TermId::new(1));
        assert_eq!(sm.receiver_window, 32 * 1024);
        assert_eq!(sent[0].1, SOURCE_A);
        drop(sent);
        assert!(!session(&f, 7, 42).unwrap().owes_status(TermId::new(1)));
    }

    #[test]
    fn advancing_terms_keep_bounded_state() {
        let mut f = fixture();
        f.dispatcher.add_channels(&[ChannelId::new(7)]);
        for term in 0..200 {
            f.dispatcher.on_data_frame(&data(42, 7, term), SOURCE_A);
            f.dispatcher
                .attach_buffer_state(
                    ChannelId::new(7),
                    SessionId::new(42),
                    TermId::new(term),
                    TermBuffer::allocate(TermId::new(term), 64),
                )
                .unwrap();
        }

        let s = session(&f, 7, 42).unwrap();
        assert_eq!(s.attached_terms(), 3);
        assert!(s.term_buffer(TermId::new(199)).is_some());
        assert!(s.term_buffer(TermId::new(0)).is_none());
        assert_eq!(f.requests.borrow().len(), 200);
        assert_eq!(f.sent.borrow().len(), 200);
    }

    #[test]
    fn frame_for_rotated_out_term_is_dropped() {
        let mut f = fixture();
        f.dispatcher.add_channels(&[ChannelId::new(7)]);
        for term in 10..13 {
            f.dispatcher.on_data_frame(&data(42, 7, term), SOURCE_A);
            f.dispatcher
                .attach_buffer_state(
                    ChannelId::new(7),
                    SessionId::new(42),
                    TermId::new(term),
                    TermBuffer::allocate(TermId::new(term), 64),
                )
                .unwrap();
        }
        f.requests.borrow_mut().clear();

        f.dispatcher.on_data_frame(&data(42, 7, 5), SOURCE_A);
        assert!(f.requests.borrow().is_empty());

        f.dispatcher.on_data_frame(&data(42, 7, 13), SOURCE_A);
        assert_eq!(*f.requests.borrow(), vec![request(42, 7, 13)]);
    }

    #[test]
    fn last_interest_removal_releases_channel_buffers() {
        let mut f = fixture();
        f.dispatcher.add_channels(&[ChannelId::new(7), ChannelId::new(7)]);

        f.dispatcher.remove_channels(&[ChannelId::new(7)]).unwrap();
        assert!(f.requests.borrow().is_empty());

        f.dispatcher.remove_channels(&[ChannelId::new(7)]).unwrap();
        assert_eq!(
            *f.requests.borrow(),
            vec![AdminCommand::ReleaseChannel {
                destination: DEST,
                channel: ChannelId::new(7),
            }]
        );
    }

    #[test]
    fn send_to_unknown_session_is_a_no_op() {
        let mut f = fixture();
        assert_eq!(
            f.dispatcher
                .send_to_session(b"x", SessionId::new(1), ChannelId::new(1))
                .unwrap(),
            0
        );

        f.dispatcher.add_channels(&[ChannelId::new(1)]);
        assert_eq!(
            f.dispatcher
                .send_to_session(b"x", SessionId::new(1), ChannelId::new(1))
                .unwrap(),
            0
        );
        assert!(f.sent.borrow().is_empty());
    }

    #[test]
    fn send_to_known_session_uses_recorded_source() {
        let mut f = fixture();
        f.dispatcher.add_channels(&[ChannelId::new(3)]);
        f.dispatcher.on_data_frame(&data(9, 3, 0), SOURCE_A);

        let n = f
            .dispatcher
            .send_to_session(b"nak", SessionId::new(9), ChannelId::new(3))
            .unwrap();
        assert_eq!(n, 3);
        assert_eq!(f.sent.borrow()[0], (b"nak".to_vec(), SOURCE_A));
    }

    #[test]
    fn track_rebuild_reports_strategy_window() {
        let mut f = fixture();
        f.dispatcher.add_channels(&[ChannelId::new(7)]);
        f.dispatcher.on_data_frame(&data(42, 7, 1), SOURCE_A);

        let rebuild = TrackRebuild {
            new_consumption_position: 2048,
            loss_occurred: true,
            ..TrackRebuild::default()
        };
        let outcome = f
            .dispatcher
            .on_track_rebuild(ChannelId::new(7), SessionId::new(42), TermId::new(1), 1, &rebuild)
            .unwrap();
        assert_eq!(outcome, CcOutcome::new(32 * 1024, false));

        let sm = StatusMessage::decode(&f.sent.borrow()[0].0).unwrap();
        assert_eq!(sm.highest_contiguous_sequence_number, 2048);
        assert_eq!(sm.receiver_window, 32 * 1024);
    }

    #[test]
    fn track_rebuild_for_unknown_session_fails() {
        let mut f = fixture();
        let err = f
            .dispatcher
            .on_track_rebuild(
                ChannelId::new(1),
                SessionId::new(1),
                TermId::new(0),
                0,
                &TrackRebuild::default(),
            )
            .unwrap_err();
        assert!(err.is_state_inconsistency());
    }

    #[test]
    fn rtt_queries_on_static_window() {
        let mut f = fixture();
        f.dispatcher.add_channels(&[ChannelId::new(7)]);
        f.dispatcher.on_data_frame(&data(42, 7, 1), SOURCE_A);

        assert!(!f.dispatcher.should_measure_rtt(ChannelId::new(7), SessionId::new(42), 0));
        assert!(!f.dispatcher.should_measure_rtt(ChannelId::new(8), SessionId::new(42), 0));
        f.dispatcher
            .on_rtt_measurement(ChannelId::new(7), SessionId::new(42), 10, 25_000);
        f.dispatcher
            .on_rtt_measurement(ChannelId::new(8), SessionId::new(1), 10, 25_000);
    }

    #[test]
    fn control_frames_are_ignored() {
        let mut f = fixture();
        f.dispatcher.add_channels(&[ChannelId::new(7)]);
        let mut sm = [0u8; STATUS_MESSAGE_LENGTH];
        StatusMessage {
            session_id: SessionId::new(42),
            channel_id: ChannelId::new(7),
            term_id: TermId::new(1),
            highest_contiguous_sequence_number: 0,
            receiver_window: 1,
        }
        .encode_into(&mut sm);

        f.dispatcher.on_control_frame(&sm, SOURCE_A);
        assert!(session(&f, 7, 42).is_none());
        assert!(f.requests.borrow().is_empty());
        assert!(f.sent.borrow().is_empty());
    }

    #[test]
    fn remove_unregistered_reports_id() {
        let mut f = fixture();
        let err = f.dispatcher.remove_channels(&[ChannelId::new(99)]).unwrap_err();
        assert!(matches!(err, ReceiverError::NotRegistered(c) if c == ChannelId::new(99)));
        assert_eq!(f.dispatcher.channel_count(), 0);
    }

    #[test]
    fn snapshot_counts_sessions() {
        let mut f = fixture();
        f.dispatcher.add_channels(&[ChannelId::new(7), ChannelId::new(7)]);
        f.dispatcher.on_data_frame(&data(1, 7, 0), SOURCE_A);
        f.dispatcher.on_data_frame(&data(2, 7, 0), SOURCE_A);

        assert_eq!(
            f.dispatcher.channel_interest_snapshot(),
            vec![ChannelInterest {
                channel: ChannelId::new(7),
                references: 2,
                sessions: 2,
            }]
        );
        assert_eq!(f.dispatcher.destination(), DEST);
    }
}
