//! Receiver-side congestion control.
//!
//! Every session owns one strategy. The dispatcher asks it for the window to
//! advertise in status messages and feeds it receive-progress signals; the
//! strategy itself does no I/O.
//!
//! New strategies implement [`CongestionControl`] and get a variant in
//! [`CongestionControlKind`]. The dispatcher only ever sees the trait object.

use crate::net::Endpoint;
use crate::types::{ChannelId, SessionId};

use super::config::ConfigError;

/// Result of a flow-control decision: the window to advertise and whether
/// the decision was taken because of loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CcOutcome {
    window_length: u32,
    loss_occurred: bool,
}

impl CcOutcome {
    const LOSS_BIT: u64 = 1 << 32;

    #[must_use]
    pub const fn new(window_length: u32, loss_occurred: bool) -> Self {
        Self {
            window_length,
            loss_occurred,
        }
    }

    #[must_use]
    pub const fn window_length(self) -> u32 {
        self.window_length
    }

    #[must_use]
    pub const fn loss_occurred(self) -> bool {
        self.loss_occurred
    }

    /// Packs into one word: window in the low 32 bits, loss flag at bit 32.
    #[must_use]
    pub const fn pack(self) -> u64 {
        let loss = if self.loss_occurred { Self::LOSS_BIT } else { 0 };
        loss | self.window_length as u64
    }

    #[must_use]
    pub const fn unpack(packed: u64) -> Self {
        Self {
            window_length: packed as u32,
            loss_occurred: packed & Self::LOSS_BIT != 0,
        }
    }
}

/// Receive-progress signal passed to [`CongestionControl::on_track_rebuild`].
///
/// Positions are absolute stream positions in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackRebuild {
    pub new_consumption_position: i64,
    pub last_status_message_position: i64,
    pub high_water_mark_position: i64,
    pub rebuild_start_position: i64,
    pub rebuild_end_position: i64,
    pub loss_occurred: bool,
}

/// Capability set of a flow-control strategy.
///
/// Timestamps are monotonic nanoseconds supplied by the caller.
pub trait CongestionControl: Send {
    /// Whether the caller should take an RTT measurement now.
    fn should_measure_rtt(&self, now_ns: u64) -> bool;

    /// Feeds back a measured round trip.
    fn on_rtt_measurement(&mut self, now_ns: u64, rtt_ns: u64, source: Endpoint);

    /// Called whenever receive tracking moves, including on loss.
    fn on_track_rebuild(&mut self, now_ns: u64, rebuild: &TrackRebuild) -> CcOutcome;

    /// Window to advertise before the first rebuild.
    fn initial_window_length(&self) -> u32;
}

/// Fixed window of half a term, capped by the configured initial window.
///
/// Ignores loss and RTT entirely.
#[derive(Debug, Clone, Copy)]
pub struct StaticWindowCongestionControl {
    outcome: CcOutcome,
}

impl StaticWindowCongestionControl {
    #[must_use]
    pub fn new(term_length: usize, initial_window_length: u32) -> Self {
        let half_term = u32::try_from(term_length / 2).unwrap_or(u32::MAX);
        Self {
            outcome: CcOutcome::new(half_term.min(initial_window_length), false),
        }
    }
}

impl CongestionControl for StaticWindowCongestionControl {
    fn should_measure_rtt(&self, _now_ns: u64) -> bool {
        false
    }

    fn on_rtt_measurement(&mut self, _now_ns: u64, _rtt_ns: u64, _source: Endpoint) {}

    fn on_track_rebuild(&mut self, _now_ns: u64, _rebuild: &TrackRebuild) -> CcOutcome {
        self.outcome
    }

    fn initial_window_length(&self) -> u32 {
        self.outcome.window_length()
    }
}

/// Selects the strategy constructed for each new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CongestionControlKind {
    #[default]
    StaticWindow,
}

impl CongestionControlKind {
    /// Builds the strategy for one session of one channel.
    #[must_use]
    pub fn build(
        self,
        _channel: ChannelId,
        _session: SessionId,
        term_length: usize,
        initial_window_length: u32,
    ) -> Box<dyn CongestionControl> {
        match self {
            Self::StaticWindow => Box::new(StaticWindowCongestionControl::new(
                term_length,
                initial_window_length,
            )),
        }
    }
}

impl std::str::FromStr for CongestionControlKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" | "static-window" => Ok(Self::StaticWindow),
            other => Err(ConfigError::UnknownCongestionControl(other.to_owned())),
        }
    }
}
