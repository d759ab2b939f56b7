//! Receive-side frame processing for a term-based reliable UDP transport.
//!
//! Publishers send DATA frames tagged with a session, channel and term. A
//! [`Receiver`] filters them by registered channel interest, tracks one
//! session per publisher, asks a conductor thread for a term buffer the first
//! time a term is seen, and answers each attached buffer with a status
//! message that carries the receiver window.
//!
//! Enable the `tracing` feature for structured logs; see [`init_tracing`].

pub mod net;
pub mod protocol;
pub mod receiver;
pub mod sync;
pub mod trace;
pub mod types;

pub use receiver::{
    ChannelInterest, CongestionControl, CongestionControlKind, FrameDispatcher, Receiver,
    ReceiverConfig, ReceiverError, StaticWindowCongestionControl,
};
pub use trace::init_tracing;
pub use types::{ChannelId, SessionId, TermId};
