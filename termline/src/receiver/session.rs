//! Per-publisher receive state.

use std::collections::HashSet;
use std::sync::Arc;

use crate::net::Endpoint;
use crate::types::TermId;

use super::congestion::CongestionControl;
use super::term::{TermBufferRef, TermWindow};

/// One remote publisher sending on a channel.
///
/// Created on the first data frame carrying an unseen session id and kept
/// for the life of the channel. Only the newest few terms stay attached.
pub struct Session {
    /// Where the first frame came from; status messages go back here.
    source: Endpoint,
    terms: TermWindow,
    /// Terms with a creation request in flight and no buffer yet.
    pending: HashSet<TermId>,
    /// Attached terms whose initial status message has not gone out.
    owed_status: HashSet<TermId>,
    congestion_control: Box<dyn CongestionControl>,
}

impl Session {
    #[must_use]
    pub fn new(source: Endpoint, congestion_control: Box<dyn CongestionControl>) -> Self {
        Self {
            source,
            terms: TermWindow::new(),
            pending: HashSet::new(),
            owed_status: HashSet::new(),
            congestion_control,
        }
    }

    #[must_use]
    pub const fn source_address(&self) -> Endpoint {
        self.source
    }

    #[must_use]
    pub fn term_buffer(&self, term_id: TermId) -> Option<&TermBufferRef> {
        self.terms.get(term_id)
    }

    /// Stores `buffer` for `term_id`, replacing any earlier one.
    ///
    /// Terms rotate, so a term id can legitimately be attached again. Terms
    /// the window moves past are released along with their pending and owed
    /// markers.
    pub fn attach_term_buffer(&mut self, term_id: TermId, buffer: TermBufferRef) {
        debug_assert!(
            buffer.term_id() == term_id,
            "buffer allocated for another term"
        );
        self.pending.remove(&term_id);
        if self.terms.insert(term_id, buffer) > 0 {
            let terms = &self.terms;
            self.pending.retain(|&t| !terms.is_retired(t));
            self.owed_status.retain(|&t| !terms.is_retired(t));
        }
    }

    /// Whether frames for `term_id` arrive too late to be kept.
    #[must_use]
    pub fn is_retired(&self, term_id: TermId) -> bool {
        self.terms.is_retired(term_id)
    }

    /// Records a creation request for `term_id`.
    ///
    /// Returns `false` if one was already in flight.
    pub fn mark_pending(&mut self, term_id: TermId) -> bool {
        self.pending.insert(term_id)
    }

    #[must_use]
    pub fn is_pending(&self, term_id: TermId) -> bool {
        self.pending.contains(&term_id)
    }

    /// Records that the initial status message for `term_id` still has to
    /// be sent.
    pub fn owe_status(&mut self, term_id: TermId) {
        self.owed_status.insert(term_id);
    }

    #[must_use]
    pub fn owes_status(&self, term_id: TermId) -> bool {
        self.owed_status.contains(&term_id)
    }

    pub fn settle_status(&mut self, term_id: TermId) {
        self.owed_status.remove(&term_id);
    }

    #[cfg(test)]
    pub(crate) fn attached_terms(&self) -> usize {
        self.terms.len()
    }

    #[must_use]
    pub fn congestion_control(&self) -> &dyn CongestionControl {
        self.congestion_control.as_ref()
    }

    pub fn congestion_control_mut(&mut self) -> &mut dyn CongestionControl {
        self.congestion_control.as_mut()
    }

    /// Whether `buffer` is the one attached for its term.
    #[must_use]
    pub fn holds(&self, buffer: &TermBufferRef) -> bool {
        self.terms
            .get(buffer.term_id())
            .is_some_and(|held| Arc::ptr_eq(held, buffer))
    }
}
