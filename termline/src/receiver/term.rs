//! Term buffer storage handed from the conductor to the dispatcher.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::types::TermId;

/// Terms retained per publisher stream: the newest attached term and the
/// two before it. Older terms are released as newer ones attach.
pub const PARTITION_COUNT: u32 = 3;

/// Storage for one term of one session.
///
/// Allocated and retained by the conductor. The dispatcher only ever holds
/// a [`TermBufferRef`] clone and never frees the storage itself.
pub struct TermBuffer {
    term_id: TermId,
    data: Box<[u8]>,
}

/// Shared, read-only handle to a [`TermBuffer`].
pub type TermBufferRef = Arc<TermBuffer>;

impl TermBuffer {
    /// Allocates a zero-filled term of `length` bytes.
    #[must_use]
    pub fn allocate(term_id: TermId, length: usize) -> TermBufferRef {
        Arc::new(Self {
            term_id,
            data: vec![0u8; length].into_boxed_slice(),
        })
    }

    #[must_use]
    pub const fn term_id(&self) -> TermId {
        self.term_id
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl fmt::Debug for TermBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TermBuffer")
            .field("term_id", &self.term_id)
            .field("capacity", &self.data.len())
            .finish()
    }
}

/// Signed distance from `from` to `to`, correct across term id wrap.
const fn term_distance(from: TermId, to: TermId) -> i32 {
    to.as_u32().wrapping_sub(from.as_u32()).cast_signed()
}

/// Term buffers of one publisher stream, bounded to [`PARTITION_COUNT`]
/// terms behind the newest one inserted.
#[derive(Debug, Default)]
pub struct TermWindow {
    newest: Option<TermId>,
    buffers: HashMap<TermId, TermBufferRef>,
}

impl TermWindow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, term_id: TermId) -> Option<&TermBufferRef> {
        self.buffers.get(&term_id)
    }

    /// Whether `term_id` is too far behind the newest term to be kept.
    #[must_use]
    pub fn is_retired(&self, term_id: TermId) -> bool {
        self.newest
            .is_some_and(|newest| term_distance(term_id, newest) >= PARTITION_COUNT.cast_signed())
    }

    /// Stores `buffer` for `term_id`, replacing any earlier one, and drops
    /// every buffer the window has moved past.
    ///
    /// Returns the number of buffers released.
    pub fn insert(&mut self, term_id: TermId, buffer: TermBufferRef) -> usize {
        if self
            .newest
            .is_none_or(|newest| term_distance(newest, term_id) > 0)
        {
            self.newest = Some(term_id);
        }
        self.buffers.insert(term_id, buffer);

        let before = self.buffers.len();
        let Some(newest) = self.newest else {
            return 0;
        };
        self.buffers
            .retain(|&held, _| term_distance(held, newest) < PARTITION_COUNT.cast_signed());
        before - self.buffers.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
