//! Reference-counted channel interest.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::ChannelId;

use super::channel::Channel;
use super::error::ReceiverError;

/// Point-in-time view of one registered channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInterest {
    pub channel: ChannelId,
    pub references: usize,
    pub sessions: usize,
}

/// Channel id → [`Channel`], owned by one dispatcher.
///
/// A channel is present exactly while its reference count is positive.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: HashMap<ChannelId, Channel>,
}

impl ChannelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one reference per occurrence, creating channels as needed.
    pub fn add_interest(&mut self, channel_ids: &[ChannelId]) {
        for &channel_id in channel_ids {
            self.channels
                .entry(channel_id)
                .and_modify(|channel| {
                    channel.increment_reference();
                })
                .or_insert_with(|| Channel::new(channel_id));
        }
    }

    /// Drops one reference per occurrence, removing channels that reach zero.
    /// Returns the channels removed.
    ///
    /// The batch is checked before anything changes, so a failure leaves the
    /// registry as it was.
    ///
    /// # Errors
    ///
    /// [`ReceiverError::NotRegistered`] naming the first occurrence that has no
    /// reference left to release.
    pub fn remove_interest(
        &mut self,
        channel_ids: &[ChannelId],
    ) -> Result<Vec<ChannelId>, ReceiverError> {
        let mut releases: HashMap<ChannelId, usize> = HashMap::new();
        for &channel_id in channel_ids {
            let wanted = releases.entry(channel_id).or_insert(0);
            *wanted += 1;
            let held = self.channels.get(&channel_id).map_or(0, Channel::references);
            if *wanted > held {
                return Err(ReceiverError::NotRegistered(channel_id));
            }
        }

        let mut removed = Vec::new();
        for &channel_id in channel_ids {
            if let Some(channel) = self.channels.get_mut(&channel_id)
                && channel.decrement_reference() == 0
            {
                self.channels.remove(&channel_id);
                removed.push(channel_id);
            }
        }
        Ok(removed)
    }

    #[must_use]
    pub fn get(&self, channel_id: ChannelId) -> Option<&Channel> {
        self.channels.get(&channel_id)
    }

    pub fn get_mut(&mut self, channel_id: ChannelId) -> Option<&mut Channel> {
        self.channels.get_mut(&channel_id)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Registered channels ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ChannelInterest> {
        let mut interests: Vec<_> = self
            .channels
            .values()
            .map(|channel| ChannelInterest {
                channel: channel.channel_id(),
                references: channel.references(),
                sessions: channel.session_count(),
            })
            .collect();
        interests.sort_unstable_by_key(|interest| interest.channel);
        interests
    }
}
