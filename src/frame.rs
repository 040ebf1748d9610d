use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;

use crate::cancel::StopSignal;

#[derive(Default)]
struct Slot {
    frame: Bytes,
    sequence: u64,
}

/// Shared view of the most recent complete frame.
///
/// The reader replaces the frame handle in one step, readers on other
/// threads never see a partially written frame. Every replacement bumps a
/// sequence number that consumers running on their own cadence can compare
/// with the last one they have seen.
#[derive(Clone, Default)]
pub struct FrameHandle {
    slot: Arc<RwLock<Slot>>,
}

impl FrameHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest frame, empty until the first frame completes. The last frame
    /// stays readable after the stream stopped.
    pub fn current(&self) -> Bytes {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .frame
            .clone()
    }

    /// Sequence number of the latest frame, 0 before the first one.
    pub fn sequence(&self) -> u64 {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sequence
    }

    /// Latest frame and its sequence number, if newer than `last_seen`.
    pub fn latest_since(&self, last_seen: u64) -> Option<(u64, Bytes)> {
        let slot = self
            .slot
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        (slot.sequence > last_seen).then(|| (slot.sequence, slot.frame.clone()))
    }

    /// Make `frame` current unless `stop` has been raised. The check is
    /// made under the write lock, so a stopped reader can never overwrite
    /// a frame published by its successor.
    pub(crate) fn publish_unless_stopped(
        &self,
        stop: &StopSignal,
        frame: Bytes,
    ) -> Option<u64> {
        let mut slot = self
            .slot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if stop.is_stopped() {
            return None;
        }
        slot.frame = frame;
        slot.sequence += 1;
        Some(slot.sequence)
    }
}
