//! Detection mailbox.
//!
//! Single-slot, overwrite-on-write hand-off between the detector callback
//! (worker thread) and the control loop (main thread).
//!
//! - `publish` replaces any batch the control loop has not taken yet.
//! - `take` moves the pending batch out and leaves the slot empty.
//! - Every published batch with at least `LOCK_MIN_DETECTIONS` detections bumps
//!   the lock streak. The streak never decreases.
//!
//! Slot and counters sit behind one mutex, so a reader never sees a half-written
//! batch and never sees a batch that was already taken.

use std::sync::{Mutex, MutexGuard};

use crate::detect::DetectionBatch;

/// Detections a batch needs to count towards the lock streak.
pub const LOCK_MIN_DETECTIONS: usize = 2;

#[derive(Debug, Default)]
struct Slot {
    pending: Option<DetectionBatch>,
    lock_streak: u64,
    stats: MailboxStats,
}

/// Mailbox counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MailboxStats {
    pub published: u64,
    pub taken: u64,
    /// Batches replaced before the control loop took them.
    pub overwritten: u64,
}

/// Single-slot mailbox for the most recent detection batch.
#[derive(Debug, Default)]
pub struct DetectionMailbox {
    slot: Mutex<Slot>,
}

impl DetectionMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    // The slot holds plain data that is always left consistent, so a panic on
    // the other side does not invalidate it.
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store `batch`, replacing any batch not yet taken.
    pub fn publish(&self, batch: DetectionBatch) {
        let mut slot = self.lock();
        if batch.len() >= LOCK_MIN_DETECTIONS {
            slot.lock_streak += 1;
        }
        slot.stats.published += 1;
        if slot.pending.replace(batch).is_some() {
            slot.stats.overwritten += 1;
        }
    }

    /// Take the pending batch, if any, leaving the slot empty.
    pub fn take(&self) -> Option<DetectionBatch> {
        let mut slot = self.lock();
        let batch = slot.pending.take();
        if batch.is_some() {
            slot.stats.taken += 1;
        }
        batch
    }

    /// Count of published batches that carried at least two detections.
    pub fn lock_streak(&self) -> u64 {
        self.lock().lock_streak
    }

    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    pub fn stats(&self) -> MailboxStats {
        self.lock().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection};
    use std::sync::Arc;
    use std::thread;

    fn batch(n: usize, ts: u64) -> DetectionBatch {
        let detections = (0..n)
            .map(|i| Detection::new(BoundingBox::new(i as u32 * 10, 0, 5, 5), 0.9, "obj"))
            .collect();
        DetectionBatch::new(detections, ts)
    }

    #[test]
    fn take_on_empty_mailbox_is_none() {
        let mailbox = DetectionMailbox::new();
        assert!(mailbox.take().is_none());
        assert!(!mailbox.has_pending());
    }

    #[test]
    fn publish_overwrites_unconsumed_batch() {
        let mailbox = DetectionMailbox::new();
        mailbox.publish(batch(1, 1));
        mailbox.publish(batch(1, 2));

        let taken = mailbox.take().expect("batch");
        assert_eq!(taken.timestamp_ms, 2);
        assert!(mailbox.take().is_none());
        assert_eq!(mailbox.stats().overwritten, 1);
    }

    #[test]
    fn take_drains_slot() {
        let mailbox = DetectionMailbox::new();
        mailbox.publish(batch(3, 7));
        assert!(mailbox.has_pending());
        assert_eq!(mailbox.take().map(|b| b.len()), Some(3));
        assert!(mailbox.take().is_none());

        let stats = mailbox.stats();
        assert_eq!(stats.published, 1);
        assert_eq!(stats.taken, 1);
    }

    #[test]
    fn lock_streak_counts_multi_object_batches_only() {
        let mailbox = DetectionMailbox::new();
        let sizes = [0usize, 2, 1, 3, 0, 1, 2];
        let mut previous = 0;
        for (i, n) in sizes.iter().enumerate() {
            mailbox.publish(batch(*n, i as u64));
            let streak = mailbox.lock_streak();
            assert!(streak >= previous, "streak must never decrease");
            let expected_step = u64::from(*n >= LOCK_MIN_DETECTIONS);
            assert_eq!(streak - previous, expected_step);
            previous = streak;
        }
        assert_eq!(mailbox.lock_streak(), 3);

        // Taking does not reset the streak either.
        mailbox.take();
        assert_eq!(mailbox.lock_streak(), 3);
    }

    #[test]
    fn concurrent_publish_and_take_never_duplicates() {
        let mailbox = Arc::new(DetectionMailbox::new());
        let producer = {
            let mailbox = Arc::clone(&mailbox);
            thread::spawn(move || {
                for ts in 1..=2_000u64 {
                    mailbox.publish(batch(2, ts));
                }
            })
        };

        let mut seen = Vec::new();
        while !producer.is_finished() || mailbox.has_pending() {
            if let Some(b) = mailbox.take() {
                assert_eq!(b.len(), 2, "batch must never be torn");
                seen.push(b.timestamp_ms);
            }
        }
        producer.join().unwrap();
        if let Some(b) = mailbox.take() {
            seen.push(b.timestamp_ms);
        }

        assert!(seen.windows(2).all(|w| w[0] < w[1]), "no batch delivered twice");
        assert_eq!(mailbox.lock_streak(), 2_000);
        let stats = mailbox.stats();
        assert_eq!(stats.taken as usize, seen.len());
        assert_eq!(stats.taken + stats.overwritten, stats.published);
    }
}
