//! Bounded in-flight gate for outbound publishes.
//!
//! Every publish claims a slot before it reaches the transport and releases it
//! when the transport reports completion. When all `limit` slots are taken the
//! publish is dropped and the gate raises "queue full"; once occupancy falls
//! below half the limit it raises "queue drained". Both signals are
//! edge-triggered: one of each per overflow episode, regardless of how many
//! publishes were dropped or completed in between.
//!
//! A limit of 0 disables the gate entirely. Disabling also starts a new slot
//! epoch: slots handed out before it are forgotten, and their late releases
//! are ignored so they cannot free slots claimed afterwards.
//!
//! ```text
//!            claim ok                     release, count < limit/2
//!   [idle] ----------> [counting] <--------------------------------+
//!                          | claim fails                            |
//!                          v                                        |
//!                   [backpressure] --- on_queue_full once ---> ... -+-- on_queue_drained once
//! ```

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use tracing::{debug, warn};

use crate::listener::{ListenerRegistry, QueueBackpressureListener};

/// Largest limit the gate counts up to.
const MAX_LIMIT: usize = u32::MAX as usize;

/// Epoch in the high half, occupied slots in the low half.
fn pack(epoch: u32, count: u32) -> u64 {
    (u64::from(epoch) << 32) | u64::from(count)
}

fn unpack(slots: u64) -> (u32, u32) {
    ((slots >> 32) as u32, slots as u32)
}

/// A claimed slot. Hand it back to `QueueGate::release` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    epoch: u32,
}

/// Outcome of asking the gate for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Gate disabled; the publish is not counted and needs no release.
    Unbounded,
    /// Slot claimed; release it when the publish completes.
    Accepted(Slot),
    /// Limit reached; the publish must be dropped.
    Rejected,
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted(_))
    }
}

pub struct QueueGate {
    limit: AtomicUsize,
    slots: AtomicU64,
    backpressure: AtomicBool,
    listeners: ListenerRegistry<dyn QueueBackpressureListener>,
}

impl Default for QueueGate {
    fn default() -> Self {
        Self::new(0)
    }
}

impl QueueGate {
    /// Limits above `u32::MAX` are clamped.
    pub fn new(limit: usize) -> Self {
        Self {
            limit: AtomicUsize::new(limit.min(MAX_LIMIT)),
            slots: AtomicU64::new(0),
            backpressure: AtomicBool::new(false),
            listeners: ListenerRegistry::new(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit.load(Ordering::Acquire)
    }

    pub fn pending(&self) -> usize {
        unpack(self.slots.load(Ordering::Acquire)).1 as usize
    }

    pub fn is_backpressure_active(&self) -> bool {
        self.backpressure.load(Ordering::Acquire)
    }

    pub fn register_listener(&self, listener: Arc<dyn QueueBackpressureListener>) {
        self.listeners.register(listener);
    }

    pub fn unregister_listener(&self, listener: &Arc<dyn QueueBackpressureListener>) -> bool {
        self.listeners.unregister(listener)
    }

    /// Claims a slot if one is free.
    ///
    /// The increment is conditional, so `pending` never exceeds the limit even
    /// under contention.
    pub fn admit(&self) -> Admission {
        let limit = self.limit();
        if limit == 0 {
            return Admission::Unbounded;
        }

        let claimed = self
            .slots
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |slots| {
                let (epoch, count) = unpack(slots);
                ((count as usize) < limit).then(|| pack(epoch, count + 1))
            });

        match claimed {
            Ok(previous) => Admission::Accepted(Slot {
                epoch: unpack(previous).0,
            }),
            Err(slots) => {
                let observed = unpack(slots).1 as usize;
                if self
                    .backpressure
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    warn!("Publish queue full ({}/{}), dropping messages", observed, limit);
                    self.listeners.notify("queue full", |l| l.on_queue_full(observed, limit));
                }
                debug!("Publish dropped, queue at {}/{}", observed, limit);
                Admission::Rejected
            }
        }
    }

    /// Returns `slot` to the gate. Slots from before the last reset are ignored.
    pub fn release(&self, slot: Slot) {
        let previous = self
            .slots
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |slots| {
                let (epoch, count) = unpack(slots);
                if epoch != slot.epoch {
                    return None;
                }
                count.checked_sub(1).map(|count| pack(epoch, count))
            });

        match previous {
            Ok(before) => self.check_drained(unpack(before).1 as usize - 1),
            Err(_) => debug!("Release of slot from epoch {} ignored", slot.epoch),
        }
    }

    /// Reconfigures the limit.
    ///
    /// 0 disables counting, forgets outstanding slots, and ends a full episode.
    /// Any other value re-checks the drained threshold immediately, so shrinking
    /// pressure through reconfiguration ends an episode without waiting for the
    /// next completion.
    pub fn set_limit(&self, limit: usize) {
        let limit = limit.min(MAX_LIMIT);
        let previous = self.limit.swap(limit, Ordering::AcqRel);
        if previous != limit {
            debug!("Publish queue limit changed from {} to {}", previous, limit);
        }

        if limit == 0 {
            self.reset_slots();
            self.end_episode(0, 0);
        } else {
            self.check_drained(self.pending());
        }
    }

    /// Zeroes the count and moves to the next epoch in one step.
    fn reset_slots(&self) {
        let mut current = self.slots.load(Ordering::Acquire);
        loop {
            let next = pack(unpack(current).0.wrapping_add(1), 0);
            match self
                .slots
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    fn check_drained(&self, count: usize) {
        let limit = self.limit();
        if limit == 0 || !self.is_backpressure_active() {
            return;
        }
        if count < limit / 2 || count == 0 {
            self.end_episode(count, limit);
        }
    }

    fn end_episode(&self, count: usize, limit: usize) {
        if self
            .backpressure
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            warn!("Publish queue drained ({}/{}), resuming", count, limit);
            self.listeners
                .notify("queue drained", |l| l.on_queue_drained(count, limit));
        }
    }
}
