use std::time::Duration;

use tokio::time::Instant;

/// Rate limiter for recompute requests: at most one firing per `interval`.
///
/// Signals arriving in between are coalesced into a single pending firing.
#[derive(Clone, Debug)]
pub(crate) struct Throttle {
    interval: Duration,
    last_fired: Option<Instant>,
    pending: bool,
}

impl Throttle {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
            pending: false,
        }
    }

    pub(crate) fn signal(&mut self) {
        self.pending = true;
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending
    }

    pub(crate) fn is_ready(&self, now: Instant) -> bool {
        self.pending
            && self
                .last_fired
                .is_none_or(|fired| now >= fired + self.interval)
    }

    /// When a pending signal may fire.
    pub(crate) fn deadline(&self, now: Instant) -> Option<Instant> {
        if !self.pending {
            return None;
        }
        Some(self.last_fired.map_or(now, |fired| fired + self.interval))
    }

    pub(crate) fn fire(&mut self, now: Instant) {
        self.pending = false;
        self.last_fired = Some(now);
    }
}

/// Fires once `delay` has passed since the last signal.
#[derive(Clone, Debug)]
pub(crate) struct Debounce {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub(crate) fn signal(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Re-arms for a specific instant (e.g. when eviction candidates ripen).
    pub(crate) fn rearm_at(&mut self, at: Instant) {
        self.deadline = Some(at);
    }

    /// Returns `true` (once) when the deadline has passed.
    pub(crate) fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(at) if now >= at => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
