use std::time::{Duration, Instant};

/// A deadline. `None` means the timeout lies beyond what `Instant` can
/// represent, so the wait is unbounded.
pub struct Timeout {
    deadline: Option<Instant>,
}

impl Timeout {
    pub fn new(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn is_expired(&self) -> bool {
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    pub fn remaining(&self) -> Duration {
        match self.deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        }
    }

    /// Remaining time as a `poll(2)` timeout.
    ///
    /// Rounds up so a sub-millisecond remainder still sleeps instead of
    /// spinning, and clamps to `i32::MAX`.
    pub fn remaining_poll_ms(&self) -> i32 {
        duration_to_poll_ms(self.remaining())
    }
}

pub fn duration_to_poll_ms(duration: Duration) -> i32 {
    let mut ms = duration.as_millis();
    if duration.subsec_nanos() % 1_000_000 != 0 {
        ms += 1;
    }
    ms.min(i32::MAX as u128) as i32
}
