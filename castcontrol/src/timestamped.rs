//! Values paired with their capture time.

use std::time::{Duration, Instant};

/// A possibly absent value and the instant it was captured.
#[derive(Debug, Clone, PartialEq)]
pub struct Timestamped<T> {
    value: Option<T>,
    captured_at: Instant,
}

impl<T> Timestamped<T> {
    pub fn at(value: Option<T>, captured_at: Instant) -> Self {
        Self { value, captured_at }
    }

    pub fn new(value: T, captured_at: Instant) -> Self {
        Self::at(Some(value), captured_at)
    }

    pub fn missing(captured_at: Instant) -> Self {
        Self::at(None, captured_at)
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Elapsed time since capture, zero if `now` precedes the capture.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.captured_at)
    }

    pub fn is_older_than(&self, now: Instant, max_age: Duration) -> bool {
        self.age(now) > max_age
    }

    /// Present and not older than `max_age`.
    pub fn is_fresh(&self, now: Instant, max_age: Duration) -> bool {
        self.value.is_some() && !self.is_older_than(now, max_age)
    }
}
