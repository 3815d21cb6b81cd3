use std::time::Duration;
use tokio::time::Instant;

/// Single-slot cancellable timer.
///
/// The timer never fires on its own: the owner passes the current instant to
/// [`DebounceTimer::poll`] and reads [`DebounceTimer::deadline`] to know when to
/// wake up. Tests drive it with synthetic instants instead of sleeping.
#[derive(Debug)]
pub struct DebounceTimer<T> {
    pending: Option<(Instant, T)>,
}

impl<T> Default for DebounceTimer<T> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<T> DebounceTimer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer to fire `delay` after `now`, replacing anything pending.
    pub fn schedule(&mut self, now: Instant, delay: Duration, payload: T) {
        self.pending = Some((now + delay, payload));
    }

    /// Disarm the timer, returning the payload that will no longer fire.
    pub fn cancel_pending(&mut self) -> Option<T> {
        self.pending.take().map(|(_, payload)| payload)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(deadline, _)| *deadline)
    }

    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref().map(|(_, payload)| payload)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Take the payload if the deadline has been reached.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((deadline, _)) if *deadline <= now => self.cancel_pending(),
            _ => None,
        }
    }
}
