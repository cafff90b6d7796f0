use std::time::Duration;

use web_time::Instant;

/// Delay before a requested permalink update is carried out.
pub const PERMALINK_DEBOUNCE: Duration = Duration::from_millis(500);

/// Collapses a burst of requests into one action carried out after a quiet period.
///
/// Every [`Debouncer::request`] call moves the deadline forward. [`Debouncer::poll`] returns
/// `true` once, when the deadline has passed.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    /// Creates a new debouncer with the given quiet period.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Quiet period of the debouncer.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Requests the action, restarting the quiet period.
    pub fn request(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    /// Returns true if a request is waiting for its quiet period to end.
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Drops the pending request.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Returns true if the quiet period of the pending request has ended. The request is consumed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_is_collapsed() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(PERMALINK_DEBOUNCE);

        let mut fired = 0;
        for i in 0..10 {
            let now = start + Duration::from_millis(i * 100);
            debouncer.request(now);
            if debouncer.poll(now) {
                fired += 1;
            }
        }

        assert_eq!(fired, 0);
        assert!(!debouncer.poll(start + Duration::from_millis(1300)));
        assert!(debouncer.poll(start + Duration::from_millis(1400)));
        assert!(!debouncer.poll(start + Duration::from_millis(5000)));
    }
}
