use std::time::{Duration, Instant};

/// Trailing-edge debouncer driven by the caller's clock. Every `arm` pushes
/// the deadline out; `fire_if_due` reports once per quiet period.
#[derive(Clone, Debug)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn fire_if_due(&mut self, now: Instant) -> bool {
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
    fn fires_once_after_quiet_period() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_secs(2));
        assert!(!debouncer.fire_if_due(start + Duration::from_secs(10)));

        debouncer.arm(start);
        debouncer.arm(start + Duration::from_secs(1));
        assert!(!debouncer.fire_if_due(start + Duration::from_secs(2)));
        assert!(debouncer.fire_if_due(start + Duration::from_secs(3)));
        assert!(!debouncer.fire_if_due(start + Duration::from_secs(4)));
    }

    #[test]
    fn cancel_disarms() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(50));
        debouncer.arm(start);
        debouncer.cancel();
        assert!(!debouncer.is_armed());
        assert!(!debouncer.fire_if_due(start + Duration::from_secs(1)));
    }
}
