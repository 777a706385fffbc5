//! Per-domain rate limiting state.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct DomainState {
    pub current_delay: Duration,
    /// Earliest instant the next request may start. Each caller reserves its
    /// slot under the write lock, so concurrent workers queue up behind it.
    pub next_slot: Option<Instant>,
    pub consecutive_successes: u32,
    pub in_backoff: bool,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
}

impl DomainState {
    pub fn new(delay: Duration) -> Self {
        Self {
            current_delay: delay,
            next_slot: None,
            consecutive_successes: 0,
            in_backoff: false,
            total_requests: 0,
            rate_limit_hits: 0,
        }
    }

    /// Take the next request slot and return how long to wait for it.
    pub fn reserve(&mut self, now: Instant) -> Duration {
        let start = match self.next_slot {
            Some(slot) if slot > now => slot,
            _ => now,
        };
        self.next_slot = Some(start + self.current_delay);
        self.total_requests += 1;
        start - now
    }

    pub fn time_until_ready(&self, now: Instant) -> Duration {
        self.next_slot
            .map(|slot| slot.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reservations_are_spaced() {
        let mut state = DomainState::new(Duration::from_secs(2));
        let now = Instant::now();
        assert_eq!(state.reserve(now), Duration::ZERO);
        assert_eq!(state.reserve(now), Duration::from_secs(2));
        assert_eq!(state.reserve(now), Duration::from_secs(4));
        assert_eq!(state.total_requests, 3);
        assert_eq!(state.time_until_ready(now), Duration::from_secs(6));
    }
}
