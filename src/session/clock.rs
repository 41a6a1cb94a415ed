//! Phase-wide start time shared by all streams of a phase

use std::sync::OnceLock;
use std::time::Duration;
use tokio::time::Instant;

/// Holds the global start time of one phase. The first stream to connect
/// sets it; every later call observes the same value.
#[derive(Debug, Default)]
pub struct PhaseClock {
    start: OnceLock<Instant>,
}

impl PhaseClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful connect and return the phase start in effect
    pub fn mark_connected(&self, at: Instant) -> Instant {
        *self.start.get_or_init(|| at)
    }

    pub fn start(&self) -> Option<Instant> {
        self.start.get().copied()
    }

    /// Time since the phase start, zero before any stream connected
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        self.start()
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed_at(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_connect_wins() {
        let clock = PhaseClock::new();
        assert_eq!(clock.start(), None);
        assert_eq!(clock.elapsed(), Duration::ZERO);

        let first = Instant::now();
        assert_eq!(clock.mark_connected(first), first);

        tokio::time::advance(Duration::from_millis(40)).await;
        let second = Instant::now();
        assert_eq!(clock.mark_connected(second), first);
        assert_eq!(clock.start(), Some(first));
        assert_eq!(clock.elapsed(), Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_concurrent_connects_agree() {
        let clock = Arc::new(PhaseClock::new());
        let base = Instant::now();
        let handles: Vec<_> = (0..4u64)
            .map(|i| {
                let clock = Arc::clone(&clock);
                tokio::spawn(async move { clock.mark_connected(base + Duration::from_millis(i)) })
            })
            .collect();

        let starts: Vec<Instant> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert!(starts.iter().all(|s| Some(*s) == clock.start()));
    }

    proptest! {
        #[test]
        fn start_is_the_first_connect_in_any_order(offsets in Just((0u64..6).collect::<Vec<_>>()).prop_shuffle()) {
            let base = Instant::now();
            let clock = PhaseClock::new();
            let expected = base + Duration::from_millis(offsets[0] * 10);
            for offset in &offsets {
                let effective = clock.mark_connected(base + Duration::from_millis(offset * 10));
                prop_assert_eq!(effective, expected);
            }
            prop_assert_eq!(clock.start(), Some(expected));
        }
    }
}
