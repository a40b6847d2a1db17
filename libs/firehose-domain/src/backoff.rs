//! Reconnect backoff
//!
//! The delay reacts to the class of each fault:
//!
//! ```text
//! ForcedDisconnect        -> delay_min
//! IncompleteRead, Http    -> unchanged
//! Tls, Connection,
//! StreamProcessing        -> min(delay * factor, delay_max)
//! ```
//!
//! A connection that stayed up longer than `reset_after` forgives the history:
//! the delay drops back to `delay_min` before the class rule is applied.

use std::time::{Duration, Instant};

use crate::error::{FaultClass, FaultKind};

/// Backoff tuning
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Growth factor applied on escalating faults (default: 1.5)
    pub factor: f64,
    /// Floor of the delay (default: 100ms)
    pub delay_min: Duration,
    /// Ceiling of the delay (default: 150s)
    pub delay_max: Duration,
    /// Connected time after which the delay is forgiven (default: 10 minutes)
    pub reset_after: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            factor: 1.5,
            delay_min: Duration::from_millis(100),
            delay_max: Duration::from_secs(150),
            reset_after: Duration::from_secs(600),
        }
    }
}

/// Current delay and the last reset mark
#[derive(Debug, Clone)]
pub struct BackoffState {
    config: BackoffConfig,
    delay: Duration,
    mark: Instant,
}

impl BackoffState {
    pub fn new(config: BackoffConfig, now: Instant) -> Self {
        let delay = config.delay_min;
        Self {
            config,
            delay,
            mark: now,
        }
    }

    /// Delay that would be slept right now
    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Record a fault observed at `now` and return the delay to sleep
    pub fn on_fault(&mut self, class: FaultClass, now: Instant) -> Duration {
        if now.saturating_duration_since(self.mark) > self.config.reset_after {
            self.delay = self.config.delay_min;
        }

        self.delay = match class.kind() {
            FaultKind::CleanEof => self.config.delay_min,
            FaultKind::Protocol => self.delay,
            FaultKind::Transport | FaultKind::Stream => self.escalated(),
        };
        self.mark = now;
        self.delay
    }

    fn escalated(&self) -> Duration {
        Duration::try_from_secs_f64(self.delay.as_secs_f64() * self.config.factor)
            .unwrap_or(self.config.delay_max)
            .min(self.config.delay_max)
            .max(self.config.delay_min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_secs(actual: Duration, expected: f64) {
        assert!(
            (actual.as_secs_f64() - expected).abs() < 1e-6,
            "expected {}s, got {:?}",
            expected,
            actual
        );
    }

    #[test]
    fn test_escalation_sequence() {
        let now = Instant::now();
        let mut state = BackoffState::new(BackoffConfig::default(), now);
        assert_secs(state.delay(), 0.1);

        assert_secs(state.on_fault(FaultClass::Connection, now), 0.15);
        assert_secs(state.on_fault(FaultClass::Tls, now), 0.225);
        assert_secs(state.on_fault(FaultClass::StreamProcessing, now), 0.3375);
    }

    #[test]
    fn test_delay_is_capped() {
        let now = Instant::now();
        let mut state = BackoffState::new(BackoffConfig::default(), now);

        let mut previous = state.delay();
        for _ in 0..100 {
            let next = state.on_fault(FaultClass::Connection, now);
            assert!(next >= previous);
            assert!(next <= Duration::from_secs(150));
            previous = next;
        }
        assert_eq!(state.delay(), Duration::from_secs(150));
    }

    #[test]
    fn test_protocol_faults_keep_delay() {
        let now = Instant::now();
        let mut state = BackoffState::new(BackoffConfig::default(), now);
        state.on_fault(FaultClass::Connection, now);
        state.on_fault(FaultClass::Connection, now);

        assert_secs(state.on_fault(FaultClass::Http, now), 0.225);
        assert_secs(state.on_fault(FaultClass::IncompleteRead, now), 0.225);
    }

    #[test]
    fn test_clean_close_resets_to_floor() {
        let now = Instant::now();
        let mut state = BackoffState::new(BackoffConfig::default(), now);
        for _ in 0..5 {
            state.on_fault(FaultClass::Tls, now);
        }

        assert_secs(state.on_fault(FaultClass::ForcedDisconnect, now), 0.1);
    }

    #[test]
    fn test_long_connection_forgives_history() {
        let start = Instant::now();
        let mut state = BackoffState::new(BackoffConfig::default(), start);
        for _ in 0..10 {
            state.on_fault(FaultClass::Connection, start);
        }
        assert!(state.delay() > Duration::from_secs(5));

        let later = start + Duration::from_secs(601);
        assert_secs(state.on_fault(FaultClass::Connection, later), 0.15);
    }

    #[test]
    fn test_short_gap_keeps_history() {
        let start = Instant::now();
        let mut state = BackoffState::new(BackoffConfig::default(), start);
        state.on_fault(FaultClass::Connection, start);

        let later = start + Duration::from_secs(600);
        assert_secs(state.on_fault(FaultClass::Connection, later), 0.225);
    }

    #[test]
    fn test_oversized_factor_saturates_at_ceiling() {
        let now = Instant::now();
        for factor in [f64::INFINITY, 1e300] {
            let config = BackoffConfig {
                factor,
                ..BackoffConfig::default()
            };
            let mut state = BackoffState::new(config, now);

            assert_eq!(
                state.on_fault(FaultClass::Connection, now),
                Duration::from_secs(150)
            );
            assert_eq!(
                state.on_fault(FaultClass::Tls, now),
                Duration::from_secs(150)
            );
        }
    }
}
