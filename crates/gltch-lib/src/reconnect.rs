//! Link re-establishment with exponential backoff.
//!
//! When the controller drops off the air (out of range, powered down,
//! adapter reset), the companion retries discovery and connection. The
//! retry schedule doubles from 1 s up to 30 s and resets once a link is up.

use std::fmt::Display;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Wait after the first failed attempt.
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Applied to the wait for each further consecutive failure.
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Retry schedule for link attempts.
#[derive(Debug)]
pub struct ReconnectState {
    config: ReconnectConfig,
    current_delay: Duration,
    last_attempt: Option<Instant>,
    consecutive_failures: u32,
}

impl ReconnectState {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            current_delay: config.initial_delay,
            config,
            last_attempt: None,
            consecutive_failures: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ReconnectConfig::default())
    }

    /// `true` before any attempt, or once the backoff delay has elapsed.
    pub fn should_attempt(&self) -> bool {
        self.time_until_attempt().is_zero()
    }

    /// How long until [`should_attempt`](Self::should_attempt) turns true.
    pub fn time_until_attempt(&self) -> Duration {
        match self.last_attempt {
            None => Duration::ZERO,
            Some(last) => self.current_delay.saturating_sub(last.elapsed()),
        }
    }

    /// Record a failed attempt and set the wait before the next one.
    ///
    /// The first failure waits `initial_delay`; each further consecutive
    /// failure multiplies the wait, capped at `max_delay`.
    pub fn record_failure(&mut self) {
        if self.consecutive_failures > 0 {
            let next = self.current_delay.as_secs_f64() * self.config.multiplier;
            self.current_delay = Duration::from_secs_f64(next).min(self.config.max_delay);
        }
        self.consecutive_failures += 1;
        self.last_attempt = Some(Instant::now());
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.current_delay = self.config.initial_delay;
        self.last_attempt = None;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Wait applied after the most recent failure.
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }
}

/// Run one link attempt if the backoff allows it.
///
/// Returns `None` without calling `attempt` while the backoff timer runs.
/// Success resets the schedule; failure advances it and logs when the next
/// try is due.
pub fn try_attempt<T, E: Display>(
    state: &mut ReconnectState,
    attempt: impl FnOnce() -> Result<T, E>,
) -> Option<T> {
    if !state.should_attempt() {
        return None;
    }
    match attempt() {
        Ok(link) => {
            state.record_success();
            Some(link)
        }
        Err(e) => {
            state.record_failure();
            log::warn!(
                "[link] connect failed: {e} (attempt {}, retry in {:.1}s)",
                state.consecutive_failures(),
                state.current_delay().as_secs_f64()
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast(initial_ms: u64, max_ms: u64) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            multiplier: 2.0,
        }
    }

    #[test]
    fn default_schedule_is_one_to_thirty_seconds() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.multiplier, 2.0);
    }

    #[test]
    fn first_attempt_is_immediate() {
        let state = ReconnectState::with_defaults();
        assert!(state.should_attempt());
        assert_eq!(state.time_until_attempt(), Duration::ZERO);
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let mut state = ReconnectState::new(fast(100, 500));
        let mut delays = Vec::new();
        for _ in 0..4 {
            state.record_failure();
            delays.push(state.current_delay());
        }
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(500),
            ]
        );
        assert_eq!(state.consecutive_failures(), 4);
    }

    #[test]
    fn first_retry_waits_initial_delay() {
        let mut state = ReconnectState::with_defaults();
        state.record_failure();
        assert_eq!(state.current_delay(), Duration::from_secs(1));
        let wait = state.time_until_attempt();
        assert!(wait <= Duration::from_secs(1));
        assert!(wait > Duration::from_millis(900));
    }

    #[test]
    fn success_resets_schedule() {
        let mut state = ReconnectState::with_defaults();
        state.record_failure();
        state.record_failure();
        state.record_success();
        assert_eq!(state.consecutive_failures(), 0);
        assert_eq!(state.current_delay(), Duration::from_secs(1));
        assert!(state.should_attempt());
    }

    #[test]
    fn waits_after_failure() {
        let mut state = ReconnectState::new(fast(60_000, 60_000));
        state.record_failure();
        assert!(!state.should_attempt());
        assert!(state.time_until_attempt() > Duration::from_secs(50));
    }

    #[test]
    fn attempt_allowed_after_delay_elapses() {
        let mut state = ReconnectState::new(fast(1, 1000));
        state.record_failure();
        std::thread::sleep(Duration::from_millis(10));
        assert!(state.should_attempt());
    }

    #[test]
    fn try_attempt_skips_while_backing_off() {
        let mut state = ReconnectState::new(fast(60_000, 60_000));
        let failed: Option<()> = try_attempt(&mut state, || Err("no adapter"));
        assert!(failed.is_none());

        let mut called = false;
        let skipped: Option<()> = try_attempt(&mut state, || {
            called = true;
            Ok::<(), &str>(())
        });
        assert!(skipped.is_none());
        assert!(!called);
    }

    #[test]
    fn try_attempt_success_resets() {
        let mut state = ReconnectState::new(fast(1, 1000));
        let _: Option<()> = try_attempt(&mut state, || Err("out of range"));
        std::thread::sleep(Duration::from_millis(10));
        let got = try_attempt(&mut state, || Ok::<_, String>(7));
        assert_eq!(got, Some(7));
        assert_eq!(state.consecutive_failures(), 0);
        assert_eq!(state.current_delay(), Duration::from_millis(1));
    }
}
