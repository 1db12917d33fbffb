//! Mute episode state machine, decoupled from I/O.
//!
//! A mute trigger from the controller lowers the OS input volume; a 1-second
//! tick then decides when to force the controller into standby and when to
//! attempt a single recovery of the input volume. All timing is expressed as
//! polled comparisons against the `now` passed in, so tests drive the machine
//! with synthetic instants.
//!
//! The controller is told `mute-confirmed` when the mute call *fails* and
//! `mute-ended` when the restore call *fails*. That is the default
//! ([`ConfirmPolicy::OnFailure`]); [`ConfirmPolicy::OnSuccess`] flips it.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::audio::{self, InputVolume};
use crate::protocol::{CMD_ENTER_STANDBY, CMD_MUTE_CONFIRMED, CMD_MUTE_ENDED};
use crate::transport::{FrameSink, send_logged};

/// Episode state. Discriminants give the episode depth (0–2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MuteState {
    #[default]
    Idle = 0,
    /// Back from a deeper mute; may still time out to standby.
    Armed = 1,
    /// Input volume muted.
    Muted = 2,
}

/// Which outcome of a volume call is reported to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfirmPolicy {
    /// Report when the volume call fails.
    #[default]
    OnFailure,
    /// Report when the volume call succeeds.
    OnSuccess,
}

impl ConfirmPolicy {
    fn reports<T, E>(self, result: &Result<T, E>) -> bool {
        match self {
            ConfirmPolicy::OnFailure => result.is_err(),
            ConfirmPolicy::OnSuccess => result.is_ok(),
        }
    }
}

impl std::fmt::Display for ConfirmPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfirmPolicy::OnFailure => write!(f, "on-failure"),
            ConfirmPolicy::OnSuccess => write!(f, "on-success"),
        }
    }
}

/// Timing thresholds and volume levels for an episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSettings {
    /// Muted/armed episodes older than this force standby.
    pub standby_after: Duration,
    /// Muted episodes older than this attempt recovery.
    pub recover_after: Duration,
    /// Delay before the startup standby frame.
    pub startup_grace: Duration,
    /// Tick period.
    pub tick: Duration,
    pub mute_level: u8,
    pub restore_level: u8,
    pub policy: ConfirmPolicy,
}

impl Default for EpisodeSettings {
    fn default() -> Self {
        EpisodeSettings {
            standby_after: Duration::from_secs(15),
            recover_after: Duration::from_secs(10),
            startup_grace: Duration::from_secs(5),
            tick: Duration::from_secs(1),
            mute_level: 0,
            restore_level: 80,
            policy: ConfirmPolicy::OnFailure,
        }
    }
}

/// Something the episode reported to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeEvent {
    /// `mute-confirmed` was sent; the episode is `Muted`.
    MuteConfirmed,
    /// `mute-ended` was sent after a recovery attempt.
    MuteEnded,
    /// `enter-standby` was sent; the episode is `Idle`.
    Standby,
}

pub struct MuteEpisode {
    state: MuteState,
    muted_at: Option<Instant>,
    settings: EpisodeSettings,
}

impl MuteEpisode {
    pub fn new(settings: EpisodeSettings) -> Self {
        MuteEpisode {
            state: MuteState::Idle,
            muted_at: None,
            settings,
        }
    }

    pub fn state(&self) -> MuteState {
        self.state
    }

    pub fn muted_at(&self) -> Option<Instant> {
        self.muted_at
    }

    pub fn settings(&self) -> &EpisodeSettings {
        &self.settings
    }

    /// Handle a mute trigger arriving at `now`.
    pub fn on_trigger(
        &mut self,
        now: Instant,
        volume: &impl InputVolume,
        sink: &impl FrameSink,
    ) -> Option<EpisodeEvent> {
        self.muted_at = Some(now);
        let result = audio::set_and_verify(volume, self.settings.mute_level);
        match &result {
            Ok(()) => log::info!("[mute] input volume -> {}", self.settings.mute_level),
            Err(e) => log::warn!("[mute] mute failed: {e}"),
        }
        if !self.settings.policy.reports(&result) {
            return None;
        }
        self.state = MuteState::Muted;
        send_logged(sink, CMD_MUTE_CONFIRMED);
        Some(EpisodeEvent::MuteConfirmed)
    }

    /// Handle a periodic tick at `now`.
    pub fn on_tick(
        &mut self,
        now: Instant,
        volume: &impl InputVolume,
        sink: &impl FrameSink,
    ) -> Option<EpisodeEvent> {
        let elapsed = self
            .muted_at
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or_default();

        if self.state != MuteState::Idle && elapsed > self.settings.standby_after {
            log::info!("[mute] episode timed out, entering standby");
            self.state = MuteState::Idle;
            send_logged(sink, CMD_ENTER_STANDBY);
            return Some(EpisodeEvent::Standby);
        }

        if self.state == MuteState::Muted && elapsed > self.settings.recover_after {
            // One attempt only; Armed never re-enters recovery.
            self.state = MuteState::Armed;
            let result = audio::set_and_verify(volume, self.settings.restore_level);
            match &result {
                Ok(()) => log::info!("[mute] input volume -> {}", self.settings.restore_level),
                Err(e) => log::warn!("[mute] restore failed: {e}"),
            }
            if self.settings.policy.reports(&result) {
                send_logged(sink, CMD_MUTE_ENDED);
                return Some(EpisodeEvent::MuteEnded);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::stub::StubVolume;
    use crate::transport::mock::RecordingSink;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn episode() -> MuteEpisode {
        MuteEpisode::new(EpisodeSettings::default())
    }

    #[test]
    fn starts_idle() {
        let ep = episode();
        assert_eq!(ep.state(), MuteState::Idle);
        assert!(ep.muted_at().is_none());
        assert_eq!(MuteState::Muted as u8, 2);
    }

    #[test]
    fn failed_mute_confirms_and_mutes() {
        let mut ep = episode();
        let vol = StubVolume::failing();
        let sink = RecordingSink::new();
        let t0 = Instant::now();

        assert_eq!(ep.on_trigger(t0, &vol, &sink), Some(EpisodeEvent::MuteConfirmed));
        assert_eq!(ep.state(), MuteState::Muted);
        assert_eq!(ep.muted_at(), Some(t0));
        assert_eq!(sink.frames(), vec![CMD_MUTE_CONFIRMED]);
        assert_eq!(vol.requests(), vec![0]);
    }

    #[test]
    fn successful_mute_leaves_state_unchanged() {
        let mut ep = episode();
        let vol = StubVolume::new(80);
        let sink = RecordingSink::new();
        let t0 = Instant::now();

        assert_eq!(ep.on_trigger(t0, &vol, &sink), None);
        assert_eq!(ep.state(), MuteState::Idle);
        assert_eq!(ep.muted_at(), Some(t0), "timestamp still recorded");
        assert!(sink.frames().is_empty());
        assert_eq!(vol.get_input_volume().unwrap(), 0);
    }

    #[test]
    fn mismatched_readback_counts_as_failure() {
        let mut ep = episode();
        let vol = StubVolume::new(80);
        vol.stuck.store(true, std::sync::atomic::Ordering::SeqCst);
        let sink = RecordingSink::new();
        assert_eq!(
            ep.on_trigger(Instant::now(), &vol, &sink),
            Some(EpisodeEvent::MuteConfirmed)
        );
    }

    #[test]
    fn full_episode_timeline() {
        let mut ep = episode();
        let vol = StubVolume::failing();
        let sink = RecordingSink::new();
        let t0 = Instant::now();

        ep.on_trigger(t0, &vol, &sink);
        sink.take();

        // Nothing before the recovery threshold.
        for s in 1..=10 {
            assert_eq!(ep.on_tick(t0 + secs(s), &vol, &sink), None, "tick {s}");
        }
        assert_eq!(ep.state(), MuteState::Muted);

        assert_eq!(ep.on_tick(t0 + secs(11), &vol, &sink), Some(EpisodeEvent::MuteEnded));
        assert_eq!(ep.state(), MuteState::Armed);
        assert_eq!(sink.take(), vec![CMD_MUTE_ENDED]);
        assert_eq!(vol.requests(), vec![0, 80]);

        // Armed does not retry recovery.
        for s in 12..=15 {
            assert_eq!(ep.on_tick(t0 + secs(s), &vol, &sink), None);
        }
        assert_eq!(vol.requests(), vec![0, 80]);

        assert_eq!(ep.on_tick(t0 + secs(16), &vol, &sink), Some(EpisodeEvent::Standby));
        assert_eq!(ep.state(), MuteState::Idle);
        assert_eq!(sink.take(), vec![CMD_ENTER_STANDBY]);

        assert_eq!(ep.on_tick(t0 + secs(30), &vol, &sink), None);
        assert!(sink.frames().is_empty());
    }

    #[test]
    fn successful_recovery_is_silent() {
        let mut ep = episode();
        let vol = StubVolume::failing();
        let sink = RecordingSink::new();
        let t0 = Instant::now();
        ep.on_trigger(t0, &vol, &sink);
        sink.take();

        vol.set_failing(false);
        assert_eq!(ep.on_tick(t0 + secs(11), &vol, &sink), None);
        assert_eq!(ep.state(), MuteState::Armed);
        assert!(sink.frames().is_empty());
        assert_eq!(vol.get_input_volume().unwrap(), 80);
    }

    #[test]
    fn standby_wins_over_recovery_on_late_tick() {
        let mut ep = episode();
        let vol = StubVolume::failing();
        let sink = RecordingSink::new();
        let t0 = Instant::now();
        ep.on_trigger(t0, &vol, &sink);
        sink.take();

        // First tick after a long stall is past both thresholds.
        assert_eq!(ep.on_tick(t0 + secs(20), &vol, &sink), Some(EpisodeEvent::Standby));
        assert_eq!(ep.state(), MuteState::Idle);
        assert_eq!(sink.take(), vec![CMD_ENTER_STANDBY]);
        assert_eq!(vol.requests(), vec![0], "no recovery attempt");
    }

    #[test]
    fn thresholds_are_strict() {
        let mut ep = episode();
        let vol = StubVolume::failing();
        let sink = RecordingSink::new();
        let t0 = Instant::now();
        ep.on_trigger(t0, &vol, &sink);

        assert_eq!(ep.on_tick(t0 + secs(10), &vol, &sink), None);
        assert_eq!(ep.state(), MuteState::Muted);
    }

    #[test]
    fn retrigger_restarts_timer() {
        let mut ep = episode();
        let vol = StubVolume::failing();
        let sink = RecordingSink::new();
        let t0 = Instant::now();
        ep.on_trigger(t0, &vol, &sink);
        ep.on_trigger(t0 + secs(8), &vol, &sink);

        assert_eq!(ep.on_tick(t0 + secs(12), &vol, &sink), None);
        assert_eq!(ep.state(), MuteState::Muted);
        assert_eq!(ep.on_tick(t0 + secs(19), &vol, &sink), Some(EpisodeEvent::MuteEnded));
    }

    #[test]
    fn trigger_while_armed_with_successful_mute_keeps_armed() {
        let mut ep = episode();
        let vol = StubVolume::failing();
        let sink = RecordingSink::new();
        let t0 = Instant::now();
        ep.on_trigger(t0, &vol, &sink);
        ep.on_tick(t0 + secs(11), &vol, &sink);
        assert_eq!(ep.state(), MuteState::Armed);

        vol.set_failing(false);
        assert_eq!(ep.on_trigger(t0 + secs(12), &vol, &sink), None);
        assert_eq!(ep.state(), MuteState::Armed);
        // Timer restarted from the new trigger.
        assert_eq!(ep.on_tick(t0 + secs(27), &vol, &sink), None);
        assert_eq!(ep.on_tick(t0 + secs(28), &vol, &sink), Some(EpisodeEvent::Standby));
    }

    #[test]
    fn idle_tick_is_noop() {
        let mut ep = episode();
        let vol = StubVolume::new(80);
        let sink = RecordingSink::new();
        let t0 = Instant::now();
        for s in 0..60 {
            assert_eq!(ep.on_tick(t0 + secs(s), &vol, &sink), None);
        }
        assert!(sink.frames().is_empty());
        assert!(vol.requests().is_empty());
    }

    #[test]
    fn on_success_policy_inverts_reporting() {
        let settings = EpisodeSettings {
            policy: ConfirmPolicy::OnSuccess,
            ..EpisodeSettings::default()
        };
        let mut ep = MuteEpisode::new(settings);
        let vol = StubVolume::new(80);
        let sink = RecordingSink::new();
        let t0 = Instant::now();

        assert_eq!(ep.on_trigger(t0, &vol, &sink), Some(EpisodeEvent::MuteConfirmed));
        assert_eq!(ep.state(), MuteState::Muted);
        assert_eq!(ep.on_tick(t0 + secs(11), &vol, &sink), Some(EpisodeEvent::MuteEnded));
        assert_eq!(vol.get_input_volume().unwrap(), 80);
        assert_eq!(sink.frames(), vec![CMD_MUTE_CONFIRMED, CMD_MUTE_ENDED]);
    }

    #[test]
    fn on_success_policy_failed_mute_is_silent() {
        let settings = EpisodeSettings {
            policy: ConfirmPolicy::OnSuccess,
            ..EpisodeSettings::default()
        };
        let mut ep = MuteEpisode::new(settings);
        let vol = StubVolume::failing();
        let sink = RecordingSink::new();
        assert_eq!(ep.on_trigger(Instant::now(), &vol, &sink), None);
        assert_eq!(ep.state(), MuteState::Idle);
    }

    #[test]
    fn transport_failure_does_not_block_transition() {
        let mut ep = episode();
        let vol = StubVolume::failing();
        let sink = RecordingSink::new();
        sink.set_failing(true);
        assert_eq!(
            ep.on_trigger(Instant::now(), &vol, &sink),
            Some(EpisodeEvent::MuteConfirmed)
        );
        assert_eq!(ep.state(), MuteState::Muted);
    }

    #[test]
    fn confirm_policy_display() {
        assert_eq!(ConfirmPolicy::OnFailure.to_string(), "on-failure");
        assert_eq!(ConfirmPolicy::OnSuccess.to_string(), "on-success");
    }
}
