//! Episode hooks — run user-defined shell commands when a mute is reported
//! or ends.

use std::io;
use std::process::ExitStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::Config;
use crate::episode::EpisodeEvent;

/// Default timeout for hook commands (30 seconds).
const HOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval when waiting for a hook process to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Environment variable carrying the event name into the hook process.
pub const EVENT_ENV: &str = "GLTCH_EVENT";

/// Runs `on_mute_command` / `on_unmute_command` for episode events.
///
/// Commands run on a background thread. Only one hook runs at a time; an
/// event arriving while a hook is still running is skipped with a warning.
#[derive(Debug, Clone)]
pub struct HookRunner {
    on_mute: String,
    on_unmute: String,
    busy: Arc<AtomicBool>,
    timeout: Duration,
}

impl HookRunner {
    pub fn new(config: &Config) -> Self {
        HookRunner {
            on_mute: config.on_mute_command.trim().to_string(),
            on_unmute: config.on_unmute_command.trim().to_string(),
            busy: Arc::new(AtomicBool::new(false)),
            timeout: HOOK_TIMEOUT,
        }
    }

    /// The command bound to `event`, if any.
    pub fn command_for(&self, event: EpisodeEvent) -> Option<&str> {
        let cmd = match event {
            EpisodeEvent::MuteConfirmed => &self.on_mute,
            EpisodeEvent::MuteEnded => &self.on_unmute,
            EpisodeEvent::Standby => return None,
        };
        (!cmd.is_empty()).then_some(cmd.as_str())
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Fire the hook for `event`. Returns `true` if a command was spawned.
    pub fn fire(&self, event: EpisodeEvent) -> bool {
        let Some(command) = self.command_for(event) else {
            return false;
        };
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!("hook skipped (previous hook still running): {command}");
            return false;
        }
        let command = command.to_string();
        let busy = Arc::clone(&self.busy);
        let timeout = self.timeout;
        let name = event_name(event);
        let spawned = std::thread::Builder::new()
            .name("hook".into())
            .spawn(move || {
                let result = run_with_timeout(&command, name, timeout);
                busy.store(false, Ordering::SeqCst);
                match result {
                    Ok(s) if !s.success() => {
                        log::warn!("hook command exited with {s}: {command}");
                    }
                    Err(e) => {
                        log::warn!("hook command failed: {e}: {command}");
                    }
                    _ => {}
                }
            });
        if let Err(e) = spawned {
            self.busy.store(false, Ordering::SeqCst);
            log::warn!("hook thread spawn failed: {e}");
            return false;
        }
        true
    }
}

fn event_name(event: EpisodeEvent) -> &'static str {
    match event {
        EpisodeEvent::MuteConfirmed => "mute",
        EpisodeEvent::MuteEnded => "unmute",
        EpisodeEvent::Standby => "standby",
    }
}

/// Run a shell command with a timeout. Kills the process if it exceeds the deadline.
fn run_with_timeout(command: &str, event: &str, timeout: Duration) -> io::Result<ExitStatus> {
    let mut cmd = if cfg!(windows) {
        let mut c = std::process::Command::new("cmd");
        c.args(["/C", command]);
        c
    } else {
        let mut c = std::process::Command::new("sh");
        c.args(["-c", command]);
        c
    };
    let mut child = cmd.env(EVENT_ENV, event).spawn()?;

    let max_polls = (timeout.as_millis() / POLL_INTERVAL.as_millis()).max(1) as u64;
    for _ in 0..max_polls {
        match child.try_wait()? {
            Some(status) => return Ok(status),
            None => std::thread::sleep(POLL_INTERVAL),
        }
    }

    log::warn!("hook command timed out after {timeout:?}, killing: {command}");
    let _ = child.kill();
    child.wait()
}
