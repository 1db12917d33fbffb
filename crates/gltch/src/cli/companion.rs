//! `companion` subcommand — connect to the controller and run the mute
//! episode loop, reconnecting with backoff when the link drops.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use gltch_lib::ble::BleLink;
use gltch_lib::companion::{self, trigger_channel};
use gltch_lib::episode::{EpisodeEvent, MuteEpisode};
use gltch_lib::hooks::HookRunner;
use gltch_lib::protocol::CMD_CONNECTION_ESTABLISHED;
use gltch_lib::reconnect::{ReconnectState, try_attempt};
use gltch_lib::transport::send_logged;

use super::audio::{self, InputVolume};
use super::{BleCentral, Config, RUNNING, Result, kv, kv_width};

/// How often the session guard re-checks the link and the shutdown flag.
const GUARD_POLL: Duration = Duration::from_millis(100);

/// Upper bound on a single idle sleep between reconnect checks.
const RECONNECT_POLL: Duration = Duration::from_millis(200);

fn banner(config: &Config, volume: &impl InputVolume) {
    let w = kv_width(&["Controller:", "Input volume:", "Levels:", "Policy:", "Hooks:"], &[]);
    kv("Controller:", &config.device_name, w);
    match volume.get_input_volume() {
        Ok(level) => kv("Input volume:", level, w),
        Err(e) => kv("Input volume:", format_args!("unavailable ({e})"), w),
    }
    let ep = &config.episode;
    kv(
        "Levels:",
        format_args!("mute {} / restore {}", ep.mute_level, ep.restore_level),
        w,
    );
    kv("Policy:", ep.confirm_policy, w);
    let hooks = [&config.on_mute_command, &config.on_unmute_command]
        .iter()
        .filter(|c| !c.trim().is_empty())
        .count();
    kv("Hooks:", hooks, w);
    println!();
    println!("Press Ctrl+C to stop.");
}

/// Console line for an episode event and the state it leaves behind.
fn describe(event: EpisodeEvent) -> &'static str {
    match event {
        EpisodeEvent::MuteConfirmed => "mute confirmed -> muted",
        EpisodeEvent::MuteEnded => "mute ended -> armed",
        EpisodeEvent::Standby => "standby -> idle",
    }
}

/// One connected session: runs until the link drops or Ctrl+C, then
/// disconnects and waits for the notification thread.
fn run_session(link: &BleLink, config: &Config, volume: &impl InputVolume, hooks: &HookRunner) {
    send_logged(link, CMD_CONNECTION_ESTABLISHED);

    let (notifier, triggers) = trigger_channel();
    let forwarder = match link.forward_triggers(notifier) {
        Ok(f) => f,
        Err(e) => {
            log::warn!("[link] cannot subscribe to notifications: {e}");
            link.disconnect();
            return;
        }
    };

    let session = Arc::new(AtomicBool::new(true));
    let connected = link.connected_flag();
    let guard = {
        let session = Arc::clone(&session);
        std::thread::spawn(move || {
            while session.load(Ordering::SeqCst) {
                if !RUNNING.load(Ordering::SeqCst) || !connected.load(Ordering::SeqCst) {
                    session.store(false, Ordering::SeqCst);
                    break;
                }
                std::thread::sleep(GUARD_POLL);
            }
        })
    };

    let mut episode = MuteEpisode::new(config.episode.to_settings());
    companion::run(&mut episode, volume, link, &triggers, &session, |event| {
        println!("[mute] {}", describe(event));
        hooks.fire(event);
    });

    session.store(false, Ordering::SeqCst);
    let _ = guard.join();

    // Unblocks a forwarder parked in `notify`.
    drop(triggers);
    link.disconnect();
    forwarder.stop();
}

pub(super) fn cmd_companion(config_path: Option<&Path>) -> Result<()> {
    let config = super::load_valid_config(config_path)?;
    let volume = audio::open_input_volume()?;
    let central = BleCentral::open()?;
    let hooks = HookRunner::new(&config);

    banner(&config, &volume);

    let mut reconnect = ReconnectState::with_defaults();
    println!("[link] looking for {}...", config.device_name);
    while RUNNING.load(Ordering::SeqCst) {
        let Some(link) = try_attempt(&mut reconnect, || {
            central.connect(&config.device_name, config.scan_timeout())
        }) else {
            std::thread::sleep(reconnect.time_until_attempt().min(RECONNECT_POLL));
            continue;
        };

        println!("[link] connected to {}", link.address());
        run_session(&link, &config, &volume, &hooks);

        if RUNNING.load(Ordering::SeqCst) {
            println!("[link] lost connection, reconnecting...");
        }
    }

    println!();
    println!("Done.");
    Ok(())
}
