//! OS microphone input volume: trait plus platform backends.
//!
//! Each backend exposes a 0–100 input level. Muting is expressed as setting
//! the level (0 to mute, the restore level to unmute); [`set_and_verify`]
//! reads the level back and treats a mismatch as a failure.

use std::fmt;

#[derive(Debug)]
pub enum AudioError {
    InitFailed(String),
    OperationFailed(String),
    /// The level read back after a set did not match the request.
    Mismatch { expected: u8, actual: u8 },
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioError::InitFailed(e) => write!(f, "Audio init failed: {e}"),
            AudioError::OperationFailed(e) => write!(f, "Audio operation failed: {e}"),
            AudioError::Mismatch { expected, actual } => {
                write!(f, "Input volume is {actual}, expected {expected}")
            }
        }
    }
}

impl std::error::Error for AudioError {}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Highest input level accepted by [`InputVolume::set_input_volume`].
pub const MAX_LEVEL: u8 = 100;

/// Default capture device input volume.
pub trait InputVolume {
    fn set_input_volume(&self, level: u8) -> Result<()>;
    fn get_input_volume(&self) -> Result<u8>;
}

impl<T: InputVolume + ?Sized> InputVolume for Box<T> {
    fn set_input_volume(&self, level: u8) -> Result<()> {
        (**self).set_input_volume(level)
    }
    fn get_input_volume(&self) -> Result<u8> {
        (**self).get_input_volume()
    }
}

/// Set the input level, then read it back.
pub fn set_and_verify(volume: &impl InputVolume, level: u8) -> Result<()> {
    volume.set_input_volume(level)?;
    let actual = volume.get_input_volume()?;
    if actual != level {
        return Err(AudioError::Mismatch {
            expected: level,
            actual,
        });
    }
    Ok(())
}

// ── macOS osascript implementation ──

#[cfg(target_os = "macos")]
mod osascript {
    use super::*;
    use std::process::Command;

    /// Drives `osascript` for the system input volume.
    pub struct OsascriptVolume;

    fn run(script: &str) -> Result<String> {
        let out = Command::new("osascript")
            .args(["-e", script])
            .output()
            .map_err(|e| AudioError::OperationFailed(format!("osascript: {e}")))?;
        if !out.status.success() {
            return Err(AudioError::OperationFailed(format!(
                "osascript exited with {}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    impl InputVolume for OsascriptVolume {
        fn set_input_volume(&self, level: u8) -> Result<()> {
            run(&format!("set volume input volume {}", level.min(MAX_LEVEL)))?;
            Ok(())
        }

        fn get_input_volume(&self) -> Result<u8> {
            let out = run("input volume of (get volume settings)")?;
            out.trim().parse::<u8>().map_err(|e| {
                AudioError::OperationFailed(format!("unexpected volume {:?}: {e}", out.trim()))
            })
        }
    }
}

#[cfg(target_os = "macos")]
pub use osascript::OsascriptVolume;

// ── Windows WASAPI implementation ──

#[cfg(windows)]
mod wasapi {
    use super::*;

    use windows::Win32::Media::Audio::Endpoints::IAudioEndpointVolume;
    use windows::Win32::Media::Audio::{IMMDeviceEnumerator, MMDeviceEnumerator, eCapture, eConsole};
    use windows::Win32::System::Com::{
        CLSCTX_ALL, COINIT_MULTITHREADED, CoCreateInstance, CoInitializeEx,
    };

    /// Master scalar volume of the default capture endpoint.
    ///
    /// COM objects are created per call so the backend can be used from any
    /// thread without apartment bookkeeping.
    pub struct WasapiVolume;

    fn endpoint() -> Result<IAudioEndpointVolume> {
        unsafe {
            // S_FALSE (already initialized) is fine; a mode clash is not fatal either.
            let _ = CoInitializeEx(None, COINIT_MULTITHREADED);

            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                    .map_err(|e| AudioError::InitFailed(format!("MMDeviceEnumerator: {e}")))?;

            let device = enumerator
                .GetDefaultAudioEndpoint(eCapture, eConsole)
                .map_err(|e| AudioError::InitFailed(format!("GetDefaultAudioEndpoint: {e}")))?;

            device
                .Activate(CLSCTX_ALL, None)
                .map_err(|e| AudioError::InitFailed(format!("IAudioEndpointVolume: {e}")))
        }
    }

    impl InputVolume for WasapiVolume {
        fn set_input_volume(&self, level: u8) -> Result<()> {
            let volume = endpoint()?;
            let scalar = f32::from(level.min(MAX_LEVEL)) / 100.0;
            unsafe {
                volume
                    .SetMasterVolumeLevelScalar(scalar, std::ptr::null())
                    .map_err(|e| AudioError::OperationFailed(format!("SetMasterVolume: {e}")))
            }
        }

        fn get_input_volume(&self) -> Result<u8> {
            let volume = endpoint()?;
            let scalar = unsafe {
                volume
                    .GetMasterVolumeLevelScalar()
                    .map_err(|e| AudioError::OperationFailed(format!("GetMasterVolume: {e}")))?
            };
            Ok((scalar.clamp(0.0, 1.0) * 100.0).round() as u8)
        }
    }
}

#[cfg(windows)]
pub use wasapi::WasapiVolume;

// ── Linux PulseAudio implementation ──

#[cfg(target_os = "linux")]
mod pulse {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use libpulse_binding::callbacks::ListResult;
    use libpulse_binding::context::{Context, FlagSet as ContextFlagSet, State as ContextState};
    use libpulse_binding::mainloop::threaded::Mainloop;
    use libpulse_binding::operation::{Operation, State as OperationState};
    use libpulse_binding::volume::{ChannelVolumes, Volume};

    const DEFAULT_SOURCE: &str = "@DEFAULT_SOURCE@";

    struct PulseInner {
        mainloop: Mainloop,
        context: Context,
    }

    pub struct PulseInputVolume {
        inner: Mutex<PulseInner>,
    }

    // PulseAudio threaded mainloop is designed for concurrent access.
    // The Mutex<PulseInner> ensures safe mutable access from &self methods.
    unsafe impl Send for PulseInputVolume {}
    unsafe impl Sync for PulseInputVolume {}

    fn wait_done<F: ?Sized>(mainloop: &mut Mainloop, op: &Operation<F>) {
        loop {
            mainloop.lock();
            let state = op.get_state();
            mainloop.unlock();
            match state {
                OperationState::Running => std::thread::sleep(Duration::from_millis(5)),
                OperationState::Done | OperationState::Cancelled => break,
            }
        }
    }

    fn to_level(v: Volume) -> u8 {
        let pct = (u64::from(v.0) * 100 + u64::from(Volume::NORMAL.0) / 2) / u64::from(Volume::NORMAL.0);
        pct.min(u64::from(MAX_LEVEL)) as u8
    }

    fn to_volume(level: u8) -> Volume {
        Volume((u64::from(Volume::NORMAL.0) * u64::from(level.min(MAX_LEVEL)) / 100) as u32)
    }

    impl PulseInputVolume {
        /// Connect to the PulseAudio/PipeWire server.
        pub fn new() -> Result<Self> {
            let mut mainloop = Mainloop::new().ok_or_else(|| {
                AudioError::InitFailed("PulseAudio mainloop creation failed".into())
            })?;

            let mut context = Context::new(&mainloop, "gltch").ok_or_else(|| {
                AudioError::InitFailed("PulseAudio context creation failed".into())
            })?;

            context
                .connect(None, ContextFlagSet::NOFLAGS, None)
                .map_err(|e| AudioError::InitFailed(format!("PulseAudio connect: {e}")))?;

            mainloop
                .start()
                .map_err(|e| AudioError::InitFailed(format!("PulseAudio mainloop start: {e}")))?;

            loop {
                mainloop.lock();
                let state = context.get_state();
                mainloop.unlock();
                match state {
                    ContextState::Ready => break,
                    ContextState::Failed | ContextState::Terminated => {
                        return Err(AudioError::InitFailed(
                            "PulseAudio context connection failed".into(),
                        ));
                    }
                    _ => std::thread::sleep(Duration::from_millis(10)),
                }
            }

            Ok(PulseInputVolume {
                inner: Mutex::new(PulseInner { mainloop, context }),
            })
        }

        fn source_volume(&self, inner: &mut PulseInner) -> Result<ChannelVolumes> {
            let slot: Arc<Mutex<Option<ChannelVolumes>>> = Arc::new(Mutex::new(None));
            let slot_cb = Arc::clone(&slot);
            inner.mainloop.lock();
            let op = inner
                .context
                .introspect()
                .get_source_info_by_name(DEFAULT_SOURCE, move |result| {
                    if let ListResult::Item(info) = result
                        && let Ok(mut s) = slot_cb.lock()
                    {
                        *s = Some(info.volume);
                    }
                });
            inner.mainloop.unlock();
            wait_done(&mut inner.mainloop, &op);

            let found = slot.lock().ok().and_then(|s| *s);
            found.ok_or_else(|| AudioError::OperationFailed("default source not found".into()))
        }
    }

    impl InputVolume for PulseInputVolume {
        fn set_input_volume(&self, level: u8) -> Result<()> {
            let mut inner = self.inner.lock().map_err(|e| {
                AudioError::OperationFailed(format!("PulseAudio mutex poisoned: {e}"))
            })?;
            let mut volumes = self.source_volume(&mut inner)?;
            let channels = volumes.len();
            volumes.set(channels, to_volume(level));

            inner.mainloop.lock();
            let mut introspect = inner.context.introspect();
            let op = introspect.set_source_volume_by_name(DEFAULT_SOURCE, &volumes, None);
            inner.mainloop.unlock();
            wait_done(&mut inner.mainloop, &op);
            Ok(())
        }

        fn get_input_volume(&self) -> Result<u8> {
            let mut inner = self.inner.lock().map_err(|e| {
                AudioError::OperationFailed(format!("PulseAudio mutex poisoned: {e}"))
            })?;
            Ok(to_level(self.source_volume(&mut inner)?.avg()))
        }
    }

    impl Drop for PulseInputVolume {
        fn drop(&mut self) {
            if let Ok(mut inner) = self.inner.lock() {
                inner.mainloop.lock();
                inner.context.disconnect();
                inner.mainloop.unlock();
                inner.mainloop.stop();
            }
        }
    }

}

#[cfg(target_os = "linux")]
pub use pulse::PulseInputVolume;

/// Open the input volume backend for the current platform.
pub fn open_input_volume() -> Result<Box<dyn InputVolume + Send>> {
    #[cfg(target_os = "macos")]
    {
        Ok(Box::new(OsascriptVolume))
    }
    #[cfg(windows)]
    {
        Ok(Box::new(WasapiVolume))
    }
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(PulseInputVolume::new()?))
    }
    #[cfg(not(any(target_os = "macos", windows, target_os = "linux")))]
    {
        Err(AudioError::InitFailed(
            "Input volume control is not supported on this platform.".into(),
        ))
    }
}

// ── Test stub ──

/// Scriptable [`InputVolume`] for unit and integration tests.
pub mod stub {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

    pub struct StubVolume {
        level: AtomicU8,
        /// Every `set_input_volume` call fails while set.
        pub fail_set: AtomicBool,
        /// Sets are accepted but the level does not move (verification mismatch).
        pub stuck: AtomicBool,
        /// Requested levels, in call order (including failed calls).
        pub requests: Mutex<Vec<u8>>,
    }

    impl StubVolume {
        pub fn new(initial: u8) -> Self {
            StubVolume {
                level: AtomicU8::new(initial),
                fail_set: AtomicBool::new(false),
                stuck: AtomicBool::new(false),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// A stub whose every set call fails.
        pub fn failing() -> Self {
            let s = Self::new(80);
            s.set_failing(true);
            s
        }

        pub fn set_failing(&self, fail: bool) {
            self.fail_set.store(fail, Ordering::SeqCst);
        }

        pub fn requests(&self) -> Vec<u8> {
            self.requests.lock().map(|r| r.clone()).unwrap_or_default()
        }
    }

    impl InputVolume for StubVolume {
        fn set_input_volume(&self, level: u8) -> Result<()> {
            if let Ok(mut r) = self.requests.lock() {
                r.push(level);
            }
            if self.fail_set.load(Ordering::SeqCst) {
                return Err(AudioError::OperationFailed("stub failure".into()));
            }
            if !self.stuck.load(Ordering::SeqCst) {
                self.level.store(level.min(MAX_LEVEL), Ordering::SeqCst);
            }
            Ok(())
        }

        fn get_input_volume(&self) -> Result<u8> {
            Ok(self.level.load(Ordering::SeqCst))
        }
    }
}
