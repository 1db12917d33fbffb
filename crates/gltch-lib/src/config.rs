//! Companion configuration stored as TOML under the platform config directory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::MAX_LEVEL;
use crate::episode::{ConfirmPolicy, EpisodeSettings};
use crate::protocol::DEVICE_NAME;

/// Header comment prepended to files written by `gltch config --init`.
const CONFIG_HEADER: &str =
    "# Gltch companion configuration. Run `gltch config` to see the effective values.\n\n";

/// Longest accepted `startup_grace_secs`.
pub const MAX_STARTUP_GRACE_SECS: u64 = 3600;

/// Longest accepted `tick_ms`.
pub const MAX_TICK_MS: u64 = 60_000;

/// Longest accepted `scan_secs`.
pub const MAX_SCAN_SECS: u64 = 600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Advertised name of the controller to connect to. Default: "Gltch Cntl".
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// How long a discovery scan runs before giving up.
    #[serde(default = "default_scan_secs")]
    pub scan_secs: u64,

    /// Command to run when a mute is reported to the controller. Empty = disabled.
    #[serde(default)]
    pub on_mute_command: String,

    /// Command to run when a mute ends. Empty = disabled.
    #[serde(default)]
    pub on_unmute_command: String,

    #[serde(default)]
    pub episode: EpisodeConfig,
}

/// `[episode]` table: mute timing and volume levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeConfig {
    /// Input level applied on a mute trigger (0–100).
    #[serde(default)]
    pub mute_level: u8,

    /// Input level restored on recovery (0–100).
    #[serde(default = "default_restore_level")]
    pub restore_level: u8,

    #[serde(default = "default_standby_after_secs")]
    pub standby_after_secs: u64,

    #[serde(default = "default_recover_after_secs")]
    pub recover_after_secs: u64,

    /// Delay before the startup standby frame.
    #[serde(default = "default_startup_grace_secs")]
    pub startup_grace_secs: u64,

    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// "on-failure" (default) or "on-success".
    #[serde(default)]
    pub confirm_policy: ConfirmPolicy,
}

fn default_device_name() -> String {
    DEVICE_NAME.into()
}
fn default_scan_secs() -> u64 {
    5
}
fn default_restore_level() -> u8 {
    80
}
fn default_standby_after_secs() -> u64 {
    15
}
fn default_recover_after_secs() -> u64 {
    10
}
fn default_startup_grace_secs() -> u64 {
    5
}
fn default_tick_ms() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device_name: default_device_name(),
            scan_secs: default_scan_secs(),
            on_mute_command: String::new(),
            on_unmute_command: String::new(),
            episode: EpisodeConfig::default(),
        }
    }
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        EpisodeConfig {
            mute_level: 0,
            restore_level: default_restore_level(),
            standby_after_secs: default_standby_after_secs(),
            recover_after_secs: default_recover_after_secs(),
            startup_grace_secs: default_startup_grace_secs(),
            tick_ms: default_tick_ms(),
            confirm_policy: ConfirmPolicy::default(),
        }
    }
}

impl EpisodeConfig {
    pub fn to_settings(&self) -> EpisodeSettings {
        EpisodeSettings {
            standby_after: Duration::from_secs(self.standby_after_secs),
            recover_after: Duration::from_secs(self.recover_after_secs),
            startup_grace: Duration::from_secs(self.startup_grace_secs),
            tick: Duration::from_millis(self.tick_ms),
            mute_level: self.mute_level,
            restore_level: self.restore_level,
            policy: self.confirm_policy,
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `device_name` is empty or whitespace-only.
    EmptyDeviceName,
    /// A volume level is above 100 (`field` names the key).
    LevelOutOfRange { field: &'static str, value: u8 },
    /// Recovery must be attempted before the standby deadline.
    RecoverNotBeforeStandby { recover: u64, standby: u64 },
    ZeroTick,
    ZeroScan,
    GraceTooLong(u64),
    TickTooLong(u64),
    ScanTooLong(u64),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyDeviceName => write!(f, "Device name cannot be empty"),
            ValidationError::LevelOutOfRange { field, value } => {
                write!(f, "Invalid {field}: {value} (max {MAX_LEVEL})")
            }
            ValidationError::RecoverNotBeforeStandby { recover, standby } => write!(
                f,
                "recover_after_secs ({recover}) must be less than standby_after_secs ({standby})"
            ),
            ValidationError::ZeroTick => write!(f, "tick_ms must be greater than 0"),
            ValidationError::ZeroScan => write!(f, "scan_secs must be greater than 0"),
            ValidationError::GraceTooLong(secs) => write!(
                f,
                "startup_grace_secs ({secs}) must be at most {MAX_STARTUP_GRACE_SECS}"
            ),
            ValidationError::TickTooLong(ms) => {
                write!(f, "tick_ms ({ms}) must be at most {MAX_TICK_MS}")
            }
            ValidationError::ScanTooLong(secs) => {
                write!(f, "scan_secs ({secs}) must be at most {MAX_SCAN_SECS}")
            }
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        #[cfg(windows)]
        {
            dirs::config_dir().map(|p| p.join("Gltch"))
        }
        #[cfg(not(windows))]
        {
            dirs::config_dir().map(|p| p.join("gltch"))
        }
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Load config from disk, or return defaults if not found.
    pub fn load() -> Self {
        let (config, warnings) = Self::load_with_warnings();
        for w in &warnings {
            log::warn!("{w}");
        }
        config
    }

    /// Save config to an arbitrary path atomically (write to temp file, then rename).
    ///
    /// A header comment is prepended.
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems; fall back to direct write + cleanup
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_secs)
    }

    /// Validate the entire config, collecting all errors.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.device_name.trim().is_empty() {
            errors.push(ValidationError::EmptyDeviceName);
        }
        if self.scan_secs == 0 {
            errors.push(ValidationError::ZeroScan);
        } else if self.scan_secs > MAX_SCAN_SECS {
            errors.push(ValidationError::ScanTooLong(self.scan_secs));
        }

        let ep = &self.episode;
        for (field, value) in [
            ("mute_level", ep.mute_level),
            ("restore_level", ep.restore_level),
        ] {
            if value > MAX_LEVEL {
                errors.push(ValidationError::LevelOutOfRange { field, value });
            }
        }
        if ep.recover_after_secs >= ep.standby_after_secs {
            errors.push(ValidationError::RecoverNotBeforeStandby {
                recover: ep.recover_after_secs,
                standby: ep.standby_after_secs,
            });
        }
        if ep.tick_ms == 0 {
            errors.push(ValidationError::ZeroTick);
        } else if ep.tick_ms > MAX_TICK_MS {
            errors.push(ValidationError::TickTooLong(ep.tick_ms));
        }
        if ep.startup_grace_secs > MAX_STARTUP_GRACE_SECS {
            errors.push(ValidationError::GraceTooLong(ep.startup_grace_secs));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Config defaults ──

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.device_name, "Gltch Cntl");
        assert_eq!(c.scan_secs, 5);
        assert!(c.on_mute_command.is_empty());
        assert_eq!(c.episode.mute_level, 0);
        assert_eq!(c.episode.restore_level, 80);
        assert_eq!(c.episode.confirm_policy, ConfirmPolicy::OnFailure);
    }

    #[test]
    fn default_settings_match_episode_defaults() {
        assert_eq!(
            Config::default().episode.to_settings(),
            EpisodeSettings::default()
        );
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r#"
device_name = "Bench Unit"

[episode]
restore_level = 65
"#;
        let c: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(c.device_name, "Bench Unit");
        assert_eq!(c.episode.restore_level, 65);
        // Missing fields get defaults
        assert_eq!(c.scan_secs, 5);
        assert_eq!(c.episode.standby_after_secs, 15);
        assert_eq!(c.episode.tick_ms, 1000);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let c: Config = toml::from_str("").unwrap();
        assert_eq!(c, Config::default());
    }

    #[test]
    fn confirm_policy_parses_kebab_case() {
        let c: Config = toml::from_str("[episode]\nconfirm_policy = \"on-success\"").unwrap();
        assert_eq!(c.episode.confirm_policy, ConfirmPolicy::OnSuccess);
        let s = c.episode.to_settings();
        assert_eq!(s.policy, ConfirmPolicy::OnSuccess);
    }

    #[test]
    fn unknown_confirm_policy_is_error() {
        let result: std::result::Result<Config, _> =
            toml::from_str("[episode]\nconfirm_policy = \"sometimes\"");
        assert!(result.is_err());
    }

    #[test]
    fn wrong_type_toml_is_error() {
        let result: std::result::Result<Config, _> = toml::from_str("scan_secs = \"five\"");
        assert!(result.is_err());
    }

    #[test]
    fn to_settings_converts_units() {
        let ep = EpisodeConfig {
            standby_after_secs: 30,
            recover_after_secs: 20,
            startup_grace_secs: 1,
            tick_ms: 250,
            ..EpisodeConfig::default()
        };
        let s = ep.to_settings();
        assert_eq!(s.standby_after, Duration::from_secs(30));
        assert_eq!(s.recover_after, Duration::from_secs(20));
        assert_eq!(s.startup_grace, Duration::from_secs(1));
        assert_eq!(s.tick, Duration::from_millis(250));
    }

    #[test]
    fn config_path_ends_with_toml() {
        let Some(path) = Config::path() else {
            return;
        };
        assert_eq!(path.file_name().unwrap(), "config.toml");
    }

    // ── validate ──

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_empty_device_name() {
        let c = Config {
            device_name: "   ".into(),
            ..Config::default()
        };
        assert_eq!(c.validate(), Err(vec![ValidationError::EmptyDeviceName]));
    }

    #[test]
    fn validate_recover_must_precede_standby() {
        let mut c = Config::default();
        c.episode.recover_after_secs = 15;
        let errs = c.validate().unwrap_err();
        assert_eq!(
            errs,
            vec![ValidationError::RecoverNotBeforeStandby {
                recover: 15,
                standby: 15
            }]
        );
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let mut c = Config {
            device_name: String::new(),
            scan_secs: 0,
            ..Config::default()
        };
        c.episode.mute_level = 101;
        c.episode.restore_level = 200;
        c.episode.tick_ms = 0;
        let errs = c.validate().unwrap_err();
        assert_eq!(errs.len(), 5);
        assert!(errs.contains(&ValidationError::LevelOutOfRange {
            field: "restore_level",
            value: 200
        }));
        assert!(errs.contains(&ValidationError::ZeroTick));
    }

    #[test]
    fn validate_rejects_unbounded_durations() {
        let mut c = Config {
            scan_secs: MAX_SCAN_SECS + 1,
            ..Config::default()
        };
        c.episode.startup_grace_secs = 9_223_372_036_854_775_807;
        c.episode.tick_ms = MAX_TICK_MS + 1;
        let errs = c.validate().unwrap_err();
        assert_eq!(
            errs,
            vec![
                ValidationError::ScanTooLong(MAX_SCAN_SECS + 1),
                ValidationError::TickTooLong(MAX_TICK_MS + 1),
                ValidationError::GraceTooLong(9_223_372_036_854_775_807),
            ]
        );
    }

    #[test]
    fn validate_accepts_upper_bounds() {
        let mut c = Config {
            scan_secs: MAX_SCAN_SECS,
            ..Config::default()
        };
        c.episode.startup_grace_secs = MAX_STARTUP_GRACE_SECS;
        c.episode.tick_ms = MAX_TICK_MS;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn huge_grace_from_file_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[episode]\nstartup_grace_secs = 9223372036854775807\n").unwrap();
        let (c, warnings) = Config::load_from(&path);
        assert!(warnings.is_empty());
        let errs = c.validate().unwrap_err();
        assert!(errs[0].to_string().contains("startup_grace_secs"));
    }

    #[test]
    fn validation_error_display() {
        assert_eq!(
            ValidationError::EmptyDeviceName.to_string(),
            "Device name cannot be empty"
        );
        assert_eq!(
            ValidationError::LevelOutOfRange {
                field: "mute_level",
                value: 120
            }
            .to_string(),
            "Invalid mute_level: 120 (max 100)"
        );
    }

    // ── save_to / load_from ──

    #[test]
    fn save_to_load_from_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config {
            device_name: "Desk Cntl".into(),
            scan_secs: 12,
            on_mute_command: "echo muted".into(),
            on_unmute_command: "echo unmuted".into(),
            episode: EpisodeConfig {
                mute_level: 5,
                restore_level: 70,
                standby_after_secs: 20,
                recover_after_secs: 8,
                startup_grace_secs: 2,
                tick_ms: 500,
                confirm_policy: ConfirmPolicy::OnSuccess,
            },
        };
        config.save_to(&path).unwrap();

        let (loaded, warnings) = Config::load_from(&path);
        assert!(warnings.is_empty());
        assert_eq!(loaded, config);
    }

    #[test]
    fn save_to_includes_header_comment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        Config::default().save_to(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(
            contents.starts_with("# Gltch companion configuration"),
            "saved file should start with header comment"
        );
    }

    #[test]
    fn save_to_cleans_up_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        Config::default().save_to(&path).unwrap();
        let tmp = dir.path().join("config.toml.tmp");
        assert!(!tmp.exists(), "temp file should not remain after save");
    }

    #[test]
    fn save_to_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("gltch").join("config.toml");
        Config::default().save_to(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn load_from_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.toml");

        let (config, warnings) = Config::load_from(&path);
        assert!(warnings.is_empty());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_from_invalid_toml_returns_defaults_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is { not valid toml").unwrap();

        let (config, warnings) = Config::load_from(&path);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("config parse error"));
        assert_eq!(config.device_name, "Gltch Cntl");
    }
}
