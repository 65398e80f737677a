//! Configuration Vault – reads/writes `~/.avatar/config.toml`.

use std::fs;
use std::path::PathBuf;

use avatar_runtime::AvatarLoopConfig;
use avatar_types::AvatarError;
use serde::{Deserialize, Serialize};

/// Persisted demo configuration stored in `~/.avatar/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Stop the demo after this many seconds; `0` runs until Ctrl-C.
    #[serde(default)]
    pub demo_seconds: u64,

    /// Camera id shown in logs.
    #[serde(default = "default_camera")]
    pub camera: String,

    /// Every tunable of the tracking and gesture loop.
    #[serde(default)]
    pub avatar: AvatarLoopConfig,
}

fn default_camera() -> String {
    "sim-camera".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            demo_seconds: 0,
            camera: default_camera(),
            avatar: AvatarLoopConfig::default(),
        }
    }
}

/// Return the path to `~/.avatar/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".avatar").join("config.toml")
}

/// Load the config from disk. Returns `None` if the file does not exist.
/// Environment overrides are not applied here; see [`apply_env_overrides`].
pub fn load() -> Result<Option<Config>, AvatarError> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, AvatarError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| AvatarError::Config(format!("Failed to read config at {}: {}", path.display(), e)))?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| AvatarError::Config(format!("Failed to parse config: {}", e)))
}

/// Apply `AVATAR_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `AVATAR_FRAME_RATE` | `avatar.frame_rate_hz` |
/// | `AVATAR_COOLDOWN_MS` | `avatar.gesture.cooldown_ms` |
/// | `AVATAR_MAX_WAVES` | `avatar.gesture.max_consecutive` |
/// | `AVATAR_DEMO_SECONDS` | `demo_seconds` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Some(hz) = env_parse::<u32>("AVATAR_FRAME_RATE")
        && hz > 0
    {
        cfg.avatar.frame_rate_hz = hz;
    }
    if let Some(ms) = env_parse("AVATAR_COOLDOWN_MS") {
        cfg.avatar.gesture.cooldown_ms = ms;
    }
    if let Some(n) = env_parse("AVATAR_MAX_WAVES") {
        cfg.avatar.gesture.max_consecutive = n;
    }
    if let Some(s) = env_parse("AVATAR_DEMO_SECONDS") {
        cfg.demo_seconds = s;
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok()?.trim().parse().ok()
}

/// Save the config to disk, creating `~/.avatar/` if necessary.
pub fn save(cfg: &Config) -> Result<(), AvatarError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), AvatarError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AvatarError::Config(format!("Failed to create config directory: {}", e)))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| AvatarError::Config(format!("Failed to set config directory permissions: {}", e)))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| AvatarError::Config(format!("Failed to serialize config: {}", e)))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| AvatarError::Config(format!("Failed to write config at {}: {}", path.display(), e)))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| AvatarError::Config(format!("Failed to write config at {}: {}", path.display(), e)))?;
    Ok(())
}
