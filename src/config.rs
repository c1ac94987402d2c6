use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Hardware id fragment of the Xiaomi Bluetooth gamepad (VID 2717, PID 3144).
pub const DEFAULT_DEVICE_FILTER: &str = "vid&00022717_pid&3144";

/// Timing knobs handed to every device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    /// Upper bound of a single blocking read; also the cancellation latency.
    pub read_timeout: Duration,
    /// How long the guide button stays latched after a pulse.
    pub guide_release: Duration,
    /// Silence after which a vibrating pad is forced back to rest.
    pub vibration_reset: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(1000),
            guide_release: Duration::from_millis(200),
            vibration_reset: Duration::from_millis(3000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Case-insensitive substring matched against HID interface paths.
    pub device_filter: String,
    pub poll_interval_ms: u64,
    pub read_timeout_ms: u64,
    pub guide_release_ms: u64,
    pub vibration_reset_ms: u64,
    /// How often the aggregated player/battery status is pushed to the status sink.
    pub status_interval_ms: u64,
    /// Hide bridged pads from other applications and whitelist ourselves.
    pub hide_devices: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device_filter: DEFAULT_DEVICE_FILTER.into(),
            poll_interval_ms: 5000,
            read_timeout_ms: 1000,
            guide_release_ms: 200,
            vibration_reset_ms: 3000,
            status_interval_ms: 2000,
            hide_devices: true,
        }
    }
}

impl AppConfig {
    fn config_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| BridgeError::Config("Cannot find config directory".into()))?
            .join("padbridge");
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join("config.json"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Load from `path`, writing the defaults there first if nothing exists yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.device_filter.trim().is_empty() {
            return Err(BridgeError::Config("device_filter must not be empty".into()));
        }
        let durations = [
            ("poll_interval_ms", self.poll_interval_ms),
            ("read_timeout_ms", self.read_timeout_ms),
            ("guide_release_ms", self.guide_release_ms),
            ("vibration_reset_ms", self.vibration_reset_ms),
            ("status_interval_ms", self.status_interval_ms),
        ];
        for (name, value) in durations {
            if value == 0 {
                return Err(BridgeError::Config(format!("{} must be greater than 0", name)));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub fn timings(&self) -> SessionTimings {
        SessionTimings {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            guide_release: Duration::from_millis(self.guide_release_ms),
            vibration_reset: Duration::from_millis(self.vibration_reset_ms),
        }
    }
}
