use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::compliance::DEFAULT_PAIRING_DISTANCE_PX;
use crate::EngineSettings;

const DEFAULT_ADDR: &str = "0.0.0.0:8001";
const DEFAULT_DB_PATH: &str = "hardhat.db";
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_MJPEG_FPS: f64 = 30.0;
const DEFAULT_MAX_BATCH_FILES: usize = 50;

const DEFAULT_API_URL: &str = "http://localhost:8001";
const DEFAULT_CONF_THRESHOLD: f32 = 0.25;
const DEFAULT_GALLERY_DIR: &str = "hardhat-gallery";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_CLI_CONFIG_PATH: &str = "hardhat-cli.toml";

#[derive(Debug, Deserialize, Default)]
struct ServerConfigFile {
    addr: Option<String>,
    db_path: Option<String>,
    backend: Option<String>,
    pairing_distance_px: Option<f64>,
    mjpeg_fps: Option<f64>,
    max_batch_files: Option<usize>,
}

/// Settings for the `hardhatd` daemon. Resolved from the TOML file named
/// by `HARDHAT_CONFIG` (when set), then environment overrides.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub db_path: String,
    pub backend: String,
    pub pairing_distance_px: f64,
    pub mjpeg_fps: f64,
    pub max_batch_files: usize,
}

impl ServerConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("HARDHAT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => read_server_file(Path::new(path))?,
            None => ServerConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ServerConfigFile) -> Self {
        Self {
            addr: file.addr.unwrap_or_else(|| DEFAULT_ADDR.to_string()),
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            backend: file.backend.unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            pairing_distance_px: file
                .pairing_distance_px
                .unwrap_or(DEFAULT_PAIRING_DISTANCE_PX),
            mjpeg_fps: file.mjpeg_fps.unwrap_or(DEFAULT_MJPEG_FPS),
            max_batch_files: file.max_batch_files.unwrap_or(DEFAULT_MAX_BATCH_FILES),
        }
    }

    fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("HARDHAT_ADDR") {
            if !addr.trim().is_empty() {
                self.addr = addr;
            }
        }
        if let Ok(path) = std::env::var("HARDHAT_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(backend) = std::env::var("HARDHAT_BACKEND") {
            if !backend.trim().is_empty() {
                self.backend = backend;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.pairing_distance_px.is_finite() || self.pairing_distance_px <= 0.0 {
            return Err(anyhow!("pairing_distance_px must be a positive number"));
        }
        if !self.mjpeg_fps.is_finite() || self.mjpeg_fps <= 0.0 {
            return Err(anyhow!("mjpeg_fps must be a positive number"));
        }
        if self.max_batch_files == 0 {
            return Err(anyhow!("max_batch_files must be at least 1"));
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            pairing_distance_px: self.pairing_distance_px,
            mjpeg_fps: self.mjpeg_fps,
            max_batch_files: self.max_batch_files,
        }
    }
}

fn read_server_file(path: &Path) -> Result<ServerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

/// Settings for the `hardhat` CLI, kept in a small TOML file so
/// `settings set` can persist changes. Absent fields fall back to the
/// defaults, so a partial file is fine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_url: String,
    pub conf_threshold: f32,
    pub gallery_dir: String,
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            conf_threshold: DEFAULT_CONF_THRESHOLD,
            gallery_dir: DEFAULT_GALLERY_DIR.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Settings file location: `HARDHAT_CLI_CONFIG` or the default name in
    /// the working directory.
    pub fn path() -> PathBuf {
        std::env::var("HARDHAT_CLI_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CLI_CONFIG_PATH))
    }

    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
        let cfg: Self = toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = toml::to_string_pretty(self).map_err(|e| anyhow!("failed to encode config: {}", e))?;
        std::fs::write(path, raw)
            .map_err(|e| anyhow!("failed to write config file {}: {}", path.display(), e))?;
        Ok(())
    }

    /// Applies one `settings set KEY VALUE` pair.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "api_url" => self.api_url = value.to_string(),
            "conf_threshold" => {
                self.conf_threshold = value
                    .parse()
                    .map_err(|_| anyhow!("conf_threshold must be a number"))?;
            }
            "gallery_dir" => self.gallery_dir = value.to_string(),
            "timeout_secs" => {
                self.timeout_secs = value
                    .parse()
                    .map_err(|_| anyhow!("timeout_secs must be an integer"))?;
            }
            other => {
                return Err(anyhow!(
                    "unknown setting '{}', expected one of api_url, conf_threshold, gallery_dir, timeout_secs",
                    other
                ))
            }
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.conf_threshold) {
            return Err(anyhow!("conf_threshold must be between 0.0 and 1.0"));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("timeout_secs must be greater than zero"));
        }
        Ok(())
    }
}
