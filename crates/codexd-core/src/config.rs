//! Bridge configuration
//!
//! Layered: built-in defaults, then an optional YAML file, then
//! `CODEXD_*` environment overrides.
//!
//! ```yaml
//! launch:
//!   command: codex
//!   provider: openai
//!   model: o4-mini
//!   approval_mode: full-auto
//! timing:
//!   debounce_ms: 1000
//!   inactivity_ms: 5000
//!   start_confirm_ms: 3000
//! markers:
//!   marker_token: codex
//!   box_border: top_edge
//! render:
//!   max_output_len: 2900
//! ```

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::pty::LaunchConfig;
use crate::render::RenderConfig;
use crate::semantic::{BoxBorder, MarkerConfig};
use crate::session::TimingConfig;
use crate::types::BridgeError;

/// Environment variable naming the YAML config file
pub const CONFIG_PATH_ENV: &str = "CODEXD_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub launch: LaunchConfig,
    pub timing: TimingConfig,
    pub markers: MarkerConfig,
    pub render: RenderConfig,
}

impl BridgeConfig {
    /// Load from file (if any) and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, BridgeError> {
        let mut config = match path {
            Some(path) => Self::load_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Read a YAML file. A missing file means defaults; a broken one is an error.
    pub fn load_file(path: &Path) -> Result<Self, BridgeError> {
        if !path.exists() {
            info!(path = ?path, "No config file found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            error!(error = %e, path = ?path, "Failed to read config");
            BridgeError::Io(e)
        })?;
        let config = Self::from_yaml(&content).map_err(|e| {
            error!(error = %e, path = ?path, "Failed to parse config");
            e
        })?;

        info!(path = ?path, "Config loaded");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, BridgeError> {
        serde_yaml::from_str(content).map_err(|e| BridgeError::Config(e.to_string()))
    }

    /// Apply `CODEXD_*` overrides. Unparseable values are logged and skipped.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CODEXD_COMMAND") {
            self.launch.command = v;
        }
        if let Some(v) = lookup("CODEXD_PROVIDER") {
            self.launch.provider = v;
        }
        if let Some(v) = lookup("CODEXD_MODEL") {
            self.launch.model = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = lookup("CODEXD_APPROVAL_MODE") {
            self.launch.approval_mode = v;
        }

        override_parsed(&lookup, "CODEXD_DEBOUNCE_MS", &mut self.timing.debounce_ms);
        override_parsed(&lookup, "CODEXD_INACTIVITY_MS", &mut self.timing.inactivity_ms);
        override_parsed(&lookup, "CODEXD_START_CONFIRM_MS", &mut self.timing.start_confirm_ms);
        override_parsed(&lookup, "CODEXD_MAX_OUTPUT_LEN", &mut self.render.max_output_len);
    }

    /// Reject settings the bridge cannot run with
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.launch.command.trim().is_empty() {
            return Err(BridgeError::Config("launch.command is empty".to_string()));
        }
        if self.launch.cols == 0 || self.launch.rows == 0 {
            return Err(BridgeError::Config(
                "launch.cols and launch.rows must be positive".to_string(),
            ));
        }
        if self.timing.debounce_ms == 0 {
            return Err(BridgeError::Config("timing.debounce_ms must be positive".to_string()));
        }
        if self.markers.marker_token.trim().is_empty() {
            return Err(BridgeError::Config("markers.marker_token is empty".to_string()));
        }
        if let BoxBorder::Literal(ref border) = self.markers.box_border {
            if border.trim().is_empty() {
                return Err(BridgeError::Config("markers.box_border literal is empty".to_string()));
            }
        }
        if self.render.max_output_len <= 10 {
            return Err(BridgeError::Config(
                "render.max_output_len must be greater than 10".to_string(),
            ));
        }
        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, name: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(name) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => warn!(var = name, value = %raw, "Ignoring unparseable override"),
    }
}
