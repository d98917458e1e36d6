//! Overlay options supplied by the host loader.

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// INSERT.
pub const DEFAULT_TOGGLE_KEY: u32 = 0x2D;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OverlayConfig {
    /// Virtual-key code that shows/hides every module.
    pub toggle_key: u32,
    pub start_visible: bool,
    /// Let button/key releases reach the host even while input is captured.
    pub pass_button_up: bool,
    /// Bound of the queue used when the window procedure cannot take the
    /// overlay lock.
    pub max_pending_messages: usize,
    /// Apply the backend's dark theme to every new context.
    pub default_theme: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            toggle_key:           DEFAULT_TOGGLE_KEY,
            start_visible:        true,
            pass_button_up:       true,
            max_pending_messages: 256,
            default_theme:        true,
        }
    }
}

impl OverlayConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read `path`; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(s) => Self::from_toml_str(&s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no config at {}, using defaults", path.as_ref().display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}
