/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Tunable controller settings, loadable from TOML.

use serde::{Deserialize, Serialize};

/// How many per-child attribute computations may run at once across all
/// fetches. Keeps fan-out bounded when the graph is wide.
const DEFAULT_FETCH_FAN_OUT: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeSettings {
    /// Permits on the shared fetch limiter. Must be at least 1.
    pub fetch_fan_out: usize,
}

impl Default for TreeSettings {
    fn default() -> Self {
        Self {
            fetch_fan_out: DEFAULT_FETCH_FAN_OUT,
        }
    }
}

#[derive(Debug)]
pub enum SettingsError {
    Parse(String),
    Invalid(String),
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Parse(e) => write!(f, "settings parse error: {e}"),
            SettingsError::Invalid(e) => write!(f, "invalid settings: {e}"),
        }
    }
}

impl TreeSettings {
    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        let settings: TreeSettings =
            toml::from_str(text).map_err(|e| SettingsError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.fetch_fan_out == 0 {
            return Err(SettingsError::Invalid(
                "fetch_fan_out must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
