/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Configuration system for the note editor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::graph::layout::LayoutSettings;

/// Get the config directory for notegraph
pub fn config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            PathBuf::from(appdata).join("notegraph")
        } else {
            PathBuf::from(".notegraph")
        }
    }

    #[cfg(not(target_os = "windows"))]
    {
        if let Some(config_home) = dirs::config_dir() {
            config_home.join("notegraph")
        } else {
            PathBuf::from(".notegraph")
        }
    }
}

/// Layout and timing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Horizontal gap between a node and its detail subtree
    pub gap_x: f32,

    /// Vertical gap between chained nodes
    pub gap_y: f32,

    /// Box size used when a node carries no explicit override
    pub default_width: f32,
    pub default_height: f32,

    /// Inner padding of an expanded group box
    pub group_pad_x: f32,
    pub group_pad_y: f32,

    /// Milliseconds the panel waits after an edit before sending save-note
    pub panel_save_delay_ms: u64,

    /// Milliseconds the host waits before writing a saved document
    pub host_save_delay_ms: u64,

    /// Milliseconds to wait for the host to answer an id request
    pub id_timeout_ms: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        let settings = LayoutSettings::default();
        Self {
            gap_x: settings.gap_x,
            gap_y: settings.gap_y,
            default_width: settings.default_width,
            default_height: settings.default_height,
            group_pad_x: settings.group_pad_x,
            group_pad_y: settings.group_pad_y,
            panel_save_delay_ms: 800,
            host_save_delay_ms: 500,
            id_timeout_ms: 5000,
        }
    }
}

impl LayoutConfig {
    /// Load the config file, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if let Ok(contents) = std::fs::read_to_string(path) {
            if let Ok(config) = toml::from_str(&contents) {
                return config;
            }
        }

        Self::default()
    }

    /// Save to the config file
    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        std::fs::write(path, toml_string)?;
        Ok(())
    }

    pub fn layout_settings(&self) -> LayoutSettings {
        LayoutSettings {
            gap_x: self.gap_x,
            gap_y: self.gap_y,
            default_width: self.default_width,
            default_height: self.default_height,
            group_pad_x: self.group_pad_x,
            group_pad_y: self.group_pad_y,
        }
    }

    pub fn panel_save_delay(&self) -> Duration {
        Duration::from_millis(self.panel_save_delay_ms)
    }

    pub fn host_save_delay(&self) -> Duration {
        Duration::from_millis(self.host_save_delay_ms)
    }

    pub fn id_timeout(&self) -> Duration {
        Duration::from_millis(self.id_timeout_ms)
    }

    fn config_path() -> PathBuf {
        config_dir().join("layout.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = LayoutConfig::load_from(&dir.path().join("layout.toml"));
        assert_eq!(config, LayoutConfig::default());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("layout.toml");

        let mut config = LayoutConfig::default();
        config.gap_x = 140.0;
        config.panel_save_delay_ms = 1000;
        config.save_to(&path).unwrap();

        assert_eq!(LayoutConfig::load_from(&path), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("layout.toml");
        std::fs::write(&path, "gap_y = 75.0\n").unwrap();

        let config = LayoutConfig::load_from(&path);
        assert_eq!(config.gap_y, 75.0);
        assert_eq!(config.gap_x, LayoutConfig::default().gap_x);
    }

    #[test]
    fn test_layout_settings_conversion() {
        let config = LayoutConfig::default();
        let settings = config.layout_settings();
        assert_eq!(settings.gap_x, config.gap_x);
        assert_eq!(settings.default_height, config.default_height);
    }
}
