//! Configuration loading

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use vitrine_core::{CameraConfig, Color, ViewerOptions};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Presentation options applied to every loaded asset
    #[serde(default)]
    pub viewer: ViewerOptions,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Simulated display refresh rate
    #[serde(default = "default_refresh_hz")]
    pub refresh_hz: u32,
    /// Refresh ticks to run before exiting
    #[serde(default = "default_frames")]
    pub frames: u32,
    /// Viewport size in pixels
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            refresh_hz: default_refresh_hz(),
            frames: default_frames(),
            width: default_width(),
            height: default_height(),
        }
    }
}

fn default_refresh_hz() -> u32 {
    60
}

fn default_frames() -> u32 {
    120
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Bounding-box overlay line color
    #[serde(default = "default_overlay_color")]
    pub color: Color,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            color: default_overlay_color(),
        }
    }
}

fn default_overlay_color() -> Color {
    Color::GREEN
}

/// Load configuration from file, falling back to defaults when it is missing
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("vitrine.toml")).unwrap();
        assert_eq!(config.host.refresh_hz, 60);
        assert_eq!(config.host.frames, 120);
        assert_eq!(config.camera.fov, 75.0);
        assert_eq!(config.overlay.color, Color::GREEN);
        assert_eq!(config.viewer, ViewerOptions::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vitrine.toml");
        std::fs::write(
            &path,
            r##"
[viewer]
backgroundColor = "#202020"
autoRotateSpeed = 2.5
animationClips = ["Walk"]

[camera]
fov = 45.0

[host]
frames = 10

[overlay]
color = "ff0000"
"##,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.viewer.background_color, Color::rgb(0x20, 0x20, 0x20));
        assert_eq!(config.viewer.auto_rotate_speed, 2.5);
        assert_eq!(config.viewer.animation_clips, vec!["Walk".to_string()]);
        assert_eq!(config.viewer.zoom, 2.0);
        assert_eq!(config.camera.fov, 45.0);
        assert_eq!(config.camera.far, 10000.0);
        assert_eq!(config.host.frames, 10);
        assert_eq!(config.host.refresh_hz, 60);
        assert_eq!(config.overlay.color, Color::rgb(255, 0, 0));
    }

    #[test]
    fn test_bad_color_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vitrine.toml");
        std::fs::write(&path, "[overlay]\ncolor = \"not-a-color\"\n").unwrap();
        assert!(load_config(&path).is_err());
    }
}
