use std::{path::PathBuf, time::Duration};

use parse_display::Display;
use serde_derive::{Deserialize, Serialize};
use strum_macros::IntoStaticStr;
use thiserror::Error;
use validator::Validate;

mod layouts;
pub use layouts::*;

/// Opaque 8-bit color produced by the capture pipeline
pub type Color = palette::rgb::LinSrgba<u8>;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ZoneConfiguration {
    #[validate(range(max = 256))]
    pub top_zone_count: u32,
    #[validate(range(max = 256))]
    pub left_zone_count: u32,
    #[validate(range(max = 256))]
    pub right_zone_count: u32,
    #[validate(range(max = 256))]
    pub bottom_zone_count: u32,
    /// Thickness of the edge zones, as a fraction of the perpendicular screen dimension
    #[validate(range(min = 0.0, max = 1.0))]
    pub edge_thickness: f32,
    #[validate(range(min = 1, max = 240))]
    pub target_fps: u32,
    /// 0 keeps the previous colors forever, 1 follows the input instantly
    #[validate(range(min = 0.0, max = 1.0))]
    pub smoothing_alpha: f32,
    pub smoothing_enabled: bool,
}

impl Default for ZoneConfiguration {
    fn default() -> Self {
        Self {
            top_zone_count: 6,
            left_zone_count: 4,
            right_zone_count: 4,
            bottom_zone_count: 0,
            edge_thickness: 0.03,
            target_fps: 30,
            smoothing_alpha: 0.3,
            smoothing_enabled: true,
        }
    }
}

impl ZoneConfiguration {
    pub fn total_zone_count(&self) -> u32 {
        self.top_zone_count + self.left_zone_count + self.right_zone_count + self.bottom_zone_count
    }

    /// Minimum time between two processed frames
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.target_fps.max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[display(style = "lowercase")]
pub enum BackendKind {
    Gpu,
    Software,
}

impl Default for BackendKind {
    fn default() -> Self {
        Self::Gpu
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, IntoStaticStr)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Screen {
        /// Index of the monitor to capture
        #[serde(default)]
        display: usize,
        /// Rate at which the capture thread polls the screen
        #[serde(default = "default_source_fps")]
        fps: u32,
    },
    Still {
        path: PathBuf,
        #[serde(default = "default_source_fps")]
        fps: u32,
    },
}

fn default_source_fps() -> u32 {
    60
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::Screen {
            display: 0,
            fps: default_source_fps(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct CaptureConfig {
    pub backend: BackendKind,
    #[serde(default = "default_true")]
    pub zone_capture: bool,
    pub source: SourceConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            zone_capture: true,
            source: SourceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DummySinkMode {
    Text,
    Ansi,
}

impl Default for DummySinkMode {
    fn default() -> Self {
        Self::Ansi
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, IntoStaticStr)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    Dummy {
        #[serde(default)]
        mode: DummySinkMode,
    },
    #[serde(rename_all = "camelCase")]
    File {
        output: PathBuf,
        #[serde(default)]
        print_timestamp: bool,
    },
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self::Dummy {
            mode: DummySinkMode::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    #[validate(nested)]
    pub capture: CaptureConfig,
    #[validate(nested)]
    pub zones: ZoneConfiguration,
    pub sink: SinkConfig,
}

impl Config {
    pub async fn load_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let full = tokio::fs::read_to_string(path).await?;
        Self::from_toml(&full)
    }

    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;

        debug!(
            zones = %config.zones.total_zone_count(),
            backend = %config.capture.backend,
            "loaded configuration"
        );

        Ok(config)
    }

    /// Location of the per-user configuration file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("edgelight").join("config.toml"))
    }

    pub fn to_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::from_toml("").expect("failed to parse empty config");
        assert_eq!(config, Config::default());
        assert_eq!(config.zones.total_zone_count(), 14);
    }

    #[test]
    fn deserialize_full_config() {
        let config = Config::from_toml(
            r#"
            [capture]
            backend = "software"
            zoneCapture = false

            [capture.source]
            type = "still"
            path = "/tmp/frame.png"
            fps = 10

            [zones]
            topZoneCount = 2
            leftZoneCount = 0
            rightZoneCount = 0
            bottomZoneCount = 0
            edgeThickness = 0.1
            targetFps = 60
            smoothingAlpha = 0.5
            smoothingEnabled = false

            [sink]
            type = "file"
            output = "/tmp/colors.jsonl"
            printTimestamp = true
            "#,
        )
        .expect("failed to parse config");

        assert_eq!(config.capture.backend, BackendKind::Software);
        assert!(!config.capture.zone_capture);
        assert_eq!(
            config.capture.source,
            SourceConfig::Still {
                path: "/tmp/frame.png".into(),
                fps: 10
            }
        );
        assert_eq!(config.zones.total_zone_count(), 2);
        assert_eq!(config.zones.frame_interval(), Duration::from_secs(1) / 60);
        assert_eq!(
            config.sink,
            SinkConfig::File {
                output: "/tmp/colors.jsonl".into(),
                print_timestamp: true
            }
        );
    }

    #[test]
    fn reject_out_of_range_values() {
        let result = Config::from_toml(
            r#"
            [zones]
            smoothingAlpha = 1.5
            "#,
        );

        assert!(matches!(result, Err(ConfigError::Validation(_))));

        let result = Config::from_toml(
            r#"
            [zones]
            targetFps = 0
            "#,
        );

        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn reject_unknown_fields() {
        let result = Config::from_toml(
            r#"
            [zones]
            topZones = 3
            "#,
        );

        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn dump_and_reload() {
        let mut config = Config::default();
        config.zones.bottom_zone_count = 3;
        config.sink = SinkConfig::Dummy {
            mode: DummySinkMode::Text,
        };

        let dumped = config.to_string().expect("failed to serialize config");
        let reloaded = Config::from_toml(&dumped).expect("failed to reload config");

        assert_eq!(reloaded, config);
    }
}
