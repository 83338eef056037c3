use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::image::{DecodeOptions, PngCompression};
use crate::pipeline::Operation;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum OutputFormat {
    Png {
        compression: PngCompression,
    },
    Jpeg {
        quality: u8,
    },
    /// `loop_count` 0 loops forever; `duration` replaces the total animation
    /// duration when set
    Gif {
        loop_count: u16,
        duration: Option<f64>,
    },
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Png {
            compression: PngCompression::Default,
        }
    }
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png { .. } => "png",
            OutputFormat::Jpeg { .. } => "jpg",
            OutputFormat::Gif { .. } => "gif",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub decode: DecodeOptions,
    pub operations: Vec<Operation>,
    pub output: OutputFormat,
}

impl Config {
    /// Load the user config, if there is a readable one
    pub fn load() -> Option<Self> {
        let config_path = Self::config_path()?;

        fs::read_to_string(&config_path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
    }

    pub fn save(&self) -> Option<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).ok()?;
        }

        serde_json::to_string_pretty(self)
            .ok()
            .and_then(|json| fs::write(&config_path, json).ok())
    }

    /// Read a config from an explicit path, reporting why it could not be used
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn config_path() -> Option<PathBuf> {
        let home = std::env::home_dir()?;
        Some(home.join(".config").join("rasterkit").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ContentMode;

    #[test]
    fn missing_fields_take_defaults() {
        let config: Config = serde_json::from_str(r#"{"decode": {"scale": 2.0}}"#).unwrap();

        assert_eq!(config.decode.scale, 2.0);
        assert!(config.decode.preload_all_frames);
        assert_eq!(config.decode.duration, 0.0);
        assert!(config.operations.is_empty());
        assert_eq!(config.output.extension(), "png");
    }

    #[test]
    fn parses_operations_and_output() {
        let json = r#"{
            "operations": [
                {"op": "resize", "width": 64, "height": 64, "mode": "fill"},
                {"op": "blur", "radius": 3.0}
            ],
            "output": {"Gif": {"loop_count": 2, "duration": 1.5}}
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(
            config.operations[0],
            Operation::Resize {
                width: 64.0,
                height: 64.0,
                mode: ContentMode::Fill
            }
        );
        assert_eq!(config.operations[1], Operation::Blur { radius: 3.0 });
        assert_eq!(
            config.output,
            OutputFormat::Gif {
                loop_count: 2,
                duration: Some(1.5)
            }
        );
    }

    #[test]
    fn from_path_reports_bad_json() {
        let path = std::env::temp_dir().join(format!("rasterkit-config-{}.json", std::process::id()));
        fs::write(&path, "{ not json").unwrap();

        let result = Config::from_path(&path);
        fs::remove_file(&path).ok();

        assert!(matches!(result, Err(crate::Error::Config(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = Config::from_path("/nonexistent/rasterkit/config.json");
        assert!(matches!(result, Err(crate::Error::Io(_))));
    }
}
