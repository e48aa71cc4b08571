//! Configuration management for the PDF organizer server

use serde::Deserialize;
use std::env;
use std::str::FromStr;

use crate::intake::IntakeOptions;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub intake: IntakeConfig,
    pub preview: PreviewConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntakeConfig {
    /// Per-file size limit in megabytes
    pub max_file_size_mb: u64,
    /// Maximum live preview handles (0 = unlimited)
    pub max_preview_handles: usize,
    /// Reject PDFs that fail to parse instead of accepting them page-count-less
    pub reject_unparsable: bool,
}

/// Thumbnail size bounds, in pixels
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PreviewConfig {
    pub default_size: u32,
    pub min_size: u32,
    pub max_size: u32,
    pub step: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid preview bounds: min {min} > max {max}")]
    InvalidPreviewBounds { min: u32, max: u32 },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            intake: IntakeConfig {
                max_file_size_mb: 100,
                max_preview_handles: 0,
                reject_unparsable: true,
            },
            preview: PreviewConfig::default(),
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        PreviewConfig {
            default_size: 200,
            min_size: 150,
            max_size: 300,
            step: 10,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let preview = PreviewConfig {
            default_size: parse_var("PREVIEW_SIZE_DEFAULT", defaults.preview.default_size)?,
            min_size: parse_var("PREVIEW_SIZE_MIN", defaults.preview.min_size)?,
            max_size: parse_var("PREVIEW_SIZE_MAX", defaults.preview.max_size)?,
            step: parse_var("PREVIEW_SIZE_STEP", defaults.preview.step)?,
        };
        if preview.min_size > preview.max_size {
            return Err(ConfigError::InvalidPreviewBounds {
                min: preview.min_size,
                max: preview.max_size,
            });
        }

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT", defaults.server.port)?,
            },
            intake: IntakeConfig {
                max_file_size_mb: parse_var("MAX_FILE_SIZE_MB", defaults.intake.max_file_size_mb)?,
                max_preview_handles: parse_var(
                    "MAX_PREVIEW_HANDLES",
                    defaults.intake.max_preview_handles,
                )?,
                reject_unparsable: parse_var(
                    "REJECT_UNPARSABLE_PDF",
                    defaults.intake.reject_unparsable,
                )?,
            },
            preview,
        })
    }

    /// Options handed to the metadata builder
    pub fn intake_options(&self) -> IntakeOptions {
        IntakeOptions {
            max_file_size: self.intake.max_file_size(),
            reject_unparsable: self.intake.reject_unparsable,
        }
    }
}

impl IntakeConfig {
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }
}

impl PreviewConfig {
    /// Clamp into [min, max] and snap to the nearest step above min
    pub fn clamp(&self, size: u32) -> u32 {
        let clamped = size.clamp(self.min_size, self.max_size);
        if self.step == 0 {
            return clamped;
        }
        let offset = clamped - self.min_size;
        let snapped = self.min_size + ((offset + self.step / 2) / self.step) * self.step;
        snapped.min(self.max_size)
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.intake.max_file_size(), 100 * 1024 * 1024);
        assert!(config.intake_options().reject_unparsable);
    }

    #[test]
    fn test_preview_clamp() {
        let preview = PreviewConfig::default();
        assert_eq!(preview.clamp(100), 150);
        assert_eq!(preview.clamp(400), 300);
        assert_eq!(preview.clamp(200), 200);
        assert_eq!(preview.clamp(204), 200);
        assert_eq!(preview.clamp(205), 210);
    }

    #[test]
    fn test_preview_clamp_zero_step() {
        let preview = PreviewConfig {
            step: 0,
            ..Default::default()
        };
        assert_eq!(preview.clamp(203), 203);
    }

    #[test]
    fn test_parse_var_missing_uses_default() {
        let value: u32 = parse_var("PDF_ORGANIZER_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }
}
