// SPDX-License-Identifier: MIT OR Apache-2.0
//! Studio settings.
//!
//! Stored as pretty RON next to the working directory. Every section falls
//! back to its defaults, so a partial file is fine. A few environment
//! variables override what the file says.

use atelier_ai::thumbnail::{clamp_size, DEFAULT_THUMBNAIL_SIZE};
use atelier_ai::vision::DEFAULT_VISION_MODEL;
use atelier_ai::GenerationParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current settings format version
pub const SETTINGS_FORMAT_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE_NAME: &str = "atelier.ron";

/// OpenAI-compatible API base
pub const ENV_API_BASE: &str = "OPENAI_API_BASE";
/// API key forwarded to the vision proxy
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
/// Generation backend root
pub const ENV_BACKEND_URL: &str = "ATELIER_BACKEND_URL";
/// Segmentation backend root
pub const ENV_SEGMENT_URL: &str = "ATELIER_SEGMENT_URL";

/// Errors raised while loading or saving settings
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// RON parse error
    #[error("Invalid settings: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// RON serialization error
    #[error("Serialization error: {0}")]
    Serialize(#[from] ron::Error),

    /// Written by a newer build
    #[error("Settings version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Highest version this build reads
        supported: u32,
    },
}

/// Remote endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    /// Generation backend root
    pub backend_url: String,
    /// Segmentation backend root
    pub segment_url: String,
    /// OpenAI-compatible API base
    pub vision_api_base: String,
    /// Vision model name
    pub vision_model: String,
    /// API key; usually supplied through the environment instead
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8000".to_string(),
            segment_url: "http://localhost:8001".to_string(),
            vision_api_base: "https://api.openai.com/v1".to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            api_key: None,
        }
    }
}

/// Output locations and preview sizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Where relative save/export paths land
    pub export_dir: PathBuf,
    /// Preview size sent to the vision model
    pub thumbnail_size: u32,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("exports"),
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
        }
    }
}

/// Complete studio settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioSettings {
    /// Settings format version
    pub version: u32,
    /// Remote endpoints
    pub endpoints: EndpointSettings,
    /// Default generation parameters
    pub generation: GenerationParams,
    /// Output settings
    pub output: OutputSettings,
}

impl Default for StudioSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_FORMAT_VERSION,
            endpoints: EndpointSettings::default(),
            generation: GenerationParams::default(),
            output: OutputSettings::default(),
        }
    }
}

impl StudioSettings {
    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut settings: StudioSettings = ron::from_str(&content)?;

        if settings.version > SETTINGS_FORMAT_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: settings.version,
                supported: SETTINGS_FORMAT_VERSION,
            });
        }
        settings.output.thumbnail_size = clamp_size(settings.output.thumbnail_size);
        Ok(settings)
    }

    /// Load settings if the file exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No settings at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);
        let content = ron::ser::to_string_pretty(self, config)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(base) = lookup(ENV_API_BASE) {
            self.endpoints.vision_api_base = base;
        }
        if let Some(key) = lookup(ENV_API_KEY) {
            self.endpoints.api_key = Some(key);
        }
        if let Some(url) = lookup(ENV_BACKEND_URL) {
            self.endpoints.backend_url = url;
        }
        if let Some(url) = lookup(ENV_SEGMENT_URL) {
            self.endpoints.segment_url = url;
        }
    }

    /// Resolve a user-supplied output path against the export directory
    pub fn output_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.output.export_dir.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = StudioSettings::default();
        assert_eq!(settings.version, SETTINGS_FORMAT_VERSION);
        assert_eq!(settings.generation.trellis.seed, 1);
        assert!(settings.endpoints.api_key.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        let mut settings = StudioSettings::default();
        settings.endpoints.backend_url = "http://gpu-box:8000".into();
        settings.generation.trellis.seed = 7;

        settings.save(&path).unwrap();
        let loaded = StudioSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "(output: (thumbnail_size: 64))").unwrap();

        let loaded = StudioSettings::load(&path).unwrap();
        assert_eq!(loaded.output.thumbnail_size, 64);
        assert_eq!(loaded.endpoints, EndpointSettings::default());
    }

    #[test]
    fn test_oversized_thumbnail_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "(output: (thumbnail_size: 70000))").unwrap();

        let loaded = StudioSettings::load(&path).unwrap();
        assert_eq!(loaded.output.thumbnail_size, atelier_ai::thumbnail::MAX_THUMBNAIL_SIZE);
    }

    #[test]
    fn test_rejects_newer_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "(version: 99)").unwrap();
        assert!(matches!(
            StudioSettings::load(&path),
            Err(ConfigError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = StudioSettings::load_or_default(&dir.path().join("nope.ron")).unwrap();
        assert_eq!(loaded, StudioSettings::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = StudioSettings::default();
        settings.apply_overrides(|key| match key {
            ENV_API_BASE => Some("http://proxy/v1".into()),
            ENV_API_KEY => Some("sk-test".into()),
            ENV_SEGMENT_URL => Some("  ".into()),
            _ => None,
        });
        assert_eq!(settings.endpoints.vision_api_base, "http://proxy/v1");
        assert_eq!(settings.endpoints.api_key.as_deref(), Some("sk-test"));
        assert_eq!(settings.endpoints.segment_url, "http://localhost:8001");
    }
}
