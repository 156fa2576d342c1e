//! Demo configuration, loaded from an optional YAML file.
//!
//! Every field has a default, so a file only needs the keys it overrides:
//!
//! ```yaml
//! start_paused: true
//! nbody:
//!   bodies: 4096
//! image:
//!   filter: sharpen
//! ```

use crate::types::{ImageFilter, SlotLayout, WorkgroupSize};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// N-body simulation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NBodyConfig {
    pub bodies: u32,
    pub workgroup_size: WorkgroupSize,
    /// Radius of the sphere the bodies start on.
    pub radius: f32,
    pub seed: u64,
    /// Initial camera distance along z.
    pub eye_z: f32,
}

impl Default for NBodyConfig {
    fn default() -> Self {
        Self {
            bodies: 8192,
            workgroup_size: WorkgroupSize::default(),
            radius: 0.6,
            seed: 42,
            eye_z: -1.5,
        }
    }
}

/// Image-filter demo parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub width: u32,
    pub height: u32,
    pub workgroup_size: WorkgroupSize,
    pub filter: ImageFilter,
    /// Checkerboard cell size of the generated source image, in pixels.
    pub tile: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            workgroup_size: WorkgroupSize::default(),
            filter: ImageFilter::default(),
            tile: 32,
        }
    }
}

/// Top-level configuration for the demo drivers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub start_paused: bool,
    pub nbody: NBodyConfig,
    pub image: ImageConfig,
}

impl DemoConfig {
    /// Load from a YAML file and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: DemoConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise return the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        SlotLayout::new(self.nbody.bodies, 16)
            .map_err(|e| ConfigError::Invalid(format!("nbody: {e}")))?;
        if !(self.nbody.radius.is_finite() && self.nbody.radius > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "nbody: radius must be positive, got {}",
                self.nbody.radius
            )));
        }
        if self.image.width == 0 || self.image.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "image: size must be non-zero, got {}x{}",
                self.image.width, self.image.height
            )));
        }
        SlotLayout::grid(self.image.width, self.image.height, 4)
            .map_err(|e| ConfigError::Invalid(format!("image: {e}")))?;
        if self.image.tile == 0 {
            return Err(ConfigError::Invalid("image: tile must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_reference_demo() {
        let config = DemoConfig::default();
        assert_eq!(config.nbody.bodies, 8192);
        assert_eq!(config.nbody.workgroup_size.get(), 64);
        assert_eq!(config.nbody.radius, 0.6);
        assert!(!config.start_paused);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = DemoConfig::from_yaml("nbody:\n  bodies: 1024\nimage:\n  filter: sharpen\n")
            .unwrap();
        assert_eq!(config.nbody.bodies, 1024);
        assert_eq!(config.nbody.seed, 42);
        assert_eq!(config.image.filter, ImageFilter::Sharpen);
        assert_eq!(config.image.width, 512);
    }

    #[test]
    fn zero_workgroup_rejected_at_parse() {
        let err = DemoConfig::from_yaml("nbody:\n  workgroup_size: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn zero_bodies_rejected() {
        let err = DemoConfig::from_yaml("nbody:\n  bodies: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn oversized_image_rejected() {
        let err = DemoConfig::from_yaml("image:\n  width: 70000\n  height: 70000\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref m) if m.contains("70000x70000")));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "start_paused: true").unwrap();
        let config = DemoConfig::load(file.path()).unwrap();
        assert!(config.start_paused);
    }

    #[test]
    fn load_or_default_without_path() {
        let config = DemoConfig::load_or_default(None).unwrap();
        assert_eq!(config, DemoConfig::default());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = DemoConfig::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
