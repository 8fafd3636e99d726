use crate::{Error, Result};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MIN_RENDER_SCALE: f32 = 0.3;
pub const MAX_RENDER_SCALE: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self { width: 1700, height: 900 }
    }
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub title: String,
    pub resolution: Resolution,
    /// Frames in flight.
    pub buffering: u32,
    pub render_scale: f32,
    /// Upper bound on the per-frame fence wait. Unset waits forever.
    pub fence_timeout_ms: Option<u64>,
    /// Root that compiled `.spv` files and shader includes are resolved against.
    pub shader_dir: PathBuf,
    pub scene: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            title: String::from("lumen"),
            resolution: Resolution::default(),
            buffering: 2,
            render_scale: 1.0,
            fence_timeout_ms: None,
            shader_dir: PathBuf::from("shaders"),
            scene: None,
        }
    }
}

impl Settings {
    /// Reads a TOML settings file. A missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml(&contents),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                log::info!("no settings at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(error) => Err(error.into()),
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        settings.validated()
    }

    fn validated(mut self) -> Result<Self> {
        if self.buffering == 0 {
            return Err(Error::Config(String::from("buffering must be at least 1")));
        }
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(Error::Config(String::from("resolution must be non-zero")));
        }
        self.render_scale = self.render_scale.clamp(MIN_RENDER_SCALE, MAX_RENDER_SCALE);
        Ok(self)
    }

    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn buffering(mut self, buffering: u32) -> Self {
        self.buffering = buffering;
        self
    }

    pub fn scene(mut self, scene: impl Into<PathBuf>) -> Self {
        self.scene = Some(scene.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.buffering, 2);
        assert_eq!(settings.fence_timeout_ms, None);
    }

    #[test]
    fn partial_file_overrides_fields() {
        let settings = Settings::from_toml(
            r#"
            buffering = 3
            render_scale = 4.0
            fence_timeout_ms = 2000

            [resolution]
            width = 800
            height = 600
            "#,
        )
        .unwrap();

        assert_eq!(settings.buffering, 3);
        assert_eq!(settings.render_scale, MAX_RENDER_SCALE);
        assert_eq!(settings.fence_timeout_ms, Some(2000));
        assert_eq!(settings.resolution, Resolution::new(800, 600));
        assert_eq!(settings.shader_dir, PathBuf::from("shaders"));
    }

    #[test]
    fn zero_buffering_is_rejected() {
        assert!(matches!(Settings::from_toml("buffering = 0"), Err(Error::Config(_))));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        assert!(matches!(Settings::from_toml("buffering = \"two\""), Err(Error::Config(_))));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = Settings::load("definitely/not/here.toml").unwrap();
        assert_eq!(settings, Settings::default());
    }
}
