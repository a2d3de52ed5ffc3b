//! Runtime configuration
//!
//! Loaded from `assets/config.ron` at startup. Every section is
//! `#[serde(default)]`, so a file only needs the fields it overrides.

use std::fs;
use std::path::{Path, PathBuf};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use crate::demo::DemoKind;
use crate::noise::NoiseParams;
use crate::pvr::{
    decode_texture_file, CameraParams, Color, DepthConvention, DepthMapping, InitParams, PixelFormat, SpriteStrategy, Texture,
    TextureError, TextureFilter, Vec3, Viewport,
};

pub const DEFAULT_CONFIG_PATH: &str = "assets/config.ron";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("Serialize error: {0}")]
    Serialize(#[from] ron::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: InitParams,
    pub camera: CameraConfig,
    pub direct: DirectConfig,
    pub controls: ControlConfig,
    pub sprite_strategy: SpriteStrategy,
    pub textures: TextureConfig,
    pub noise: NoiseParams,
    pub start_demo: DemoKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: InitParams::default(),
            camera: CameraConfig::default(),
            direct: DirectConfig::default(),
            controls: ControlConfig::default(),
            sprite_strategy: SpriteStrategy::default(),
            textures: TextureConfig::default(),
            noise: NoiseParams::default(),
            start_demo: DemoKind::TexturedCube,
        }
    }
}

/// Perspective camera used by the homogeneous demos
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub eye: Vec3,
    pub center: Vec3,
    pub up: Vec3,
    pub convention: DepthConvention,
    pub depth: DepthMapping,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y_degrees: 45.0,
            near: 0.1,
            far: 100.0,
            eye: Vec3::new(0.0, 0.0, 20.0),
            center: Vec3::ZERO,
            up: Vec3::new(0.0, 1.0, 0.0),
            convention: DepthConvention::RightHanded,
            depth: DepthMapping::InverseW,
        }
    }
}

impl CameraConfig {
    /// Camera parameters for a `width` x `height` screen; the divide yields pixels
    pub fn params(&self, width: usize, height: usize) -> CameraParams {
        CameraParams {
            fov_y_degrees: self.fov_y_degrees,
            aspect: width as f32 / height as f32,
            near: self.near,
            far: self.far,
            eye: self.eye,
            center: self.center,
            up: self.up,
            convention: self.convention,
            viewport: Some(Viewport { width: width as f32, height: height as f32 }),
        }
    }
}

/// Direct (no divide) projection used by the screen-space demos
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectConfig {
    pub offset_x: f32,
    pub offset_y: f32,
    pub depth: DepthMapping,
    /// Model scale is `zoom_numerator / -z`
    pub zoom_numerator: f32,
    pub noise_zoom_numerator: f32,
}

impl Default for DirectConfig {
    fn default() -> Self {
        Self {
            offset_x: 320.0,
            offset_y: 240.0,
            depth: DepthMapping::Fixed16 { bias: 10.0, span: 20.0 },
            zoom_numerator: 100.0,
            noise_zoom_numerator: 300.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub model_scale: f32,
    pub zoom_speed: f32,
    /// Allowed z for the perspective demos
    pub zoom_range: (f32, f32),
    pub direct_zoom_speed: f32,
    /// Allowed z for the direct demos; must stay below zero
    pub direct_zoom_range: (f32, f32),
    pub stick_deadzone: i32,
    pub stick_sensitivity: f32,
    /// Pixels moved per unit of stick in the direct demos
    pub direct_stick_sensitivity: f32,
    /// Stick rotation rate in the noise demo
    pub stick_rotation: f32,
    pub spin_step: f32,
    pub friction: f32,
    pub spin_epsilon: f32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            model_scale: 3.0,
            zoom_speed: 0.3,
            zoom_range: (-10.0, 15.0),
            direct_zoom_speed: 0.3,
            direct_zoom_range: (-10.0, -0.5),
            stick_deadzone: 16,
            stick_sensitivity: 20.5,
            direct_stick_sensitivity: 1000.5,
            stick_rotation: 0.05,
            spin_step: 0.001,
            friction: 0.99,
            spin_epsilon: 0.0001,
        }
    }
}

/// Where a texture's texels come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TextureSource {
    File(PathBuf),
    Checkerboard { size: usize, cell: usize, a: Color, b: Color },
}

impl TextureSource {
    fn checker(a: Color, b: Color) -> Self {
        TextureSource::Checkerboard { size: 64, cell: 8, a, b }
    }

    /// Decode the source into texels
    pub fn load(&self) -> Result<Texture, TextureError> {
        match self {
            TextureSource::File(path) => decode_texture_file(path),
            TextureSource::Checkerboard { size, cell, a, b } => {
                Ok(Texture::checkerboard(*size, *size, *cell, *a, *b))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureConfig {
    pub format: PixelFormat,
    pub filter: TextureFilter,
    /// Shared texture of the single-texture and sprite cubes
    pub cube: TextureSource,
    /// One per face, in face order
    pub faces: Vec<TextureSource>,
    pub background_normal: TextureSource,
    pub background_zoomed: TextureSource,
}

impl Default for TextureConfig {
    fn default() -> Self {
        let grey = Color::new(96, 96, 96);
        Self {
            format: PixelFormat::Argb4444,
            filter: TextureFilter::Bilinear,
            cube: TextureSource::checker(Color::WHITE, Color::BLACK),
            faces: vec![
                TextureSource::checker(Color::new(255, 64, 64), grey),
                TextureSource::checker(Color::new(64, 255, 64), grey),
                TextureSource::checker(Color::new(64, 64, 255), grey),
                TextureSource::checker(Color::new(255, 255, 64), grey),
                TextureSource::checker(Color::new(64, 255, 255), grey),
                TextureSource::checker(Color::new(255, 64, 255), grey),
            ],
            background_normal: TextureSource::Checkerboard {
                size: 256,
                cell: 32,
                a: Color::new(40, 40, 80),
                b: Color::new(80, 80, 160),
            },
            background_zoomed: TextureSource::Checkerboard {
                size: 256,
                cell: 16,
                a: Color::new(80, 40, 40),
                b: Color::new(160, 80, 80),
            },
        }
    }
}

/// Load configuration from a RON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path)?;
    load_config_from_str(&contents)
}

/// Load configuration from a RON string
pub fn load_config_from_str(s: &str) -> Result<Config, ConfigError> {
    Ok(ron::from_str(s)?)
}

/// Save configuration to a RON file
pub fn save_config<P: AsRef<Path>>(config: &Config, path: P) -> Result<(), ConfigError> {
    let pretty = ron::ser::PrettyConfig::new()
        .depth_limit(4)
        .indentor("  ".to_string());

    let contents = ron::ser::to_string_pretty(config, pretty)?;
    fs::write(path, contents)?;
    Ok(())
}

/// Load the config at `path`, falling back to defaults when it is missing
/// or broken
pub fn load_or_default<P: AsRef<Path>>(path: P) -> Config {
    let path = path.as_ref();
    match load_config(path) {
        Ok(config) => {
            log::info!("loaded config from {}", path.display());
            config
        }
        Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("no config at {}, using defaults", path.display());
            Config::default()
        }
        Err(e) => {
            log::error!("failed to load {}: {}; using defaults", path.display(), e);
            Config::default()
        }
    }
}
