pub mod capture;
pub mod display;
pub mod pipeline;
pub mod process;
pub mod utils;

use std::path::Path;

use capture::frame::PixelFormat;
use config::{Environment, File, FileFormat};
use process::TransformKind;
use serde::{Deserialize, Serialize};

pub use capture::Frame;
pub use pipeline::Mailbox;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "LUMAVIEW_CONFIG";
/// Configuration file read when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "lumaview.toml";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub display: DisplayConfig,
    pub pipeline: PipelineConfig,
}

/// Which camera implementation feeds the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraKind {
    V4l2,
    Synthetic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub source: CameraKind,
    /// Device node; empty means auto-detect.
    pub device: String,
    pub width: u32,
    pub height: u32,
    /// Synthetic camera cadence; 0 runs unpaced.
    pub fps: u32,
    pub format: PixelFormat,
    /// V4L2 mmap buffers. Kept small so stale frames cannot pile up in the driver.
    pub buffer_count: u32,
    pub pin_core: Option<usize>,
    /// End the session after this many camera frames.
    pub max_frames: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub vsync: bool,
    /// Render offscreen on a dedicated thread instead of opening a window.
    pub headless: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub transform: TransformKind,
    /// Cut-off for [`TransformKind::Threshold`].
    pub threshold: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: CameraKind::V4l2,
            device: String::new(),
            width: 640,
            height: 480,
            fps: 30,
            format: PixelFormat::Yuyv,
            buffer_count: 2,
            pin_core: None,
            max_frames: None,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            title: "Lumaview".into(),
            vsync: true,
            headless: false,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            transform: TransformKind::Sobel,
            threshold: 128,
        }
    }
}

impl Config {
    /// Load from an optional TOML file, overridden by `LUMAVIEW_*`
    /// environment variables (`LUMAVIEW_CAPTURE__WIDTH=1280`).
    pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix("LUMAVIEW")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
