use std::path::Path;

use tracing::info;
use v4l::{capability::Flags, video::Capture, Device};

use crate::capture::frame::PixelFormat;
use crate::capture::v4l2::pixel_format;
use crate::capture::CaptureError;

// Detected capture device info
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundDevice {
    pub path: String,
    pub format: PixelFormat,
}

impl FoundDevice {
    pub fn new(path: String, format: PixelFormat) -> Self {
        Self { path, format }
    }
}

/// Auto-detect the first capture device offering a luma-bearing format.
///
/// `preferred` wins when a device offers it; otherwise the device's first
/// supported layout is used.
pub fn auto_detect_device(preferred: PixelFormat) -> Result<FoundDevice, CaptureError> {
    info!("Auto-detecting capture devices...");

    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        // Check for capture capability
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            continue;
        }

        let Ok(formats) = dev.enum_formats() else {
            continue;
        };
        let offered: Vec<PixelFormat> = formats
            .iter()
            .filter_map(|fmt| pixel_format(fmt.fourcc))
            .collect();

        if let Some(format) = pick_format(&offered, preferred) {
            info!("Found {:?} device: {} - {}", format, path, caps.card);
            return Ok(FoundDevice::new(path, format));
        }
    }

    Err(CaptureError::NoDevice)
}

fn pick_format(offered: &[PixelFormat], preferred: PixelFormat) -> Option<PixelFormat> {
    if offered.contains(&preferred) {
        Some(preferred)
    } else {
        offered.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_format_wins_when_offered() {
        let offered = [PixelFormat::Yuyv, PixelFormat::Grey];
        assert_eq!(pick_format(&offered, PixelFormat::Grey), Some(PixelFormat::Grey));
        assert_eq!(pick_format(&offered, PixelFormat::Nv12), Some(PixelFormat::Yuyv));
        assert_eq!(pick_format(&[], PixelFormat::Grey), None);
    }
}
