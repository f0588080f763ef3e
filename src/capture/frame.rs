use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Processed single-channel frame handed from the capture side to the renderer.
///
/// The pixel data is immutable once constructed and moves through the
/// pipeline by value, so no two stages ever alias the same frame.
#[derive(PartialEq, Eq)]
pub struct Frame {
    data: Bytes,
    width: u32,
    height: u32,
}

/// Pixel layouts understood by the capture layer.
///
/// Frames leaving the capture layer are always [`PixelFormat::Grey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 8-bit luma, one byte per pixel.
    Grey,
    /// Packed 4:2:2, luma on even bytes.
    Yuyv,
    /// Planar 4:2:0, full-resolution Y plane followed by interleaved UV.
    Nv12,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame buffer holds {actual} bytes, {width}x{height} needs {expected}")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("frame geometry {width}x{height} is empty")]
    EmptyGeometry { width: u32, height: u32 },
}

impl Frame {
    /// Wrap `data` as a `width`x`height` grey frame.
    pub fn new(data: impl Into<Bytes>, width: u32, height: u32) -> Result<Self, FrameError> {
        let data = data.into();

        if width == 0 || height == 0 {
            return Err(FrameError::EmptyGeometry { width, height });
        }

        let expected = luma_len(width, height);
        if data.len() != expected {
            return Err(FrameError::SizeMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        PixelFormat::Grey
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Byte length of a single-channel `width`x`height` image.
pub fn luma_len(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_exact_luma_length() {
        let frame = Frame::new(vec![7u8; 640 * 480], 640, 480).unwrap();
        assert_eq!(frame.size(), (640, 480));
        assert_eq!(frame.data().len(), 640 * 480);
        assert_eq!(frame.format(), PixelFormat::Grey);
    }

    #[test]
    fn rejects_short_buffer() {
        let err = Frame::new(vec![0u8; 10], 4, 4).unwrap_err();
        assert_eq!(
            err,
            FrameError::SizeMismatch {
                width: 4,
                height: 4,
                expected: 16,
                actual: 10,
            }
        );
    }

    #[test]
    fn rejects_empty_geometry() {
        assert!(matches!(
            Frame::new(Vec::<u8>::new(), 0, 480),
            Err(FrameError::EmptyGeometry { .. })
        ));
    }
}
