//! Image transform boundary and the built-in single-channel transforms

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Borrowed single-channel input image, valid for one transform call.
#[derive(Debug, Clone, Copy)]
pub struct ImageRef<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
}

/// Output image filled in by a transform.
///
/// Starts empty; the transform sizes it. The invoker checks the final
/// geometry against the input.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImageBuf {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ImageBuf {
    /// Size the buffer to `width`x`height` zeroed pixels.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.data.clear();
        self.data.resize(width as usize * height as usize, 0);
    }
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("transform `{name}` failed: {reason}")]
    Failed { name: String, reason: String },
}

/// Synchronous single-channel image transform.
///
/// `input` and `output` are borrowed for the duration of the call only;
/// implementations must not keep references to either.
pub trait ImageTransform: Send {
    fn name(&self) -> &str;

    fn apply(&mut self, input: ImageRef<'_>, output: &mut ImageBuf) -> Result<(), TransformError>;
}

impl ImageTransform for Box<dyn ImageTransform> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn apply(&mut self, input: ImageRef<'_>, output: &mut ImageBuf) -> Result<(), TransformError> {
        (**self).apply(input, output)
    }
}

/// Built-in transforms selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    Identity,
    Invert,
    Threshold,
    Sobel,
}

impl TransformKind {
    pub fn build(self, threshold: u8) -> Box<dyn ImageTransform> {
        match self {
            TransformKind::Identity => Box::new(Identity),
            TransformKind::Invert => Box::new(Invert),
            TransformKind::Threshold => Box::new(Threshold { level: threshold }),
            TransformKind::Sobel => Box::new(SobelEdges),
        }
    }
}

/// Copies the input unchanged.
pub struct Identity;

impl ImageTransform for Identity {
    fn name(&self) -> &str {
        "identity"
    }

    fn apply(&mut self, input: ImageRef<'_>, output: &mut ImageBuf) -> Result<(), TransformError> {
        output.width = input.width;
        output.height = input.height;
        output.data.clear();
        output.data.extend_from_slice(input.data);
        Ok(())
    }
}

/// Photographic negative.
pub struct Invert;

impl ImageTransform for Invert {
    fn name(&self) -> &str {
        "invert"
    }

    fn apply(&mut self, input: ImageRef<'_>, output: &mut ImageBuf) -> Result<(), TransformError> {
        output.width = input.width;
        output.height = input.height;
        output.data.clear();
        output.data.extend(input.data.iter().map(|&v| 255 - v));
        Ok(())
    }
}

/// Binary threshold: pixels at or above `level` become white.
pub struct Threshold {
    pub level: u8,
}

impl ImageTransform for Threshold {
    fn name(&self) -> &str {
        "threshold"
    }

    fn apply(&mut self, input: ImageRef<'_>, output: &mut ImageBuf) -> Result<(), TransformError> {
        output.width = input.width;
        output.height = input.height;
        output.data.clear();
        output
            .data
            .extend(input.data.iter().map(|&v| if v >= self.level { 255 } else { 0 }));
        Ok(())
    }
}

/// Sobel gradient magnitude (|Gx| + |Gy|), clamped to 255.
///
/// Borders replicate the nearest edge pixel.
pub struct SobelEdges;

impl ImageTransform for SobelEdges {
    fn name(&self) -> &str {
        "sobel"
    }

    fn apply(&mut self, input: ImageRef<'_>, output: &mut ImageBuf) -> Result<(), TransformError> {
        let (w, h) = (input.width as usize, input.height as usize);
        if input.data.len() < w * h {
            return Err(TransformError::Failed {
                name: self.name().to_string(),
                reason: format!("input holds {} bytes, expected {}", input.data.len(), w * h),
            });
        }

        output.resize(input.width, input.height);

        let px = |x: isize, y: isize| -> i32 {
            let cx = x.clamp(0, w as isize - 1) as usize;
            let cy = y.clamp(0, h as isize - 1) as usize;
            input.data[cy * w + cx] as i32
        };

        for y in 0..h as isize {
            for x in 0..w as isize {
                // Derivative [-1, 0, 1] along one axis, smoothing [1, 2, 1] along the other.
                let gx = (px(x + 1, y - 1) + 2 * px(x + 1, y) + px(x + 1, y + 1))
                    - (px(x - 1, y - 1) + 2 * px(x - 1, y) + px(x - 1, y + 1));
                let gy = (px(x - 1, y + 1) + 2 * px(x, y + 1) + px(x + 1, y + 1))
                    - (px(x - 1, y - 1) + 2 * px(x, y - 1) + px(x + 1, y - 1));

                output.data[y as usize * w + x as usize] = (gx.abs() + gy.abs()).min(255) as u8;
            }
        }

        Ok(())
    }
}
