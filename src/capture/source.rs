//! Camera source abstraction and luma extraction

use thiserror::Error;

use crate::capture::frame::{luma_len, Frame, FrameError, PixelFormat};

/// Capture subsystem errors. All of them end the capture session.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("no suitable capture device found")]
    NoDevice,

    #[error("device {device} does not support {what}")]
    Unsupported { device: String, what: String },

    #[error("capture stream not started")]
    NotStarted,

    #[error("camera buffer holds {actual} bytes, {format:?} {width}x{height} needs {expected}")]
    ShortBuffer {
        format: PixelFormat,
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("capture thread panicked")]
    Panicked,
}

/// One camera buffer, borrowed from the source until dropped.
///
/// The source cannot hand out the next buffer while this borrow is alive,
/// so the camera resource is released on every path out of the scope that
/// holds it.
#[derive(Debug)]
pub struct CameraFrame<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    /// Bytes per row of the luma-bearing plane.
    stride: u32,
    format: PixelFormat,
    sequence: u64,
}

impl<'a> CameraFrame<'a> {
    pub fn new(
        data: &'a [u8],
        width: u32,
        height: u32,
        stride: u32,
        format: PixelFormat,
        sequence: u64,
    ) -> Self {
        Self {
            data,
            width,
            height,
            stride,
            format,
            sequence,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Copy the luma channel out of the camera buffer into an owned [`Frame`].
    pub fn extract_luma(&self) -> Result<Frame, CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::EmptyGeometry {
                width: self.width,
                height: self.height,
            }
            .into());
        }

        let (w, h) = (self.width as usize, self.height as usize);
        let bytes_per_pixel = match self.format {
            PixelFormat::Grey | PixelFormat::Nv12 => 1,
            PixelFormat::Yuyv => 2,
        };
        let stride = (self.stride as usize).max(w * bytes_per_pixel);

        // The last row only needs its active pixels, not the padding.
        let needed = stride * (h - 1) + w * bytes_per_pixel;
        if self.data.len() < needed {
            return Err(CaptureError::ShortBuffer {
                format: self.format,
                width: self.width,
                height: self.height,
                expected: needed,
                actual: self.data.len(),
            });
        }

        let mut luma = Vec::with_capacity(luma_len(self.width, self.height));
        for row in self.data.chunks(stride).take(h) {
            let active = &row[..w * bytes_per_pixel];
            match self.format {
                PixelFormat::Grey | PixelFormat::Nv12 => luma.extend_from_slice(active),
                PixelFormat::Yuyv => luma.extend(active.iter().step_by(2)),
            }
        }

        Ok(Frame::new(luma, self.width, self.height)?)
    }
}

/// A camera the capture worker can pull frames from.
///
/// `next_frame` blocks until the device delivers a frame. Keep-latest
/// backpressure is the source's business: frames arriving while the worker
/// is busy are dropped upstream, never queued here.
pub trait CameraSource: Send {
    /// Human-readable device description for logs.
    fn describe(&self) -> String;

    /// Begin streaming. Called once by the worker before the first frame.
    fn start(&mut self) -> Result<(), CaptureError>;

    fn next_frame(&mut self) -> Result<CameraFrame<'_>, CaptureError>;
}

impl CameraSource for Box<dyn CameraSource> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        (**self).start()
    }

    fn next_frame(&mut self) -> Result<CameraFrame<'_>, CaptureError> {
        (**self).next_frame()
    }
}
