//! V4L2 camera source with memory-mapped streaming

use tracing::{debug, info, instrument};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::capture::frame::PixelFormat;
use crate::capture::source::{CameraFrame, CameraSource, CaptureError};
use crate::CaptureConfig;

/// V4L2 capture device delivering luma-bearing frames.
pub struct V4l2Camera {
    stream: Option<MmapStream<'static>>,
    device: Box<Device>,
    path: String,
    card: String,
    width: u32,
    height: u32,
    stride: u32,
    format: PixelFormat,
    buffer_count: u32,
}

impl V4l2Camera {
    /// Open the device and negotiate a luma-bearing format.
    ///
    /// The driver may adjust width and height; the negotiated geometry is
    /// what frames will carry.
    #[instrument(skip(config), fields(device = %config.device))]
    pub fn open(config: &CaptureConfig) -> Result<Self, CaptureError> {
        info!("Initializing V4L2 capture");

        let device = Device::with_path(&config.device)?;

        // Query capabilities
        let caps = device.query_caps()?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(CaptureError::Unsupported {
                device: config.device.clone(),
                what: "video capture".into(),
            });
        }

        // Set format
        let mut fmt = device.format()?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = fourcc(config.format);

        let fmt = device.set_format(&fmt)?;
        let format = match pixel_format(fmt.fourcc) {
            Some(format) => format,
            None => {
                return Err(CaptureError::Unsupported {
                    device: config.device.clone(),
                    what: format!("{:?} (driver offered {})", config.format, fmt.fourcc),
                })
            }
        };

        info!(
            "Negotiated {}x{} {:?}, stride {}",
            fmt.width, fmt.height, format, fmt.stride
        );

        Ok(Self {
            stream: None,
            device: Box::new(device),
            path: config.device.clone(),
            card: caps.card,
            width: fmt.width,
            height: fmt.height,
            stride: fmt.stride,
            format,
            buffer_count: config.buffer_count.max(1),
        })
    }
}

impl CameraSource for V4l2Camera {
    fn describe(&self) -> String {
        format!(
            "{} ({}) {}x{} {:?}",
            self.path, self.card, self.width, self.height, self.format
        )
    }

    /// Start streaming with memory-mapped buffers
    fn start(&mut self) -> Result<(), CaptureError> {
        let stream =
            MmapStream::with_buffers(&self.device, Type::VideoCapture, self.buffer_count)?;

        self.stream = Some(stream);
        info!("Capture stream started with {} buffers", self.buffer_count);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<CameraFrame<'_>, CaptureError> {
        let stream = self.stream.as_mut().ok_or(CaptureError::NotStarted)?;

        // The buffer is requeued to the driver on the next dequeue.
        let (buf, meta) = stream.next()?;
        debug!(sequence = meta.sequence, bytes = buf.len(), "dequeued buffer");

        Ok(CameraFrame::new(
            buf,
            self.width,
            self.height,
            self.stride,
            self.format,
            meta.sequence as u64,
        ))
    }
}

fn fourcc(format: PixelFormat) -> FourCC {
    match format {
        PixelFormat::Grey => FourCC::new(b"GREY"),
        PixelFormat::Yuyv => FourCC::new(b"YUYV"),
        PixelFormat::Nv12 => FourCC::new(b"NV12"),
    }
}

pub(crate) fn pixel_format(fourcc: FourCC) -> Option<PixelFormat> {
    match &fourcc.repr {
        b"GREY" => Some(PixelFormat::Grey),
        b"YUYV" => Some(PixelFormat::Yuyv),
        b"NV12" => Some(PixelFormat::Nv12),
        _ => None,
    }
}
