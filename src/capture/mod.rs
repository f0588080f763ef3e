pub mod frame;
pub mod source;
pub mod synthetic;
pub mod v4l2;
pub mod worker;

pub use frame::{Frame, FrameError, PixelFormat};
pub use source::{CameraFrame, CameraSource, CaptureError};
pub use synthetic::SyntheticCamera;
pub use v4l2::V4l2Camera;
pub use worker::{CaptureHandle, CaptureOutcome, CaptureStats, CaptureWorker};
