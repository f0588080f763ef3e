//! Synchronous wrapper around an [`ImageTransform`]

use std::time::Instant;

use thiserror::Error;
use tracing::instrument;

use crate::capture::frame::luma_len;
use crate::process::transform::{ImageBuf, ImageRef, ImageTransform, TransformError};
use crate::Frame;

#[derive(Debug, Error)]
pub enum ProcessError {
    /// The transform produced an output whose geometry or length does not
    /// match its input.
    #[error(
        "transform `{transform}` broke the size contract: expected {expected:?}, got {actual:?} holding {actual_len} bytes"
    )]
    ContractViolation {
        transform: String,
        expected: (u32, u32),
        actual: (u32, u32),
        actual_len: usize,
    },

    #[error(transparent)]
    Transform(#[from] TransformError),
}

/// Runs one transform call per frame on the caller's thread.
pub struct ProcessingInvoker<T> {
    transform: T,
}

impl<T: ImageTransform> ProcessingInvoker<T> {
    pub fn new(transform: T) -> Self {
        Self { transform }
    }

    pub fn transform_name(&self) -> &str {
        self.transform.name()
    }

    /// Transform `input` into a new frame of the same geometry.
    #[instrument(level = "trace", skip_all, fields(width = input.width(), height = input.height()))]
    pub fn process(&mut self, input: &Frame) -> Result<Frame, ProcessError> {
        let start = Instant::now();
        let (width, height) = input.size();

        let mut output = ImageBuf::default();
        self.transform.apply(
            ImageRef {
                data: input.data(),
                width,
                height,
            },
            &mut output,
        )?;

        let ImageBuf {
            data,
            width: out_width,
            height: out_height,
        } = output;
        let actual_len = data.len();

        let violation = || ProcessError::ContractViolation {
            transform: self.transform.name().to_string(),
            expected: (width, height),
            actual: (out_width, out_height),
            actual_len,
        };

        if (out_width, out_height) != (width, height) || actual_len != luma_len(width, height) {
            return Err(violation());
        }
        let frame = Frame::new(data, width, height).map_err(|_| violation())?;

        metrics::histogram!("process_time_us").record(start.elapsed().as_micros() as f64);
        Ok(frame)
    }
}
