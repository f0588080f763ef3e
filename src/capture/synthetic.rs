//! Synthetic camera producing a moving test pattern.
//!
//! Used for headless runs and tests where no capture device is present.

use std::thread;
use std::time::{Duration, Instant};

use crate::capture::frame::PixelFormat;
use crate::capture::source::{CameraFrame, CameraSource, CaptureError};

pub struct SyntheticCamera {
    width: u32,
    height: u32,
    interval: Option<Duration>,
    buffer: Vec<u8>,
    sequence: u64,
    last_frame: Option<Instant>,
    started: bool,
}

impl SyntheticCamera {
    /// `fps == 0` generates frames as fast as the worker asks for them.
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            interval: (fps > 0).then(|| Duration::from_secs(1) / fps),
            buffer: vec![0; width as usize * height as usize],
            sequence: 0,
            last_frame: None,
            started: false,
        }
    }

    // Diagonal gradient drifting one pixel per frame, with a bright bar
    // sweeping across so edge transforms have something to find.
    fn paint(&mut self) {
        let (w, h) = (self.width as usize, self.height as usize);
        let shift = self.sequence as usize;
        let bar = shift % w.max(1);

        for (y, row) in self.buffer.chunks_mut(w.max(1)).take(h).enumerate() {
            for (x, px) in row.iter_mut().enumerate() {
                *px = if x.abs_diff(bar) < 4 {
                    255
                } else {
                    ((x + y + shift) % 192) as u8
                };
            }
        }
    }
}

impl CameraSource for SyntheticCamera {
    fn describe(&self) -> String {
        format!("synthetic {}x{}", self.width, self.height)
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        self.started = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<CameraFrame<'_>, CaptureError> {
        if !self.started {
            return Err(CaptureError::NotStarted);
        }

        // Pace to the configured cadence, like a device would.
        if let (Some(interval), Some(last)) = (self.interval, self.last_frame) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());

        self.sequence += 1;
        self.paint();

        Ok(CameraFrame::new(
            &self.buffer,
            self.width,
            self.height,
            self.width,
            PixelFormat::Grey,
            self.sequence,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_require_start() {
        let mut camera = SyntheticCamera::new(8, 4, 0);
        assert!(matches!(camera.next_frame(), Err(CaptureError::NotStarted)));
    }

    #[test]
    fn pattern_moves_between_frames() {
        let mut camera = SyntheticCamera::new(16, 8, 0);
        camera.start().unwrap();

        let first = camera.next_frame().unwrap().extract_luma().unwrap();
        let second = camera.next_frame().unwrap();
        assert_eq!(second.sequence(), 2);

        let second = second.extract_luma().unwrap();
        assert_eq!(first.size(), (16, 8));
        assert_ne!(first.data(), second.data());
    }
}
