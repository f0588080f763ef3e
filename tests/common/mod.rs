// tests/common/mod.rs — Shared fakes for integration tests.
//
// `RecordingGpu` stands in for the wgpu context: it logs every call the
// renderer makes so tests can assert on upload/draw sequences without a GPU.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lumaview::display::{GpuContext, QuadGeometry, RenderError};
use lumaview::pipeline::RenderTrigger;
use lumaview::Frame;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuCall {
    CreateProgram,
    AllocateTexture,
    SetViewport(u32, u32),
    ReplaceTexture { width: u32, height: u32, len: usize },
    DrawQuad,
}

#[derive(Clone, Default)]
pub struct RecordingGpu {
    calls: Arc<Mutex<Vec<GpuCall>>>,
    fail_program: bool,
    fail_draw: bool,
}

impl RecordingGpu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Program creation fails like a shader that does not compile.
    pub fn failing_program() -> Self {
        Self {
            fail_program: true,
            ..Self::default()
        }
    }

    /// Every draw fails like a lost device.
    pub fn failing_draw() -> Self {
        Self {
            fail_draw: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<GpuCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn uploads(&self) -> Vec<GpuCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, GpuCall::ReplaceTexture { .. }))
            .collect()
    }

    pub fn draws(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, GpuCall::DrawQuad))
            .count()
    }

    fn record(&self, call: GpuCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl GpuContext for RecordingGpu {
    fn create_program(&mut self, shader: &str, quad: &QuadGeometry) -> Result<(), RenderError> {
        assert!(shader.contains("vs_main") && shader.contains("fs_main"));
        assert_eq!(quad.positions.len(), 4);
        if self.fail_program {
            return Err(RenderError::Program("forced link failure".into()));
        }
        self.record(GpuCall::CreateProgram);
        Ok(())
    }

    fn allocate_texture(&mut self) -> Result<(), RenderError> {
        self.record(GpuCall::AllocateTexture);
        Ok(())
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.record(GpuCall::SetViewport(width, height));
    }

    fn replace_texture(&mut self, frame: &Frame) -> Result<(), RenderError> {
        self.record(GpuCall::ReplaceTexture {
            width: frame.width(),
            height: frame.height(),
            len: frame.data().len(),
        });
        Ok(())
    }

    fn draw_quad(&mut self) -> Result<(), RenderError> {
        if self.fail_draw {
            return Err(RenderError::Draw("forced device loss".into()));
        }
        self.record(GpuCall::DrawQuad);
        Ok(())
    }
}

/// Render trigger that only counts.
#[derive(Clone, Default)]
pub struct CountingTrigger {
    count: Arc<AtomicUsize>,
}

impl CountingTrigger {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl RenderTrigger for CountingTrigger {
    fn request_render(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Frame whose first pixel carries `fill`.
pub fn frame(width: u32, height: u32, fill: u8) -> Frame {
    Frame::new(vec![fill; (width * height) as usize], width, height).unwrap()
}
