//! Coalescing render wakeups

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flume::{Receiver, Sender, TrySendError};

/// Requests one future draw cycle from the render context.
///
/// Fire-and-forget: raising a trigger never blocks, and triggers raised
/// before the next draw collapse into a single draw.
pub trait RenderTrigger: Send + 'static {
    fn request_render(&self);
}

/// Trigger side of a coalescing signal backed by a one-slot channel.
///
/// A full channel already means "a draw is pending", so extra requests are
/// dropped on the floor.
#[derive(Clone)]
pub struct SignalTrigger {
    tx: Sender<()>,
}

/// Render-thread side of [`SignalTrigger`].
pub struct RenderSignal {
    rx: Receiver<()>,
}

/// Create a connected trigger/signal pair.
pub fn render_signal() -> (SignalTrigger, RenderSignal) {
    let (tx, rx) = flume::bounded(1);
    (SignalTrigger { tx }, RenderSignal { rx })
}

impl RenderTrigger for SignalTrigger {
    fn request_render(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            // The render side is gone; nobody is left to wake.
            Err(TrySendError::Disconnected(())) => {}
        }
    }
}

impl RenderSignal {
    /// Park the render thread until a draw is requested.
    ///
    /// Returns `false` once every [`SignalTrigger`] has been dropped and no
    /// request is left pending.
    pub fn wait(&self) -> bool {
        self.rx.recv().is_ok()
    }

    /// Consume a pending request without waiting.
    pub fn try_wait(&self) -> bool {
        self.rx.try_recv().is_ok()
    }
}

/// Pending-draw flag shared by a trigger and the draw loop it wakes.
///
/// Only the first [`raise`](Self::raise) since the last
/// [`clear`](Self::clear) asks for a wakeup. The draw loop clears the latch
/// before it takes a frame, so a publish racing that draw raises it again
/// and gets a draw of its own.
#[derive(Debug, Clone, Default)]
pub struct RedrawLatch {
    pending: Arc<AtomicBool>,
}

impl RedrawLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a draw as pending. Returns `true` if the caller must wake the
    /// render context.
    pub fn raise(&self) -> bool {
        !self.pending.swap(true, Ordering::AcqRel)
    }

    /// Called by the draw loop at the start of a draw, before the take.
    pub fn clear(&self) {
        self.pending.store(false, Ordering::Release);
    }
}
