pub mod mailbox;
pub mod trigger;

pub use mailbox::{Mailbox, MailboxStats};
pub use trigger::{render_signal, RedrawLatch, RenderSignal, RenderTrigger, SignalTrigger};
