pub mod invoker;
pub mod transform;

pub use invoker::{ProcessError, ProcessingInvoker};
pub use transform::{ImageBuf, ImageRef, ImageTransform, TransformError, TransformKind};
