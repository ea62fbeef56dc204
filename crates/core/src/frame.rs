//! Frame-level seams between the push cycle and its collaborators.

use crate::clock::FrameTiming;
use crate::error::{Result, SourceError};

/// Raw CUDA device pointer.
pub type DevicePtr = u64;

/// Writable view of one pooled frame in device memory.
///
/// Valid only for the duration of a [`FrameSource::produce`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFrame {
    pub ptr: DevicePtr,
    pub len: usize,
}

/// Producer of frame contents.
///
/// `produce` runs with the session's GPU context current and must fill all
/// `frame.len` bytes before returning. Closures taking a [`DeviceFrame`]
/// implement this trait directly.
pub trait FrameSource: Send {
    fn produce(&mut self, frame: DeviceFrame) -> std::result::Result<(), SourceError>;
}

impl<F> FrameSource for F
where
    F: FnMut(DeviceFrame) + Send,
{
    fn produce(&mut self, frame: DeviceFrame) -> std::result::Result<(), SourceError> {
        self(frame);
        Ok(())
    }
}

/// A pooled buffer the push cycle fills, stamps and hands on.
pub trait FrameBuffer {
    /// Map the buffer for device write access, run `write`, then unmap.
    fn write_with<R>(&mut self, write: impl FnOnce(DeviceFrame) -> R) -> Result<R>;

    fn set_timing(&mut self, timing: FrameTiming);
}

/// Consumer of filled frames (the pipeline's capture element).
pub trait FrameSink<F> {
    fn push(&self, frame: F) -> Result<()>;
}
