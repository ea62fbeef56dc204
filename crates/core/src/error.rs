//! Error types for the CUDA RTSP library.
//!
//! Every fallible call returns [`Result`]. The message of the most recent
//! failure on the calling thread is also kept for diagnostics and can be read
//! back with [`last_error`]; it is advisory only, callers decide on the
//! returned `Result`.

use std::cell::RefCell;
use std::time::Duration;

/// Errors that can occur while setting up or driving a stream.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Setup**: [`InvalidPort`](Self::InvalidPort),
///   [`UnsupportedFormat`](Self::UnsupportedFormat),
///   [`InvalidConfig`](Self::InvalidConfig),
///   [`InvalidMountPath`](Self::InvalidMountPath),
///   [`AlreadyAttached`](Self::AlreadyAttached), [`NotAttached`](Self::NotAttached),
///   [`Init`](Self::Init).
/// - **Configuration** (per connection): [`ElementNotFound`](Self::ElementNotFound),
///   [`Pipeline`](Self::Pipeline).
/// - **Steady state** (per frame): [`PoolExhausted`](Self::PoolExhausted),
///   [`Gpu`](Self::Gpu), [`Source`](Self::Source).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Explicit server port outside `[1, 65535]`.
    #[error("port value must be in [1,65535], got {0}")]
    InvalidPort(u32),

    /// Pixel format code outside the declared enumeration.
    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(String),

    /// Session or stream parameters that cannot describe a video stream.
    #[error("invalid session config: {0}")]
    InvalidConfig(String),

    /// Mount path that the RTSP mount registry cannot serve.
    #[error("invalid mount path: {0:?}")]
    InvalidMountPath(String),

    /// A server can be attached to one event loop only.
    #[error("server already attached to an event loop")]
    AlreadyAttached,

    /// The server has no event loop to dispatch.
    #[error("server not attached to an event loop")]
    NotAttached,

    /// A named element is missing from the instantiated pipeline.
    #[error("pipeline element not found: {0}")]
    ElementNotFound(String),

    /// Both pooled buffers stayed outstanding for the whole wait budget.
    #[error("no pooled buffer released within {0:?}")]
    PoolExhausted(Duration),

    /// CUDA driver or context-stack failure.
    #[error("GPU error: {0}")]
    Gpu(String),

    /// GStreamer refused a caps string, a pool config or a buffer.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// The caller's frame source reported a failure.
    #[error("frame source failed: {0}")]
    Source(#[source] SourceError),

    /// Global library initialisation failed.
    #[error("initialisation failed: {0}")]
    Init(String),
}

/// Boxed error returned by a [`FrameSource`](crate::FrameSource).
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn gpu(msg: impl Into<String>) -> Self {
        Self::Gpu(msg.into())
    }

    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Message of the most recent failure recorded on this thread, if any.
pub fn last_error() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

/// Forget the failure recorded on this thread.
pub fn clear_last_error() {
    LAST_ERROR.with(|slot| slot.borrow_mut().take());
}

fn record(context: &str, error: &Error) {
    let message = format!("{context}: {error}");
    tracing::warn!(error = %error, context, "call failed");
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
}

/// Records failures into the thread-local last-error slot.
pub trait ResultExt {
    /// On `Err`, store `"<context>: <error>"` as this thread's last error.
    fn recorded(self, context: &str) -> Self;
}

impl<T> ResultExt for Result<T> {
    fn recorded(self, context: &str) -> Self {
        if let Err(error) = &self {
            record(context, error);
        }
        self
    }
}
