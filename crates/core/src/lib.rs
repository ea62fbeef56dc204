//! GPU- and GStreamer-independent core of the CUDA RTSP streamer.
//!
//! Holds the stream definitions (formats, blueprints, caps, configuration),
//! the frame pacing clock and the push cycle that turns a caller's frame
//! source into timestamped pipeline buffers. The GStreamer/CUDA integration
//! implements the [`ContextStack`], [`FramePool`], [`FrameBuffer`] and
//! [`FrameSink`] seams.

pub mod blueprint;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod format;
pub mod frame;
pub mod pool;
pub mod push;

pub use blueprint::{Blueprint, Codec};
pub use clock::{FrameClock, FrameTiming};
pub use config::{AcquireWait, FrameRate, ServerConfig, SessionConfig};
pub use context::{ContextGuard, ContextStack};
pub use error::{Error, Result, ResultExt, SourceError, clear_last_error, last_error};
pub use format::PixelFormat;
pub use frame::{DeviceFrame, DevicePtr, FrameBuffer, FrameSink, FrameSource};
pub use pool::{FramePool, POOL_CAPACITY};
pub use push::PushCycle;
