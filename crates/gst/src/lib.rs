//! Serve frames rendered in CUDA device memory over RTSP.
//!
//! A [`Session`] describes one video stream (format, size, frame rate,
//! codec) and owns the caller's [`FrameSource`]. Mounted on a [`Server`], it
//! is turned into a GStreamer pipeline per client:
//!
//! ```text
//! appsrc name=source ! [cudaconvert !] nvh264enc ! rtph264pay name=pay0 pt=96
//! ```
//!
//! Whenever the pipeline asks for data, a pooled CUDA buffer is mapped, its
//! device pointer is handed to the source with the session's context made
//! current, and the buffer is timestamped and pushed. Nothing is copied
//! through host memory.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use cuda_rtsp::{GpuContext, Server, Session, SessionConfig};
//!
//! cuda_rtsp::init()?;
//! let gpu = Arc::new(GpuContext::primary(0)?);
//! let server = Server::with_port(None)?;
//! let session = Session::new(gpu, SessionConfig::default(), |frame: cuda_rtsp::DeviceFrame| {
//!     // launch a kernel writing `frame.len` bytes at `frame.ptr`
//!     let _ = frame;
//! })?;
//! session.mount(&server, "/test")?;
//! server.attach(None)?;
//! server.dispatch()?;
//! # Ok::<(), cuda_rtsp::Error>(())
//! ```

mod buffer;
mod configure;
mod ffi;
mod gpu;
mod server;
mod session;

use std::sync::LazyLock;

use cudarc::driver::sys;
use gst::glib;
use parking_lot::Mutex;

pub use buffer::{CudaBufferPool, CudaFrame};
pub use gpu::GpuContext;
pub use server::Server;
pub use session::{CudaContext, Session};

pub use cuda_rtsp_core::{
    AcquireWait, Blueprint, Codec, DeviceFrame, DevicePtr, Error, FrameRate, FrameSource,
    PixelFormat, Result, ResultExt, ServerConfig, SessionConfig, SourceError, clear_last_error,
    last_error,
};

pub(crate) static CAT: LazyLock<gst::DebugCategory> = LazyLock::new(|| {
    gst::DebugCategory::new(
        "cudartsp",
        gst::DebugColorFlags::empty(),
        Some("CUDA RTSP streamer"),
    )
});

static INITIALIZED: Mutex<bool> = Mutex::new(false);

/// Initialise the CUDA driver, GStreamer and the GStreamer CUDA library.
///
/// Idempotent; every other entry point assumes it has succeeded.
pub fn init() -> Result<()> {
    init_inner().recorded("init")
}

fn init_inner() -> Result<()> {
    let mut initialized = INITIALIZED.lock();
    if *initialized {
        return Ok(());
    }

    if !unsafe { sys::is_culib_present() } {
        return Err(Error::Init("libcuda is not available".into()));
    }
    unsafe { sys::cuInit(0) }
        .result()
        .map_err(|e| Error::Init(format!("cuInit: {e}")))?;

    gst::init().map_err(|e| Error::Init(e.to_string()))?;

    if unsafe { ffi::gst_cuda_load_library() } == glib::ffi::GFALSE {
        return Err(Error::Init("GStreamer CUDA library failed to load".into()));
    }
    unsafe { ffi::gst_cuda_memory_init_once() };

    *initialized = true;
    tracing::info!(gstreamer = %gst::version_string(), "initialised");
    Ok(())
}

/// Release GStreamer.
///
/// # Safety
///
/// No GStreamer object (server, session, pipeline) may be alive, and no
/// GStreamer call may follow on any thread.
pub unsafe fn deinit() {
    let mut initialized = INITIALIZED.lock();
    if std::mem::take(&mut *initialized) {
        unsafe { gst::deinit() };
        tracing::info!("deinitialised");
    }
}
