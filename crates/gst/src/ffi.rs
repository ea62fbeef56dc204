//! Raw bindings for the parts of `libgstcuda-1.0` used by the streamer.
//!
//! The library ships with gst-plugins-bad (1.22+) and has no Rust binding
//! crate, so the few entry points needed are declared here.

#![allow(non_camel_case_types)]

use cudarc::driver::sys::{CUcontext, CUdevice};
use gst::ffi::{GST_MAP_FLAG_LAST, GstBufferPool, GstContext, GstMapFlags};
use gst::glib::ffi::gboolean;

/// Opaque `GstCudaContext` instance (a `GstObject` subclass).
#[repr(C)]
pub struct GstCudaContext {
    _private: [u8; 0],
}

/// Map flag requesting the CUDA device pointer instead of a host staging copy.
pub const GST_MAP_CUDA: GstMapFlags = GST_MAP_FLAG_LAST << 1;

#[link(name = "gstcuda-1.0")]
unsafe extern "C" {
    /// Loads `libcuda` symbols for the GStreamer CUDA library.
    pub fn gst_cuda_load_library() -> gboolean;

    /// Registers the CUDA memory allocator.
    pub fn gst_cuda_memory_init_once();

    /// Wraps an externally owned CUDA context; the context is not destroyed
    /// when the wrapper is finalised. Returns a full reference.
    pub fn gst_cuda_context_new_wrapped(handler: CUcontext, device: CUdevice) -> *mut GstCudaContext;

    /// Builds a `GstContext` of type `gst.cuda.context` carrying `cuda_ctx`.
    pub fn gst_context_new_cuda_context(cuda_ctx: *mut GstCudaContext) -> *mut GstContext;

    /// New CUDA device-memory buffer pool bound to `context`.
    pub fn gst_cuda_buffer_pool_new(context: *mut GstCudaContext) -> *mut GstBufferPool;
}
