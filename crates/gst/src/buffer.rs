//! CUDA buffer pool, device mapping and appsrc hand-off.

use std::mem::MaybeUninit;

use gst::glib;
use gst::glib::translate::from_glib_full;
use gst::prelude::*;
use gst_app::AppSrc;

use cuda_rtsp_core::{
    DeviceFrame, Error, FrameBuffer, FramePool, FrameSink, FrameTiming, POOL_CAPACITY, Result,
};

use crate::ffi;
use crate::session::CudaContext;

/// Pool of CUDA device-memory buffers sized to one negotiated frame.
pub struct CudaBufferPool {
    pool: gst::BufferPool,
}

impl CudaBufferPool {
    pub fn new(cuda: &CudaContext) -> Result<Self> {
        let raw = unsafe { ffi::gst_cuda_buffer_pool_new(cuda.as_raw()) };
        if raw.is_null() {
            return Err(Error::gpu("gst_cuda_buffer_pool_new returned NULL"));
        }
        let pool: gst::BufferPool = unsafe { from_glib_full(raw) };
        Ok(Self { pool })
    }

    /// Size the pool to `frame_size` bytes per buffer and activate it.
    pub fn configure(&self, caps: &gst::Caps, frame_size: u32) -> Result<()> {
        let mut config = self.pool.config();
        config.set_params(Some(caps), frame_size, POOL_CAPACITY, POOL_CAPACITY);
        self.pool
            .set_config(config)
            .map_err(|e| Error::pipeline(format!("buffer pool rejected config: {e}")))?;
        self.pool
            .set_active(true)
            .map_err(|e| Error::pipeline(format!("buffer pool activation failed: {e}")))?;
        Ok(())
    }

    pub fn deactivate(&self) {
        if let Err(e) = self.pool.set_active(false) {
            tracing::warn!(error = %e, "failed to deactivate buffer pool");
        }
    }
}

impl FramePool for CudaBufferPool {
    type Frame = CudaFrame;

    fn try_acquire(&self) -> Result<Option<CudaFrame>> {
        let params =
            gst::BufferPoolAcquireParams::with_flags(gst::BufferPoolAcquireFlags::DONTWAIT);
        match self.pool.acquire_buffer(Some(&params)) {
            Ok(buffer) => Ok(Some(CudaFrame(buffer))),
            Err(gst::FlowError::Eos) => Ok(None),
            Err(e) => Err(Error::pipeline(format!("buffer acquisition failed: {e:?}"))),
        }
    }

    fn acquire(&self) -> Result<CudaFrame> {
        self.pool
            .acquire_buffer(None)
            .map(CudaFrame)
            .map_err(|e| Error::pipeline(format!("buffer acquisition failed: {e:?}")))
    }
}

/// A pooled buffer on its way into the pipeline.
pub struct CudaFrame(gst::Buffer);

impl CudaFrame {
    pub fn into_inner(self) -> gst::Buffer {
        self.0
    }
}

/// Device-pointer mapping of a CUDA buffer, unmapped on drop.
struct DeviceMapping<'a> {
    buffer: &'a mut gst::BufferRef,
    info: gst::ffi::GstMapInfo,
}

impl<'a> DeviceMapping<'a> {
    fn map_writable(buffer: &'a mut gst::BufferRef) -> Result<Self> {
        let mut info = MaybeUninit::<gst::ffi::GstMapInfo>::zeroed();
        let mapped = unsafe {
            gst::ffi::gst_buffer_map(
                buffer.as_mut_ptr(),
                info.as_mut_ptr(),
                gst::ffi::GST_MAP_WRITE | ffi::GST_MAP_CUDA,
            )
        };
        if mapped == glib::ffi::GFALSE {
            return Err(Error::gpu("failed to map CUDA buffer for writing"));
        }
        Ok(Self {
            buffer,
            info: unsafe { info.assume_init() },
        })
    }

    fn device_frame(&self) -> DeviceFrame {
        DeviceFrame {
            ptr: self.info.data as u64,
            len: self.info.size,
        }
    }
}

impl Drop for DeviceMapping<'_> {
    fn drop(&mut self) {
        unsafe { gst::ffi::gst_buffer_unmap(self.buffer.as_mut_ptr(), &mut self.info) };
    }
}

impl FrameBuffer for CudaFrame {
    fn write_with<R>(&mut self, write: impl FnOnce(DeviceFrame) -> R) -> Result<R> {
        let mapping = DeviceMapping::map_writable(self.0.make_mut())?;
        Ok(write(mapping.device_frame()))
    }

    fn set_timing(&mut self, timing: FrameTiming) {
        let buffer = self.0.make_mut();
        buffer.set_pts(gst::ClockTime::from_nseconds(timing.pts_ns));
        buffer.set_duration(gst::ClockTime::from_nseconds(timing.duration_ns));
    }
}

impl FrameSink<CudaFrame> for AppSrc {
    fn push(&self, frame: CudaFrame) -> Result<()> {
        self.push_buffer(frame.into_inner())
            .map(drop)
            .map_err(|e| Error::pipeline(format!("appsrc refused buffer: {e:?}")))
    }
}
