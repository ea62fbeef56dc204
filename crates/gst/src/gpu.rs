use std::ptr;

use cudarc::driver::sys::{self, CUcontext, CUdevice};
use cuda_rtsp_core::{ContextStack, Error, Result};

/// A CUDA context the session's frames are produced in.
///
/// Either the retained primary context of a device, or a caller-owned
/// context that is only borrowed and never destroyed here.
pub struct GpuContext {
    ctx: CUcontext,
    device: CUdevice,
    retained_primary: bool,
}

// CUcontext is a process-wide driver handle; the driver API accepts it from
// any thread and the push/pop pair below makes it current per call.
unsafe impl Send for GpuContext {}
unsafe impl Sync for GpuContext {}

impl GpuContext {
    /// Retain the primary context of device `ordinal`.
    ///
    /// [`crate::init`] must have run.
    pub fn primary(ordinal: i32) -> Result<Self> {
        let mut device: CUdevice = 0;
        let mut ctx: CUcontext = ptr::null_mut();
        unsafe {
            sys::cuDeviceGet(&mut device, ordinal)
                .result()
                .map_err(|e| Error::gpu(format!("cuDeviceGet({ordinal}): {e}")))?;
            sys::cuDevicePrimaryCtxRetain(&mut ctx, device)
                .result()
                .map_err(|e| Error::gpu(format!("cuDevicePrimaryCtxRetain({ordinal}): {e}")))?;
        }
        tracing::debug!(ordinal, "retained primary CUDA context");
        Ok(Self {
            ctx,
            device,
            retained_primary: true,
        })
    }

    /// Borrow a context created by the caller.
    ///
    /// # Safety
    ///
    /// `ctx` must be a valid context on `device` and must outlive every
    /// session built from this value.
    pub unsafe fn from_raw(ctx: CUcontext, device: CUdevice) -> Self {
        Self {
            ctx,
            device,
            retained_primary: false,
        }
    }

    pub fn raw(&self) -> CUcontext {
        self.ctx
    }

    pub fn device(&self) -> CUdevice {
        self.device
    }
}

impl ContextStack for GpuContext {
    fn push_current(&self) -> Result<()> {
        unsafe { sys::cuCtxPushCurrent_v2(self.ctx) }
            .result()
            .map_err(|e| Error::gpu(format!("cuCtxPushCurrent: {e}")))
    }

    fn pop_current(&self) -> Result<()> {
        let mut popped: CUcontext = ptr::null_mut();
        unsafe { sys::cuCtxPopCurrent_v2(&mut popped) }
            .result()
            .map_err(|e| Error::gpu(format!("cuCtxPopCurrent: {e}")))?;
        if popped != self.ctx {
            return Err(Error::gpu("context stack unbalanced: popped a foreign context"));
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        if self.retained_primary {
            if let Err(e) = unsafe { sys::cuDevicePrimaryCtxRelease_v2(self.device) }.result() {
                tracing::warn!(error = %e, device = self.device, "failed to release primary context");
            }
        }
    }
}
