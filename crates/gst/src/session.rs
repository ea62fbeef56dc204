use std::sync::Arc;

use gst::glib::translate::from_glib_full;
use gst::prelude::*;
use gst_rtsp_server::RTSPMediaFactory;
use gst_rtsp_server::prelude::*;
use parking_lot::Mutex;

use cuda_rtsp_core::config::validate_mount_path;
use cuda_rtsp_core::{Blueprint, Error, FrameSource, PushCycle, Result, ResultExt, SessionConfig};

use crate::configure;
use crate::ffi;
use crate::gpu::GpuContext;
use crate::server::Server;

/// GStreamer wrapper (`GstCudaContext`) around the session's CUDA context.
pub struct CudaContext {
    object: gst::Object,
}

impl CudaContext {
    fn wrap(gpu: &GpuContext) -> Result<Self> {
        let raw = unsafe { ffi::gst_cuda_context_new_wrapped(gpu.raw(), gpu.device()) };
        if raw.is_null() {
            return Err(Error::gpu(format!(
                "cannot wrap CUDA context of device {}",
                gpu.device()
            )));
        }
        let object: gst::Object = unsafe { from_glib_full(raw as *mut gst::ffi::GstObject) };
        Ok(Self { object })
    }

    /// `GstContext` that shares this CUDA context with pipeline elements.
    fn to_gst_context(&self) -> Result<gst::Context> {
        let raw = unsafe { ffi::gst_context_new_cuda_context(self.as_raw()) };
        if raw.is_null() {
            return Err(Error::gpu("gst_context_new_cuda_context returned NULL"));
        }
        Ok(unsafe { from_glib_full(raw) })
    }

    pub(crate) fn as_raw(&self) -> *mut ffi::GstCudaContext {
        self.object.as_ptr() as *mut ffi::GstCudaContext
    }
}

/// Factory that instantiates `blueprint` per client, or once per mount when
/// `config.shared` is set.
fn media_factory(blueprint: &Blueprint, config: &SessionConfig) -> RTSPMediaFactory {
    let factory = RTSPMediaFactory::new();
    factory.set_launch(blueprint.launch());
    factory.set_shared(config.shared);
    factory.set_enable_rtcp(!config.live);
    factory
}

/// GPU resources shared by every connection of a session.
pub(crate) struct SessionResources {
    pub(crate) config: SessionConfig,
    pub(crate) gpu: Arc<GpuContext>,
    pub(crate) cuda: CudaContext,
    pub(crate) gst_context: gst::Context,
}

/// A configured video stream backed by a caller-supplied frame source.
///
/// The session's pipeline is instantiated per client connection, or once per
/// mount when [`SessionConfig::shared`] is set. Every instance pulls frames
/// from the same [`PushCycle`], so timestamps stay monotonic for the
/// lifetime of the session.
pub struct Session {
    blueprint: Blueprint,
    factory: RTSPMediaFactory,
    resources: Arc<SessionResources>,
}

impl Session {
    pub fn new<S>(gpu: Arc<GpuContext>, config: SessionConfig, source: S) -> Result<Self>
    where
        S: FrameSource + 'static,
    {
        Self::build(gpu, config, source).recorded("session create")
    }

    fn build<S>(gpu: Arc<GpuContext>, config: SessionConfig, source: S) -> Result<Self>
    where
        S: FrameSource + 'static,
    {
        config.validate()?;
        let blueprint = Blueprint::for_session(&config);

        let cuda = CudaContext::wrap(&gpu)?;
        let gst_context = cuda.to_gst_context()?;

        let factory = media_factory(&blueprint, &config);

        let producer = Arc::new(Mutex::new(PushCycle::new(
            source,
            config.frame_rate,
            config.acquire_wait,
        )));
        let resources = Arc::new(SessionResources {
            config,
            gpu,
            cuda,
            gst_context,
        });

        let weak = Arc::downgrade(&resources);
        factory.connect_media_configure(move |_, media| {
            let Some(resources) = weak.upgrade() else {
                configure::fail_media(media, &Error::pipeline("session was released"));
                return;
            };
            if let Err(err) = configure::configure_media(&resources, &producer, media) {
                configure::fail_media(media, &err);
            }
        });

        tracing::info!(
            format = %resources.config.format,
            width = resources.config.width,
            height = resources.config.height,
            rate = %resources.config.frame_rate,
            converts = blueprint.converts(),
            "session created"
        );

        Ok(Self {
            blueprint,
            factory,
            resources,
        })
    }

    /// Publish the session at `path` on `server`.
    pub fn mount(&self, server: &Server, path: &str) -> Result<()> {
        self.mount_inner(server, path).recorded("session mount")
    }

    fn mount_inner(&self, server: &Server, path: &str) -> Result<()> {
        validate_mount_path(path)?;
        let mounts = server.mount_points()?;
        mounts.add_factory(path, self.factory.clone());
        tracing::info!(path, port = server.port(), "session mounted");
        Ok(())
    }

    pub fn blueprint(&self) -> &Blueprint {
        &self.blueprint
    }

    pub fn config(&self) -> &SessionConfig {
        &self.resources.config
    }

    /// Media factory instantiated for each connecting client.
    pub fn factory(&self) -> &RTSPMediaFactory {
        &self.factory
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.resources.config)
            .field("launch", &self.blueprint.launch())
            .finish()
    }
}
