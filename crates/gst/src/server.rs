use gst::glib::{self, ControlFlow, MainContext, MainLoop, Priority, SourceId};
use gst_rtsp_server::prelude::*;
use gst_rtsp_server::{RTSPMountPoints, RTSPServer};
use parking_lot::Mutex;

use cuda_rtsp_core::{Error, Result, ResultExt, ServerConfig};

/// RTSP endpoint that sessions are mounted on.
///
/// The server is `Send + Sync`: [`Server::dispatch`] usually blocks a
/// dedicated thread while [`Server::shutdown`] is called from another.
pub struct Server {
    config: ServerConfig,
    server: RTSPServer,
    attachment: Mutex<Option<Attachment>>,
    running: Mutex<LoopState>,
}

struct Attachment {
    context: MainContext,
    source: SourceId,
}

#[derive(Default)]
struct LoopState {
    main_loop: Option<MainLoop>,
    stop_requested: bool,
}

impl Server {
    pub fn new(config: ServerConfig) -> Result<Self> {
        Self::create(config).recorded("server create")
    }

    fn create(config: ServerConfig) -> Result<Self> {
        gst::init().map_err(|e| Error::Init(e.to_string()))?;
        let server = RTSPServer::new();
        server.set_service(&config.service());
        tracing::debug!(port = config.port, "server created");
        Ok(Self {
            config,
            server,
            attachment: Mutex::new(None),
            running: Mutex::new(LoopState::default()),
        })
    }

    /// Server on `port`, or the default port when `None`.
    pub fn with_port(port: Option<u32>) -> Result<Self> {
        ServerConfig::with_port(port)
            .recorded("server create")
            .and_then(Self::new)
    }

    /// Bind the listening socket and register it on `context`, or the
    /// global default context.
    pub fn attach(&self, context: Option<&MainContext>) -> Result<()> {
        self.attach_inner(context).recorded("server attach")
    }

    fn attach_inner(&self, context: Option<&MainContext>) -> Result<()> {
        let mut attachment = self.attachment.lock();
        if attachment.is_some() {
            return Err(Error::AlreadyAttached);
        }
        let context = context.cloned().unwrap_or_else(MainContext::default);
        let source = self
            .server
            .attach(Some(&context))
            .map_err(|e| Error::pipeline(format!("cannot listen on port {}: {e}", self.port())))?;
        *attachment = Some(Attachment { context, source });
        tracing::info!(port = self.port(), "server attached");
        Ok(())
    }

    /// Run the event loop of the attached context until [`Server::shutdown`].
    pub fn dispatch(&self) -> Result<()> {
        self.dispatch_inner().recorded("server dispatch")
    }

    fn dispatch_inner(&self) -> Result<()> {
        let context = self
            .attachment
            .lock()
            .as_ref()
            .map(|a| a.context.clone())
            .ok_or(Error::NotAttached)?;

        let main_loop = {
            let mut running = self.running.lock();
            if std::mem::take(&mut running.stop_requested) {
                tracing::debug!("shutdown requested before dispatch");
                return Ok(());
            }
            if running.main_loop.is_some() {
                return Err(Error::pipeline("server is already dispatching"));
            }
            let main_loop = MainLoop::new(Some(&context), false);
            running.main_loop = Some(main_loop.clone());
            main_loop
        };

        tracing::info!(port = self.port(), "dispatching");
        main_loop.run();

        self.running.lock().main_loop = None;
        tracing::info!(port = self.port(), "dispatch finished");
        Ok(())
    }

    /// Stop a running [`Server::dispatch`]. Safe from any thread.
    ///
    /// Without a running loop the request is remembered and the next
    /// dispatch returns immediately.
    pub fn shutdown(&self) {
        let mut running = self.running.lock();
        match running.main_loop.clone() {
            Some(main_loop) => {
                // Quitting through the loop's own context also covers the
                // window before run() has started iterating.
                let context = main_loop.context();
                let source = glib::idle_source_new(None, Priority::DEFAULT, move || {
                    main_loop.quit();
                    ControlFlow::Break
                });
                source.attach(Some(&context));
            }
            None => running.stop_requested = true,
        }
        tracing::debug!("shutdown requested");
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn is_attached(&self) -> bool {
        self.attachment.lock().is_some()
    }

    pub(crate) fn mount_points(&self) -> Result<RTSPMountPoints> {
        self.server
            .mount_points()
            .ok_or_else(|| Error::pipeline("server has no mount points"))
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(main_loop) = self.running.get_mut().main_loop.take() {
            main_loop.quit();
        }
        if let Some(Attachment { context, source }) = self.attachment.get_mut().take() {
            match context.find_source_by_id(&source) {
                Some(source) => source.destroy(),
                None => tracing::warn!(port = self.config.port, "server source already removed"),
            }
        }
        tracing::debug!(port = self.config.port, "server dropped");
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("port", &self.config.port)
            .field("attached", &self.is_attached())
            .finish()
    }
}
