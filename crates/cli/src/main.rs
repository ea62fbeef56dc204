use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use cuda_rtsp::{
    AcquireWait, Codec, DeviceFrame, FrameRate, GpuContext, PixelFormat, Server, Session,
    SessionConfig,
};
use cudarc::driver::sys;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "cuda-rtsp-server",
    about = "Stream a CUDA-generated test pattern over RTSP"
)]
struct Args {
    /// RTSP port
    #[arg(long, short, default_value_t = 8554)]
    port: u32,

    /// Mount path
    #[arg(long, default_value = "/test")]
    path: String,

    /// CUDA device ordinal
    #[arg(long, default_value_t = 0)]
    device: i32,

    #[arg(long, default_value_t = 640)]
    width: u32,

    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Pixel format of produced frames (NV12, BGRA, RGB, ...)
    #[arg(long, default_value_t = PixelFormat::Bgra)]
    format: PixelFormat,

    /// Frame rate as `num/den` or a whole number
    #[arg(long, default_value_t = FrameRate::default())]
    fps: FrameRate,

    /// h264 or h265
    #[arg(long, default_value_t = Codec::H264)]
    codec: Codec,

    /// Disable RTCP and treat the stream as live
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    live: bool,

    /// One pipeline for all clients instead of one per client
    #[arg(long)]
    shared: bool,

    /// Give up on a frame after this long without a free buffer; 0 waits forever
    #[arg(long, default_value_t = 5000)]
    acquire_timeout_ms: u64,
}

impl Args {
    fn session_config(&self) -> cuda_rtsp::Result<SessionConfig> {
        let wait = match self.acquire_timeout_ms {
            0 => AcquireWait::Block,
            ms => AcquireWait::Timeout(Duration::from_millis(ms)),
        };
        Ok(SessionConfig::new(self.width, self.height, self.format, self.fps)?
            .live(self.live)
            .codec(self.codec)
            .shared(self.shared)
            .acquire_wait(wait))
    }
}

/// Fills each frame with a solid colour that shifts every frame.
struct TestPattern {
    frame: u32,
}

impl TestPattern {
    fn fill(&mut self, frame: DeviceFrame) {
        let shade = (self.frame.wrapping_mul(3) % 256) as u8;
        self.frame = self.frame.wrapping_add(1);
        let result = if frame.len % 4 == 0 {
            let pixel = u32::from_le_bytes([shade, 255 - shade, 128, 255]);
            unsafe { sys::cuMemsetD32_v2(frame.ptr, pixel, frame.len / 4) }
        } else {
            unsafe { sys::cuMemsetD8_v2(frame.ptr, shade, frame.len) }
        };
        if let Err(e) = result.result() {
            tracing::warn!(error = %e, "test pattern fill failed");
        }
    }
}

fn run(args: Args) -> cuda_rtsp::Result<()> {
    cuda_rtsp::init()?;

    let config = args.session_config()?;
    let gpu = Arc::new(GpuContext::primary(args.device)?);
    let server = Arc::new(Server::with_port(Some(args.port))?);

    let mut pattern = TestPattern { frame: 0 };
    let session = Session::new(gpu, config, move |frame: DeviceFrame| pattern.fill(frame))?;
    session.mount(&server, &args.path)?;
    server.attach(None)?;

    let dispatcher = {
        let server = server.clone();
        thread::spawn(move || server.dispatch())
    };

    println!(
        "Streaming {} {}x{} @ {} on rtsp://127.0.0.1:{}{}; press Enter to stop",
        session.config().format,
        session.config().width,
        session.config().height,
        session.config().frame_rate,
        server.port(),
        args.path
    );
    let mut input = String::new();
    if let Err(e) = io::stdin().read_line(&mut input) {
        tracing::warn!(error = %e, "stdin closed");
    }

    server.shutdown();
    match dispatcher.join() {
        Ok(result) => result,
        Err(_) => Err(cuda_rtsp::Error::pipeline("dispatch thread panicked")),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("cuda-rtsp-server: {e}");
            ExitCode::FAILURE
        }
    }
}
