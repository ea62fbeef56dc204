use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::blueprint::Codec;
use crate::error::{Error, Result};
use crate::format::PixelFormat;

/// Well-known RTSP service port used when the caller does not pick one.
pub const DEFAULT_PORT: u16 = 8554;

/// Default upper bound on how long a push cycle waits for a pooled buffer.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Server-level configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// TCP port the RTSP service binds to.
    pub port: u16,
}

impl ServerConfig {
    /// Build a config from an optional caller-supplied port.
    ///
    /// `None` selects [`DEFAULT_PORT`]. An explicit port must lie in
    /// `[1, 65535]`.
    pub fn with_port(port: Option<u32>) -> Result<Self> {
        let port = match port {
            None => DEFAULT_PORT,
            Some(p) if (1..=u16::MAX as u32).contains(&p) => p as u16,
            Some(p) => return Err(Error::InvalidPort(p)),
        };
        Ok(Self { port })
    }

    /// Service string handed to the transport server.
    pub fn service(&self) -> String {
        self.port.to_string()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

/// Declared frame rate as an exact fraction of frames per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    num: u32,
    den: u32,
}

impl FrameRate {
    pub fn new(num: u32, den: u32) -> Result<Self> {
        if num == 0 || den == 0 {
            return Err(Error::invalid_config(format!(
                "frame rate {num}/{den} must have non-zero terms"
            )));
        }
        if num > i32::MAX as u32 || den > i32::MAX as u32 {
            return Err(Error::invalid_config(format!(
                "frame rate {num}/{den} does not fit caps fields"
            )));
        }
        let rate = Self { num, den };
        if rate.frame_duration_ns() == 0 {
            return Err(Error::invalid_config(format!(
                "frame rate {num}/{den} is below nanosecond resolution"
            )));
        }
        Ok(rate)
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn den(&self) -> u32 {
        self.den
    }

    /// Duration of one frame in nanoseconds: `den * 1s / num`, truncated.
    pub fn frame_duration_ns(&self) -> u64 {
        (self.den as u128 * 1_000_000_000u128 / self.num as u128) as u64
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self { num: 30, den: 1 }
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl FromStr for FrameRate {
    type Err = Error;

    /// Accepts `"30"` or `"30000/1001"`.
    fn from_str(s: &str) -> Result<Self> {
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| Error::invalid_config(format!("bad frame rate {s:?}")))
        };
        match s.split_once('/') {
            Some((num, den)) => Self::new(parse(num)?, parse(den)?),
            None => Self::new(parse(s)?, 1),
        }
    }
}

/// How a push cycle waits when both pooled buffers are outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireWait {
    /// Block until the consumer releases a buffer.
    Block,
    /// Give up with [`Error::PoolExhausted`] after the given duration.
    Timeout(Duration),
}

impl Default for AcquireWait {
    fn default() -> Self {
        Self::Timeout(DEFAULT_ACQUIRE_TIMEOUT)
    }
}

/// Definition of one video stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub frame_rate: FrameRate,
    /// Live sources skip RTCP on the media factory.
    pub live: bool,
    pub codec: Codec,
    /// Share one pipeline between all clients of the mount. Off by default,
    /// so every connection gets its own configured pipeline.
    pub shared: bool,
    pub acquire_wait: AcquireWait,
}

impl SessionConfig {
    pub fn new(width: u32, height: u32, format: PixelFormat, frame_rate: FrameRate) -> Result<Self> {
        let config = Self {
            width,
            height,
            format,
            frame_rate,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::invalid_config(format!(
                "frame size {}x{} must be non-zero",
                self.width, self.height
            )));
        }
        if self.width > i32::MAX as u32 || self.height > i32::MAX as u32 {
            return Err(Error::invalid_config(format!(
                "frame size {}x{} does not fit caps fields",
                self.width, self.height
            )));
        }
        FrameRate::new(self.frame_rate.num, self.frame_rate.den)?;
        Ok(())
    }

    pub fn live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    pub fn acquire_wait(mut self, wait: AcquireWait) -> Self {
        self.acquire_wait = wait;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            format: PixelFormat::Bgra,
            frame_rate: FrameRate::default(),
            live: true,
            codec: Codec::default(),
            shared: false,
            acquire_wait: AcquireWait::default(),
        }
    }
}

/// Check that `path` can be registered in an RTSP mount registry.
pub fn validate_mount_path(path: &str) -> Result<()> {
    if !path.starts_with('/') || path.chars().any(char::is_whitespace) {
        return Err(Error::InvalidMountPath(path.to_string()));
    }
    Ok(())
}
