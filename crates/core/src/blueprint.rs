//! Pipeline blueprints and caps descriptions.
//!
//! A blueprint is the launch description the RTSP media factory instantiates
//! for every connecting client:
//!
//! ```text
//! direct:     appsrc name=source ! nvh264enc ! rtph264pay name=pay0 pt=96
//! conversion: appsrc name=source ! cudaconvert ! nvh264enc ! rtph264pay name=pay0 pt=96
//! ```
//!
//! The transport server locates the payloader by its `pay0` name; the
//! configurator locates the capture element by its `source` name.

use std::fmt;
use std::str::FromStr;

use crate::config::{FrameRate, SessionConfig};
use crate::error::{Error, Result};
use crate::format::PixelFormat;

/// Name of the capture element that receives GPU frames.
pub const SOURCE_ELEMENT: &str = "source";

/// Name the RTSP media factory expects on the first payloader.
pub const PAYLOAD_ELEMENT: &str = "pay0";

/// Dynamic RTP payload type used for the video stream.
pub const PAYLOAD_TYPE: u8 = 96;

/// Caps feature marking buffers that live in CUDA device memory.
pub const CUDA_MEMORY_FEATURE: &str = "memory:CUDAMemory";

/// Hardware video codec used by the encoder stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Codec {
    #[default]
    H264,
    H265,
}

impl Codec {
    /// NVENC encoder element.
    pub fn encoder(self) -> &'static str {
        match self {
            Self::H264 => "nvh264enc",
            Self::H265 => "nvh265enc",
        }
    }

    /// RTP payloader element.
    pub fn payloader(self) -> &'static str {
        match self {
            Self::H264 => "rtph264pay",
            Self::H265 => "rtph265pay",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H264 => f.write_str("h264"),
            Self::H265 => f.write_str("h265"),
        }
    }
}

impl FromStr for Codec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "h264" | "avc" => Ok(Self::H264),
            "h265" | "hevc" => Ok(Self::H265),
            other => Err(Error::invalid_config(format!("unknown codec {other:?}"))),
        }
    }
}

/// Shape of the per-session pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blueprint {
    launch: String,
    converts: bool,
}

impl Blueprint {
    /// Select the pipeline shape for a pixel format and codec.
    pub fn new(format: PixelFormat, codec: Codec) -> Self {
        let converts = format.needs_conversion();
        let convert = if converts { "cudaconvert ! " } else { "" };
        let launch = format!(
            "( appsrc name={SOURCE_ELEMENT} ! {convert}{} ! {} name={PAYLOAD_ELEMENT} pt={PAYLOAD_TYPE} )",
            codec.encoder(),
            codec.payloader(),
        );
        Self { launch, converts }
    }

    pub fn for_session(config: &SessionConfig) -> Self {
        Self::new(config.format, config.codec)
    }

    /// Launch description handed to the media factory.
    pub fn launch(&self) -> &str {
        &self.launch
    }

    /// Whether a CUDA conversion stage precedes the encoder.
    pub fn converts(&self) -> bool {
        self.converts
    }
}

/// Caps description of the frames the capture element produces.
///
/// `video/x-raw(memory:CUDAMemory),format=BGRA,width=640,height=480,framerate=30/1`
pub fn caps_description(format: PixelFormat, width: u32, height: u32, rate: FrameRate) -> String {
    format!(
        "video/x-raw({CUDA_MEMORY_FEATURE}),format={},width={width},height={height},framerate={}/{}",
        format.canonical_name(),
        rate.num(),
        rate.den(),
    )
}

/// [`caps_description`] for a session's declared stream.
pub fn session_caps(config: &SessionConfig) -> String {
    caps_description(config.format, config.width, config.height, config.frame_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_blueprint_for_native_format() {
        let bp = Blueprint::new(PixelFormat::Bgra, Codec::H264);
        assert!(!bp.converts());
        assert_eq!(
            bp.launch(),
            "( appsrc name=source ! nvh264enc ! rtph264pay name=pay0 pt=96 )"
        );
    }

    #[test]
    fn conversion_blueprint_for_packed_rgb() {
        let bp = Blueprint::new(PixelFormat::Rgb, Codec::H264);
        assert!(bp.converts());
        assert_eq!(
            bp.launch(),
            "( appsrc name=source ! cudaconvert ! nvh264enc ! rtph264pay name=pay0 pt=96 )"
        );
    }

    #[test]
    fn h265_blueprint() {
        let bp = Blueprint::new(PixelFormat::Nv12, Codec::H265);
        assert!(bp.launch().contains("nvh265enc ! rtph265pay name=pay0"));
    }

    #[test]
    fn blueprint_follows_conversion_rule() {
        for format in PixelFormat::ALL {
            let bp = Blueprint::new(format, Codec::H264);
            assert_eq!(bp.converts(), format.needs_conversion());
            assert_eq!(bp.launch().contains("cudaconvert"), format.needs_conversion());
        }
    }

    #[test]
    fn caps_string_for_bgra() {
        let caps = caps_description(PixelFormat::Bgra, 640, 480, FrameRate::new(30, 1).unwrap());
        assert_eq!(
            caps,
            "video/x-raw(memory:CUDAMemory),format=BGRA,width=640,height=480,framerate=30/1"
        );
    }

    #[test]
    fn caps_string_keeps_fractional_rate() {
        let caps = caps_description(
            PixelFormat::Nv12,
            1920,
            1080,
            FrameRate::new(30000, 1001).unwrap(),
        );
        assert!(caps.ends_with("format=NV12,width=1920,height=1080,framerate=30000/1001"));
    }

    #[test]
    fn codec_parse() {
        assert_eq!("H264".parse::<Codec>().unwrap(), Codec::H264);
        assert_eq!("hevc".parse::<Codec>().unwrap(), Codec::H265);
        assert!("vp9".parse::<Codec>().is_err());
    }
}
