//! Pixel formats accepted from the GPU producer.
//!
//! The enumeration doubles as the canonical name table used in caps
//! descriptions, so a format code is valid exactly when it indexes that
//! table. Codes outside it are rejected by [`PixelFormat::from_code`].

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Raw video layout of the frames written by the frame source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PixelFormat {
    Nv12 = 0,
    Yv12 = 1,
    I420 = 2,
    Bgra = 3,
    Rgba = 4,
    Y444 = 5,
    Vuya = 6,
    Argb = 7,
    Abgr = 8,
    Bgr = 9,
    Rgb = 10,
}

impl PixelFormat {
    /// All formats, ordered by code.
    pub const ALL: [PixelFormat; 11] = [
        Self::Nv12,
        Self::Yv12,
        Self::I420,
        Self::Bgra,
        Self::Rgba,
        Self::Y444,
        Self::Vuya,
        Self::Argb,
        Self::Abgr,
        Self::Bgr,
        Self::Rgb,
    ];

    /// Resolve a numeric format code.
    pub fn from_code(code: u32) -> Result<Self> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or_else(|| Error::UnsupportedFormat(format!("code {code}")))
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    /// GStreamer video format name (`format=` field of raw video caps).
    pub fn canonical_name(self) -> &'static str {
        match self {
            Self::Nv12 => "NV12",
            Self::Yv12 => "YV12",
            Self::I420 => "I420",
            Self::Bgra => "BGRA",
            Self::Rgba => "RGBA",
            Self::Y444 => "Y444",
            Self::Vuya => "VUYA",
            Self::Argb => "ARGB",
            Self::Abgr => "ABGR",
            Self::Bgr => "BGR",
            Self::Rgb => "RGB",
        }
    }

    /// Whether the hardware encoder cannot consume this layout directly and a
    /// CUDA conversion stage must precede it.
    pub fn needs_conversion(self) -> bool {
        !matches!(
            self,
            Self::Nv12
                | Self::Yv12
                | Self::I420
                | Self::Bgra
                | Self::Rgba
                | Self::Y444
                | Self::Vuya
        )
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

impl FromStr for PixelFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|format| format.canonical_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnsupportedFormat(s.to_string()))
    }
}
