//! Pixel format tags and channel-order lookup.
//!
//! Host code passes a format as an integer ordinal; everything past the
//! boundary works with the [`PixelFormat`] enum.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DetectError, DetectResult};

/// Interleaved pixel layouts accepted by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Rgb,
    Bgr,
    Argb,
    Bgra,
    Abgr,
    Rgba,
    Grayscale,
}

impl PixelFormat {
    /// All formats, indexed by their host ordinal.
    pub const ALL: &'static [PixelFormat] = &[
        PixelFormat::Rgb,
        PixelFormat::Bgr,
        PixelFormat::Argb,
        PixelFormat::Bgra,
        PixelFormat::Abgr,
        PixelFormat::Rgba,
        PixelFormat::Grayscale,
    ];

    /// Convert a host ordinal (0 = RGB ... 6 = Grayscale).
    pub fn from_ordinal(tag: i32) -> DetectResult<Self> {
        usize::try_from(tag)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or_else(|| DetectError::unsupported_format(format!("unknown format tag {}", tag)))
    }

    /// Host ordinal of this format.
    pub fn ordinal(&self) -> i32 {
        match self {
            PixelFormat::Rgb => 0,
            PixelFormat::Bgr => 1,
            PixelFormat::Argb => 2,
            PixelFormat::Bgra => 3,
            PixelFormat::Abgr => 4,
            PixelFormat::Rgba => 5,
            PixelFormat::Grayscale => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PixelFormat::Rgb => "rgb",
            PixelFormat::Bgr => "bgr",
            PixelFormat::Argb => "argb",
            PixelFormat::Bgra => "bgra",
            PixelFormat::Abgr => "abgr",
            PixelFormat::Rgba => "rgba",
            PixelFormat::Grayscale => "grayscale",
        }
    }

    /// Bytes occupied by one pixel.
    #[inline]
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
            PixelFormat::Argb | PixelFormat::Bgra | PixelFormat::Abgr | PixelFormat::Rgba => 4,
            PixelFormat::Grayscale => 1,
        }
    }

    /// True when the format carries red, green and blue channels.
    #[inline]
    pub fn has_color(&self) -> bool {
        !matches!(self, PixelFormat::Grayscale)
    }

    /// Byte offset within a pixel of logical channel `c` (0 = R, 1 = G, 2 = B).
    ///
    /// Fails with `UnsupportedFormat` for grayscale input and for `c > 2`.
    pub fn channel_index(&self, c: usize) -> DetectResult<usize> {
        if c > 2 {
            return Err(DetectError::unsupported_format(format!(
                "channel {} is not a color channel",
                c
            )));
        }
        let offset = match self {
            PixelFormat::Rgb | PixelFormat::Rgba => c,
            PixelFormat::Bgr => 2 - c,
            PixelFormat::Argb => c + 1,
            PixelFormat::Bgra => 2 - c,
            PixelFormat::Abgr => 3 - c,
            PixelFormat::Grayscale => {
                return Err(DetectError::unsupported_format(
                    "grayscale input has no RGB channels",
                ))
            }
        };
        Ok(offset)
    }

    /// Byte offsets of R, G and B within one pixel.
    pub fn rgb_offsets(&self) -> DetectResult<[usize; 3]> {
        Ok([
            self.channel_index(0)?,
            self.channel_index(1)?,
            self.channel_index(2)?,
        ])
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PixelFormat {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rgb" => Ok(PixelFormat::Rgb),
            "bgr" => Ok(PixelFormat::Bgr),
            "argb" => Ok(PixelFormat::Argb),
            "bgra" => Ok(PixelFormat::Bgra),
            "abgr" => Ok(PixelFormat::Abgr),
            "rgba" => Ok(PixelFormat::Rgba),
            "grayscale" | "gray" => Ok(PixelFormat::Grayscale),
            _ => Err(DetectError::unsupported_format(format!(
                "unknown format name '{}'",
                s
            ))),
        }
    }
}
