//! Borrowed, validated view over a raw interleaved image buffer.
//!
//! All size and stride checks happen in [`FrameView::new`], so the
//! preprocessing kernels can index rows without further bounds reasoning.

use crate::error::{DetectError, DetectResult};
use crate::pixel_format::PixelFormat;

/// Immutable view of an interleaved color image.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
    stride: usize,
    format: PixelFormat,
    offsets: [usize; 3],
}

impl<'a> FrameView<'a> {
    /// Validate and wrap a raw buffer.
    ///
    /// # Errors
    /// - `InvalidInput` for an empty buffer, zero dimensions, a stride shorter
    ///   than one row of pixels, or a buffer too short for `height` rows
    /// - `UnsupportedFormat` for formats without three color channels
    pub fn new(
        data: &'a [u8],
        width: usize,
        height: usize,
        stride: usize,
        format: PixelFormat,
    ) -> DetectResult<Self> {
        if data.is_empty() {
            return Err(DetectError::invalid_input("image buffer is empty"));
        }
        if width == 0 || height == 0 {
            return Err(DetectError::invalid_input(format!(
                "image dimensions must be positive, got {}x{}",
                width, height
            )));
        }

        let offsets = format.rgb_offsets()?;
        let row_bytes = width
            .checked_mul(format.bytes_per_pixel())
            .ok_or_else(|| DetectError::invalid_input("image width overflows row size"))?;
        if stride < row_bytes {
            return Err(DetectError::invalid_input(format!(
                "row stride {} is smaller than {} bytes required for {} {} pixels",
                stride, row_bytes, width, format
            )));
        }

        // The last row only needs `row_bytes`, not a full stride.
        let required = stride
            .checked_mul(height - 1)
            .and_then(|n| n.checked_add(row_bytes))
            .ok_or_else(|| DetectError::invalid_input("image size overflows"))?;
        if data.len() < required {
            return Err(DetectError::invalid_input(format!(
                "image buffer holds {} bytes, {}x{} with stride {} needs {}",
                data.len(),
                width,
                height,
                stride,
                required
            )));
        }

        Ok(Self {
            data,
            width,
            height,
            stride,
            format,
            offsets,
        })
    }

    /// Wrap a tightly packed buffer (stride = width * bytes per pixel).
    pub fn packed(
        data: &'a [u8],
        width: usize,
        height: usize,
        format: PixelFormat,
    ) -> DetectResult<Self> {
        Self::new(
            data,
            width,
            height,
            width.saturating_mul(format.bytes_per_pixel()),
            format,
        )
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Byte offsets of R, G and B within one pixel.
    #[inline]
    pub fn rgb_offsets(&self) -> [usize; 3] {
        self.offsets
    }

    /// Pixel bytes of row `y`, without the stride padding.
    #[inline]
    pub fn row(&self, y: usize) -> &'a [u8] {
        let start = y * self.stride;
        &self.data[start..start + self.width * self.format.bytes_per_pixel()]
    }

    /// R, G and B of the pixel at (x, y).
    #[inline]
    pub fn rgb(&self, x: usize, y: usize) -> [u8; 3] {
        let bpp = self.format.bytes_per_pixel();
        let p = &self.row(y)[x * bpp..(x + 1) * bpp];
        [p[self.offsets[0]], p[self.offsets[1]], p[self.offsets[2]]]
    }
}
