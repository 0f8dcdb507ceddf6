//! Reusable preprocessing buffers.
//!
//! A [`Canvas`] owns the interleaved square buffer and the planar tensor for
//! one target size. Buffers are allocated once in [`Canvas::new`]; every
//! [`Canvas::fill`] overwrites them in place. The tensor is only reachable
//! through the [`FilledCanvas`] guard returned by a successful fill, so a
//! caller never sees a half-written tensor.

use std::time::Instant;
use tracing::debug;

use crate::error::{DetectError, DetectResult};
use crate::frame::FrameView;
use crate::letterbox::{resample_into, split_planes, LetterboxMeta, SplitKernel, CANVAS_CHANNELS};

/// Scratch buffers for letterboxing one frame at a time.
///
/// Not shareable across threads while filling; give each worker its own.
#[derive(Debug)]
pub struct Canvas {
    target_size: usize,
    square: Vec<u8>,
    planar: Vec<f32>,
    kernel: SplitKernel,
    parallel_threshold: usize,
}

impl Canvas {
    /// Allocate buffers for a `target_size x target_size` canvas.
    pub fn new(target_size: usize, kernel: SplitKernel, parallel_threshold: usize) -> DetectResult<Self> {
        if target_size == 0 {
            return Err(DetectError::invalid_input("canvas target size must be positive"));
        }
        let pixels = target_size
            .checked_mul(target_size)
            .and_then(|n| n.checked_mul(CANVAS_CHANNELS))
            .ok_or_else(|| DetectError::invalid_input("canvas target size overflows"))?;

        debug!(
            target_size,
            kernel = %kernel.tier(),
            parallel_threshold,
            "Allocated canvas buffers"
        );

        Ok(Self {
            target_size,
            square: vec![0; pixels],
            planar: vec![0.0; pixels],
            kernel,
            parallel_threshold,
        })
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    pub fn kernel(&self) -> SplitKernel {
        self.kernel
    }

    /// Letterbox `frame` into the canvas and produce the planar tensor.
    ///
    /// The frame has already been validated by [`FrameView::new`], so this
    /// cannot fail part-way through a write.
    pub fn fill(&mut self, frame: &FrameView<'_>) -> FilledCanvas<'_> {
        let meta = LetterboxMeta::compute(frame.width(), frame.height(), self.target_size);
        let canvas_pixels = self.target_size * self.target_size;
        let parallel = canvas_pixels > self.parallel_threshold;

        let start = Instant::now();
        resample_into(frame, &meta, &mut self.square, parallel);
        let resample_ms = start.elapsed().as_secs_f64() * 1000.0;

        let start = Instant::now();
        split_planes(
            self.kernel,
            &self.square,
            &mut self.planar,
            self.target_size,
            parallel,
        );
        let split_ms = start.elapsed().as_secs_f64() * 1000.0;

        debug!(
            source = format!("{}x{}", frame.width(), frame.height()),
            format = %frame.format(),
            scaled = format!("{}x{}", meta.scaled_width, meta.scaled_height),
            parallel,
            resample_ms = format!("{:.3}", resample_ms),
            split_ms = format!("{:.3}", split_ms),
            "Canvas filled"
        );

        FilledCanvas {
            meta,
            square: &self.square,
            planar: &self.planar,
        }
    }
}

/// Borrowed view of a completely filled canvas.
#[derive(Debug, Clone, Copy)]
pub struct FilledCanvas<'a> {
    meta: LetterboxMeta,
    square: &'a [u8],
    planar: &'a [f32],
}

impl<'a> FilledCanvas<'a> {
    /// Letterbox geometry used for this fill.
    pub fn meta(&self) -> &LetterboxMeta {
        &self.meta
    }

    /// Planar tensor data: R plane, G plane, B plane, each `target_size^2` long.
    pub fn tensor(&self) -> &'a [f32] {
        self.planar
    }

    /// Interleaved RGB canvas before mean subtraction.
    pub fn square(&self) -> &'a [u8] {
        self.square
    }

    /// One of the three planes (0 = R, 1 = G, 2 = B).
    pub fn plane(&self, c: usize) -> &'a [f32] {
        let n = self.meta.target_size * self.meta.target_size;
        &self.planar[c * n..(c + 1) * n]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::pixel_format::PixelFormat;

    #[test]
    fn test_rejects_zero_target() {
        let err = Canvas::new(0, SplitKernel::scalar(), 10_000).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_fill_640x480_rgba() {
        let data = vec![150u8; 640 * 480 * 4];
        let frame = FrameView::packed(&data, 640, 480, PixelFormat::Rgba).unwrap();
        let mut canvas = Canvas::new(320, SplitKernel::detect(), 10_000).unwrap();
        let filled = canvas.fill(&frame);

        assert_eq!(filled.meta().scaled_width, 320);
        assert_eq!(filled.meta().scaled_height, 240);
        assert_eq!(filled.tensor().len(), 3 * 320 * 320);

        for c in 0..3 {
            let plane = filled.plane(c);
            let expected = 150.0 - crate::letterbox::CHANNEL_MEANS[c];
            assert!(plane[..240 * 320].iter().all(|&v| v == expected));
            // Zero pixels become the negated mean after centering
            assert!(plane[240 * 320..]
                .iter()
                .all(|&v| v == -crate::letterbox::CHANNEL_MEANS[c]));
        }
        assert!(filled.square()[240 * 320 * 3..].iter().all(|&v| v == 0));
    }

    #[test]
    fn test_refill_overwrites_previous_frame() {
        let mut canvas = Canvas::new(8, SplitKernel::scalar(), usize::MAX).unwrap();

        let big = vec![255u8; 8 * 8 * 3];
        let frame = FrameView::packed(&big, 8, 8, PixelFormat::Rgb).unwrap();
        canvas.fill(&frame);

        let small = vec![255u8; 4 * 2 * 3];
        let frame = FrameView::packed(&small, 4, 2, PixelFormat::Rgb).unwrap();
        let filled = canvas.fill(&frame);

        let square = filled.square();
        assert!(square[..4 * 3].iter().all(|&v| v == 255));
        assert!(square[4 * 3..8 * 3].iter().all(|&v| v == 0));
        assert!(square[2 * 8 * 3..].iter().all(|&v| v == 0));
    }

    #[test]
    fn test_parallel_and_serial_fill_match() {
        let data: Vec<u8> = (0..500 * 300 * 3).map(|i| (i % 256) as u8).collect();
        let frame = FrameView::packed(&data, 500, 300, PixelFormat::Bgr).unwrap();

        let mut serial = Canvas::new(320, SplitKernel::scalar(), usize::MAX).unwrap();
        let mut parallel = Canvas::new(320, SplitKernel::detect(), 0).unwrap();
        let a = serial.fill(&frame).tensor().to_vec();
        let b = parallel.fill(&frame).tensor().to_vec();
        assert_eq!(a, b);
    }
}
