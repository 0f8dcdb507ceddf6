//! Letterbox Resampling and Channel Split
//!
//! Turns an arbitrary-size interleaved image into the planar, mean-centered
//! tensor RetinaFace expects.
//!
//! # Key Concepts
//!
//! ## Letterboxing
//! The source is scaled down (never up) to fit a `target x target` canvas,
//! anchored at the top-left corner. The right and bottom margins are zero.
//! Sampling is nearest neighbour: destination pixel `(x, y)` reads source
//! pixel `(floor(x / scale), floor(y / scale))`.
//!
//! ## Channel split
//! The interleaved RGB canvas is de-interleaved into R, G and B planes with
//! the training means (104, 117, 123) subtracted. Every [`SplitKernel`] tier
//! produces bit-identical output; the optimized tiers only change how many
//! pixels are converted per instruction.
//!
//! ## Inverse mapping
//! Canvas coordinates map back to source pixels as `x_src = x_canvas / scale`.

use facedet_models::Point;
use rayon::prelude::*;

use crate::cpu_features::{CpuFeatures, KernelTier};
use crate::frame::FrameView;

/// Per-channel means subtracted from R, G and B.
pub const CHANNEL_MEANS: [f32; 3] = [104.0, 117.0, 123.0];

/// Bytes per pixel in the interleaved canvas.
pub const CANVAS_CHANNELS: usize = 3;

/// Pixels converted per iteration by the lane kernels.
const LANES: usize = 8;

/// Geometry of one letterbox operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxMeta {
    /// Source image width in pixels
    pub source_width: usize,
    /// Source image height in pixels
    pub source_height: usize,
    /// Side length of the square canvas
    pub target_size: usize,
    /// Source-to-canvas scale factor, in (0, 1]
    pub scale: f32,
    /// Width of the image region on the canvas
    pub scaled_width: usize,
    /// Height of the image region on the canvas
    pub scaled_height: usize,
}

impl LetterboxMeta {
    /// Compute the letterbox geometry for a `width x height` source.
    ///
    /// `width`, `height` and `target_size` must be non-zero.
    pub fn compute(width: usize, height: usize, target_size: usize) -> Self {
        let scale = (target_size as f32 / width.max(height) as f32).min(1.0);
        let scaled_width = ((width as f32 * scale) as usize).min(target_size);
        let scaled_height = ((height as f32 * scale) as usize).min(target_size);

        Self {
            source_width: width,
            source_height: height,
            target_size,
            scale,
            scaled_width,
            scaled_height,
        }
    }

    /// Right and bottom margins in canvas pixels.
    pub fn padding(&self) -> (usize, usize) {
        (
            self.target_size - self.scaled_width,
            self.target_size - self.scaled_height,
        )
    }

    /// True when canvas pixel (x, y) lies inside the image region.
    #[inline]
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x < self.scaled_width && y < self.scaled_height
    }

    /// Source column or row sampled for canvas coordinate `d`.
    #[inline]
    fn source_index(&self, d: usize, len: usize) -> usize {
        ((d as f32 / self.scale) as usize).min(len - 1)
    }

    /// Map a canvas point back into source pixels.
    #[inline]
    pub fn to_source(&self, p: Point) -> Point {
        p.unscale(self.scale)
    }
}

/// Nearest-neighbour resample `frame` into the interleaved RGB `square` canvas.
///
/// `square` must hold `target_size^2 * 3` bytes. Rows are independent, so
/// above `parallel` they are distributed over the rayon pool.
pub fn resample_into(frame: &FrameView<'_>, meta: &LetterboxMeta, square: &mut [u8], parallel: bool) {
    let row_len = meta.target_size * CANVAS_CHANNELS;
    debug_assert_eq!(square.len(), row_len * meta.target_size);

    if parallel {
        square
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| resample_row(frame, meta, y, row));
    } else {
        square
            .chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| resample_row(frame, meta, y, row));
    }
}

fn resample_row(frame: &FrameView<'_>, meta: &LetterboxMeta, y: usize, row: &mut [u8]) {
    if y >= meta.scaled_height {
        row.fill(0);
        return;
    }

    let src_row = frame.row(meta.source_index(y, frame.height()));
    let bpp = frame.format().bytes_per_pixel();
    let [ro, go, bo] = frame.rgb_offsets();

    let (image, margin) = row.split_at_mut(meta.scaled_width * CANVAS_CHANNELS);
    for (x, px) in image.chunks_exact_mut(CANVAS_CHANNELS).enumerate() {
        let sx = meta.source_index(x, frame.width()) * bpp;
        let p = &src_row[sx..sx + bpp];
        px[0] = p[ro];
        px[1] = p[go];
        px[2] = p[bo];
    }
    margin.fill(0);
}

/// Strategy for de-interleaving the canvas into mean-centered planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitKernel {
    tier: KernelTier,
}

impl SplitKernel {
    /// The reference kernel.
    pub fn scalar() -> Self {
        Self {
            tier: KernelTier::Scalar,
        }
    }

    /// Best kernel for the running CPU.
    pub fn detect() -> Self {
        Self {
            tier: CpuFeatures::detect().kernel_tier(),
        }
    }

    /// Kernel for `tier`, downgraded to the lane loop if the CPU lacks it.
    pub fn for_tier(tier: KernelTier) -> Self {
        if CpuFeatures::detect().supports(tier) {
            Self { tier }
        } else {
            Self {
                tier: KernelTier::Lanes,
            }
        }
    }

    pub fn tier(&self) -> KernelTier {
        self.tier
    }

    /// Convert `square` (interleaved RGB) into the three planes.
    ///
    /// All four slices must describe the same number of pixels.
    pub fn split(&self, square: &[u8], r: &mut [f32], g: &mut [f32], b: &mut [f32]) {
        debug_assert_eq!(square.len(), r.len() * CANVAS_CHANNELS);
        debug_assert!(r.len() == g.len() && g.len() == b.len());

        match self.tier {
            KernelTier::Scalar => split_scalar(square, r, g, b),
            KernelTier::Lanes => split_lanes(square, r, g, b),
            #[cfg(target_arch = "x86_64")]
            // SAFETY: an Avx2 kernel is only constructed after runtime detection.
            KernelTier::Avx2 => unsafe { split_avx2(square, r, g, b) },
            #[cfg(not(target_arch = "x86_64"))]
            KernelTier::Avx2 => split_lanes(square, r, g, b),
        }
    }
}

impl Default for SplitKernel {
    fn default() -> Self {
        Self::detect()
    }
}

/// Split the whole canvas into `planar` (R plane, then G, then B).
///
/// Above `parallel` the planes are cut into row-sized chunks and converted
/// on the rayon pool. Chunks never overlap.
pub fn split_planes(
    kernel: SplitKernel,
    square: &[u8],
    planar: &mut [f32],
    row_pixels: usize,
    parallel: bool,
) {
    let n = square.len() / CANVAS_CHANNELS;
    debug_assert_eq!(planar.len(), n * CANVAS_CHANNELS);

    let (r, rest) = planar.split_at_mut(n);
    let (g, b) = rest.split_at_mut(n);

    if parallel && row_pixels > 0 {
        r.par_chunks_mut(row_pixels)
            .zip(g.par_chunks_mut(row_pixels))
            .zip(b.par_chunks_mut(row_pixels))
            .zip(square.par_chunks(row_pixels * CANVAS_CHANNELS))
            .for_each(|(((r, g), b), sq)| kernel.split(sq, r, g, b));
    } else {
        kernel.split(square, r, g, b);
    }
}

fn split_scalar(square: &[u8], r: &mut [f32], g: &mut [f32], b: &mut [f32]) {
    for i in 0..r.len() {
        r[i] = square[i * 3] as f32 - CHANNEL_MEANS[0];
        g[i] = square[i * 3 + 1] as f32 - CHANNEL_MEANS[1];
        b[i] = square[i * 3 + 2] as f32 - CHANNEL_MEANS[2];
    }
}

#[inline(always)]
fn split_lanes(square: &[u8], r: &mut [f32], g: &mut [f32], b: &mut [f32]) {
    let body = r.len() / LANES * LANES;

    let (r_body, r_tail) = r.split_at_mut(body);
    let (g_body, g_tail) = g.split_at_mut(body);
    let (b_body, b_tail) = b.split_at_mut(body);
    let (sq_body, sq_tail) = square.split_at(body * CANVAS_CHANNELS);

    for (((rl, gl), bl), px) in r_body
        .chunks_exact_mut(LANES)
        .zip(g_body.chunks_exact_mut(LANES))
        .zip(b_body.chunks_exact_mut(LANES))
        .zip(sq_body.chunks_exact(LANES * CANVAS_CHANNELS))
    {
        for j in 0..LANES {
            rl[j] = px[j * 3] as f32 - CHANNEL_MEANS[0];
            gl[j] = px[j * 3 + 1] as f32 - CHANNEL_MEANS[1];
            bl[j] = px[j * 3 + 2] as f32 - CHANNEL_MEANS[2];
        }
    }

    split_scalar(sq_tail, r_tail, g_tail, b_tail);
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn split_avx2(square: &[u8], r: &mut [f32], g: &mut [f32], b: &mut [f32]) {
    split_lanes(square, r, g, b)
}
