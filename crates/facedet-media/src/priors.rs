//! RetinaFace anchor (prior) generation.
//!
//! Priors are emitted in the order the network emits its deltas: stride
//! ascending, then grid row, then grid column, then anchor size. Decoding
//! matches deltas to priors purely by position, so this order is part of the
//! model contract.

use serde::{Deserialize, Serialize};

use crate::error::{DetectError, DetectResult};

/// One feature-map level: its stride and the anchor sizes placed in each cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorLevel {
    pub stride: usize,
    pub sizes: Vec<usize>,
}

/// Anchor configuration: feature-map levels in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorConfig {
    pub levels: Vec<AnchorLevel>,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            levels: vec![
                AnchorLevel {
                    stride: 8,
                    sizes: vec![16, 32],
                },
                AnchorLevel {
                    stride: 16,
                    sizes: vec![64, 128],
                },
                AnchorLevel {
                    stride: 32,
                    sizes: vec![256, 512],
                },
            ],
        }
    }
}

impl AnchorConfig {
    /// Reject configurations that cannot produce a prior table.
    pub fn validate(&self) -> DetectResult<()> {
        if self.levels.is_empty() {
            return Err(DetectError::invalid_input("anchor config has no levels"));
        }
        for level in &self.levels {
            if level.stride == 0 {
                return Err(DetectError::invalid_input("anchor stride must be positive"));
            }
            if level.sizes.is_empty() || level.sizes.contains(&0) {
                return Err(DetectError::invalid_input(format!(
                    "anchor sizes for stride {} must be non-empty and positive",
                    level.stride
                )));
            }
        }
        Ok(())
    }

    /// Number of priors for a `width x height` canvas.
    pub fn prior_count(&self, width: usize, height: usize) -> usize {
        self.levels
            .iter()
            .map(|l| height.div_ceil(l.stride) * width.div_ceil(l.stride) * l.sizes.len())
            .sum()
    }
}

/// Anchor box, normalized to the canvas size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prior {
    pub cx: f32,
    pub cy: f32,
    pub width: f32,
    pub height: f32,
}

/// Immutable prior table for one canvas size. Cheap to share behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorTable {
    width: usize,
    height: usize,
    priors: Vec<Prior>,
}

impl PriorTable {
    /// Build the table for a `width x height` canvas.
    pub fn build(width: usize, height: usize, config: &AnchorConfig) -> DetectResult<Self> {
        if width == 0 || height == 0 {
            return Err(DetectError::invalid_input(format!(
                "prior canvas must be positive, got {}x{}",
                width, height
            )));
        }
        config.validate()?;

        let w = width as f32;
        let h = height as f32;
        let mut priors = Vec::with_capacity(config.prior_count(width, height));

        for level in &config.levels {
            let s = level.stride as f32;
            let rows = height.div_ceil(level.stride);
            let cols = width.div_ceil(level.stride);
            for i in 0..rows {
                for j in 0..cols {
                    for &m in &level.sizes {
                        priors.push(Prior {
                            cx: (j as f32 + 0.5) * s / w,
                            cy: (i as f32 + 0.5) * s / h,
                            width: m as f32 / w,
                            height: m as f32 / h,
                        });
                    }
                }
            }
        }

        Ok(Self {
            width,
            height,
            priors,
        })
    }

    /// Build the table for a square canvas with the default anchors.
    pub fn for_canvas(size: usize) -> DetectResult<Self> {
        Self::build(size, size, &AnchorConfig::default())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.priors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.priors.is_empty()
    }

    #[inline]
    pub fn priors(&self) -> &[Prior] {
        &self.priors
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Prior> {
        self.priors.get(index)
    }
}
