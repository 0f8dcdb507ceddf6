//! CPU Feature Detection
//!
//! Runtime detection of the SIMD capabilities that decide which channel-split
//! kernel the preprocessing stage runs.
//!
//! # Usage
//! ```rust
//! use facedet_media::cpu_features::CpuFeatures;
//!
//! let features = CpuFeatures::detect();
//! features.log_capabilities();
//! let tier = features.kernel_tier();
//! ```

use std::fmt;
use tracing::{info, warn};

/// CPU architecture type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuArch {
    /// x86_64 (Intel/AMD)
    X86_64,
    /// ARM64 (Android devices, Apple Silicon, AWS Graviton)
    Aarch64,
    /// Unknown architecture
    Unknown,
}

impl fmt::Display for CpuArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuArch::X86_64 => write!(f, "x86_64"),
            CpuArch::Aarch64 => write!(f, "aarch64"),
            CpuArch::Unknown => write!(f, "unknown"),
        }
    }
}

/// Channel-split kernel tiers, fastest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelTier {
    /// 256-bit AVX2 lanes (x86_64, runtime detected)
    Avx2,
    /// Fixed 8-wide lane loop left to the compiler's baseline vectorizer (SSE2/NEON)
    Lanes,
    /// One pixel at a time; the reference every other tier must match
    Scalar,
}

impl KernelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            KernelTier::Avx2 => "avx2",
            KernelTier::Lanes => "lanes",
            KernelTier::Scalar => "scalar",
        }
    }
}

impl fmt::Display for KernelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// CPU feature detection results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuFeatures {
    /// SSE4.2 support
    pub sse42: bool,
    /// AVX2 support (256-bit SIMD)
    pub avx2: bool,
    /// NEON support (always present on aarch64)
    pub neon: bool,
    /// Architecture type
    pub arch: CpuArch,
}

impl CpuFeatures {
    /// Detect CPU features at runtime.
    ///
    /// Safe to call from any thread; the standard library caches the result.
    #[cfg(target_arch = "x86_64")]
    pub fn detect() -> Self {
        Self {
            sse42: std::arch::is_x86_feature_detected!("sse4.2"),
            avx2: std::arch::is_x86_feature_detected!("avx2"),
            neon: false,
            arch: CpuArch::X86_64,
        }
    }

    /// Detect CPU features on ARM64.
    #[cfg(target_arch = "aarch64")]
    pub fn detect() -> Self {
        Self {
            sse42: false,
            avx2: false,
            neon: true,
            arch: CpuArch::Aarch64,
        }
    }

    /// Fallback for other architectures.
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    pub fn detect() -> Self {
        Self {
            sse42: false,
            avx2: false,
            neon: false,
            arch: CpuArch::Unknown,
        }
    }

    /// Best channel-split kernel this CPU can run.
    pub fn kernel_tier(&self) -> KernelTier {
        if self.avx2 {
            KernelTier::Avx2
        } else if self.sse42 || self.neon {
            KernelTier::Lanes
        } else {
            KernelTier::Scalar
        }
    }

    /// True when `tier` can run on this CPU.
    pub fn supports(&self, tier: KernelTier) -> bool {
        match tier {
            KernelTier::Avx2 => self.avx2,
            KernelTier::Lanes | KernelTier::Scalar => true,
        }
    }

    /// Log CPU capabilities for diagnostics.
    ///
    /// Should be called once at startup to record the deployment environment.
    pub fn log_capabilities(&self) {
        info!(
            arch = %self.arch,
            sse42 = self.sse42,
            avx2 = self.avx2,
            neon = self.neon,
            tier = %self.kernel_tier(),
            "CPU feature detection complete"
        );

        if self.kernel_tier() == KernelTier::Scalar {
            warn!("No SIMD detected: channel split will run the scalar kernel");
        }
    }
}
