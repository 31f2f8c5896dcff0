//! Word-level helpers for 2-bit packed bases.
//!
//! Hardware popcount/lzcnt are probed once per process and cached. Every
//! helper has a portable fallback, so the probe only affects speed.

use std::sync::OnceLock;

const M1: u64 = 0x5555_5555_5555_5555;
const M2: u64 = 0x3333_3333_3333_3333;
const M4: u64 = 0x0f0f_0f0f_0f0f_0f0f;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuFeatures {
    pub popcnt: bool,
    pub lzcnt: bool,
}

impl CpuFeatures {
    /// Features with every hardware path disabled.
    pub const PORTABLE: CpuFeatures = CpuFeatures { popcnt: false, lzcnt: false };

    /// Cached result of [`CpuFeatures::detect`].
    pub fn get() -> CpuFeatures {
        static FEATURES: OnceLock<CpuFeatures> = OnceLock::new();
        *FEATURES.get_or_init(CpuFeatures::detect)
    }

    pub fn detect() -> CpuFeatures {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            CpuFeatures {
                popcnt: std::arch::is_x86_feature_detected!("popcnt"),
                lzcnt: std::arch::is_x86_feature_detected!("lzcnt"),
            }
        }
        #[cfg(target_arch = "aarch64")]
        {
            // cnt and clz are baseline on aarch64
            CpuFeatures { popcnt: true, lzcnt: true }
        }
        #[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
        {
            CpuFeatures::PORTABLE
        }
    }
}

#[inline]
pub fn popcount(x: u64, f: CpuFeatures) -> u32 {
    if f.popcnt {
        return x.count_ones();
    }
    let mut v = (x & M1) + ((x >> 1) & M1);
    v = (v & M2) + ((v >> 2) & M2);
    v = (v & M4) + ((v >> 4) & M4);
    (v.wrapping_mul(0x0101_0101_0101_0101) >> 56) as u32
}

#[inline]
pub fn leading_zeros(x: u64, f: CpuFeatures) -> u32 {
    if f.lzcnt {
        return x.leading_zeros();
    }
    if x == 0 {
        return 64;
    }
    let mut n = 0;
    let mut v = x;
    for sh in [32u32, 16, 8, 4, 2, 1] {
        if v >> (64 - sh) == 0 {
            n += sh;
            v <<= sh;
        }
    }
    n
}

/// Number of 2-bit lanes that differ in `x` (usually `a ^ b`).
#[inline]
pub fn base_mismatches(x: u64, f: CpuFeatures) -> u32 {
    popcount((x | (x >> 1)) & M1, f)
}

/// Reverse the 32 bases of a word and complement each (A<->T, C<->G).
#[inline]
pub fn rev_comp_word(x: u64) -> u64 {
    let mut v = x.swap_bytes();
    v = ((v >> 4) & M4) | ((v & M4) << 4);
    v = ((v >> 2) & M2) | ((v & M2) << 2);
    !v
}

/// Mask keeping the first `n` bases (MSB first) of a word; `n >= 32` keeps all.
#[inline]
pub fn prefix_mask(n: usize) -> u64 {
    if n >= 32 {
        !0
    } else if n == 0 {
        0
    } else {
        !0u64 << ((32 - n) * 2)
    }
}
