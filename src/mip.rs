// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Mip chain arithmetic.
//!
//! Level 0 is full resolution; each following level halves both dimensions, rounding down,
//! and never drops below 1.

/// Number of levels in the full chain for a `width`×`height` texture.
///
/// ```
/// use texture_transit::mip::mip_level_count;
/// assert_eq!(mip_level_count(256, 256), 9);
/// assert_eq!(mip_level_count(300, 20), 9);
/// assert_eq!(mip_level_count(1, 1), 1);
/// ```
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    width.max(height).max(1).ilog2() + 1
}

/// The size of `dimension` at mip `level`.
pub fn mip_dimension(dimension: u32, level: u32) -> u32 {
    dimension.checked_shr(level).unwrap_or(0).max(1)
}

/// Width and height of mip `level` of a `width`×`height` texture.
pub fn mip_extent(width: u32, height: u32, level: u32) -> (u32, u32) {
    (mip_dimension(width, level), mip_dimension(height, level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_follow_halve_and_floor() {
        for &(width, height) in &[(256, 256), (10, 10), (300, 17), (1, 1024), (7, 3)] {
            let count = mip_level_count(width, height);
            assert_eq!(count, width.max(height).ilog2() + 1);
            for level in 0..count {
                let (w, h) = mip_extent(width, height, level);
                assert_eq!(w, (width / 2u32.pow(level)).max(1));
                assert_eq!(h, (height / 2u32.pow(level)).max(1));
            }
            // the last level is 1 in its larger dimension
            let (w, h) = mip_extent(width, height, count - 1);
            assert_eq!(w.max(h), 1);
        }
    }

    #[test]
    fn huge_levels_clamp() {
        assert_eq!(mip_dimension(4096, 40), 1);
        assert_eq!(mip_level_count(0, 0), 1);
    }
}
