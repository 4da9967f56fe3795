// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! GPU-native pixel formats and their capability table.
//!
//! Every texture this crate creates is in one of the [`PixelFormat`]s listed here.  Each
//! format has a static [`FormatInfo`] record describing:
//!
//! - Whether the format is block-compressed
//! - Block geometry (block width, block height, bytes per block).  Uncompressed formats are
//!   modeled as 1×1 blocks of `bytes_per_texel` bytes, so the same math covers both.
//! - Whether mip levels can be synthesized for it by rendering (see [`crate::mipmap`])
//! - Which compressed family (and therefore which device feature) it belongs to
//! - OpenGL enumeration values for immediate-mode backends
//!
//! The wgpu mapping lives with the wgpu backend.
//!
//! # Available Formats
//!
//! ## Uncompressed
//! - [`PixelFormat::Rgba8Unorm`] - the baseline every backend supports
//! - [`PixelFormat::Rgba8UnormSrgb`] - same texels, tagged sRGB
//! - [`PixelFormat::Rgb565Unorm`] - 16-bit packed RGB
//!
//! ## Block-compressed
//! - BC1/BC2/BC3/BC7 (desktop GPUs)
//! - ETC1 and ETC2 (mobile GPUs)
//! - ASTC 4×4
//! - PVRTC1 4bpp RGB and RGBA
//!
//! # Examples
//!
//! ```
//! use texture_transit::pixel_formats::{lookup, PixelFormat};
//!
//! let info = lookup("bc1-rgba-unorm").unwrap();
//! assert_eq!(info.format, PixelFormat::Bc1RgbaUnorm);
//! assert_eq!((info.block_width, info.block_height, info.block_bytes), (4, 4, 8));
//!
//! // a 10x10 BC1 level occupies the same bytes as 12x12
//! assert_eq!(info.level_size(10, 10), info.level_size(12, 12));
//! ```

/*
Quick note on type design.  images are chosen at runtime: a KTX2 file is transcoded into
whatever the device happens to support, so the format has to be a value rather than a type
parameter.  Everything format-specific is therefore a table lookup, and the table is
exhaustive over the enum so an unknown format can only come from parsing an id.
 */

use crate::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A GPU-native texel encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum PixelFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Rgb565Unorm,
    Bc1RgbaUnorm,
    Bc1RgbaUnormSrgb,
    Bc2RgbaUnorm,
    Bc3RgbaUnorm,
    Bc7RgbaUnorm,
    Bc7RgbaUnormSrgb,
    Etc1RgbUnorm,
    Etc2Rgb8Unorm,
    Etc2Rgba8Unorm,
    Astc4x4Unorm,
    Pvrtc1Rgb4bpp,
    Pvrtc1Rgba4bpp,
}

/// Families of block-compressed formats.  Support is detected per family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressedFamily {
    Bc,
    Etc1,
    Etc2,
    Astc,
    Pvrtc,
}

/// OpenGL enumeration values used with `texImage2D` / `compressedTexImage2D`.
///
/// `format` and `type_` are zero for compressed formats, which only use the internal format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlParams {
    pub internal_format: u32,
    pub format: u32,
    pub type_: u32,
}

/// Capability record for one [`PixelFormat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatInfo {
    pub format: PixelFormat,
    pub id: &'static str,
    pub compressed: bool,
    /// Bytes per block; bytes per texel for uncompressed formats.
    pub block_bytes: u32,
    pub block_width: u32,
    pub block_height: u32,
    /// Smallest number of blocks a level occupies along each axis.
    ///
    /// PVRTC1 decodes from a 2×2 neighborhood of blocks, so its levels never shrink below 8×8
    /// texels of storage.
    pub min_blocks: u32,
    /// Mip levels can be produced by rendering into the format.
    pub native_mipmaps: bool,
    pub srgb: bool,
    pub has_alpha: bool,
    pub family: Option<CompressedFamily>,
    pub gl: GlParams,
}

const GL_RGBA: u32 = 0x1908;
const GL_RGB: u32 = 0x1907;
const GL_UNSIGNED_BYTE: u32 = 0x1401;
const GL_UNSIGNED_SHORT_5_6_5: u32 = 0x8363;

const fn uncompressed(
    format: PixelFormat,
    id: &'static str,
    bytes_per_texel: u32,
    srgb: bool,
    has_alpha: bool,
    gl: GlParams,
) -> FormatInfo {
    FormatInfo {
        format,
        id,
        compressed: false,
        block_bytes: bytes_per_texel,
        block_width: 1,
        block_height: 1,
        min_blocks: 1,
        native_mipmaps: true,
        srgb,
        has_alpha,
        family: None,
        gl,
    }
}

const fn compressed(
    format: PixelFormat,
    id: &'static str,
    block_bytes: u32,
    family: CompressedFamily,
    srgb: bool,
    has_alpha: bool,
    gl_internal_format: u32,
) -> FormatInfo {
    FormatInfo {
        format,
        id,
        compressed: true,
        block_bytes,
        block_width: 4,
        block_height: 4,
        min_blocks: match family {
            CompressedFamily::Pvrtc => 2,
            _ => 1,
        },
        native_mipmaps: false,
        srgb,
        has_alpha,
        family: Some(family),
        gl: GlParams {
            internal_format: gl_internal_format,
            format: 0,
            type_: 0,
        },
    }
}

static RGBA8_UNORM: FormatInfo = uncompressed(
    PixelFormat::Rgba8Unorm,
    "rgba8-unorm",
    4,
    false,
    true,
    GlParams {
        internal_format: 0x8058,
        format: GL_RGBA,
        type_: GL_UNSIGNED_BYTE,
    },
);
static RGBA8_UNORM_SRGB: FormatInfo = uncompressed(
    PixelFormat::Rgba8UnormSrgb,
    "rgba8-unorm-srgb",
    4,
    true,
    true,
    GlParams {
        internal_format: 0x8C43,
        format: GL_RGBA,
        type_: GL_UNSIGNED_BYTE,
    },
);
static RGB565_UNORM: FormatInfo = uncompressed(
    PixelFormat::Rgb565Unorm,
    "rgb565-unorm",
    2,
    false,
    false,
    GlParams {
        internal_format: 0x8D62,
        format: GL_RGB,
        type_: GL_UNSIGNED_SHORT_5_6_5,
    },
);
static BC1_RGBA_UNORM: FormatInfo = compressed(
    PixelFormat::Bc1RgbaUnorm,
    "bc1-rgba-unorm",
    8,
    CompressedFamily::Bc,
    false,
    true,
    0x83F1,
);
static BC1_RGBA_UNORM_SRGB: FormatInfo = compressed(
    PixelFormat::Bc1RgbaUnormSrgb,
    "bc1-rgba-unorm-srgb",
    8,
    CompressedFamily::Bc,
    true,
    true,
    0x8C4D,
);
static BC2_RGBA_UNORM: FormatInfo = compressed(
    PixelFormat::Bc2RgbaUnorm,
    "bc2-rgba-unorm",
    16,
    CompressedFamily::Bc,
    false,
    true,
    0x83F2,
);
static BC3_RGBA_UNORM: FormatInfo = compressed(
    PixelFormat::Bc3RgbaUnorm,
    "bc3-rgba-unorm",
    16,
    CompressedFamily::Bc,
    false,
    true,
    0x83F3,
);
static BC7_RGBA_UNORM: FormatInfo = compressed(
    PixelFormat::Bc7RgbaUnorm,
    "bc7-rgba-unorm",
    16,
    CompressedFamily::Bc,
    false,
    true,
    0x8E8C,
);
static BC7_RGBA_UNORM_SRGB: FormatInfo = compressed(
    PixelFormat::Bc7RgbaUnormSrgb,
    "bc7-rgba-unorm-srgb",
    16,
    CompressedFamily::Bc,
    true,
    true,
    0x8E8D,
);
static ETC1_RGB_UNORM: FormatInfo = compressed(
    PixelFormat::Etc1RgbUnorm,
    "etc1-rgb-unorm",
    8,
    CompressedFamily::Etc1,
    false,
    false,
    0x8D64,
);
static ETC2_RGB8_UNORM: FormatInfo = compressed(
    PixelFormat::Etc2Rgb8Unorm,
    "etc2-rgb8unorm",
    8,
    CompressedFamily::Etc2,
    false,
    false,
    0x9274,
);
static ETC2_RGBA8_UNORM: FormatInfo = compressed(
    PixelFormat::Etc2Rgba8Unorm,
    "etc2-rgba8unorm",
    16,
    CompressedFamily::Etc2,
    false,
    true,
    0x9278,
);
static ASTC_4X4_UNORM: FormatInfo = compressed(
    PixelFormat::Astc4x4Unorm,
    "astc-4x4-unorm",
    16,
    CompressedFamily::Astc,
    false,
    true,
    0x93B0,
);
static PVRTC1_RGB_4BPP: FormatInfo = compressed(
    PixelFormat::Pvrtc1Rgb4bpp,
    "pvrtc1-4bpp-rgb",
    8,
    CompressedFamily::Pvrtc,
    false,
    false,
    0x8C00,
);
static PVRTC1_RGBA_4BPP: FormatInfo = compressed(
    PixelFormat::Pvrtc1Rgba4bpp,
    "pvrtc1-4bpp-rgba",
    8,
    CompressedFamily::Pvrtc,
    false,
    true,
    0x8C02,
);

impl PixelFormat {
    /// Every registered format, uncompressed first.
    pub const ALL: [PixelFormat; 15] = [
        PixelFormat::Rgba8Unorm,
        PixelFormat::Rgba8UnormSrgb,
        PixelFormat::Rgb565Unorm,
        PixelFormat::Bc1RgbaUnorm,
        PixelFormat::Bc1RgbaUnormSrgb,
        PixelFormat::Bc2RgbaUnorm,
        PixelFormat::Bc3RgbaUnorm,
        PixelFormat::Bc7RgbaUnorm,
        PixelFormat::Bc7RgbaUnormSrgb,
        PixelFormat::Etc1RgbUnorm,
        PixelFormat::Etc2Rgb8Unorm,
        PixelFormat::Etc2Rgba8Unorm,
        PixelFormat::Astc4x4Unorm,
        PixelFormat::Pvrtc1Rgb4bpp,
        PixelFormat::Pvrtc1Rgba4bpp,
    ];

    /// The capability record for this format.
    pub fn info(self) -> &'static FormatInfo {
        match self {
            PixelFormat::Rgba8Unorm => &RGBA8_UNORM,
            PixelFormat::Rgba8UnormSrgb => &RGBA8_UNORM_SRGB,
            PixelFormat::Rgb565Unorm => &RGB565_UNORM,
            PixelFormat::Bc1RgbaUnorm => &BC1_RGBA_UNORM,
            PixelFormat::Bc1RgbaUnormSrgb => &BC1_RGBA_UNORM_SRGB,
            PixelFormat::Bc2RgbaUnorm => &BC2_RGBA_UNORM,
            PixelFormat::Bc3RgbaUnorm => &BC3_RGBA_UNORM,
            PixelFormat::Bc7RgbaUnorm => &BC7_RGBA_UNORM,
            PixelFormat::Bc7RgbaUnormSrgb => &BC7_RGBA_UNORM_SRGB,
            PixelFormat::Etc1RgbUnorm => &ETC1_RGB_UNORM,
            PixelFormat::Etc2Rgb8Unorm => &ETC2_RGB8_UNORM,
            PixelFormat::Etc2Rgba8Unorm => &ETC2_RGBA8_UNORM,
            PixelFormat::Astc4x4Unorm => &ASTC_4X4_UNORM,
            PixelFormat::Pvrtc1Rgb4bpp => &PVRTC1_RGB_4BPP,
            PixelFormat::Pvrtc1Rgba4bpp => &PVRTC1_RGBA_4BPP,
        }
    }

    /// The stable string identifier, e.g. `"bc7-rgba-unorm"`.
    pub fn id(self) -> &'static str {
        self.info().id
    }

    pub fn is_compressed(self) -> bool {
        self.info().compressed
    }

    /// The sRGB-tagged twin of this format, if one is registered.
    pub const fn to_srgb(self) -> Option<PixelFormat> {
        match self {
            PixelFormat::Rgba8Unorm | PixelFormat::Rgba8UnormSrgb => {
                Some(PixelFormat::Rgba8UnormSrgb)
            }
            PixelFormat::Bc1RgbaUnorm | PixelFormat::Bc1RgbaUnormSrgb => {
                Some(PixelFormat::Bc1RgbaUnormSrgb)
            }
            PixelFormat::Bc7RgbaUnorm | PixelFormat::Bc7RgbaUnormSrgb => {
                Some(PixelFormat::Bc7RgbaUnormSrgb)
            }
            _ => None,
        }
    }
}

impl FormatInfo {
    /// Bytes in one row of blocks for a level `width` texels wide.
    ///
    /// The width is rounded up to the block width first.
    pub const fn bytes_per_row(&self, width: u32) -> u64 {
        let blocks = width.div_ceil(self.block_width);
        let blocks = if blocks < self.min_blocks { self.min_blocks } else { blocks };
        blocks as u64 * self.block_bytes as u64
    }

    /// Rows of blocks for a level `height` texels tall.
    pub const fn row_count(&self, height: u32) -> u32 {
        let rows = height.div_ceil(self.block_height);
        if rows < self.min_blocks { self.min_blocks } else { rows }
    }

    /// Tightly packed bytes for one layer of a `width`×`height` level.
    pub const fn level_size(&self, width: u32, height: u32) -> u64 {
        self.bytes_per_row(width) * self.row_count(height) as u64
    }
}

/// Looks up a format by its string identifier.
///
/// Fails with [`Error::UnknownFormat`] for identifiers that aren't registered.
pub fn lookup(id: &str) -> Result<&'static FormatInfo, Error> {
    id.parse::<PixelFormat>().map(PixelFormat::info)
}

impl FromStr for PixelFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PixelFormat::ALL
            .into_iter()
            .find(|f| f.id() == s)
            .ok_or_else(|| Error::UnknownFormat(s.to_string()))
    }
}

impl Display for PixelFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_geometry_is_sane() {
        for format in PixelFormat::ALL {
            let info = format.info();
            assert_eq!(info.format, format);
            assert!(info.block_width >= 1 && info.block_height >= 1 && info.block_bytes >= 1);
            if !info.compressed {
                assert_eq!((info.block_width, info.block_height), (1, 1), "{format}");
                assert!(info.family.is_none());
            } else {
                assert!(info.family.is_some());
                assert!(!info.native_mipmaps, "{format} can't be rendered into");
            }
        }
    }

    #[test]
    fn ids_round_trip_and_are_unique() {
        for format in PixelFormat::ALL {
            assert_eq!(format.id().parse::<PixelFormat>(), Ok(format));
            assert_eq!(format.to_string(), format.id());
        }
        let mut ids: Vec<_> = PixelFormat::ALL.iter().map(|f| f.id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), PixelFormat::ALL.len());
    }

    #[test]
    fn unknown_format() {
        assert_eq!(
            lookup("bc9-magic"),
            Err(Error::UnknownFormat("bc9-magic".to_string()))
        );
    }

    #[test]
    fn block_rounding() {
        let bc1 = PixelFormat::Bc1RgbaUnorm.info();
        assert_eq!(bc1.bytes_per_row(10), 24);
        assert_eq!(bc1.row_count(10), 3);
        assert_eq!(bc1.level_size(10, 10), bc1.level_size(12, 12));
        assert_eq!(bc1.level_size(1, 1), 8);

        let rgba = PixelFormat::Rgba8Unorm.info();
        assert_eq!(rgba.level_size(10, 10), 400);
        let rgb565 = PixelFormat::Rgb565Unorm.info();
        assert_eq!(rgb565.bytes_per_row(3), 6);
    }

    #[test]
    fn pvrtc_levels_keep_two_by_two_blocks() {
        let pvrtc = PixelFormat::Pvrtc1Rgba4bpp.info();
        assert_eq!(pvrtc.min_blocks, 2);
        // 1x1, 2x2 and 4x4 levels all occupy 8x8 texels of storage
        for size in [1, 2, 4, 8] {
            assert_eq!(pvrtc.level_size(size, size), 32, "{size}x{size}");
        }
        assert_eq!(pvrtc.row_count(4), 2);
        assert_eq!(pvrtc.level_size(16, 4), 4 * 2 * 8);
        // other block formats are unaffected
        assert_eq!(PixelFormat::Etc2Rgb8Unorm.info().level_size(4, 4), 8);
    }

    #[test]
    fn srgb_twins() {
        assert_eq!(
            PixelFormat::Rgba8Unorm.to_srgb(),
            Some(PixelFormat::Rgba8UnormSrgb)
        );
        assert!(PixelFormat::Rgba8UnormSrgb.info().srgb);
        assert_eq!(PixelFormat::Etc1RgbUnorm.to_srgb(), None);
    }
}
