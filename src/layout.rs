// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Transfer layout planning.

Given one mip level and its format, works out how the level's bytes are laid out for a
transfer: the row pitch the backend requires, how many rows of blocks there are, and whether
the source bytes can be copied in one piece or must be re-pitched row by row.

Everything here is pure arithmetic.  Nothing touches a device, so the same plan can be
computed on any thread and compared in tests.

# Row alignment

Buffer-to-texture copies on WebGPU-style APIs require every row to start on a 256 byte
boundary ([`RowAlignment::STAGED`]).  Immediate-mode uploads take tightly packed rows
([`RowAlignment::None`]).

```
use texture_transit::layout::{plan_level, RowAlignment};
use texture_transit::pixel_formats::PixelFormat;
use texture_transit::texture_data::MipLevelDescriptor;

let level = MipLevelDescriptor { level: 0, width: 10, height: 10, offset: 0, byte_length: 72 };
let layout = plan_level(&level, PixelFormat::Bc1RgbaUnorm.info(), RowAlignment::STAGED, 1);
assert_eq!(layout.unpadded_bytes_per_row, 24);
assert_eq!(layout.bytes_per_row, 256);
assert_eq!(layout.row_count, 3);
assert!(!layout.fast_path);
```
*/

use crate::pixel_formats::FormatInfo;
use crate::texture_data::{MipLevelDescriptor, TextureData};

/// Required alignment of each row in a transfer buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowAlignment {
    /// Rows are tightly packed.
    None,
    /// Rows start on multiples of this many bytes.
    Bytes(u32),
}

impl RowAlignment {
    /// The alignment of buffer-to-texture copies on WebGPU-style APIs.
    pub const STAGED: RowAlignment = RowAlignment::Bytes(256);

    /// Rounds `len` up to this alignment.
    pub const fn align(self, len: u64) -> u64 {
        match self {
            RowAlignment::None => len,
            RowAlignment::Bytes(a) => len.div_ceil(a as u64) * a as u64,
        }
    }
}

/// The transfer layout of one mip level (all layers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelLayout {
    pub level: u32,
    /// Logical texel size of the level.
    pub width: u32,
    pub height: u32,
    /// Row pitch in the transfer buffer.
    pub bytes_per_row: u64,
    /// Row pitch in the tightly packed source.
    pub unpadded_bytes_per_row: u64,
    /// Rows of blocks in one layer.
    pub row_count: u32,
    pub layers: u32,
    /// Bytes the level occupies in the transfer buffer.
    pub padded_size: u64,
    /// The source can be copied verbatim.
    pub fast_path: bool,
}

impl LevelLayout {
    /// Tightly packed bytes of the level.
    pub const fn unpadded_size(&self) -> u64 {
        self.unpadded_bytes_per_row * self.row_count as u64 * self.layers as u64
    }
}

/**
Plans the transfer of one level.

Width and height are rounded up to the block geometry before any byte math, so a 10×10 BC1
level has the same layout as a 12×12 one.  Layers multiply the total size but not the pitch.
*/
pub fn plan_level(
    level: &MipLevelDescriptor,
    info: &FormatInfo,
    alignment: RowAlignment,
    layers: u32,
) -> LevelLayout {
    let layers = layers.max(1);
    let unpadded_bytes_per_row = info.bytes_per_row(level.width);
    let bytes_per_row = alignment.align(unpadded_bytes_per_row);
    let row_count = info.row_count(level.height);
    LevelLayout {
        level: level.level,
        width: level.width,
        height: level.height,
        bytes_per_row,
        unpadded_bytes_per_row,
        row_count,
        layers,
        padded_size: bytes_per_row * row_count as u64 * layers as u64,
        fast_path: bytes_per_row == unpadded_bytes_per_row || (row_count == 1 && layers == 1),
    }
}

/**
Copies one level's tightly packed `source` into `destination` using `layout`'s pitch.

On the fast path this is a single copy.  Otherwise each row of blocks is copied to the start
of its padded row; padding bytes are left untouched.

`destination` must hold at least `layout.padded_size` bytes, and `source` at least
`layout.unpadded_size()`.
*/
pub fn write_level(layout: &LevelLayout, source: &[u8], destination: &mut [u8]) {
    let unpadded = layout.unpadded_size() as usize;
    if layout.fast_path {
        destination[..unpadded].copy_from_slice(&source[..unpadded]);
        return;
    }
    let src_pitch = layout.unpadded_bytes_per_row as usize;
    let dst_pitch = layout.bytes_per_row as usize;
    let rows = layout.row_count as usize * layout.layers as usize;
    for row in 0..rows {
        let src = &source[row * src_pitch..(row + 1) * src_pitch];
        destination[row * dst_pitch..row * dst_pitch + src_pitch].copy_from_slice(src);
    }
}

/// One level's place in a [`TransferPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedLevel {
    /// Byte offset of the level in the staging buffer.
    pub offset: u64,
    pub layout: LevelLayout,
}

/// Every level of a texture laid out back to back in one staging buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    levels: Vec<PlannedLevel>,
    total_size: u64,
}

impl TransferPlan {
    /// Plans all levels of `data`.  Each level starts on a multiple of `alignment`.
    pub fn new(data: &TextureData, alignment: RowAlignment) -> TransferPlan {
        let info = data.format().info();
        let mut offset = 0;
        let mut levels = Vec::with_capacity(data.levels().len());
        for descriptor in data.levels() {
            let layout = plan_level(
                descriptor,
                info,
                alignment,
                data.layers_at(descriptor.level),
            );
            offset = alignment.align(offset);
            levels.push(PlannedLevel { offset, layout });
            offset += layout.padded_size;
        }
        TransferPlan {
            levels,
            total_size: alignment.align(offset),
        }
    }

    pub fn levels(&self) -> &[PlannedLevel] {
        &self.levels
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Builds the staging buffer for `data` according to this plan.
    pub fn fill(&self, data: &TextureData) -> Vec<u8> {
        let _guard = logwise::perfwarn_begin!("TransferPlan::fill");
        let mut staging = vec![0u8; self.total_size as usize];
        for planned in &self.levels {
            let Some(source) = data.level_bytes(planned.layout.level) else {
                continue;
            };
            let start = planned.offset as usize;
            let end = start + planned.layout.padded_size as usize;
            write_level(&planned.layout, source, &mut staging[start..end]);
        }
        staging
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel_formats::PixelFormat;
    use crate::texture_data::TextureKind;

    fn descriptor(level: u32, width: u32, height: u32) -> MipLevelDescriptor {
        MipLevelDescriptor {
            level,
            width,
            height,
            offset: 0,
            byte_length: 0,
        }
    }

    #[test]
    fn planner_is_pure() {
        let info = PixelFormat::Bc3RgbaUnorm.info();
        let d = descriptor(2, 37, 19);
        let a = plan_level(&d, info, RowAlignment::STAGED, 6);
        let b = plan_level(&d, info, RowAlignment::STAGED, 6);
        assert_eq!(a, b);
    }

    #[test]
    fn narrow_compressed_level_needs_row_copies() {
        // 8x8 bc1 is 16 bytes per row of blocks and 2 rows
        let layout = plan_level(
            &descriptor(0, 8, 8),
            PixelFormat::Bc1RgbaUnorm.info(),
            RowAlignment::STAGED,
            1,
        );
        assert_eq!(layout.unpadded_bytes_per_row, 16);
        assert_eq!(layout.bytes_per_row, 256);
        assert_eq!(layout.row_count, 2);
        assert!(!layout.fast_path);
        assert_eq!(layout.padded_size, 512);
    }

    #[test]
    fn fast_path_cases() {
        let rgba = PixelFormat::Rgba8Unorm.info();
        // 64 texels * 4 bytes == 256 already
        assert!(plan_level(&descriptor(0, 64, 64), rgba, RowAlignment::STAGED, 1).fast_path);
        // a single row needs no re-pitching
        assert!(plan_level(&descriptor(0, 3, 1), rgba, RowAlignment::STAGED, 1).fast_path);
        // tightly packed is always fast
        assert!(plan_level(&descriptor(0, 3, 7), rgba, RowAlignment::None, 4).fast_path);
        // unless the pitch differs
        assert!(!plan_level(&descriptor(0, 3, 7), rgba, RowAlignment::STAGED, 1).fast_path);
    }

    #[test]
    fn layers_scale_size_not_pitch() {
        let rgba = PixelFormat::Rgba8Unorm.info();
        let one = plan_level(&descriptor(0, 16, 16), rgba, RowAlignment::STAGED, 1);
        let six = plan_level(&descriptor(0, 16, 16), rgba, RowAlignment::STAGED, 6);
        assert_eq!(one.bytes_per_row, six.bytes_per_row);
        assert_eq!(six.padded_size, one.padded_size * 6);
    }

    #[test]
    fn row_loop_places_rows_at_pitch() {
        let layout = plan_level(
            &descriptor(0, 2, 3),
            PixelFormat::Rgba8Unorm.info(),
            RowAlignment::Bytes(16),
            1,
        );
        assert!(!layout.fast_path);
        let source: Vec<u8> = (0..24).collect();
        let mut destination = vec![0xAA; layout.padded_size as usize];
        write_level(&layout, &source, &mut destination);
        for row in 0..3 {
            assert_eq!(
                &destination[row * 16..row * 16 + 8],
                &source[row * 8..row * 8 + 8]
            );
            assert!(destination[row * 16 + 8..row * 16 + 16].iter().all(|b| *b == 0xAA));
        }
    }

    #[test]
    fn plan_offsets_are_aligned() {
        let info = PixelFormat::Rgba8Unorm.info();
        let levels = (0..4)
            .map(|level| {
                let (w, h) = crate::mip::mip_extent(20, 12, level);
                vec![level as u8; info.level_size(w, h) as usize]
            })
            .collect();
        let data = TextureData::pack(PixelFormat::Rgba8Unorm, TextureKind::D2, 20, 12, 1, levels)
            .unwrap();
        let plan = TransferPlan::new(&data, RowAlignment::STAGED);
        assert_eq!(plan.levels().len(), 4);
        for planned in plan.levels() {
            assert_eq!(planned.offset % 256, 0);
        }
        let staging = plan.fill(&data);
        assert_eq!(staging.len() as u64, plan.total_size());
        // first byte of each level carries its level number
        for planned in plan.levels() {
            assert_eq!(staging[planned.offset as usize], planned.layout.level as u8);
        }
    }
}
