// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Row alignment of staged uploads.
//!
//! Copy engines want every row of a buffer-to-texture copy to start on a 256-byte boundary.
//! Widths whose rows are already a multiple of 256 bytes take the fast path; everything else
//! is padded row by row.  These tests check both against widths that have caused trouble.

use texture_transit::layout::{RowAlignment, TransferPlan, plan_level};
use texture_transit::pixel_formats::PixelFormat;
use texture_transit::{TextureData, TextureKind};

/// An RGBA8 texture whose texel bytes encode their row, so misplaced rows are visible.
fn rgba_rows(width: u32, height: u32) -> TextureData {
    let mut bytes = Vec::with_capacity((width * height * 4) as usize);
    for row in 0..height {
        bytes.extend(std::iter::repeat_n(row as u8 + 1, (width * 4) as usize));
    }
    TextureData::pack(
        PixelFormat::Rgba8Unorm,
        TextureKind::D2,
        width,
        height,
        1,
        vec![bytes],
    )
    .unwrap()
}

fn check_width(width: u32) {
    let height = 3;
    let data = rgba_rows(width, height);
    let plan = TransferPlan::new(&data, RowAlignment::STAGED);
    let level = plan.levels()[0].layout;
    let unpadded = width as u64 * 4;
    assert_eq!(level.unpadded_bytes_per_row, unpadded);
    assert_eq!(level.bytes_per_row % 256, 0, "width {width}");
    assert!(level.bytes_per_row >= unpadded);
    assert_eq!(level.fast_path, unpadded % 256 == 0, "width {width}");

    let staging = plan.fill(&data);
    assert_eq!(staging.len() as u64, plan.total_size());
    for row in 0..height as usize {
        let start = row * level.bytes_per_row as usize;
        let texels = &staging[start..start + unpadded as usize];
        assert!(
            texels.iter().all(|&b| b == row as u8 + 1),
            "width {width} row {row} landed in the wrong place"
        );
    }
}

#[test]
fn misaligned_widths_are_padded() {
    for width in [63, 100, 150] {
        check_width(width);
    }
}

#[test]
fn aligned_widths_take_the_fast_path() {
    // 64 * 4 = 256 and 128 * 4 = 512
    for width in [64, 128] {
        check_width(width);
    }
}

#[test]
fn narrow_compressed_texture() {
    // 8x8 BC1: two blocks of 8 bytes per row, two rows of blocks
    let data = TextureData::pack(
        PixelFormat::Bc1RgbaUnorm,
        TextureKind::D2,
        8,
        8,
        1,
        vec![(0..32).collect()],
    )
    .unwrap();
    let level = &data.levels()[0];
    let layout = plan_level(level, PixelFormat::Bc1RgbaUnorm.info(), RowAlignment::STAGED, 1);
    assert_eq!(layout.unpadded_bytes_per_row, 16);
    assert_eq!(layout.bytes_per_row, 256);
    assert_eq!(layout.row_count, 2);
    assert!(!layout.fast_path);

    let staging = TransferPlan::new(&data, RowAlignment::STAGED).fill(&data);
    assert_eq!(&staging[..16], &(0..16).collect::<Vec<u8>>()[..]);
    assert_eq!(&staging[256..272], &(16..32).collect::<Vec<u8>>()[..]);
    assert!(staging[16..256].iter().all(|&b| b == 0));
}

#[test]
fn immediate_uploads_are_never_padded() {
    let data = rgba_rows(63, 2);
    let plan = TransferPlan::new(&data, RowAlignment::None);
    let level = plan.levels()[0].layout;
    assert!(level.fast_path);
    assert_eq!(level.bytes_per_row, 63 * 4);
    assert_eq!(plan.fill(&data), data.buffer());
}
