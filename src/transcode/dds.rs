// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! DDS containers.
//!
//! DDS stores arrays and cube maps one layer at a time, each with its whole mip chain.  We
//! reorder that into level-major order.

use crate::error::Error;
use crate::mip::{mip_dimension, mip_extent};
use crate::pixel_formats::PixelFormat;
use crate::texture_data::{TextureData, TextureKind};
use crate::transcode::{ContainerHeader, PayloadEncoding, Transcoder, emitted_levels};
use ddsfile::{Caps2, D3DFormat, Dds, DxgiFormat};

#[derive(Debug, Default)]
pub struct DdsTranscoder;

fn read(bytes: &[u8]) -> Result<Dds, Error> {
    let mut cursor = std::io::Cursor::new(bytes);
    Dds::read(&mut cursor).map_err(|e| Error::decode(format!("invalid DDS file: {e:?}")))
}

fn pixel_format(dds: &Dds) -> Result<PixelFormat, Error> {
    if let Some(dxgi) = dds.get_dxgi_format() {
        return match dxgi {
            DxgiFormat::R8G8B8A8_UNorm => Ok(PixelFormat::Rgba8Unorm),
            DxgiFormat::R8G8B8A8_UNorm_sRGB => Ok(PixelFormat::Rgba8UnormSrgb),
            DxgiFormat::B5G6R5_UNorm => Ok(PixelFormat::Rgb565Unorm),
            DxgiFormat::BC1_UNorm => Ok(PixelFormat::Bc1RgbaUnorm),
            DxgiFormat::BC1_UNorm_sRGB => Ok(PixelFormat::Bc1RgbaUnormSrgb),
            DxgiFormat::BC2_UNorm => Ok(PixelFormat::Bc2RgbaUnorm),
            DxgiFormat::BC3_UNorm => Ok(PixelFormat::Bc3RgbaUnorm),
            DxgiFormat::BC7_UNorm => Ok(PixelFormat::Bc7RgbaUnorm),
            DxgiFormat::BC7_UNorm_sRGB => Ok(PixelFormat::Bc7RgbaUnormSrgb),
            other => Err(Error::unsupported(format!("DDS format {other:?}"))),
        };
    }
    match dds.get_d3d_format() {
        Some(D3DFormat::A8B8G8R8) => Ok(PixelFormat::Rgba8Unorm),
        Some(D3DFormat::R5G6B5) => Ok(PixelFormat::Rgb565Unorm),
        Some(D3DFormat::DXT1) => Ok(PixelFormat::Bc1RgbaUnorm),
        Some(D3DFormat::DXT3) => Ok(PixelFormat::Bc2RgbaUnorm),
        Some(D3DFormat::DXT5) => Ok(PixelFormat::Bc3RgbaUnorm),
        Some(other) => Err(Error::unsupported(format!("DDS format {other:?}"))),
        None => Err(Error::decode("DDS file has no recognizable pixel format")),
    }
}

fn is_cube(dds: &Dds) -> bool {
    dds.header.caps2.contains(Caps2::CUBEMAP)
}

/// Array elements; a cube map array counts each cube once.
fn array_size(dds: &Dds) -> u32 {
    dds.header10
        .as_ref()
        .map_or(1, |header10| header10.array_size.max(1))
}

/// Reorders layer-major chains (`[layer][level]`) into level-major order (`[level][layer]`).
///
/// `level_size(n)` is the size of one layer of level `n`.
fn level_major(
    data: &[u8],
    layers: u32,
    stored_levels: u32,
    emitted_levels: u32,
    level_size: impl Fn(u32) -> usize,
) -> Result<Vec<Vec<u8>>, Error> {
    let chain: usize = (0..stored_levels).map(&level_size).sum();
    let needed = chain * layers as usize;
    if data.len() < needed {
        return Err(Error::decode(format!(
            "DDS payload has {} bytes, {layers} layers of {stored_levels} levels need {needed}",
            data.len()
        )));
    }
    let mut levels: Vec<Vec<u8>> = (0..emitted_levels)
        .map(|level| Vec::with_capacity(level_size(level) * layers as usize))
        .collect();
    for layer in 0..layers as usize {
        let mut offset = layer * chain;
        for (level, out) in levels.iter_mut().enumerate() {
            let size = level_size(level as u32);
            out.extend_from_slice(&data[offset..offset + size]);
            offset += size;
        }
    }
    Ok(levels)
}

impl Transcoder for DdsTranscoder {
    fn parse_header(&mut self, bytes: &[u8]) -> Result<ContainerHeader, Error> {
        let dds = read(bytes)?;
        let format = pixel_format(&dds)?;
        let (kind, layers) = if dds.get_depth() > 1 {
            (TextureKind::D3, dds.get_depth())
        } else if is_cube(&dds) {
            (TextureKind::Cube, 6 * array_size(&dds))
        } else if array_size(&dds) > 1 {
            (TextureKind::D2Array, array_size(&dds))
        } else {
            (TextureKind::D2, 1)
        };
        Ok(ContainerHeader {
            width: dds.get_width(),
            height: dds.get_height(),
            layers,
            kind,
            level_count: dds.get_num_mipmap_levels().max(1),
            has_alpha: format.info().has_alpha,
            encoding: PayloadEncoding::Native(format),
        })
    }

    fn transcode(
        &mut self,
        bytes: &[u8],
        header: &ContainerHeader,
        target: PixelFormat,
        mipmaps: bool,
    ) -> Result<TextureData, Error> {
        let dds = read(bytes)?;
        let info = target.info();
        let emitted = emitted_levels(header.level_count, mipmaps);
        let level_bytes = if header.kind == TextureKind::D3 {
            // a volume is one chain whose levels hold every slice
            let depth = header.layers;
            level_major(&dds.data, 1, header.level_count, emitted, |level| {
                let (w, h) = mip_extent(header.width, header.height, level);
                info.level_size(w, h) as usize * mip_dimension(depth, level) as usize
            })?
        } else {
            level_major(
                &dds.data,
                header.layers,
                header.level_count,
                emitted,
                |level| {
                    let (w, h) = mip_extent(header.width, header.height, level);
                    info.level_size(w, h) as usize
                },
            )?
        };
        TextureData::pack(
            target,
            header.kind,
            header.width,
            header.height,
            header.layers,
            level_bytes,
        )
    }
}
