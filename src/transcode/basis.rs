// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Basis Universal files, transcoded with `basis-universal`.
//!
//! Multi-image files (arrays, cube maps, volumes) hold one image per layer; each output level
//! concatenates that level of every image.
//!
//! UASTC payloads lifted out of KTX2 containers go through [`transcode_uastc_levels`], which
//! works on raw slices and needs no `.basis` framing.

use crate::error::Error;
use crate::pixel_formats::PixelFormat;
use crate::texture_data::{TextureData, TextureKind};
use crate::transcode::{ContainerHeader, PayloadEncoding, Transcoder, emitted_levels};
use basis_universal::{
    BasisTextureType, DecodeFlags, LowLevelUastcTranscoder, SliceParametersUastc,
    TranscodeParameters, TranscoderBlockFormat, TranscoderTextureFormat,
};
use std::sync::Once;

static INIT: Once = Once::new();

fn transcoder_format(format: PixelFormat) -> Option<TranscoderTextureFormat> {
    match format {
        PixelFormat::Rgba8Unorm | PixelFormat::Rgba8UnormSrgb => {
            Some(TranscoderTextureFormat::RGBA32)
        }
        PixelFormat::Rgb565Unorm => Some(TranscoderTextureFormat::RGB565),
        PixelFormat::Bc1RgbaUnorm | PixelFormat::Bc1RgbaUnormSrgb => {
            Some(TranscoderTextureFormat::BC1_RGB)
        }
        PixelFormat::Bc3RgbaUnorm => Some(TranscoderTextureFormat::BC3_RGBA),
        PixelFormat::Bc7RgbaUnorm | PixelFormat::Bc7RgbaUnormSrgb => {
            Some(TranscoderTextureFormat::BC7_RGBA)
        }
        // ETC1 blocks are valid ETC2 RGB blocks
        PixelFormat::Etc1RgbUnorm | PixelFormat::Etc2Rgb8Unorm => {
            Some(TranscoderTextureFormat::ETC1_RGB)
        }
        PixelFormat::Etc2Rgba8Unorm => Some(TranscoderTextureFormat::ETC2_RGBA),
        PixelFormat::Astc4x4Unorm => Some(TranscoderTextureFormat::ASTC_4x4_RGBA),
        PixelFormat::Pvrtc1Rgb4bpp => Some(TranscoderTextureFormat::PVRTC1_4_RGB),
        PixelFormat::Pvrtc1Rgba4bpp => Some(TranscoderTextureFormat::PVRTC1_4_RGBA),
        PixelFormat::Bc2RgbaUnorm => None,
    }
}

fn block_format(format: PixelFormat) -> Option<TranscoderBlockFormat> {
    match format {
        PixelFormat::Rgba8Unorm | PixelFormat::Rgba8UnormSrgb => Some(TranscoderBlockFormat::RGBA32),
        PixelFormat::Rgb565Unorm => Some(TranscoderBlockFormat::RGB565),
        PixelFormat::Bc1RgbaUnorm | PixelFormat::Bc1RgbaUnormSrgb => Some(TranscoderBlockFormat::BC1),
        PixelFormat::Bc3RgbaUnorm => Some(TranscoderBlockFormat::BC3),
        PixelFormat::Bc7RgbaUnorm | PixelFormat::Bc7RgbaUnormSrgb => Some(TranscoderBlockFormat::BC7),
        PixelFormat::Etc1RgbUnorm | PixelFormat::Etc2Rgb8Unorm => Some(TranscoderBlockFormat::ETC1),
        PixelFormat::Etc2Rgba8Unorm => Some(TranscoderBlockFormat::ETC2_RGBA),
        PixelFormat::Astc4x4Unorm => Some(TranscoderBlockFormat::ASTC_4x4),
        PixelFormat::Pvrtc1Rgb4bpp => Some(TranscoderBlockFormat::PVRTC1_4_RGB),
        PixelFormat::Pvrtc1Rgba4bpp => Some(TranscoderBlockFormat::PVRTC1_4_RGBA),
        PixelFormat::Bc2RgbaUnorm => None,
    }
}

/// Bytes in one UASTC block.
const UASTC_BLOCK_BYTES: usize = 16;

/**
Transcodes UASTC levels into `target`.

`levels[n]` holds every image (layer, face or slice) of level `n`, each a tightly packed run of
16-byte 4×4 blocks.
*/
pub(crate) fn transcode_uastc_levels(
    levels: &[Vec<u8>],
    header: &ContainerHeader,
    target: PixelFormat,
) -> Result<TextureData, Error> {
    INIT.call_once(basis_universal::transcoder_init);
    let format = block_format(target)
        .ok_or_else(|| Error::unsupported(format!("UASTC can't be transcoded to {target}")))?;
    let mut transcoder = LowLevelUastcTranscoder::new();
    let mut level_bytes = Vec::with_capacity(levels.len());
    for (level_index, data) in levels.iter().enumerate() {
        let level_index = level_index as u32;
        let (width, height) = crate::mip::mip_extent(header.width, header.height, level_index);
        let images = match header.kind {
            TextureKind::D3 => crate::mip::mip_dimension(header.layers, level_index),
            _ => header.layers,
        } as usize;
        let (blocks_x, blocks_y) = (width.div_ceil(4), height.div_ceil(4));
        let image_size = blocks_x as usize * blocks_y as usize * UASTC_BLOCK_BYTES;
        if data.len() < image_size * images {
            return Err(Error::decode(format!(
                "UASTC level {level_index} has {} bytes, {images} images need {}",
                data.len(),
                image_size * images
            )));
        }
        let mut level = Vec::new();
        for (image_index, image) in data.chunks_exact(image_size).take(images).enumerate() {
            let mut out = transcoder
                .transcode_slice(
                    image,
                    SliceParametersUastc {
                        num_blocks_x: blocks_x,
                        num_blocks_y: blocks_y,
                        has_alpha: header.has_alpha,
                        original_width: width,
                        original_height: height,
                    },
                    DecodeFlags::HIGH_QUALITY,
                    format,
                )
                .map_err(|e| {
                    Error::decode(format!(
                        "failed to transcode UASTC image {image_index} level {level_index} to {format:?}: {e:?}"
                    ))
                })?;
            level.append(&mut out);
        }
        level_bytes.push(level);
    }
    TextureData::pack(
        target,
        header.kind,
        header.width,
        header.height,
        header.layers,
        level_bytes,
    )
}

pub struct BasisTranscoder {
    transcoder: basis_universal::Transcoder,
}

impl std::fmt::Debug for BasisTranscoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasisTranscoder").finish_non_exhaustive()
    }
}

impl BasisTranscoder {
    pub fn new() -> Self {
        INIT.call_once(basis_universal::transcoder_init);
        BasisTranscoder {
            transcoder: basis_universal::Transcoder::new(),
        }
    }
}

impl Transcoder for BasisTranscoder {
    fn parse_header(&mut self, bytes: &[u8]) -> Result<ContainerHeader, Error> {
        if !self.transcoder.validate_header(bytes) {
            return Err(Error::decode("invalid Basis header"));
        }
        let image_count = self.transcoder.image_count(bytes);
        let info = self
            .transcoder
            .image_info(bytes, 0)
            .ok_or_else(|| Error::decode("Basis file has no images"))?;
        let kind = match self.transcoder.basis_texture_type(bytes) {
            BasisTextureType::TextureType2D => TextureKind::D2,
            BasisTextureType::TextureType2DArray => TextureKind::D2Array,
            BasisTextureType::TextureTypeCubemapArray => TextureKind::Cube,
            BasisTextureType::TextureTypeVolume => TextureKind::D3,
            other => {
                return Err(Error::unsupported(format!("Basis texture type {other:?}")));
            }
        };
        Ok(ContainerHeader {
            width: info.m_orig_width,
            height: info.m_orig_height,
            layers: image_count.max(1),
            kind,
            level_count: self.transcoder.image_level_count(bytes, 0).max(1),
            has_alpha: info.m_alpha_flag,
            encoding: PayloadEncoding::Universal,
        })
    }

    fn transcode(
        &mut self,
        bytes: &[u8],
        header: &ContainerHeader,
        target: PixelFormat,
        mipmaps: bool,
    ) -> Result<TextureData, Error> {
        let format = transcoder_format(target)
            .ok_or_else(|| Error::unsupported(format!("Basis can't transcode to {target}")))?;
        let basis_format = self.transcoder.basis_texture_format(bytes);
        if !basis_format.can_transcode_to_format(format) {
            return Err(Error::unsupported(format!(
                "{basis_format:?} cannot be transcoded to {format:?}"
            )));
        }
        self.transcoder.prepare_transcoding(bytes).map_err(|_| {
            Error::decode(format!("failed to prepare transcoding from {basis_format:?}"))
        })?;
        let emitted = emitted_levels(header.level_count, mipmaps);
        let mut level_bytes = Vec::with_capacity(emitted as usize);
        let mut failure = None;
        'levels: for level_index in 0..emitted {
            let mut level = Vec::new();
            for image_index in 0..header.layers {
                match self.transcoder.transcode_image_level(
                    bytes,
                    format,
                    TranscodeParameters {
                        image_index,
                        level_index,
                        decode_flags: Some(DecodeFlags::HIGH_QUALITY),
                        ..Default::default()
                    },
                ) {
                    Ok(mut data) => level.append(&mut data),
                    Err(e) => {
                        failure = Some(Error::decode(format!(
                            "failed to transcode image {image_index} level {level_index} to {format:?}: {e:?}"
                        )));
                        break 'levels;
                    }
                }
            }
            level_bytes.push(level);
        }
        self.transcoder.end_transcoding();
        if let Some(failure) = failure {
            return Err(failure);
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_selectable_target_maps() {
        use crate::transcode::{ALPHA_PRIORITY, OPAQUE_PRIORITY};
        for format in ALPHA_PRIORITY.iter().chain(OPAQUE_PRIORITY.iter()) {
            assert!(transcoder_format(*format).is_some(), "{format}");
        }
    }

    #[test]
    fn every_selectable_target_has_a_block_format() {
        use crate::transcode::{ALPHA_PRIORITY, OPAQUE_PRIORITY};
        for format in ALPHA_PRIORITY.iter().chain(OPAQUE_PRIORITY.iter()) {
            assert!(block_format(*format).is_some(), "{format}");
        }
    }

    #[test]
    fn short_uastc_levels_are_rejected() {
        let header = ContainerHeader {
            width: 8,
            height: 8,
            layers: 1,
            kind: TextureKind::D2,
            level_count: 1,
            has_alpha: false,
            encoding: PayloadEncoding::Universal,
        };
        // 8x8 needs four blocks
        assert!(matches!(
            transcode_uastc_levels(&[vec![0; 48]], &header, PixelFormat::Rgba8Unorm),
            Err(Error::DecodeFailure(_))
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            BasisTranscoder::new().parse_header(&[0; 64]),
            Err(Error::DecodeFailure(_))
        ));
    }
}
