// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! TGA files, decoded to RGBA8.

use crate::error::Error;
use crate::pixel_formats::PixelFormat;
use crate::texture_data::{TextureData, TextureKind};
use crate::transcode::{ContainerHeader, PayloadEncoding, Transcoder};
use image::{ImageDecoder, ImageFormat};

#[derive(Debug, Default)]
pub struct TgaTranscoder;

impl Transcoder for TgaTranscoder {
    fn parse_header(&mut self, bytes: &[u8]) -> Result<ContainerHeader, Error> {
        let decoder = image::codecs::tga::TgaDecoder::new(std::io::Cursor::new(bytes))
            .map_err(|e| Error::decode(format!("invalid TGA file: {e}")))?;
        let (width, height) = decoder.dimensions();
        Ok(ContainerHeader {
            width,
            height,
            layers: 1,
            kind: TextureKind::D2,
            level_count: 1,
            has_alpha: decoder.color_type().has_alpha(),
            encoding: PayloadEncoding::Native(PixelFormat::Rgba8Unorm),
        })
    }

    fn transcode(
        &mut self,
        bytes: &[u8],
        header: &ContainerHeader,
        target: PixelFormat,
        _mipmaps: bool,
    ) -> Result<TextureData, Error> {
        let rgba = image::load_from_memory_with_format(bytes, ImageFormat::Tga)
            .map_err(|e| Error::decode(format!("invalid TGA file: {e}")))?
            .to_rgba8();
        if rgba.dimensions() != (header.width, header.height) {
            return Err(Error::decode("TGA dimensions changed while decoding"));
        }
        TextureData::pack(
            target,
            TextureKind::D2,
            header.width,
            header.height,
            1,
            vec![rgba.into_raw()],
        )
    }
}
