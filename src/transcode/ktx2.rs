// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! KTX2 containers.
//!
//! KTX2 stores each level with its layers, faces and slices contiguous, which is already the
//! layout [`TextureData`] wants.
//!
//! Two kinds of payload show up:
//!
//! - A GPU format named by `vkFormat`, optionally Zstandard or zlib supercompressed.  These
//!   are decompressed and passed through.
//! - Basis Universal (`vkFormat` undefined): UASTC, optionally Zstandard supercompressed, or
//!   ETC1S with BasisLZ supercompression.  These are [`PayloadEncoding::Universal`] and go
//!   through format selection.  UASTC transcodes with the `basis_universal` feature; ETC1S
//!   needs BasisLZ's global codebooks, which this transcoder does not decode.

use crate::error::Error;
use crate::pixel_formats::PixelFormat;
use crate::texture_data::{TextureData, TextureKind};
use crate::transcode::{ContainerHeader, PayloadEncoding, Transcoder, emitted_levels};
use ktx2::{ColorModel, SupercompressionScheme};
use std::io::Read;

/// vkFormats we can upload as they are.
const NATIVE_FORMATS: [(ktx2::Format, PixelFormat); 12] = [
    (ktx2::Format::R8G8B8A8_UNORM, PixelFormat::Rgba8Unorm),
    (ktx2::Format::R8G8B8A8_SRGB, PixelFormat::Rgba8UnormSrgb),
    (ktx2::Format::R5G6B5_UNORM_PACK16, PixelFormat::Rgb565Unorm),
    (ktx2::Format::BC1_RGBA_UNORM_BLOCK, PixelFormat::Bc1RgbaUnorm),
    (ktx2::Format::BC1_RGBA_SRGB_BLOCK, PixelFormat::Bc1RgbaUnormSrgb),
    (ktx2::Format::BC2_UNORM_BLOCK, PixelFormat::Bc2RgbaUnorm),
    (ktx2::Format::BC3_UNORM_BLOCK, PixelFormat::Bc3RgbaUnorm),
    (ktx2::Format::BC7_UNORM_BLOCK, PixelFormat::Bc7RgbaUnorm),
    (ktx2::Format::BC7_SRGB_BLOCK, PixelFormat::Bc7RgbaUnormSrgb),
    (ktx2::Format::ETC2_R8G8B8_UNORM_BLOCK, PixelFormat::Etc2Rgb8Unorm),
    (ktx2::Format::ETC2_R8G8B8A8_UNORM_BLOCK, PixelFormat::Etc2Rgba8Unorm),
    (ktx2::Format::ASTC_4x4_UNORM_BLOCK, PixelFormat::Astc4x4Unorm),
];

// Khronos data format channel ids for the Basis color models
const ETC1S_CHANNEL_AAA: u8 = 15;
const UASTC_CHANNEL_RGBA: u8 = 3;
const UASTC_CHANNEL_RRRG: u8 = 5;

fn native_format(format: ktx2::Format) -> Option<PixelFormat> {
    NATIVE_FORMATS
        .iter()
        .find(|(vk, _)| *vk == format)
        .map(|(_, pixel_format)| *pixel_format)
}

/// Which Basis Universal encoding a KTX2 payload uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BasisPayload {
    Etc1s,
    Uastc,
}

#[derive(Debug, Default)]
pub struct Ktx2Transcoder;

impl Ktx2Transcoder {
    pub fn new() -> Self {
        Ktx2Transcoder
    }
}

fn reader(bytes: &[u8]) -> Result<ktx2::Reader<&[u8]>, Error> {
    ktx2::Reader::new(bytes).map_err(|e| Error::decode(format!("invalid KTX2 file: {e:?}")))
}

fn basis_payload(reader: &ktx2::Reader<&[u8]>) -> Result<BasisPayload, Error> {
    match reader.header().supercompression_scheme {
        Some(SupercompressionScheme::BasisLZ) => Ok(BasisPayload::Etc1s),
        None | Some(SupercompressionScheme::Zstandard) => Ok(BasisPayload::Uastc),
        Some(scheme) => Err(Error::unsupported(format!(
            "KTX2 Basis payload with {scheme:?} supercompression"
        ))),
    }
}

/**
Reads alpha presence from the basic data format descriptor.

ETC1S marks alpha with a second `AAA` slice; UASTC with an `RGBA` or `RRRG` channel id.  Files
without a readable descriptor are assumed to carry alpha.
*/
fn basis_has_alpha(reader: &ktx2::Reader<&[u8]>, payload: BasisPayload) -> bool {
    for block in reader.dfd_blocks() {
        if block.header.vendor_id != 0 || block.header.descriptor_type != 0 {
            continue;
        }
        let Ok(basic) = ktx2::DfdBlockBasic::parse(block.data) else {
            continue;
        };
        let model = basic.header.color_model;
        return basic.sample_information().any(|sample| match payload {
            BasisPayload::Etc1s => {
                model == Some(ColorModel::ETC1S) && sample.channel_type == ETC1S_CHANNEL_AAA
            }
            BasisPayload::Uastc => {
                model == Some(ColorModel::UASTC)
                    && matches!(sample.channel_type, UASTC_CHANNEL_RGBA | UASTC_CHANNEL_RRRG)
            }
        });
    }
    true
}

/// Undoes a level's supercompression.
fn level_data(
    scheme: Option<SupercompressionScheme>,
    level: &ktx2::Level<'_>,
) -> Result<Vec<u8>, Error> {
    match scheme {
        None => Ok(level.data.to_vec()),
        Some(SupercompressionScheme::Zstandard) => {
            let mut decoder = ruzstd::decoding::StreamingDecoder::new(level.data)
                .map_err(|e| Error::decode(format!("invalid Zstandard level: {e:?}")))?;
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| Error::decode(format!("Zstandard level failed to decompress: {e}")))?;
            Ok(out)
        }
        Some(SupercompressionScheme::ZLIB) => {
            let mut decoder = flate2::bufread::ZlibDecoder::new(level.data);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| Error::decode(format!("zlib level failed to decompress: {e}")))?;
            Ok(out)
        }
        Some(scheme) => Err(Error::unsupported(format!(
            "KTX2 {scheme:?} supercompression"
        ))),
    }
}

impl Transcoder for Ktx2Transcoder {
    fn parse_header(&mut self, bytes: &[u8]) -> Result<ContainerHeader, Error> {
        let reader = reader(bytes)?;
        let header = reader.header();

        let (encoding, has_alpha) = match (header.format, header.supercompression_scheme) {
            (Some(format), scheme) => {
                if scheme == Some(SupercompressionScheme::BasisLZ) {
                    return Err(Error::decode(format!(
                        "KTX2 {format:?} payload claims BasisLZ supercompression"
                    )));
                }
                let pixel_format = native_format(format).ok_or_else(|| {
                    Error::unsupported(format!("KTX2 vkFormat {format:?} is not supported"))
                })?;
                (
                    PayloadEncoding::Native(pixel_format),
                    pixel_format.info().has_alpha,
                )
            }
            (None, _) => {
                let payload = basis_payload(&reader)?;
                (PayloadEncoding::Universal, basis_has_alpha(&reader, payload))
            }
        };

        let kind = if header.pixel_depth > 0 {
            TextureKind::D3
        } else if header.face_count == 6 {
            TextureKind::Cube
        } else if header.layer_count > 0 {
            TextureKind::D2Array
        } else if header.pixel_height == 0 {
            TextureKind::D1
        } else {
            TextureKind::D2
        };
        let layers = match kind {
            TextureKind::D3 => header.pixel_depth,
            _ => header.layer_count.max(1) * header.face_count.max(1),
        };
        Ok(ContainerHeader {
            width: header.pixel_width,
            height: header.pixel_height.max(1),
            layers,
            kind,
            // zero asks the loader to generate levels
            level_count: header.level_count.max(1),
            has_alpha,
            encoding,
        })
    }

    fn transcode(
        &mut self,
        bytes: &[u8],
        header: &ContainerHeader,
        target: PixelFormat,
        mipmaps: bool,
    ) -> Result<TextureData, Error> {
        let reader = reader(bytes)?;
        let scheme = reader.header().supercompression_scheme;
        let wanted = emitted_levels(header.level_count, mipmaps) as usize;

        if header.encoding == PayloadEncoding::Universal
            && basis_payload(&reader)? == BasisPayload::Etc1s
        {
            return Err(Error::unsupported(
                "ETC1S (BasisLZ) KTX2 payloads can't be transcoded; encode as UASTC",
            ));
        }

        let level_bytes = reader
            .levels()
            .take(wanted)
            .map(|level| level_data(scheme, &level))
            .collect::<Result<Vec<_>, _>>()?;
        if level_bytes.len() < wanted {
            return Err(Error::decode(format!(
                "KTX2 header promises {wanted} levels, file has {}",
                level_bytes.len()
            )));
        }

        match header.encoding {
            PayloadEncoding::Universal => transcode_uastc(&level_bytes, header, target),
            // ETC1 data may be delivered as ETC2; the bytes are the same
            PayloadEncoding::Native(_) => TextureData::pack(
                target,
                header.kind,
                header.width,
                header.height,
                header.layers,
                level_bytes,
            ),
        }
    }
}

#[cfg(feature = "basis_universal")]
fn transcode_uastc(
    levels: &[Vec<u8>],
    header: &ContainerHeader,
    target: PixelFormat,
) -> Result<TextureData, Error> {
    crate::transcode::basis::transcode_uastc_levels(levels, header, target)
}

#[cfg(not(feature = "basis_universal"))]
fn transcode_uastc(
    _levels: &[Vec<u8>],
    _header: &ContainerHeader,
    target: PixelFormat,
) -> Result<TextureData, Error> {
    Err(Error::unsupported(format!(
        "transcoding UASTC to {target} requires the basis_universal feature"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcode::select_target;
    use ktx2::{
        ChannelTypeQualifiers, DataFormatFlags, DfdBlockHeaderBasic, DfdHeader, Header, Index,
        SampleInformation,
    };
    use std::io::Write;
    use std::num::NonZeroU8;

    struct Fixture {
        vk_format: u32,
        width: u32,
        height: u32,
        layer_count: u32,
        face_count: u32,
        scheme: Option<SupercompressionScheme>,
        color_model: Option<ColorModel>,
        /// Channel id of each descriptor sample.
        channels: Vec<u8>,
    }

    impl Fixture {
        fn native(vk_format: u32, width: u32, height: u32) -> Self {
            Fixture {
                vk_format,
                width,
                height,
                layer_count: 0,
                face_count: 1,
                scheme: None,
                color_model: None,
                channels: vec![0],
            }
        }

        fn uastc(width: u32, height: u32, channel: u8) -> Self {
            Fixture {
                color_model: Some(ColorModel::UASTC),
                channels: vec![channel],
                ..Fixture::native(0, width, height)
            }
        }

        /// Lays out header, level index, descriptor and `levels`.
        fn build(&self, levels: &[Vec<u8>]) -> Vec<u8> {
            let mut dfd = Vec::new();
            let block_size = DfdHeader::LENGTH
                + DfdBlockHeaderBasic::LENGTH
                + self.channels.len() * SampleInformation::LENGTH;
            dfd.extend_from_slice(&((block_size + 4) as u32).to_le_bytes());
            dfd.extend_from_slice(&DfdHeader::BASIC.as_bytes(block_size as u16));
            let one = NonZeroU8::new(1).unwrap();
            let four = NonZeroU8::new(4).unwrap();
            dfd.extend_from_slice(
                &DfdBlockHeaderBasic {
                    color_model: self.color_model,
                    color_primaries: None,
                    transfer_function: None,
                    flags: DataFormatFlags::empty(),
                    texel_block_dimensions: [four, four, one, one],
                    bytes_planes: [16, 0, 0, 0, 0, 0, 0, 0],
                }
                .as_bytes(),
            );
            for channel in &self.channels {
                dfd.extend_from_slice(
                    &SampleInformation {
                        bit_offset: 0,
                        bit_length: NonZeroU8::new(128).unwrap(),
                        channel_type: *channel,
                        channel_type_qualifiers: ChannelTypeQualifiers::empty(),
                        sample_positions: [0; 4],
                        lower: 0,
                        upper: u32::MAX,
                    }
                    .as_bytes(),
                );
            }

            let dfd_offset = Header::LENGTH + levels.len() * 24;
            let header = Header {
                format: ktx2::Format::new(self.vk_format),
                type_size: 1,
                pixel_width: self.width,
                pixel_height: self.height,
                pixel_depth: 0,
                layer_count: self.layer_count,
                face_count: self.face_count,
                level_count: levels.len() as u32,
                supercompression_scheme: self.scheme,
                index: Index {
                    dfd_byte_offset: dfd_offset as u32,
                    dfd_byte_length: dfd.len() as u32,
                    kvd_byte_offset: 0,
                    kvd_byte_length: 0,
                    sgd_byte_offset: 0,
                    sgd_byte_length: 0,
                },
            };
            let mut out = header.as_bytes().to_vec();
            let mut offset = (dfd_offset + dfd.len()) as u64;
            for level in levels {
                let length = level.len() as u64;
                out.extend_from_slice(&offset.to_le_bytes());
                out.extend_from_slice(&length.to_le_bytes());
                out.extend_from_slice(&length.to_le_bytes());
                offset += length;
            }
            out.extend_from_slice(&dfd);
            for level in levels {
                out.extend_from_slice(level);
            }
            out
        }
    }

    const R8G8B8A8_UNORM: u32 = 37;

    #[test]
    fn rgba_chain() {
        let file = Fixture::native(R8G8B8A8_UNORM, 2, 2).build(&[vec![7; 16], vec![9; 4]]);
        let mut transcoder = Ktx2Transcoder::new();
        let header = transcoder.parse_header(&file).unwrap();
        assert_eq!(header.kind, TextureKind::D2);
        assert_eq!(header.level_count, 2);
        assert_eq!(
            header.encoding,
            PayloadEncoding::Native(PixelFormat::Rgba8Unorm)
        );

        let all = transcoder
            .transcode(&file, &header, PixelFormat::Rgba8Unorm, true)
            .unwrap();
        assert_eq!(all.level_count(), 2);
        assert_eq!(all.level_bytes(1).unwrap(), &[9; 4]);

        let base = transcoder
            .transcode(&file, &header, PixelFormat::Rgba8Unorm, false)
            .unwrap();
        assert_eq!(base.level_count(), 1);
        assert_eq!(base.buffer().len(), 16);
    }

    #[test]
    fn cube_faces_are_layers() {
        let file = Fixture {
            face_count: 6,
            ..Fixture::native(R8G8B8A8_UNORM, 1, 1)
        }
        .build(&[vec![0; 24]]);
        let header = Ktx2Transcoder::new().parse_header(&file).unwrap();
        assert_eq!(header.kind, TextureKind::Cube);
        assert_eq!(header.layers, 6);
    }

    #[test]
    fn zstd_levels_are_decompressed() {
        let level0: Vec<u8> = (0..16).collect();
        let level1 = vec![42; 4];
        let compressed = [&level0, &level1].map(|level| {
            ruzstd::encoding::compress_to_vec(
                level.as_slice(),
                ruzstd::encoding::CompressionLevel::Fastest,
            )
        });
        let file = Fixture {
            scheme: Some(SupercompressionScheme::Zstandard),
            ..Fixture::native(R8G8B8A8_UNORM, 2, 2)
        }
        .build(&compressed);
        let mut transcoder = Ktx2Transcoder::new();
        let header = transcoder.parse_header(&file).unwrap();
        let data = transcoder
            .transcode(&file, &header, PixelFormat::Rgba8Unorm, true)
            .unwrap();
        assert_eq!(data.level_bytes(0).unwrap(), level0.as_slice());
        assert_eq!(data.level_bytes(1).unwrap(), level1.as_slice());
    }

    #[test]
    fn zlib_levels_are_decompressed() {
        let level0 = vec![5; 16];
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::fast());
        encoder.write_all(&level0).unwrap();
        let file = Fixture {
            scheme: Some(SupercompressionScheme::ZLIB),
            ..Fixture::native(R8G8B8A8_UNORM, 2, 2)
        }
        .build(&[encoder.finish().unwrap()]);
        let mut transcoder = Ktx2Transcoder::new();
        let header = transcoder.parse_header(&file).unwrap();
        let data = transcoder
            .transcode(&file, &header, PixelFormat::Rgba8Unorm, false)
            .unwrap();
        assert_eq!(data.buffer(), level0.as_slice());
    }

    #[test]
    fn uastc_goes_through_format_selection() {
        // 8x8 UASTC is 2x2 blocks of 16 bytes
        let opaque = Fixture::uastc(8, 8, 0).build(&[vec![0; 64]]);
        let header = Ktx2Transcoder::new().parse_header(&opaque).unwrap();
        assert_eq!(header.encoding, PayloadEncoding::Universal);
        assert!(!header.has_alpha);
        assert_eq!(
            select_target(&header, &[PixelFormat::Rgba8Unorm, PixelFormat::Bc1RgbaUnorm]),
            Ok(PixelFormat::Bc1RgbaUnorm)
        );

        let alpha = Fixture::uastc(8, 8, UASTC_CHANNEL_RGBA).build(&[vec![0; 64]]);
        let header = Ktx2Transcoder::new().parse_header(&alpha).unwrap();
        assert!(header.has_alpha);
        assert_eq!(
            select_target(
                &header,
                &[PixelFormat::Bc1RgbaUnorm, PixelFormat::Rgba8Unorm, PixelFormat::Bc7RgbaUnorm]
            ),
            Ok(PixelFormat::Bc7RgbaUnorm)
        );
        assert_eq!(select_target(&header, &[]), Err(Error::NoSupportedFormat));
    }

    #[test]
    fn etc1s_alpha_slice() {
        let file = Fixture {
            scheme: Some(SupercompressionScheme::BasisLZ),
            color_model: Some(ColorModel::ETC1S),
            channels: vec![0, ETC1S_CHANNEL_AAA],
            ..Fixture::native(0, 4, 4)
        }
        .build(&[vec![0; 16]]);
        let mut transcoder = Ktx2Transcoder::new();
        let header = transcoder.parse_header(&file).unwrap();
        assert_eq!(header.encoding, PayloadEncoding::Universal);
        assert!(header.has_alpha);
        assert!(matches!(
            transcoder.transcode(&file, &header, PixelFormat::Rgba8Unorm, false),
            Err(Error::UnsupportedOperation(_))
        ));
    }

    #[cfg(not(feature = "basis_universal"))]
    #[test]
    fn uastc_transcoding_needs_basis_universal() {
        let file = Fixture::uastc(4, 4, 0).build(&[vec![0; 16]]);
        let mut transcoder = Ktx2Transcoder::new();
        let header = transcoder.parse_header(&file).unwrap();
        assert!(matches!(
            transcoder.transcode(&file, &header, PixelFormat::Rgba8Unorm, false),
            Err(Error::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn unknown_vk_format() {
        // VK_FORMAT_R32G32B32A32_SFLOAT
        let file = Fixture::native(109, 1, 1).build(&[vec![0; 16]]);
        assert!(matches!(
            Ktx2Transcoder::new().parse_header(&file),
            Err(Error::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn garbage_is_a_decode_failure() {
        assert!(matches!(
            Ktx2Transcoder::new().parse_header(b"not a ktx2 file at all"),
            Err(Error::DecodeFailure(_))
        ));
    }
}
