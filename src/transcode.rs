// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Background transcoding of texture containers.

Container files (KTX2, Basis, DDS, TGA) are parsed off the caller's thread.  Each container
family gets one worker thread, started on first use, which handles its requests one at a
time.  The [`coordinator::Coordinator`] matches responses to requests by id, so responses may
arrive in any order.

```text
caller ── TranscodeRequest ──▶ worker (per family)
   ▲                              │ fetch → parse header → select format → transcode
   │                              ▼
   └──── continuation ◀── coordinator ◀── TranscodeResponse
```

# Format selection

Universal payloads (Basis files, UASTC and ETC1S KTX2) can become any of several GPU formats.
The first entry of the matching priority list that the device supports wins:

| Payload | Priority                                                            |
|---------|---------------------------------------------------------------------|
| alpha   | ETC2 RGBA, BC7, BC3, ASTC 4×4, PVRTC1 RGBA, RGBA8                    |
| opaque  | ETC1, BC7, BC1, ETC2 RGB, ASTC 4×4, PVRTC1 RGB, RGB565, RGBA8        |

```
use texture_transit::pixel_formats::PixelFormat;
use texture_transit::transcode::select_transcode_format;

let supported = [PixelFormat::Rgba8Unorm, PixelFormat::Etc2Rgba8Unorm];
assert_eq!(select_transcode_format(&supported, true), Ok(PixelFormat::Etc2Rgba8Unorm));
```

Payloads already in a GPU format are uploaded as they are, if the device supports that format.
*/

pub mod coordinator;
pub mod worker;

#[cfg(feature = "basis_universal")]
mod basis;
mod dds;
mod ktx2;
mod tga;

use crate::error::Error;
use crate::pixel_formats::PixelFormat;
use crate::texture_data::{TextureData, TextureKind};

/// Transcode targets for payloads with alpha, most preferred first.
pub const ALPHA_PRIORITY: [PixelFormat; 6] = [
    PixelFormat::Etc2Rgba8Unorm,
    PixelFormat::Bc7RgbaUnorm,
    PixelFormat::Bc3RgbaUnorm,
    PixelFormat::Astc4x4Unorm,
    PixelFormat::Pvrtc1Rgba4bpp,
    PixelFormat::Rgba8Unorm,
];

/// Transcode targets for opaque payloads, most preferred first.
pub const OPAQUE_PRIORITY: [PixelFormat; 8] = [
    PixelFormat::Etc1RgbUnorm,
    PixelFormat::Bc7RgbaUnorm,
    PixelFormat::Bc1RgbaUnorm,
    PixelFormat::Etc2Rgb8Unorm,
    PixelFormat::Astc4x4Unorm,
    PixelFormat::Pvrtc1Rgb4bpp,
    PixelFormat::Rgb565Unorm,
    PixelFormat::Rgba8Unorm,
];

/// Picks the transcode target for a universal payload.
///
/// Fails with [`Error::NoSupportedFormat`] when nothing in the priority list is supported.
pub fn select_transcode_format(
    supported: &[PixelFormat],
    has_alpha: bool,
) -> Result<PixelFormat, Error> {
    let priority: &[PixelFormat] = if has_alpha {
        &ALPHA_PRIORITY
    } else {
        &OPAQUE_PRIORITY
    };
    priority
        .iter()
        .copied()
        .find(|f| supported.contains(f))
        .ok_or(Error::NoSupportedFormat)
}

/// How a container's payload is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    /// A universal encoding that can be transcoded into many GPU formats.
    Universal,
    /// Already in this GPU format.
    Native(PixelFormat),
}

/// What a worker learns from a container before transcoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub width: u32,
    pub height: u32,
    /// Array layers, cube faces, or 3D depth.
    pub layers: u32,
    pub kind: TextureKind,
    /// Levels stored in the file.
    pub level_count: u32,
    pub has_alpha: bool,
    pub encoding: PayloadEncoding,
}

/// Picks the format a payload will be delivered in.
pub fn select_target(
    header: &ContainerHeader,
    supported: &[PixelFormat],
) -> Result<PixelFormat, Error> {
    match header.encoding {
        PayloadEncoding::Universal => select_transcode_format(supported, header.has_alpha),
        PayloadEncoding::Native(format) if supported.contains(&format) => Ok(format),
        // ETC2 decoders accept ETC1 data
        PayloadEncoding::Native(PixelFormat::Etc1RgbUnorm)
            if supported.contains(&PixelFormat::Etc2Rgb8Unorm) =>
        {
            Ok(PixelFormat::Etc2Rgb8Unorm)
        }
        PayloadEncoding::Native(_) => Err(Error::NoSupportedFormat),
    }
}

/// A parser/transcoder for one container family.
///
/// Instances live on their family's worker thread.
pub trait Transcoder: Send {
    fn parse_header(&mut self, bytes: &[u8]) -> Result<ContainerHeader, Error>;

    /// Produces the payload in `target`.  With `mipmaps` false, only level 0 is produced.
    fn transcode(
        &mut self,
        bytes: &[u8],
        header: &ContainerHeader,
        target: PixelFormat,
        mipmaps: bool,
    ) -> Result<TextureData, Error>;
}

/// Container families, each handled by its own worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFamily {
    Ktx2,
    Basis,
    Dds,
    Tga,
}

impl ContainerFamily {
    pub const fn name(self) -> &'static str {
        match self {
            ContainerFamily::Ktx2 => "ktx2",
            ContainerFamily::Basis => "basis",
            ContainerFamily::Dds => "dds",
            ContainerFamily::Tga => "tga",
        }
    }

    /// A transcoder for this family.
    ///
    /// Basis files need the `basis_universal` feature.
    pub fn transcoder(self) -> Result<Box<dyn Transcoder>, Error> {
        match self {
            ContainerFamily::Ktx2 => Ok(Box::new(ktx2::Ktx2Transcoder::new())),
            #[cfg(feature = "basis_universal")]
            ContainerFamily::Basis => Ok(Box::new(basis::BasisTranscoder::new())),
            #[cfg(not(feature = "basis_universal"))]
            ContainerFamily::Basis => Err(Error::unsupported(
                "basis files require the basis_universal feature",
            )),
            ContainerFamily::Dds => Ok(Box::new(dds::DdsTranscoder)),
            ContainerFamily::Tga => Ok(Box::new(tga::TgaTranscoder)),
        }
    }
}

/// Unique id of a transcode request within one loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

/// Where a worker gets the container bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestSource {
    Url(String),
    Bytes(Vec<u8>),
}

/// A request to a transcode worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeRequest {
    pub id: RequestId,
    pub source: RequestSource,
    /// Formats the device supports, in the client's order.
    pub supported_formats: Vec<PixelFormat>,
    /// Deliver every level the file has.  When false, only level 0 is delivered.
    pub mipmaps: bool,
}

/// The single response to a [`TranscodeRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeResponse {
    pub id: RequestId,
    pub outcome: Result<TextureData, Error>,
}

/// Number of levels to emit for a file with `level_count` levels.
pub(crate) fn emitted_levels(level_count: u32, mipmaps: bool) -> u32 {
    if mipmaps { level_count.max(1) } else { 1 }
}
