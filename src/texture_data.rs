// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Normalized texture payloads and the result handed back to callers.
//!
//! Parsers produce a [`TextureData`] (or, for browser-style images, a [`PixelSource`]); the
//! upload client consumes it exactly once and produces a [`TextureResult`].
//!
//! # Layout
//!
//! One [`TextureData`] owns a single byte buffer.  Each [`MipLevelDescriptor`] names the byte
//! range of one mip level inside that buffer.  Within a level, layers (array layers, cube
//! faces or 3D slices) are stored one after another, each tightly packed in rows of blocks.

use crate::error::Error;
use crate::mip::{mip_dimension, mip_extent, mip_level_count};
use crate::pixel_formats::PixelFormat;

/// What kind of texture a payload or result describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    D1,
    D2,
    D2Array,
    /// Six 2D faces (or a multiple of six for cube arrays).
    Cube,
    D3,
}

impl TextureKind {
    /// Kinds stored as 2D images with layers.
    pub const fn is_layered_2d(self) -> bool {
        matches!(self, TextureKind::D2 | TextureKind::D2Array | TextureKind::Cube)
    }
}

/// Where one mip level lives inside a shared buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipLevelDescriptor {
    pub level: u32,
    pub width: u32,
    pub height: u32,
    pub offset: usize,
    pub byte_length: usize,
}

impl MipLevelDescriptor {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.byte_length
    }
}

/// Decoded RGBA8 texels from a platform image decoder.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelSource {
    pub width: u32,
    pub height: u32,
    /// `width * height` texels, four bytes each, rows top to bottom.
    pub rgba: Vec<u8>,
}

impl std::fmt::Debug for PixelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelSource")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("rgba_len", &self.rgba.len())
            .finish()
    }
}

/// A texture payload ready for upload: format, ordered mip levels and their bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct TextureData {
    format: PixelFormat,
    kind: TextureKind,
    width: u32,
    height: u32,
    layers: u32,
    levels: Vec<MipLevelDescriptor>,
    buffer: Vec<u8>,
}

impl std::fmt::Debug for TextureData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureData")
            .field("format", &self.format)
            .field("kind", &self.kind)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("layers", &self.layers)
            .field("levels", &self.levels)
            .field("buffer_len", &self.buffer.len())
            .finish()
    }
}

impl TextureData {
    /**
    Packs per-level byte vectors contiguously, in ascending level order with no padding.

    `level_bytes[n]` holds every layer of level `n`.
    */
    pub fn pack(
        format: PixelFormat,
        kind: TextureKind,
        width: u32,
        height: u32,
        layers: u32,
        level_bytes: Vec<Vec<u8>>,
    ) -> Result<Self, Error> {
        let total = level_bytes.iter().map(Vec::len).sum();
        let mut buffer = Vec::with_capacity(total);
        let mut levels = Vec::with_capacity(level_bytes.len());
        for (level, bytes) in level_bytes.into_iter().enumerate() {
            let level = level as u32;
            let (w, h) = mip_extent(width, height, level);
            levels.push(MipLevelDescriptor {
                level,
                width: w,
                height: h,
                offset: buffer.len(),
                byte_length: bytes.len(),
            });
            buffer.extend_from_slice(&bytes);
        }
        Self::from_parts(format, kind, width, height, layers, levels, buffer)
    }

    /// Assembles a payload from an existing buffer and level table, validating both.
    pub fn from_parts(
        format: PixelFormat,
        kind: TextureKind,
        width: u32,
        height: u32,
        layers: u32,
        levels: Vec<MipLevelDescriptor>,
        buffer: Vec<u8>,
    ) -> Result<Self, Error> {
        let data = TextureData {
            format,
            kind,
            width,
            height,
            layers: layers.max(1),
            levels,
            buffer,
        };
        data.validate()?;
        Ok(data)
    }

    /// A single-level RGBA8 payload built from decoded texels.
    pub fn from_pixel_source(source: PixelSource, srgb: bool) -> Result<Self, Error> {
        let format = if srgb {
            PixelFormat::Rgba8UnormSrgb
        } else {
            PixelFormat::Rgba8Unorm
        };
        Self::pack(
            format,
            TextureKind::D2,
            source.width,
            source.height,
            1,
            vec![source.rgba],
        )
    }

    fn validate(&self) -> Result<(), Error> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::decode(format!(
                "texture has zero extent {}x{}",
                self.width, self.height
            )));
        }
        if self.levels.is_empty() {
            return Err(Error::decode("texture has no mip levels"));
        }
        let chain = mip_level_count(self.width, self.height);
        if self.levels.len() as u32 > chain {
            return Err(Error::decode(format!(
                "{} mip levels exceed the full chain of {chain}",
                self.levels.len()
            )));
        }
        let info = self.format.info();
        let mut end_of_previous = 0;
        for (index, level) in self.levels.iter().enumerate() {
            let index = index as u32;
            if level.level != index {
                return Err(Error::decode(format!(
                    "mip levels must be a gapless prefix; found level {} at position {index}",
                    level.level
                )));
            }
            if (level.width, level.height) != mip_extent(self.width, self.height, index) {
                return Err(Error::decode(format!(
                    "level {index} is {}x{}, expected {:?}",
                    level.width,
                    level.height,
                    mip_extent(self.width, self.height, index)
                )));
            }
            let end = level
                .offset
                .checked_add(level.byte_length)
                .filter(|end| level.offset >= end_of_previous && *end <= self.buffer.len())
                .ok_or_else(|| {
                    Error::decode(format!(
                        "level {index} at offset {} with {} bytes overlaps or overruns a {} byte buffer",
                        level.offset,
                        level.byte_length,
                        self.buffer.len()
                    ))
                })?;
            let expected = info.level_size(level.width, level.height)
                * self.layers_at(index) as u64;
            if (level.byte_length as u64) < expected {
                return Err(Error::decode(format!(
                    "level {index} has {} bytes, {} needs {expected}",
                    level.byte_length, self.format
                )));
            }
            end_of_previous = end;
        }
        Ok(())
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }
    pub fn kind(&self) -> TextureKind {
        self.kind
    }
    pub fn width(&self) -> u32 {
        self.width
    }
    pub fn height(&self) -> u32 {
        self.height
    }
    /// Array layers, cube faces, or 3D depth at level 0.
    pub fn layers(&self) -> u32 {
        self.layers
    }
    /// Layers at `level`.  Only 3D textures shrink in depth.
    pub fn layers_at(&self, level: u32) -> u32 {
        match self.kind {
            TextureKind::D3 => mip_dimension(self.layers, level),
            _ => self.layers,
        }
    }
    pub fn levels(&self) -> &[MipLevelDescriptor] {
        &self.levels
    }
    pub fn level_count(&self) -> u32 {
        self.levels.len() as u32
    }
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// The bytes of one mip level (all layers), re-sliced from the shared buffer.
    pub fn level_bytes(&self, level: u32) -> Option<&[u8]> {
        self.levels
            .get(level as usize)
            .map(|descriptor| &self.buffer[descriptor.range()])
    }

    /// Changes the format tag without touching texels, e.g. to mark data as sRGB.
    pub(crate) fn retag(mut self, format: PixelFormat) -> Self {
        debug_assert_eq!(
            self.format.info().block_bytes,
            format.info().block_bytes,
            "retagging must preserve layout"
        );
        self.format = format;
        self
    }
}

/**
A texture uploaded to the GPU.

Treated as immutable once created.  The caller owns the texture and is responsible for
releasing it on the GPU side.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct TextureResult<T> {
    pub texture: T,
    pub width: u32,
    pub height: u32,
    /// Layers for arrays and cubes, slices for 3D textures, otherwise 1.
    pub depth: u32,
    pub mip_level_count: u32,
    pub format: PixelFormat,
    pub kind: TextureKind,
}
