// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The graphics API seam.

Upload clients and the mipmap engine are written against [`GpuBackend`] rather than a
particular API.  The crate ships a wgpu implementation (feature `backend_wgpu`); tests use a
recording implementation that logs every call.

A backend is used by one client at a time.  Methods take `&self` so a client and its mipmap
engine can share one backend, but nothing here is required to be `Sync`.
*/

use crate::error::Error;
use crate::layout::{LevelLayout, RowAlignment};
use crate::pixel_formats::PixelFormat;
use crate::texture_data::TextureKind;
use std::fmt::Debug;

/// What a device can do, detected once when the backend is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Formats textures can be created in, uncompressed first.
    pub formats: Vec<PixelFormat>,
    /// A texture can be rendered into one mip level while another level of it is sampled.
    ///
    /// When false, mipmap synthesis goes through a scratch texture.
    pub render_to_mip_level: bool,
    /// Largest width or height of a 2D texture.
    pub max_texture_dimension_2d: u32,
    /// Row alignment of buffer-to-texture copies.
    pub copy_row_alignment: RowAlignment,
}

impl Capabilities {
    pub fn supports(&self, format: PixelFormat) -> bool {
        self.formats.contains(&format)
    }
}

/// Parameters for [`GpuBackend::create_texture`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub label: String,
    pub format: PixelFormat,
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    /// Array layers, cube faces, or 3D depth.
    pub depth_or_array_layers: u32,
    pub mip_level_count: u32,
    /// The texture will be a render target (for mipmap synthesis).
    pub renderable: bool,
}

/// One layer of one mip level of a texture.
#[derive(Debug)]
pub struct MipView<'a, T> {
    pub texture: &'a T,
    pub mip_level: u32,
    pub layer: u32,
}

impl<T> Clone for MipView<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for MipView<'_, T> {}

/// The destination of a level upload: `layout.layers` layers starting at layer 0.
#[derive(Debug)]
pub struct TextureCopy<'a, T> {
    pub texture: &'a T,
    pub mip_level: u32,
}

impl<T> Clone for TextureCopy<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for TextureCopy<'_, T> {}

/**
A graphics API able to receive texture uploads.

Commands recorded between [`begin_commands`](GpuBackend::begin_commands) and
[`submit`](GpuBackend::submit) execute in order.  `write_texture` takes effect no later than
the next submit.  Backends that report validation errors asynchronously surface them from
`submit`, so callers always submit what they began, even after an earlier step failed.
*/
#[allow(async_fn_in_trait)]
pub trait GpuBackend {
    type Texture: Clone + Debug;
    type Buffer;
    type Pipeline;
    type Commands;

    fn capabilities(&self) -> &Capabilities;

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<Self::Texture, Error>;

    /// Writes one tightly packed level (all layers) directly, without a staging buffer.
    fn write_texture(
        &self,
        destination: TextureCopy<'_, Self::Texture>,
        data: &[u8],
        layout: &LevelLayout,
    ) -> Result<(), Error>;

    fn create_staging_buffer(&self, label: &str, contents: &[u8]) -> Result<Self::Buffer, Error>;

    fn begin_commands(&self, label: &str) -> Self::Commands;

    /// Copies one level laid out per `layout` at `offset` in `source`.
    fn copy_buffer_to_texture(
        &self,
        commands: &mut Self::Commands,
        source: &Self::Buffer,
        offset: u64,
        destination: TextureCopy<'_, Self::Texture>,
        layout: &LevelLayout,
    );

    /// Copies a `width`×`height` region between single layers of two mip levels.
    fn copy_texture_to_texture(
        &self,
        commands: &mut Self::Commands,
        source: MipView<'_, Self::Texture>,
        destination: MipView<'_, Self::Texture>,
        width: u32,
        height: u32,
    );

    /// Builds everything needed to downsample into `format`: shader, layout and sampler.
    fn create_mipmap_pipeline(&self, format: PixelFormat) -> Result<Self::Pipeline, Error>;

    /// Renders `source` into `destination` with one full-screen draw, filtering bilinearly.
    fn blit_mip(
        &self,
        commands: &mut Self::Commands,
        pipeline: &Self::Pipeline,
        source: MipView<'_, Self::Texture>,
        destination: MipView<'_, Self::Texture>,
    ) -> Result<(), Error>;

    async fn submit(&self, commands: Self::Commands) -> Result<(), Error>;
}
