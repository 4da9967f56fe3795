// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
GPU upload clients.

A [`TextureClient`] turns a [`TextureData`] or a [`PixelSource`] into a texture on the device.
Two clients are provided, mirroring the two families of graphics APIs:

| Client                          | Level upload                         | Row alignment  | Submits |
|---------------------------------|--------------------------------------|----------------|---------|
| [`immediate::ImmediateClient`]  | one direct write per level           | tightly packed | 1       |
| [`staged::StagedClient`]        | one staging buffer, one copy/level   | 256 bytes      | 1       |

Both consult the format table and the layout planner, and both hand off to the
[`MipmapGenerator`] when a single-level texture should have a full chain.

Clients are single-owner: every creating method takes `&mut self`.
*/

pub mod immediate;
pub mod staged;

use crate::backend::{GpuBackend, TextureDescriptor};
use crate::error::Error;
use crate::mip::mip_level_count;
use crate::mipmap::MipmapGenerator;
use crate::pixel_formats::PixelFormat;
use crate::texture_data::{PixelSource, TextureData, TextureResult};

/// Set to `1` to make every client report only uncompressed formats.
pub const DISABLE_COMPRESSED_ENV: &str = "TEXTURE_TRANSIT_DISABLE_COMPRESSED";

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Debug label for created resources.
    pub debug_name: String,
    /// Report and accept block-compressed formats the device supports.
    pub allow_compressed: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            debug_name: "texture_transit".to_string(),
            allow_compressed: !std::env::var(DISABLE_COMPRESSED_ENV)
                .map(|e| e == "1")
                .unwrap_or(false),
        }
    }
}

/**
Creates GPU textures from decoded payloads.

# Errors

Creating methods never panic on bad input.  They fail with:

- [`Error::UnsupportedOperation`] when the format isn't supported here, or can't be used the
  way requested (e.g. a compressed format for a pixel source)
- [`Error::DecodeFailure`] when the pixel source doesn't match its stated size
- [`Error::Backend`] when the device rejects an allocation or copy
*/
#[allow(async_fn_in_trait)]
pub trait TextureClient {
    type Texture: Clone + std::fmt::Debug;

    /// Formats textures can be created in, uncompressed first.
    ///
    /// Detection happens once, when the client is created.
    fn supported_formats(&self, include_compressed: bool) -> Vec<PixelFormat>;

    /// Creates a texture from RGBA8 texels.
    ///
    /// With `want_mipmaps`, the full chain is allocated and levels past 0 are rendered.
    async fn create_from_pixel_source(
        &mut self,
        source: &PixelSource,
        format: PixelFormat,
        want_mipmaps: bool,
    ) -> Result<TextureResult<Self::Texture>, Error>;

    /// Creates a texture from a container payload, consuming it.
    ///
    /// Missing levels are synthesized only if the payload carries level 0 alone, the format
    /// can be rendered into, and `want_mipmaps` is set.
    async fn create_from_texture_data(
        &mut self,
        data: TextureData,
        want_mipmaps: bool,
    ) -> Result<TextureResult<Self::Texture>, Error>;
}

/// How a client moves level bytes into a freshly created texture.
pub(crate) trait LevelUpload<B: GpuBackend> {
    fn upload(
        &self,
        backend: &B,
        commands: &mut B::Commands,
        texture: &B::Texture,
        data: &TextureData,
        label: &str,
    ) -> Result<(), Error>;
}

/// The state both clients share: backend, mipmap engine and detected formats.
pub(crate) struct ClientState<B: GpuBackend> {
    pub(crate) backend: B,
    mipmaps: MipmapGenerator<B>,
    formats: Vec<PixelFormat>,
    config: ClientConfig,
    created: u64,
}

impl<B: GpuBackend> std::fmt::Debug for ClientState<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientState")
            .field("mipmaps", &self.mipmaps)
            .field("formats", &self.formats)
            .field("config", &self.config)
            .finish()
    }
}

impl<B: GpuBackend> ClientState<B> {
    pub(crate) fn new(backend: B, config: ClientConfig) -> Self {
        let formats: Vec<PixelFormat> = backend
            .capabilities()
            .formats
            .iter()
            .copied()
            .filter(|f| config.allow_compressed || !f.is_compressed())
            .collect();
        logwise::info_sync!(
            "{name}: supported formats {formats}",
            name = logwise::privacy::LogIt(&config.debug_name),
            formats = logwise::privacy::LogIt(&formats)
        );
        ClientState {
            backend,
            mipmaps: MipmapGenerator::new(),
            formats,
            config,
            created: 0,
        }
    }

    pub(crate) fn supported_formats(&self, include_compressed: bool) -> Vec<PixelFormat> {
        self.formats
            .iter()
            .copied()
            .filter(|f| include_compressed || !f.is_compressed())
            .collect()
    }

    fn check_format(&self, format: PixelFormat) -> Result<(), Error> {
        if self.formats.contains(&format) {
            Ok(())
        } else {
            Err(Error::unsupported(format!(
                "{format} is not supported by this client"
            )))
        }
    }

    pub(crate) async fn create_from_pixel_source<U: LevelUpload<B>>(
        &mut self,
        upload: &U,
        source: &PixelSource,
        format: PixelFormat,
        want_mipmaps: bool,
    ) -> Result<TextureResult<B::Texture>, Error> {
        let info = format.info();
        if info.compressed {
            return Err(Error::unsupported(format!(
                "pixel sources can't be uploaded as compressed {format}"
            )));
        }
        if info.block_bytes != 4 {
            return Err(Error::unsupported(format!(
                "pixel sources carry 4 byte texels, {format} has {}",
                info.block_bytes
            )));
        }
        let expected = source.width as usize * source.height as usize * 4;
        if source.rgba.len() != expected {
            return Err(Error::decode(format!(
                "pixel source of {}x{} has {} bytes, expected {expected}",
                source.width,
                source.height,
                source.rgba.len()
            )));
        }
        let data = TextureData::from_pixel_source(source.clone(), false)?.retag(format);
        self.create_from_texture_data(upload, data, want_mipmaps)
            .await
    }

    pub(crate) async fn create_from_texture_data<U: LevelUpload<B>>(
        &mut self,
        upload: &U,
        data: TextureData,
        want_mipmaps: bool,
    ) -> Result<TextureResult<B::Texture>, Error> {
        let format = data.format();
        self.check_format(format)?;
        let max = self.backend.capabilities().max_texture_dimension_2d;
        if data.width() > max || data.height() > max {
            return Err(Error::unsupported(format!(
                "{}x{} exceeds the device limit of {max}",
                data.width(),
                data.height()
            )));
        }
        let synthesize =
            want_mipmaps && data.level_count() == 1 && format.info().native_mipmaps;
        if synthesize {
            MipmapGenerator::<B>::check_supported(data.kind(), format)?;
        }
        let mip_level_count = if synthesize {
            mip_level_count(data.width(), data.height())
        } else {
            data.level_count()
        };

        self.created += 1;
        let label = format!("{} #{}", self.config.debug_name, self.created);
        logwise::trace_sync!(
            "creating {label}: {width}x{height}x{depth} {format}, {levels} levels",
            label = logwise::privacy::LogIt(&label),
            width = data.width(),
            height = data.height(),
            depth = data.layers(),
            format = logwise::privacy::LogIt(format),
            levels = mip_level_count
        );

        let mut commands = self.backend.begin_commands(&label);
        let recorded = self.record(upload, &mut commands, &data, &label, mip_level_count, synthesize);
        // submit even after a failure so the backend can close out what was begun
        let submitted = self.backend.submit(commands).await;
        let outcome = match (recorded, submitted) {
            (Ok(result), Ok(())) => Ok(result),
            (Err(e), _) | (Ok(_), Err(e)) => Err(e),
        };
        if let Err(e) = &outcome {
            logwise::error_sync!(
                "creating {label} failed: {e}",
                label = logwise::privacy::LogIt(&label),
                e = logwise::privacy::LogIt(e)
            );
        }
        outcome
    }

    fn record<U: LevelUpload<B>>(
        &mut self,
        upload: &U,
        commands: &mut B::Commands,
        data: &TextureData,
        label: &str,
        mip_level_count: u32,
        synthesize: bool,
    ) -> Result<TextureResult<B::Texture>, Error> {
        let texture = self.backend.create_texture(&TextureDescriptor {
            label: label.to_string(),
            format: data.format(),
            kind: data.kind(),
            width: data.width(),
            height: data.height(),
            depth_or_array_layers: data.layers(),
            mip_level_count,
            renderable: synthesize,
        })?;
        let result = TextureResult {
            texture,
            width: data.width(),
            height: data.height(),
            depth: data.layers(),
            mip_level_count,
            format: data.format(),
            kind: data.kind(),
        };
        upload.upload(&self.backend, commands, &result.texture, data, label)?;
        if synthesize {
            self.mipmaps.generate(&self.backend, commands, &result)?;
        }
        Ok(result)
    }
}
