// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The staged upload client: every level in one staging buffer, one copy per level.

use crate::backend::{GpuBackend, TextureCopy};
use crate::client::{ClientConfig, ClientState, LevelUpload, TextureClient};
use crate::error::Error;
use crate::layout::TransferPlan;
use crate::pixel_formats::PixelFormat;
use crate::texture_data::{PixelSource, TextureData, TextureResult};

struct StagingCopies;

impl<B: GpuBackend> LevelUpload<B> for StagingCopies {
    fn upload(
        &self,
        backend: &B,
        commands: &mut B::Commands,
        texture: &B::Texture,
        data: &TextureData,
        label: &str,
    ) -> Result<(), Error> {
        let plan = TransferPlan::new(data, backend.capabilities().copy_row_alignment);
        let staging = {
            let _guard = logwise::perfwarn_begin!("staged_upload_fill");
            plan.fill(data)
        };
        logwise::trace_sync!(
            "staging {levels} levels in {kb} KB",
            levels = plan.levels().len(),
            kb = staging.len() / 1024
        );
        let buffer = backend.create_staging_buffer(label, &staging)?;
        for planned in plan.levels() {
            backend.copy_buffer_to_texture(
                commands,
                &buffer,
                planned.offset,
                TextureCopy {
                    texture,
                    mip_level: planned.layout.level,
                },
                &planned.layout,
            );
        }
        Ok(())
    }
}

/**
Uploads through one staging buffer per texture, the way WebGPU-style APIs do.

All levels are written into the buffer at the device's row alignment, then copied into the
texture with one command per level and a single submit.
*/
#[derive(Debug)]
pub struct StagedClient<B: GpuBackend> {
    state: ClientState<B>,
}

impl<B: GpuBackend> StagedClient<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, ClientConfig::default())
    }

    pub fn with_config(backend: B, config: ClientConfig) -> Self {
        StagedClient {
            state: ClientState::new(backend, config),
        }
    }

    pub fn backend(&self) -> &B {
        &self.state.backend
    }
}

impl<B: GpuBackend> TextureClient for StagedClient<B> {
    type Texture = B::Texture;

    fn supported_formats(&self, include_compressed: bool) -> Vec<PixelFormat> {
        self.state.supported_formats(include_compressed)
    }

    async fn create_from_pixel_source(
        &mut self,
        source: &PixelSource,
        format: PixelFormat,
        want_mipmaps: bool,
    ) -> Result<TextureResult<B::Texture>, Error> {
        self.state
            .create_from_pixel_source(&StagingCopies, source, format, want_mipmaps)
            .await
    }

    async fn create_from_texture_data(
        &mut self,
        data: TextureData,
        want_mipmaps: bool,
    ) -> Result<TextureResult<B::Texture>, Error> {
        self.state
            .create_from_texture_data(&StagingCopies, data, want_mipmaps)
            .await
    }
}
