// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The immediate-mode upload client: one direct texture write per level.

use crate::backend::{GpuBackend, TextureCopy};
use crate::client::{ClientConfig, ClientState, LevelUpload, TextureClient};
use crate::error::Error;
use crate::layout::{RowAlignment, plan_level};
use crate::pixel_formats::PixelFormat;
use crate::texture_data::{PixelSource, TextureData, TextureResult};

struct DirectWrites;

impl<B: GpuBackend> LevelUpload<B> for DirectWrites {
    fn upload(
        &self,
        backend: &B,
        _commands: &mut B::Commands,
        texture: &B::Texture,
        data: &TextureData,
        _label: &str,
    ) -> Result<(), Error> {
        let info = data.format().info();
        for descriptor in data.levels() {
            let layout = plan_level(
                descriptor,
                info,
                RowAlignment::None,
                data.layers_at(descriptor.level),
            );
            let bytes = data
                .level_bytes(descriptor.level)
                .ok_or_else(|| Error::decode(format!("level {} missing", descriptor.level)))?;
            backend.write_texture(
                TextureCopy {
                    texture,
                    mip_level: descriptor.level,
                },
                bytes,
                &layout,
            )?;
        }
        Ok(())
    }
}

/**
Uploads each mip level with a direct write, the way WebGL-style APIs do.

Rows are tightly packed, so level bytes are passed through without re-pitching.
*/
#[derive(Debug)]
pub struct ImmediateClient<B: GpuBackend> {
    state: ClientState<B>,
}

impl<B: GpuBackend> ImmediateClient<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, ClientConfig::default())
    }

    pub fn with_config(backend: B, config: ClientConfig) -> Self {
        ImmediateClient {
            state: ClientState::new(backend, config),
        }
    }

    pub fn backend(&self) -> &B {
        &self.state.backend
    }
}

impl<B: GpuBackend> TextureClient for ImmediateClient<B> {
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
            .create_from_pixel_source(&DirectWrites, source, format, want_mipmaps)
            .await
    }

    async fn create_from_texture_data(
        &mut self,
        data: TextureData,
        want_mipmaps: bool,
    ) -> Result<TextureResult<B::Texture>, Error> {
        self.state
            .create_from_texture_data(&DirectWrites, data, want_mipmaps)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture_data::TextureKind;
    use crate::testing::{Call, RecordingBackend};
    use test_executors::spin_on;

    fn config() -> ClientConfig {
        ClientConfig {
            debug_name: "immediate test".to_string(),
            allow_compressed: true,
        }
    }

    #[test]
    fn one_write_per_level() {
        let mut client = ImmediateClient::with_config(RecordingBackend::new(), config());
        let info = PixelFormat::Bc1RgbaUnorm.info();
        let levels = (0..3)
            .map(|level| {
                let (w, h) = crate::mip::mip_extent(16, 16, level);
                vec![0u8; info.level_size(w, h) as usize]
            })
            .collect();
        let data =
            TextureData::pack(PixelFormat::Bc1RgbaUnorm, TextureKind::D2, 16, 16, 1, levels)
                .unwrap();
        let result = spin_on(client.create_from_texture_data(data, true)).unwrap();
        assert_eq!(result.mip_level_count, 3);
        let backend = client.backend();
        assert_eq!(backend.count(|c| matches!(c, Call::WriteTexture { .. })), 3);
        assert_eq!(backend.count(|c| matches!(c, Call::BlitMip { .. })), 0);
        assert_eq!(backend.count(|c| matches!(c, Call::Submit(_))), 1);
        for call in backend.calls() {
            if let Call::WriteTexture { layout, .. } = call {
                assert!(layout.fast_path);
                assert_eq!(layout.bytes_per_row, layout.unpadded_bytes_per_row);
            }
        }
    }

    #[test]
    fn pixel_source_with_mipmaps() {
        let mut client = ImmediateClient::with_config(RecordingBackend::new(), config());
        let source = PixelSource {
            width: 256,
            height: 256,
            rgba: vec![255; 256 * 256 * 4],
        };
        let result = spin_on(client.create_from_pixel_source(
            &source,
            PixelFormat::Rgba8UnormSrgb,
            true,
        ))
        .unwrap();
        assert_eq!(result.mip_level_count, 9);
        assert_eq!(result.format, PixelFormat::Rgba8UnormSrgb);
        let backend = client.backend();
        assert_eq!(backend.count(|c| matches!(c, Call::WriteTexture { .. })), 1);
        assert_eq!(backend.count(|c| matches!(c, Call::BlitMip { .. })), 8);
    }

    #[test]
    fn pixel_source_rejects_compressed_formats() {
        let mut client = ImmediateClient::with_config(RecordingBackend::new(), config());
        let source = PixelSource {
            width: 4,
            height: 4,
            rgba: vec![0; 64],
        };
        let err = spin_on(client.create_from_pixel_source(
            &source,
            PixelFormat::Bc3RgbaUnorm,
            false,
        ))
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation(_)));
        assert!(client.backend().calls().is_empty());
    }

    #[test]
    fn allocation_failure_is_reported() {
        let backend = RecordingBackend::new();
        backend.set_fail_create_texture(true);
        let mut client = ImmediateClient::with_config(backend, config());
        let source = PixelSource {
            width: 2,
            height: 2,
            rgba: vec![0; 16],
        };
        let err = spin_on(client.create_from_pixel_source(
            &source,
            PixelFormat::Rgba8Unorm,
            false,
        ))
        .unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
        // what was begun is still submitted
        assert_eq!(
            client
                .backend()
                .count(|c| matches!(c, Call::Submit(_))),
            1
        );
    }

    #[test]
    fn compressed_formats_can_be_disabled() {
        let client = ImmediateClient::with_config(
            RecordingBackend::new(),
            ClientConfig {
                debug_name: "uncompressed".to_string(),
                allow_compressed: false,
            },
        );
        assert!(client.supported_formats(true).iter().all(|f| !f.is_compressed()));
        let with = ImmediateClient::with_config(RecordingBackend::new(), config());
        assert!(with.supported_formats(true).iter().any(|f| f.is_compressed()));
        assert_eq!(with.supported_formats(false)[0], PixelFormat::Rgba8Unorm);
    }
}
