// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use super::device::WgpuBackend;
use super::error::scope_error;
use super::mipmap_pipeline::MipmapPipeline;
use super::pixel_format::wgpu_format;
use crate::backend::{Capabilities, GpuBackend, MipView, TextureCopy, TextureDescriptor};
use crate::error::Error;
use crate::layout::LevelLayout;
use crate::pixel_formats::PixelFormat;
use crate::texture_data::TextureKind;
use wgpu::util::DeviceExt;
use wgpu::{Extent3d, TexelCopyBufferInfo, TexelCopyBufferLayout, TexelCopyTextureInfo};

/// A command encoder plus the error scopes opened for it.
#[derive(Debug)]
pub struct WgpuCommands {
    label: String,
    encoder: wgpu::CommandEncoder,
}

/// The region of `texture`'s `mip_level` covered by a `width`×`height` upload.
///
/// Compressed copies must cover whole blocks, but may not run past the level's physical size.
fn copy_extent(
    texture: &wgpu::Texture,
    mip_level: u32,
    width: u32,
    height: u32,
    layers: u32,
) -> Extent3d {
    let (block_width, block_height) = texture.format().block_dimensions();
    let size = texture.size();
    let physical_width = (size.width >> mip_level).max(1).div_ceil(block_width) * block_width;
    let physical_height =
        (size.height >> mip_level).max(1).div_ceil(block_height) * block_height;
    Extent3d {
        width: (width.div_ceil(block_width) * block_width).min(physical_width),
        height: (height.div_ceil(block_height) * block_height).min(physical_height),
        depth_or_array_layers: layers,
    }
}

fn copy_destination(texture: &wgpu::Texture, mip_level: u32, layer: u32) -> TexelCopyTextureInfo<'_> {
    TexelCopyTextureInfo {
        texture,
        mip_level,
        origin: wgpu::Origin3d {
            x: 0,
            y: 0,
            z: layer,
        },
        aspect: wgpu::TextureAspect::All,
    }
}

fn buffer_layout(offset: u64, layout: &LevelLayout) -> TexelCopyBufferLayout {
    TexelCopyBufferLayout {
        offset,
        bytes_per_row: Some(layout.bytes_per_row as u32),
        rows_per_image: Some(layout.row_count),
    }
}

fn single_level_view(view: MipView<'_, wgpu::Texture>, label: &str) -> wgpu::TextureView {
    view.texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some(label),
        format: None,
        dimension: Some(wgpu::TextureViewDimension::D2),
        usage: None,
        aspect: wgpu::TextureAspect::All,
        base_mip_level: view.mip_level,
        mip_level_count: Some(1),
        base_array_layer: view.layer,
        array_layer_count: Some(1),
    })
}

impl GpuBackend for WgpuBackend {
    type Texture = wgpu::Texture;
    type Buffer = wgpu::Buffer;
    type Pipeline = MipmapPipeline;
    type Commands = WgpuCommands;

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<wgpu::Texture, Error> {
        let format = wgpu_format(descriptor.format).ok_or_else(|| {
            Error::unsupported(format!("{} has no wgpu format", descriptor.format))
        })?;
        let (block_width, block_height) = format.block_dimensions();
        let dimension = match descriptor.kind {
            TextureKind::D1 => wgpu::TextureDimension::D1,
            TextureKind::D2 | TextureKind::D2Array | TextureKind::Cube => {
                wgpu::TextureDimension::D2
            }
            TextureKind::D3 => wgpu::TextureDimension::D3,
        };
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC;
        if descriptor.renderable {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        Ok(self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&descriptor.label),
            // compressed textures are allocated in whole blocks
            size: Extent3d {
                width: descriptor.width.div_ceil(block_width) * block_width,
                height: descriptor.height.div_ceil(block_height) * block_height,
                depth_or_array_layers: descriptor.depth_or_array_layers.max(1),
            },
            mip_level_count: descriptor.mip_level_count,
            sample_count: 1,
            dimension,
            format,
            usage,
            view_formats: &[],
        }))
    }

    fn write_texture(
        &self,
        destination: TextureCopy<'_, wgpu::Texture>,
        data: &[u8],
        layout: &LevelLayout,
    ) -> Result<(), Error> {
        let _guard = logwise::perfwarn_begin!("wgpu_write_texture");
        self.queue.write_texture(
            copy_destination(destination.texture, destination.mip_level, 0),
            data,
            buffer_layout(0, layout),
            copy_extent(
                destination.texture,
                destination.mip_level,
                layout.width,
                layout.height,
                layout.layers,
            ),
        );
        Ok(())
    }

    fn create_staging_buffer(&self, label: &str, contents: &[u8]) -> Result<wgpu::Buffer, Error> {
        Ok(self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::COPY_SRC,
            }))
    }

    fn begin_commands(&self, label: &str) -> WgpuCommands {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        WgpuCommands {
            label: label.to_string(),
            encoder,
        }
    }

    fn copy_buffer_to_texture(
        &self,
        commands: &mut WgpuCommands,
        source: &wgpu::Buffer,
        offset: u64,
        destination: TextureCopy<'_, wgpu::Texture>,
        layout: &LevelLayout,
    ) {
        commands.encoder.copy_buffer_to_texture(
            TexelCopyBufferInfo {
                buffer: source,
                layout: buffer_layout(offset, layout),
            },
            copy_destination(destination.texture, destination.mip_level, 0),
            copy_extent(
                destination.texture,
                destination.mip_level,
                layout.width,
                layout.height,
                layout.layers,
            ),
        );
    }

    fn copy_texture_to_texture(
        &self,
        commands: &mut WgpuCommands,
        source: MipView<'_, wgpu::Texture>,
        destination: MipView<'_, wgpu::Texture>,
        width: u32,
        height: u32,
    ) {
        commands.encoder.copy_texture_to_texture(
            copy_destination(source.texture, source.mip_level, source.layer),
            copy_destination(destination.texture, destination.mip_level, destination.layer),
            Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn create_mipmap_pipeline(&self, format: PixelFormat) -> Result<MipmapPipeline, Error> {
        let format = wgpu_format(format)
            .ok_or_else(|| Error::unsupported(format!("{format} has no wgpu format")))?;
        Ok(MipmapPipeline::new(&self.device, format))
    }

    fn blit_mip(
        &self,
        commands: &mut WgpuCommands,
        pipeline: &MipmapPipeline,
        source: MipView<'_, wgpu::Texture>,
        destination: MipView<'_, wgpu::Texture>,
    ) -> Result<(), Error> {
        let source_view = single_level_view(source, "mipmap source");
        let destination_view = single_level_view(destination, "mipmap destination");
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("mipmap"),
            layout: &pipeline.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&source_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        let color_attachment = wgpu::RenderPassColorAttachment {
            view: &destination_view,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                store: wgpu::StoreOp::Store,
            },
        };
        let mut render_pass = commands
            .encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("mipmap"),
                color_attachments: &[Some(color_attachment)],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        render_pass.set_pipeline(&pipeline.pipeline);
        render_pass.set_bind_group(0, &bind_group, &[]);
        render_pass.draw(0..3, 0..1);
        Ok(())
    }

    async fn submit(&self, commands: WgpuCommands) -> Result<(), Error> {
        let WgpuCommands { label, encoder } = commands;
        self.queue.submit(std::iter::once(encoder.finish()));
        let validation = self.device.pop_error_scope().await;
        let out_of_memory = self.device.pop_error_scope().await;
        self.set_needs_poll();
        match validation.or(out_of_memory) {
            Some(e) => Err(scope_error(&label, e)),
            None => Ok(()),
        }
    }
}
