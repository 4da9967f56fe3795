// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
GPU mipmap synthesis.

Fills levels `1..N` of a texture from level 0 by repeatedly rendering level `i - 1` into level
`i` with a bilinear full-screen draw.  Each layer of an array (or face of a cube) is processed
independently.

Some devices can't render into one level of a texture while sampling another level of the
same texture.  On those, [`MipmapGenerator`] renders into a scratch texture instead, then
copies each scratch level back, halving the copied region every step.

What happens is decided up front by [`plan`], which is pure; [`MipmapGenerator::generate`]
only executes the plan.
*/

use crate::backend::{GpuBackend, MipView, TextureDescriptor};
use crate::error::Error;
use crate::mip::mip_extent;
use crate::pixel_formats::PixelFormat;
use crate::texture_data::{TextureKind, TextureResult};
use std::collections::HashMap;

/// Which texture a pass reads from or writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTarget {
    /// The texture whose levels are being filled.
    Destination,
    Scratch,
}

/// One full-screen draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipPass {
    pub layer: u32,
    pub source: PassTarget,
    pub source_level: u32,
    pub target: PassTarget,
    pub target_level: u32,
}

/// One scratch level copied back into the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyBack {
    pub layer: u32,
    pub level: u32,
    pub width: u32,
    pub height: u32,
}

/// Every draw and copy needed to fill a texture's mip chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MipmapPlan {
    pub passes: Vec<MipPass>,
    pub copies: Vec<CopyBack>,
}

impl MipmapPlan {
    pub fn uses_scratch(&self) -> bool {
        !self.copies.is_empty()
    }
}

/// Plans synthesis of levels `1..mip_level_count` for each of `layers` layers.
pub fn plan(
    width: u32,
    height: u32,
    layers: u32,
    mip_level_count: u32,
    render_to_mip_level: bool,
) -> MipmapPlan {
    let mut passes = Vec::new();
    let mut copies = Vec::new();
    for layer in 0..layers.max(1) {
        for level in 1..mip_level_count {
            if render_to_mip_level {
                passes.push(MipPass {
                    layer,
                    source: PassTarget::Destination,
                    source_level: level - 1,
                    target: PassTarget::Destination,
                    target_level: level,
                });
            } else {
                // level 1 reads the uploaded base; later levels read the previous scratch level
                let source = if level == 1 {
                    PassTarget::Destination
                } else {
                    PassTarget::Scratch
                };
                passes.push(MipPass {
                    layer,
                    source,
                    source_level: level - 1,
                    target: PassTarget::Scratch,
                    target_level: level,
                });
                let (width, height) = mip_extent(width, height, level);
                copies.push(CopyBack {
                    layer,
                    level,
                    width,
                    height,
                });
            }
        }
    }
    MipmapPlan { passes, copies }
}

fn resolve<'a, T>(
    target: PassTarget,
    destination: &'a T,
    scratch: Option<&'a T>,
) -> Result<&'a T, Error> {
    match target {
        PassTarget::Destination => Ok(destination),
        PassTarget::Scratch => {
            scratch.ok_or_else(|| Error::Backend("scratch texture missing".to_string()))
        }
    }
}

/**
Renders mip chains, caching one pipeline per output format.

The cache only grows; pipelines live as long as the generator.
*/
pub struct MipmapGenerator<B: GpuBackend> {
    pipelines: HashMap<PixelFormat, B::Pipeline>,
}

impl<B: GpuBackend> std::fmt::Debug for MipmapGenerator<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MipmapGenerator")
            .field("pipelines", &self.pipelines.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<B: GpuBackend> Default for MipmapGenerator<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: GpuBackend> MipmapGenerator<B> {
    pub fn new() -> Self {
        MipmapGenerator {
            pipelines: HashMap::new(),
        }
    }

    /// Formats with a cached pipeline.
    pub fn cached_formats(&self) -> impl Iterator<Item = PixelFormat> + '_ {
        self.pipelines.keys().copied()
    }

    /// Checks that a texture of `kind` in `format` can have its levels synthesized.
    pub fn check_supported(kind: TextureKind, format: PixelFormat) -> Result<(), Error> {
        if !kind.is_layered_2d() {
            return Err(Error::unsupported(format!(
                "mipmap generation for {kind:?} textures"
            )));
        }
        if !format.info().native_mipmaps {
            return Err(Error::unsupported(format!(
                "mipmap generation for {format}"
            )));
        }
        Ok(())
    }

    fn pipeline(&mut self, backend: &B, format: PixelFormat) -> Result<&B::Pipeline, Error> {
        use std::collections::hash_map::Entry;
        match self.pipelines.entry(format) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                logwise::info_sync!(
                    "creating mipmap pipeline for {format}",
                    format = logwise::privacy::LogIt(format)
                );
                let pipeline = backend.create_mipmap_pipeline(format)?;
                Ok(entry.insert(pipeline))
            }
        }
    }

    /**
    Records draws (and, if needed, copies) that fill levels `1..` of `texture` from level 0.

    The texture must have been created renderable with its full mip chain allocated.  Nothing
    executes until `commands` is submitted.
    */
    pub fn generate(
        &mut self,
        backend: &B,
        commands: &mut B::Commands,
        texture: &TextureResult<B::Texture>,
    ) -> Result<(), Error> {
        Self::check_supported(texture.kind, texture.format)?;
        if texture.mip_level_count <= 1 {
            return Ok(());
        }
        let render_to_mip_level = backend.capabilities().render_to_mip_level;
        let plan = plan(
            texture.width,
            texture.height,
            texture.depth,
            texture.mip_level_count,
            render_to_mip_level,
        );
        logwise::trace_sync!(
            "generating {passes} mip passes, {copies} copies",
            passes = plan.passes.len(),
            copies = plan.copies.len()
        );
        let _guard = logwise::perfwarn_begin!("MipmapGenerator::generate");

        let scratch = if plan.uses_scratch() {
            Some(backend.create_texture(&TextureDescriptor {
                label: "mipmap scratch".to_string(),
                format: texture.format,
                kind: texture.kind,
                width: texture.width,
                height: texture.height,
                depth_or_array_layers: texture.depth,
                mip_level_count: texture.mip_level_count,
                renderable: true,
            })?)
        } else {
            None
        };
        let texture_for = |target| resolve(target, &texture.texture, scratch.as_ref());

        let pipeline = self.pipeline(backend, texture.format)?;
        for pass in &plan.passes {
            backend.blit_mip(
                commands,
                pipeline,
                MipView {
                    texture: texture_for(pass.source)?,
                    mip_level: pass.source_level,
                    layer: pass.layer,
                },
                MipView {
                    texture: texture_for(pass.target)?,
                    mip_level: pass.target_level,
                    layer: pass.layer,
                },
            )?;
        }
        for copy in &plan.copies {
            backend.copy_texture_to_texture(
                commands,
                MipView {
                    texture: texture_for(PassTarget::Scratch)?,
                    mip_level: copy.level,
                    layer: copy.layer,
                },
                MipView {
                    texture: &texture.texture,
                    mip_level: copy.level,
                    layer: copy.layer,
                },
                copy.width,
                copy.height,
            );
        }
        Ok(())
    }
}
