// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
A backend that performs no GPU work and records every call instead.

Used by unit tests and, with the `testing` feature, by downstream crates that want to check
what an upload would do on a device with particular capabilities.
*/

use crate::backend::{Capabilities, GpuBackend, MipView, TextureCopy, TextureDescriptor};
use crate::error::Error;
use crate::layout::{LevelLayout, RowAlignment};
use crate::pixel_formats::PixelFormat;
use std::cell::{Cell, RefCell};

/// A texture created by [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTexture {
    pub id: u64,
    pub descriptor: TextureDescriptor,
}

/// A staging buffer created by [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedBuffer {
    pub id: u64,
    pub contents: Vec<u8>,
}

/// A texture, level and layer named in a recorded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subresource {
    pub texture: u64,
    pub mip_level: u32,
    pub layer: u32,
}

impl<'a> From<MipView<'a, RecordedTexture>> for Subresource {
    fn from(view: MipView<'a, RecordedTexture>) -> Self {
        Subresource {
            texture: view.texture.id,
            mip_level: view.mip_level,
            layer: view.layer,
        }
    }
}

/// One backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateTexture(TextureDescriptor),
    WriteTexture {
        texture: u64,
        mip_level: u32,
        bytes: usize,
        layout: LevelLayout,
    },
    CreateStagingBuffer {
        buffer: u64,
        bytes: usize,
    },
    BeginCommands(String),
    CopyBufferToTexture {
        buffer: u64,
        offset: u64,
        texture: u64,
        mip_level: u32,
        layout: LevelLayout,
    },
    CopyTextureToTexture {
        source: Subresource,
        destination: Subresource,
        width: u32,
        height: u32,
    },
    CreateMipmapPipeline(PixelFormat),
    BlitMip {
        format: PixelFormat,
        source: Subresource,
        destination: Subresource,
    },
    Submit(String),
}

/// Commands recorded between `begin_commands` and `submit`.
#[derive(Debug)]
pub struct RecordedCommands {
    label: String,
    calls: Vec<Call>,
}

/// A [`GpuBackend`] that records calls.
#[derive(Debug)]
pub struct RecordingBackend {
    capabilities: Capabilities,
    calls: RefCell<Vec<Call>>,
    next_id: Cell<u64>,
    fail_create_texture: Cell<bool>,
    fail_submit: Cell<bool>,
}

impl RecordingBackend {
    /// A device with every format and full render support.
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities {
            formats: PixelFormat::ALL.to_vec(),
            render_to_mip_level: true,
            max_texture_dimension_2d: 8192,
            copy_row_alignment: RowAlignment::STAGED,
        })
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        RecordingBackend {
            capabilities,
            calls: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
            fail_create_texture: Cell::new(false),
            fail_submit: Cell::new(false),
        }
    }

    /// Everything recorded so far.  Commands appear when submitted.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Recorded calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| predicate(c)).count()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Makes texture creation fail, as an out-of-memory device would.
    pub fn set_fail_create_texture(&self, fail: bool) {
        self.fail_create_texture.set(fail);
    }

    /// Makes submit report a validation error.
    pub fn set_fail_submit(&self, fail: bool) {
        self.fail_submit.set(fail);
    }

    fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBackend for RecordingBackend {
    type Texture = RecordedTexture;
    type Buffer = RecordedBuffer;
    type Pipeline = PixelFormat;
    type Commands = RecordedCommands;

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<RecordedTexture, Error> {
        if self.fail_create_texture.get() {
            return Err(Error::Backend(format!(
                "out of memory creating {}",
                descriptor.label
            )));
        }
        if !self.capabilities.supports(descriptor.format) {
            return Err(Error::Backend(format!(
                "{} is not supported by this device",
                descriptor.format
            )));
        }
        self.record(Call::CreateTexture(descriptor.clone()));
        Ok(RecordedTexture {
            id: self.next_id(),
            descriptor: descriptor.clone(),
        })
    }

    fn write_texture(
        &self,
        destination: TextureCopy<'_, RecordedTexture>,
        data: &[u8],
        layout: &LevelLayout,
    ) -> Result<(), Error> {
        if (data.len() as u64) < layout.unpadded_size() {
            return Err(Error::Backend(format!(
                "write of {} bytes is shorter than level {}",
                data.len(),
                layout.level
            )));
        }
        self.record(Call::WriteTexture {
            texture: destination.texture.id,
            mip_level: destination.mip_level,
            bytes: data.len(),
            layout: *layout,
        });
        Ok(())
    }

    fn create_staging_buffer(&self, _label: &str, contents: &[u8]) -> Result<RecordedBuffer, Error> {
        let id = self.next_id();
        self.record(Call::CreateStagingBuffer {
            buffer: id,
            bytes: contents.len(),
        });
        Ok(RecordedBuffer {
            id,
            contents: contents.to_vec(),
        })
    }

    fn begin_commands(&self, label: &str) -> RecordedCommands {
        RecordedCommands {
            label: label.to_string(),
            calls: vec![Call::BeginCommands(label.to_string())],
        }
    }

    fn copy_buffer_to_texture(
        &self,
        commands: &mut RecordedCommands,
        source: &RecordedBuffer,
        offset: u64,
        destination: TextureCopy<'_, RecordedTexture>,
        layout: &LevelLayout,
    ) {
        commands.calls.push(Call::CopyBufferToTexture {
            buffer: source.id,
            offset,
            texture: destination.texture.id,
            mip_level: destination.mip_level,
            layout: *layout,
        });
    }

    fn copy_texture_to_texture(
        &self,
        commands: &mut RecordedCommands,
        source: MipView<'_, RecordedTexture>,
        destination: MipView<'_, RecordedTexture>,
        width: u32,
        height: u32,
    ) {
        commands.calls.push(Call::CopyTextureToTexture {
            source: source.into(),
            destination: destination.into(),
            width,
            height,
        });
    }

    fn create_mipmap_pipeline(&self, format: PixelFormat) -> Result<PixelFormat, Error> {
        self.record(Call::CreateMipmapPipeline(format));
        Ok(format)
    }

    fn blit_mip(
        &self,
        commands: &mut RecordedCommands,
        pipeline: &PixelFormat,
        source: MipView<'_, RecordedTexture>,
        destination: MipView<'_, RecordedTexture>,
    ) -> Result<(), Error> {
        if !self.capabilities.render_to_mip_level && source.texture.id == destination.texture.id
        {
            return Err(Error::Backend(
                "rendering into a texture that is being sampled".to_string(),
            ));
        }
        if *pipeline != destination.texture.descriptor.format {
            return Err(Error::Backend(format!(
                "pipeline for {pipeline} used with a {} target",
                destination.texture.descriptor.format
            )));
        }
        commands.calls.push(Call::BlitMip {
            format: *pipeline,
            source: source.into(),
            destination: destination.into(),
        });
        Ok(())
    }

    async fn submit(&self, commands: RecordedCommands) -> Result<(), Error> {
        let RecordedCommands { label, calls } = commands;
        self.calls.borrow_mut().extend(calls);
        self.record(Call::Submit(label.clone()));
        if self.fail_submit.get() {
            return Err(Error::Backend(format!("validation error in {label}")));
        }
        Ok(())
    }
}
