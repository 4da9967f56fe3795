// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use super::error::WgpuError;
use super::pixel_format::{supported_formats, wanted_features};
use crate::backend::Capabilities;
use crate::layout::RowAlignment;
#[cfg(not(target_arch = "wasm32"))]
use std::sync::Arc;
#[cfg(not(target_arch = "wasm32"))]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(not(target_arch = "wasm32"))]
use std::sync::mpsc::{self, Receiver, Sender};
#[cfg(not(target_arch = "wasm32"))]
use std::thread::{self, JoinHandle};
use wgpu::{AddressMode, Limits, SamplerDescriptor, Trace};

/// Polls the device in the background so resources are reclaimed after submits.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug)]
struct PollThread {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    trigger: Sender<()>,
}

#[cfg(not(target_arch = "wasm32"))]
impl PollThread {
    fn spawn(device: wgpu::Device) -> Result<Self, WgpuError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let (trigger, receiver): (Sender<()>, Receiver<()>) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("texture_transit_wgpu_poll".to_string())
            .spawn(move || {
                while !shutdown_clone.load(Ordering::Relaxed) {
                    match receiver.recv() {
                        Ok(_) => {
                            let _ = device.poll(wgpu::PollType::Wait);
                        }
                        Err(_) => break,
                    }
                }
            })?;
        Ok(PollThread {
            handle: Some(handle),
            shutdown,
            trigger,
        })
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Drop for PollThread {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // wake the thread so it sees the flag
        let _ = self.trigger.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/**
Uploads textures through wgpu.

Create one with [`WgpuBackend::headless`], or wrap a device your application already owns with
[`WgpuBackend::from_device`].  Compressed format support is read from the device's features,
so request `TEXTURE_COMPRESSION_*` features when creating your own device.
*/
#[derive(Debug)]
pub struct WgpuBackend {
    pub(super) device: wgpu::Device,
    pub(super) queue: wgpu::Queue,
    pub(super) sampler: wgpu::Sampler,
    pub(super) capabilities: Capabilities,
    #[cfg(not(target_arch = "wasm32"))]
    poll: PollThread,
}

impl WgpuBackend {
    /// Picks an adapter and creates a device with every compression feature it offers.
    pub async fn headless() -> Result<Self, WgpuError> {
        let descriptor = wgpu::InstanceDescriptor::from_env_or_default();
        let instance = wgpu::Instance::new(&descriptor);
        let options = wgpu::RequestAdapterOptions {
            power_preference: Default::default(),
            force_fallback_adapter: false,
            compatible_surface: None,
        };
        let adapter = instance.request_adapter(&options).await?;
        let required_features = wanted_features(adapter.features());
        let mut limits = Limits::downlevel_webgl2_defaults();
        //webGL is quite serious about enforcing these, which
        //by default are rather small
        limits.max_texture_dimension_1d = 4096;
        limits.max_texture_dimension_2d = 4096;
        let descriptor = wgpu::DeviceDescriptor {
            label: Some("texture_transit"),
            required_features,
            required_limits: limits,
            memory_hints: Default::default(),
            trace: Trace::Off,
        };
        let (device, queue) = adapter.request_device(&descriptor).await?;
        Self::from_device(&adapter, device, queue)
    }

    /// Wraps an existing device.
    pub fn from_device(
        adapter: &wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
    ) -> Result<Self, WgpuError> {
        let info = adapter.get_info();
        let capabilities = Capabilities {
            formats: supported_formats(device.features()),
            // GL drivers may reject sampling one level while rendering another
            render_to_mip_level: info.backend != wgpu::Backend::Gl,
            max_texture_dimension_2d: device.limits().max_texture_dimension_2d,
            copy_row_alignment: RowAlignment::Bytes(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT),
        };
        logwise::info_sync!(
            "wgpu backend on {adapter} ({backend}): {capabilities}",
            adapter = logwise::privacy::LogIt(&info.name),
            backend = logwise::privacy::LogIt(info.backend),
            capabilities = logwise::privacy::LogIt(&capabilities)
        );
        device.on_uncaptured_error(Box::new(|e| {
            logwise::error_sync!(
                "uncaptured wgpu error: {e}",
                e = logwise::privacy::LogIt(&e)
            );
        }));
        let sampler = device.create_sampler(&SamplerDescriptor {
            label: Some("texture_transit mipmap"),
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            lod_min_clamp: 0.0,
            lod_max_clamp: 32.0,
            compare: None,
            anisotropy_clamp: 1,
            border_color: None,
        });
        #[cfg(not(target_arch = "wasm32"))]
        let poll = PollThread::spawn(device.clone())?;
        Ok(WgpuBackend {
            device,
            queue,
            sampler,
            capabilities,
            #[cfg(not(target_arch = "wasm32"))]
            poll,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Signal the polling thread that GPU work may be ready
    pub(super) fn set_needs_poll(&self) {
        #[cfg(not(target_arch = "wasm32"))]
        {
            let _ = self.poll.trigger.send(());
        }
        #[cfg(target_arch = "wasm32")]
        {
            let _ = self.device.poll(wgpu::PollType::Poll);
        }
    }
}
