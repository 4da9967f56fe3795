// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The wgpu backend.

mod device;
mod error;
mod mipmap_pipeline;
mod pixel_format;
mod upload;

pub use device::WgpuBackend;
pub use error::WgpuError;
pub use mipmap_pipeline::MipmapPipeline;
pub use upload::WgpuCommands;
