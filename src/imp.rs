// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Backend implementations of [`crate::backend::GpuBackend`].

#[cfg(feature = "backend_wgpu")]
pub(crate) mod wgpu;

#[cfg(any(test, feature = "testing"))]
pub(crate) mod recording;
