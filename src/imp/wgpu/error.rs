// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use std::fmt::Display;

/// Errors setting up a wgpu device.
#[derive(Debug, thiserror::Error)]
pub enum WgpuError {
    NoSuchAdapter(#[from] wgpu::RequestAdapterError),
    RequestDeviceError(#[from] wgpu::RequestDeviceError),
    PollThread(#[from] std::io::Error),
}

impl Display for WgpuError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WgpuError::NoSuchAdapter(e) => write!(f, "No such adapter: {}", e),
            WgpuError::RequestDeviceError(e) => write!(f, "{}", e),
            WgpuError::PollThread(e) => write!(f, "Can't start wgpu poll thread: {}", e),
        }
    }
}

impl From<WgpuError> for crate::Error {
    fn from(e: WgpuError) -> Self {
        crate::Error::Backend(e.to_string())
    }
}

/// Maps an error popped from an error scope.
pub(crate) fn scope_error(label: &str, e: wgpu::Error) -> crate::Error {
    match e {
        wgpu::Error::OutOfMemory { .. } => {
            crate::Error::Backend(format!("{label}: out of GPU memory"))
        }
        other => crate::Error::Backend(format!("{label}: {other}")),
    }
}
