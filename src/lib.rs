// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! texture_transit loads images and texture containers and uploads them as GPU textures,
without blocking the thread that asked for them.

The hard part of texture loading is not reading files.  It is deciding, for the device you
actually have, which GPU-native format to use, laying out the bytes so the copy engine accepts
them, and filling in mip levels the file didn't bring along.  That is what this crate does.

```text
            ┌────────────┐   PixelSource    ┌──────────────┐   TextureResult
 PNG/JPEG ─▶│   decode   │ ───────────────▶ │              │ ────────────────▶ you
            └────────────┘                  │ TextureClient│
            ┌────────────┐   TextureData    │  (immediate  │
 KTX2/DDS ─▶│  workers   │ ───────────────▶ │   or staged) │
 Basis/TGA  └────────────┘                  └──────┬───────┘
                                                   │ layout planner, mipmap generator
                                                   ▼
                                              GpuBackend (wgpu)
```

# Pieces

| Module                     | Job                                                            |
|----------------------------|----------------------------------------------------------------|
| [`pixel_formats`]          | The format capability table: block geometry, mip support       |
| [`layout`]                 | Row pitch, padding and staging offsets for each mip level      |
| [`client`]                 | The two upload clients                                         |
| [`mipmap`]                 | Renders missing mip levels, one draw per level per layer       |
| [`transcode`]              | Per-family worker threads and the request coordinator          |
| [`registry`], [`loader`]   | Extension/MIME lookup and the [`TextureLoader`] tying it together |

# Clients

The two clients correspond to the two families of graphics APIs.  [`ImmediateClient`] writes
each level straight into the texture, tightly packed.  [`StagedClient`] packs every level into
one staging buffer with rows padded to 256 bytes, then records one copy per level and submits
once.  Both implement [`TextureClient`], so the loader doesn't care which one you pick.

# Backends

The shipped backend is [wgpu](https://wgpu.rs) (the default `backend_wgpu` feature); see
[`WgpuBackend`].  Everything the clients need from a GPU is behind [`backend::GpuBackend`], and
the `testing` feature exposes a recording backend that logs every call instead of touching a
device.

# Configuration

Set `TEXTURE_TRANSIT_DISABLE_COMPRESSED=1` to make clients and loaders stick to uncompressed
formats, which is handy when chasing a transcoding bug.
*/

pub mod backend;
pub mod client;
pub mod decode;
mod error;
pub mod fetch;
mod imp;
pub mod layout;
pub mod loader;
pub mod mip;
pub mod mipmap;
pub mod pixel_formats;
pub mod registry;
pub mod texture_data;
pub mod transcode;

pub use client::immediate::ImmediateClient;
pub use client::staged::StagedClient;
pub use client::{ClientConfig, TextureClient};
pub use error::Error;
pub use loader::{LoadOptions, LoaderConfig, TextureLoader};
pub use texture_data::{PixelSource, TextureData, TextureKind, TextureResult};

#[cfg(feature = "backend_wgpu")]
pub use imp::wgpu::{WgpuBackend, WgpuError};

/// A backend that records calls instead of making them.
#[cfg(any(test, feature = "testing"))]
pub mod testing {
    pub use crate::imp::recording::*;
}
