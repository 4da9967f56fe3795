// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The top-level loading tool.

A [`TextureLoader`] ties a [`TextureClient`] to a [`LoaderRegistry`]: it works out what kind of
file a source is, gets it decoded or transcoded somewhere other than the calling thread, and
hands the result to the client for upload.

```text
prepare_url ──▶ SourceType ──▶ image?     ──▶ fetch + decode off-thread ─┐
                          └──▶ container? ──▶ worker transcode          ─┤
upload ◀── PreparedTexture ◀────────────────────────────────────────────┘
  └──▶ create_from_pixel_source / create_from_texture_data
```

Destroying a loader rejects everything in flight with [`Error::Destroyed`].
*/

use crate::client::{DISABLE_COMPRESSED_ENV, TextureClient};
use crate::decode::decode_image;
use crate::error::Error;
use crate::fetch::{Fetch, FileFetch};
use crate::pixel_formats::PixelFormat;
use crate::registry::{LoaderRegistry, SourceType};
use crate::texture_data::{PixelSource, TextureData, TextureResult};
use crate::transcode::RequestSource;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Loader-wide configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Priority for file reads.
    pub priority: async_file::Priority,
    /// Ask workers for block-compressed formats when the device supports them.
    pub allow_compressed: bool,
}

impl LoaderConfig {
    /// Compressed formats are allowed unless `TEXTURE_TRANSIT_DISABLE_COMPRESSED=1`.
    pub fn new(priority: async_file::Priority) -> Self {
        LoaderConfig {
            priority,
            allow_compressed: !std::env::var(DISABLE_COMPRESSED_ENV)
                .map(|e| e == "1")
                .unwrap_or(false),
        }
    }
}

/// Per-load options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Produce a full mip chain, from the file or by rendering.
    pub mipmaps: bool,
    /// Tag the texels as sRGB where the format has an sRGB variant.
    pub srgb: bool,
    /// Overrides detection from the URL's extension.
    pub source_type: Option<SourceType>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            mipmaps: true,
            srgb: false,
            source_type: None,
        }
    }
}

/// Runs `f` on a new thread, resolving when it finishes.
fn off_thread<F, R>(label: &'static str, f: F) -> impl Future<Output = Result<R, Error>>
where
    F: FnOnce() -> Result<R, Error> + Send + 'static,
    R: Send + 'static,
{
    let prior_context = logwise::context::Context::current();
    let (sender, future) = r#continue::continuation();
    let spawned = std::thread::Builder::new()
        .name(format!("texture_transit_{label}"))
        .spawn(move || {
            let context = logwise::context::Context::new_task(Some(prior_context), label.to_string());
            let id = context.context_id();
            context.set_current();
            let result = catch_unwind(AssertUnwindSafe(f))
                .unwrap_or_else(|_| Err(Error::decode(format!("{label} thread panicked"))));
            sender.send(result);
            logwise::context::Context::pop(id);
        });
    let failure = spawned
        .err()
        .map(|e| Error::TransportFailure(format!("can't start {label} thread: {e}")));
    async move {
        match failure {
            Some(e) => Err(e),
            None => future.await,
        }
    }
}

/// What a finished decode or transcode hands to [`TextureLoader::upload`].
#[derive(Debug)]
enum Decoded {
    Pixels(PixelSource),
    Data(TextureData),
}

/**
A decoded or transcoded texture waiting for upload.

Produced by [`TextureLoader::prepare_url`] and [`TextureLoader::prepare_bytes`].
*/
#[derive(Debug)]
pub struct PreparedTexture {
    decoded: Decoded,
    options: LoadOptions,
}

impl PreparedTexture {
    /// Size of the base level.
    pub fn size(&self) -> (u32, u32) {
        match &self.decoded {
            Decoded::Pixels(source) => (source.width, source.height),
            Decoded::Data(data) => (data.width(), data.height()),
        }
    }

    /// True when a container worker produced this texture.
    pub fn is_transcoded(&self) -> bool {
        matches!(self.decoded, Decoded::Data(_))
    }
}

/// The off-thread half of a load, before it is awaited.
enum Started<D, T> {
    Decode(D),
    Transcode(T),
}

/**
Loads textures through a [`TextureClient`].

Loading happens in two halves.  [`prepare_url`](Self::prepare_url) and
[`prepare_bytes`](Self::prepare_bytes) borrow the loader only long enough to post the work; the
futures they return own everything they need, so several can be in flight while the loader is
still usable (or destroyed).  [`upload`](Self::upload) then borrows the client mutably to create
the texture.  [`load_url`](Self::load_url) and [`load_bytes`](Self::load_bytes) do both in one call.

# Example

```no_run
# async fn example<C: texture_transit::TextureClient>(client: C) -> Result<(), texture_transit::Error> {
use texture_transit::{LoadOptions, LoaderConfig, TextureLoader};

let config = LoaderConfig::new(async_file::Priority::unit_test());
let mut loader = TextureLoader::new(client, config)?;
let stone = loader.prepare_url("textures/stone.ktx2", LoadOptions::default());
let moss = loader.prepare_url("textures/moss.png", LoadOptions::default());
let stone = loader.upload(stone.await?).await?;
let moss = loader.upload(moss.await?).await?;
println!("{}x{} with {} levels", stone.width, stone.height, stone.mip_level_count);
println!("{}x{}", moss.width, moss.height);
# Ok(())
# }
```
*/
#[derive(Debug)]
pub struct TextureLoader<C: TextureClient> {
    client: C,
    registry: LoaderRegistry,
    config: LoaderConfig,
    destroyed: Arc<AtomicBool>,
}

impl<C: TextureClient> TextureLoader<C> {
    /// A loader that reads files with [`FileFetch`].
    pub fn new(client: C, config: LoaderConfig) -> Result<Self, Error> {
        let fetch = Arc::new(FileFetch::new(config.priority));
        Self::with_registry(client, config, LoaderRegistry::new(fetch)?)
    }

    /// A loader with a caller-supplied fetch.
    pub fn with_fetch(client: C, config: LoaderConfig, fetch: Arc<dyn Fetch>) -> Result<Self, Error> {
        Self::with_registry(client, config, LoaderRegistry::new(fetch)?)
    }

    pub fn with_registry(
        client: C,
        config: LoaderConfig,
        registry: LoaderRegistry,
    ) -> Result<Self, Error> {
        logwise::info_sync!(
            "texture loader ready, compressed formats {allowed}",
            allowed = config.allow_compressed
        );
        Ok(TextureLoader {
            client,
            registry,
            config,
            destroyed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    pub fn registry(&self) -> &LoaderRegistry {
        &self.registry
    }

    fn check_alive(&self) -> Result<(), Error> {
        if self.destroyed.load(Ordering::Acquire) {
            Err(Error::Destroyed)
        } else {
            Ok(())
        }
    }

    /**
    Starts decoding or transcoding the texture at `url`.  The type comes from `options` or the
    URL's extension.

    The returned future does not borrow the loader.
    */
    pub fn prepare_url(
        &self,
        url: &str,
        options: LoadOptions,
    ) -> impl Future<Output = Result<PreparedTexture, Error>> + use<C> {
        let source_type = options
            .source_type
            .or_else(|| SourceType::from_url(url))
            .ok_or_else(|| Error::UnknownFormat(format!("can't tell what {url} is")));
        self.prepare(RequestSource::Url(url.to_string()), source_type, options)
    }

    /// Starts decoding or transcoding bytes already in memory.
    pub fn prepare_bytes(
        &self,
        bytes: Vec<u8>,
        source_type: SourceType,
        options: LoadOptions,
    ) -> impl Future<Output = Result<PreparedTexture, Error>> + use<C> {
        self.prepare(RequestSource::Bytes(bytes), Ok(source_type), options)
    }

    fn prepare(
        &self,
        source: RequestSource,
        source_type: Result<SourceType, Error>,
        options: LoadOptions,
    ) -> impl Future<Output = Result<PreparedTexture, Error>> + use<C> {
        let destroyed = self.destroyed.clone();
        let started = self.check_alive().and(source_type).map(|source_type| {
            if let RequestSource::Url(url) = &source {
                logwise::info_sync!(
                    "loading {url} as {kind}",
                    url = logwise::privacy::LogIt(url),
                    kind = logwise::privacy::LogIt(source_type)
                );
            }
            match source_type {
                SourceType::Image(image_type) => {
                    let fetch = self.registry.fetch().clone();
                    Started::Decode(off_thread("decode", move || {
                        let bytes = match source {
                            RequestSource::Url(url) => fetch.fetch(&url)?,
                            RequestSource::Bytes(bytes) => bytes,
                        };
                        decode_image(&bytes, image_type)
                    }))
                }
                SourceType::Container(family) => Started::Transcode(self.registry.transcode(
                    family,
                    source,
                    self.requested_formats(),
                    options.mipmaps,
                )),
            }
        });
        async move {
            let decoded = match started? {
                Started::Decode(decode) => Decoded::Pixels(decode.await?),
                Started::Transcode(transcode) => Decoded::Data(transcode.await?),
            };
            // decode threads can't be cancelled; drop what they produced
            if destroyed.load(Ordering::Acquire) {
                return Err(Error::Destroyed);
            }
            Ok(PreparedTexture { decoded, options })
        }
    }

    /// Creates the texture for a prepared load.
    pub async fn upload(
        &mut self,
        prepared: PreparedTexture,
    ) -> Result<TextureResult<C::Texture>, Error> {
        self.check_alive()?;
        let options = prepared.options;
        match prepared.decoded {
            Decoded::Pixels(source) => {
                let format = if options.srgb {
                    PixelFormat::Rgba8UnormSrgb
                } else {
                    PixelFormat::Rgba8Unorm
                };
                self.client
                    .create_from_pixel_source(&source, format, options.mipmaps)
                    .await
            }
            Decoded::Data(data) => {
                let data = match data.format().to_srgb() {
                    Some(srgb)
                        if options.srgb && self.client.supported_formats(true).contains(&srgb) =>
                    {
                        data.retag(srgb)
                    }
                    _ => data,
                };
                self.client
                    .create_from_texture_data(data, options.mipmaps)
                    .await
            }
        }
    }

    /// Loads the texture at `url`, holding the loader until it is uploaded.
    pub async fn load_url(
        &mut self,
        url: &str,
        options: LoadOptions,
    ) -> Result<TextureResult<C::Texture>, Error> {
        let prepared = self.prepare_url(url, options).await?;
        self.upload(prepared).await
    }

    /// Loads a texture from bytes already in memory.
    pub async fn load_bytes(
        &mut self,
        bytes: Vec<u8>,
        source_type: SourceType,
        options: LoadOptions,
    ) -> Result<TextureResult<C::Texture>, Error> {
        let prepared = self.prepare_bytes(bytes, source_type, options).await?;
        self.upload(prepared).await
    }

    fn requested_formats(&self) -> Vec<PixelFormat> {
        self.client.supported_formats(self.config.allow_compressed)
    }

    /// Rejects every outstanding request with [`Error::Destroyed`] and stops background
    /// threads.  Later loads fail with the same error.
    pub fn destroy(&mut self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.registry.shutdown();
    }
}

impl<C: TextureClient> Drop for TextureLoader<C> {
    fn drop(&mut self) {
        self.destroy();
    }
}
