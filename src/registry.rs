// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Source types and the loader registry.

[`SourceType`] is the lookup table from file extension or MIME type to the code that reads it.
[`LoaderRegistry`] owns the transcode machinery of one loader: the [`Coordinator`] and one
lazily started worker per container family.
*/

use crate::decode::ImageType;
use crate::error::Error;
use crate::fetch::Fetch;
use crate::pixel_formats::PixelFormat;
use crate::texture_data::TextureData;
use crate::transcode::coordinator::Coordinator;
use crate::transcode::worker::WorkerHandle;
use crate::transcode::{
    ContainerFamily, RequestId, RequestSource, TranscodeRequest, TranscodeResponse, Transcoder,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// What kind of file a source is, and therefore who reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceType {
    /// Decoded on the caller's side into a pixel source.
    Image(ImageType),
    /// Parsed and transcoded on a worker.
    Container(ContainerFamily),
}

const EXTENSIONS: [(&str, SourceType); 10] = [
    ("png", SourceType::Image(ImageType::Png)),
    ("jpg", SourceType::Image(ImageType::Jpeg)),
    ("jpeg", SourceType::Image(ImageType::Jpeg)),
    ("gif", SourceType::Image(ImageType::Gif)),
    ("webp", SourceType::Image(ImageType::WebP)),
    ("basis", SourceType::Container(ContainerFamily::Basis)),
    ("ktx2", SourceType::Container(ContainerFamily::Ktx2)),
    ("dds", SourceType::Container(ContainerFamily::Dds)),
    ("tga", SourceType::Container(ContainerFamily::Tga)),
    ("targa", SourceType::Container(ContainerFamily::Tga)),
];

const MIME_TYPES: [(&str, SourceType); 11] = [
    ("image/png", SourceType::Image(ImageType::Png)),
    ("image/jpeg", SourceType::Image(ImageType::Jpeg)),
    ("image/gif", SourceType::Image(ImageType::Gif)),
    ("image/webp", SourceType::Image(ImageType::WebP)),
    ("image/basis", SourceType::Container(ContainerFamily::Basis)),
    ("image/ktx2", SourceType::Container(ContainerFamily::Ktx2)),
    ("image/vnd-ms.dds", SourceType::Container(ContainerFamily::Dds)),
    ("image/x-dds", SourceType::Container(ContainerFamily::Dds)),
    ("image/x-tga", SourceType::Container(ContainerFamily::Tga)),
    ("image/x-targa", SourceType::Container(ContainerFamily::Tga)),
    ("image/tga", SourceType::Container(ContainerFamily::Tga)),
];

impl SourceType {
    /// Looks up a file extension, case-insensitively and without the dot.
    pub fn from_extension(extension: &str) -> Option<SourceType> {
        EXTENSIONS
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(extension))
            .map(|(_, t)| *t)
    }

    /// Looks up a MIME type.  Parameters such as `; charset=` are ignored.
    pub fn from_mime(mime: &str) -> Option<SourceType> {
        let essence = mime.split(';').next().unwrap_or(mime).trim();
        MIME_TYPES
            .iter()
            .find(|(m, _)| m.eq_ignore_ascii_case(essence))
            .map(|(_, t)| *t)
    }

    /// Looks up the extension of a URL or path, ignoring any query or fragment.
    ///
    /// ```
    /// use texture_transit::registry::SourceType;
    /// use texture_transit::transcode::ContainerFamily;
    ///
    /// assert_eq!(
    ///     SourceType::from_url("https://example.com/rock.KTX2?v=3"),
    ///     Some(SourceType::Container(ContainerFamily::Ktx2))
    /// );
    /// assert_eq!(SourceType::from_url("README"), None);
    /// ```
    pub fn from_url(url: &str) -> Option<SourceType> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let file = path.rsplit('/').next().unwrap_or(path);
        let (_, extension) = file.rsplit_once('.')?;
        Self::from_extension(extension)
    }
}

/// Builds the transcoder for a family's worker.
pub type TranscoderFactory =
    Box<dyn Fn(ContainerFamily) -> Result<Box<dyn Transcoder>, Error> + Send + Sync>;

/**
The transcode machinery owned by one loader.

Workers are started the first time their family is needed and live until the registry is
shut down.  Shutting down rejects every outstanding request with [`Error::Destroyed`].
*/
pub struct LoaderRegistry {
    coordinator: Coordinator,
    workers: Mutex<HashMap<ContainerFamily, WorkerHandle>>,
    fetch: Arc<dyn Fetch>,
    factory: TranscoderFactory,
}

impl std::fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderRegistry")
            .field("coordinator", &self.coordinator)
            .field("workers", &self.running_workers())
            .finish_non_exhaustive()
    }
}

impl LoaderRegistry {
    /// A registry using the built-in transcoders.
    pub fn new(fetch: Arc<dyn Fetch>) -> Result<Self, Error> {
        Self::with_factory(fetch, Box::new(ContainerFamily::transcoder))
    }

    /// A registry whose workers get their transcoders from `factory`.
    pub fn with_factory(fetch: Arc<dyn Fetch>, factory: TranscoderFactory) -> Result<Self, Error> {
        Ok(LoaderRegistry {
            coordinator: Coordinator::new()?,
            workers: Mutex::new(HashMap::new()),
            fetch,
            factory,
        })
    }

    pub fn fetch(&self) -> &Arc<dyn Fetch> {
        &self.fetch
    }

    /// Families whose worker has been started.
    pub fn running_workers(&self) -> Vec<ContainerFamily> {
        let workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        workers.keys().copied().collect()
    }

    /// Posts a request to `family`'s worker, starting it if needed.
    fn post(&self, family: ContainerFamily, request: TranscodeRequest) -> Result<(), Error> {
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        let worker = match workers.entry(family) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let transcoder = (self.factory)(family)?;
                logwise::info_sync!(
                    "starting {family} worker",
                    family = logwise::privacy::LogIt(family.name())
                );
                entry.insert(WorkerHandle::spawn(
                    family,
                    transcoder,
                    self.fetch.clone(),
                    self.coordinator.responder(),
                )?)
            }
        };
        worker.post(request).map_err(|_| {
            Error::TransportFailure(format!("{} worker has stopped", family.name()))
        })
    }

    /**
    Transcodes a container on `family`'s worker.

    The request is registered and posted before this returns; the future only waits.
    */
    pub fn transcode(
        &self,
        family: ContainerFamily,
        source: RequestSource,
        supported_formats: Vec<PixelFormat>,
        mipmaps: bool,
    ) -> impl Future<Output = Result<TextureData, Error>> + use<> {
        let id: RequestId = self.coordinator.next_id();
        let outcome = self.coordinator.register(id);
        if !self.coordinator.is_running() {
            return outcome;
        }
        let request = TranscodeRequest {
            id,
            source,
            supported_formats,
            mipmaps,
        };
        if let Err(e) = self.post(family, request) {
            // answer through the coordinator so the entry is cleaned up
            _ = self
                .coordinator
                .responder()
                .respond(TranscodeResponse { id, outcome: Err(e) });
        }
        outcome
    }

    /// Rejects everything outstanding and stops the router.  Workers are detached; each exits
    /// once it notices its queue is closed.
    pub fn shutdown(&mut self) {
        self.coordinator.shutdown();
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        let stopped = workers.len();
        workers.clear();
        logwise::info_sync!("registry shut down, {stopped} workers detached", stopped = stopped);
    }
}

impl Drop for LoaderRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture_data::TextureKind;
    use crate::transcode::{ContainerHeader, PayloadEncoding};

    #[test]
    fn lookups() {
        assert_eq!(
            SourceType::from_extension("JPG"),
            Some(SourceType::Image(ImageType::Jpeg))
        );
        assert_eq!(
            SourceType::from_mime("image/png; charset=binary"),
            Some(SourceType::Image(ImageType::Png))
        );
        assert_eq!(
            SourceType::from_url("file:///textures/stone.dds#frag"),
            Some(SourceType::Container(ContainerFamily::Dds))
        );
        assert_eq!(SourceType::from_url("https://example.com.au/noext"), None);
        assert_eq!(SourceType::from_mime("text/html"), None);
    }

    struct NoFetch;
    impl Fetch for NoFetch {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, Error> {
            Err(Error::TransportFailure(format!("no network for {url}")))
        }
    }

    struct EchoTranscoder;
    impl Transcoder for EchoTranscoder {
        fn parse_header(&mut self, bytes: &[u8]) -> Result<ContainerHeader, Error> {
            Ok(ContainerHeader {
                width: 1,
                height: 1,
                layers: 1,
                kind: TextureKind::D2,
                level_count: 1,
                has_alpha: bytes.len() > 1,
                encoding: PayloadEncoding::Native(PixelFormat::Rgba8Unorm),
            })
        }

        fn transcode(
            &mut self,
            bytes: &[u8],
            _header: &ContainerHeader,
            target: PixelFormat,
            _mipmaps: bool,
        ) -> Result<TextureData, Error> {
            let texel = bytes.first().copied().unwrap_or(0);
            TextureData::pack(target, TextureKind::D2, 1, 1, 1, vec![vec![texel; 4]])
        }
    }

    fn registry() -> LoaderRegistry {
        LoaderRegistry::with_factory(
            Arc::new(NoFetch),
            Box::new(|_: ContainerFamily| -> Result<Box<dyn Transcoder>, Error> {
                Ok(Box::new(EchoTranscoder))
            }),
        )
        .unwrap()
    }

    #[test]
    fn workers_start_lazily() {
        let registry = registry();
        assert!(registry.running_workers().is_empty());
        let future = registry.transcode(
            ContainerFamily::Ktx2,
            RequestSource::Bytes(vec![5]),
            vec![PixelFormat::Rgba8Unorm],
            true,
        );
        let data = test_executors::sleep_on(future).unwrap();
        assert_eq!(data.buffer(), &[5; 4]);
        assert_eq!(registry.running_workers(), vec![ContainerFamily::Ktx2]);
    }

    #[test]
    fn fetch_failures_reach_the_caller() {
        let registry = registry();
        let future = registry.transcode(
            ContainerFamily::Dds,
            RequestSource::Url("https://example.com/a.dds".to_string()),
            vec![PixelFormat::Rgba8Unorm],
            true,
        );
        assert!(test_executors::sleep_on(future).unwrap_err().is_transport());
    }

    #[test]
    fn factory_failures_reach_the_caller() {
        let registry = LoaderRegistry::with_factory(
            Arc::new(NoFetch),
            Box::new(
                |family: ContainerFamily| -> Result<Box<dyn Transcoder>, Error> {
                    Err(Error::unsupported(family.name()))
                },
            ),
        )
        .unwrap();
        let future = registry.transcode(
            ContainerFamily::Basis,
            RequestSource::Bytes(vec![1]),
            vec![PixelFormat::Rgba8Unorm],
            false,
        );
        assert_eq!(
            test_executors::sleep_on(future),
            Err(Error::UnsupportedOperation("basis".to_string()))
        );
        assert!(registry.running_workers().is_empty());
    }

    #[test]
    fn shutdown_refuses_new_work() {
        let mut registry = registry();
        registry.shutdown();
        let future = registry.transcode(
            ContainerFamily::Tga,
            RequestSource::Bytes(vec![1]),
            vec![PixelFormat::Rgba8Unorm],
            false,
        );
        assert_eq!(test_executors::sleep_on(future), Err(Error::Destroyed));
    }
}
