// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Transcode workers.

A worker owns one [`Transcoder`] on a dedicated thread and processes requests in the order
they were posted.  Each request moves through the stages

```text
Fetching → HeaderParsing → FormatSelection → Transcoding → Posting
    └────────────┴──────────────┴────────────────┴──────→ Failed
```

and produces exactly one [`TranscodeResponse`], whichever way it ends.
*/

use crate::error::Error;
use crate::fetch::Fetch;
use crate::transcode::coordinator::Responder;
use crate::transcode::{
    ContainerFamily, RequestSource, TranscodeRequest, TranscodeResponse, Transcoder,
    select_target,
};
use std::borrow::Cow;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

/// Where a request is in its worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStage {
    Fetching,
    HeaderParsing,
    FormatSelection,
    Transcoding,
    Posting,
    Failed,
}

/// Runs one request through every stage.  Never panics; panics inside the transcoder become
/// [`Error::DecodeFailure`].
pub fn process(
    transcoder: &mut dyn Transcoder,
    fetch: &dyn Fetch,
    request: TranscodeRequest,
) -> TranscodeResponse {
    process_staged(transcoder, fetch, request).0
}

/// [`process`], also reporting the stage the request ended in: `Posting` or `Failed`.
fn process_staged(
    transcoder: &mut dyn Transcoder,
    fetch: &dyn Fetch,
    request: TranscodeRequest,
) -> (TranscodeResponse, WorkerStage) {
    let id = request.id;
    let mut stage = WorkerStage::Fetching;
    let outcome = run_stages(transcoder, fetch, request, &mut stage);
    match &outcome {
        Ok(data) => {
            logwise::trace_sync!(
                "request {id} transcoded to {format}, {levels} levels",
                id = id.0,
                format = logwise::privacy::LogIt(data.format()),
                levels = data.level_count()
            );
        }
        Err(e) => {
            logwise::warn_sync!(
                "request {id} failed while {stage}: {e}",
                id = id.0,
                stage = logwise::privacy::LogIt(stage),
                e = logwise::privacy::LogIt(e)
            );
            stage = WorkerStage::Failed;
        }
    }
    (TranscodeResponse { id, outcome }, stage)
}

fn run_stages(
    transcoder: &mut dyn Transcoder,
    fetch: &dyn Fetch,
    request: TranscodeRequest,
    stage: &mut WorkerStage,
) -> Result<crate::texture_data::TextureData, Error> {
    let TranscodeRequest {
        source,
        supported_formats,
        mipmaps,
        ..
    } = request;

    *stage = WorkerStage::Fetching;
    let bytes: Cow<'_, [u8]> = match &source {
        RequestSource::Url(url) => Cow::Owned(fetch.fetch(url)?),
        RequestSource::Bytes(bytes) => Cow::Borrowed(bytes),
    };

    *stage = WorkerStage::HeaderParsing;
    let header = guarded(|| transcoder.parse_header(&bytes))?;

    *stage = WorkerStage::FormatSelection;
    let target = select_target(&header, &supported_formats)?;

    *stage = WorkerStage::Transcoding;
    let _guard = logwise::perfwarn_begin!("transcode");
    let data = guarded(|| transcoder.transcode(&bytes, &header, target, mipmaps))?;

    *stage = WorkerStage::Posting;
    Ok(data)
}

fn guarded<R>(f: impl FnOnce() -> Result<R, Error>) -> Result<R, Error> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "transcoder panicked".to_string());
            Err(Error::decode(message))
        }
    }
}

/// Handle to a running worker thread.
///
/// Dropping the handle lets the thread finish its queue and exit.  The thread is not joined.
#[derive(Debug)]
pub struct WorkerHandle {
    family: ContainerFamily,
    sender: Sender<TranscodeRequest>,
}

impl WorkerHandle {
    /// Starts a worker that answers through `responder`.
    pub fn spawn(
        family: ContainerFamily,
        mut transcoder: Box<dyn Transcoder>,
        fetch: Arc<dyn Fetch>,
        responder: Responder,
    ) -> Result<Self, Error> {
        let (sender, receiver): (Sender<TranscodeRequest>, Receiver<TranscodeRequest>) =
            mpsc::channel();
        let prior_context = logwise::context::Context::current();
        std::thread::Builder::new()
            .name(format!("texture_transit_{}", family.name()))
            .spawn(move || {
                let context =
                    logwise::context::Context::new_task(Some(prior_context), "transcode worker".to_string());
                context.set_current();
                logwise::info_sync!(
                    "{family} worker started",
                    family = logwise::privacy::LogIt(family.name())
                );
                while let Ok(request) = receiver.recv() {
                    let response = process(transcoder.as_mut(), fetch.as_ref(), request);
                    if responder.respond(response).is_err() {
                        break;
                    }
                }
                logwise::info_sync!(
                    "{family} worker exiting",
                    family = logwise::privacy::LogIt(family.name())
                );
            })
            .map_err(|e| Error::TransportFailure(format!("can't start worker: {e}")))?;
        Ok(WorkerHandle { family, sender })
    }

    pub fn family(&self) -> ContainerFamily {
        self.family
    }

    /// Queues a request.  Fails if the worker has exited.
    pub fn post(&self, request: TranscodeRequest) -> Result<(), TranscodeRequest> {
        self.sender.send(request).map_err(|e| e.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel_formats::PixelFormat;
    use crate::texture_data::{TextureData, TextureKind};
    use crate::transcode::{ContainerHeader, PayloadEncoding, RequestId};
    use std::sync::Mutex;

    struct FixedFetch(Vec<u8>);
    impl Fetch for FixedFetch {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, Error> {
            if url == "missing" {
                Err(Error::TransportFailure("404".to_string()))
            } else {
                Ok(self.0.clone())
            }
        }
    }

    /// Treats the first byte as "has alpha" and emits one RGBA8 texel per level.
    struct TinyTranscoder {
        seen: Arc<Mutex<Vec<WorkerStage>>>,
    }
    impl Transcoder for TinyTranscoder {
        fn parse_header(&mut self, bytes: &[u8]) -> Result<ContainerHeader, Error> {
            self.seen.lock().unwrap().push(WorkerStage::HeaderParsing);
            let first = *bytes.first().ok_or_else(|| Error::decode("empty"))?;
            if first == 0xFF {
                panic!("corrupt container");
            }
            Ok(ContainerHeader {
                width: 1,
                height: 1,
                layers: 1,
                kind: TextureKind::D2,
                level_count: 1,
                has_alpha: first == 1,
                encoding: PayloadEncoding::Universal,
            })
        }

        fn transcode(
            &mut self,
            _bytes: &[u8],
            _header: &ContainerHeader,
            target: PixelFormat,
            _mipmaps: bool,
        ) -> Result<TextureData, Error> {
            self.seen.lock().unwrap().push(WorkerStage::Transcoding);
            TextureData::pack(target, TextureKind::D2, 1, 1, 1, vec![vec![0; 4]])
        }
    }

    fn request(source: RequestSource, supported: Vec<PixelFormat>) -> TranscodeRequest {
        TranscodeRequest {
            id: RequestId(7),
            source,
            supported_formats: supported,
            mipmaps: true,
        }
    }

    fn transcoder() -> (TinyTranscoder, Arc<Mutex<Vec<WorkerStage>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (TinyTranscoder { seen: seen.clone() }, seen)
    }

    #[test]
    fn success_runs_every_stage() {
        let (mut t, seen) = transcoder();
        let (response, stage) = process_staged(
            &mut t,
            &FixedFetch(vec![1]),
            request(
                RequestSource::Url("a.ktx2".to_string()),
                vec![PixelFormat::Rgba8Unorm],
            ),
        );
        assert_eq!(response.id, RequestId(7));
        assert_eq!(stage, WorkerStage::Posting);
        assert_eq!(response.outcome.unwrap().format(), PixelFormat::Rgba8Unorm);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![WorkerStage::HeaderParsing, WorkerStage::Transcoding]
        );
    }

    #[test]
    fn fetch_failure_is_one_response() {
        let (mut t, seen) = transcoder();
        let (response, stage) = process_staged(
            &mut t,
            &FixedFetch(vec![1]),
            request(
                RequestSource::Url("missing".to_string()),
                vec![PixelFormat::Rgba8Unorm],
            ),
        );
        assert!(matches!(response.outcome, Err(Error::TransportFailure(_))));
        assert_eq!(stage, WorkerStage::Failed);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn no_supported_format_stops_before_transcoding() {
        let (mut t, seen) = transcoder();
        let (response, stage) = process_staged(
            &mut t,
            &FixedFetch(Vec::new()),
            request(RequestSource::Bytes(vec![0]), Vec::new()),
        );
        assert_eq!(response.outcome, Err(Error::NoSupportedFormat));
        assert_eq!(stage, WorkerStage::Failed);
        assert_eq!(*seen.lock().unwrap(), vec![WorkerStage::HeaderParsing]);
    }

    #[test]
    fn panics_become_decode_failures() {
        let (mut t, _) = transcoder();
        let response = process(
            &mut t,
            &FixedFetch(Vec::new()),
            request(RequestSource::Bytes(vec![0xFF]), vec![PixelFormat::Rgba8Unorm]),
        );
        assert_eq!(
            response.outcome,
            Err(Error::DecodeFailure("corrupt container".to_string()))
        );
    }
}
