// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Matches transcode responses to the requests that caused them.

The pending-request table is owned by a single router thread.  Registrations, worker responses,
and shutdown all reach it as messages on one channel, so a request is always registered before
its response is handled as long as the caller registers before posting to a worker.
*/

use crate::error::Error;
use crate::texture_data::TextureData;
use crate::transcode::{RequestId, TranscodeResponse};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

type Outcome = Result<TextureData, Error>;

/// Lifecycle of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Resolved,
    Rejected,
}

enum Message {
    Register {
        id: RequestId,
        sender: r#continue::Sender<Outcome>,
    },
    Response(TranscodeResponse),
    Shutdown,
}

/// Pending requests by id.
///
/// Each entry is completed exactly once and removed when it is.
#[derive(Default)]
pub struct RequestTable {
    pending: HashMap<RequestId, r#continue::Sender<Outcome>>,
}

impl std::fmt::Debug for RequestTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestTable")
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl RequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn state(&self, id: RequestId) -> Option<RequestState> {
        self.pending.get(&id).map(|_| RequestState::Pending)
    }

    /// Adds a pending request.  A duplicate id rejects the newer registration.
    pub fn register(&mut self, id: RequestId, sender: r#continue::Sender<Outcome>) {
        if self.pending.contains_key(&id) {
            logwise::warn_sync!("duplicate request id {id}", id = id.0);
            sender.send(Err(Error::TransportFailure(format!(
                "request id {} is already pending",
                id.0
            ))));
            return;
        }
        self.pending.insert(id, sender);
    }

    /// Completes the request `response` answers.
    ///
    /// Returns `None` when no such request is pending; the response is dropped.
    pub fn complete(&mut self, response: TranscodeResponse) -> Option<RequestState> {
        let TranscodeResponse { id, outcome } = response;
        let Some(sender) = self.pending.remove(&id) else {
            logwise::warn_sync!("response for unknown request {id}", id = id.0);
            return None;
        };
        let state = if outcome.is_ok() {
            RequestState::Resolved
        } else {
            RequestState::Rejected
        };
        sender.send(outcome);
        Some(state)
    }

    /// Rejects every pending request with `error`.
    pub fn reject_all(&mut self, error: Error) -> usize {
        let count = self.pending.len();
        for (_, sender) in self.pending.drain() {
            sender.send(Err(error.clone()));
        }
        count
    }
}

/// Where workers send their responses.
#[derive(Debug, Clone)]
pub struct Responder {
    sender: Sender<Message>,
}

impl Responder {
    /// Delivers a response.  Fails once the coordinator is gone.
    pub fn respond(&self, response: TranscodeResponse) -> Result<(), Error> {
        self.sender
            .send(Message::Response(response))
            .map_err(|_| Error::Destroyed)
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Register { id, .. } => write!(f, "Register({})", id.0),
            Message::Response(r) => write!(f, "Response({})", r.id.0),
            Message::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Owns the router thread.
///
/// Dropping the coordinator rejects every pending request with [`Error::Destroyed`].
#[derive(Debug)]
pub struct Coordinator {
    sender: Sender<Message>,
    next_id: AtomicU64,
    router: Option<JoinHandle<()>>,
}

fn route(receiver: Receiver<Message>) {
    let mut table = RequestTable::new();
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Register { id, sender } => table.register(id, sender),
            Message::Response(response) => {
                table.complete(response);
            }
            Message::Shutdown => break,
        }
    }
    let rejected = table.reject_all(Error::Destroyed);
    logwise::info_sync!("router stopped, rejected {rejected} pending", rejected = rejected);
}

impl Coordinator {
    pub fn new() -> Result<Self, Error> {
        let (sender, receiver) = mpsc::channel();
        let prior_context = logwise::context::Context::current();
        let router = std::thread::Builder::new()
            .name("texture_transit_router".to_string())
            .spawn(move || {
                let context =
                    logwise::context::Context::new_task(Some(prior_context), "transcode router".to_string());
                context.set_current();
                route(receiver);
            })
            .map_err(|e| Error::TransportFailure(format!("can't start router: {e}")))?;
        Ok(Coordinator {
            sender,
            next_id: AtomicU64::new(1),
            router: Some(router),
        })
    }

    /// A fresh request id.  Ids are never reused by one coordinator.
    pub fn next_id(&self) -> RequestId {
        RequestId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn responder(&self) -> Responder {
        Responder {
            sender: self.sender.clone(),
        }
    }

    /// Registers `id` and returns a future for its outcome.
    ///
    /// Register before posting the request to a worker.
    pub fn register(&self, id: RequestId) -> impl Future<Output = Outcome> + use<> {
        let (sender, future) = r#continue::continuation();
        if let Err(mpsc::SendError(Message::Register { sender, .. })) =
            self.sender.send(Message::Register { id, sender })
        {
            sender.send(Err(Error::Destroyed));
        }
        future
    }

    /// False once [`shutdown`](Self::shutdown) has run.
    pub fn is_running(&self) -> bool {
        self.router.is_some()
    }

    /// Stops the router, rejecting everything still pending.
    pub fn shutdown(&mut self) {
        let Some(router) = self.router.take() else {
            return;
        };
        // the router may already be gone if it panicked
        _ = self.sender.send(Message::Shutdown);
        if router.join().is_err() {
            logwise::error_sync!("router thread panicked");
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel_formats::PixelFormat;
    use crate::texture_data::TextureKind;

    fn data() -> TextureData {
        TextureData::pack(
            PixelFormat::Rgba8Unorm,
            TextureKind::D2,
            1,
            1,
            1,
            vec![vec![1, 2, 3, 4]],
        )
        .unwrap()
    }

    #[test]
    fn table_completes_once() {
        let mut table = RequestTable::new();
        let (sender, future) = r#continue::continuation();
        table.register(RequestId(1), sender);
        assert_eq!(table.state(RequestId(1)), Some(RequestState::Pending));
        let state = table.complete(TranscodeResponse {
            id: RequestId(1),
            outcome: Ok(data()),
        });
        assert_eq!(state, Some(RequestState::Resolved));
        assert!(table.is_empty());
        assert_eq!(test_executors::spin_on(future), Ok(data()));

        // a second response for the same id is dropped
        let again = table.complete(TranscodeResponse {
            id: RequestId(1),
            outcome: Err(Error::NoSupportedFormat),
        });
        assert_eq!(again, None);
    }

    #[test]
    fn table_rejects() {
        let mut table = RequestTable::new();
        let (sender, future) = r#continue::continuation();
        table.register(RequestId(4), sender);
        let state = table.complete(TranscodeResponse {
            id: RequestId(4),
            outcome: Err(Error::NoSupportedFormat),
        });
        assert_eq!(state, Some(RequestState::Rejected));
        assert_eq!(
            test_executors::spin_on(future),
            Err(Error::NoSupportedFormat)
        );
    }

    #[test]
    fn duplicate_ids_are_refused() {
        let mut table = RequestTable::new();
        let (first, _first_future) = r#continue::continuation();
        let (second, second_future) = r#continue::continuation();
        table.register(RequestId(2), first);
        table.register(RequestId(2), second);
        assert_eq!(table.len(), 1);
        assert!(test_executors::spin_on(second_future).is_err());
        table.reject_all(Error::Destroyed);
    }

    #[test]
    fn out_of_order_responses() {
        let coordinator = Coordinator::new().unwrap();
        let a = coordinator.next_id();
        let b = coordinator.next_id();
        assert_ne!(a, b);
        let future_a = coordinator.register(a);
        let future_b = coordinator.register(b);
        let responder = coordinator.responder();
        responder
            .respond(TranscodeResponse {
                id: b,
                outcome: Err(Error::NoSupportedFormat),
            })
            .unwrap();
        responder
            .respond(TranscodeResponse {
                id: a,
                outcome: Ok(data()),
            })
            .unwrap();
        assert_eq!(
            test_executors::sleep_on(future_b),
            Err(Error::NoSupportedFormat)
        );
        assert_eq!(test_executors::sleep_on(future_a), Ok(data()));
    }

    #[test]
    fn shutdown_rejects_pending() {
        let mut coordinator = Coordinator::new().unwrap();
        let id = coordinator.next_id();
        let future = coordinator.register(id);
        coordinator.shutdown();
        assert_eq!(test_executors::sleep_on(future), Err(Error::Destroyed));
        // registering after shutdown fails immediately
        let late = coordinator.register(coordinator.next_id());
        assert_eq!(test_executors::sleep_on(late), Err(Error::Destroyed));
        assert!(coordinator.responder().respond(TranscodeResponse {
            id,
            outcome: Err(Error::Destroyed),
        })
        .is_err());
    }
}
