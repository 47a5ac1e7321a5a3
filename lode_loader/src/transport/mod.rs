//! Boundary to whatever actually fetches bytes.
//!
//! A [`Transport`] is handed a [`FetchRequest`] and eventually pushes a [`Completion`] through the
//! [`CompletionSender`] it was given, from any thread. Completions are only acted upon when the
//! owning [`crate::ResourceManager`] drains them during its update.

mod fs;
#[cfg(feature = "http")]
mod http;

use crate::error::TransportError;
use bytes::Bytes;
pub use fs::FsTransport;
#[cfg(feature = "http")]
pub use http::HttpTransport;

/// Identifies a single fetch, a unit re-requesting a resource gets a new ticket
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Ticket(pub(crate) u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub ticket: Ticket,
    /// Path as it is fetched, after any encrypted url mapping
    pub url: String,
}

#[derive(Debug)]
pub struct Completion {
    pub ticket: Ticket,
    pub result: Result<Bytes, TransportError>,
}

/// Sending half of the completion channel, cloned into every fetch
#[derive(Debug, Clone)]
pub struct CompletionSender {
    send: crossbeam_channel::Sender<Completion>,
}

impl CompletionSender {
    pub(crate) fn new(send: crossbeam_channel::Sender<Completion>) -> Self {
        Self { send }
    }

    /// Deliver the outcome of `ticket`
    pub fn complete(&self, ticket: Ticket, result: Result<Bytes, TransportError>) {
        // the manager is gone, nobody is waiting on this anymore
        if self.send.send(Completion { ticket, result }).is_err() {
            tracing::trace!("Dropped completion of {:?}, receiver is gone", ticket);
        }
    }

    /// Completion of `ticket` which reports [`TransportError::Disconnected`] if it is dropped
    /// before being completed, e.g. when the task carrying it is cancelled
    pub fn pending(self, ticket: Ticket) -> PendingCompletion {
        PendingCompletion {
            ticket,
            sender: Some(self),
        }
    }
}

/// Outcome of one fetch which has yet to be delivered
#[derive(Debug)]
pub struct PendingCompletion {
    ticket: Ticket,
    sender: Option<CompletionSender>,
}

impl PendingCompletion {
    pub fn complete(mut self, result: Result<Bytes, TransportError>) {
        if let Some(sender) = self.sender.take() {
            sender.complete(self.ticket, result);
        }
    }
}

impl Drop for PendingCompletion {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            tracing::debug!("{:?} dropped without completing", self.ticket);
            sender.complete(self.ticket, Err(TransportError::Disconnected));
        }
    }
}

pub trait Transport {
    /// Start fetching `request.url`. Must not block, the outcome is reported through
    /// `completions` exactly once.
    fn fetch(&self, request: FetchRequest, completions: CompletionSender);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn fetch(&self, request: FetchRequest, completions: CompletionSender) {
        (**self).fetch(request, completions)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Default)]
    struct ManualInner {
        pending: VecDeque<(FetchRequest, CompletionSender)>,
        history: Vec<String>,
    }

    /// Holds on to every fetch until the test completes it
    #[derive(Clone, Default)]
    pub(crate) struct ManualTransport {
        inner: Rc<RefCell<ManualInner>>,
    }

    impl ManualTransport {
        /// Every url fetched so far, in order
        pub(crate) fn history(&self) -> Vec<String> {
            self.inner.borrow().history.clone()
        }

        pub(crate) fn in_flight(&self) -> Vec<String> {
            self.inner
                .borrow()
                .pending
                .iter()
                .map(|(request, _)| request.url.clone())
                .collect()
        }

        /// Complete the oldest fetch of `url`, returns whether one was pending
        pub(crate) fn complete(&self, url: &str, result: Result<Bytes, TransportError>) -> bool {
            let found = {
                let mut inner = self.inner.borrow_mut();
                let index = inner
                    .pending
                    .iter()
                    .position(|(request, _)| request.url == url);
                index.and_then(|index| inner.pending.remove(index))
            };
            match found {
                Some((request, completions)) => {
                    completions.complete(request.ticket, result);
                    true
                }
                None => false,
            }
        }
    }

    impl Transport for ManualTransport {
        fn fetch(&self, request: FetchRequest, completions: CompletionSender) {
            let mut inner = self.inner.borrow_mut();
            inner.history.push(request.url.clone());
            inner.pending.push_back((request, completions));
        }
    }

    /// Solid red PNG of the given size
    pub(crate) fn png_bytes(width: u32, height: u32) -> Bytes {
        let image = image::RgbaImage::from_pixel(width, height, image::Rgba([255, 0, 0, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        image.write_to(&mut out, image::ImageFormat::Png).unwrap();
        Bytes::from(out.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropped_pending_completion_disconnects() {
        let (send, recv) = crossbeam_channel::unbounded();
        let sender = CompletionSender::new(send);

        sender.clone().pending(Ticket(1)).complete(Ok(Bytes::from_static(b"ok")));
        drop(sender.pending(Ticket(2)));

        let completed = recv.try_recv().unwrap();
        assert_eq!(completed.ticket, Ticket(1));
        assert_eq!(completed.result.unwrap().as_ref(), b"ok");
        let dropped = recv.try_recv().unwrap();
        assert_eq!(dropped.ticket, Ticket(2));
        assert_eq!(dropped.result, Err(TransportError::Disconnected));
        // exactly one completion each
        assert!(recv.try_recv().is_err());
    }
}
