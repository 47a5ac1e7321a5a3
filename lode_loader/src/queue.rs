use derivative::Derivative;
use std::collections::VecDeque;

/// What a [`RequestQueue`] drives
pub trait Request {
    /// Whether the transport is not in flight anymore, so the next request may start
    fn is_request_ready(&self) -> bool;

    /// Start the transport, ignored unless the request is still waiting
    fn start_request(&self);
}

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct RequestQueueEntry<R> {
    pub key: String,
    #[derivative(Debug = "ignore")]
    pub value: R,
}

/// Admits requests one at a time, in priority adjusted FIFO order.
///
/// Only the head is ever started, so at most one transport per queue is in flight.
#[derive(Derivative)]
#[derivative(Debug(bound = ""), Default(bound = ""))]
pub struct RequestQueue<R> {
    queue: VecDeque<RequestQueueEntry<R>>,
}

impl<R: Request> RequestQueue<R> {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    pub fn enqueue(&mut self, key: impl Into<String>, value: R) {
        self.queue.push_back(RequestQueueEntry {
            key: key.into(),
            value,
        });
    }

    /// Move the first request under `key` to the front
    pub fn raise_priority(&mut self, key: &str) {
        let Some(index) = self.queue.iter().position(|entry| entry.key == key) else {
            return;
        };
        if let Some(entry) = self.queue.remove(index) {
            self.queue.push_front(entry);
        }
    }

    /// Advance the head, to be called once per frame
    pub fn update(&mut self) {
        let Some(top) = self.queue.front() else {
            return;
        };
        if top.value.is_request_ready() {
            self.queue.pop_front();
            if let Some(next) = self.queue.front() {
                tracing::trace!("Starting queued request {}", next.key);
                next.value.start_request();
            }
        } else {
            top.value.start_request();
        }
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.queue.iter().map(|entry| entry.key.as_str())
    }
}
