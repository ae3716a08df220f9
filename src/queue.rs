//! The FIFO queue holding requests that have not been started yet.

use crate::request::Request;
use std::collections::VecDeque;
use std::sync::Arc;

/// A first-in first-out container of pending requests. Insertion order is processing order. The
/// queue does not prevent the same request from being added twice; identity is compared by
/// pointer.
#[derive(Debug, Default)]
pub struct RequestQueue {
    items: VecDeque<Arc<Request>>,
}

impl RequestQueue {
    /// Creates an empty queue
    pub fn new() -> Self {
        RequestQueue::default()
    }

    /// Appends a request at the tail.
    pub fn enqueue(&mut self, request: Arc<Request>) {
        self.items.push_back(request);
    }

    /// Removes and returns the request at the head.
    pub fn dequeue(&mut self) -> Option<Arc<Request>> {
        self.items.pop_front()
    }

    /// Removes the first occurrence of the given request, keeping the order of the others.
    /// Returns false if it wasn't queued.
    pub fn remove(&mut self, request: &Arc<Request>) -> bool {
        match self.items.iter().position(|r| Arc::ptr_eq(r, request)) {
            Some(idx) => self.items.remove(idx).is_some(),
            None => false,
        }
    }

    /// Returns a snapshot of the queued requests in processing order.
    pub fn all_items(&self) -> Vec<Arc<Request>> {
        self.items.iter().cloned().collect()
    }

    /// The number of queued requests
    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drops all queued requests.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}
