//! Contains the [`RequestsManager`]: the queue of requests for one FTP host and the pump that
//! runs them, one at a time.

mod builder;
mod error;

pub use builder::RequestsManagerBuilder;
pub use error::ManagerError;

use crate::{
    notification::RequestEvent,
    queue::RequestQueue,
    request::{Context, Operation, Request},
};
use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::runtime::Handle;
use unftp_client_core::transport::{Credentials, DataMode, Transport};

/// Queues requests for a single host and executes them strictly one after the other, in the
/// order they were added.
///
/// The manager is a cheap handle: clones share the same queue. Adding requests doesn't start
/// anything unless the manager was built with
/// [`autostart`](RequestsManagerBuilder::autostart); call
/// [`start_processing_requests`](Self::start_processing_requests) to run the queue. Events are
/// delivered to the listener given to the builder.
#[derive(Clone)]
pub struct RequestsManager {
    inner: Arc<Inner>,
}

struct Inner {
    hostname: String,
    credentials: Option<Credentials>,
    mode: DataMode,
    autostart: bool,
    state: Mutex<PumpState>,
    // Held by the worker for as long as it executes a request. Makes sure a request started after
    // a stop never overlaps with the one that was stopped.
    slot: tokio::sync::Mutex<()>,
    runtime: Handle,
    ctx: Context,
}

struct PumpState {
    queue: RequestQueue,
    current: Option<Arc<Request>>,
    processing: bool,
}

impl RequestsManager {
    /// Creates a manager that logs in with the given credentials. Use
    /// [`builder`](Self::builder) for more options.
    pub fn new(
        hostname: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Result<RequestsManager, ManagerError> {
        RequestsManagerBuilder::new(hostname, transport).credentials(username, password).build()
    }

    /// Starts building a manager.
    pub fn builder(hostname: impl Into<String>, transport: Arc<dyn Transport>) -> RequestsManagerBuilder {
        RequestsManagerBuilder::new(hostname, transport)
    }

    /// The host requests are sent to
    pub fn hostname(&self) -> &str {
        &self.inner.hostname
    }

    /// Queues a directory listing. The path is treated as a directory.
    pub fn add_request_for_list_directory(&self, path: &str) -> Arc<Request> {
        self.inner.add(Operation::ListDirectory, &as_directory(path))
    }

    /// Queues the creation of a directory.
    pub fn add_request_for_create_directory(&self, path: &str) -> Arc<Request> {
        self.inner.add(Operation::CreateDirectory, &as_directory(path))
    }

    /// Queues the removal of a file.
    pub fn add_request_for_delete_file(&self, path: &str) -> Arc<Request> {
        self.inner.add(Operation::DeleteFileOrDirectory, path.trim_end_matches('/'))
    }

    /// Queues the removal of a directory.
    pub fn add_request_for_delete_directory(&self, path: &str) -> Arc<Request> {
        self.inner.add(Operation::DeleteFileOrDirectory, &as_directory(path))
    }

    /// Queues the download of `remote_path` into `local_path`.
    pub fn add_request_for_download_file(&self, remote_path: &str, local_path: impl Into<PathBuf>) -> Arc<Request> {
        self.inner.add(
            Operation::Download {
                local_path: local_path.into(),
            },
            remote_path,
        )
    }

    /// Queues the upload of `local_path` to `remote_path`. The data comes from the manager's
    /// [`DataSource`](crate::DataSource).
    pub fn add_request_for_upload_file(&self, local_path: impl Into<PathBuf>, remote_path: &str) -> Arc<Request> {
        self.inner.add(
            Operation::Upload {
                local_path: local_path.into(),
            },
            remote_path,
        )
    }

    /// Starts running queued requests. Does nothing if the manager is already processing or the
    /// queue is empty.
    pub fn start_processing_requests(&self) {
        let mut state = self.inner.state();
        self.inner.start(&mut state);
    }

    /// Cancels the running request and drops everything that is queued. Nothing is reported for
    /// the requests affected.
    pub fn stop_and_cancel_all_requests(&self) {
        let mut state = self.inner.state();
        if let Some(current) = state.current.take() {
            current.cancel_with(true);
        }
        for request in state.queue.all_items() {
            request.discard();
        }
        state.queue.clear();
        state.processing = false;
        slog::info!(self.inner.ctx.logger, "Stopped and cancelled all requests");
    }

    /// Cancels one request. A running request stops at its next chunk boundary and is reported
    /// as failed with [`ErrorCode::Cancelled`](crate::ErrorCode::Cancelled), after which the next
    /// request starts. A queued request is taken out of the queue without notification. Returns
    /// false if the request is neither running nor queued.
    pub fn cancel_request(&self, request: &Arc<Request>) -> bool {
        let mut state = self.inner.state();
        if state.current.as_ref().is_some_and(|c| Arc::ptr_eq(c, request)) {
            request.cancel_with(false);
            return true;
        }
        if state.queue.remove(request) {
            request.discard();
            return true;
        }
        false
    }

    /// The number of requests waiting in the queue. The running request is not counted.
    pub fn remaining_requests(&self) -> usize {
        self.inner.state().queue.count()
    }

    /// Returns true while the manager runs its queue.
    pub fn is_processing(&self) -> bool {
        self.inner.state().processing
    }

    /// The request being executed, if any
    pub fn current_request(&self) -> Option<Arc<Request>> {
        self.inner.state().current.clone()
    }

    /// A snapshot of the queued requests in the order they will run
    pub fn queued_requests(&self) -> Vec<Arc<Request>> {
        self.inner.state().queue.all_items()
    }
}

impl std::fmt::Debug for RequestsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestsManager")
            .field("hostname", &self.inner.hostname)
            .field("transport", &self.inner.ctx.transport.name())
            .field("remaining_requests", &self.remaining_requests())
            .finish()
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, PumpState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add(self: &Arc<Self>, operation: Operation, path: &str) -> Arc<Request> {
        let request = Arc::new(Request::new(operation, path, &self.hostname, self.credentials.clone(), self.mode));
        let mut state = self.state();
        state.queue.enqueue(Arc::clone(&request));
        self.ctx.events.send(RequestEvent::Scheduled {
            request: Arc::clone(&request),
        });
        slog::debug!(self.ctx.logger, "Request scheduled";
            "request-id" => request.id().to_string(),
            "operation" => request.operation().name(),
            "path" => request.path()
        );
        if self.autostart {
            self.start(&mut state);
        }
        request
    }

    fn start(self: &Arc<Self>, state: &mut PumpState) {
        if state.processing || state.queue.is_empty() {
            return;
        }
        state.processing = true;
        self.advance(state);
    }

    // Hands the head of the queue to a worker, or winds down when there is nothing left.
    fn advance(self: &Arc<Self>, state: &mut PumpState) {
        let Some(request) = state.queue.dequeue() else {
            state.processing = false;
            state.current = None;
            slog::info!(self.ctx.logger, "Request queue completed");
            self.ctx.events.send(RequestEvent::QueueCompleted);
            return;
        };
        state.current = Some(Arc::clone(&request));
        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            {
                let _slot = inner.slot.lock().await;
                request.execute(&inner.ctx).await;
            }
            inner.finished(&request);
        });
    }

    fn finished(self: &Arc<Self>, request: &Arc<Request>) {
        let mut state = self.state();
        if !state.current.as_ref().is_some_and(|c| Arc::ptr_eq(c, request)) {
            // Stopped while running, the pump moved on without it.
            return;
        }
        state.current = None;
        if state.processing {
            self.advance(&mut state);
        }
    }
}

fn as_directory(path: &str) -> String {
    if path.ends_with('/') { path.to_string() } else { format!("{}/", path) }
}
