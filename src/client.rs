//! A request/response style facade over a [`RequestsManager`].
//!
//! [`FtpClient`] turns the event driven API of the manager into plain async calls. Every call
//! queues a request, starts processing and waits for the event that finishes it. Calls made
//! concurrently still run one after the other, like every request of a manager.

use crate::{
    error::{ErrorCode, FtpError},
    listing::ListEntry,
    manager::{ManagerError, RequestsManager, RequestsManagerBuilder},
    notification::{EventMeta, RequestEvent, RequestListener},
    request::{Request, RequestState},
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::sync::oneshot;
use uuid::Uuid;

/// Receives progress updates, as a percentage between 0.0 and 100.0.
pub type ProgressCallback = Arc<dyn Fn(f32) + Send + Sync>;

/// Simple async access to one FTP host.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use unftp_client::FtpClient;
/// use unftp_transport_fs::Filesystem;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let dir = std::env::temp_dir().join("unftp-client-doc");
/// std::fs::create_dir_all(&dir).unwrap();
/// let client = FtpClient::new("localhost", Arc::new(Filesystem::new(&dir))).unwrap();
/// client.upload(bytes::Bytes::from_static(b"hello"), "/hello.txt", None).await.unwrap();
/// assert_eq!(client.download("/hello.txt", None).await.unwrap(), "hello");
/// # }
/// ```
#[derive(Debug)]
pub struct FtpClient {
    manager: RequestsManager,
    waiters: Arc<Waiters>,
}

impl FtpClient {
    /// Creates a client for `hostname` that logs in anonymously.
    pub fn new(hostname: impl Into<String>, transport: Arc<dyn unftp_client_core::transport::Transport>) -> Result<FtpClient, ManagerError> {
        FtpClient::with_builder(RequestsManager::builder(hostname, transport))
    }

    /// Creates a client from a configured builder. The listener, data source and autostart
    /// settings of the builder are replaced by the client's own.
    pub fn with_builder(mut builder: RequestsManagerBuilder) -> Result<FtpClient, ManagerError> {
        let waiters = Arc::new(Waiters::default());
        builder.data_source = None;
        let manager = builder.listener(&waiters).autostart(false).build()?;
        Ok(FtpClient { manager, waiters })
    }

    /// The manager doing the work
    pub fn manager(&self) -> &RequestsManager {
        &self.manager
    }

    /// Lists the content of a directory.
    pub async fn list(&self, path: &str) -> Result<Vec<ListEntry>, FtpError> {
        let (tx, rx) = oneshot::channel();
        let request = self
            .waiters
            .register(|| self.manager.add_request_for_list_directory(path), Waiter::Listing(tx));
        self.manager.start_processing_requests();
        self.outcome(&request, rx).await
    }

    /// Downloads a file into memory.
    pub async fn download(&self, path: &str, progress: Option<ProgressCallback>) -> Result<Bytes, FtpError> {
        let staging = staging_file("download");
        let (tx, rx) = oneshot::channel();
        let local = staging.clone();
        let request = self.waiters.register(
            || self.manager.add_request_for_download_file(path, local),
            Waiter::Download { tx, staging, progress },
        );
        self.manager.start_processing_requests();
        self.outcome(&request, rx).await
    }

    /// Uploads `data` to `path`.
    pub async fn upload(&self, data: Bytes, path: &str, progress: Option<ProgressCallback>) -> Result<(), FtpError> {
        let staging = staging_file("upload");
        tokio::fs::write(&staging, &data)
            .await
            .map_err(|e| FtpError::from_io_or(e, ErrorCode::CantReadStream))?;
        let (tx, rx) = oneshot::channel();
        let local = staging.clone();
        let request = self.waiters.register(
            || self.manager.add_request_for_upload_file(local, path),
            Waiter::Upload { tx, staging, progress },
        );
        self.manager.start_processing_requests();
        self.outcome(&request, rx).await
    }

    // Waits for the event that finishes the request. A request that was cancelled silently never
    // gets one, so its waiter is failed here.
    async fn outcome<T>(&self, request: &Request, mut rx: oneshot::Receiver<Result<T, FtpError>>) -> Result<T, FtpError> {
        tokio::select! {
            result = &mut rx => return result.unwrap_or_else(|_| Err(FtpError::new(ErrorCode::Cancelled))),
            _ = request.finished() => {}
        }
        let silenced = request.state() == RequestState::Cancelled && request.cancel_does_not_call_delegate();
        let waiter = if silenced { self.waiters.take(request.id()) } else { None };
        if let Some(waiter) = waiter {
            waiter.fail(FtpError::new(ErrorCode::Cancelled)).await;
        }
        rx.await.unwrap_or_else(|_| Err(FtpError::new(ErrorCode::Cancelled)))
    }
}

fn staging_file(kind: &str) -> PathBuf {
    std::env::temp_dir().join(format!("unftp-client-{}.{}", Uuid::new_v4(), kind))
}

enum Waiter {
    Listing(oneshot::Sender<Result<Vec<ListEntry>, FtpError>>),
    Download {
        tx: oneshot::Sender<Result<Bytes, FtpError>>,
        staging: PathBuf,
        progress: Option<ProgressCallback>,
    },
    Upload {
        tx: oneshot::Sender<Result<(), FtpError>>,
        staging: PathBuf,
        progress: Option<ProgressCallback>,
    },
}

impl Waiter {
    // Delivers a failure and cleans up. The staging file may not exist, which is fine.
    async fn fail(self, error: FtpError) {
        match self {
            Waiter::Listing(tx) => {
                let _ = tx.send(Err(error));
            }
            Waiter::Download { tx, staging, .. } => {
                let _ = tokio::fs::remove_file(&staging).await;
                let _ = tx.send(Err(error));
            }
            Waiter::Upload { tx, staging, .. } => {
                let _ = tokio::fs::remove_file(&staging).await;
                let _ = tx.send(Err(error));
            }
        }
    }
}

// The client's listener: routes events to the calls waiting for them.
#[derive(Default)]
struct Waiters {
    pending: Mutex<HashMap<Uuid, Waiter>>,
}

impl std::fmt::Debug for Waiters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner).len();
        f.debug_struct("Waiters").field("pending", &pending).finish()
    }
}

impl Waiters {
    // Queues the request while holding the map so that its events can't overtake the waiter.
    fn register<F>(&self, add: F, waiter: Waiter) -> Arc<Request>
    where
        F: FnOnce() -> Arc<Request>,
    {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let request = add();
        pending.insert(request.id(), waiter);
        request
    }

    fn take(&self, id: Uuid) -> Option<Waiter> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).remove(&id)
    }

    // The callback runs without the map locked, it may call back into the client.
    fn progress(&self, id: Uuid, percent: f32) {
        let callback = match self.pending.lock().unwrap_or_else(PoisonError::into_inner).get(&id) {
            Some(Waiter::Download { progress: Some(f), .. } | Waiter::Upload { progress: Some(f), .. }) => Some(Arc::clone(f)),
            _ => None,
        };
        if let Some(f) = callback {
            f(percent);
        }
    }
}

#[async_trait]
impl RequestListener for Waiters {
    async fn receive_request_event(&self, e: RequestEvent, _m: EventMeta) {
        match e {
            RequestEvent::ListedDetails { request, entries } => {
                if let Some(Waiter::Listing(tx)) = self.take(request.id()) {
                    let _ = tx.send(Ok(entries));
                }
            }
            RequestEvent::Progress { request, percent } => self.progress(request.id(), percent),
            RequestEvent::Downloaded { request, .. } => {
                if let Some(Waiter::Download { tx, staging, .. }) = self.take(request.id()) {
                    let result = tokio::fs::read(&staging)
                        .await
                        .map(Bytes::from)
                        .map_err(|e| FtpError::from_io_or(e, ErrorCode::CantReadStream));
                    let _ = tokio::fs::remove_file(&staging).await;
                    let _ = tx.send(result);
                }
            }
            RequestEvent::Uploaded { request, .. } => {
                if let Some(Waiter::Upload { tx, staging, .. }) = self.take(request.id()) {
                    let _ = tokio::fs::remove_file(&staging).await;
                    let _ = tx.send(Ok(()));
                }
            }
            RequestEvent::Failed { request, error } => {
                if let Some(waiter) = self.take(request.id()) {
                    waiter.fail(error).await;
                }
            }
            RequestEvent::LocalWriteFailed { request, error, .. } => {
                if let Some(waiter) = self.take(request.id()) {
                    waiter.fail(FtpError::with_source(ErrorCode::CantWriteStream, error)).await;
                }
            }
            _ => {}
        }
    }
}
