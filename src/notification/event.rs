use crate::{error::FtpError, listing::ListEntry, request::Request};
use async_trait::async_trait;
use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Something that happened to a request, or to the queue as a whole. Events of a single manager
/// are delivered one at a time, in the order they happened. To order events across managers see
/// the [`EventMeta`](crate::notification::EventMeta) struct.
#[derive(Debug, Clone)]
pub enum RequestEvent {
    /// The request was added to the queue
    Scheduled {
        /// The request that was added
        request: Arc<Request>,
    },
    /// A directory listing finished. Always directly followed by [`RequestEvent::ListedDetails`].
    ListedNames {
        /// The listing request
        request: Arc<Request>,
        /// The names of the entries, in the order the server sent them
        names: Vec<String>,
    },
    /// A directory listing finished
    ListedDetails {
        /// The listing request
        request: Arc<Request>,
        /// The parsed entries, in the order the server sent them
        entries: Vec<ListEntry>,
    },
    /// A MKD request finished successfully
    DirectoryCreated {
        /// The request that created the directory
        request: Arc<Request>,
    },
    /// A DELE or RMD request finished successfully
    Deleted {
        /// The request that removed the file or directory
        request: Arc<Request>,
    },
    /// An upload finished successfully
    Uploaded {
        /// The upload request
        request: Arc<Request>,
        /// The amount of bytes sent
        bytes: u64,
    },
    /// A download finished successfully
    Downloaded {
        /// The download request
        request: Arc<Request>,
        /// The amount of bytes written to the local file
        bytes: u64,
    },
    /// A transfer of known size moved a chunk
    Progress {
        /// The transferring request
        request: Arc<Request>,
        /// Percentage completed, between 0.0 and 100.0. Never decreases for a request.
        percent: f32,
    },
    /// A transfer of unknown size moved a chunk. Only sent when the manager was configured with
    /// [`ProgressPolicy::ReportBytes`](crate::options::ProgressPolicy::ReportBytes).
    Transferred {
        /// The transferring request
        request: Arc<Request>,
        /// The amount of bytes moved so far
        bytes: u64,
    },
    /// The request failed, or was cancelled without being silenced
    Failed {
        /// The failed request
        request: Arc<Request>,
        /// What went wrong
        error: FtpError,
    },
    /// A download could not write its local file. Sent instead of [`RequestEvent::Failed`].
    LocalWriteFailed {
        /// The download request
        request: Arc<Request>,
        /// The local file
        path: PathBuf,
        /// The error returned by the file system
        error: Arc<io::Error>,
    },
    /// The queue ran empty while processing
    QueueCompleted,
}

impl RequestEvent {
    /// The request this event is about, if any
    pub fn request(&self) -> Option<&Arc<Request>> {
        match self {
            RequestEvent::Scheduled { request }
            | RequestEvent::ListedNames { request, .. }
            | RequestEvent::ListedDetails { request, .. }
            | RequestEvent::DirectoryCreated { request }
            | RequestEvent::Deleted { request }
            | RequestEvent::Uploaded { request, .. }
            | RequestEvent::Downloaded { request, .. }
            | RequestEvent::Progress { request, .. }
            | RequestEvent::Transferred { request, .. }
            | RequestEvent::Failed { request, .. }
            | RequestEvent::LocalWriteFailed { request, .. } => Some(request),
            RequestEvent::QueueCompleted => None,
        }
    }
}

/// Metadata relating to an event. A sequence number is included to allow ordering in systems
/// where event ordering is not guaranteed.
#[derive(Debug, Clone)]
pub struct EventMeta {
    /// The host of the manager that emitted the event
    pub hostname: String,
    /// The event sequence number as incremented per manager
    pub sequence_number: u64,
}

/// A listener for [`RequestEvent`](crate::notification::RequestEvent)s. Implementations can be
/// passed to [`RequestsManagerBuilder::listener`](crate::RequestsManagerBuilder::listener) in
/// order to receive notifications.
#[async_trait]
pub trait RequestListener: Sync + Send + Debug {
    /// Called after the event happened.
    async fn receive_request_event(&self, e: RequestEvent, m: EventMeta);

    /// Called by a download whose local file already exists. Returning false fails the download
    /// with [`ErrorCode::FileAlreadyExists`](crate::ErrorCode::FileAlreadyExists).
    async fn should_overwrite(&self, _request: &Request, _path: &Path) -> bool {
        false
    }
}

#[async_trait]
impl RequestListener for Box<dyn RequestListener> {
    async fn receive_request_event(&self, e: RequestEvent, m: EventMeta) {
        self.as_ref().receive_request_event(e, m).await
    }

    async fn should_overwrite(&self, request: &Request, path: &Path) -> bool {
        self.as_ref().should_overwrite(request, path).await
    }
}

#[async_trait]
impl RequestListener for Arc<dyn RequestListener> {
    async fn receive_request_event(&self, e: RequestEvent, m: EventMeta) {
        self.as_ref().receive_request_event(e, m).await
    }

    async fn should_overwrite(&self, request: &Request, path: &Path) -> bool {
        self.as_ref().should_overwrite(request, path).await
    }
}
