//! Contains the [`Request`] type: one queued operation against the FTP server, together with the
//! code that executes it.

mod delete;
mod download;
mod list;
mod mkd;
mod upload;

use crate::{
    error::{ErrorCode, FtpError},
    listing::ListEntry,
    notification::{EventSender, RequestEvent, RequestListener},
    options::TransferOptions,
    source::DataSource,
};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use slog::Logger;
use std::{
    fmt::{self, Display, Formatter},
    future::Future,
    io,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicBool, Ordering},
    },
};
use unftp_client_core::transport::{self, Credentials, DataMode, Target, Transport};
use tokio::sync::Notify;
use uuid::Uuid;

// Characters escaped in the path component of the full URL. The slash is kept.
const PATH_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// The kind of operation a request performs. Upload and download carry the local side of the
/// exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// List the content of a directory
    ListDirectory,
    /// Create a directory
    CreateDirectory,
    /// Delete a file, or a directory when the remote path ends with a slash
    DeleteFileOrDirectory,
    /// Upload a file
    Upload {
        /// The file whose content is sent
        local_path: PathBuf,
    },
    /// Download a file
    Download {
        /// The file the content is written to
        local_path: PathBuf,
    },
}

impl Operation {
    /// A short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Operation::ListDirectory => "list",
            Operation::CreateDirectory => "mkdir",
            Operation::DeleteFileOrDirectory => "delete",
            Operation::Upload { .. } => "upload",
            Operation::Download { .. } => "download",
        }
    }

    /// True for the operations that move file content over a data channel.
    pub fn exchanges_data(&self) -> bool {
        matches!(self, Operation::Upload { .. } | Operation::Download { .. })
    }
}

/// Where a request is in its lifecycle. The last three states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Queued, not started yet
    Pending,
    /// Being executed
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Cancelled before it could finish
    Cancelled,
}

impl RequestState {
    /// True if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Failed | RequestState::Cancelled)
    }
}

impl Display for RequestState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// The cancellation flags of a request. The transfer buffer of the request observes the same
// instance.
#[derive(Debug, Default)]
pub(crate) struct CancelFlag {
    requested: AtomicBool,
    silent: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    pub(crate) fn request(&self, silent: bool) {
        if silent {
            self.silent.store(true, Ordering::SeqCst);
        }
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    // Resolves once a cancel was requested.
    pub(crate) async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_requested() {
                return;
            }
            notified.await;
        }
    }

    // Runs `fut` to completion unless a cancel is requested first.
    pub(crate) async fn unless_cancelled<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            out = fut => Some(out),
            _ = self.cancelled() => None,
        }
    }

    pub(crate) fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub(crate) fn is_silent(&self) -> bool {
        self.silent.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct Status {
    state: RequestState,
    error: Option<FtpError>,
    percent_completed: f32,
    maximum_size: Option<u64>,
    bytes_sent: u64,
    total_bytes_sent: u64,
    bytes_received: u64,
    total_bytes_received: u64,
    did_open_stream: bool,
}

/// What a transfer looks like after a chunk was moved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Progress {
    pub total: u64,
    pub percent: Option<f32>,
}

/// One operation against the FTP server.
///
/// Requests are created by the [`RequestsManager`](crate::RequestsManager) and handed back to
/// the caller as an `Arc<Request>` that can be inspected and used to cancel the request.
#[derive(Debug)]
pub struct Request {
    id: Uuid,
    operation: Operation,
    path: String,
    hostname: String,
    credentials: Option<Credentials>,
    mode: DataMode,
    cancel: Arc<CancelFlag>,
    status: Mutex<Status>,
    done: Notify,
}

impl Request {
    pub(crate) fn new(operation: Operation, path: &str, hostname: &str, credentials: Option<Credentials>, mode: DataMode) -> Request {
        Request {
            id: Uuid::new_v4(),
            operation,
            path: path.to_string(),
            hostname: hostname.to_string(),
            credentials,
            mode,
            cancel: Arc::new(CancelFlag::default()),
            status: Mutex::new(Status {
                state: RequestState::Pending,
                error: None,
                percent_completed: 0.0,
                maximum_size: None,
                bytes_sent: 0,
                total_bytes_sent: 0,
                bytes_received: 0,
                total_bytes_received: 0,
                did_open_stream: false,
            }),
            done: Notify::new(),
        }
    }

    fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The unique identity of this request
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// What this request does
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// The remote path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The local file of an upload or download
    pub fn local_path(&self) -> Option<&Path> {
        match &self.operation {
            Operation::Upload { local_path } | Operation::Download { local_path } => Some(local_path),
            _ => None,
        }
    }

    /// The host this request is sent to
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Passive or active data connections
    pub fn mode(&self) -> DataMode {
        self.mode
    }

    /// True if data connections are set up in passive mode.
    pub fn passive_mode(&self) -> bool {
        self.mode == DataMode::Passive
    }

    /// The remote path as absolute path on the server.
    pub fn full_remote_path(&self) -> String {
        if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        }
    }

    /// The URL of the remote resource, e.g. `ftp://example.com/some dir/`.
    pub fn full_url(&self) -> String {
        format!("ftp://{}{}", self.hostname, self.full_remote_path())
    }

    /// The URL of the remote resource with the path percent-escaped, e.g.
    /// `ftp://example.com/some%20dir/`.
    pub fn full_url_with_escape(&self) -> String {
        format!("ftp://{}{}", self.hostname, utf8_percent_encode(&self.full_remote_path(), PATH_ESCAPE))
    }

    /// Where the request is in its lifecycle
    pub fn state(&self) -> RequestState {
        self.status().state
    }

    /// The error the request failed with, if it failed
    pub fn error(&self) -> Option<FtpError> {
        self.status().error.clone()
    }

    /// Progress of the data transfer, from 0.0 to 100.0. Stays 0.0 when the total size is not
    /// known.
    pub fn percent_completed(&self) -> f32 {
        self.status().percent_completed
    }

    /// The number of bytes the transfer is expected to move, if known
    pub fn maximum_size(&self) -> Option<u64> {
        self.status().maximum_size
    }

    /// Bytes sent by the last write
    pub fn bytes_sent(&self) -> u64 {
        self.status().bytes_sent
    }

    /// Bytes sent in total
    pub fn total_bytes_sent(&self) -> u64 {
        self.status().total_bytes_sent
    }

    /// Bytes received by the last read
    pub fn bytes_received(&self) -> u64 {
        self.status().bytes_received
    }

    /// Bytes received in total
    pub fn total_bytes_received(&self) -> u64 {
        self.status().total_bytes_received
    }

    /// True while the data channel of the request is open
    pub fn did_open_stream(&self) -> bool {
        self.status().did_open_stream
    }

    /// True if cancelling this request does not produce a failure notification.
    pub fn cancel_does_not_call_delegate(&self) -> bool {
        self.cancel.is_silent()
    }

    /// Asks the request to stop. The request notices at its next chunk boundary and then fails
    /// with [`ErrorCode::Cancelled`]. Prefer
    /// [`RequestsManager::cancel_request`](crate::RequestsManager::cancel_request) which also
    /// takes requests out of the queue.
    pub fn cancel_request(&self) {
        self.cancel.request(false);
    }

    /// Waits until the request reached a terminal state. Returns immediately if it already did.
    pub async fn finished(&self) {
        loop {
            let notified = self.done.notified();
            if self.state().is_terminal() {
                return;
            }
            notified.await;
        }
    }

    pub(crate) fn cancel_with(&self, silent: bool) {
        self.cancel.request(silent);
    }

    pub(crate) fn cancel_flag(&self) -> Arc<CancelFlag> {
        Arc::clone(&self.cancel)
    }

    pub(crate) fn target(&self) -> Target {
        Target {
            host: self.hostname.clone(),
            path: self.path.clone(),
            credentials: self.credentials.clone(),
            mode: self.mode,
        }
    }

    // Pending -> Running. False if the request already reached a terminal state.
    pub(crate) fn begin(&self) -> bool {
        let mut status = self.status();
        match status.state {
            RequestState::Pending => {
                status.state = RequestState::Running;
                true
            }
            _ => false,
        }
    }

    // Moves to a terminal state. False if the request was already in one.
    pub(crate) fn finish(&self, state: RequestState, error: Option<FtpError>) -> bool {
        {
            let mut status = self.status();
            if status.state.is_terminal() {
                return false;
            }
            status.state = state;
            if error.is_some() {
                status.error = error;
            }
            status.did_open_stream = false;
        }
        self.done.notify_waiters();
        true
    }

    // A queued request that is dropped from the queue. Nothing is reported for it.
    pub(crate) fn discard(&self) {
        self.cancel.request(true);
        self.finish(RequestState::Cancelled, None);
    }

    pub(crate) fn set_error(&self, error: FtpError) {
        let mut status = self.status();
        if !status.state.is_terminal() {
            status.error = Some(error);
        }
    }

    pub(crate) fn set_maximum_size(&self, size: Option<u64>) {
        let mut status = self.status();
        if !status.state.is_terminal() {
            status.maximum_size = size.filter(|s| *s > 0);
        }
    }

    pub(crate) fn set_stream_opened(&self, opened: bool) {
        let mut status = self.status();
        if !status.state.is_terminal() {
            status.did_open_stream = opened;
        }
    }

    pub(crate) fn record_sent(&self, bytes: usize) -> Progress {
        let mut status = self.status();
        if !status.state.is_terminal() {
            status.bytes_sent = bytes as u64;
            status.total_bytes_sent += bytes as u64;
        }
        let total = status.total_bytes_sent;
        Progress {
            total,
            percent: Self::advance_percent(&mut status, total),
        }
    }

    pub(crate) fn record_received(&self, bytes: usize) -> Progress {
        let mut status = self.status();
        if !status.state.is_terminal() {
            status.bytes_received = bytes as u64;
            status.total_bytes_received += bytes as u64;
        }
        let total = status.total_bytes_received;
        Progress {
            total,
            percent: Self::advance_percent(&mut status, total),
        }
    }

    // Percentages never go down and never exceed 100.
    fn advance_percent(status: &mut Status, total: u64) -> Option<f32> {
        let maximum = status.maximum_size?;
        let percent = ((total as f64 * 100.0) / maximum as f64).min(100.0) as f32;
        if !status.state.is_terminal() && percent > status.percent_completed {
            status.percent_completed = percent;
        }
        Some(status.percent_completed)
    }

    /// Runs the request to one of its terminal states and emits the matching events.
    pub(crate) async fn execute(self: &Arc<Self>, ctx: &Context) {
        let logger = ctx.logger.new(slog::o!(
            "request-id" => self.id.to_string(),
            "operation" => self.operation.name(),
            "path" => self.path.clone(),
        ));
        if !self.begin() {
            slog::debug!(logger, "Request already finished, skipping");
            return;
        }
        slog::info!(logger, "Starting request"; "url" => self.full_url());

        let outcome = if self.cancel.is_requested() {
            Err(Failure::Cancelled)
        } else if self.hostname.trim().is_empty() {
            Err(Failure::Error(FtpError::new(ErrorCode::HostnameIsNil)))
        } else {
            match &self.operation {
                Operation::ListDirectory => list::execute(self, ctx, &logger).await,
                Operation::CreateDirectory => mkd::execute(self, ctx, &logger).await,
                Operation::DeleteFileOrDirectory => delete::execute(self, ctx, &logger).await,
                Operation::Upload { .. } => upload::execute(self, ctx, &logger).await,
                Operation::Download { local_path } => download::execute(self, local_path, ctx, &logger).await,
            }
        };
        self.conclude(outcome, ctx, &logger);
    }

    fn conclude(self: &Arc<Self>, outcome: Result<Completion, Failure>, ctx: &Context, logger: &Logger) {
        // The manager let go of a silently cancelled request. Whatever the outcome, it reports
        // nothing.
        if self.cancel.is_silent() {
            if self.finish(RequestState::Cancelled, None) {
                slog::info!(logger, "Request cancelled silently");
            }
            return;
        }
        let request = Arc::clone(self);
        match outcome {
            Ok(completion) => {
                if !self.finish(RequestState::Completed, None) {
                    return;
                }
                slog::info!(logger, "Request completed"; "sent" => self.total_bytes_sent(), "received" => self.total_bytes_received());
                match completion {
                    Completion::Listed(entries) => {
                        let names = entries.iter().map(|e| e.name.clone()).collect();
                        ctx.events.send(RequestEvent::ListedNames {
                            request: Arc::clone(&request),
                            names,
                        });
                        ctx.events.send(RequestEvent::ListedDetails { request, entries });
                    }
                    Completion::DirectoryCreated => ctx.events.send(RequestEvent::DirectoryCreated { request }),
                    Completion::Deleted => ctx.events.send(RequestEvent::Deleted { request }),
                    Completion::Uploaded => {
                        let bytes = self.total_bytes_sent();
                        ctx.events.send(RequestEvent::Uploaded { request, bytes })
                    }
                    Completion::Downloaded => {
                        let bytes = self.total_bytes_received();
                        ctx.events.send(RequestEvent::Downloaded { request, bytes })
                    }
                }
            }
            Err(Failure::Cancelled) => {
                let error = FtpError::new(ErrorCode::Cancelled);
                if self.finish(RequestState::Cancelled, Some(error.clone())) {
                    slog::info!(logger, "Request cancelled");
                    ctx.events.send(RequestEvent::Failed { request, error });
                }
            }
            Err(Failure::Error(error)) => {
                if self.finish(RequestState::Failed, Some(error.clone())) {
                    slog::warn!(logger, "Request failed: {}", error.message());
                    ctx.events.send(RequestEvent::Failed { request, error });
                }
            }
            Err(Failure::LocalWrite { path, error }) => {
                let error = Arc::new(error);
                let ftp_error = FtpError::with_source(ErrorCode::CantWriteStream, Arc::clone(&error));
                if self.finish(RequestState::Failed, Some(ftp_error)) {
                    slog::warn!(logger, "Could not write local file {:?}: {}", path, error);
                    ctx.events.send(RequestEvent::LocalWriteFailed { request, path, error });
                }
            }
        }
    }

    // Reports progress after a chunk, at most one event per call.
    pub(crate) fn report_progress(self: &Arc<Self>, ctx: &Context, progress: Progress) {
        match progress.percent {
            Some(percent) => ctx.events.send(RequestEvent::Progress {
                request: Arc::clone(self),
                percent,
            }),
            None if ctx.options.progress_policy == crate::options::ProgressPolicy::ReportBytes => ctx.events.send(RequestEvent::Transferred {
                request: Arc::clone(self),
                bytes: progress.total,
            }),
            None => {}
        }
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Request {}

/// Everything a request needs from its manager while it executes.
#[derive(Clone)]
pub(crate) struct Context {
    pub transport: Arc<dyn Transport>,
    pub data_source: Arc<dyn DataSource>,
    pub listener: Weak<dyn RequestListener>,
    pub events: EventSender,
    pub options: TransferOptions,
    pub logger: Logger,
}

pub(crate) enum Completion {
    Listed(Vec<ListEntry>),
    DirectoryCreated,
    Deleted,
    Uploaded,
    Downloaded,
}

pub(crate) enum Failure {
    Error(FtpError),
    Cancelled,
    // The remote side was fine but the local file could not be written.
    LocalWrite { path: PathBuf, error: io::Error },
}

impl From<FtpError> for Failure {
    fn from(error: FtpError) -> Self {
        if error.is_cancelled() { Failure::Cancelled } else { Failure::Error(error) }
    }
}

// Awaits an acknowledgement from the transport within the configured timeout.
// Gives up early when the request is cancelled.
async fn acknowledged<F>(request: &Request, ctx: &Context, fut: F, fallback: ErrorCode) -> Result<(), FtpError>
where
    F: Future<Output = transport::Result<()>>,
{
    match request.cancel.unless_cancelled(tokio::time::timeout(ctx.options.timeout, fut)).await {
        None => Err(FtpError::new(ErrorCode::Cancelled)),
        Some(Err(_)) => Err(FtpError::new(ErrorCode::StreamTimedOut)),
        Some(Ok(Err(err))) => Err(FtpError::from_transport_or(err, fallback)),
        Some(Ok(Ok(()))) => Ok(()),
    }
}
