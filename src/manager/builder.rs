//! Contains the builder that sets up a [`RequestsManager`].

use super::{Inner, ManagerError, PumpState, RequestsManager};
use crate::{
    notification::{NopListener, RequestListener, dispatch},
    options::{ProgressPolicy, TransferOptions},
    queue::RequestQueue,
    request::Context,
    source::{DataSource, LocalFileSource},
};
use slog::Drain;
use std::{
    sync::{Arc, Mutex, Weak},
    time::Duration,
};
use tokio::runtime::Handle;
use unftp_client_core::transport::{Credentials, DataMode, Transport};

/// Sets up a [`RequestsManager`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use unftp_client::RequestsManager;
/// use unftp_transport_fs::Filesystem;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let manager = RequestsManager::builder("localhost", Arc::new(Filesystem::new(std::env::temp_dir())))
///     .credentials("alice", "secret")
///     .chunk_size(8192)
///     .build()
///     .unwrap();
/// manager.add_request_for_list_directory("/");
/// manager.start_processing_requests();
/// # }
/// ```
pub struct RequestsManagerBuilder {
    pub(crate) hostname: String,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) mode: DataMode,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) data_source: Option<Arc<dyn DataSource>>,
    pub(crate) listener: Weak<dyn RequestListener>,
    pub(crate) options: TransferOptions,
    pub(crate) autostart: bool,
    pub(crate) logger: slog::Logger,
    pub(crate) runtime: Option<Handle>,
}

impl RequestsManagerBuilder {
    /// Starts building a manager that sends its requests for `hostname` through `transport`.
    pub fn new(hostname: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        RequestsManagerBuilder {
            hostname: hostname.into(),
            credentials: None,
            mode: DataMode::default(),
            transport,
            data_source: None,
            listener: Weak::<NopListener>::new(),
            options: TransferOptions::default(),
            autostart: false,
            logger: slog::Logger::root(slog_stdlog::StdLog.fuse(), slog::o!()),
            runtime: None,
        }
    }

    /// Sets the user name and password to log in with. Without credentials the transport logs in
    /// anonymously.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Chooses passive (the default) or active data connections.
    pub fn passive_mode(mut self, passive: bool) -> Self {
        self.mode = if passive { DataMode::Passive } else { DataMode::Active };
        self
    }

    /// Sets the listener that receives the events of this manager. Only a weak reference is
    /// kept: the caller must keep the listener alive for as long as it wants events.
    pub fn listener<L: RequestListener + 'static>(mut self, listener: &Arc<L>) -> Self {
        self.listener = Arc::downgrade(listener) as Weak<dyn RequestListener>;
        self
    }

    /// Sets where uploads get their data from. Defaults to [`LocalFileSource`], which reads the
    /// local file of the request.
    pub fn data_source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.data_source = Some(source);
        self
    }

    /// Sets the size of the chunks moved over data channels. Defaults to
    /// [`DEFAULT_CHUNK_SIZE`](crate::options::DEFAULT_CHUNK_SIZE).
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.options.chunk_size = bytes.max(1);
        self
    }

    /// Sets how long a single open, read or write may take before the request fails with
    /// [`ErrorCode::StreamTimedOut`](crate::ErrorCode::StreamTimedOut).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Sets what is reported for transfers of unknown size.
    pub fn progress_policy(mut self, policy: ProgressPolicy) -> Self {
        self.options.progress_policy = policy;
        self
    }

    /// When enabled, adding a request starts processing if the manager is idle. Disabled by
    /// default: requests wait for
    /// [`start_processing_requests`](crate::RequestsManager::start_processing_requests).
    pub fn autostart(mut self, enabled: bool) -> Self {
        self.autostart = enabled;
        self
    }

    /// Sets the structured logger. Logs go to the `log` crate by default.
    pub fn logger<L: Into<Option<slog::Logger>>>(mut self, logger: L) -> Self {
        self.logger = logger.into().unwrap_or_else(|| slog::Logger::root(slog_stdlog::StdLog.fuse(), slog::o!()));
        self
    }

    /// Sets the runtime requests are executed on. Defaults to the runtime `build` is called from.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Creates the manager. Fails if no runtime was given and `build` is not called from within
    /// a tokio runtime.
    pub fn build(self) -> Result<RequestsManager, ManagerError> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current()?,
        };
        let logger = self.logger.new(slog::o!("host" => self.hostname.clone(), "transport" => self.transport.name().to_string()));
        let events = dispatch::spawn(&runtime, self.listener.clone(), self.hostname.clone(), logger.clone());
        let chunk_size = self.options.chunk_size;
        let data_source = self.data_source.unwrap_or_else(|| Arc::new(LocalFileSource::new(chunk_size)) as Arc<dyn DataSource>);
        slog::debug!(logger, "Requests manager created"; "chunk_size" => chunk_size, "autostart" => self.autostart);

        Ok(RequestsManager {
            inner: Arc::new(Inner {
                hostname: self.hostname,
                credentials: self.credentials,
                mode: self.mode,
                autostart: self.autostart,
                state: Mutex::new(PumpState {
                    queue: RequestQueue::new(),
                    current: None,
                    processing: false,
                }),
                slot: tokio::sync::Mutex::new(()),
                runtime,
                ctx: Context {
                    transport: self.transport,
                    data_source,
                    listener: self.listener,
                    events,
                    options: self.options,
                    logger,
                },
            }),
        })
    }
}

impl std::fmt::Debug for RequestsManagerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestsManagerBuilder")
            .field("hostname", &self.hostname)
            .field("credentials", &self.credentials)
            .field("mode", &self.mode)
            .field("transport", &self.transport.name())
            .field("options", &self.options)
            .field("autostart", &self.autostart)
            .finish()
    }
}
