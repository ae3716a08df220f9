#![allow(dead_code, missing_docs)]

use async_trait::async_trait;
use std::{
    collections::{HashMap, HashSet},
    io,
    path::Path,
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use unftp_client::{
    FtpError, Request, RequestsManager, RequestsManagerBuilder,
    notification::{EventMeta, RequestEvent, RequestListener},
    transport::{self, ReadChannel, Target, Transport, WriteChannel},
};

pub fn logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

pub fn manager(transport: &Arc<MemoryTransport>, listener: &Arc<RecordingListener>) -> RequestsManagerBuilder {
    RequestsManager::builder("localhost", transport.clone()).listener(listener).logger(logger())
}

#[derive(Debug, Default)]
struct Activity {
    running: AtomicUsize,
    max: AtomicUsize,
    calls: AtomicUsize,
}

impl Activity {
    fn enter(self: &Arc<Self>) -> ActiveGuard {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        ActiveGuard(Arc::clone(self))
    }
}

// Counts a data channel or command as active until dropped.
#[derive(Debug)]
struct ActiveGuard(Arc<Activity>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::SeqCst);
    }
}

struct TrackedReader<R> {
    inner: R,
    _guard: ActiveGuard,
}

impl<R: AsyncRead + Unpin> AsyncRead for TrackedReader<R> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

#[derive(Debug, Default)]
struct Store {
    files: HashMap<String, Vec<u8>>,
    dirs: HashSet<String>,
    announced: HashMap<String, u64>,
    replies: HashMap<String, u16>,
    listing: Option<String>,
}

struct MemoryWriter {
    path: String,
    data: Vec<u8>,
    store: Arc<Mutex<Store>>,
    writes: Arc<Mutex<Vec<usize>>>,
    reject_on_close: Option<u16>,
    stalled: bool,
    _guard: ActiveGuard,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.stalled {
            return Poll::Pending;
        }
        this.data.extend_from_slice(buf);
        this.writes.lock().unwrap().push(buf.len());
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(code) = this.reject_on_close {
            return Poll::Ready(Err(io::Error::from(transport::Error::reply(code))));
        }
        let data = std::mem::take(&mut this.data);
        this.store.lock().unwrap().files.insert(this.path.clone(), data);
        Poll::Ready(Ok(()))
    }
}

/// A transport keeping its files in memory. Downloads are fed in pieces, optionally slowly.
#[derive(Debug)]
pub struct MemoryTransport {
    store: Arc<Mutex<Store>>,
    writes: Arc<Mutex<Vec<usize>>>,
    activity: Arc<Activity>,
    parked: Mutex<Vec<DuplexStream>>,
    feed_size: usize,
    chunk_delay: Option<Duration>,
    stalled: bool,
    stalled_writes: bool,
    command_delay: Option<Duration>,
    report_size: bool,
    reject_on_close: Option<u16>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        MemoryTransport {
            store: Arc::default(),
            writes: Arc::default(),
            activity: Arc::default(),
            parked: Mutex::default(),
            feed_size: 4096,
            chunk_delay: None,
            stalled: false,
            stalled_writes: false,
            command_delay: None,
            report_size: true,
            reject_on_close: None,
        }
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        MemoryTransport::default()
    }

    pub fn with_file(self, path: &str, content: &[u8]) -> Self {
        self.store.lock().unwrap().files.insert(path.to_string(), content.to_vec());
        self
    }

    pub fn with_reply(self, path: &str, code: u16) -> Self {
        self.store.lock().unwrap().replies.insert(path.to_string(), code);
        self
    }

    pub fn with_listing(self, text: &str) -> Self {
        self.store.lock().unwrap().listing = Some(text.to_string());
        self
    }

    pub fn announcing_size(self, path: &str, size: u64) -> Self {
        self.store.lock().unwrap().announced.insert(path.to_string(), size);
        self
    }

    pub fn with_feed(mut self, feed_size: usize, delay: Duration) -> Self {
        self.feed_size = feed_size;
        self.chunk_delay = Some(delay);
        self
    }

    pub fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }

    pub fn stalling_writes(mut self) -> Self {
        self.stalled_writes = true;
        self
    }

    pub fn with_command_delay(mut self, delay: Duration) -> Self {
        self.command_delay = Some(delay);
        self
    }

    pub fn without_size(mut self) -> Self {
        self.report_size = false;
        self
    }

    pub fn rejecting_on_close(mut self, code: u16) -> Self {
        self.reject_on_close = Some(code);
        self
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.store.lock().unwrap().files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.store.lock().unwrap().dirs.contains(path)
    }

    pub fn writes(&self) -> Vec<usize> {
        self.writes.lock().unwrap().clone()
    }

    pub fn max_concurrent(&self) -> usize {
        self.activity.max.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.activity.calls.load(Ordering::SeqCst)
    }

    fn check(&self, target: &Target) -> transport::Result<()> {
        match self.store.lock().unwrap().replies.get(&target.path) {
            Some(code) => Err(transport::Error::reply(*code)),
            None => Ok(()),
        }
    }

    async fn command_pause(&self) {
        if let Some(delay) = self.command_delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn feed(&self, data: Vec<u8>) -> DuplexStream {
        let (mut tx, rx) = tokio::io::duplex(self.feed_size.max(1));
        if self.stalled {
            self.parked.lock().unwrap().push(tx);
            return rx;
        }
        let feed_size = self.feed_size.max(1);
        let delay = self.chunk_delay;
        tokio::spawn(async move {
            for piece in data.chunks(feed_size) {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if tx.write_all(piece).await.is_err() {
                    return;
                }
            }
        });
        rx
    }

    fn generated_listing(&self) -> String {
        let store = self.store.lock().unwrap();
        let mut lines: Vec<(String, String)> = store
            .files
            .iter()
            .map(|(path, data)| {
                let name = path.trim_start_matches('/').to_string();
                let line = format!("-rw-r--r-- 1 ftp ftp {} Jan 01 2020 {}\r\n", data.len(), name);
                (name, line)
            })
            .chain(store.dirs.iter().map(|path| {
                let name = path.trim_matches('/').to_string();
                let line = format!("drwxr-xr-x 2 ftp ftp 0 Jan 01 2020 {}\r\n", name);
                (name, line)
            }))
            .collect();
        lines.sort();
        lines.into_iter().map(|(_, line)| line).collect()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn list(&self, target: &Target) -> transport::Result<ReadChannel> {
        let guard = self.activity.enter();
        self.check(target)?;
        let listing = self.store.lock().unwrap().listing.clone();
        let text = listing.unwrap_or_else(|| self.generated_listing());
        Ok(Box::new(TrackedReader {
            inner: self.feed(text.into_bytes()),
            _guard: guard,
        }))
    }

    async fn retrieve(&self, target: &Target) -> transport::Result<ReadChannel> {
        let guard = self.activity.enter();
        self.check(target)?;
        let data = self.file(&target.path).ok_or_else(|| transport::Error::reply(550))?;
        Ok(Box::new(TrackedReader {
            inner: self.feed(data),
            _guard: guard,
        }))
    }

    async fn store(&self, target: &Target) -> transport::Result<WriteChannel> {
        let guard = self.activity.enter();
        self.check(target)?;
        Ok(Box::new(MemoryWriter {
            path: target.path.clone(),
            data: vec![],
            store: Arc::clone(&self.store),
            writes: Arc::clone(&self.writes),
            reject_on_close: self.reject_on_close,
            stalled: self.stalled_writes,
            _guard: guard,
        }))
    }

    async fn size(&self, target: &Target) -> transport::Result<u64> {
        let _guard = self.activity.enter();
        if !self.report_size {
            return Err(transport::ErrorKind::NotSupported.into());
        }
        self.check(target)?;
        let store = self.store.lock().unwrap();
        if let Some(size) = store.announced.get(&target.path) {
            return Ok(*size);
        }
        store
            .files
            .get(&target.path)
            .map(|f| f.len() as u64)
            .ok_or_else(|| transport::Error::reply(550))
    }

    async fn mkd(&self, target: &Target) -> transport::Result<()> {
        let _guard = self.activity.enter();
        self.command_pause().await;
        self.check(target)?;
        if !self.store.lock().unwrap().dirs.insert(target.path.clone()) {
            return Err(transport::Error::reply(550));
        }
        Ok(())
    }

    async fn del(&self, target: &Target) -> transport::Result<()> {
        let _guard = self.activity.enter();
        self.command_pause().await;
        self.check(target)?;
        match self.store.lock().unwrap().files.remove(&target.path) {
            Some(_) => Ok(()),
            None => Err(transport::Error::reply(550)),
        }
    }

    async fn rmd(&self, target: &Target) -> transport::Result<()> {
        let _guard = self.activity.enter();
        self.command_pause().await;
        self.check(target)?;
        if !self.store.lock().unwrap().dirs.remove(&target.path) {
            return Err(transport::Error::reply(550));
        }
        Ok(())
    }
}

pub async fn eventually<F>(what: &str, done: F)
where
    F: Fn() -> bool,
{
    let waited = tokio::time::timeout(Duration::from_secs(10), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    if waited.is_err() {
        panic!("timed out waiting for {}", what);
    }
}

/// Records every event it receives.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<RequestEvent>>,
    overwrite: bool,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingListener::default())
    }

    pub fn overwriting() -> Arc<Self> {
        Arc::new(RecordingListener {
            events: Mutex::default(),
            overwrite: true,
        })
    }

    pub fn events(&self) -> Vec<RequestEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_of(&self, request: &Arc<Request>) -> Vec<RequestEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.request().is_some_and(|r| Arc::ptr_eq(r, request)))
            .collect()
    }

    pub fn failures_of(&self, request: &Arc<Request>) -> Vec<FtpError> {
        self.events_of(request)
            .into_iter()
            .filter_map(|e| match e {
                RequestEvent::Failed { error, .. } => Some(error),
                _ => None,
            })
            .collect()
    }

    pub fn queue_completions(&self) -> usize {
        self.events().iter().filter(|e| matches!(e, RequestEvent::QueueCompleted)).count()
    }

    pub async fn wait_until<F>(&self, what: &str, done: F)
    where
        F: Fn(&[RequestEvent]) -> bool,
    {
        let waited = tokio::time::timeout(Duration::from_secs(10), async {
            while !done(&self.events()) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        if waited.is_err() {
            panic!("timed out waiting for {}: {:#?}", what, self.events());
        }
    }

    pub async fn wait_for_queue_completed(&self, times: usize) {
        self.wait_until("queue completion", |events| {
            events.iter().filter(|e| matches!(e, RequestEvent::QueueCompleted)).count() >= times
        })
        .await
    }
}

#[async_trait]
impl RequestListener for RecordingListener {
    async fn receive_request_event(&self, e: RequestEvent, _m: EventMeta) {
        self.events.lock().unwrap().push(e);
    }

    async fn should_overwrite(&self, _request: &Request, _path: &Path) -> bool {
        self.overwrite
    }
}
