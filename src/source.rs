//! Where upload requests get their content from.

use crate::{options::DEFAULT_CHUNK_SIZE, request::Request};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::{collections::HashMap, fmt::Debug, io};
use tokio::{fs::File, io::AsyncReadExt, sync::Mutex};
use uuid::Uuid;

/// Supplies the bytes of upload requests.
///
/// The manager asks for the total size once, before the transfer starts, and then for blocks of
/// data until the source returns `None`. Blocks may have any size; the transfer splits them up
/// in chunks.
#[async_trait]
pub trait DataSource: Send + Sync + Debug {
    /// The total number of bytes that will be supplied for the request, if known upfront.
    async fn data_size(&self, request: &Request) -> Option<u64>;

    /// The next block of data for the request. `None` means there is no more data.
    async fn data(&self, request: &Request) -> io::Result<Option<Bytes>>;

    /// Called once the request stopped asking for data, whatever the outcome.
    async fn release(&self, _request: &Request) {}
}

/// The default [`DataSource`]: streams the local file named by the upload request.
#[derive(Debug)]
pub struct LocalFileSource {
    block_size: usize,
    open: Mutex<HashMap<Uuid, File>>,
}

impl LocalFileSource {
    /// Creates a source reading blocks of the given size
    pub fn new(block_size: usize) -> Self {
        LocalFileSource {
            block_size: block_size.max(1),
            open: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for LocalFileSource {
    fn default() -> Self {
        LocalFileSource::new(DEFAULT_CHUNK_SIZE)
    }
}

fn local_path_of(request: &Request) -> io::Result<&std::path::Path> {
    request
        .local_path()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "request has no local file"))
}

#[async_trait]
impl DataSource for LocalFileSource {
    async fn data_size(&self, request: &Request) -> Option<u64> {
        let path = local_path_of(request).ok()?;
        tokio::fs::metadata(path).await.ok().map(|m| m.len())
    }

    async fn data(&self, request: &Request) -> io::Result<Option<Bytes>> {
        let mut open = self.open.lock().await;
        if !open.contains_key(&request.id()) {
            let file = File::open(local_path_of(request)?).await?;
            open.insert(request.id(), file);
        }
        let Some(file) = open.get_mut(&request.id()) else {
            return Ok(None);
        };
        let mut block = BytesMut::with_capacity(self.block_size);
        let n = file.read_buf(&mut block).await?;
        if n == 0 {
            open.remove(&request.id());
            return Ok(None);
        }
        Ok(Some(block.freeze()))
    }

    async fn release(&self, request: &Request) {
        self.open.lock().await.remove(&request.id());
    }
}
