//! An unftp-client [`Transport`] that answers requests from a directory on local disk, the way an
//! FTP server with that directory as its root would.
//!
//! It is useful for tests and for local mirroring. Replies a real server would send are emulated:
//! missing files answer 550, illegal names 553 and wrong credentials 530.
//!
//! ```no_run
//! use unftp_client_core::transport::{Credentials, DataMode, Target, Transport};
//! use unftp_transport_fs::Filesystem;
//!
//! #[tokio::main]
//! pub async fn main() {
//!     let transport = Filesystem::new("/srv/ftp").with_credentials("alice", "secret");
//!     let target = Target {
//!         host: "localhost".to_string(),
//!         path: "/report.pdf".to_string(),
//!         credentials: Some(Credentials::new("alice", "secret")),
//!         mode: DataMode::Passive,
//!     };
//!     println!("{} bytes", transport.size(&target).await.unwrap());
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    fs::Metadata,
    io,
    path::{Component, Path, PathBuf},
};
use unftp_client_core::transport::{Credentials, Error, ErrorKind, ReadChannel, Result, Target, Transport, WriteChannel};

/// The Filesystem struct is an implementation of the Transport trait that keeps its files inside
/// a specific root directory on local disk.
#[derive(Debug)]
pub struct Filesystem {
    root: PathBuf,
    credentials: Option<Credentials>,
}

/// Strip the "/" prefix, if any, from a path. Suitable for preprocessing the remote paths of
/// requests.
fn strip_prefixes(path: &Path) -> &Path {
    if path == Path::new("/") || path.as_os_str().is_empty() {
        Path::new(".")
    } else {
        path.strip_prefix("/").unwrap_or(path)
    }
}

impl Filesystem {
    /// Create a new Filesystem transport, with the given root. No operations can take place
    /// outside of the root. For example, when the root is set to `/srv/ftp`, and a request asks
    /// for `hello.txt`, the transport reads `/srv/ftp/hello.txt`.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Filesystem {
            root: root.into(),
            credentials: None,
        }
    }

    /// Only accepts requests that log in with these credentials. Others are refused with 530.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// The directory files are served from
    pub fn root(&self) -> &Path {
        &self.root
    }

    // Checks the login and maps the remote path into the root.
    fn resolve(&self, target: &Target) -> Result<PathBuf> {
        if self.credentials.as_ref().is_some_and(|expected| target.credentials.as_ref() != Some(expected)) {
            return Err(Error::reply(530));
        }
        let relative = strip_prefixes(Path::new(&target.path));
        if relative.components().any(|c| matches!(c, Component::ParentDir | Component::Prefix(_))) {
            return Err(Error::reply(553));
        }
        Ok(self.root.join(relative))
    }
}

// Formats one line the way `ls -l` does.
fn list_line(name: &str, meta: &Metadata) -> String {
    let modified = meta
        .modified()
        .map(|m| DateTime::<Utc>::from(m).format("%b %d %H:%M").to_string())
        .unwrap_or_else(|_| "Jan 01  1970".to_string());
    format!(
        "{filetype}{permissions} {links:>12} {owner:>12} {group:>12} {size:#14} {modified:>12} {name}\r\n",
        filetype = if meta.is_dir() {
            "d"
        } else if meta.file_type().is_symlink() {
            "l"
        } else {
            "-"
        },
        permissions = permissions(meta),
        links = 1,
        owner = "ftp",
        group = "ftp",
        size = meta.len(),
    )
}

#[cfg(unix)]
fn permissions(meta: &Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;
    let mode = meta.permissions().mode();
    let mut out = String::with_capacity(9);
    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

#[cfg(not(unix))]
fn permissions(meta: &Metadata) -> String {
    if meta.permissions().readonly() { "r--r--r--" } else { "rw-rw-rw-" }.to_string()
}

async fn listing(path: &Path) -> io::Result<String> {
    let meta = tokio::fs::symlink_metadata(path).await?;
    if !meta.is_dir() {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        return Ok(list_line(&name, &meta));
    }
    let mut entries = vec![];
    let mut dir = tokio::fs::read_dir(path).await?;
    while let Some(entry) = dir.next_entry().await? {
        let meta = match entry.metadata().await {
            Ok(meta) => meta,
            // Vanished while listing
            Err(_) => continue,
        };
        entries.push((entry.file_name().to_string_lossy().into_owned(), meta));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let mut out = String::new();
    for (name, meta) in entries {
        out.push_str(&list_line(&name, &meta));
    }
    Ok(out)
}

#[async_trait]
impl Transport for Filesystem {
    #[tracing_attributes::instrument]
    async fn list(&self, target: &Target) -> Result<ReadChannel> {
        let path = self.resolve(target)?;
        let text = listing(&path).await?;
        Ok(Box::new(io::Cursor::new(text.into_bytes())))
    }

    #[tracing_attributes::instrument]
    async fn retrieve(&self, target: &Target) -> Result<ReadChannel> {
        let path = self.resolve(target)?;
        let meta = tokio::fs::metadata(&path).await?;
        if meta.is_dir() {
            return Err(Error::reply(550));
        }
        let file = tokio::fs::File::open(&path).await?;
        Ok(Box::new(file))
    }

    #[tracing_attributes::instrument]
    async fn store(&self, target: &Target) -> Result<WriteChannel> {
        let path = self.resolve(target)?;
        if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
            return Err(Error::reply(550));
        }
        let file = tokio::fs::File::create(&path).await?;
        Ok(Box::new(file))
    }

    #[tracing_attributes::instrument]
    async fn size(&self, target: &Target) -> Result<u64> {
        let path = self.resolve(target)?;
        let meta = tokio::fs::metadata(&path).await?;
        if meta.is_dir() {
            return Err(Error::reply(550));
        }
        Ok(meta.len())
    }

    #[tracing_attributes::instrument]
    async fn mkd(&self, target: &Target) -> Result<()> {
        let path = self.resolve(target)?;
        tokio::fs::create_dir(&path).await.map_err(Error::from)
    }

    #[tracing_attributes::instrument]
    async fn del(&self, target: &Target) -> Result<()> {
        let path = self.resolve(target)?;
        tokio::fs::remove_file(&path).await.map_err(Error::from)
    }

    #[tracing_attributes::instrument]
    async fn rmd(&self, target: &Target) -> Result<()> {
        let path = self.resolve(target)?;
        if let Err(e) = tokio::fs::remove_dir(&path).await {
            // Not empty, or not a directory
            let still_there = tokio::fs::symlink_metadata(&path).await.is_ok();
            return Err(if still_there { Error::new(ErrorKind::Reply(550), e) } else { Error::from(e) });
        }
        Ok(())
    }
}
