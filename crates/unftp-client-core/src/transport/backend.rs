//! Defines the service provider interface for transport implementors.

use super::error::Error;
use async_trait::async_trait;
use std::{
    fmt::{self, Debug, Formatter},
    result,
};

/// Result type used by traits in this module
pub type Result<T> = result::Result<T, Error>;

/// The readable half of a data connection handed out by a [`Transport`].
pub type ReadChannel = Box<dyn tokio::io::AsyncRead + Send + Sync + Unpin>;

/// The writable half of a data connection handed out by a [`Transport`]. Implementations may
/// report a late server reply (e.g. 552 after the last byte of a STOR) by failing `shutdown`
/// with an `std::io::Error` that wraps an [`Error`].
pub type WriteChannel = Box<dyn tokio::io::AsyncWrite + Send + Sync + Unpin>;

/// How the data connection is negotiated. The transport decides what this means on the wire.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DataMode {
    /// The client connects to the server (PASV/EPSV).
    #[default]
    Passive,
    /// The server connects back to the client (PORT/EPRT).
    Active,
}

/// Username and password presented to the server.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// The username sent with USER
    pub username: String,
    /// The password sent with PASS
    pub password: String,
}

impl Credentials {
    /// Creates a new set of credentials
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"*******")
            .finish()
    }
}

/// Identifies the remote resource an operation pertains to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// The host name of the FTP server
    pub host: String,
    /// The remote path, relative to the login directory
    pub path: String,
    /// Credentials to log in with. Anonymous login when absent.
    pub credentials: Option<Credentials>,
    /// Passive or active data connections
    pub mode: DataMode,
}

/// The `Transport` trait is the capability the client engine consumes to talk to an FTP server.
/// It takes care of the command/response exchange (USER/PASS, PASV/PORT, reply codes) and hands
/// back data channels or acknowledgements. Failures are reported as [`Error`]s whose
/// [`ErrorKind`](super::ErrorKind) carries the server's reply code when there is one.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Implement to set the name of the transport. By default it returns the type signature.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Opens a data channel that yields the LIST output of the directory at the target path.
    async fn list(&self, target: &Target) -> Result<ReadChannel>;

    /// Opens a data channel that yields the content of the file at the target path (RETR).
    async fn retrieve(&self, target: &Target) -> Result<ReadChannel>;

    /// Opens a data channel that stores whatever is written to it at the target path (STOR).
    async fn store(&self, target: &Target) -> Result<WriteChannel>;

    /// Returns the size in bytes of the file at the target path (SIZE). The default
    /// implementation reports that the transport can't tell.
    async fn size(&self, _target: &Target) -> Result<u64> {
        Err(Error::from(super::ErrorKind::NotSupported))
    }

    /// Creates the directory at the target path (MKD).
    async fn mkd(&self, target: &Target) -> Result<()>;

    /// Deletes the file at the target path (DELE).
    async fn del(&self, target: &Target) -> Result<()>;

    /// Removes the directory at the target path (RMD).
    async fn rmd(&self, target: &Target) -> Result<()>;
}

#[async_trait]
impl Transport for Box<dyn Transport> {
    fn name(&self) -> &str {
        self.as_ref().name()
    }

    async fn list(&self, target: &Target) -> Result<ReadChannel> {
        self.as_ref().list(target).await
    }

    async fn retrieve(&self, target: &Target) -> Result<ReadChannel> {
        self.as_ref().retrieve(target).await
    }

    async fn store(&self, target: &Target) -> Result<WriteChannel> {
        self.as_ref().store(target).await
    }

    async fn size(&self, target: &Target) -> Result<u64> {
        self.as_ref().size(target).await
    }

    async fn mkd(&self, target: &Target) -> Result<()> {
        self.as_ref().mkd(target).await
    }

    async fn del(&self, target: &Target) -> Result<()> {
        self.as_ref().del(target).await
    }

    async fn rmd(&self, target: &Target) -> Result<()> {
        self.as_ref().rmd(target).await
    }
}
