use crate::BoxError;
use derive_more::Display;
use thiserror::Error;

/// The Error returned by transports. Transport implementations should choose the `ErrorKind`
/// carefully since it determines the semantic error code the client ends up reporting.
#[derive(Debug, Error)]
#[error("transport error: {kind}")]
pub struct Error {
    kind: ErrorKind,
    #[source]
    source: Option<BoxError>,
}

impl Error {
    /// Creates a new transport error
    pub fn new<E>(kind: ErrorKind, error: E) -> Error
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error {
            kind,
            source: Some(error.into()),
        }
    }

    /// Creates an error from a reply code sent by the FTP server.
    pub fn reply(code: u16) -> Error {
        Error::from(ErrorKind::Reply(code))
    }

    /// What went wrong, as far as the client is concerned.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The FTP reply code the server answered with, if the failure came from the server.
    pub fn reply_code(&self) -> Option<u16> {
        match self.kind {
            ErrorKind::Reply(code) => Some(code),
            _ => None,
        }
    }

    /// Attempts to get a reference to the inner `std::io::Error` if there is one.
    pub fn get_io_error(&self) -> Option<&std::io::Error> {
        self.source.as_ref()?.downcast_ref::<std::io::Error>()
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error { kind, source: None }
    }
}

/// The `ErrorKind` variants that can be produced by [`Transport`] implementations.
///
/// [`Transport`]: trait.Transport.html
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
pub enum ErrorKind {
    /// The server refused the command with the given reply code, for example 550 when a file
    /// does not exist or 530 when the credentials were rejected.
    #[display("{_0} Server reply")]
    Reply(u16),
    /// The control or data connection could not be established.
    #[display("Connection failed")]
    ConnectionFailed,
    /// The data connection was closed before the transfer finished.
    #[display("Connection closed")]
    ConnectionClosed,
    /// The transport gave up waiting on the server.
    #[display("Timed out")]
    TimedOut,
    /// The transport does not support the requested operation.
    #[display("Not supported")]
    NotSupported,
    /// Something went wrong inside the transport itself.
    #[display("Local error")]
    LocalError,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::AlreadyExists => {
                Error::new(ErrorKind::Reply(550), err)
            }
            std::io::ErrorKind::InvalidInput => Error::new(ErrorKind::Reply(553), err),
            std::io::ErrorKind::StorageFull => Error::new(ErrorKind::Reply(552), err),
            std::io::ErrorKind::ConnectionRefused => Error::new(ErrorKind::ConnectionFailed, err),
            std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted | std::io::ErrorKind::BrokenPipe => {
                Error::new(ErrorKind::ConnectionClosed, err)
            }
            std::io::ErrorKind::TimedOut => Error::new(ErrorKind::TimedOut, err),
            _ => Error::new(ErrorKind::LocalError, err),
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        std::io::Error::other(err)
    }
}
