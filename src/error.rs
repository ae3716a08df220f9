//! Contains the [`FtpError`] type and the mapping of transport failures onto the closed set of
//! [`ErrorCode`]s that requests report.

use derive_more::Display;
use std::{io, sync::Arc};
use thiserror::Error;
use unftp_client_core::transport;

/// The semantic error codes a request can fail with.
///
/// The numeric values of the server errors equal the FTP reply code they stem from. Client errors
/// are numbered from 901 onwards.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum ErrorCode {
    /// No host name was configured.
    #[display("901 Hostname is nil")]
    HostnameIsNil,
    /// The data channel could not be opened.
    #[display("902 Can't open stream")]
    CantOpenStream,
    /// Writing to the data channel failed.
    #[display("903 Can't write to stream")]
    CantWriteStream,
    /// Reading from the data channel failed.
    #[display("904 Can't read from stream")]
    CantReadStream,
    /// The data source had nothing to upload.
    #[display("905 Data sent is nil")]
    SentDataIsNil,
    /// The local file to download into already exists.
    #[display("907 File already exists")]
    FileAlreadyExists,
    /// The local path to download into is a directory.
    #[display("908 Can't overwrite directory")]
    CantOverwriteDirectory,
    /// No progress was made on the data channel within the configured timeout.
    #[display("909 Stream timed out")]
    StreamTimedOut,
    /// The file or directory could not be deleted.
    #[display("910 Can't delete file or directory")]
    CantDeleteFileOrDirectory,
    /// The server delivered less data than it announced.
    #[display("911 Missing request data")]
    MissingRequestDataAvailable,
    /// The request was cancelled by the caller.
    #[display("912 Request cancelled")]
    Cancelled,
    /// 426 Connection closed; transfer aborted.
    #[display("426 Transfer aborted")]
    ServerAbortedTransfer,
    /// 450 Requested file action not taken. File unavailable (e.g., file busy).
    #[display("450 Resource busy")]
    ServerResourceBusy,
    /// 425 Can't open data connection.
    #[display("425 Can't open data connection")]
    ServerCantOpenDataConnection,
    /// 530 Not logged in.
    #[display("530 User not logged in")]
    ServerUserNotLoggedIn,
    /// 550 Requested action not taken. File unavailable (e.g., file not found, no access).
    #[display("550 Requested action not taken, file not available")]
    ServerFileNotAvailable,
    /// 552 Requested file action aborted. Exceeded storage allocation.
    #[display("552 Storage allocation exceeded")]
    ServerStorageAllocationExceeded,
    /// 553 Requested action not taken. File name not allowed.
    #[display("553 Illegal file name")]
    ServerIllegalFileName,
    /// Anything the client can't classify.
    #[display("Unknown error")]
    ServerUnknownError,
}

impl ErrorCode {
    /// The numeric value of this code. Zero for [`ErrorCode::ServerUnknownError`].
    pub fn value(&self) -> u16 {
        match self {
            ErrorCode::HostnameIsNil => 901,
            ErrorCode::CantOpenStream => 902,
            ErrorCode::CantWriteStream => 903,
            ErrorCode::CantReadStream => 904,
            ErrorCode::SentDataIsNil => 905,
            ErrorCode::FileAlreadyExists => 907,
            ErrorCode::CantOverwriteDirectory => 908,
            ErrorCode::StreamTimedOut => 909,
            ErrorCode::CantDeleteFileOrDirectory => 910,
            ErrorCode::MissingRequestDataAvailable => 911,
            ErrorCode::Cancelled => 912,
            ErrorCode::ServerAbortedTransfer => 426,
            ErrorCode::ServerResourceBusy => 450,
            ErrorCode::ServerCantOpenDataConnection => 425,
            ErrorCode::ServerUserNotLoggedIn => 530,
            ErrorCode::ServerFileNotAvailable => 550,
            ErrorCode::ServerStorageAllocationExceeded => 552,
            ErrorCode::ServerIllegalFileName => 553,
            ErrorCode::ServerUnknownError => 0,
        }
    }

    /// True if the code was derived from something the server said rather than from a local
    /// condition.
    pub fn is_server_error(&self) -> bool {
        self.value() < 900
    }

    /// Maps an FTP reply code onto an error code.
    pub fn from_reply(reply: u16) -> ErrorCode {
        match reply {
            425 => ErrorCode::ServerCantOpenDataConnection,
            426 => ErrorCode::ServerAbortedTransfer,
            450 => ErrorCode::ServerResourceBusy,
            530 => ErrorCode::ServerUserNotLoggedIn,
            550 => ErrorCode::ServerFileNotAvailable,
            452 | 552 => ErrorCode::ServerStorageAllocationExceeded,
            553 => ErrorCode::ServerIllegalFileName,
            _ => ErrorCode::ServerUnknownError,
        }
    }

    /// Maps a transport failure onto an error code. Always yields a code, unrecognized failures
    /// end up as [`ErrorCode::ServerUnknownError`].
    pub fn from_transport_error(err: &transport::Error) -> ErrorCode {
        match err.kind() {
            transport::ErrorKind::Reply(reply) => ErrorCode::from_reply(reply),
            transport::ErrorKind::ConnectionFailed => ErrorCode::ServerCantOpenDataConnection,
            transport::ErrorKind::ConnectionClosed => ErrorCode::ServerAbortedTransfer,
            transport::ErrorKind::TimedOut => ErrorCode::StreamTimedOut,
            transport::ErrorKind::NotSupported => ErrorCode::ServerUnknownError,
            transport::ErrorKind::LocalError => match err.get_io_error() {
                Some(io_err) => ErrorCode::from_io_error(io_err),
                None => ErrorCode::ServerUnknownError,
            },
        }
    }

    /// Maps an I/O failure onto an error code. A transport error wrapped inside the I/O error
    /// takes precedence over the I/O error kind.
    pub fn from_io_error(err: &io::Error) -> ErrorCode {
        if let Some(inner) = err.get_ref().and_then(|e| e.downcast_ref::<transport::Error>()) {
            return ErrorCode::from_transport_error(inner);
        }
        match err.kind() {
            io::ErrorKind::TimedOut => ErrorCode::StreamTimedOut,
            io::ErrorKind::ConnectionRefused | io::ErrorKind::NotConnected | io::ErrorKind::AddrNotAvailable => {
                ErrorCode::ServerCantOpenDataConnection
            }
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => {
                ErrorCode::ServerAbortedTransfer
            }
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => ErrorCode::ServerFileNotAvailable,
            io::ErrorKind::AlreadyExists => ErrorCode::FileAlreadyExists,
            io::ErrorKind::IsADirectory => ErrorCode::CantOverwriteDirectory,
            io::ErrorKind::InvalidInput => ErrorCode::ServerIllegalFileName,
            io::ErrorKind::StorageFull => ErrorCode::ServerStorageAllocationExceeded,
            io::ErrorKind::ResourceBusy | io::ErrorKind::WouldBlock => ErrorCode::ServerResourceBusy,
            _ => ErrorCode::ServerUnknownError,
        }
    }
}

type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// The error a request ends up with. It carries one [`ErrorCode`] and, when there was one, the
/// low-level failure that was mapped onto it.
#[derive(Debug, Clone, Error)]
#[error("{code}")]
pub struct FtpError {
    code: ErrorCode,
    #[source]
    source: Option<SharedError>,
}

impl FtpError {
    /// Creates a new error with the given code
    pub fn new(code: ErrorCode) -> FtpError {
        FtpError { code, source: None }
    }

    /// Creates a new error with the given code, keeping the error that caused it.
    pub fn with_source<E>(code: ErrorCode, source: E) -> FtpError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        FtpError {
            code,
            source: Some(Arc::new(source)),
        }
    }

    /// Maps a transport failure, falling back to the given code when the failure can't be
    /// classified.
    pub fn from_transport_or(err: transport::Error, fallback: ErrorCode) -> FtpError {
        let code = match ErrorCode::from_transport_error(&err) {
            ErrorCode::ServerUnknownError => fallback,
            code => code,
        };
        FtpError::with_source(code, err)
    }

    /// Maps an I/O failure, falling back to the given code when the failure can't be classified.
    pub fn from_io_or(err: io::Error, fallback: ErrorCode) -> FtpError {
        let code = match ErrorCode::from_io_error(&err) {
            ErrorCode::ServerUnknownError => fallback,
            code => code,
        };
        FtpError::with_source(code, err)
    }

    /// The semantic error code
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// A human readable description of what went wrong. Never empty.
    pub fn message(&self) -> String {
        match &self.source {
            Some(source) => format!("{}: {}", self.code, source),
            None => self.code.to_string(),
        }
    }

    /// True if this error only signals that the request was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.code == ErrorCode::Cancelled
    }
}

impl From<ErrorCode> for FtpError {
    fn from(code: ErrorCode) -> Self {
        FtpError::new(code)
    }
}

impl From<transport::Error> for FtpError {
    fn from(err: transport::Error) -> Self {
        let code = ErrorCode::from_transport_error(&err);
        FtpError::with_source(code, err)
    }
}

impl From<io::Error> for FtpError {
    fn from(err: io::Error) -> Self {
        let code = ErrorCode::from_io_error(&err);
        FtpError::with_source(code, err)
    }
}
