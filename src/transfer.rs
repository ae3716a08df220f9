//! The chunked stream engine used by every request that moves data over a data channel.
//!
//! A [`TransferBuffer`] owns at most one read and one write channel. Every open, read and write
//! is bounded by the configured timeout and every failure is mapped onto an
//! [`ErrorCode`](crate::ErrorCode). Cancelling the request interrupts a pending channel
//! operation. Closing is idempotent: channels are dropped exactly once,
//! whatever path the transfer takes.

use crate::{
    error::{ErrorCode, FtpError},
    options::TransferOptions,
    request::{CancelFlag, Request},
};
use bytes::Bytes;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use unftp_client_core::transport::{self, ReadChannel, WriteChannel};

/// Moves data between a data channel and the caller, one chunk at a time.
pub struct TransferBuffer {
    reader: Option<ReadChannel>,
    writer: Option<WriteChannel>,
    buffer: Vec<u8>,
    bytes_this_iteration: usize,
    bytes_total: u64,
    timeout: Duration,
    cancel: Arc<CancelFlag>,
}

impl std::fmt::Debug for TransferBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferBuffer")
            .field("reading", &self.reader.is_some())
            .field("writing", &self.writer.is_some())
            .field("chunk_size", &self.buffer.len())
            .field("bytes_total", &self.bytes_total)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TransferBuffer {
    pub(crate) fn new(request: &Request, options: &TransferOptions) -> TransferBuffer {
        TransferBuffer {
            reader: None,
            writer: None,
            buffer: vec![0; options.chunk_size.max(1)],
            bytes_this_iteration: 0,
            bytes_total: 0,
            timeout: options.timeout,
            cancel: request.cancel_flag(),
        }
    }

    /// The maximum number of bytes moved per read or write
    pub fn chunk_size(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes moved by the last read or write
    pub fn bytes_this_iteration(&self) -> usize {
        self.bytes_this_iteration
    }

    /// Bytes moved since the buffer was created
    pub fn bytes_total(&self) -> u64 {
        self.bytes_total
    }

    /// The watchdog applied to every channel operation
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// True once the request owning this buffer was asked to stop.
    pub fn cancel_requested(&self) -> bool {
        self.cancel.is_requested()
    }

    /// True if stopping must not produce a failure notification.
    pub fn cancel_does_not_call_delegate(&self) -> bool {
        self.cancel.is_silent()
    }

    /// Returns true if any channel is still open.
    pub fn is_open(&self) -> bool {
        self.reader.is_some() || self.writer.is_some()
    }

    /// Opens the channel data is read from. Server replies are mapped onto their error code,
    /// anything else, including running out of time, becomes [`ErrorCode::CantOpenStream`].
    pub async fn open_read<F>(&mut self, request: &Request, open: F) -> Result<(), FtpError>
    where
        F: Future<Output = transport::Result<ReadChannel>>,
    {
        match self.cancel.unless_cancelled(tokio::time::timeout(self.timeout, open)).await {
            None => Err(self.stream_error(request, FtpError::new(ErrorCode::Cancelled))),
            Some(Ok(Ok(reader))) => {
                self.reader = Some(reader);
                request.set_stream_opened(true);
                Ok(())
            }
            Some(Ok(Err(err))) => Err(self.stream_error(request, FtpError::from_transport_or(err, ErrorCode::CantOpenStream))),
            Some(Err(_)) => Err(self.stream_error(request, FtpError::new(ErrorCode::CantOpenStream))),
        }
    }

    /// Opens the channel data is written to. Errors are mapped like for
    /// [`open_read`](Self::open_read).
    pub async fn open_write<F>(&mut self, request: &Request, open: F) -> Result<(), FtpError>
    where
        F: Future<Output = transport::Result<WriteChannel>>,
    {
        match self.cancel.unless_cancelled(tokio::time::timeout(self.timeout, open)).await {
            None => Err(self.stream_error(request, FtpError::new(ErrorCode::Cancelled))),
            Some(Ok(Ok(writer))) => {
                self.writer = Some(writer);
                request.set_stream_opened(true);
                Ok(())
            }
            Some(Ok(Err(err))) => Err(self.stream_error(request, FtpError::from_transport_or(err, ErrorCode::CantOpenStream))),
            Some(Err(_)) => Err(self.stream_error(request, FtpError::new(ErrorCode::CantOpenStream))),
        }
    }

    /// Reads the next chunk. An empty chunk means the sender closed the channel.
    pub async fn read(&mut self, request: &Request) -> Result<Bytes, FtpError> {
        let result = match self.reader.as_mut() {
            Some(reader) => {
                let read = tokio::time::timeout(self.timeout, reader.read(&mut self.buffer));
                Some(self.cancel.unless_cancelled(read).await)
            }
            None => None,
        };
        match result {
            None => Err(self.stream_error(request, FtpError::new(ErrorCode::CantReadStream))),
            Some(None) => Err(self.stream_error(request, FtpError::new(ErrorCode::Cancelled))),
            Some(Some(Err(_))) => Err(self.stream_error(request, FtpError::new(ErrorCode::StreamTimedOut))),
            Some(Some(Ok(Err(err)))) => Err(self.stream_error(request, FtpError::from_io_or(err, ErrorCode::CantReadStream))),
            Some(Some(Ok(Ok(n)))) => {
                self.bytes_this_iteration = n;
                self.bytes_total += n as u64;
                Ok(Bytes::copy_from_slice(&self.buffer[..n]))
            }
        }
    }

    /// Writes as much of `data` as the channel accepts in one go and returns how much that was.
    /// Callers keep the rest for the next call.
    pub async fn write(&mut self, request: &Request, data: &[u8]) -> Result<usize, FtpError> {
        let data = &data[..data.len().min(self.buffer.len())];
        let result = match self.writer.as_mut() {
            Some(writer) => {
                let write = tokio::time::timeout(self.timeout, writer.write(data));
                Some(self.cancel.unless_cancelled(write).await)
            }
            None => None,
        };
        match result {
            None => Err(self.stream_error(request, FtpError::new(ErrorCode::CantWriteStream))),
            Some(None) => Err(self.stream_error(request, FtpError::new(ErrorCode::Cancelled))),
            Some(Some(Err(_))) => Err(self.stream_error(request, FtpError::new(ErrorCode::StreamTimedOut))),
            Some(Some(Ok(Err(err)))) => Err(self.stream_error(request, FtpError::from_io_or(err, ErrorCode::CantWriteStream))),
            Some(Some(Ok(Ok(0)))) if !data.is_empty() => Err(self.stream_error(request, FtpError::new(ErrorCode::CantWriteStream))),
            Some(Some(Ok(Ok(n)))) => {
                self.bytes_this_iteration = n;
                self.bytes_total += n as u64;
                Ok(n)
            }
        }
    }

    /// Closes the channels if the request was asked to stop. Returns true in that case.
    pub fn check_cancel_request(&mut self, request: &Request) -> bool {
        if self.cancel.is_requested() {
            self.close(request);
            true
        } else {
            false
        }
    }

    /// Closes the channels and records the error on the request. Returns the error so that it
    /// can be propagated.
    pub fn stream_error(&mut self, request: &Request, error: FtpError) -> FtpError {
        self.close(request);
        if !error.is_cancelled() {
            request.set_error(error.clone());
        }
        error
    }

    /// Finishes the transfer. The write channel is flushed and shut down so the server sees the
    /// end of the file. A server that rejects the data at that point fails the request.
    pub async fn stream_complete(&mut self, request: &Request) -> Result<(), FtpError> {
        self.reader = None;
        let result = match self.writer.as_mut() {
            Some(writer) => Some(tokio::time::timeout(self.timeout, writer.shutdown()).await),
            None => None,
        };
        match result {
            None | Some(Ok(Ok(()))) => {
                self.close(request);
                Ok(())
            }
            Some(Err(_)) => Err(self.stream_error(request, FtpError::new(ErrorCode::StreamTimedOut))),
            Some(Ok(Err(err))) => Err(self.stream_error(request, FtpError::from_io_or(err, ErrorCode::CantWriteStream))),
        }
    }

    /// Drops both channels without finishing them. Safe to call more than once.
    pub fn close(&mut self, request: &Request) {
        let reader = self.reader.take();
        let writer = self.writer.take();
        if reader.is_some() || writer.is_some() {
            request.set_stream_opened(false);
        }
    }
}
