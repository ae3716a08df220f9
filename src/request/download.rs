use super::{Completion, Context, Failure, Request};
use crate::{
    error::{ErrorCode, FtpError},
    transfer::TransferBuffer,
};
use slog::Logger;
use std::{path::Path, sync::Arc};
use tokio::{fs::File, io::AsyncWriteExt};

#[tracing_attributes::instrument(skip(ctx, logger))]
pub(super) async fn execute(request: &Arc<Request>, local_path: &Path, ctx: &Context, logger: &Logger) -> Result<Completion, Failure> {
    if let Ok(meta) = tokio::fs::metadata(local_path).await {
        if meta.is_dir() {
            return Err(FtpError::new(ErrorCode::CantOverwriteDirectory).into());
        }
        let overwrite = match ctx.listener.upgrade() {
            Some(listener) => listener.should_overwrite(request, local_path).await,
            None => false,
        };
        if !overwrite {
            return Err(FtpError::new(ErrorCode::FileAlreadyExists).into());
        }
        slog::info!(logger, "Overwriting local file {:?}", local_path);
    }

    let target = request.target();
    let size = tokio::time::timeout(ctx.options.timeout, ctx.transport.size(&target));
    let expected = match request.cancel_flag().unless_cancelled(size).await {
        None => return Err(Failure::Cancelled),
        Some(Ok(Ok(size))) => Some(size),
        Some(_) => None,
    };
    request.set_maximum_size(expected);

    let mut buffer = TransferBuffer::new(request, &ctx.options);
    buffer.open_read(request, ctx.transport.retrieve(&target)).await?;
    let mut file = match tokio::fs::File::create(local_path).await {
        Ok(file) => file,
        Err(error) => {
            buffer.close(request);
            return Err(Failure::LocalWrite {
                path: local_path.to_path_buf(),
                error,
            });
        }
    };

    let result = receive(request, local_path, expected, &mut buffer, &mut file, ctx, logger).await;
    if result.is_err() {
        buffer.close(request);
        drop(file);
        // Don't leave a partial file behind.
        if let Err(e) = tokio::fs::remove_file(local_path).await {
            slog::debug!(logger, "Could not remove partial download {:?}: {}", local_path, e);
        }
    }
    result
}

async fn receive(
    request: &Arc<Request>,
    local_path: &Path,
    expected: Option<u64>,
    buffer: &mut TransferBuffer,
    file: &mut File,
    ctx: &Context,
    logger: &Logger,
) -> Result<Completion, Failure> {
    let local_write = |error| Failure::LocalWrite {
        path: local_path.to_path_buf(),
        error,
    };
    loop {
        if buffer.check_cancel_request(request) {
            return Err(Failure::Cancelled);
        }
        let chunk = buffer.read(request).await?;
        if chunk.is_empty() {
            break;
        }
        file.write_all(&chunk).await.map_err(local_write)?;
        let progress = request.record_received(chunk.len());
        request.report_progress(ctx, progress);
    }
    file.flush().await.map_err(local_write)?;
    buffer.stream_complete(request).await?;

    match expected {
        Some(size) if request.total_bytes_received() < size => {
            slog::warn!(logger, "Server closed the data channel early"; "expected" => size, "received" => request.total_bytes_received());
            Err(FtpError::new(ErrorCode::MissingRequestDataAvailable).into())
        }
        _ => Ok(Completion::Downloaded),
    }
}
