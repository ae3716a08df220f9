use super::{Completion, Context, Failure, Request};
use crate::{
    error::{ErrorCode, FtpError},
    transfer::TransferBuffer,
};
use bytes::{Buf, Bytes};
use slog::Logger;
use std::sync::Arc;

#[tracing_attributes::instrument(skip(ctx, logger))]
pub(super) async fn execute(request: &Arc<Request>, ctx: &Context, logger: &Logger) -> Result<Completion, Failure> {
    let result = send(request, ctx, logger).await;
    ctx.data_source.release(request).await;
    result
}

async fn send(request: &Arc<Request>, ctx: &Context, logger: &Logger) -> Result<Completion, Failure> {
    let expected = ctx.data_source.data_size(request).await;
    request.set_maximum_size(expected);

    let mut buffer = TransferBuffer::new(request, &ctx.options);
    let mut pending = match next_block(request, ctx, &mut buffer).await? {
        Some(block) => block,
        None if expected == Some(0) => Bytes::new(),
        None => return Err(buffer.stream_error(request, FtpError::new(ErrorCode::SentDataIsNil)).into()),
    };

    let target = request.target();
    buffer.open_write(request, ctx.transport.store(&target)).await?;
    slog::debug!(logger, "Data channel open"; "expected" => expected);

    loop {
        if buffer.check_cancel_request(request) {
            return Err(Failure::Cancelled);
        }
        if pending.is_empty() {
            match next_block(request, ctx, &mut buffer).await? {
                Some(block) => pending = block,
                None => break,
            }
        }
        let written = buffer.write(request, &pending).await?;
        pending.advance(written);
        let progress = request.record_sent(written);
        request.report_progress(ctx, progress);
    }
    buffer.stream_complete(request).await?;
    Ok(Completion::Uploaded)
}

// The next non-empty block from the data source, None once it is exhausted.
async fn next_block(request: &Arc<Request>, ctx: &Context, buffer: &mut TransferBuffer) -> Result<Option<Bytes>, FtpError> {
    match ctx.data_source.data(request).await {
        Ok(Some(block)) if !block.is_empty() => Ok(Some(block)),
        Ok(_) => Ok(None),
        Err(err) => Err(buffer.stream_error(request, FtpError::from_io_or(err, ErrorCode::CantReadStream))),
    }
}
