use super::{Completion, Context, Failure, Request};
use crate::{listing::parse_listing, transfer::TransferBuffer};
use bytes::BytesMut;
use slog::Logger;
use std::sync::Arc;

/// Reads the complete listing of a directory, then parses it.
#[tracing_attributes::instrument(skip(ctx, logger))]
pub(super) async fn execute(request: &Arc<Request>, ctx: &Context, logger: &Logger) -> Result<Completion, Failure> {
    let target = request.target();
    let mut buffer = TransferBuffer::new(request, &ctx.options);
    buffer.open_read(request, ctx.transport.list(&target)).await?;

    let mut listing = BytesMut::new();
    loop {
        if buffer.check_cancel_request(request) {
            return Err(Failure::Cancelled);
        }
        let chunk = buffer.read(request).await?;
        if chunk.is_empty() {
            break;
        }
        listing.extend_from_slice(&chunk);
        let progress = request.record_received(chunk.len());
        request.report_progress(ctx, progress);
    }
    buffer.stream_complete(request).await?;

    let entries = parse_listing(&String::from_utf8_lossy(&listing));
    slog::debug!(logger, "Parsed directory listing"; "entries" => entries.len(), "bytes" => listing.len());
    Ok(Completion::Listed(entries))
}
