use super::{Completion, Context, Failure, Request, acknowledged};
use crate::error::ErrorCode;
use slog::Logger;
use std::sync::Arc;

/// Removes a directory when the path ends with a slash and a file otherwise.
#[tracing_attributes::instrument(skip(ctx, logger))]
pub(super) async fn execute(request: &Arc<Request>, ctx: &Context, logger: &Logger) -> Result<Completion, Failure> {
    let target = request.target();
    if request.path().ends_with('/') {
        acknowledged(request, ctx, ctx.transport.rmd(&target), ErrorCode::CantDeleteFileOrDirectory).await?;
        slog::debug!(logger, "Directory removed");
    } else {
        acknowledged(request, ctx, ctx.transport.del(&target), ErrorCode::CantDeleteFileOrDirectory).await?;
        slog::debug!(logger, "File removed");
    }
    Ok(Completion::Deleted)
}
