use super::{Completion, Context, Failure, Request, acknowledged};
use crate::error::ErrorCode;
use slog::Logger;
use std::sync::Arc;

#[tracing_attributes::instrument(skip(ctx, logger))]
pub(super) async fn execute(request: &Arc<Request>, ctx: &Context, logger: &Logger) -> Result<Completion, Failure> {
    let target = request.target();
    acknowledged(request, ctx, ctx.transport.mkd(&target), ErrorCode::ServerUnknownError).await?;
    slog::debug!(logger, "Directory created");
    Ok(Completion::DirectoryCreated)
}
