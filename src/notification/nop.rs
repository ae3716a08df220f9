use crate::notification::event::{EventMeta, RequestEvent, RequestListener};

use async_trait::async_trait;

/// A listener that does nothing. Used by the [`RequestsManager`](crate::RequestsManager) when no
/// listener was configured.
#[derive(Debug)]
pub struct NopListener {}

#[async_trait]
impl RequestListener for NopListener {
    async fn receive_request_event(&self, _: RequestEvent, _: EventMeta) {}
}
