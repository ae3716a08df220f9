//! Allows users to follow the requests of a [`RequestsManager`](crate::RequestsManager).
//!
//! Implement the [`RequestListener`] trait and hand it to
//! [`RequestsManagerBuilder::listener`](crate::RequestsManagerBuilder::listener). The manager
//! only keeps a weak reference: once the caller drops its listener, events are discarded.
//!

pub(crate) mod dispatch;
pub(crate) mod event;
pub(crate) mod nop;

pub(crate) use dispatch::EventSender;
pub use event::{EventMeta, RequestEvent, RequestListener};
pub use nop::NopListener;
