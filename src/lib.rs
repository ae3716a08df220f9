//! unftp-client is an asynchronous, queued FTP client request engine.
//!
//! Requests for a host (directory listings, directory creation, deletes, uploads and downloads)
//! are added to a [`RequestsManager`]. The manager runs them strictly one at a time, in the order
//! they were added, streams file data in fixed-size chunks and reports what happens to a
//! [`RequestListener`](notification::RequestListener). How bytes reach the server is up to a
//! [`Transport`](transport::Transport); `unftp-transport-fs` provides one that serves a local
//! directory.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use unftp_client::{RequestsManager, notification::{EventMeta, RequestEvent, RequestListener}};
//! use unftp_transport_fs::Filesystem;
//!
//! #[derive(Debug)]
//! struct Printer;
//!
//! #[async_trait]
//! impl RequestListener for Printer {
//!     async fn receive_request_event(&self, e: RequestEvent, m: EventMeta) {
//!         println!("{} #{}: {:?}", m.hostname, m.sequence_number, e);
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let printer = Arc::new(Printer);
//! let manager = RequestsManager::builder("localhost", Arc::new(Filesystem::new(std::env::temp_dir())))
//!     .listener(&printer)
//!     .build()
//!     .unwrap();
//!
//! manager.add_request_for_create_directory("/reports");
//! manager.add_request_for_list_directory("/");
//! manager.start_processing_requests();
//! # }
//! ```
//!
//! For simple request/response style access see [`FtpClient`].

pub mod client;
pub mod error;
pub mod listing;
pub mod manager;
pub mod notification;
pub mod options;
pub mod queue;
pub mod request;
pub mod source;
pub mod transfer;

pub use client::FtpClient;
pub use error::{ErrorCode, FtpError};
pub use manager::{ManagerError, RequestsManager, RequestsManagerBuilder};
pub use request::{Operation, Request, RequestState};
pub use source::{DataSource, LocalFileSource};
pub use unftp_client_core::transport;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
