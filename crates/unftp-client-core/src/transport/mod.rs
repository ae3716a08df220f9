//! Contains the [`Transport`] trait that the unftp-client request engine uses to talk to an FTP
//! server.
//!
//! The engine never speaks the FTP protocol itself. It asks a transport for data channels and
//! acknowledgements and maps whatever goes wrong onto its own error codes. To create a new
//! transport:
//!
//! 1. Declare dependencies on the async-trait, tokio, and unftp-client-core crates:
//!
//! ```toml
//! async-trait = "0.1.88"
//! tokio = { version = "1.49.0", features = ["full"] }
//! unftp-client-core = { path = "../path/to/unftp-client-core" }
//! ```
//!
//! 2. Implement the [`Transport`] trait:
//!
//! ```no_run
//! use async_trait::async_trait;
//! use unftp_client_core::transport::{Error, ReadChannel, Result, Target, Transport, WriteChannel};
//!
//! #[derive(Debug)]
//! pub struct Refusing;
//!
//! #[async_trait]
//! impl Transport for Refusing {
//!     async fn list(&self, _target: &Target) -> Result<ReadChannel> {
//!         Err(Error::reply(550))
//!     }
//!
//!     async fn retrieve(&self, _target: &Target) -> Result<ReadChannel> {
//!         Err(Error::reply(550))
//!     }
//!
//!     async fn store(&self, _target: &Target) -> Result<WriteChannel> {
//!         Err(Error::reply(553))
//!     }
//!
//!     async fn mkd(&self, _target: &Target) -> Result<()> {
//!         Err(Error::reply(550))
//!     }
//!
//!     async fn del(&self, _target: &Target) -> Result<()> {
//!         Err(Error::reply(550))
//!     }
//!
//!     async fn rmd(&self, _target: &Target) -> Result<()> {
//!         Err(Error::reply(550))
//!     }
//! }
//! ```
//!
//! 3. Hand it to the `RequestsManager` builder in your application.
//!

mod error;
pub use error::{Error, ErrorKind};

mod backend;
pub use backend::{Credentials, DataMode, ReadChannel, Result, Target, Transport, WriteChannel};
