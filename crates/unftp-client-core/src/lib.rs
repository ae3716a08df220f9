//! Core traits and types for unftp-client transports.

pub mod transport;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
