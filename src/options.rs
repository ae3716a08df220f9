//! Contains the defaults and the option types that can be given to the
//! [`RequestsManager`](crate::RequestsManager) builder.

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

pub use unftp_client_core::transport::{Credentials, DataMode};

/// The number of bytes moved by a single read or write on a data channel.
pub const DEFAULT_CHUNK_SIZE: usize = 32768;

/// The base value, in seconds, of the data channel watchdog.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// What to report while transferring data of which the total size is not known, for example when
/// the server doesn't answer SIZE or for directory listings.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum ProgressPolicy {
    /// Report nothing until the request completes. Only the byte counters of the request advance.
    #[default]
    Suppress,
    /// Emit a [`RequestEvent::Transferred`](crate::notification::RequestEvent::Transferred) with
    /// the cumulative byte count after every chunk.
    ReportBytes,
}

impl Display for ProgressPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ProgressPolicy::Suppress => "Progress of transfers with unknown size is not reported",
                ProgressPolicy::ReportBytes => "Progress of transfers with unknown size is reported in bytes",
            }
        )
    }
}

/// Settings that apply to every data transfer a manager runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    /// Size of the chunk buffer
    pub chunk_size: usize,
    /// How long a data channel may go without progress
    pub timeout: Duration,
    /// Progress reporting for transfers of unknown size
    pub progress_policy: ProgressPolicy,
}

impl Default for TransferOptions {
    fn default() -> Self {
        TransferOptions {
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            progress_policy: ProgressPolicy::default(),
        }
    }
}
