//! Moving bytes between workflow storage and the local working directory.
//!
//! - [`Transport`]: the contract plugins and the fallback implement
//! - [`RetryPolicy`]: bounded retries with exponential backoff
//! - [`GenericTransport`]: built-in `file`, `http(s)`, `ftp`, `s3`, `gs` and `az` support
//! - [`Target`]: classification of a location as a bare path or a URI

mod error;
pub mod generic;
mod progress;
mod retry;
mod target;
mod transport;

pub use error::{Result, TransportError};
pub use generic::{GENERIC_SCHEMES, GenericTransport};
pub use progress::TransferProgress;
pub use retry::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BACKOFF, RetryPolicy, retry_delay};
pub use target::{Target, join_remote};
pub use transport::{FileSet, FileSetEntry, PluginSettings, Transport};
