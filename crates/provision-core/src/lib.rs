//! Provisioning of workflow input and output files.
//!
//! A [`Provisioner`] takes a batch of [`TransferRequest`]s and moves each one
//! through the [`Dispatcher`], which routes a remote path to the plugin that
//! declared its scheme or to the built-in generic transport. Downloads go
//! through an optional [`ContentCache`]; uploads are grouped so every
//! transport sees one prepare and one finalize call per batch.
//!
//! ```no_run
//! use provision_core::{Dispatcher, ProvisionConfig, Provisioner, TransferRequest};
//! use provision_plugin::PluginSet;
//! use provision_transport::GenericTransport;
//!
//! # async fn run() -> provision_core::Result<()> {
//! let config = ProvisionConfig::load(None)?;
//! let dispatcher = Dispatcher::new(PluginSet::default(), GenericTransport::new());
//! let provisioner = Provisioner::builder(dispatcher)
//!     .threads(config.get_threads())
//!     .retry(config.retry_policy())
//!     .working_dir("/tmp/job")
//!     .build();
//!
//! let report = provisioner
//!     .download(vec![TransferRequest::download(
//!         "reference",
//!         "https://example.org/ref.fa",
//!         "inputs/ref.fa",
//!     )])
//!     .await?;
//! assert!(report.all_succeeded());
//! # Ok(())
//! # }
//! ```

mod cache;
mod config;
mod dispatch;
mod error;
mod pool;
mod provision;
mod request;
mod stage;

pub use cache::{ContentCache, IdentifierLock, cache_key};
pub use config::{CONFIG_DIR, CONFIG_FILE, DEFAULT_EXCLUDES, DEFAULT_THREADS, ProvisionConfig};
pub use dispatch::{Dispatcher, Route};
pub use error::{ProvisionError, Result};
pub use provision::{Provisioner, ProvisionerBuilder};
pub use request::{Direction, ErrorKind, ProvisionReport, TransferOutcome, TransferRequest};
pub use stage::Stager;
