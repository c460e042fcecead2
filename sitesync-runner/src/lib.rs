//! # sitesync-runner
//!
//! Ties configuration, the instance lock, the sync engine and the mirror
//! pipeline into one run. [`run_once`] is the whole program minus argument
//! parsing and output.

mod error;
pub mod lock;
pub mod logging;
pub mod orchestrator;
pub mod paths;

pub use error::{LockError, RunError};
pub use lock::InstanceLock;
pub use logging::init_tracing;
pub use orchestrator::{engine_options, http_sources, run_once, RunOutcome, RunReport};
