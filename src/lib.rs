pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use config::{cli::LocalStorage, BatchSettings};
pub use core::engine::BatchEngine;
pub use core::report::BatchReport;
pub use utils::error::{PairgenError, Result};
