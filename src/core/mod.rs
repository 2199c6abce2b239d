pub mod allocator;
pub mod checker;
pub mod engine;
pub mod extractor;
pub mod instantiator;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod store;

pub use crate::domain::model::{Binding, PairRecord, Verdict};
pub use crate::domain::ports::{ConfigProvider, Storage};
pub use crate::utils::error::Result;
