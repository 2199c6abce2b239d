use crate::domain::model::{AppOverride, MissingRoutePolicy};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// File boundary. Paths are relative to the storage root.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()>;
    /// Names of the regular files directly under the root, sorted.
    async fn list_files(&self) -> Result<Vec<String>>;
}

pub trait ConfigProvider: Send + Sync {
    fn input_dir(&self) -> &str;
    fn output_dir(&self) -> &str;
    fn base_port(&self) -> u16;
    fn workers(&self) -> usize;
    fn dry_run(&self) -> bool;
    fn missing_route_policy(&self) -> MissingRoutePolicy;
    /// Variable bindings shared by every application.
    fn global_bindings(&self) -> &BTreeMap<String, String>;
    fn app_override(&self, app_id: &str) -> Option<&AppOverride>;
}
