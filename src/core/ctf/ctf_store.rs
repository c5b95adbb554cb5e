use async_trait::async_trait;

use super::ctf_models::GlobalData;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage layer abstraction for the persisted guild state.
///
/// `load` never fails on a missing or corrupt file; it falls back to an
/// empty `GlobalData` so a fresh deployment starts clean. `save` failures
/// must propagate: silently dropping a write would desynchronize what users
/// were told from what is on disk.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> Result<GlobalData, StoreError>;
    async fn save(&self, data: &GlobalData) -> Result<(), StoreError>;
}
