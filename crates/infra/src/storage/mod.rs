//! State store adapters

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use pacegate_core::StateStore;
use pacegate_domain::{Result, StoreConfig};

pub use memory::InMemoryStateStore;
pub use sqlite::SqliteStateStore;

/// Open the store selected by `config`
pub fn open_state_store(config: &StoreConfig) -> Result<Arc<dyn StateStore>> {
    if config.is_in_memory() {
        return Ok(Arc::new(InMemoryStateStore::new()));
    }
    Ok(Arc::new(SqliteStateStore::from_config(config)?))
}
