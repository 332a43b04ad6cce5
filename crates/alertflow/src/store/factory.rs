use crate::store::{DatabaseConfig, SqliteStore, Store};
use std::sync::Arc;

pub async fn create_store(config: &DatabaseConfig) -> crate::Result<Arc<dyn Store>> {
    config.validate().map_err(crate::Error::Config)?;
    Ok(Arc::new(SqliteStore::connect(config).await?))
}
