use std::sync::Arc;

use crate::config;
use crate::memstore;
use crate::prelude;
use crate::rocksstore;

pub fn create_backend(cfg: &config::StoreConfig)
    -> std::io::Result<Arc<dyn prelude::StoreBackend + Send + Sync>>
{
    match cfg.name.as_str() {
        "rocks" => rocksstore::build_backend_rocks(cfg),
        "mem" => memstore::build_backend_mem(cfg),
        unsupported_store_name => {
            Err(std::io::Error::new(std::io::ErrorKind::InvalidInput,
                    std::format!("Unsupported store name {}",
                                 unsupported_store_name)))
        }
    }
}
