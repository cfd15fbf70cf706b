use std::path::Path;

use serde_json::Value;

use crate::error::StoreResult;

/// Lazily produced `(key, value)` records of one table, in key order.
pub type Entries<'a> = Box<dyn Iterator<Item = StoreResult<(String, Value)>> + 'a>;

/// Opens storage handles on behalf of workers.
pub trait StoreBackend
{
    /// File extension for a schema's store, without the leading dot.
    fn extension(&self) -> &'static str;

    /// Open, creating if absent, the table `table` of the store at `path`.
    /// Every mutation made through the handle commits immediately.
    fn open(&self, path: &Path, table: &str) -> std::io::Result<Box<dyn KVStore>>;
}

/// One table of one schema's store, owned by a single worker.
pub trait KVStore: Send
{
    fn get(&self, key: &str) -> StoreResult<Option<Value>>;
    fn put(&self, key: &str, value: &Value) -> StoreResult<()>;
    /// Returns whether the key was present.
    fn delete(&self, key: &str) -> StoreResult<bool>;
    fn len(&self) -> StoreResult<usize>;
    fn clear(&self) -> StoreResult<()>;
    fn iter(&self) -> StoreResult<Entries<'_>>;

    fn is_empty(&self) -> StoreResult<bool>
    {
        Ok(self.len()? == 0)
    }

    /// Release the handle. Called exactly once per open.
    fn close(self: Box<Self>) -> StoreResult<()>;
}
