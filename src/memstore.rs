use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::config;
use crate::error::{StoreError, StoreResult};
use crate::prelude::{Entries, KVStore, StoreBackend};

pub fn build_backend_mem(_cfg: &config::StoreConfig)
    -> std::io::Result<Arc<dyn StoreBackend + Send + Sync>>
{
    Ok(Arc::new(MemBackend::new()))
}

type TableId = (PathBuf, String);
type Tables = Arc<Mutex<HashMap<TableId, BTreeMap<String, Value>>>>;

/// Process-local store. Tables live as long as the backend does.
#[derive(Debug, Default)]
pub struct MemBackend
{
    tables: Tables,
    opens: AtomicUsize,
    closes: Arc<AtomicUsize>,
}

impl MemBackend
{
    pub fn new() -> MemBackend
    {
        MemBackend::default()
    }

    pub fn opens(&self) -> usize
    {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize
    {
        self.closes.load(Ordering::SeqCst)
    }
}

impl StoreBackend for MemBackend
{
    fn extension(&self) -> &'static str
    {
        "mem"
    }

    fn open(&self, path: &Path, table: &str) -> std::io::Result<Box<dyn KVStore>>
    {
        let id = (path.to_path_buf(), table.to_string());
        {
            let mut tables = self.tables.lock().map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::Other,
                                    "memory store lock poisoned")
            })?;
            tables.entry(id.clone()).or_default();
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemTable {
            tables: self.tables.clone(),
            id,
            closes: self.closes.clone(),
        }))
    }
}

pub struct MemTable
{
    tables: Tables,
    id: TableId,
    closes: Arc<AtomicUsize>,
}

impl MemTable
{
    fn with_table<T>(&self, f: impl FnOnce(&mut BTreeMap<String, Value>) -> T)
        -> StoreResult<T>
    {
        let mut tables = self.tables.lock()
            .map_err(|_| StoreError::Corrupt("memory store lock poisoned".into()))?;
        Ok(f(tables.entry(self.id.clone()).or_default()))
    }
}

impl KVStore for MemTable
{
    fn get(&self, key: &str) -> StoreResult<Option<Value>>
    {
        self.with_table(|map| map.get(key).cloned())
    }

    fn put(&self, key: &str, value: &Value) -> StoreResult<()>
    {
        self.with_table(|map| {
            map.insert(key.to_string(), value.clone());
        })
    }

    fn delete(&self, key: &str) -> StoreResult<bool>
    {
        self.with_table(|map| map.remove(key).is_some())
    }

    fn len(&self) -> StoreResult<usize>
    {
        self.with_table(|map| map.len())
    }

    fn clear(&self) -> StoreResult<()>
    {
        self.with_table(|map| map.clear())
    }

    fn iter(&self) -> StoreResult<Entries<'_>>
    {
        let snapshot: Vec<(String, Value)> = self.with_table(|map| {
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        })?;
        Ok(Box::new(snapshot.into_iter().map(Ok::<_, StoreError>)))
    }

    fn close(self: Box<Self>) -> StoreResult<()>
    {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use serde_json::json;

    #[test]
    fn tables_are_isolated_and_persist_across_opens()
    {
        let backend = MemBackend::new();
        let path = Path::new("/data/bbs.mem");

        let users = backend.open(path, "users").unwrap();
        users.put("biff", &json!({"handle": "biff"})).unwrap();
        users.close().unwrap();

        let other = backend.open(path, "msgs").unwrap();
        assert!(other.is_empty().unwrap());
        other.close().unwrap();

        let users = backend.open(path, "users").unwrap();
        assert_eq!(users.get("biff").unwrap(), Some(json!({"handle": "biff"})));
        assert!(users.delete("biff").unwrap());
        assert!(!users.delete("biff").unwrap());
        users.close().unwrap();

        assert_eq!(backend.opens(), 3);
        assert_eq!(backend.closes(), 3);
    }

    #[test]
    fn iterates_in_key_order()
    {
        let backend = MemBackend::new();
        let table = backend.open(Path::new("x.mem"), "t").unwrap();
        for k in ["c", "a", "b"] {
            table.put(k, &json!(k)).unwrap();
        }
        let keys: Vec<String> = table.iter().unwrap()
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }
}
