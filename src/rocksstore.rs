use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::config;
use crate::error::{StoreError, StoreResult};
use crate::prelude::{Entries, KVStore, StoreBackend};

// --- RocksDb based StoreBackend
//
// One database per schema, one column family per table. A database can
// only be opened once per process, so handles on the same path share an
// instance through its slot in OPEN_DBS; the instance closes with its last
// handle. Each slot has its own lock, so opening or closing one schema
// never waits on another.

type Slot = Arc<Mutex<Weak<rocksdb::DB>>>;

static OPEN_DBS: Lazy<Mutex<HashMap<PathBuf, Slot>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn open_dbs() -> MutexGuard<'static, HashMap<PathBuf, Slot>>
{
    OPEN_DBS.lock().unwrap_or_else(PoisonError::into_inner)
}

fn slot(path: &Path) -> Slot
{
    open_dbs().entry(path.to_path_buf()).or_default().clone()
}

fn lock_slot(slot: &Mutex<Weak<rocksdb::DB>>) -> MutexGuard<'_, Weak<rocksdb::DB>>
{
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn build_backend_rocks(_cfg: &config::StoreConfig)
    -> std::io::Result<Arc<dyn StoreBackend + Send + Sync>>
{
    Ok(Arc::new(RocksBackend))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RocksBackend;

fn rocks_io(what: &str, path: &Path, e: rocksdb::Error) -> std::io::Error
{
    std::io::Error::new(std::io::ErrorKind::Other,
                        std::format!("rocks-db {} {} failed: {}",
                                     what, path.display(), e))
}

fn ensure_table(db: &rocksdb::DB, path: &Path, table: &str)
    -> std::io::Result<()>
{
    if db.cf_handle(table).is_none() {
        // TODO: expose column family tuning (point lookups, small tables)
        // through StoreConfig.
        let opts = rocksdb::Options::default();
        db.create_cf(table, &opts)
            .map_err(|e| rocks_io("column-family creation", path, e))?;
    }
    Ok(())
}

impl StoreBackend for RocksBackend
{
    fn extension(&self) -> &'static str
    {
        "rocksdb"
    }

    fn open(&self, path: &Path, table: &str) -> std::io::Result<Box<dyn KVStore>>
    {
        let slot = slot(path);
        let mut shared = lock_slot(&slot);
        if let Some(db) = shared.upgrade() {
            ensure_table(&db, path, table)?;
            return Ok(Box::new(RocksTable::new(db, slot.clone(), path, table)));
        }

        let mut options = rocksdb::Options::default();
        options.create_if_missing(true);
        options.create_missing_column_families(true);

        let mut cfs = rocksdb::DB::list_cf(&options, path)
            .unwrap_or_default();
        if !cfs.iter().any(|cf| cf == table) {
            cfs.push(table.to_string());
        }
        let db = rocksdb::DB::open_cf(&options, path, &cfs)
            .map_err(|e| rocks_io("open", path, e))?;
        let db = Arc::new(db);
        *shared = Arc::downgrade(&db);
        tracing::debug!(path = %path.display(), "opened rocks-db store");

        Ok(Box::new(RocksTable::new(db, slot.clone(), path, table)))
    }
}

pub struct RocksTable
{
    db: Option<Arc<rocksdb::DB>>,
    slot: Slot,
    path: PathBuf,
    table: String,
}

impl RocksTable
{
    fn new(db: Arc<rocksdb::DB>, slot: Slot, path: &Path, table: &str) -> RocksTable
    {
        RocksTable {
            db: Some(db),
            slot,
            path: path.to_path_buf(),
            table: table.to_string(),
        }
    }

    fn db(&self) -> StoreResult<&rocksdb::DB>
    {
        self.db.as_deref().ok_or(StoreError::Closed)
    }

    fn column_family<'a>(&self, db: &'a rocksdb::DB)
        -> StoreResult<Arc<rocksdb::BoundColumnFamily<'a>>>
    {
        db.cf_handle(&self.table).ok_or_else(|| StoreError::Io(
                std::io::Error::new(std::io::ErrorKind::NotFound,
                    std::format!("table {} not found", &self.table))))
    }

    fn sync_writes() -> rocksdb::WriteOptions
    {
        let mut opts = rocksdb::WriteOptions::default();
        opts.set_sync(true);
        opts
    }
}

fn decode_key(bytes: &[u8]) -> StoreResult<String>
{
    String::from_utf8(bytes.to_vec())
        .map_err(|e| StoreError::Corrupt(std::format!("non utf-8 key: {}", e)))
}

impl KVStore for RocksTable
{
    fn get(&self, key: &str) -> StoreResult<Option<Value>>
    {
        let db = self.db()?;
        let cf = self.column_family(db)?;
        match db.get_cf(&cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, value: &Value) -> StoreResult<()>
    {
        let db = self.db()?;
        let cf = self.column_family(db)?;
        let bytes = serde_json::to_vec(value)?;
        db.put_cf_opt(&cf, key, bytes, &Self::sync_writes())?;
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool>
    {
        let db = self.db()?;
        let cf = self.column_family(db)?;
        if db.get_pinned_cf(&cf, key)?.is_none() {
            return Ok(false);
        }
        db.delete_cf_opt(&cf, key, &Self::sync_writes())?;
        Ok(true)
    }

    fn len(&self) -> StoreResult<usize>
    {
        let db = self.db()?;
        let cf = self.column_family(db)?;
        let mut count = 0;
        for record in db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            record?;
            count += 1;
        }
        Ok(count)
    }

    fn clear(&self) -> StoreResult<()>
    {
        let db = self.db()?;
        let cf = self.column_family(db)?;
        let mut batch = rocksdb::WriteBatch::default();
        for record in db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (key, _) = record?;
            batch.delete_cf(&cf, key);
        }
        db.write_opt(batch, &Self::sync_writes())?;
        Ok(())
    }

    fn iter(&self) -> StoreResult<Entries<'_>>
    {
        let db = self.db()?;
        let cf = self.column_family(db)?;
        let records = db.iterator_cf(&cf, rocksdb::IteratorMode::Start)
            .map(|record| -> StoreResult<(String, Value)> {
                let (key, value) = record?;
                Ok((decode_key(&key)?, serde_json::from_slice(&value)?))
            });
        Ok(Box::new(records))
    }

    fn close(self: Box<Self>) -> StoreResult<()>
    {
        drop(self);
        Ok(())
    }
}

impl Drop for RocksTable
{
    fn drop(&mut self)
    {
        // The last reference closes the database; do it while holding the
        // slot so a concurrent open of the same path can't race the LOCK file.
        let shared = lock_slot(&self.slot);
        drop(self.db.take());
        if shared.strong_count() == 0 {
            tracing::debug!(path = %self.path.display(), "closed rocks-db store");
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn is_open(path: &Path) -> bool
    {
        open_dbs().get(path).map_or(false, |slot| lock_slot(slot).strong_count() > 0)
    }

    #[test]
    fn writes_survive_close_and_reopen()
    {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bbs.rocksdb");

        let users = RocksBackend.open(&path, "users").unwrap();
        users.put("biff", &json!({"location": "nowhere"})).unwrap();
        users.close().unwrap();
        assert!(!is_open(&path));

        let users = RocksBackend.open(&path, "users").unwrap();
        assert_eq!(users.get("biff").unwrap(),
                   Some(json!({"location": "nowhere"})));
        users.close().unwrap();
    }

    #[test]
    fn handles_on_one_path_share_the_database()
    {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared.rocksdb");

        let a = RocksBackend.open(&path, "a").unwrap();
        let b = RocksBackend.open(&path, "b").unwrap();
        a.put("k", &json!(1)).unwrap();
        b.put("k", &json!(2)).unwrap();
        assert_eq!(a.get("k").unwrap(), Some(json!(1)));
        assert_eq!(b.get("k").unwrap(), Some(json!(2)));

        a.close().unwrap();
        assert!(is_open(&path));
        b.close().unwrap();
        assert!(!is_open(&path));
    }

    #[test]
    fn delete_len_clear_and_iter()
    {
        let dir = TempDir::new().unwrap();
        let table = RocksBackend.open(&dir.path().join("t.rocksdb"), "t")
            .unwrap();
        for (k, v) in [("b", 2), ("a", 1), ("c", 3)] {
            table.put(k, &json!(v)).unwrap();
        }
        assert_eq!(table.len().unwrap(), 3);
        assert!(table.delete("b").unwrap());
        assert!(!table.delete("b").unwrap());

        let records: Vec<(String, Value)> = table.iter().unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(records, vec![("a".to_string(), json!(1)),
                                 ("c".to_string(), json!(3))]);

        table.clear().unwrap();
        assert!(table.is_empty().unwrap());
        table.close().unwrap();
    }

    #[test]
    fn busy_schema_does_not_block_another()
    {
        let dir = TempDir::new().unwrap();
        let busy = dir.path().join("busy.rocksdb");
        let idle = dir.path().join("idle.rocksdb");

        // Holding one path's slot stands in for a long open or close of it.
        let busy_slot = slot(&busy);
        let held = lock_slot(&busy_slot);

        let (tx, rx) = std::sync::mpsc::channel();
        let worker = std::thread::spawn(move || {
            let table = RocksBackend.open(&idle, "t").unwrap();
            table.put("k", &json!(1)).unwrap();
            table.close().unwrap();
            tx.send(()).unwrap();
        });
        let finished = rx.recv_timeout(std::time::Duration::from_secs(10));
        drop(held);
        worker.join().unwrap();
        assert!(finished.is_ok(), "open of an unrelated schema was blocked");
    }
}
