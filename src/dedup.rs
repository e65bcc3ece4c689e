//! A set of (resource, token) keys with a payload per key, used to avoid probing and
//! reporting the same location twice in a scan.
//!
//! The first `memory_limit` entries are kept in memory. Entries beyond that are written
//! to an SQLite database in a temporary directory, which is deleted when the store is
//! cleared or dropped. Lookups check both.

use std::sync::Mutex;

use ahash::RandomState;
use anyhow::Context;
use indexmap::IndexMap;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Serialize, de::DeserializeOwned};
use tempfile::TempDir;

/// Identifies one token of one resource. Keys compare by value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct DedupKey {
    pub url: String,
    pub token_name: String,
}

impl DedupKey {
    pub fn new(url: impl Into<String>, token_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token_name: token_name.into(),
        }
    }
}

pub struct DedupStore<V> {
    name: String,
    memory_limit: usize,
    inner: Mutex<Inner<V>>,
}

struct Inner<V> {
    memory: IndexMap<DedupKey, V, RandomState>,
    disk: Option<Spill>,
}

/// The on-disk part of the store. The directory is removed when this is dropped.
struct Spill {
    connection: Connection,
    len: usize,
    _dir: TempDir,
}

impl Spill {
    fn create(name: &str) -> anyhow::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("wuppieaudit-{name}-"))
            .tempdir()
            .context("Error creating directory for deduplication store")?;
        let path = dir.path().join("entries.db");
        let connection = Connection::open(&path)
            .with_context(|| format!("Error opening deduplication database {path:?}"))?;
        connection
            .execute(
                "CREATE TABLE entries (
                    url TEXT NOT NULL,
                    token_name TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (url, token_name)
                )",
                (),
            )
            .context("Error creating deduplication table")?;
        log::debug!("Deduplication store {name} spills to {path:?}");
        Ok(Self {
            connection,
            len: 0,
            _dir: dir,
        })
    }

    fn contains(&self, key: &DedupKey) -> anyhow::Result<bool> {
        let found: Option<i64> = self
            .connection
            .query_row(
                "SELECT 1 FROM entries WHERE url = ?1 AND token_name = ?2",
                params![key.url, key.token_name],
                |row| row.get(0),
            )
            .optional()
            .context("Error querying deduplication database")?;
        Ok(found.is_some())
    }

    fn insert(&mut self, key: &DedupKey, value: &str) -> anyhow::Result<bool> {
        let changed = self
            .connection
            .execute(
                "INSERT OR IGNORE INTO entries (url, token_name, value) VALUES (?1, ?2, ?3)",
                params![key.url, key.token_name, value],
            )
            .context("Error writing to deduplication database")?;
        self.len += changed;
        Ok(changed > 0)
    }
}

impl<V> DedupStore<V>
where
    V: Serialize + DeserializeOwned,
{
    /// Creates an empty store. `name` only shows up in logs and temporary file names.
    pub fn new(name: &str, memory_limit: usize) -> Self {
        Self {
            name: name.to_owned(),
            memory_limit,
            inner: Mutex::new(Inner {
                memory: IndexMap::with_hasher(RandomState::new()),
                disk: None,
            }),
        }
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, Inner<V>>> {
        self.inner
            .lock()
            .map_err(|_| anyhow::anyhow!("Deduplication store {} is poisoned", self.name))
    }

    pub fn contains(&self, key: &DedupKey) -> anyhow::Result<bool> {
        let inner = self.lock()?;
        if inner.memory.contains_key(key) {
            return Ok(true);
        }
        match &inner.disk {
            Some(disk) => disk.contains(key).inspect_err(|err| {
                log::error!("Deduplication store {} failed: {err:#}", self.name)
            }),
            None => Ok(false),
        }
    }

    /// Adds `key` unless it is already present. Returns whether it was added. The check
    /// and the insertion happen under one lock, so concurrent callers adding the same
    /// key see exactly one success.
    pub fn add(&self, key: DedupKey, value: V) -> anyhow::Result<bool> {
        let mut inner = self.lock()?;
        let Inner { memory, disk } = &mut *inner;
        if memory.contains_key(&key) {
            return Ok(false);
        }
        if let Some(disk) = disk.as_ref() {
            if disk.contains(&key)? {
                return Ok(false);
            }
        }
        if memory.len() < self.memory_limit {
            memory.insert(key, value);
            return Ok(true);
        }
        let serialized =
            serde_json::to_string(&value).context("Error serializing deduplication entry")?;
        if disk.is_none() {
            *disk = Some(Spill::create(&self.name)?);
        }
        let Some(disk) = disk.as_mut() else {
            return Ok(false);
        };
        disk.insert(&key, &serialized).inspect_err(|err| {
            log::error!("Deduplication store {} failed: {err:#}", self.name)
        })
    }

    /// The number of distinct keys in the store.
    /// Number of entries. A poisoned store is logged and counts as empty.
    pub fn len(&self) -> usize {
        match self.lock() {
            Ok(inner) => inner.memory.len() + inner.disk.as_ref().map_or(0, |disk| disk.len),
            Err(err) => {
                log::error!("{err}");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls `f` on every entry: first those kept in memory, in insertion order, then
    /// those on disk. Entries on disk are streamed, never all loaded at once.
    ///
    /// `f` must not call back into this store.
    pub fn try_for_each<F>(&self, mut f: F) -> anyhow::Result<()>
    where
        F: FnMut(&DedupKey, V) -> anyhow::Result<()>,
        V: Clone,
    {
        let inner = self.lock()?;
        for (key, value) in &inner.memory {
            f(key, value.clone())?;
        }
        if let Some(disk) = &inner.disk {
            let mut statement = disk
                .connection
                .prepare("SELECT url, token_name, value FROM entries ORDER BY rowid")
                .context("Error reading deduplication database")?;
            let mut rows = statement
                .query(())
                .context("Error reading deduplication database")?;
            while let Some(row) = rows.next().context("Error reading deduplication database")? {
                let key = DedupKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?);
                let value: V = serde_json::from_str(&row.get::<_, String>(2)?)
                    .context("Error deserializing deduplication entry")?;
                f(&key, value)?;
            }
        }
        Ok(())
    }

    /// Empties the store and removes its on-disk part.
    pub fn clear(&self) -> anyhow::Result<()> {
        let mut inner = self.lock()?;
        inner.memory.clear();
        inner.disk = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{DedupKey, DedupStore};

    #[test]
    fn test_add_is_idempotent() {
        let store = DedupStore::new("test", 16);
        let key = DedupKey::new("http://a/x", "id");
        assert!(store.add(key.clone(), 1u64).unwrap());
        assert!(!store.add(key.clone(), 2u64).unwrap());
        assert_eq!(store.len(), 1);
        assert!(store.contains(&key).unwrap());
        assert!(
            !store
                .contains(&DedupKey::new("http://a/x", "other"))
                .unwrap()
        );
    }

    #[test]
    fn test_spills_beyond_memory_limit() {
        let store = DedupStore::new("spill", 2);
        for i in 0..5 {
            assert!(
                store
                    .add(DedupKey::new(format!("http://a/{i}"), "q"), format!("v{i}"))
                    .unwrap()
            );
        }
        assert_eq!(store.len(), 5);
        // Keys on disk are found, and not added twice
        let spilled = DedupKey::new("http://a/4", "q");
        assert!(store.contains(&spilled).unwrap());
        assert!(!store.add(spilled, "again".to_string()).unwrap());
        assert_eq!(store.len(), 5);

        let mut seen = vec![];
        store
            .try_for_each(|key, value| {
                seen.push((key.url.clone(), value));
                Ok(())
            })
            .unwrap();
        assert_eq!(seen.len(), 5);
        assert_eq!(seen[0], ("http://a/0".to_string(), "v0".to_string()));
        assert_eq!(seen[4], ("http://a/4".to_string(), "v4".to_string()));
    }

    #[test]
    fn test_clear_removes_everything() {
        let store = DedupStore::new("clear", 1);
        store.add(DedupKey::new("u", "a"), ()).unwrap();
        store.add(DedupKey::new("u", "b"), ()).unwrap();
        assert_eq!(store.len(), 2);
        store.clear().unwrap();
        assert!(store.is_empty());
        assert!(!store.contains(&DedupKey::new("u", "b")).unwrap());
    }

    #[test]
    fn test_poisoned_store_reports_errors() {
        let store = DedupStore::new("poisoned", 4);
        store.add(DedupKey::new("u", "a"), ()).unwrap();
        std::thread::scope(|scope| {
            let handle = scope.spawn(|| {
                let _guard = store.inner.lock().unwrap();
                panic!("panic while holding the store lock");
            });
            assert!(handle.join().is_err());
        });

        let err = store.clear().unwrap_err();
        assert_eq!(err.to_string(), "Deduplication store poisoned is poisoned");
        assert!(store.contains(&DedupKey::new("u", "a")).is_err());
        assert!(store.add(DedupKey::new("u", "b"), ()).is_err());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_concurrent_adds_of_one_key_succeed_once() {
        let store = Arc::new(DedupStore::new("race", 0));
        let successes: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let store = Arc::clone(&store);
                    scope.spawn(move || store.add(DedupKey::new("u", "t"), 0u8).unwrap())
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| usize::from(handle.join().unwrap()))
                .sum()
        });
        assert_eq!(successes, 1);
        assert_eq!(store.len(), 1);
    }
}
