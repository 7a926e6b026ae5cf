use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::StoreError;

/// A stored value: either text or an opaque byte buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn into_text(self, key: &str) -> Result<String, StoreError> {
        match self {
            Value::Text(text) => Ok(text),
            Value::Bytes(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    pub fn into_bytes(self, key: &str) -> Result<Vec<u8>, StoreError> {
        match self {
            Value::Bytes(bytes) => Ok(bytes),
            Value::Text(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }
}

/// One change inside a [`KeyValueStore::write_batch`].
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Set(String, Value),
    Delete(String),
}

/// Durable string-keyed storage. Writes to one key are atomic, and so is a
/// batch: either every change in it lands or none does.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
    async fn write_batch(&self, writes: Vec<Write>) -> Result<(), StoreError>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(filepath: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = filepath.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|err| StoreError::Rejected(format!("{}: {}", parent.display(), err)))?;
            }
        }

        let conn = Connection::open(filepath)?;
        Self::init_db(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_db(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init_db(conn: &Connection) -> Result<(), StoreError> {
        // Exactly one of text_value / blob_value is set per row.
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                text_value TEXT,
                blob_value BLOB
            );
            ",
        )?;
        Ok(())
    }

    fn put(conn: &Connection, key: &str, value: Value) -> Result<(), StoreError> {
        match value {
            Value::Text(text) => conn.execute(
                "INSERT OR REPLACE INTO kv (key, text_value, blob_value) VALUES (?, ?, NULL)",
                params![key, text],
            )?,
            Value::Bytes(bytes) => conn.execute(
                "INSERT OR REPLACE INTO kv (key, text_value, blob_value) VALUES (?, NULL, ?)",
                params![key, bytes],
            )?,
        };
        Ok(())
    }

    fn remove(conn: &Connection, key: &str) -> Result<(), StoreError> {
        conn.execute("DELETE FROM kv WHERE key=?", params![key])?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT text_value, blob_value FROM kv WHERE key=?",
                params![key],
                |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<Vec<u8>>>(1)?)),
            )
            .optional()?;

        Ok(match row {
            Some((Some(text), _)) => Some(Value::Text(text)),
            Some((None, Some(bytes))) => Some(Value::Bytes(bytes)),
            _ => None,
        })
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        Self::put(&self.conn.lock(), key, value)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        Self::remove(&self.conn.lock(), key)
    }

    async fn write_batch(&self, writes: Vec<Write>) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        // Dropping the transaction without commit rolls it back.
        let tx = conn.transaction()?;
        for write in writes {
            match write {
                Write::Set(key, value) => Self::put(&tx, &key, value)?,
                Write::Delete(key) => Self::remove(&tx, &key)?,
            }
        }
        tx.commit()?;
        Ok(())
    }
}

/// In-process store. Writes and deletes can be made to fail for exercising
/// error paths.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
    reject_writes: Mutex<Option<String>>,
    reject_writes_to: Mutex<HashSet<String>>,
    reject_deletes: Mutex<HashSet<String>>,
    writes: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every subsequent `set` with the given reason (e.g. a quota error).
    pub fn reject_writes(&self, reason: &str) {
        *self.reject_writes.lock() = Some(reason.to_string());
    }

    pub fn accept_writes(&self) {
        *self.reject_writes.lock() = None;
    }

    /// Reject writes to `key` only.
    pub fn reject_write_of(&self, key: &str) {
        self.reject_writes_to.lock().insert(key.to_string());
    }

    pub fn reject_delete_of(&self, key: &str) {
        self.reject_deletes.lock().insert(key.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.lock().contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }

    /// Keys of successful writes, in order.
    pub fn write_log(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    fn check(&self, write: &Write) -> Result<(), StoreError> {
        match write {
            Write::Set(key, _) => {
                if let Some(reason) = self.reject_writes.lock().clone() {
                    return Err(StoreError::Rejected(reason));
                }
                if self.reject_writes_to.lock().contains(key) {
                    return Err(StoreError::Rejected(format!("write of '{}' refused", key)));
                }
            }
            Write::Delete(key) => {
                if self.reject_deletes.lock().contains(key) {
                    return Err(StoreError::Rejected(format!("delete of '{}' refused", key)));
                }
            }
        }
        Ok(())
    }

    fn apply(&self, values: &mut HashMap<String, Value>, write: Write) {
        match write {
            Write::Set(key, value) => {
                self.writes.lock().push(key.clone());
                values.insert(key, value);
            }
            Write::Delete(key) => {
                values.remove(&key);
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.write_batch(vec![Write::Set(key.to_string(), value)]).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.write_batch(vec![Write::Delete(key.to_string())]).await
    }

    async fn write_batch(&self, writes: Vec<Write>) -> Result<(), StoreError> {
        for write in &writes {
            self.check(write)?;
        }
        let mut values = self.values.lock();
        for write in writes {
            self.apply(&mut values, write);
        }
        Ok(())
    }
}
