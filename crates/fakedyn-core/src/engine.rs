//! The thread-safe engine handle.
//!
//! [`Engine`] joins a [`Database`] with its optional [`PersistenceLog`].
//! Reads share the database; mutations hold it exclusively for the whole
//! read-modify-write and the log append, so the log order always matches
//! the order in which mutations were applied.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{error, info};

use crate::config::EngineConfig;
use crate::database::{Database, Operation};
use crate::error::{Result, StorageError};
use crate::storage::PersistenceLog;

struct EngineInner {
    database: RwLock<Database>,
    log: Mutex<Option<PersistenceLog>>,
    /// Set when a failed append left memory ahead of the log.
    read_only: AtomicBool,
}

/// The main engine handle.
///
/// `Engine` is cheaply clonable (`Arc`-based) and `Send + Sync`.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Open an engine. When `config.log.path` is set, the log is replayed
    /// into the database and then compacted.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let (database, log) = match &config.log.path {
            Some(path) => {
                let mut log = PersistenceLog::open(path, &config.log)?;
                let (database, replayed) = restore(&mut log, &config)?;
                if replayed > 0 {
                    compact_or_keep(&mut log, &database);
                }
                (database, Some(log))
            }
            None => (Database::new(config.clone()), None),
        };
        Ok(Self::from_parts(database, log))
    }

    /// An engine with no persistence.
    pub fn in_memory() -> Self {
        Self::from_parts(Database::default(), None)
    }

    fn from_parts(database: Database, log: Option<PersistenceLog>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                database: RwLock::new(database),
                log: Mutex::new(log),
                read_only: AtomicBool::new(false),
            }),
        }
    }

    /// Run an operation by name.
    ///
    /// A write is only reported as successful once its record is in the log.
    /// If the append fails the database is rebuilt from the log, which still
    /// holds the state from before the write.
    pub fn process(&self, operation: &str, payload: Value) -> Result<Value> {
        let operation: Operation = operation.parse()?;
        if operation.is_read() {
            return self.inner.database.read().read(operation, payload);
        }

        let mut database = self.inner.database.write();
        let mut log_guard = self.inner.log.lock();
        let Some(log) = log_guard.as_mut() else {
            return database.write(operation, payload);
        };
        if self.inner.read_only.load(Ordering::Acquire) {
            return Err(StorageError::ReadOnly.into());
        }

        let mut record = payload.clone();
        let response = database.write(operation, payload)?;
        database.stamp_record(operation, &mut record);

        if let Err(e) = log.append(operation, &record) {
            error!(operation = %operation, error = %e, "log append failed, rolling back");
            match restore(log, database.config()) {
                Ok((restored, _)) => *database = restored,
                Err(rollback) => {
                    error!(error = %rollback, "rollback failed, engine is read-only");
                    self.inner.read_only.store(true, Ordering::Release);
                }
            }
            return Err(e.into());
        }
        if log.needs_compaction() {
            compact_or_keep(log, &database);
        }
        Ok(response)
    }

    /// Rewrite the log to the minimal form of the current state.
    pub fn compact(&self) -> Result<()> {
        let database = self.inner.database.write();
        if let Some(log) = self.inner.log.lock().as_mut() {
            log.compact(&database.snapshot_records()?)?;
        }
        Ok(())
    }

    /// Drop every table and truncate the log.
    pub fn reset(&self) -> Result<()> {
        let mut database = self.inner.database.write();
        database.reset();
        if let Some(log) = self.inner.log.lock().as_mut() {
            log.reset()?;
        }
        self.inner.read_only.store(false, Ordering::Release);
        info!("engine reset");
        Ok(())
    }

    /// Flush the log. The engine stays usable afterwards.
    pub fn shutdown(&self) -> Result<()> {
        let _database = self.inner.database.write();
        if let Some(log) = self.inner.log.lock().as_ref() {
            log.sync()?;
            info!(path = %log.path().display(), bytes = log.size(), "log flushed");
        }
        Ok(())
    }

    /// Table names in creation order.
    pub fn table_names(&self) -> Vec<String> {
        self.inner.database.read().table_names().to_vec()
    }

    /// Current log size in bytes, if persistent.
    pub fn log_size(&self) -> Option<u64> {
        self.inner.log.lock().as_ref().map(PersistenceLog::size)
    }
}

/// Rebuild a database from every record in `log`. Returns the database and
/// the number of records replayed.
fn restore(log: &mut PersistenceLog, config: &EngineConfig) -> Result<(Database, usize)> {
    let records = log.replay()?;
    let replayed = records.len();
    let mut database = Database::new(config.clone());
    for record in records {
        let operation = record.operation;
        if let Err(e) = database.write(operation, record.payload) {
            error!(operation = %operation, error = %e, "log replay failed");
            return Err(e);
        }
    }
    Ok((database, replayed))
}

/// Compact `log` to the snapshot of `database`. On failure the old log is
/// kept; it still replays to the same state.
fn compact_or_keep(log: &mut PersistenceLog, database: &Database) {
    let compacted = database
        .snapshot_records()
        .and_then(|records| Ok(log.compact(&records)?));
    if let Err(e) = compacted {
        error!(
            path = %log.path().display(),
            error = %e,
            "log compaction failed, keeping the current log"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    fn create(engine: &Engine, name: &str) {
        engine
            .process(
                "CreateTable",
                json!({
                    "TableName": name,
                    "AttributeDefinitions": [{"AttributeName": "id", "AttributeType": "N"}],
                    "KeySchema": [{"AttributeName": "id", "KeyType": "HASH"}],
                    "ProvisionedThroughput": {"ReadCapacityUnits": 1, "WriteCapacityUnits": 1}
                }),
            )
            .unwrap();
    }

    #[test]
    fn test_in_memory_round_trip() {
        let engine = Engine::in_memory();
        create(&engine, "Counters");
        engine
            .process("PutItem", json!({"TableName": "Counters", "Item": {"id": {"N": "1"}}}))
            .unwrap();
        let resp = engine
            .process("GetItem", json!({"TableName": "Counters", "Key": {"id": {"N": "1"}}}))
            .unwrap();
        assert_eq!(resp["Item"]["id"], json!({"N": "1"}));
        assert_eq!(engine.log_size(), None);
    }

    #[test]
    fn test_unknown_operation() {
        let engine = Engine::in_memory();
        let err = engine.process("DropEverything", Value::Null).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_concurrent_updates_are_serialized() {
        let engine = Engine::in_memory();
        create(&engine, "Counters");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        engine
                            .process(
                                "UpdateItem",
                                json!({
                                    "TableName": "Counters",
                                    "Key": {"id": {"N": "1"}},
                                    "AttributeUpdates": {"n": {"Action": "ADD", "Value": {"N": "1"}}}
                                }),
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let resp = engine
            .process("GetItem", json!({"TableName": "Counters", "Key": {"id": {"N": "1"}}}))
            .unwrap();
        assert_eq!(resp["Item"]["n"], json!({"N": "200"}));
    }

    fn counter(engine: &Engine) -> Value {
        engine
            .process("GetItem", json!({"TableName": "Counters", "Key": {"id": {"N": "1"}}}))
            .unwrap()["Item"]["n"]
            .clone()
    }

    fn add_one(engine: &Engine) -> Result<Value> {
        engine.process(
            "UpdateItem",
            json!({
                "TableName": "Counters",
                "Key": {"id": {"N": "1"}},
                "AttributeUpdates": {"n": {"Action": "ADD", "Value": {"N": "1"}}}
            }),
        )
    }

    fn persistent(dir: &std::path::Path) -> Engine {
        Engine::open(EngineConfig::with_log(dir.join("data.log"))).unwrap()
    }

    #[test]
    fn test_failed_append_rolls_back_write() {
        let dir = tempfile::tempdir().unwrap();
        let engine = persistent(dir.path());
        create(&engine, "Counters");
        add_one(&engine).unwrap();

        engine.inner.log.lock().as_mut().unwrap().break_append_handle();
        let err = add_one(&engine).unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert_eq!(counter(&engine), json!({"N": "1"}));
        assert!(!engine.inner.read_only.load(Ordering::Acquire));
    }

    #[test]
    fn test_unrecoverable_append_makes_engine_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let engine = persistent(dir.path());
        create(&engine, "Counters");
        add_one(&engine).unwrap();

        engine.inner.log.lock().as_mut().unwrap().break_append_handle();
        std::fs::remove_file(dir.path().join("data.log")).unwrap();
        assert!(add_one(&engine).is_err());

        match add_one(&engine) {
            Err(crate::Error::Storage(StorageError::ReadOnly)) => {}
            other => panic!("expected ReadOnly, got {other:?}"),
        }
        assert!(counter(&engine).is_object());
    }

    #[test]
    fn test_reset_clears_tables() {
        let engine = Engine::in_memory();
        create(&engine, "A");
        engine.reset().unwrap();
        assert!(engine.table_names().is_empty());
    }
}
