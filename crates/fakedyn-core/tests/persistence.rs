//! Log replay, compaction, and reset across engine restarts.

use std::fs;
use std::io::Write;
use std::path::Path;

use fakedyn_core::{Engine, EngineConfig, Error, StorageError};
use serde_json::{Value, json};
use tempfile::tempdir;

fn create_users(engine: &Engine) {
    engine
        .process(
            "CreateTable",
            json!({
                "TableName": "users",
                "AttributeDefinitions": [{"AttributeName": "id", "AttributeType": "S"}],
                "KeySchema": [{"AttributeName": "id", "KeyType": "HASH"}],
                "ProvisionedThroughput": {"ReadCapacityUnits": 1, "WriteCapacityUnits": 1}
            }),
        )
        .unwrap();
}

fn put(engine: &Engine, id: &str, n: i64) {
    engine
        .process(
            "PutItem",
            json!({"TableName": "users", "Item": {"id": {"S": id}, "n": {"N": n.to_string()}}}),
        )
        .unwrap();
}

fn get(engine: &Engine, id: &str) -> Value {
    engine
        .process("GetItem", json!({"TableName": "users", "Key": {"id": {"S": id}}}))
        .unwrap()
}

fn open(path: &Path) -> Engine {
    Engine::open(EngineConfig::with_log(path)).unwrap()
}

#[test]
fn test_state_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fakedyn.log");
    {
        let engine = open(&path);
        create_users(&engine);
        put(&engine, "alice", 1);
        put(&engine, "bob", 2);
        engine
            .process(
                "UpdateItem",
                json!({
                    "TableName": "users",
                    "Key": {"id": {"S": "alice"}},
                    "AttributeUpdates": {"n": {"Action": "ADD", "Value": {"N": "10"}}}
                }),
            )
            .unwrap();
        engine
            .process("DeleteItem", json!({"TableName": "users", "Key": {"id": {"S": "bob"}}}))
            .unwrap();
        engine.shutdown().unwrap();
    }

    let engine = open(&path);
    assert_eq!(engine.table_names(), vec!["users"]);
    assert_eq!(get(&engine, "alice")["Item"]["n"], json!({"N": "11"}));
    assert_eq!(get(&engine, "bob"), json!({}));
}

#[test]
fn test_reads_are_not_logged() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fakedyn.log");
    let engine = open(&path);
    create_users(&engine);
    let size = engine.log_size().unwrap();

    get(&engine, "alice");
    engine.process("ListTables", Value::Null).unwrap();
    assert_eq!(engine.log_size(), Some(size));
}

#[test]
fn test_failed_writes_are_not_logged() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fakedyn.log");
    let engine = open(&path);
    create_users(&engine);
    let size = engine.log_size().unwrap();

    let err = engine
        .process("PutItem", json!({"TableName": "users", "Item": {"n": {"N": "1"}}}))
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(engine.log_size(), Some(size));
}

#[test]
fn test_startup_compacts_log() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fakedyn.log");
    {
        let engine = open(&path);
        create_users(&engine);
        for n in 0..50 {
            put(&engine, "alice", n);
        }
    }
    let before = fs::metadata(&path).unwrap().len();

    let engine = open(&path);
    let after = fs::metadata(&path).unwrap().len();
    assert!(after < before);
    assert_eq!(engine.log_size(), Some(after));
    assert_eq!(get(&engine, "alice")["Item"]["n"], json!({"N": "49"}));
    drop(engine);

    // Replaying a compacted log is idempotent.
    let engine = open(&path);
    assert_eq!(fs::metadata(&path).unwrap().len(), after);
    assert_eq!(get(&engine, "alice")["Item"]["n"], json!({"N": "49"}));
}

#[test]
fn test_compaction_threshold_triggers_rewrite() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fakedyn.log");
    let mut config = EngineConfig::with_log(&path);
    config.log.compaction_threshold = 2048;

    let engine = Engine::open(config).unwrap();
    create_users(&engine);
    for n in 0..200 {
        put(&engine, "alice", n);
    }
    assert!(engine.log_size().unwrap() <= 2048);
    drop(engine);

    let engine = open(&path);
    assert_eq!(get(&engine, "alice")["Item"]["n"], json!({"N": "199"}));
}

#[test]
fn test_torn_tail_is_dropped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fakedyn.log");
    {
        let engine = open(&path);
        create_users(&engine);
        put(&engine, "alice", 1);
    }
    {
        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"PutItem\n200\n{\"TableName\":\"us").unwrap();
    }

    let engine = open(&path);
    assert_eq!(get(&engine, "alice")["Item"]["n"], json!({"N": "1"}));
}

#[test]
fn test_corrupt_record_fails_startup() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fakedyn.log");
    fs::write(&path, "PutItem\n5\nnope\nPutItem\n3\n{}\n").unwrap();

    match Engine::open(EngineConfig::with_log(&path)) {
        Err(Error::Storage(StorageError::CorruptRecord { .. })) => {}
        Err(other) => panic!("expected CorruptRecord, got {other:?}"),
        Ok(_) => panic!("expected CorruptRecord, got an engine"),
    }
}

#[test]
fn test_second_engine_on_same_log_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fakedyn.log");
    let _engine = open(&path);

    match Engine::open(EngineConfig::with_log(&path)) {
        Err(Error::Storage(StorageError::FileLocked)) => {}
        Err(other) => panic!("expected FileLocked, got {other:?}"),
        Ok(_) => panic!("expected FileLocked, got an engine"),
    }
}

#[test]
fn test_reset_clears_log() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fakedyn.log");
    {
        let engine = open(&path);
        create_users(&engine);
        put(&engine, "alice", 1);
        engine.reset().unwrap();
        assert_eq!(engine.log_size(), Some(0));
    }

    let engine = open(&path);
    assert!(engine.table_names().is_empty());
}

#[test]
fn test_failed_compaction_keeps_writes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fakedyn.log");
    fs::create_dir(dir.path().join("fakedyn.log.compact")).unwrap();
    let mut config = EngineConfig::with_log(&path);
    config.log.compaction_threshold = 1;
    let add = json!({
        "TableName": "users",
        "Key": {"id": {"S": "alice"}},
        "AttributeUpdates": {"n": {"Action": "ADD", "Value": {"N": "1"}}}
    });
    {
        let engine = Engine::open(config.clone()).unwrap();
        create_users(&engine);
        engine.process("UpdateItem", add.clone()).unwrap();
        engine.process("UpdateItem", add.clone()).unwrap();
        assert_eq!(get(&engine, "alice")["Item"]["n"], json!({"N": "2"}));
    }

    let engine = Engine::open(config).unwrap();
    assert_eq!(get(&engine, "alice")["Item"]["n"], json!({"N": "2"}));
}

#[test]
fn test_oversized_record_length_fails_startup() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fakedyn.log");
    fs::write(&path, "PutItem\n18446744073709551615\n{}\n").unwrap();

    match Engine::open(EngineConfig::with_log(&path)) {
        Err(Error::Storage(StorageError::CorruptRecord { offset, .. })) => assert_eq!(offset, 0),
        Err(other) => panic!("expected CorruptRecord, got {other:?}"),
        Ok(_) => panic!("expected CorruptRecord, got an engine"),
    }
}

#[test]
fn test_table_timestamps_survive_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fakedyn.log");
    let before = {
        let engine = open(&path);
        create_users(&engine);
        engine
            .process(
                "UpdateTable",
                json!({
                    "TableName": "users",
                    "ProvisionedThroughput": {"ReadCapacityUnits": 2, "WriteCapacityUnits": 1}
                }),
            )
            .unwrap();
        engine
            .process("DescribeTable", json!({"TableName": "users"}))
            .unwrap()
    };

    // Startup compacts the log, so this reads back the snapshot records.
    let engine = open(&path);
    let after = engine
        .process("DescribeTable", json!({"TableName": "users"}))
        .unwrap();
    assert_eq!(after["Table"]["CreationDateTime"], before["Table"]["CreationDateTime"]);
    let throughput = &after["Table"]["ProvisionedThroughput"];
    assert!(throughput["LastIncreaseDateTime"].is_u64());
    assert_eq!(throughput, &before["Table"]["ProvisionedThroughput"]);
}
