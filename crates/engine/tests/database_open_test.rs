//! Integration tests for Database::open() and replay
//!
//! These tests verify the complete database open flow including:
//! - Creating new databases
//! - Reopening existing databases
//! - Torn tail and corruption handling in the commit log
//! - Config persistence and the per-directory lock

use std::io::Write;
use std::sync::Arc;

use tally_core::{DocumentPath, TallyError, Value, Version};
use tally_durability::{DurabilityMode, COMMIT_LOG_FILE_NAME};
use tally_engine::{Database, TallyConfig, CONFIG_FILE_NAME};
use tempfile::TempDir;

fn counter_path() -> DocumentPath {
    DocumentPath::new("counters", "20250513").unwrap()
}

fn bump(db: &Database) -> i64 {
    db.transaction(|txn| {
        let next = txn
            .get(&counter_path())?
            .and_then(|v| v.field("count").and_then(Value::as_int))
            .unwrap_or(0)
            + 1;
        txn.put(counter_path(), Value::object().with_field("count", next))?;
        Ok(next)
    })
    .unwrap()
}

fn stored_count(db: &Database) -> Option<i64> {
    db.get_document(&counter_path())
        .unwrap()
        .and_then(|doc| doc.value.field("count").and_then(Value::as_int))
}

#[test]
fn test_database_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("lifecycle");

    {
        let db = Database::open(&db_path).unwrap();
        assert!(!db.is_ephemeral());
        assert!(db_path.join(CONFIG_FILE_NAME).exists());
        assert_eq!(bump(&db), 1);
        assert_eq!(bump(&db), 2);
    }

    {
        let db = Database::open(&db_path).unwrap();
        assert_eq!(stored_count(&db), Some(2));
        assert_eq!(db.current_version(), Version::new(2));
        assert_eq!(bump(&db), 3);
    }

    let db = Database::open(&db_path).unwrap();
    assert_eq!(stored_count(&db), Some(3));
}

#[test]
fn test_document_versions_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();

    let before = {
        let db = Database::open(temp_dir.path()).unwrap();
        bump(&db);
        db.get_document(&counter_path()).unwrap().unwrap()
    };

    let db = Database::open(temp_dir.path()).unwrap();
    let after = db.get_document(&counter_path()).unwrap().unwrap();
    assert_eq!(after, before);
}

#[test]
fn test_same_path_returns_same_instance() {
    let temp_dir = TempDir::new().unwrap();

    let db1 = Database::open(temp_dir.path()).unwrap();
    let db2 = Database::open(temp_dir.path()).unwrap();
    assert!(Arc::ptr_eq(&db1, &db2));

    bump(&db1);
    assert_eq!(stored_count(&db2), Some(1));
}

#[test]
fn test_instance_released_after_drop() {
    let temp_dir = TempDir::new().unwrap();

    let db = Database::open(temp_dir.path()).unwrap();
    bump(&db);
    drop(db);

    // The lock file must be free again and the data replayed
    let db = Database::open(temp_dir.path()).unwrap();
    assert_eq!(stored_count(&db), Some(1));
}

#[test]
fn test_open_with_config_persists_settings() {
    let temp_dir = TempDir::new().unwrap();
    let cfg = TallyConfig {
        durability: "always".to_string(),
        date_basis: "local".to_string(),
        ..TallyConfig::default()
    };

    {
        let db = Database::open_with_config(temp_dir.path(), cfg.clone()).unwrap();
        assert_eq!(db.durability_mode(), DurabilityMode::Always);
    }

    let db = Database::open(temp_dir.path()).unwrap();
    assert_eq!(db.config(), &cfg);
    assert_eq!(db.date_basis(), tally_core::DateBasis::Local);
}

#[test]
fn test_invalid_config_file_fails_open() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "durability = \"sometimes\"\n").unwrap();

    let err = Database::open(temp_dir.path()).unwrap_err();
    assert!(matches!(err, TallyError::InvalidInput { .. }));
}

#[test]
fn test_torn_tail_is_discarded_on_open() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join(COMMIT_LOG_FILE_NAME);

    {
        let db = Database::open(temp_dir.path()).unwrap();
        bump(&db);
        bump(&db);
    }
    let clean_len = std::fs::metadata(&log_path).unwrap().len();

    // A frame header promising 200 bytes, followed by almost nothing
    let mut file = std::fs::OpenOptions::new().append(true).open(&log_path).unwrap();
    file.write_all(&[200, 0, 0, 0, 1, 7]).unwrap();
    drop(file);

    {
        let db = Database::open(temp_dir.path()).unwrap();
        assert_eq!(stored_count(&db), Some(2));
        assert_eq!(std::fs::metadata(&log_path).unwrap().len(), clean_len);
        assert_eq!(bump(&db), 3);
    }

    let db = Database::open(temp_dir.path()).unwrap();
    assert_eq!(stored_count(&db), Some(3));
}

#[test]
fn test_corrupt_frame_fails_open() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join(COMMIT_LOG_FILE_NAME);

    {
        let db = Database::open(temp_dir.path()).unwrap();
        bump(&db);
        bump(&db);
    }

    // Flip a payload byte of the first frame; the second frame is intact
    let mut bytes = std::fs::read(&log_path).unwrap();
    bytes[6] ^= 0xFF;
    std::fs::write(&log_path, bytes).unwrap();

    let err = Database::open(temp_dir.path()).unwrap_err();
    assert!(matches!(err, TallyError::Corruption { .. }));
}

#[test]
fn test_ephemeral_writes_no_files() {
    let db = Database::ephemeral().unwrap();
    bump(&db);
    assert!(db.data_dir().as_os_str().is_empty());
    db.flush().unwrap();
}
