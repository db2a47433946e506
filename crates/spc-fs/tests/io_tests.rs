use spc_fs::{RobustnessConfig, io};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_write_atomic_creates_file_and_parents() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("downloads").join(".lock.json");

    io::write_atomic(&path, b"{}", RobustnessConfig::default()).unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
}

#[test]
fn test_write_atomic_overwrites_existing() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("state.json");
    fs::write(&path, "original").unwrap();

    io::write_atomic(&path, b"updated", RobustnessConfig::default()).unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "updated");
}

#[test]
fn test_read_locked_returns_content() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("state.json");
    fs::write(&path, "{\"a\": 1}").unwrap();

    let content = io::read_locked(&path).unwrap();
    assert_eq!(content.as_deref(), Some("{\"a\": 1}"));
}

#[test]
fn test_read_text_nonexistent_file() {
    let temp = TempDir::new().unwrap();
    let result = io::read_text(&temp.path().join("missing.txt"));
    assert!(matches!(result, Err(spc_fs::Error::Io { .. })));
}
