use std::fs;
use std::path::{Path, PathBuf};

use super::helpers::{id, signal};
use crate::*;
use anyhow::Result;
use config::Config;
use readid::ReadId;
use sigindex::{IndexError, SignalIndex};
use source::{MemoryOpener, MemorySource};
use tempfile::tempdir;

/// Reads `ks` in table order, 5 samples each stored as rows of 2, so the
/// k-th listed read starts at row `3 * k`.
fn source_with(ks: &[u8]) -> MemorySource {
    let mut b = MemorySource::builder().row_capacity(2);
    for &k in ks {
        b.add_read(id(k), f32::from(k), 2.0, &signal(k, 5));
    }
    b.build()
}

/// Creates a placeholder data file and registers its contents.
fn data_file(dir: &Path, rel: &str, opener: &MemoryOpener, source: MemorySource) -> Result<PathBuf> {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, b"")?;
    opener.insert(&path, source);
    Ok(path)
}

fn reader() -> Result<RandomAccessReader<MemoryOpener>> {
    RandomAccessReader::new(MemoryOpener::new(), Config::default())
}

// -------------------- Registration --------------------

#[test]
fn index_path_appends_suffix_to_full_name() {
    assert_eq!(
        index_path_for(Path::new("/data/run.pod5"), ".idx"),
        PathBuf::from("/data/run.pod5.idx")
    );
}

#[test]
fn add_file_builds_and_saves_missing_index() -> Result<()> {
    let dir = tempdir()?;
    let mut reader = reader()?;
    let path = data_file(dir.path(), "run.pod5", reader.opener(), source_with(&[1, 2]))?;

    reader.add_file(&path, None)?;

    assert!(reader.is_loaded("run.pod5"));
    assert_eq!(reader.opener().open_count(), 1);
    let saved = SignalIndex::load(dir.path().join("run.pod5.idx"))?;
    assert_eq!(saved.len(), 2);
    assert_eq!(reader.fetch_signal("run.pod5", &id(2))?, signal(2, 5));
    Ok(())
}

#[test]
fn add_file_without_saving_leaves_no_index_file() -> Result<()> {
    let dir = tempdir()?;
    let mut reader = reader()?;
    let path = data_file(dir.path(), "run.pod5", reader.opener(), source_with(&[1]))?;

    reader.add_file(&path, Some(false))?;

    assert!(!dir.path().join("run.pod5.idx").exists());
    assert_eq!(reader.signal_length("run.pod5", &id(1))?, 5);
    Ok(())
}

#[test]
fn configured_default_controls_saving() -> Result<()> {
    let dir = tempdir()?;
    let config = Config {
        save_index: false,
        ..Config::default()
    };
    let mut reader = RandomAccessReader::new(MemoryOpener::new(), config)?;
    let path = data_file(dir.path(), "run.pod5", reader.opener(), source_with(&[1]))?;

    reader.add_file(&path, None)?;
    assert!(!dir.path().join("run.pod5.idx").exists());

    reader.add_file(&path, Some(true))?;
    assert!(dir.path().join("run.pod5.idx").exists());
    Ok(())
}

#[test]
fn failed_save_keeps_the_built_index() -> Result<()> {
    let dir = tempdir()?;
    let config = Config {
        index_suffix: ".missing/index".to_string(),
        ..Config::default()
    };
    let mut reader = RandomAccessReader::new(MemoryOpener::new(), config)?;
    let path = data_file(dir.path(), "run.pod5", reader.opener(), source_with(&[1, 2]))?;

    reader.add_file(&path, Some(true))?;

    assert!(!reader.index_path(&path).exists());
    assert_eq!(reader.fetch_signal("run.pod5", &id(1))?, signal(1, 5));
    Ok(())
}

#[test]
fn existing_index_is_loaded_on_first_access() -> Result<()> {
    let dir = tempdir()?;
    let mut first = reader()?;
    let path = data_file(dir.path(), "run.pod5", first.opener(), source_with(&[1, 2, 3]))?;
    first.add_file(&path, None)?;

    let mut second = reader()?;
    second.opener().insert(&path, source_with(&[1, 2, 3]));
    second.add_file(&path, None)?;

    assert_eq!(second.filenames(), vec!["run.pod5".to_string()]);
    assert!(!second.is_loaded("run.pod5"));
    assert_eq!(second.opener().open_count(), 0);

    assert_eq!(second.fetch_signal("run.pod5", &id(3))?, signal(3, 5));
    assert!(second.is_loaded("run.pod5"));
    assert_eq!(second.opener().open_count(), 1);

    second.fetch_signal("run.pod5", &id(1))?;
    assert_eq!(second.opener().open_count(), 1);
    Ok(())
}

#[test]
fn vanished_index_fails_on_access() -> Result<()> {
    let dir = tempdir()?;
    let mut first = reader()?;
    let path = data_file(dir.path(), "run.pod5", first.opener(), source_with(&[1]))?;
    first.add_file(&path, None)?;

    let mut second = reader()?;
    second.opener().insert(&path, source_with(&[1]));
    second.add_file(&path, None)?;
    fs::remove_file(dir.path().join("run.pod5.idx"))?;

    let err = second.fetch_signal("run.pod5", &id(1)).unwrap_err();
    assert!(err.to_string().contains("index file not found"));
    Ok(())
}

#[test]
fn unreadable_data_file_fails_registration() -> Result<()> {
    let dir = tempdir()?;
    let mut reader = reader()?;
    let path = dir.path().join("orphan.pod5");
    fs::write(&path, b"")?;

    assert!(reader.add_file(&path, None).is_err());
    assert!(reader.filenames().is_empty());
    assert!(reader.add_file(dir.path().join("absent.pod5"), None).is_err());
    Ok(())
}

#[test]
fn reregistering_a_name_replaces_the_file() -> Result<()> {
    let dir = tempdir()?;
    let mut reader = reader()?;
    let old = data_file(dir.path(), "one/run.pod5", reader.opener(), source_with(&[1]))?;
    let new = data_file(dir.path(), "two/run.pod5", reader.opener(), source_with(&[7]))?;

    reader.add_file(&old, None)?;
    reader.add_file(&new, None)?;

    assert_eq!(reader.filenames(), vec!["run.pod5".to_string()]);
    assert_eq!(reader.list_read_ids("run.pod5", false)?, vec![id(7)]);
    Ok(())
}

#[test]
fn add_dir_registers_matching_files_recursively() -> Result<()> {
    let dir = tempdir()?;
    let mut reader = reader()?;
    data_file(dir.path(), "b.pod5", reader.opener(), source_with(&[2]))?;
    data_file(dir.path(), "sub/a.pod5", reader.opener(), source_with(&[1]))?;
    data_file(dir.path(), "sub/deeper/c.pod5", reader.opener(), source_with(&[3]))?;
    fs::write(dir.path().join("notes.txt"), b"not signal")?;
    fs::write(dir.path().join("sub/other.fast5"), b"")?;

    reader.add_dir(dir.path())?;

    assert_eq!(reader.filenames(), vec!["a.pod5", "b.pod5", "c.pod5"]);
    assert!(dir.path().join("sub/deeper/c.pod5.idx").exists());
    assert_eq!(reader.fetch_signal("c.pod5", &id(3))?, signal(3, 5));
    Ok(())
}

#[test]
fn add_dir_uses_configured_extension() -> Result<()> {
    let dir = tempdir()?;
    let config = Config {
        extension: "fast5".to_string(),
        ..Config::default()
    };
    let mut reader = RandomAccessReader::new(MemoryOpener::new(), config)?;
    data_file(dir.path(), "a.fast5", reader.opener(), source_with(&[1]))?;
    fs::write(dir.path().join("b.pod5"), b"")?;

    reader.add_dir(dir.path())?;
    assert_eq!(reader.filenames(), vec!["a.fast5"]);
    Ok(())
}

#[test]
fn add_dir_without_data_files_registers_nothing() -> Result<()> {
    let dir = tempdir()?;
    let mut reader = reader()?;
    fs::write(dir.path().join("readme.md"), b"")?;

    reader.add_dir(dir.path())?;
    assert!(reader.filenames().is_empty());
    Ok(())
}

#[test]
fn add_dir_rejects_non_directories() -> Result<()> {
    let dir = tempdir()?;
    let mut reader = reader()?;
    let file = dir.path().join("x.pod5");
    fs::write(&file, b"")?;

    assert!(reader.add_dir(&file).is_err());
    assert!(reader.add_dir(dir.path().join("nowhere")).is_err());
    Ok(())
}

// -------------------- Queries --------------------

#[test]
fn unknown_file_name_is_reported() -> Result<()> {
    let mut reader = reader()?;
    let err = reader.fetch_signal("ghost.pod5", &id(1)).unwrap_err();
    assert!(err.to_string().contains("ghost.pod5"));
    Ok(())
}

#[test]
fn unknown_read_is_a_typed_not_found() -> Result<()> {
    let dir = tempdir()?;
    let mut reader = reader()?;
    let path = data_file(dir.path(), "run.pod5", reader.opener(), source_with(&[1]))?;
    reader.add_file(&path, None)?;

    let err = reader.fetch_signal("run.pod5", &id(5)).unwrap_err();
    let typed = err.downcast_ref::<IndexError>();
    assert!(typed.is_some_and(IndexError::is_not_found));
    Ok(())
}

#[test]
fn metadata_queries_come_from_the_index() -> Result<()> {
    let dir = tempdir()?;
    let mut reader = reader()?;
    let path = data_file(dir.path(), "run.pod5", reader.opener(), source_with(&[4]))?;
    reader.add_file(&path, None)?;

    assert_eq!(reader.calibration("run.pod5", &id(4))?, (4.0, 2.0));
    assert_eq!(reader.signal_length("run.pod5", &id(4))?, 5);

    let raw = reader.fetch_signal("run.pod5", &id(4))?;
    let pa = reader.fetch_calibrated_signal("run.pod5", &id(4))?;
    let expected: Vec<f32> = raw.iter().map(|&r| (f32::from(r) + 4.0) * 2.0).collect();
    assert_eq!(pa, expected);
    Ok(())
}

#[test]
fn read_id_listings_by_id_and_by_location() -> Result<()> {
    let dir = tempdir()?;
    let mut reader = reader()?;
    let path = data_file(dir.path(), "run.pod5", reader.opener(), source_with(&[8, 3, 5]))?;
    reader.add_file(&path, None)?;

    assert_eq!(reader.list_read_ids("run.pod5", false)?, vec![id(3), id(5), id(8)]);
    assert_eq!(reader.list_read_ids("run.pod5", true)?, vec![id(8), id(3), id(5)]);
    Ok(())
}

#[test]
fn iter_read_ids_walks_files_then_rows() -> Result<()> {
    let dir = tempdir()?;
    let mut reader = reader()?;
    data_file(dir.path(), "b.pod5", reader.opener(), source_with(&[9, 4]))?;
    data_file(dir.path(), "a.pod5", reader.opener(), source_with(&[2, 1]))?;
    reader.add_dir(dir.path())?;

    let all = reader.iter_read_ids()?;
    let expected: Vec<(String, ReadId)> = vec![
        ("a.pod5".to_string(), id(2)),
        ("a.pod5".to_string(), id(1)),
        ("b.pod5".to_string(), id(9)),
        ("b.pod5".to_string(), id(4)),
    ];
    assert_eq!(all, expected);
    Ok(())
}

#[test]
fn fetch_many_through_the_registry() -> Result<()> {
    let dir = tempdir()?;
    let mut reader = reader()?;
    let path = data_file(dir.path(), "run.pod5", reader.opener(), source_with(&[1, 2, 3]))?;
    reader.add_file(&path, None)?;

    let out = reader.fetch_many("run.pod5", &[id(3), id(1)])?;
    assert_eq!(out, vec![signal(3, 5), signal(1, 5)]);
    Ok(())
}

// -------------------- Fetch planning --------------------

#[test]
fn plan_groups_by_file_then_row_start() -> Result<()> {
    let dir = tempdir()?;
    let mut reader = reader()?;
    data_file(dir.path(), "a.pod5", reader.opener(), source_with(&[3, 1, 2]))?;
    data_file(dir.path(), "b.pod5", reader.opener(), source_with(&[10, 11]))?;
    reader.add_dir(dir.path())?;

    let items = vec![
        ("b.pod5".to_string(), id(11)),
        ("a.pod5".to_string(), id(2)),
        ("a.pod5".to_string(), id(3)),
        ("b.pod5".to_string(), id(10)),
        ("a.pod5".to_string(), id(1)),
    ];
    let order = reader.plan_fetch_order(&items, |(name, read_id)| (name.as_str(), *read_id))?;

    assert_eq!(order, vec![2, 4, 1, 3, 0]);
    Ok(())
}

#[test]
fn plan_of_nothing_is_empty() -> Result<()> {
    let mut reader = reader()?;
    let items: Vec<(String, ReadId)> = Vec::new();
    let order = reader.plan_fetch_order(&items, |(name, read_id)| (name.as_str(), *read_id))?;
    assert!(order.is_empty());
    Ok(())
}

#[test]
fn plan_fails_on_unknown_read() -> Result<()> {
    let dir = tempdir()?;
    let mut reader = reader()?;
    data_file(dir.path(), "a.pod5", reader.opener(), source_with(&[1, 2]))?;
    reader.add_dir(dir.path())?;

    let items = [("a.pod5", id(1)), ("a.pod5", id(7))];
    assert!(reader.plan_fetch_order(&items, |&(name, read_id)| (name, read_id)).is_err());
    Ok(())
}
