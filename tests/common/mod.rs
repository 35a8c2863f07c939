#![allow(dead_code)]

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tabkit::{DatasetDescriptor, Pipeline, TabulateOptions};

/// Fresh root directory with the default `data/input`, `data/output` and `sources`
/// layout; removed when the guard drops.
pub fn make_root() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("data").join("input")).unwrap();
    fs::create_dir_all(root.join("data").join("output")).unwrap();
    fs::create_dir_all(root.join("sources")).unwrap();
    dir
}

/// Options for tests: no progress bars, no signal hooks.
pub fn test_opts(root: &Path) -> TabulateOptions {
    TabulateOptions::default()
        .with_root_dir(root)
        .with_progress(false)
        .with_interrupt_handling(false)
}

pub fn test_pipeline(root: &Path) -> Pipeline {
    Pipeline::from_options(test_opts(root))
}

/// Write raw bytes to `data/input/<name>`.
pub fn write_input(root: &Path, name: &str, content: impl AsRef<[u8]>) -> PathBuf {
    let p = root.join("data").join("input").join(name);
    fs::write(&p, content).unwrap();
    p
}

/// Write a source file to `sources/<name>`.
pub fn write_source(root: &Path, name: &str, source: &Value) -> PathBuf {
    let p = root.join("sources").join(name);
    fs::write(&p, serde_json::to_string_pretty(source).unwrap()).unwrap();
    p
}

pub fn load(root: &Path, source: &Path) -> DatasetDescriptor {
    DatasetDescriptor::from_source_file(source, &test_opts(root)).unwrap()
}

pub fn output_path(root: &Path, stem: &str) -> PathBuf {
    root.join("data").join("output").join(format!("{stem}.csv"))
}

/// All CSV rows of a file, header included.
pub fn read_csv(path: &Path) -> Vec<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(false).from_path(path).unwrap();
    rdr.records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

pub const STORES_CSV: &str = "\
STORE,NUM,ST,CITY
Corner Shop,12,Main St,toronto
Big  Box ,7,King St,Ottawa
,,,
Market,3,Queen St,tokyo
";
