//! Shared helpers for integration tests.

use std::{fs, path::Path};

use mast_logging::{logging::MemoryOpener, LoggerDefaults, LoggerRegistry};

/// Registry writing real rotating files under `log_dir`.
#[allow(dead_code)]
pub fn file_registry(log_dir: &Path) -> LoggerRegistry {
    LoggerRegistry::new(LoggerDefaults::new(log_dir))
}

/// Registry whose sinks are kept in memory, keyed by path under `/logs`.
#[allow(dead_code)]
pub fn memory_registry() -> (LoggerRegistry, MemoryOpener) {
    let opener = MemoryOpener::new();
    let registry = LoggerRegistry::with_opener(LoggerDefaults::new("/logs"), opener.clone());
    (registry, opener)
}

/// Every record in the active file `file_name` under `dir`.
#[allow(dead_code)]
pub fn read_records(dir: &Path, file_name: &str) -> Vec<String> {
    fs::read_to_string(dir.join(file_name))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Names of the files directly in `dir`, sorted.
#[allow(dead_code)]
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Field value out of a default-format record, e.g. `field(line, "message")`.
#[allow(dead_code)]
pub fn field<'a>(record: &'a str, key: &str) -> Option<&'a str> {
    let marker = format!("'{}'='", key);
    let start = record.find(&marker)? + marker.len();
    let rest = &record[start..];
    let end = rest.find("'; '").unwrap_or(rest.len().saturating_sub(1));
    Some(&rest[..end])
}
