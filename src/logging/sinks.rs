use std::{
    collections::HashMap,
    fs::{self, File, OpenOptions},
    io::{self, LineWriter, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Local};

use super::{rotation::Schedule, LogTarget, SinkConfig, TargetOpener};
use crate::error::{Error, Result};

/// File target that writes to `path` and, when a rollover is due, renames the
/// file to `<path>.<suffix>` and starts a fresh one. Rolled files beyond
/// `backup_count` are deleted, oldest first. Zero keeps all of them.
pub struct RollingFileTarget {
    path: PathBuf,
    schedule: Schedule,
    backup_count: usize,
    active: Mutex<ActiveFile>,
}

struct ActiveFile {
    file: LineWriter<File>,
    started_at: DateTime<Local>,
    rollover_at: DateTime<Local>,
}

impl RollingFileTarget {
    pub fn open(path: &Path, config: &SinkConfig) -> Result<Self> {
        Self::open_at(path, config, Local::now())
    }

    fn open_at(path: &Path, config: &SinkConfig, now: DateTime<Local>) -> Result<Self> {
        let schedule = config
            .rotation_unit
            .schedule(config.rotation_interval)?;

        let open_error = |source: io::Error| Error::Open {
            path: path.to_path_buf(),
            source,
        };

        if path.file_name().is_none() {
            return Err(open_error(io::Error::new(
                io::ErrorKind::InvalidInput,
                "log path has no file name",
            )));
        }

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(open_error)?;
        }

        // A file left behind by an earlier run keeps its period.
        let started_at = fs::metadata(path)
            .and_then(|metadata| metadata.modified())
            .map(DateTime::<Local>::from)
            .unwrap_or(now);
        let file = append(path).map_err(open_error)?;

        Ok(Self {
            path: path.to_path_buf(),
            schedule,
            backup_count: config.backup_count,
            active: Mutex::new(ActiveFile {
                file: LineWriter::new(file),
                started_at,
                rollover_at: schedule.next_rollover(&started_at),
            }),
        })
    }

    fn write_at(&self, line: &str, now: DateTime<Local>) -> Result<()> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);

        if now >= active.rollover_at {
            self.roll_over(&mut active, now)?;
        }

        writeln!(active.file, "{}", line)?;
        active.file.flush()?;
        Ok(())
    }

    fn roll_over(&self, active: &mut ActiveFile, now: DateTime<Local>) -> Result<()> {
        active.file.flush()?;

        let suffix = active.started_at.format(self.schedule.suffix_format());
        let rolled = suffixed(&self.path, &suffix.to_string());
        match fs::rename(&self.path, &rolled) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err.into()),
            _ => {}
        }

        active.file = LineWriter::new(append(&self.path)?);
        active.started_at = now;
        active.rollover_at = self.schedule.next_rollover(&now);

        tracing::debug!(path = %self.path.display(), rolled = %rolled.display(), "rolled over log file");

        self.prune()
    }

    fn prune(&self) -> Result<()> {
        if self.backup_count == 0 {
            return Ok(());
        }

        let mut rolled = self.rolled_files()?;
        rolled.sort();

        let excess = rolled.len().saturating_sub(self.backup_count);
        for path in &rolled[..excess] {
            fs::remove_file(path)?;
        }

        Ok(())
    }

    fn rolled_files(&self) -> Result<Vec<PathBuf>> {
        let prefix = match self.path.file_name() {
            Some(name) => format!("{}.", name.to_string_lossy()),
            None => return Ok(Vec::new()),
        };
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut rolled = Vec::new();
        for entry in fs::read_dir(directory)? {
            let entry = entry?;
            let name = entry.file_name();
            let is_rolled = name
                .to_string_lossy()
                .strip_prefix(&prefix)
                .is_some_and(|suffix| self.schedule.is_suffix(suffix));

            if is_rolled {
                rolled.push(entry.path());
            }
        }

        Ok(rolled)
    }
}

fn append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

impl LogTarget for RollingFileTarget {
    fn write_line(&self, line: &str) -> Result<()> {
        self.write_at(line, Local::now())
    }

    fn flush(&self) {
        let _ = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .file
            .flush();
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RollingFileOpener;

impl TargetOpener for RollingFileOpener {
    fn open(&self, path: &Path, config: &SinkConfig) -> Result<Box<dyn LogTarget>> {
        Ok(Box::new(RollingFileTarget::open(path, config)?))
    }
}

/// Keeps formatted records in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemoryTarget {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LogTarget for MemoryTarget {
    fn write_line(&self, line: &str) -> Result<()> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
        Ok(())
    }

    fn flush(&self) {}
}

/// Opens [`MemoryTarget`]s keyed by path. Paths can be denied to simulate
/// unwritable files; denying a directory denies every file directly in it.
#[derive(Debug, Default, Clone)]
pub struct MemoryOpener {
    targets: Arc<Mutex<HashMap<PathBuf, MemoryTarget>>>,
    attempts: Arc<Mutex<Vec<PathBuf>>>,
    denied: Vec<PathBuf>,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny(mut self, path: impl Into<PathBuf>) -> Self {
        self.denied.push(path.into());
        self
    }

    pub fn target(&self, path: impl AsRef<Path>) -> Option<MemoryTarget> {
        self.targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path.as_ref())
            .cloned()
    }

    /// Every path an open was attempted for, in order.
    pub fn attempts(&self) -> Vec<PathBuf> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_denied(&self, path: &Path) -> bool {
        self.denied
            .iter()
            .any(|denied| path == denied || path.parent() == Some(denied.as_path()))
    }
}

impl TargetOpener for MemoryOpener {
    fn open(&self, path: &Path, config: &SinkConfig) -> Result<Box<dyn LogTarget>> {
        config
            .rotation_unit
            .schedule(config.rotation_interval)?;

        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_path_buf());

        if self.is_denied(path) {
            return Err(Error::Open {
                path: path.to_path_buf(),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            });
        }

        let target = self
            .targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path.to_path_buf())
            .or_default()
            .clone();

        Ok(Box::new(target))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use super::*;
    use crate::logging::RotationUnit;

    fn config(path: &Path) -> SinkConfig {
        SinkConfig {
            level: log::LevelFilter::Debug,
            format: crate::logging::DEFAULT_FORMAT.to_string(),
            path: path.to_path_buf(),
            rotation_unit: RotationUnit::Midnight,
            rotation_interval: 1,
            propagate: false,
            backup_count: 3,
        }
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn ten_am() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 3, 10, 0, 0).unwrap()
    }

    #[test]
    fn rolling_target_writes_to_the_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let target = RollingFileTarget::open(&path, &config(&path)).unwrap();

        target.write_line("first").unwrap();
        target.write_line("second").unwrap();
        target.flush();

        assert_eq!(files_in(dir.path()), vec!["app.log"]);
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn rolling_target_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("var").join("log").join("app.log");

        RollingFileTarget::open(&path, &config(&path)).unwrap();

        assert!(path.is_file());
    }

    #[test]
    fn rollover_renames_the_active_file_with_its_period() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let target = RollingFileTarget::open_at(&path, &config(&path), ten_am()).unwrap();

        target.write_at("day one", ten_am()).unwrap();
        target.write_at("late on day one", ten_am() + TimeDelta::hours(13)).unwrap();
        target.write_at("day two", ten_am() + TimeDelta::hours(15)).unwrap();

        assert_eq!(files_in(dir.path()), vec!["app.log", "app.log.2024-01-03"]);
        assert_eq!(
            fs::read_to_string(dir.path().join("app.log.2024-01-03")).unwrap(),
            "day one\nlate on day one\n"
        );
        assert_eq!(fs::read_to_string(&path).unwrap(), "day two\n");
    }

    #[test]
    fn rollover_honours_multi_unit_intervals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let config = SinkConfig {
            rotation_unit: RotationUnit::Hour,
            rotation_interval: 2,
            backup_count: 0,
            ..config(&path)
        };
        let target = RollingFileTarget::open_at(&path, &config, ten_am()).unwrap();

        target.write_at("a", ten_am()).unwrap();
        target.write_at("b", ten_am() + TimeDelta::minutes(119)).unwrap();
        target.write_at("c", ten_am() + TimeDelta::minutes(120)).unwrap();

        assert_eq!(files_in(dir.path()), vec!["app.log", "app.log.2024-01-03_10"]);
        assert_eq!(fs::read_to_string(&path).unwrap(), "c\n");
    }

    #[test]
    fn rollover_keeps_only_backup_count_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let config = SinkConfig {
            rotation_unit: RotationUnit::Hour,
            backup_count: 2,
            ..config(&path)
        };
        fs::write(dir.path().join("app.log.notes"), "kept").unwrap();
        let target = RollingFileTarget::open_at(&path, &config, ten_am()).unwrap();

        for hour in 0..5 {
            target
                .write_at(&format!("hour {}", hour), ten_am() + TimeDelta::hours(hour))
                .unwrap();
        }

        assert_eq!(
            files_in(dir.path()),
            vec![
                "app.log",
                "app.log.2024-01-03_12",
                "app.log.2024-01-03_13",
                "app.log.notes",
            ]
        );
        assert_eq!(fs::read_to_string(&path).unwrap(), "hour 4\n");
    }

    #[test]
    fn rolling_target_rejects_zero_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let config = SinkConfig {
            rotation_interval: 0,
            ..config(&path)
        };

        assert!(matches!(
            RollingFileTarget::open(&path, &config),
            Err(Error::UnsupportedRotation { .. })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn open_failures_keep_the_os_error_kind() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be cannot be opened for appending, even by root.
        let path = dir.path().join("app.log");
        fs::create_dir(&path).unwrap();
        let expected = append(&path).unwrap_err().kind();

        match RollingFileTarget::open(&path, &config(&path)) {
            Err(Error::Open { path: failed, source }) => {
                assert_eq!(failed, path);
                assert_eq!(source.kind(), expected);
            }
            Err(other) => panic!("expected an open error, got {other}"),
            Ok(_) => panic!("opened a directory as a log file"),
        }
    }

    #[test]
    fn memory_opener_denies_files_and_directories() {
        let opener = MemoryOpener::new()
            .deny("/srv/log/app.log")
            .deny("/locked");
        let ok = Path::new("/srv/log/other.log");
        let denied_file = Path::new("/srv/log/app.log");
        let denied_dir = Path::new("/locked/app.log");

        assert!(opener.open(ok, &config(ok)).is_ok());
        assert!(opener
            .open(denied_file, &config(denied_file))
            .err()
            .unwrap()
            .is_permission_denied());
        assert!(opener
            .open(denied_dir, &config(denied_dir))
            .err()
            .unwrap()
            .is_permission_denied());
        assert_eq!(opener.attempts().len(), 3);
    }

    #[test]
    fn memory_targets_are_shared_per_path() {
        let opener = MemoryOpener::new();
        let path = Path::new("/srv/log/app.log");
        let target = opener.open(path, &config(path)).unwrap();

        target.write_line("hello").unwrap();

        assert_eq!(opener.target(path).unwrap().lines(), vec!["hello"]);
    }
}
