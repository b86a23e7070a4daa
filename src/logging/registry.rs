use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use log::LevelFilter;

use super::{
    formatters::{TemplateFormatter, DEFAULT_FORMAT},
    sinks::RollingFileOpener,
    LogTarget, Logger, RotationUnit, SinkConfig, TargetOpener,
};
use crate::{
    config::{ConfigManager, LoggingSettings},
    error::Result,
    trace::Tracer,
    utils,
};

/// Resolved logging configuration every sink starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerDefaults {
    pub level: LevelFilter,
    pub format: String,
    pub log_dir: PathBuf,
    pub filename: Option<PathBuf>,
    pub rotation_unit: RotationUnit,
    pub rotation_interval: u32,
    pub propagate: bool,
    pub backup_count: usize,
}

impl LoggerDefaults {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            level: LevelFilter::Debug,
            format: DEFAULT_FORMAT.to_string(),
            log_dir: log_dir.into(),
            filename: None,
            rotation_unit: RotationUnit::Midnight,
            rotation_interval: 1,
            propagate: true,
            backup_count: 0,
        }
    }

    pub fn from_settings(settings: &LoggingSettings, log_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            level: settings.level.to_filter()?,
            format: settings
                .format
                .clone()
                .unwrap_or_else(|| DEFAULT_FORMAT.to_string()),
            log_dir: log_dir.into(),
            filename: settings.filename.clone(),
            rotation_unit: settings.rolling_unit.parse()?,
            rotation_interval: settings.rolling_interval,
            propagate: settings.propagate,
            backup_count: settings.backup_count,
        })
    }

    pub fn from_config(config: &impl ConfigManager) -> Result<Self> {
        let settings = config.logging_settings()?;
        Self::from_settings(&settings, config.log_dir())
    }

    /// Where a sink named `name` writes when no filename is passed.
    pub fn default_path(&self, name: &str) -> PathBuf {
        match &self.filename {
            Some(filename) => self.log_dir.join(filename),
            None => self.log_dir.join(format!("{}.log", name)),
        }
    }
}

/// Per-call overrides. Unset fields fall back to [`LoggerDefaults`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggerOptions {
    level: Option<LevelFilter>,
    format: Option<String>,
    filename: Option<PathBuf>,
    rotation_unit: Option<RotationUnit>,
    rotation_interval: Option<u32>,
    propagate: Option<bool>,
    backup_count: Option<usize>,
}

impl LoggerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(self, level: LevelFilter) -> Self {
        Self {
            level: Some(level),
            ..self
        }
    }

    pub fn format(self, format: impl Into<String>) -> Self {
        Self {
            format: Some(format.into()),
            ..self
        }
    }

    /// Relative filenames are placed in the defaults' log directory.
    pub fn filename(self, filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: Some(filename.into()),
            ..self
        }
    }

    pub fn rotation_unit(self, rotation_unit: RotationUnit) -> Self {
        Self {
            rotation_unit: Some(rotation_unit),
            ..self
        }
    }

    pub fn rotation_interval(self, rotation_interval: u32) -> Self {
        Self {
            rotation_interval: Some(rotation_interval),
            ..self
        }
    }

    pub fn propagate(self, propagate: bool) -> Self {
        Self {
            propagate: Some(propagate),
            ..self
        }
    }

    pub fn backup_count(self, backup_count: usize) -> Self {
        Self {
            backup_count: Some(backup_count),
            ..self
        }
    }

    fn resolve(self, name: &str, defaults: &LoggerDefaults) -> SinkConfig {
        let path = match self.filename {
            Some(filename) => defaults.log_dir.join(filename),
            None => defaults.default_path(name),
        };

        SinkConfig {
            level: self.level.unwrap_or(defaults.level),
            format: self.format.unwrap_or_else(|| defaults.format.clone()),
            path,
            rotation_unit: self.rotation_unit.unwrap_or(defaults.rotation_unit),
            rotation_interval: self.rotation_interval.unwrap_or(defaults.rotation_interval),
            propagate: self.propagate.unwrap_or(defaults.propagate),
            backup_count: self.backup_count.unwrap_or(defaults.backup_count),
        }
    }
}

/// `<dir>/<timestamp>-<user>-<file>` next to the denied `path`.
pub fn fallback_path(path: &Path, timestamp: &str, user: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    path.with_file_name(format!("{}-{}-{}", timestamp, user, file_name))
}

pub(super) struct RegistryInner {
    loggers: RwLock<HashMap<String, Arc<Logger>>>,
    defaults: LoggerDefaults,
    opener: Box<dyn TargetOpener>,
}

impl RegistryInner {
    /// Closest registered logger up the dotted name, `a.b.c` checks `a.b` then `a`.
    pub(super) fn nearest_ancestor(&self, name: &str) -> Option<Arc<Logger>> {
        let loggers = self.loggers.read().unwrap_or_else(PoisonError::into_inner);

        let mut current = name;
        while let Some((parent, _)) = current.rsplit_once('.') {
            if let Some(logger) = loggers.get(parent) {
                return Some(logger.clone());
            }
            current = parent;
        }

        None
    }
}

/// Named sinks for one application. The first request for a name fixes that
/// sink's configuration; later requests get the same sink back untouched.
#[derive(Clone)]
pub struct LoggerRegistry {
    inner: Arc<RegistryInner>,
}

impl LoggerRegistry {
    pub fn new(defaults: LoggerDefaults) -> Self {
        Self::with_opener(defaults, RollingFileOpener)
    }

    pub fn with_opener(defaults: LoggerDefaults, opener: impl TargetOpener + 'static) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                loggers: RwLock::new(HashMap::new()),
                defaults,
                opener: Box::new(opener),
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Logger>> {
        self.inner
            .loggers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .loggers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn logger(&self, name: &str) -> Result<Arc<Logger>> {
        self.get_or_create_logger(name, LoggerOptions::default())
    }

    pub fn get_or_create_logger(&self, name: &str, options: LoggerOptions) -> Result<Arc<Logger>> {
        if let Some(logger) = self.get(name) {
            return Ok(logger);
        }

        let mut loggers = self
            .inner
            .loggers
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        // Another caller may have won the race between the read and the write lock.
        if let Some(logger) = loggers.get(name) {
            return Ok(logger.clone());
        }

        let config = options.resolve(name, &self.inner.defaults);
        let formatter = TemplateFormatter::new(&config.format)?;
        let (path, target) = self.open_target(&config)?;
        let config = SinkConfig { path, ..config };

        tracing::debug!(logger = name, path = %config.path.display(), "created log sink");

        let logger = Arc::new(Logger::new(
            name,
            config,
            Box::new(formatter),
            target,
            Arc::downgrade(&self.inner),
        ));
        loggers.insert(name.to_string(), logger.clone());

        Ok(logger)
    }

    pub fn tracer(&self, name: &str) -> Result<Tracer> {
        Tracer::new(self, name)
    }

    pub fn flush(&self) {
        for logger in self
            .inner
            .loggers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
        {
            logger.flush();
        }
    }

    fn open_target(&self, config: &SinkConfig) -> Result<(PathBuf, Box<dyn LogTarget>)> {
        let opener = &self.inner.opener;

        match opener.open(&config.path, config) {
            Ok(target) => Ok((config.path.clone(), target)),
            Err(err) if err.is_permission_denied() => {
                let fallback = fallback_path(
                    &config.path,
                    &utils::fallback_timestamp(),
                    &utils::current_user(),
                );

                tracing::warn!(
                    path = %config.path.display(),
                    fallback = %fallback.display(),
                    "log file not writable, using fallback"
                );

                let target = opener.open(&fallback, config)?;
                Ok((fallback, target))
            }
            Err(err) => Err(err),
        }
    }
}
