use std::{
    fmt::{self, Display},
    panic::Location,
    path::{Path, PathBuf},
    sync::{Arc, Weak},
};

use log::{Level, LevelFilter, Log};

use super::{registry::RegistryInner, LogFormatter, LogTarget, RotationUnit};
use crate::error::Result;

/// Settings a sink was built with. Frozen once the sink exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    pub level: LevelFilter,
    pub format: String,
    /// The file actually opened, which is the fallback path when the primary was denied.
    pub path: PathBuf,
    pub rotation_unit: RotationUnit,
    pub rotation_interval: u32,
    pub propagate: bool,
    pub backup_count: usize,
}

/// A named sink bound to one output target.
pub struct Logger {
    name: String,
    config: SinkConfig,
    formatter: Box<dyn LogFormatter>,
    target: Box<dyn LogTarget>,
    registry: Weak<RegistryInner>,
}

impl Logger {
    pub(super) fn new(
        name: impl Into<String>,
        config: SinkConfig,
        formatter: Box<dyn LogFormatter>,
        target: Box<dyn LogTarget>,
        registry: Weak<RegistryInner>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            formatter,
            target,
            registry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn is_enabled(&self, level: Level) -> bool {
        level <= self.config.level
    }

    #[track_caller]
    pub fn error(&self, message: impl Display) {
        self.log_at(Level::Error, message, None, Location::caller());
    }

    #[track_caller]
    pub fn warn(&self, message: impl Display) {
        self.log_at(Level::Warn, message, None, Location::caller());
    }

    #[track_caller]
    pub fn info(&self, message: impl Display) {
        self.log_at(Level::Info, message, None, Location::caller());
    }

    #[track_caller]
    pub fn debug(&self, message: impl Display) {
        self.log_at(Level::Debug, message, None, Location::caller());
    }

    #[track_caller]
    pub fn trace(&self, message: impl Display) {
        self.log_at(Level::Trace, message, None, Location::caller());
    }

    /// Error record carrying the failure context alongside the message.
    #[track_caller]
    pub fn exception(&self, message: impl Display, context: impl Display) {
        let context = context.to_string();
        self.log_at(Level::Error, message, Some(&context), Location::caller());
    }

    pub fn log_at(
        &self,
        level: Level,
        message: impl Display,
        exception: Option<&str>,
        location: &'static Location<'static>,
    ) {
        self.dispatch(
            &log::Record::builder()
                .args(format_args!("{}", message))
                .level(level)
                .target(&self.name)
                .file(Some(location.file()))
                .line(Some(location.line()))
                .build(),
            exception,
        );
    }

    pub fn flush(&self) {
        self.target.flush();
    }

    /// Routes the `log` facade macros to this sink for the rest of the process.
    pub fn init_global(logger: Arc<Logger>) -> Result<()> {
        log::set_max_level(logger.config.level);
        log::set_boxed_logger(Box::new(GlobalLogger(logger)))?;

        Ok(())
    }

    fn dispatch(&self, record: &log::Record, exception: Option<&str>) {
        if !self.is_enabled(record.level()) {
            return;
        }

        self.handle(record, exception);

        if !self.config.propagate {
            return;
        }

        let mut ancestor = self.parent();
        while let Some(logger) = ancestor {
            logger.handle(record, exception);
            if !logger.config.propagate {
                break;
            }
            ancestor = logger.parent();
        }
    }

    fn handle(&self, record: &log::Record, exception: Option<&str>) {
        if !self.is_enabled(record.level()) {
            return;
        }

        let line = self.formatter.format(record.target(), record, exception);
        if let Err(err) = self.target.write_line(&line) {
            tracing::error!(logger = %self.name, error = %err, "failed writing log record");
        }
    }

    fn parent(&self) -> Option<Arc<Logger>> {
        self.registry.upgrade()?.nearest_ancestor(&self.name)
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.is_enabled(metadata.level())
    }

    fn log(&self, record: &log::Record) {
        self.dispatch(record, None);
    }

    fn flush(&self) {
        self.target.flush();
    }
}

struct GlobalLogger(Arc<Logger>);

impl Log for GlobalLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.0.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        Log::log(self.0.as_ref(), record);
    }

    fn flush(&self) {
        Log::flush(self.0.as_ref());
    }
}
