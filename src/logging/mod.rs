mod formatters;
mod logger;
mod registry;
mod rotation;
mod sinks;

pub use formatters::{level_name, TemplateFormatter, DEFAULT_DATETIME_FORMAT, DEFAULT_FORMAT};
pub use logger::{Logger, SinkConfig};
pub use registry::{fallback_path, LoggerDefaults, LoggerOptions, LoggerRegistry};
pub use rotation::{RotationUnit, Schedule};
pub use sinks::{MemoryOpener, MemoryTarget, RollingFileOpener, RollingFileTarget};

use std::path::Path;

use crate::error::Result;

pub trait LogFormatter: Sync + Send {
    fn format(&self, name: &str, record: &log::Record, exception: Option<&str>) -> String;
}

/// A destination for fully formatted records. One call writes one record.
pub trait LogTarget: Sync + Send {
    fn write_line(&self, line: &str) -> Result<()>;
    fn flush(&self);
}

/// Creates the target a sink writes to.
pub trait TargetOpener: Sync + Send {
    fn open(&self, path: &Path, config: &SinkConfig) -> Result<Box<dyn LogTarget>>;
}
