//! Named, file-backed, time-rotating log sinks and call tracing on top of them.
//!
//! A [`LoggerRegistry`] owns the sinks of one application. The first request
//! for a name builds that sink and fixes its configuration; every later
//! request returns it unchanged. A [`Tracer`] logs calls made through it.

pub mod config;
pub mod error;
pub mod logging;
pub mod trace;
mod utils;

pub use error::{Error, Result};
pub use logging::{Logger, LoggerDefaults, LoggerOptions, LoggerRegistry, RotationUnit, SinkConfig};
pub use trace::{escape, format_arguments, CallArgs, Traced, Tracer, DEFAULT_TRACER_NAME};
