use std::path::PathBuf;

use clap::Args;
use eyre::Context;
use mast_logging::{config::ConfigManager, LoggerOptions};

use super::{parse_level, registry, DEFAULT_LOGGER};

#[derive(Args, Debug)]
pub struct Cmd {
    #[arg(long, short, default_value = DEFAULT_LOGGER, help = "Logger to write to, also names its file.")]
    pub name: String,

    #[arg(long, short, default_value = "info", value_parser = parse_level)]
    pub level: log::Level,

    #[arg(long, short, help = "Log file, relative paths land in the log directory.")]
    pub filename: Option<PathBuf>,

    #[arg(required = true, num_args = 1..)]
    pub message: Vec<String>,
}

impl Cmd {
    pub fn run(&self, config: &impl ConfigManager) -> eyre::Result<()> {
        let registry = registry(config)?;

        let mut options = LoggerOptions::new();
        if let Some(filename) = &self.filename {
            options = options.filename(filename);
        }

        let logger = registry
            .get_or_create_logger(&self.name, options)
            .wrap_err_with(|| format!("Failed creating logger {}", self.name))?;

        let message = self.message.join(" ");
        match self.level {
            log::Level::Error => logger.error(message),
            log::Level::Warn => logger.warn(message),
            log::Level::Info => logger.info(message),
            log::Level::Debug => logger.debug(message),
            log::Level::Trace => logger.trace(message),
        }
        logger.flush();

        tracing::debug!(path = %logger.path().display(), "record written");
        Ok(())
    }
}
