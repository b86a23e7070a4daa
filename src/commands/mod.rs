use std::{fmt::Display, path::PathBuf};

use clap::{Parser, Subcommand};
use eyre::Context;
use mast_logging::{
    config::{ConfigManager, LevelSetting, LocalConfigManager},
    LoggerDefaults, LoggerRegistry,
};
use tracing_subscriber::filter::LevelFilter;

mod emit;
mod exec;
mod info;

pub const DEFAULT_LOGGER: &str = "mast";

#[derive(Subcommand, Debug)]
pub enum MastCmd {
    Log(emit::Cmd),

    Info(info::Cmd),

    Exec(exec::Cmd),
}

impl Display for MastCmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MastCmd::Log(cmd) => write!(f, "log <{}>", cmd.name),
            MastCmd::Info(cmd) => write!(f, "info <{}>", cmd.name),
            MastCmd::Exec(cmd) => write!(f, "exec {}", cmd.program),
        }
    }
}

#[derive(Parser)]
#[command(version, long_version = "")]
#[command(about = "Write to and inspect MAST's rotating log files.", long_about = None, disable_help_subcommand = true)]
pub struct Mast {
    #[arg(
        global = true,
        long,
        help = "Base directory logs live under. Defaults to $MAST_HOME, or the working directory when unset.",
        display_order = 0
    )]
    pub home: Option<PathBuf>,

    #[arg(
        global = true,
        long,
        help = "Use the daemon log directory ($MAST_HOME/var/log/mastd). Implied when $mastd is set.",
        display_order = 0
    )]
    pub daemon: bool,

    #[arg(
        long,
        short = 'v',
        action = clap::ArgAction::Count,
        global = true,
        help = "Write verbose messages to stderr for debugging.",
        display_order = 999
    )]
    pub verbose: u8,

    #[command(subcommand)]
    pub cmd: MastCmd,
}

impl Mast {
    fn log_filter(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::OFF,
            1 => LevelFilter::ERROR,
            2 => LevelFilter::WARN,
            3 => LevelFilter::INFO,
            4 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    fn setup_logging(&self) -> eyre::Result<()> {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(self.log_filter())
            .try_init()
            .map_err(|err| eyre::eyre!("Failed registering diagnostics subscriber: {}", err))
    }

    fn config(&self) -> LocalConfigManager {
        let env = LocalConfigManager::from_env();
        let daemon = self.daemon || env.is_daemon();

        let config = match &self.home {
            Some(home) => env.with_home(home),
            None => env,
        };

        config.with_daemon(daemon)
    }

    pub fn run(self) -> eyre::Result<()> {
        self.setup_logging()?;

        let config = self.config();
        tracing::info!(home = %config.home_dir().display(), "running command {}", &self.cmd);

        let result = match &self.cmd {
            MastCmd::Log(cmd) => cmd.run(&config),
            MastCmd::Info(cmd) => cmd.run(&config),
            MastCmd::Exec(cmd) => cmd.run(&config),
        };

        if let Err(msg) = &result {
            tracing::error!("failed running command {}, error={} cause={}", &self.cmd, msg, msg.root_cause());
        }

        result
    }
}

fn registry(config: &impl ConfigManager) -> eyre::Result<LoggerRegistry> {
    let defaults =
        LoggerDefaults::from_config(config).context("Failed resolving logging configuration")?;

    Ok(LoggerRegistry::new(defaults))
}

fn parse_level(level: &str) -> eyre::Result<log::Level> {
    let filter = level.parse::<LevelSetting>()?.to_filter()?;

    filter
        .to_level()
        .ok_or_else(|| eyre::eyre!("level {} does not write any records", level))
}
