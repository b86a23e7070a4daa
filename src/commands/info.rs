use clap::{Args, ValueEnum};
use mast_logging::{config::ConfigManager, LoggerDefaults};
use serde_json::json;

use super::DEFAULT_LOGGER;

#[derive(ValueEnum, Clone, Debug)]
pub enum OutputType {
    Text,
    Json,
}

#[derive(Args, Debug)]
pub struct Cmd {
    #[arg(long, short, default_value = DEFAULT_LOGGER)]
    pub name: String,

    #[arg(long, short, value_enum, default_value_t = OutputType::Text)]
    pub output: OutputType,
}

impl Cmd {
    pub fn run(&self, config: &impl ConfigManager) -> eyre::Result<()> {
        let settings = config.logging_settings()?;
        let defaults = LoggerDefaults::from_settings(&settings, config.log_dir())?;
        let path = defaults.default_path(&self.name);

        match self.output {
            OutputType::Text => {
                println!("Home:           {}", config.home_dir().display());
                println!("Daemon:         {}", config.is_daemon());
                println!("Log Directory:  {}", config.log_dir().display());
                println!("Level:          {}", defaults.level);
                println!(
                    "Rotation:       every {} x {}",
                    defaults.rotation_interval, defaults.rotation_unit
                );
                println!("Backups:        {}", defaults.backup_count);
                println!("Propagate:      {}", defaults.propagate);
                println!("Log File:       {}", path.display());
            }
            OutputType::Json => {
                let info = json!({
                    "home": config.home_dir(),
                    "daemon": config.is_daemon(),
                    "log_dir": config.log_dir(),
                    "settings": settings,
                    "log_file": path,
                });
                println!("{}", serde_json::to_string_pretty(&info)?);
            }
        }

        Ok(())
    }
}
