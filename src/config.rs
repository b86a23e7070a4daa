use std::{
    env, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const HOME_ENV: &str = "MAST_HOME";
pub const DAEMON_ENV: &str = "mastd";
pub const SETTINGS_FILE: &str = "logging.toml";

pub trait ConfigManager: Sized + Clone + Send + Sync {
    fn home_dir(&self) -> PathBuf;

    fn is_daemon(&self) -> bool;

    fn log_dir(&self) -> PathBuf {
        let log_dir = self.home_dir().join("var").join("log");
        if self.is_daemon() {
            log_dir.join("mastd")
        } else {
            log_dir
        }
    }

    fn logging_settings(&self) -> Result<LoggingSettings>;
}

/// Either a numeric severity (10 = DEBUG … 50 = CRITICAL) or a level name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LevelSetting {
    Numeric(u32),
    Named(String),
}

impl LevelSetting {
    pub fn to_filter(&self) -> Result<LevelFilter> {
        match self {
            LevelSetting::Numeric(level) => Ok(level_from_number(*level)),
            LevelSetting::Named(name) => match name.trim().to_ascii_lowercase().as_str() {
                "notset" | "trace" => Ok(LevelFilter::Trace),
                "debug" => Ok(LevelFilter::Debug),
                "info" => Ok(LevelFilter::Info),
                "warn" | "warning" => Ok(LevelFilter::Warn),
                "error" | "critical" | "fatal" => Ok(LevelFilter::Error),
                "off" => Ok(LevelFilter::Off),
                _ => Err(Error::InvalidLevel(name.clone())),
            },
        }
    }
}

impl FromStr for LevelSetting {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let setting = match s.trim().parse::<u32>() {
            Ok(level) => LevelSetting::Numeric(level),
            Err(_) => LevelSetting::Named(s.to_string()),
        };
        setting.to_filter()?;
        Ok(setting)
    }
}

pub fn level_from_number(level: u32) -> LevelFilter {
    match level {
        0..=9 => LevelFilter::Trace,
        10..=19 => LevelFilter::Debug,
        20..=29 => LevelFilter::Info,
        30..=39 => LevelFilter::Warn,
        40..=50 => LevelFilter::Error,
        _ => LevelFilter::Off,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: LevelSetting,
    pub rolling_unit: String,
    pub rolling_interval: u32,
    pub propagate: bool,
    pub backup_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LevelSetting::Numeric(10),
            rolling_unit: "midnight".to_string(),
            rolling_interval: 1,
            propagate: true,
            backup_count: 0,
            filename: None,
            format: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    logging: LoggingSettings,
}

#[derive(Default, Clone, Debug)]
pub struct LocalConfigManager {
    home: PathBuf,
    daemon: bool,
}

impl LocalConfigManager {
    pub fn new(home: impl Into<PathBuf>, daemon: bool) -> Self {
        Self {
            home: home.into(),
            daemon,
        }
    }

    /// Home from `$MAST_HOME`, or the working directory when unset or empty.
    /// Daemon mode is on whenever `$mastd` is present.
    pub fn from_env() -> Self {
        let home = env::var_os(HOME_ENV)
            .filter(|home| !home.is_empty())
            .map(PathBuf::from)
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            home,
            daemon: env::var_os(DAEMON_ENV).is_some(),
        }
    }

    pub fn with_home(self, home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            ..self
        }
    }

    pub fn with_daemon(self, daemon: bool) -> Self {
        Self { daemon, ..self }
    }

    /// Settings files in load order, later files override earlier keys.
    pub fn settings_paths(&self) -> [PathBuf; 2] {
        let etc = self.home.join("etc");
        [
            etc.join("default").join(SETTINGS_FILE),
            etc.join("local").join(SETTINGS_FILE),
        ]
    }
}

impl ConfigManager for LocalConfigManager {
    fn home_dir(&self) -> PathBuf {
        self.home.clone()
    }

    fn is_daemon(&self) -> bool {
        self.daemon
    }

    fn logging_settings(&self) -> Result<LoggingSettings> {
        let mut merged = toml::Table::new();
        let mut last_loaded: Option<PathBuf> = None;

        for path in self.settings_paths() {
            let Some(table) = read_table(&path)? else {
                continue;
            };

            tracing::debug!(path = %path.display(), "loaded logging settings");
            merge(&mut merged, table);
            last_loaded = Some(path);
        }

        let Some(path) = last_loaded else {
            return Ok(LoggingSettings::default());
        };

        let file: SettingsFile = toml::Value::Table(merged)
            .try_into()
            .map_err(|source| Error::ParseConfig { path, source })?;

        Ok(file.logging)
    }
}

fn read_table(path: &Path) -> Result<Option<toml::Table>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(Error::ReadConfig {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    contents
        .parse::<toml::Table>()
        .map(Some)
        .map_err(|source| Error::ParseConfig {
            path: path.to_path_buf(),
            source,
        })
}

// One level of nesting is enough: only tables like `[logging]` get key-wise merged.
fn merge(base: &mut toml::Table, overrides: toml::Table) {
    for (key, value) in overrides {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(table)) => {
                existing.extend(table);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn log_dir_switches_on_daemon_mode() {
        let config = LocalConfigManager::new("/opt/mast", false);
        assert_eq!(config.log_dir(), PathBuf::from("/opt/mast/var/log"));

        let config = config.with_daemon(true);
        assert_eq!(config.log_dir(), PathBuf::from("/opt/mast/var/log/mastd"));
    }

    #[test]
    fn missing_settings_files_yield_defaults() {
        let home = tempfile::tempdir().unwrap();
        let config = LocalConfigManager::new(home.path(), false);

        assert_eq!(config.logging_settings().unwrap(), LoggingSettings::default());
    }

    #[test]
    fn local_settings_override_default_keys() {
        let home = tempfile::tempdir().unwrap();
        let config = LocalConfigManager::new(home.path(), false);
        let [default, local] = config.settings_paths();

        write(
            &default,
            "[logging]\nlevel = 20\nrolling_unit = \"H\"\nrolling_interval = 1\nbackup_count = 5\n",
        );
        write(&local, "[logging]\nlevel = \"warning\"\npropagate = false\n");

        let settings = config.logging_settings().unwrap();

        assert_eq!(settings.level, LevelSetting::Named("warning".to_string()));
        assert_eq!(settings.rolling_unit, "H");
        assert_eq!(settings.backup_count, 5);
        assert!(!settings.propagate);
        assert_eq!(settings.filename, None);
    }

    #[test]
    fn malformed_settings_name_the_file() {
        let home = tempfile::tempdir().unwrap();
        let config = LocalConfigManager::new(home.path(), false);
        let [default, _] = config.settings_paths();
        write(&default, "[logging\nlevel = ");

        match config.logging_settings() {
            Err(Error::ParseConfig { path, .. }) => assert_eq!(path, default),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn wrongly_typed_settings_are_rejected() {
        let home = tempfile::tempdir().unwrap();
        let config = LocalConfigManager::new(home.path(), false);
        let [default, _] = config.settings_paths();
        write(&default, "[logging]\nrolling_interval = \"daily\"\n");

        assert!(matches!(
            config.logging_settings(),
            Err(Error::ParseConfig { .. })
        ));
    }

    #[test]
    fn numeric_levels_follow_the_conventional_scale() {
        assert_eq!(level_from_number(0), LevelFilter::Trace);
        assert_eq!(level_from_number(10), LevelFilter::Debug);
        assert_eq!(level_from_number(25), LevelFilter::Info);
        assert_eq!(level_from_number(30), LevelFilter::Warn);
        assert_eq!(level_from_number(50), LevelFilter::Error);
        assert_eq!(level_from_number(51), LevelFilter::Off);
    }

    #[test]
    fn level_names_parse_case_insensitively() {
        assert_eq!("WARNING".parse::<LevelSetting>().unwrap().to_filter().unwrap(), LevelFilter::Warn);
        assert_eq!("critical".parse::<LevelSetting>().unwrap().to_filter().unwrap(), LevelFilter::Error);
        assert_eq!("20".parse::<LevelSetting>().unwrap(), LevelSetting::Numeric(20));
        assert!(matches!("loud".parse::<LevelSetting>(), Err(Error::InvalidLevel(_))));
    }
}
