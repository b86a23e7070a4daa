use std::process::{Command, ExitStatus};

use clap::Args;
use eyre::Context;
use mast_logging::{config::ConfigManager, CallArgs};

use super::{registry, DEFAULT_LOGGER};

#[derive(Args, Debug)]
pub struct Cmd {
    #[arg(long, short, default_value = DEFAULT_LOGGER)]
    pub name: String,

    pub program: String,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Cmd {
    pub fn run(&self, config: &impl ConfigManager) -> eyre::Result<()> {
        let registry = registry(config)?;
        let tracer = registry
            .tracer(&self.name)
            .wrap_err_with(|| format!("Failed creating logger {}", self.name))?;

        let args = self
            .args
            .iter()
            .fold(CallArgs::new(), |args, arg| args.arg(arg));

        let status = tracer.try_call(&self.program, &args, || self.spawn())?;
        tracing::debug!(%status, "{} finished", self.program);

        Ok(())
    }

    fn spawn(&self) -> eyre::Result<ExitStatus> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .status()
            .wrap_err_with(|| format!("Failed running {}", self.program))?;

        if !status.success() {
            return Err(eyre::eyre!("{} exited with {}", self.program, status));
        }

        Ok(status)
    }
}
