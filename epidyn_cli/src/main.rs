mod cli;
mod display;
mod error;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, RunCommand};
use epidyn::config::Config;
use error::EpidynCliResult;
use log::debug;

const DEFAULT_LOGGING_LEVEL: &str = "warn";

#[tokio::main]
async fn main() -> Result<()> {
    // Set RUST_LOG to `DEFAULT_LOGGING_LEVEL` if not set
    let _ =
        std::env::var("RUST_LOG").map_err(|_| std::env::set_var("RUST_LOG", DEFAULT_LOGGING_LEVEL));
    pretty_env_logger::init_timed();
    let args = Cli::parse();
    debug!("args: {args:?}");
    let mut config = read_config_from_toml()?;
    args.apply_overrides(&mut config);
    debug!("config: {config:?}");

    if let Some(command) = args.command {
        command.run(config).await?;
    }
    Ok(())
}

fn read_config_from_toml() -> EpidynCliResult<Config> {
    // macOS: ~/Library/Application Support/epidyn/config.toml
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(Config::default());
    };
    let file_path = config_dir.join("epidyn").join("config.toml");
    match std::fs::read_to_string(file_path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
        Err(e) => Err(e.into()),
    }
}
