use anyhow::{Context, Result};
use argh::FromArgs;
use log::LevelFilter;
use simplelog::{ColorChoice, Config as LogConfig, TermLogger, TerminalMode, WriteLogger};
use std::fs::File;
use std::path::PathBuf;

#[derive(FromArgs, Debug)]
/// A small interactive shell for pipelines of external programs.
pub struct Config {
    #[argh(option, default = "LevelFilter::Warn", from_str_fn(parse_level))]
    /// log level: off, error, warn, info, debug or trace.
    pub log_level: LevelFilter,

    #[argh(option)]
    /// write logs to this file instead of standard error.
    pub log_file: Option<PathBuf>,

    #[argh(option, short = 'c')]
    /// run a single command line and exit with its status.
    pub command: Option<String>,

    #[argh(option)]
    /// history file, loaded at start and saved at exit.
    pub history: Option<PathBuf>,
}

fn parse_level(value: &str) -> Result<LevelFilter, String> {
    value
        .parse()
        .map_err(|_| format!("unknown log level: {value}"))
}

/// Installs the global logger described by `config`.
pub fn init_logging(config: &Config) -> Result<()> {
    match &config.log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("can't create log file {}", path.display()))?;
            WriteLogger::init(config.log_level, LogConfig::default(), file)?;
        }
        None => TermLogger::init(
            config.log_level,
            LogConfig::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        )?,
    }
    Ok(())
}
