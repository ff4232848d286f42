use anyhow::{Context, Result};
use pipesh::config::{init_logging, Config};
use pipesh::{signal, Interpreter};
use std::process::ExitCode;

fn run(config: Config) -> Result<i32> {
    init_logging(&config)?;
    signal::install_interrupt_handler().context("could not install SIGINT handler")?;

    let mut shell = Interpreter::new()?;
    match config.command {
        Some(line) => shell.run_line(line),
        None => {
            shell.repl(config.history.as_deref())?;
            Ok(0)
        }
    }
}

fn main() -> ExitCode {
    let config: Config = argh::from_env();
    match run(config) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
