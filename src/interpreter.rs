use crate::arena::Arena;
use crate::builtin::Builtins;
use crate::command::ExitCode;
use crate::env::Environment;
use crate::executor;
use crate::lexer::{self, LineBuffer};
use crate::parser::{self, ParseError};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io;
use std::path::Path;

/// Exit status of a line that could not be parsed.
pub const SYNTAX_ERROR: ExitCode = 2;

/// Session state of the shell.
///
/// Owns the environment, the builtin dispatcher and the parse arenas. The arenas
/// are allocated once and reused by every line until the interpreter is dropped.
///
/// Example
/// ```no_run
/// use pipesh::Interpreter;
/// let mut sh = Interpreter::new().unwrap();
/// let code = sh.run_line("echo hello | wc -c").unwrap();
/// assert_eq!(code, 0);
/// ```
pub struct Interpreter {
    env: Environment,
    arena: Arena,
    builtins: Builtins,
}

impl Interpreter {
    /// Create a session with the default builtins.
    pub fn new() -> Result<Self> {
        Self::with_builtins(Builtins::default())
    }

    pub fn with_builtins(builtins: Builtins) -> Result<Self> {
        let arena = Arena::new().context("Could not initialize buffers")?;
        Ok(Self {
            env: Environment::new(),
            arena,
            builtins,
        })
    }

    /// Whether `exit` has been run.
    pub fn should_exit(&self) -> bool {
        self.env.should_exit
    }

    /// Parses and runs one line.
    ///
    /// Empty lines do nothing. Syntax errors are reported on standard error and
    /// yield [`SYNTAX_ERROR`]; only failures of the shell process itself (growing
    /// the arenas, forking) are returned as errors.
    pub fn run_line(&mut self, line: impl Into<LineBuffer>) -> Result<ExitCode> {
        let mut line = line.into();
        if line.text().iter().all(|&c| lexer::is_space(c)) {
            return Ok(0);
        }

        let parsed = match parser::parse(&mut line, &mut self.arena) {
            Ok(parsed) => parsed,
            Err(ParseError::Arena(e)) => return Err(e).context("could not parse line"),
            Err(e) => {
                debug!("syntax error: {e}");
                eprintln!("Parse error: {e}");
                return Ok(SYNTAX_ERROR);
            }
        };

        if let Some(builtin) = self.builtins.lookup(&self.env, &parsed)? {
            return builtin.execute(&mut io::stdout(), &mut self.env);
        }

        let code = executor::execute(&parsed, &self.env).context("could not run pipeline")?;
        Ok(code)
    }

    fn prompt(&self) -> String {
        let cwd = std::env::current_dir().unwrap_or_else(|_| self.env.current_dir.clone());
        format!("{}> ", cwd.display())
    }

    /// The interactive read-parse-execute loop.
    ///
    /// Runs until end of input or until `exit`.
    pub fn repl(&mut self, history: Option<&Path>) -> Result<()> {
        let mut rl = DefaultEditor::new()?;
        if let Some(path) = history {
            if let Err(e) = rl.load_history(path) {
                info!("no history loaded from {}: {e}", path.display());
            }
        }
        info!("session started in {}", self.env.current_dir.display());

        while !self.env.should_exit {
            match rl.readline(&self.prompt()) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    rl.add_history_entry(line.as_str())?;
                    if let Err(e) = self.run_line(line) {
                        eprintln!("{e:#}");
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            }
        }

        if let Some(path) = history {
            if let Err(e) = rl.save_history(path) {
                warn!("could not save history to {}: {e}", path.display());
            }
        }
        info!("session finished");
        Ok(())
    }
}
