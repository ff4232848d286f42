use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::parser::ParsedLine;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use log::debug;
use std::env;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in the shell process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cd".
    fn name() -> &'static str;

    /// Executes the command.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(self: Box<Self>, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        match T::execute(*self, stdout, env) {
            Ok(x) => Ok(x),
            Err(e) => {
                debug!("{} failed: {:#}", T::name(), e);
                eprintln!("{e}");
                Ok(1)
            }
        }
    }
}

struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(self: Box<Self>, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        if self.is_error {
            eprintln!("{}", self.output);
            Ok(1)
        } else {
            writeln!(stdout, "{}", self.output)?;
            Ok(0)
        }
    }
}

/// Creates a builtin of type `T` when the name matches.
pub(crate) struct Factory<T> {
    _phantom: PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::from_args(&[name], args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }
}

/// The builtin dispatcher.
pub struct Builtins {
    factories: Vec<Box<dyn CommandFactory>>,
}

impl Builtins {
    pub fn new(factories: Vec<Box<dyn CommandFactory>>) -> Self {
        Self { factories }
    }

    /// Looks up a builtin by the first token of the line's first stage.
    ///
    /// Returns `None` when the line must be run as external programs.
    pub fn lookup(
        &self,
        env: &Environment,
        line: &ParsedLine<'_>,
    ) -> Result<Option<Box<dyn ExecutableCommand>>> {
        let stage = line.first_stage()?;
        let words: Vec<String> = stage
            .args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        let Some((name, rest)) = words.split_first() else {
            return Ok(None);
        };
        let args: Vec<&str> = rest.iter().map(String::as_str).collect();

        let found = self
            .factories
            .iter()
            .find_map(|factory| factory.try_create(env, name, &args));
        if found.is_some() {
            debug!("builtin: {name}");
        }
        Ok(found)
    }
}

impl Default for Builtins {
    /// The builtins of the shell: `cd`, `exit` and `help`.
    fn default() -> Self {
        Self::new(vec![
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Exit>::default()),
            Box::new(Factory::<Help>::default()),
        ])
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// Without a target, changes to the directory named by HOME.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to: `.`, `..`, an absolute path, or a path relative to the current directory.
    pub target: Option<String>,
}

impl Cd {
    fn resolve(&self, cwd: &Path, env: &Environment) -> Result<Option<PathBuf>> {
        let path = match self.target.as_deref() {
            None => env.home().context("cd: HOME not set")?,
            Some(".") => return Ok(None),
            Some("..") => cwd.parent().unwrap_or(cwd).to_path_buf(),
            Some(target) if target.starts_with('/') => PathBuf::from(target),
            Some(target) => cwd.join(target),
        };
        Ok(Some(path))
    }
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let cwd = env::current_dir().unwrap_or_else(|_| env.current_dir.clone());
        let Some(path) = self.resolve(&cwd, env)? else {
            return Ok(0);
        };

        if env::set_current_dir(&path).is_err() {
            anyhow::bail!("Unknown path: {}", path.display());
        }
        env.current_dir = env::current_dir().unwrap_or(path);
        debug!("cd: now in {}", env.current_dir.display());
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Exit the shell.
pub struct Exit {
    #[argh(positional, greedy)]
    /// ignored.
    pub _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        env.should_exit = true;
        Ok(0)
    }
}

pub const HELP_MESSAGE: &str = "
 Usage:

   command [ | command ]*

 where command is an absolute path or a program that can be found through $PATH.

 Redirections such as '< infile' and '> outfile' may appear after the first
 and the last command respectively.
 Ending a line with '&' runs the job in the background.

 Builtin commands:
  cd [dir]
  exit
  help

";

#[derive(FromArgs)]
/// Print a usage message.
pub struct Help {}

impl BuiltinCommand for Help {
    fn name() -> &'static str {
        "help"
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        stdout.write_all(HELP_MESSAGE.as_bytes())?;
        Ok(0)
    }
}
