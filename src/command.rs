//! Commands that run inside the shell process instead of being forked.

use crate::env::Environment;
use anyhow::Result;
use std::io::Write;

/// Status of a command or line, with the usual meaning: 0 is success.
pub type ExitCode = i32;

/// A command ready to run in the shell's own process.
pub trait ExecutableCommand {
    fn execute(self: Box<Self>, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode>;
}

/// Builds an [`ExecutableCommand`] for the names it knows.
pub trait CommandFactory {
    /// `None` means `name` belongs to some other factory, or to an external program.
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>>;
}
