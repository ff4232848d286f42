//! A small interactive shell for pipelines of external programs.
//!
//! A line goes through three steps. [`lexer`] splits it into words and the
//! operators `|`, `<`, `>` and `&`, NUL-terminating words in place. [`parser`]
//! checks the grammar and lays the pipeline out in a session-wide [`arena`].
//! [`executor`] forks one process per stage, wires them with pipes and applies
//! the redirections.
//!
//! The main entry point is [`Interpreter`], which owns the session state and runs
//! either single lines or the interactive loop.

pub mod arena;
mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod executor;
mod external;
mod interpreter;
pub mod lexer;
pub mod parser;
pub mod signal;

pub use builtin::{Builtins, Cd, Exit, Help, HELP_MESSAGE};
pub use external::find_command_path;
pub use interpreter::{Interpreter, SYNTAX_ERROR};
