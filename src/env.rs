use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// State of the shell session that builtins read and change.
///
/// Child processes inherit the real process environment, not this one; the
/// variables kept here only affect what the shell itself resolves, such as the
/// target of a bare `cd`.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Variables captured at startup plus anything set during the session.
    pub vars: HashMap<String, String>,
    /// Working directory, updated after every successful `cd`.
    pub current_dir: PathBuf,
    /// Set by `exit`.
    pub should_exit: bool,
}

impl Environment {
    /// Snapshot of the process variables and working directory.
    pub fn new() -> Self {
        Self {
            vars: stdenv::vars().collect(),
            current_dir: stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
            should_exit: false,
        }
    }

    /// Session value of `key`, or the process value when the session has none.
    pub fn get_var(&self, key: &str) -> Option<String> {
        match self.vars.get(key) {
            Some(value) => Some(value.clone()),
            None => stdenv::var(key).ok(),
        }
    }

    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Directory `cd` changes to without an argument.
    pub fn home(&self) -> Option<PathBuf> {
        self.get_var("HOME")
            .filter(|home| !home.is_empty())
            .map(PathBuf::from)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialises tests that change the process working directory.
#[cfg(test)]
pub(crate) fn lock_current_dir() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};
    static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
    MUTEX
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
