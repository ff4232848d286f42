//! Launching external programs.
//!
//! Everything here runs inside a forked child: failures are reported on standard
//! error and end that process only.

use crate::command::ExitCode;
use crate::env::Environment;
use log::debug;
use nix::unistd;
use std::borrow::Cow;
use std::ffi::{CStr, CString, OsStr};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Status of a child whose program could not be found.
pub const NOT_FOUND: ExitCode = 127;
/// Status of a child whose program was found but could not be executed.
pub const NOT_EXECUTABLE: ExitCode = 126;

/// Terminates the calling process immediately, skipping destructors and buffered
/// output inherited from the shell.
pub(crate) fn exit_child(code: ExitCode) -> ! {
    unsafe { libc::_exit(code) }
}

/// Looks `program` up the way the session sees it, with the session's `PATH`.
pub fn resolve_program(env: &Environment, program: &CStr) -> Option<CString> {
    let search_paths = env.get_var("PATH").unwrap_or_default();
    let name = Path::new(OsStr::from_bytes(program.to_bytes()));
    let path = find_command_path(OsStr::new(&search_paths), name)?;
    CString::new(path.as_os_str().as_bytes()).ok()
}

/// Replaces the current process image with the program named by `argv[0]`.
///
/// Never returns: on failure a diagnostic is printed and the process exits.
pub fn exec_stage(env: &Environment, argv: &[&CStr]) -> ! {
    let Some(program) = argv.first() else {
        eprintln!("Unknown or malformatted command: (empty)");
        exit_child(NOT_FOUND);
    };

    let Some(path) = resolve_program(env, program) else {
        eprintln!("Unknown or malformatted command: {}", program.to_string_lossy());
        exit_child(NOT_FOUND);
    };
    debug!("exec {:?} as pid {}", path, unistd::getpid());

    match unistd::execv(&path, argv) {
        Ok(never) => match never {},
        Err(e) => {
            eprintln!(
                "Unknown or malformatted command: {} ({e})",
                program.to_string_lossy()
            );
            exit_child(NOT_EXECUTABLE)
        }
    }
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it exists.
/// - Relative with multiple components (e.g., `bin/sh`): returns it if it exists.
/// - `./foo`: returns it if it exists.
/// - Single path component (no separators): search each directory in `search_paths` (PATH)
///   and return the first existing match.
/// - Empty path: returns `None`.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    if path.starts_with("./") && path.exists() {
        return Some(Cow::Borrowed(path));
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        (None, None) => None,
        (Some(x), None) => find_in_path(search_paths, x.as_os_str()).map(Cow::Owned),
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|candidate| is_file(candidate))
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.exists() { Some(path) } else { None }
}

fn is_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::lock_current_dir;
    use std::fs::{self, File};

    fn osstr(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    #[test]
    fn absolute_existing() {
        let path = Path::new("/bin/sh");
        let found = find_command_path(osstr("/bin"), path).expect("/bin/sh via absolute path");
        assert_eq!(found.as_ref(), path);
    }

    #[test]
    fn absolute_nonexisting() {
        let res = find_command_path(osstr("/bin"), Path::new("/bin/nonexisting"));
        assert!(res.is_none());
    }

    #[test]
    fn single_component_found_in_path() {
        let found = find_command_path(osstr("/nonexistent:/bin"), Path::new("sh"))
            .expect("Expected to find 'sh' in /bin via PATH search");
        assert_eq!(found.as_ref(), Path::new("/bin/sh"));
    }

    #[test]
    fn single_component_not_found_in_path() {
        let res = find_command_path(osstr("/bin"), Path::new("nonexisting"));
        assert!(res.is_none());
    }

    #[test]
    fn directories_in_path_are_skipped() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir(temp.path().join("tool")).unwrap();
        let search = std::env::join_paths([temp.path(), Path::new("/bin")]).unwrap();
        assert!(find_command_path(&search, Path::new("tool")).is_none());
    }

    #[test]
    fn multiple_components_relative_existing() {
        let _lock = lock_current_dir();
        let cwd_before = std::env::current_dir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join("bin")).unwrap();
        File::create(temp.path().join("bin").join("sh")).unwrap();

        std::env::set_current_dir(temp.path()).unwrap();
        let res = find_command_path(osstr("/does/not/matter"), Path::new("bin/sh"))
            .map(|p| p.into_owned());
        std::env::set_current_dir(&cwd_before).unwrap();

        assert!(res.expect("relative bin/sh").ends_with("bin/sh"));
    }

    #[test]
    fn current_dir_with_dot_prefix() {
        let _lock = lock_current_dir();
        let cwd_before = std::env::current_dir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        File::create(temp.path().join("foo")).unwrap();

        std::env::set_current_dir(temp.path()).unwrap();
        let res = find_command_path(osstr("/bin"), Path::new("./foo")).map(|p| p.into_owned());
        std::env::set_current_dir(&cwd_before).unwrap();

        assert_eq!(res.expect("./foo"), PathBuf::from("./foo"));
    }

    #[test]
    fn resolution_follows_session_path() {
        let temp = tempfile::tempdir().unwrap();
        File::create(temp.path().join("only-here")).unwrap();

        let mut env = Environment::new();
        env.set_var("PATH", "/nonexistent");
        assert_eq!(resolve_program(&env, c"only-here"), None);

        env.set_var("PATH", temp.path().to_string_lossy().into_owned());
        let found = resolve_program(&env, c"only-here").expect("found through session PATH");
        assert_eq!(found.to_bytes(), temp.path().join("only-here").as_os_str().as_bytes());
    }

    #[test]
    fn empty_path_is_none() {
        assert!(find_command_path(osstr("/bin"), Path::new("")).is_none());
    }
}
