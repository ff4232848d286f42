//! Turns a parsed line into running processes.
//!
//! The shell forks once per line. That child applies the output redirection and
//! then walks the pipeline from its last stage back to the first: at every stage
//! it creates a pipe and forks, the parent keeps the later stage and reads from the
//! pipe, the child continues with the earlier stage and writes into it. The first
//! stage applies the input redirection.
//!
//! A stage waits for its whole upstream chain to exit before it replaces its own
//! image, so stages run one after another and the output of an upstream stage must
//! fit in the pipe buffer.

use crate::arena::ArenaError;
use crate::command::ExitCode;
use crate::env::Environment;
use crate::external::{exec_stage, exit_child};
use crate::parser::{ParsedLine, StageRef};
use log::{debug, warn};
use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{self, dup2, fork, pipe, setpgid, ForkResult, Pid};
use std::ffi::CStr;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, RawFd};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Fork error: {0}")]
    Fork(#[source] Errno),
    #[error("Pipe error: {0}")]
    Pipe(#[source] Errno),
    #[error("Unable to open file {path}")]
    Open {
        path: String,
        #[source]
        source: Errno,
    },
    #[error("Unable to redirect descriptor {fd}: {source}")]
    Dup {
        fd: RawFd,
        #[source]
        source: Errno,
    },
    #[error("Wait error: {0}")]
    Wait(#[source] Errno),
    #[error("could not flush standard output")]
    Flush(#[from] io::Error),
    #[error(transparent)]
    Arena(#[from] ArenaError),
}

/// Runs `line` in a child process.
///
/// For a foreground line this returns the exit status of the process running the
/// last stage. For a background line it returns as soon as the job is detached.
pub fn execute(line: &ParsedLine<'_>, env: &Environment) -> Result<ExitCode, ExecError> {
    // Anything still buffered would otherwise be written once more by every child.
    io::stdout().flush()?;

    match unsafe { fork() }.map_err(ExecError::Fork)? {
        ForkResult::Parent { child } => {
            debug!(
                "spawned pid {child} for {} stage(s), background: {}",
                line.pipe_count() + 1,
                line.is_background()
            );
            let status = wait_for(child)?;
            debug!("pid {child} finished: {status:?}");
            Ok(status_code(status))
        }
        ForkResult::Child => {
            if line.is_background() {
                detach();
            }
            prepare_pipeline(line, env)
        }
    }
}

/// Moves the calling process out of the shell's reach.
///
/// The intermediate process exits at once, so the worker is reparented to init, and
/// the worker gets its own process group so terminal interrupts do not reach it.
fn detach() {
    match unsafe { fork() } {
        Ok(ForkResult::Parent { .. }) => exit_child(0),
        Ok(ForkResult::Child) => {
            if let Err(e) = setpgid(Pid::from_raw(0), Pid::from_raw(0)) {
                warn!("could not create process group for background job: {e}");
            }
        }
        Err(e) => fail(ExecError::Fork(e)),
    }
}

/// Applies the output redirection and starts the pipeline from its last stage.
fn prepare_pipeline(line: &ParsedLine<'_>, env: &Environment) -> ! {
    if let Some(path) = line.stdout() {
        let flags = OFlag::O_CREAT | OFlag::O_WRONLY;
        if let Err(e) = redirect(path, flags, libc::STDOUT_FILENO) {
            fail(e);
        }
    }

    match line.last_stage() {
        Ok(stage) => run_stage(env, stage, line.stdin()),
        Err(e) => fail(e.into()),
    }
}

fn run_stage(env: &Environment, stage: StageRef<'_>, stdin: Option<&CStr>) -> ! {
    let prev = match stage.prev() {
        Ok(prev) => prev,
        Err(e) => fail(e.into()),
    };

    let Some(prev) = prev else {
        // First stage of the pipeline.
        if let Some(path) = stdin {
            if let Err(e) = redirect(path, OFlag::O_RDONLY, libc::STDIN_FILENO) {
                fail(e);
            }
        }
        exec_stage(env, &stage.argv());
    };

    let (read, write) = match pipe() {
        Ok(ends) => ends,
        Err(e) => fail(ExecError::Pipe(e)),
    };

    match unsafe { fork() } {
        Err(e) => fail(ExecError::Fork(e)),
        Ok(ForkResult::Parent { child }) => {
            if let Err(e) = replace_fd(read.as_raw_fd(), libc::STDIN_FILENO) {
                fail(e);
            }
            drop(read);
            drop(write);
            if let Err(e) = wait_for(child) {
                fail(e);
            }
            exec_stage(env, &stage.argv())
        }
        Ok(ForkResult::Child) => {
            if let Err(e) = replace_fd(write.as_raw_fd(), libc::STDOUT_FILENO) {
                fail(e);
            }
            drop(read);
            drop(write);
            run_stage(env, prev, stdin)
        }
    }
}

/// Opens `path` and puts it in place of descriptor `target`.
fn redirect(path: &CStr, flags: OFlag, target: RawFd) -> Result<(), ExecError> {
    let fd = open(path, flags, Mode::S_IRUSR | Mode::S_IWUSR).map_err(|source| {
        ExecError::Open {
            path: path.to_string_lossy().into_owned(),
            source,
        }
    })?;
    let result = replace_fd(fd, target);
    let _ = unistd::close(fd);
    result
}

fn replace_fd(fd: RawFd, target: RawFd) -> Result<(), ExecError> {
    dup2(fd, target).map_err(|source| ExecError::Dup { fd: target, source })?;
    Ok(())
}

fn wait_for(child: Pid) -> Result<WaitStatus, ExecError> {
    loop {
        match waitpid(child, None) {
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(ExecError::Wait(e)),
            Ok(status) => return Ok(status),
        }
    }
}

/// Reports `err` and ends the calling (forked) process.
fn fail(err: ExecError) -> ! {
    eprintln!("{err}");
    exit_child(1)
}

/// Converts a wait status into a shell exit code.
pub fn status_code(status: WaitStatus) -> ExitCode {
    match status {
        WaitStatus::Exited(_, code) => code,
        WaitStatus::Signaled(_, signal, _) => 128 + signal as i32,
        _ => -1,
    }
}
