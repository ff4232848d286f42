//! Signal disposition of the shell process.

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

extern "C" fn on_interrupt(_: libc::c_int) {}

/// Keeps the shell alive on `SIGINT`.
///
/// A no-op handler is installed rather than ignoring the signal: handlers are reset
/// to the default action by `exec`, so foreground programs can still be interrupted
/// while the shell survives.
pub fn install_interrupt_handler() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_interrupt),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    unsafe { sigaction(Signal::SIGINT, &action) }?;
    Ok(())
}
