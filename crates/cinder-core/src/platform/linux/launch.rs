//! # Process Launch
//!
//! Starting a debuggee under trace with `fork` + `PTRACE_TRACEME` + `execv`.
//!
//! The child asks to be traced and then execs the program. A successful exec
//! delivers SIGTRAP to a traced process, so the child stops before running
//! a single instruction of the new image, and the parent picks it up with
//! `waitpid`.
//!
//! Address space randomisation is switched off in the child, so runs are
//! reproducible and breakpoint addresses stay valid between sessions.
//!
//! ## References
//!
//! - [ptrace(2): PTRACE_TRACEME](https://man7.org/linux/man-pages/man2/ptrace.2.html)
//! - [personality(2)](https://man7.org/linux/man-pages/man2/personality.2.html)

use std::ffi::{CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use nix::sys::personality::{self, Persona};
use nix::sys::ptrace::{self, Options};
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{execv, fork, ForkResult, Pid};
use tracing::{debug, info};

use super::process::PtraceProcess;
use crate::error::{DebuggerError, Result};

/// Exit status of a child whose exec failed.
const EXEC_FAILED: i32 = 127;

/// Launch `program` with `args` (not including the program name) under trace.
///
/// The returned process is stopped at its first instruction; wrap it in a
/// [`DebugSession`](crate::DebugSession) to drive it.
///
/// # Errors
///
/// - `LaunchFailed` if the program does not exist, cannot be executed, or the
///   fork fails
/// - `InvalidArgument` if a path or argument contains a NUL byte
/// - `Ptrace` if the initial wait or option setup fails
pub fn launch(program: impl AsRef<Path>, args: &[String]) -> Result<PtraceProcess>
{
    let program = program.as_ref();
    info!(program = %program.display(), ?args, "launching");

    if !program.is_file() {
        return Err(DebuggerError::LaunchFailed(format!("{} is not a file", program.display())));
    }

    // Everything the child needs is allocated before the fork.
    let path = CString::new(program.as_os_str().as_bytes())
        .map_err(|_| DebuggerError::InvalidArgument(format!("program path {} contains a NUL byte", program.display())))?;
    let mut argv = Vec::with_capacity(args.len() + 1);
    argv.push(path.clone());
    for arg in args {
        argv.push(
            CString::new(arg.as_str())
                .map_err(|_| DebuggerError::InvalidArgument(format!("argument {arg:?} contains a NUL byte")))?,
        );
    }

    // SAFETY: the child only calls async-signal-safe functions before exec
    // (personality, ptrace, execv, _exit) and touches no locks or allocator.
    let fork_result = unsafe { fork() }.map_err(|err| DebuggerError::LaunchFailed(format!("fork failed: {err}")))?;
    match fork_result {
        ForkResult::Child => exec_traced(&path, &argv),
        ForkResult::Parent { child } => wait_for_exec(child, program),
    }
}

fn exec_traced(path: &CStr, argv: &[CString]) -> !
{
    if let Ok(persona) = personality::get() {
        let _ = personality::set(persona | Persona::ADDR_NO_RANDOMIZE);
    }
    if ptrace::traceme().is_ok() {
        let _ = execv(path, argv);
    }
    // SAFETY: `_exit` skips atexit handlers and stdio flushing that belong to
    // the parent's copy of the process.
    unsafe { libc::_exit(EXEC_FAILED) }
}

fn wait_for_exec(pid: Pid, program: &Path) -> Result<PtraceProcess>
{
    let status = waitpid(pid, None).map_err(|err| DebuggerError::ptrace("waitpid", err))?;
    match status {
        WaitStatus::Stopped(_, Signal::SIGTRAP) => {}
        WaitStatus::Exited(_, EXEC_FAILED) => {
            return Err(DebuggerError::LaunchFailed(format!(
                "could not execute {} under ptrace",
                program.display()
            )));
        }
        WaitStatus::Exited(_, code) => {
            return Err(DebuggerError::LaunchFailed(format!(
                "{} exited with status {code} before it could be traced",
                program.display()
            )));
        }
        other => {
            let _ = signal::kill(pid, Signal::SIGKILL);
            let _ = waitpid(pid, None);
            return Err(DebuggerError::LaunchFailed(format!("unexpected wait status after exec: {other:?}")));
        }
    }

    let process = PtraceProcess::new(pid, program.to_path_buf());
    // Dropping `process` on failure kills the child.
    ptrace::setoptions(pid, Options::PTRACE_O_EXITKILL).map_err(|err| DebuggerError::ptrace("SETOPTIONS", err))?;
    debug!(%pid, "tracee stopped at exec");
    info!(%pid, program = %program.display(), "launched under ptrace");
    Ok(process)
}
