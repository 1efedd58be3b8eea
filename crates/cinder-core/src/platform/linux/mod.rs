//! # Linux ptrace Implementation
//!
//! Process control on Linux x86-64 through `ptrace(2)` and `waitpid(2)`.
//!
//! ## Requests Used
//!
//! - `PTRACE_TRACEME` + `execv`: start the debuggee stopped at its first instruction
//! - `PTRACE_PEEKDATA` / `PTRACE_POKEDATA`: word-sized memory access
//! - `PTRACE_GETREGS` / `PTRACE_SETREGS`: the whole user register file
//! - `PTRACE_CONT` / `PTRACE_SINGLESTEP`: execution control
//! - `PTRACE_GETSIGINFO`: tell a breakpoint trap from a single-step trap
//!
//! All requests go through the `nix` wrappers, which turn the `-1` / `errno`
//! convention into `Result`.
//!
//! ## Permissions
//!
//! A process may always trace its own children, so launching needs no
//! privileges. Containers commonly block ptrace through seccomp; launch then
//! fails with `LaunchFailed`.
//!
//! ## References
//!
//! - [ptrace(2) man page](https://man7.org/linux/man-pages/man2/ptrace.2.html)
//! - [proc(5): /proc/pid/maps](https://man7.org/linux/man-pages/man5/proc.5.html)

mod launch;
mod maps;
mod process;

pub use launch::launch;
pub use maps::load_bias;
pub use process::{PtraceMemory, PtraceProcess};
