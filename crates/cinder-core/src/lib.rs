//! # cinder-core
//!
//! Breakpoints and process control for the Cinder debugger.
//!
//! This crate provides:
//! - Register access by name, by DWARF number, or by id
//! - Word-granular memory access to the debuggee
//! - Software breakpoints (`int3` patching) that restore themselves on drop
//! - A debug session state machine with continue and single-step, stepping
//!   transparently over breakpoints
//! - Function lookup from DWARF debug info
//!
//! ## Layers
//!
//! ```text
//! DebugSession ── BreakpointTable ── Breakpoint ── WordMemory
//!      │
//!      ├── Tracee (RegisterAccess + ExecutionControl)
//!      └── SymbolResolver (DwarfResolver)
//! ```
//!
//! Everything above [`Tracee`] is platform-agnostic; the only backend is
//! [`platform::linux`] (ptrace, x86-64).
//!
//! ## Why unsafe code is needed
//!
//! Launching a debuggee needs `fork`, which is `unsafe` because the child
//! must restrict itself to async-signal-safe calls until it execs. All other
//! system calls go through the safe `nix` wrappers.

#![allow(unsafe_code)] // fork + _exit in the launcher

pub mod breakpoints;
pub mod error;
pub mod memory;
pub mod platform;
pub mod registers;
pub mod session;
pub mod symbols;
pub mod tracee;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use breakpoints::{Breakpoint, BreakpointInfo, BreakpointTable};
// Re-export commonly used types
pub use error::{DebuggerError, ErrorKind, Result};
pub use memory::WordMemory;
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub use platform::linux::{launch, PtraceProcess};
pub use registers::RegisterAccess;
pub use session::DebugSession;
pub use symbols::{DwarfResolver, SymbolResolver};
pub use tracee::{ExecutionControl, Tracee};
pub use types::{Address, FunctionDescriptor, ProcessId, RegisterId, SessionState, StopEvent};
