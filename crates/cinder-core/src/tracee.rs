//! # Tracee Trait
//!
//! The seam between the debug session and a platform backend.
//!
//! The session only needs three things from a traced process:
//!
//! - its register file ([`RegisterAccess`])
//! - a memory handle that breakpoints can keep ([`WordMemory`])
//! - execution control: resume, single-step, wait ([`ExecutionControl`])
//!
//! On Linux these are implemented with `ptrace` by
//! [`PtraceProcess`](crate::platform::linux::PtraceProcess).
//!
//! ## Thread Safety
//!
//! ptrace requests are only accepted from the thread that is the tracer, so a
//! tracee (and the session that owns it) must stay on the thread that
//! launched it.

use crate::error::Result;
use crate::memory::WordMemory;
use crate::registers::RegisterAccess;
use crate::types::{ProcessId, StopEvent};

/// Resume / step / wait primitives
pub trait ExecutionControl
{
    /// Let the tracee run until its next signal (`PTRACE_CONT`).
    ///
    /// # Errors
    ///
    /// OS failure; the tracee stays stopped.
    fn resume(&mut self) -> Result<()>;

    /// Execute exactly one instruction (`PTRACE_SINGLESTEP`).
    ///
    /// # Errors
    ///
    /// OS failure; the tracee stays stopped.
    fn single_step(&mut self) -> Result<()>;

    /// Block until the tracee changes state and classify the result.
    ///
    /// There is no timeout: a tracee that never stops blocks forever.
    ///
    /// # Errors
    ///
    /// OS failure of `waitpid` or of the siginfo query.
    fn wait(&mut self) -> Result<StopEvent>;

    /// Kill the tracee and reap it.
    ///
    /// # Errors
    ///
    /// OS failure of the kill request.
    fn kill(&mut self) -> Result<()>;
}

/// A stopped, traceable process
pub trait Tracee: RegisterAccess + ExecutionControl
{
    /// Memory handle handed to each breakpoint.
    type Memory: WordMemory + Clone;

    /// Process being traced.
    fn pid(&self) -> ProcessId;

    /// New handle onto this process's address space.
    fn memory(&self) -> Self::Memory;
}
