//! # Error Types
//!
//! General error handling for the debugger.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use nix::errno::Errno;
use thiserror::Error;

use crate::types::Address;

/// Main error type for debugger operations
///
/// This enum represents all the ways a debugger operation can fail.
/// Each variant belongs to one [`ErrorKind`], which tells the caller whether
/// the failure is fatal to the request or merely a lookup miss.
///
/// ## Error Categories
///
/// 1. **OS errors**: Ptrace, LaunchFailed, Io
/// 2. **Lookup errors**: UnknownRegister, UnknownDwarfRegister, SymbolNotFound, NoBreakpoint
/// 3. **Protocol errors**: NotStopped, ProcessExited, DuplicateBreakpoint, InvalidArgument
/// 4. **Debug info errors**: DebugInfo
#[derive(Error, Debug)]
pub enum DebuggerError
{
    /// A ptrace (or waitpid) request was rejected by the kernel
    ///
    /// Common causes:
    /// - `ESRCH`: the tracee is gone or not stopped
    /// - `EIO` / `EFAULT`: the address is not mapped in the tracee
    /// - `EPERM`: the caller is not the tracer (ptrace is per thread)
    ///
    /// See: [ptrace(2) man page](https://man7.org/linux/man-pages/man2/ptrace.2.html)
    #[error("ptrace {operation} failed: {source}")]
    Ptrace
    {
        /// Request that failed (`PEEKDATA`, `GETREGS`, `waitpid`, ...)
        operation: &'static str,
        /// Errno reported by the kernel
        #[source]
        source: Errno,
    },

    /// The debuggee could not be started under trace
    #[error("Failed to launch process: {0}")]
    LaunchFailed(String),

    /// No register with this name exists in the register table
    #[error("Unknown register: {0}")]
    UnknownRegister(String),

    /// No register carries this DWARF register number
    ///
    /// Registers without a DWARF mapping (`rip`, `orig_rax`) are never returned
    /// by DWARF lookups, so they also produce this error.
    #[error("Unknown DWARF register number: {0}")]
    UnknownDwarfRegister(u16),

    /// The symbol provider has no function containing the address
    #[error("No function found at {0}")]
    SymbolNotFound(Address),

    /// No breakpoint found at the specified address
    #[error("No breakpoint at {0}")]
    NoBreakpoint(Address),

    /// A breakpoint already occupies the address
    ///
    /// Replacing it would save the trap opcode as the "original" byte, so the
    /// request is rejected instead.
    #[error("Breakpoint already exists at {0}")]
    DuplicateBreakpoint(Address),

    /// Operation requires the process to be stopped
    ///
    /// Registers and memory of a running tracee are undefined, so the session
    /// refuses to read them instead of returning stale data.
    #[error("Process must be stopped for this operation")]
    NotStopped,

    /// The process already exited; only its exit status can be reported
    #[error("Process has exited")]
    ProcessExited,

    /// Invalid argument passed to a debugger function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// ELF or DWARF data could not be parsed
    #[error("Debug info error: {0}")]
    DebugInfo(String),

    /// I/O error (reading the executable, `/proc`, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`DebuggerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind
{
    /// A privileged OS primitive failed; the request is aborted
    Os,
    /// A lookup missed; the session is unaffected
    NotFound,
    /// The request is not valid in the current session state
    Protocol,
    /// Debug information could not be loaded
    Symbols,
}

impl DebuggerError
{
    /// Wrap an errno from the named ptrace request.
    #[must_use]
    pub const fn ptrace(operation: &'static str, source: Errno) -> Self
    {
        Self::Ptrace { operation, source }
    }

    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind
    {
        match self {
            Self::Ptrace { .. } | Self::LaunchFailed(_) | Self::Io(_) => ErrorKind::Os,
            Self::UnknownRegister(_) | Self::UnknownDwarfRegister(_) | Self::SymbolNotFound(_) | Self::NoBreakpoint(_) => {
                ErrorKind::NotFound
            }
            Self::NotStopped | Self::ProcessExited | Self::DuplicateBreakpoint(_) | Self::InvalidArgument(_) => {
                ErrorKind::Protocol
            }
            Self::DebugInfo(_) => ErrorKind::Symbols,
        }
    }

    /// `true` for lookup misses that leave the session untouched.
    #[must_use]
    pub const fn is_not_found(&self) -> bool
    {
        matches!(self.kind(), ErrorKind::NotFound)
    }
}

/// Convenience type alias for `Result<T, DebuggerError>`
///
/// ```rust
/// use cinder_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, DebuggerError>;
