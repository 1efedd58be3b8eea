//! Process identifiers, stop events, and session states.

use std::fmt;

use nix::sys::signal::Signal;

/// Process identifier (PID)
///
/// A PID is the number the kernel assigns to the traced process. On Linux it
/// is a `pid_t`, a signed 32-bit integer.
///
/// ## Example
///
/// ```rust
/// use cinder_core::types::ProcessId;
///
/// let pid = ProcessId::from(12345);
/// assert_eq!(pid.raw(), 12345);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub i32);

impl ProcessId
{
    /// Raw `pid_t` value.
    #[must_use]
    pub const fn raw(self) -> i32
    {
        self.0
    }
}

impl From<i32> for ProcessId
{
    fn from(pid: i32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for i32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Why a SIGTRAP was delivered, decoded from `siginfo.si_code`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapKind
{
    /// An `int3` executed (`SI_KERNEL` on x86-64, or `TRAP_BRKPT`)
    Breakpoint,
    /// A `PTRACE_SINGLESTEP` completed (`TRAP_TRACE`)
    SingleStep,
    /// Any other origin (exec stop, `kill(SIGTRAP)`, ...); carries the raw code
    Other(i32),
}

impl TrapKind
{
    /// `si_code` for a trap raised by the kernel itself (int3 on x86-64).
    pub const SI_KERNEL: i32 = 0x80;
    /// `si_code` for a process breakpoint.
    pub const TRAP_BRKPT: i32 = 1;
    /// `si_code` for a process trace trap (single step).
    pub const TRAP_TRACE: i32 = 2;

    /// Decode a SIGTRAP `si_code`.
    ///
    /// ```rust
    /// use cinder_core::types::TrapKind;
    ///
    /// assert_eq!(TrapKind::from_si_code(0x80), TrapKind::Breakpoint);
    /// assert_eq!(TrapKind::from_si_code(2), TrapKind::SingleStep);
    /// assert_eq!(TrapKind::from_si_code(0), TrapKind::Other(0));
    /// ```
    #[must_use]
    pub const fn from_si_code(code: i32) -> Self
    {
        match code {
            Self::SI_KERNEL | Self::TRAP_BRKPT => TrapKind::Breakpoint,
            Self::TRAP_TRACE => TrapKind::SingleStep,
            other => TrapKind::Other(other),
        }
    }
}

/// Result of waiting on the tracee
///
/// A stop event is transient: the session classifies it immediately after the
/// wait and keeps only the most recent one for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopEvent
{
    /// The tracee is stopped by a signal and can be inspected
    Stopped
    {
        /// Signal that stopped the tracee
        signal: Signal,
        /// Trap origin when `signal` is SIGTRAP
        trap: Option<TrapKind>,
    },
    /// The tracee exited normally with this status
    Exited
    {
        /// Exit status passed to `exit`
        status: i32,
    },
    /// The tracee was killed by a signal
    Terminated
    {
        /// Fatal signal
        signal: Signal,
    },
    /// A wait status the session does not act on (continued, ptrace event, ...)
    Other,
}

impl StopEvent
{
    /// `true` when the process is gone.
    #[must_use]
    pub const fn is_exit(&self) -> bool
    {
        matches!(self, StopEvent::Exited { .. } | StopEvent::Terminated { .. })
    }

    /// `true` for a SIGTRAP produced by a completed single step.
    #[must_use]
    pub const fn is_single_step(&self) -> bool
    {
        matches!(
            self,
            StopEvent::Stopped {
                signal: Signal::SIGTRAP,
                trap: Some(TrapKind::SingleStep),
            }
        )
    }

    /// `true` for a SIGTRAP raised by an `int3`.
    #[must_use]
    pub const fn is_breakpoint_trap(&self) -> bool
    {
        matches!(
            self,
            StopEvent::Stopped {
                signal: Signal::SIGTRAP,
                trap: Some(TrapKind::Breakpoint),
            }
        )
    }

    /// `true` for any SIGTRAP stop.
    #[must_use]
    pub const fn is_trap(&self) -> bool
    {
        matches!(self, StopEvent::Stopped { signal: Signal::SIGTRAP, .. })
    }
}

impl fmt::Display for StopEvent
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            StopEvent::Stopped {
                signal,
                trap: Some(TrapKind::Breakpoint),
            } => write!(f, "Stopped by {} (breakpoint)", signal.as_str()),
            StopEvent::Stopped {
                signal,
                trap: Some(TrapKind::SingleStep),
            } => write!(f, "Stopped by {} (single step)", signal.as_str()),
            StopEvent::Stopped { signal, .. } => write!(f, "Stopped by signal: {}", signal.as_str()),
            StopEvent::Exited { status } => write!(f, "Process exited with code: {status}"),
            StopEvent::Terminated { signal } => write!(f, "Process killed by signal: {}", signal.as_str()),
            StopEvent::Other => write!(f, "Stopped for unknown reason"),
        }
    }
}

/// Lifecycle of a debug session
///
/// ## State Transitions
///
/// - `Loaded` → `Running`: first `continue_execution`
/// - `Running` → `Stopped`: the wait reported a signal stop
/// - `Stopped` → `Running`: `continue_execution` or a step
/// - any → `Exited`: the wait reported exit or a fatal signal (terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState
{
    /// Attached and stopped, never resumed
    Loaded,
    /// Resumed; registers and memory must not be touched
    Running,
    /// Halted on a signal
    Stopped,
    /// Gone; only the exit status can be reported
    Exited,
}

impl SessionState
{
    /// `true` when registers and memory may be accessed.
    #[must_use]
    pub const fn is_inspectable(self) -> bool
    {
        matches!(self, SessionState::Loaded | SessionState::Stopped)
    }
}

impl fmt::Display for SessionState
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            SessionState::Loaded => "loaded",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
            SessionState::Exited => "exited",
        };
        write!(f, "{label}")
    }
}
