//! # Debug Session
//!
//! The state machine tying one traced process to its breakpoints and an
//! optional symbol resolver.
//!
//! ## Continuing past a breakpoint
//!
//! After an `int3` fires the program counter points one byte past the
//! breakpoint, and the original instruction has not run yet. Continuing
//! therefore has to:
//!
//! 1. rewind the pc to the breakpoint address
//! 2. disable the breakpoint (restore the original byte)
//! 3. single-step the original instruction
//! 4. re-enable the breakpoint
//! 5. resume
//!
//! The breakpoint is armed again before control returns to the caller.
//!
//! ## Failures part-way through
//!
//! Every sub-step can fail. Nothing is rolled back; the session reports the
//! error and keeps whatever state the last successful sub-step produced:
//!
//! | failing sub-step    | pc        | breakpoint | state      |
//! |---------------------|-----------|------------|------------|
//! | read pc             | unchanged | enabled    | unchanged  |
//! | rewind pc           | unchanged | enabled    | unchanged  |
//! | disable             | rewound   | enabled    | unchanged  |
//! | single-step request | rewound   | disabled   | unchanged  |
//! | wait after step     | unknown   | disabled   | `Running`  |
//! | re-enable           | advanced  | disabled   | `Stopped`  |
//! | resume              | advanced  | enabled    | `Stopped`  |
//! | wait after resume   | unknown   | enabled    | `Running`  |
//!
//! A disabled breakpoint left behind by a failure can be re-armed with
//! [`DebugSession::enable_breakpoint`].
//!
//! ## Removing the breakpoint the tracee stopped on
//!
//! `remove_breakpoint` and `disable_breakpoint` on the breakpoint whose trap
//! just fired move the pc back onto the breakpoint address first, so the
//! shadowed instruction still runs on the next resume. If that rewind fails
//! nothing else happens; if the restore after it fails, the pc is rewound and
//! the trap is still armed, so the next resume reports the same breakpoint
//! again.
//!
//! ## Arriving at a breakpoint
//!
//! A breakpoint fires whenever execution reaches an armed trap, whether by
//! [`DebugSession::continue_execution`] or by
//! [`DebugSession::step_instruction`]. A `stepi` that lands on a breakpoint
//! address therefore stops there as a single step, and the next `continue` or
//! `stepi` reports the hit before the instruction runs.

use nix::sys::signal::Signal;
use tracing::{debug, info, warn};

use crate::breakpoints::{Breakpoint, BreakpointInfo, BreakpointTable, TRAP_LENGTH};
use crate::error::{DebuggerError, Result};
use crate::memory::WordMemory;
use crate::registers::{get_register_value, set_register_value};
use crate::symbols::SymbolResolver;
use crate::tracee::Tracee;
use crate::types::{
    register_by_name, Address, FunctionDescriptor, ProcessId, RegisterId, RegisterValue, SessionState, StopEvent,
};

/// A debugging session over one tracee
///
/// The session exclusively owns its tracee and breakpoints. Dropping the
/// session drops the breakpoints first, which restores every enabled patch
/// while the process is still there.
pub struct DebugSession<T: Tracee>
{
    // Declared first so breakpoints are restored before the tracee goes away.
    breakpoints: BreakpointTable<T::Memory>,
    memory: T::Memory,
    tracee: T,
    symbols: Option<Box<dyn SymbolResolver>>,
    state: SessionState,
    last_stop: Option<StopEvent>,
    // Breakpoint whose trap fired at the last stop; the pc sits one past it.
    parked_at: Option<Address>,
}

impl<T: Tracee> DebugSession<T>
{
    /// Wrap a tracee that is stopped and has never been resumed.
    pub fn new(tracee: T) -> Self
    {
        let memory = tracee.memory();
        Self {
            breakpoints: BreakpointTable::new(),
            memory,
            tracee,
            symbols: None,
            state: SessionState::Loaded,
            last_stop: None,
            parked_at: None,
        }
    }

    /// Attach a symbol resolver.
    #[must_use]
    pub fn with_symbols(mut self, resolver: Box<dyn SymbolResolver>) -> Self
    {
        self.symbols = Some(resolver);
        self
    }

    #[must_use]
    pub fn state(&self) -> SessionState
    {
        self.state
    }

    #[must_use]
    pub fn pid(&self) -> ProcessId
    {
        self.tracee.pid()
    }

    /// Most recent wait result, if the tracee has been resumed at least once.
    #[must_use]
    pub fn last_stop(&self) -> Option<StopEvent>
    {
        self.last_stop
    }

    #[must_use]
    pub fn tracee(&self) -> &T
    {
        &self.tracee
    }

    fn ensure_stopped(&self) -> Result<()>
    {
        match self.state {
            state if state.is_inspectable() => Ok(()),
            SessionState::Exited => Err(DebuggerError::ProcessExited),
            _ => Err(DebuggerError::NotStopped),
        }
    }

    // ---- breakpoints ----

    /// Install and enable a breakpoint at `address`.
    ///
    /// # Errors
    ///
    /// - `DuplicateBreakpoint` if one already exists there
    /// - the word read/write error if the address cannot be patched (nothing
    ///   is recorded in that case)
    pub fn set_breakpoint_at(&mut self, address: Address) -> Result<()>
    {
        self.ensure_stopped()?;
        if self.breakpoints.contains(address) {
            return Err(DebuggerError::DuplicateBreakpoint(address));
        }

        let mut breakpoint = Breakpoint::new(self.memory.clone(), address);
        breakpoint.enable()?;
        self.breakpoints.insert(breakpoint)?;
        info!(%address, "breakpoint set");
        Ok(())
    }

    /// Restore the original instruction and forget the breakpoint.
    ///
    /// If the tracee is stopped on this breakpoint's trap, the pc is moved
    /// back onto `address` first.
    ///
    /// # Errors
    ///
    /// `NoBreakpoint` if absent; the pc or restore error otherwise, in which
    /// case the breakpoint stays in the table.
    pub fn remove_breakpoint(&mut self, address: Address) -> Result<()>
    {
        self.ensure_stopped()?;
        self.require_breakpoint(address)?;
        self.rewind_if_parked_at(address)?;
        self.breakpoints.require_mut(address)?.disable()?;
        self.breakpoints.remove(address)?;
        info!(%address, "breakpoint removed");
        Ok(())
    }

    /// Re-arm an existing breakpoint.
    ///
    /// # Errors
    ///
    /// `NoBreakpoint` if absent, or the patch error.
    pub fn enable_breakpoint(&mut self, address: Address) -> Result<()>
    {
        self.ensure_stopped()?;
        self.breakpoints.require_mut(address)?.enable()
    }

    /// Disarm an existing breakpoint without forgetting it.
    ///
    /// Rewinds the pc like [`DebugSession::remove_breakpoint`].
    ///
    /// # Errors
    ///
    /// `NoBreakpoint` if absent, or the pc or restore error.
    pub fn disable_breakpoint(&mut self, address: Address) -> Result<()>
    {
        self.ensure_stopped()?;
        self.require_breakpoint(address)?;
        self.rewind_if_parked_at(address)?;
        self.breakpoints.require_mut(address)?.disable()
    }

    fn require_breakpoint(&self, address: Address) -> Result<()>
    {
        if self.breakpoints.contains(address) {
            Ok(())
        } else {
            Err(DebuggerError::NoBreakpoint(address))
        }
    }

    /// Undo the trap's pc advance when the tracee is parked on `address`.
    fn rewind_if_parked_at(&mut self, address: Address) -> Result<()>
    {
        if self.parked_at != Some(address) {
            return Ok(());
        }
        if self.program_counter()? == address + TRAP_LENGTH {
            self.set_program_counter(address)?;
            debug!(%address, "pc moved back onto breakpoint");
        }
        self.parked_at = None;
        Ok(())
    }

    /// All breakpoints, sorted by address.
    #[must_use]
    pub fn breakpoints(&self) -> Vec<BreakpointInfo>
    {
        self.breakpoints.list()
    }

    // ---- execution control ----

    /// Resume the tracee until its next stop.
    ///
    /// If the tracee sits just past an enabled breakpoint, the original
    /// instruction is stepped first. If the process exits during that step
    /// the exit is returned without resuming.
    ///
    /// # Errors
    ///
    /// `NotStopped` / `ProcessExited` outside an inspectable state, otherwise
    /// the first failing sub-step (see the module docs for the resulting state).
    pub fn continue_execution(&mut self) -> Result<StopEvent>
    {
        self.ensure_stopped()?;

        if let Some(event) = self.step_over_breakpoint_if_present()? {
            if event.is_exit() {
                return Ok(event);
            }
        }

        self.tracee.resume()?;
        self.state = SessionState::Running;
        debug!(pid = %self.pid(), "resumed");

        self.wait_for_stop()
    }

    /// Step the instruction under a just-hit breakpoint.
    ///
    /// Only acts when the last stop was the trap of a breakpoint that is
    /// still enabled and the pc is still `address + 1`. Then the pc is
    /// rewound, the breakpoint disabled, one instruction stepped, and the
    /// breakpoint re-enabled unless the process exited. A fresh session, a
    /// completed single step or a stop by another signal never rewinds.
    ///
    /// Returns the single-step event, or `None` when there was nothing to step.
    ///
    /// # Errors
    ///
    /// The first failing sub-step; see the module docs.
    pub fn step_over_breakpoint_if_present(&mut self) -> Result<Option<StopEvent>>
    {
        self.ensure_stopped()?;
        let Some(address) = self.parked_at else {
            return Ok(None);
        };
        if !self.breakpoints.is_enabled_at(address) {
            return Ok(None);
        }
        if self.program_counter()? != address + TRAP_LENGTH {
            // pc was moved by hand; the trap no longer applies
            self.parked_at = None;
            return Ok(None);
        }

        debug!(%address, "stepping over breakpoint");
        self.set_program_counter(address)?;
        self.parked_at = None;
        self.step_past(address).map(Some)
    }

    /// Execute exactly one instruction.
    ///
    /// After a breakpoint hit this runs the shadowed instruction. An armed
    /// breakpoint under the pc fires instead of being stepped over, the same
    /// as with `continue_execution`.
    ///
    /// # Errors
    ///
    /// Protocol guard errors, or the failing ptrace request.
    pub fn step_instruction(&mut self) -> Result<StopEvent>
    {
        self.ensure_stopped()?;

        if let Some(event) = self.step_over_breakpoint_if_present()? {
            return Ok(event);
        }

        self.tracee.single_step()?;
        self.state = SessionState::Running;
        self.wait_for_stop()
    }

    /// Disable the breakpoint at `address`, step once, re-enable.
    fn step_past(&mut self, address: Address) -> Result<StopEvent>
    {
        self.breakpoints.require_mut(address)?.disable()?;

        self.tracee.single_step()?;
        self.state = SessionState::Running;
        let event = self.wait_for_stop()?;

        if !event.is_exit() {
            self.breakpoints.require_mut(address)?.enable()?;
        }
        Ok(event)
    }

    fn wait_for_stop(&mut self) -> Result<StopEvent>
    {
        self.parked_at = None;
        let event = self.tracee.wait()?;
        self.last_stop = Some(event);

        if event.is_exit() {
            self.state = SessionState::Exited;
            self.breakpoints.abandon_all();
            info!(pid = %self.pid(), %event, "tracee exited");
        } else {
            self.state = SessionState::Stopped;
            debug!(pid = %self.pid(), %event, "tracee stopped");
            if event.is_breakpoint_trap() {
                self.record_breakpoint_hit();
            }
        }
        Ok(event)
    }

    fn record_breakpoint_hit(&mut self)
    {
        let pc = match self.program_counter() {
            Ok(pc) => pc,
            Err(err) => {
                warn!(error = %err, "could not read pc after trap");
                return;
            }
        };
        let Some(candidate) = pc.checked_sub(TRAP_LENGTH) else {
            return;
        };
        if let Some(breakpoint) = self.breakpoints.get_mut(candidate) {
            if breakpoint.is_enabled() {
                breakpoint.record_hit();
                info!(address = %candidate, hits = breakpoint.hit_count(), "breakpoint hit");
                self.parked_at = Some(candidate);
            }
        }
    }

    /// Terminate the tracee.
    ///
    /// Breakpoints are abandoned without touching memory.
    ///
    /// # Errors
    ///
    /// `ProcessExited` if already gone, or the kill error.
    pub fn kill(&mut self) -> Result<()>
    {
        if self.state == SessionState::Exited {
            return Err(DebuggerError::ProcessExited);
        }
        self.tracee.kill()?;
        self.breakpoints.abandon_all();
        self.parked_at = None;
        self.state = SessionState::Exited;
        self.last_stop = Some(StopEvent::Terminated { signal: Signal::SIGKILL });
        info!(pid = %self.pid(), "tracee killed");
        Ok(())
    }

    // ---- registers ----

    /// # Errors
    ///
    /// Protocol guard errors or the register read failure.
    pub fn read_register(&self, id: RegisterId) -> Result<u64>
    {
        self.ensure_stopped()?;
        get_register_value(&self.tracee, id)
    }

    /// # Errors
    ///
    /// Protocol guard errors or the register write failure.
    pub fn write_register(&mut self, id: RegisterId, value: u64) -> Result<()>
    {
        self.ensure_stopped()?;
        set_register_value(&mut self.tracee, id, value)
    }

    /// # Errors
    ///
    /// `UnknownRegister` for a name not in the table, then as `read_register`.
    pub fn read_register_by_name(&self, name: &str) -> Result<u64>
    {
        self.read_register(register_by_name(name)?)
    }

    /// # Errors
    ///
    /// `UnknownRegister` for a name not in the table, then as `write_register`.
    pub fn write_register_by_name(&mut self, name: &str, value: u64) -> Result<()>
    {
        self.write_register(register_by_name(name)?, value)
    }

    /// # Errors
    ///
    /// As `read_register`.
    pub fn program_counter(&self) -> Result<Address>
    {
        self.read_register(RegisterId::Rip).map(Address::new)
    }

    /// # Errors
    ///
    /// As `write_register`.
    pub fn set_program_counter(&mut self, address: Address) -> Result<()>
    {
        self.write_register(RegisterId::Rip, address.value())
    }

    /// Every register from a single snapshot, in table order.
    ///
    /// # Errors
    ///
    /// Protocol guard errors or the register read failure.
    pub fn dump_registers(&self) -> Result<Vec<RegisterValue>>
    {
        self.ensure_stopped()?;
        Ok(self.tracee.read_registers()?.iter().collect())
    }

    // ---- memory ----

    /// # Errors
    ///
    /// Protocol guard errors or the word read failure.
    pub fn read_memory(&self, address: Address) -> Result<u64>
    {
        self.ensure_stopped()?;
        self.memory.read_word(address)
    }

    /// # Errors
    ///
    /// Protocol guard errors or the word write failure.
    pub fn write_memory(&mut self, address: Address, word: u64) -> Result<()>
    {
        self.ensure_stopped()?;
        self.memory.write_word(address, word)
    }

    // ---- symbols ----

    /// Function containing `address`.
    ///
    /// # Errors
    ///
    /// `SymbolNotFound` when no function covers it or no resolver is attached.
    pub fn resolve_function(&self, address: Address) -> Result<FunctionDescriptor>
    {
        self.symbols
            .as_ref()
            .and_then(|resolver| resolver.resolve(address))
            .ok_or(DebuggerError::SymbolNotFound(address))
    }
}
