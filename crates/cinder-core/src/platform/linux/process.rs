//! A traced child process and its memory handle.

use std::fs;
use std::path::{Path, PathBuf};

use libc::{c_long, c_void, user_regs_struct};
use nix::sys::ptrace;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, trace, warn};

use super::maps::load_bias;
use crate::error::{DebuggerError, Result};
use crate::memory::WordMemory;
use crate::registers::RegisterAccess;
use crate::tracee::{ExecutionControl, Tracee};
use crate::types::{Address, ProcessId, RegisterFile, StopEvent, TrapKind};

fn address_ptr(address: Address) -> ptrace::AddressType
{
    address.value() as usize as *mut c_void
}

/// Memory of a traced process, accessed with `PEEKDATA` / `POKEDATA`
#[derive(Debug, Clone, Copy)]
pub struct PtraceMemory
{
    pid: Pid,
}

impl WordMemory for PtraceMemory
{
    fn read_word(&self, address: Address) -> Result<u64>
    {
        let word = ptrace::read(self.pid, address_ptr(address)).map_err(|err| DebuggerError::ptrace("PEEKDATA", err))?;
        trace!(%address, word = format_args!("{word:#018x}"), "peek");
        Ok(word as u64)
    }

    fn write_word(&self, address: Address, word: u64) -> Result<()>
    {
        trace!(%address, word = format_args!("{word:#018x}"), "poke");
        ptrace::write(self.pid, address_ptr(address), word as c_long).map_err(|err| DebuggerError::ptrace("POKEDATA", err))
    }
}

/// A child process started under `PTRACE_TRACEME`
///
/// Created by [`launch`](super::launch). Dropping a process that has not
/// exited kills and reaps it.
#[derive(Debug)]
pub struct PtraceProcess
{
    pid: Pid,
    program: PathBuf,
    exited: bool,
}

impl PtraceProcess
{
    pub(crate) fn new(pid: Pid, program: PathBuf) -> Self
    {
        Self {
            pid,
            program,
            exited: false,
        }
    }

    /// Path the process was launched from.
    #[must_use]
    pub fn program(&self) -> &Path
    {
        &self.program
    }

    /// Canonical executable path, from `/proc/<pid>/exe`.
    ///
    /// # Errors
    ///
    /// `Io` if the link cannot be read (e.g. the process is gone).
    pub fn executable_path(&self) -> Result<PathBuf>
    {
        Ok(fs::read_link(format!("/proc/{}/exe", self.pid))?)
    }

    /// Address the executable's first segment is mapped at.
    ///
    /// # Errors
    ///
    /// `Io` if `/proc` cannot be read, `InvalidArgument` if the executable is
    /// not mapped.
    pub fn load_address(&self) -> Result<Address>
    {
        load_bias(self.pid(), &self.executable_path()?)
    }

    fn classify(&self, status: WaitStatus) -> Result<StopEvent>
    {
        let event = match status {
            WaitStatus::Exited(_, code) => StopEvent::Exited { status: code },
            WaitStatus::Signaled(_, signal, _) => StopEvent::Terminated { signal },
            WaitStatus::Stopped(_, Signal::SIGTRAP) => {
                let info = ptrace::getsiginfo(self.pid).map_err(|err| DebuggerError::ptrace("GETSIGINFO", err))?;
                StopEvent::Stopped {
                    signal: Signal::SIGTRAP,
                    trap: Some(TrapKind::from_si_code(info.si_code)),
                }
            }
            WaitStatus::Stopped(_, signal) => StopEvent::Stopped { signal, trap: None },
            other => {
                debug!(pid = %self.pid, status = ?other, "unhandled wait status");
                StopEvent::Other
            }
        };
        Ok(event)
    }
}

impl RegisterAccess for PtraceProcess
{
    fn read_registers(&self) -> Result<RegisterFile>
    {
        let regs = ptrace::getregs(self.pid).map_err(|err| DebuggerError::ptrace("GETREGS", err))?;
        Ok(from_user_regs(&regs))
    }

    fn write_registers(&mut self, registers: &RegisterFile) -> Result<()>
    {
        ptrace::setregs(self.pid, to_user_regs(registers)).map_err(|err| DebuggerError::ptrace("SETREGS", err))
    }
}

impl ExecutionControl for PtraceProcess
{
    fn resume(&mut self) -> Result<()>
    {
        ptrace::cont(self.pid, None).map_err(|err| DebuggerError::ptrace("CONT", err))
    }

    fn single_step(&mut self) -> Result<()>
    {
        ptrace::step(self.pid, None).map_err(|err| DebuggerError::ptrace("SINGLESTEP", err))
    }

    fn wait(&mut self) -> Result<StopEvent>
    {
        let status = waitpid(self.pid, None).map_err(|err| DebuggerError::ptrace("waitpid", err))?;
        let event = self.classify(status)?;
        if event.is_exit() {
            self.exited = true;
        }
        trace!(pid = %self.pid, %event, "wait");
        Ok(event)
    }

    fn kill(&mut self) -> Result<()>
    {
        signal::kill(self.pid, Signal::SIGKILL).map_err(|err| DebuggerError::ptrace("kill", err))?;
        loop {
            match waitpid(self.pid, None) {
                Ok(WaitStatus::Exited(..) | WaitStatus::Signaled(..)) => break,
                Ok(_) => {}
                Err(err) => return Err(DebuggerError::ptrace("waitpid", err)),
            }
        }
        self.exited = true;
        Ok(())
    }
}

impl Tracee for PtraceProcess
{
    type Memory = PtraceMemory;

    fn pid(&self) -> ProcessId
    {
        ProcessId(self.pid.as_raw())
    }

    fn memory(&self) -> Self::Memory
    {
        PtraceMemory { pid: self.pid }
    }
}

impl Drop for PtraceProcess
{
    fn drop(&mut self)
    {
        if self.exited {
            return;
        }
        if let Err(err) = ExecutionControl::kill(self) {
            warn!(pid = %self.pid, error = %err, "failed to kill tracee");
        }
    }
}

/// Kernel register block to a snapshot. Both are in `user_regs_struct` order.
fn from_user_regs(regs: &user_regs_struct) -> RegisterFile
{
    RegisterFile::from_slots([
        regs.r15,
        regs.r14,
        regs.r13,
        regs.r12,
        regs.rbp,
        regs.rbx,
        regs.r11,
        regs.r10,
        regs.r9,
        regs.r8,
        regs.rax,
        regs.rcx,
        regs.rdx,
        regs.rsi,
        regs.rdi,
        regs.orig_rax,
        regs.rip,
        regs.cs,
        regs.eflags,
        regs.rsp,
        regs.ss,
        regs.fs_base,
        regs.gs_base,
        regs.ds,
        regs.es,
        regs.fs,
        regs.gs,
    ])
}

fn to_user_regs(registers: &RegisterFile) -> user_regs_struct
{
    let [
        r15,
        r14,
        r13,
        r12,
        rbp,
        rbx,
        r11,
        r10,
        r9,
        r8,
        rax,
        rcx,
        rdx,
        rsi,
        rdi,
        orig_rax,
        rip,
        cs,
        eflags,
        rsp,
        ss,
        fs_base,
        gs_base,
        ds,
        es,
        fs,
        gs,
    ] = *registers.slots();
    user_regs_struct {
        r15,
        r14,
        r13,
        r12,
        rbp,
        rbx,
        r11,
        r10,
        r9,
        r8,
        rax,
        rcx,
        rdx,
        rsi,
        rdi,
        orig_rax,
        rip,
        cs,
        eflags,
        rsp,
        ss,
        fs_base,
        gs_base,
        ds,
        es,
        fs,
        gs,
    }
}
