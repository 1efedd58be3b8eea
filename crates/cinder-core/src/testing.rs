//! In-memory tracee used by the unit tests.
//!
//! `FakeTracee` runs a tiny "program": a sorted list of instruction addresses
//! over a byte-addressed memory. Resuming walks the list until it meets an
//! `int3` byte (trap, pc = address + 1) or runs off the end (exit 0). Every
//! primitive can be told to fail so the session's partial-failure paths can be
//! driven deterministically.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use nix::errno::Errno;
use nix::sys::signal::Signal;

use crate::breakpoints::INT3;
use crate::error::{DebuggerError, Result};
use crate::memory::{WordMemory, WORD_SIZE};
use crate::registers::RegisterAccess;
use crate::tracee::{ExecutionControl, Tracee};
use crate::types::{Address, ProcessId, RegisterFile, RegisterId, StopEvent, TrapKind};

/// Counts down successful calls, then fails every call after that.
#[derive(Debug, Default, Clone, Copy)]
struct Fuse
{
    remaining: Option<usize>,
}

impl Fuse
{
    fn after(successes: usize) -> Self
    {
        Self {
            remaining: Some(successes),
        }
    }

    fn blown(&mut self) -> bool
    {
        match self.remaining {
            None => false,
            Some(0) => true,
            Some(n) => {
                self.remaining = Some(n - 1);
                false
            }
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState
{
    bytes: BTreeMap<u64, u8>,
    reads: usize,
    writes: usize,
    write_fuse: Fuse,
}

/// Byte-addressed memory with word access and failure injection
#[derive(Debug, Default, Clone)]
pub(crate) struct FakeMemory
{
    state: Rc<RefCell<MemoryState>>,
}

impl FakeMemory
{
    /// Map `bytes` starting at `address`.
    pub(crate) fn load(&self, address: Address, bytes: &[u8])
    {
        let mut state = self.state.borrow_mut();
        for (offset, byte) in bytes.iter().enumerate() {
            state.bytes.insert(address.value() + offset as u64, *byte);
        }
    }

    pub(crate) fn byte(&self, address: Address) -> u8
    {
        self.state.borrow().bytes.get(&address.value()).copied().unwrap_or_default()
    }

    pub(crate) fn reads(&self) -> usize
    {
        self.state.borrow().reads
    }

    pub(crate) fn writes(&self) -> usize
    {
        self.state.borrow().writes
    }

    pub(crate) fn fail_writes(&self, fail: bool)
    {
        self.state.borrow_mut().write_fuse = if fail { Fuse::after(0) } else { Fuse::default() };
    }

    /// Let `successes` more writes through, then fail.
    pub(crate) fn fail_writes_after(&self, successes: usize)
    {
        self.state.borrow_mut().write_fuse = Fuse::after(successes);
    }
}

fn unmapped(operation: &'static str) -> DebuggerError
{
    DebuggerError::ptrace(operation, Errno::EIO)
}

impl WordMemory for FakeMemory
{
    fn read_word(&self, address: Address) -> Result<u64>
    {
        let mut state = self.state.borrow_mut();
        state.reads += 1;
        let mut bytes = [0u8; WORD_SIZE as usize];
        for (offset, slot) in bytes.iter_mut().enumerate() {
            *slot = *state
                .bytes
                .get(&(address.value() + offset as u64))
                .ok_or_else(|| unmapped("PEEKDATA"))?;
        }
        Ok(u64::from_le_bytes(bytes))
    }

    fn write_word(&self, address: Address, word: u64) -> Result<()>
    {
        let mut state = self.state.borrow_mut();
        if state.write_fuse.blown() {
            return Err(unmapped("POKEDATA"));
        }
        let base = address.value();
        if (0..WORD_SIZE).any(|offset| !state.bytes.contains_key(&(base + offset))) {
            return Err(unmapped("POKEDATA"));
        }
        for (offset, byte) in word.to_le_bytes().into_iter().enumerate() {
            state.bytes.insert(base + offset as u64, byte);
        }
        state.writes += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CpuState
{
    registers: RegisterFile,
    program: Vec<Address>,
    executed: HashMap<Address, usize>,
    pending: Option<StopEvent>,
    exited: bool,
    getregs_fuse: Fuse,
    setregs_fuse: Fuse,
    step_fuse: Fuse,
    resume_fuse: Fuse,
    wait_fuse: Fuse,
}

/// Simulated stopped process
#[derive(Debug, Clone)]
pub(crate) struct FakeTracee
{
    memory: FakeMemory,
    cpu: Rc<RefCell<CpuState>>,
}

/// Failure points of the simulated tracee.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Failure
{
    GetRegs,
    SetRegs,
    Step,
    Resume,
    Wait,
}

impl FakeTracee
{
    /// `instructions` are `(length, byte)` pairs laid out from `base`; each
    /// instruction is filled with its byte. The pc starts at `base`.
    pub(crate) fn with_program(base: Address, instructions: &[(u64, u8)]) -> Self
    {
        let memory = FakeMemory::default();
        let mut program = Vec::with_capacity(instructions.len());
        let mut cursor = base;
        for &(length, byte) in instructions {
            program.push(cursor);
            memory.load(cursor, &vec![byte; length as usize]);
            cursor = cursor + length;
        }
        // padding so word access near the end stays mapped
        memory.load(cursor, &[0u8; WORD_SIZE as usize]);

        let mut registers = RegisterFile::default();
        registers.set(RegisterId::Rip, base.value());
        registers.set(RegisterId::Rsp, 0x7fff_0000);

        Self {
            memory,
            cpu: Rc::new(RefCell::new(CpuState {
                registers,
                program,
                ..CpuState::default()
            })),
        }
    }

    pub(crate) fn fake_memory(&self) -> FakeMemory
    {
        self.memory.clone()
    }

    pub(crate) fn pc(&self) -> Address
    {
        Address::new(self.cpu.borrow().registers.get(RegisterId::Rip))
    }

    /// How many times the instruction at `address` really executed.
    pub(crate) fn executions(&self, address: Address) -> usize
    {
        self.cpu.borrow().executed.get(&address).copied().unwrap_or_default()
    }

    /// Let `successes` more calls of `failure` through, then fail.
    pub(crate) fn fail_after(&self, failure: Failure, successes: usize)
    {
        let mut cpu = self.cpu.borrow_mut();
        let fuse = match failure {
            Failure::GetRegs => &mut cpu.getregs_fuse,
            Failure::SetRegs => &mut cpu.setregs_fuse,
            Failure::Step => &mut cpu.step_fuse,
            Failure::Resume => &mut cpu.resume_fuse,
            Failure::Wait => &mut cpu.wait_fuse,
        };
        *fuse = Fuse::after(successes);
    }

    fn next_instruction(cpu: &CpuState, pc: Address) -> Option<Address>
    {
        cpu.program.iter().copied().find(|&address| address > pc)
    }

    fn trap_at(cpu: &mut CpuState, address: Address) -> StopEvent
    {
        cpu.registers.set(RegisterId::Rip, (address + 1).value());
        StopEvent::Stopped {
            signal: Signal::SIGTRAP,
            trap: Some(TrapKind::Breakpoint),
        }
    }

    fn exit(cpu: &mut CpuState) -> StopEvent
    {
        cpu.exited = true;
        StopEvent::Exited { status: 0 }
    }
}

impl RegisterAccess for FakeTracee
{
    fn read_registers(&self) -> Result<RegisterFile>
    {
        let mut cpu = self.cpu.borrow_mut();
        if cpu.exited {
            return Err(DebuggerError::ptrace("GETREGS", Errno::ESRCH));
        }
        if cpu.getregs_fuse.blown() {
            return Err(DebuggerError::ptrace("GETREGS", Errno::ESRCH));
        }
        Ok(cpu.registers)
    }

    fn write_registers(&mut self, registers: &RegisterFile) -> Result<()>
    {
        let mut cpu = self.cpu.borrow_mut();
        if cpu.exited || cpu.setregs_fuse.blown() {
            return Err(DebuggerError::ptrace("SETREGS", Errno::ESRCH));
        }
        cpu.registers = *registers;
        Ok(())
    }
}

impl ExecutionControl for FakeTracee
{
    fn resume(&mut self) -> Result<()>
    {
        let mut cpu = self.cpu.borrow_mut();
        if cpu.exited || cpu.resume_fuse.blown() {
            return Err(DebuggerError::ptrace("CONT", Errno::ESRCH));
        }

        let pc = Address::new(cpu.registers.get(RegisterId::Rip));
        let mut current = cpu.program.iter().copied().find(|&address| address >= pc);
        let event = loop {
            let Some(address) = current else {
                break Self::exit(&mut cpu);
            };
            if self.memory.byte(address) == INT3 {
                break Self::trap_at(&mut cpu, address);
            }
            *cpu.executed.entry(address).or_default() += 1;
            current = Self::next_instruction(&cpu, address);
        };
        cpu.pending = Some(event);
        Ok(())
    }

    fn single_step(&mut self) -> Result<()>
    {
        let mut cpu = self.cpu.borrow_mut();
        if cpu.exited || cpu.step_fuse.blown() {
            return Err(DebuggerError::ptrace("SINGLESTEP", Errno::ESRCH));
        }

        let pc = Address::new(cpu.registers.get(RegisterId::Rip));
        let event = if self.memory.byte(pc) == INT3 {
            Self::trap_at(&mut cpu, pc)
        } else {
            *cpu.executed.entry(pc).or_default() += 1;
            match Self::next_instruction(&cpu, pc) {
                Some(next) => {
                    cpu.registers.set(RegisterId::Rip, next.value());
                    StopEvent::Stopped {
                        signal: Signal::SIGTRAP,
                        trap: Some(TrapKind::SingleStep),
                    }
                }
                None => Self::exit(&mut cpu),
            }
        };
        cpu.pending = Some(event);
        Ok(())
    }

    fn wait(&mut self) -> Result<StopEvent>
    {
        let mut cpu = self.cpu.borrow_mut();
        if cpu.wait_fuse.blown() {
            return Err(DebuggerError::ptrace("waitpid", Errno::ECHILD));
        }
        cpu.pending.take().ok_or(DebuggerError::ptrace("waitpid", Errno::ECHILD))
    }

    fn kill(&mut self) -> Result<()>
    {
        let mut cpu = self.cpu.borrow_mut();
        if cpu.exited {
            return Err(DebuggerError::ptrace("KILL", Errno::ESRCH));
        }
        cpu.exited = true;
        Ok(())
    }
}

impl Tracee for FakeTracee
{
    type Memory = FakeMemory;

    fn pid(&self) -> ProcessId
    {
        ProcessId(4242)
    }

    fn memory(&self) -> Self::Memory
    {
        self.memory.clone()
    }
}
