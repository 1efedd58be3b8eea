//! Software breakpoints and the per-session breakpoint table.
//!
//! A software breakpoint replaces the first byte of an instruction with the
//! one-byte `int3` opcode (`0xCC`). When the CPU executes it the kernel stops
//! the tracee with SIGTRAP and leaves the program counter one byte past the
//! patched address.
//!
//! ## Patch lifecycle
//!
//! 1. `new`: disabled, memory untouched
//! 2. `enable`: save the original low byte, write the trap
//! 3. `disable`: write the saved byte back
//! 4. drop: behaves like `disable` if still enabled, so a breakpoint can never
//!    leave a stray trap behind in a live process
//!
//! `enable(); disable()` leaves the patched word bit-identical, provided no
//! one else wrote to it in between.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, trace, warn};

use crate::error::{DebuggerError, Result};
use crate::memory::{write_byte, WordMemory};
use crate::types::Address;

/// x86-64 `int3` opcode.
pub const INT3: u8 = 0xcc;

/// Length of the trap instruction; the PC after a trap is `address + TRAP_LENGTH`.
pub const TRAP_LENGTH: u64 = 1;

/// One patched location in the tracee
#[derive(Debug)]
pub struct Breakpoint<M: WordMemory>
{
    memory: M,
    address: Address,
    enabled: bool,
    saved_byte: Option<u8>,
    hit_count: u64,
}

impl<M: WordMemory> Breakpoint<M>
{
    /// Create a disabled breakpoint. Memory is not touched.
    pub fn new(memory: M, address: Address) -> Self
    {
        Self {
            memory,
            address,
            enabled: false,
            saved_byte: None,
            hit_count: 0,
        }
    }

    /// Install the trap.
    ///
    /// Calling this on an enabled breakpoint does nothing: re-reading the word
    /// would save the trap opcode as the original instruction.
    ///
    /// # Errors
    ///
    /// Word read/write failure. On failure the breakpoint stays disabled and
    /// the previously saved byte is kept.
    pub fn enable(&mut self) -> Result<()>
    {
        if self.enabled {
            trace!(address = %self.address, "breakpoint already enabled");
            return Ok(());
        }

        let original = write_byte(&self.memory, self.address, INT3)?;
        self.saved_byte = Some(original);
        self.enabled = true;
        debug!(address = %self.address, original = format_args!("{original:#04x}"), "breakpoint enabled");
        Ok(())
    }

    /// Restore the original byte.
    ///
    /// Calling this on a disabled breakpoint does nothing.
    ///
    /// # Errors
    ///
    /// Word read/write failure. On failure the breakpoint stays enabled.
    pub fn disable(&mut self) -> Result<()>
    {
        if !self.enabled {
            trace!(address = %self.address, "breakpoint already disabled");
            return Ok(());
        }
        let Some(original) = self.saved_byte else {
            self.enabled = false;
            return Ok(());
        };

        write_byte(&self.memory, self.address, original)?;

        self.enabled = false;
        debug!(address = %self.address, "breakpoint disabled");
        Ok(())
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool
    {
        self.enabled
    }

    #[must_use]
    pub fn address(&self) -> Address
    {
        self.address
    }

    /// Instruction byte the trap replaced, once the breakpoint has been enabled.
    #[must_use]
    pub fn saved_byte(&self) -> Option<u8>
    {
        self.saved_byte
    }

    #[must_use]
    pub fn hit_count(&self) -> u64
    {
        self.hit_count
    }

    #[must_use]
    pub fn info(&self) -> BreakpointInfo
    {
        BreakpointInfo {
            address: self.address,
            enabled: self.enabled,
            hit_count: self.hit_count,
        }
    }

    pub(crate) fn record_hit(&mut self)
    {
        self.hit_count = self.hit_count.saturating_add(1);
    }

    /// Forget the patch without touching memory. Used once the process is gone.
    pub(crate) fn abandon(&mut self)
    {
        self.enabled = false;
    }
}

impl<M: WordMemory> Drop for Breakpoint<M>
{
    fn drop(&mut self)
    {
        if let Err(err) = self.disable() {
            warn!(address = %self.address, error = %err, "failed to restore original instruction");
        }
    }
}

/// Public information about a breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointInfo
{
    /// The patched address.
    pub address: Address,
    /// Whether the trap is currently installed.
    pub enabled: bool,
    /// Number of times the trap fired.
    pub hit_count: u64,
}

impl fmt::Display for BreakpointInfo
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let state = if self.enabled { "enabled" } else { "disabled" };
        write!(f, "{} {state} hits={}", self.address, self.hit_count)
    }
}

/// Breakpoints keyed by address, at most one per address
#[derive(Debug)]
pub struct BreakpointTable<M: WordMemory>
{
    entries: HashMap<Address, Breakpoint<M>>,
}

impl<M: WordMemory> Default for BreakpointTable<M>
{
    fn default() -> Self
    {
        Self { entries: HashMap::new() }
    }
}

impl<M: WordMemory> BreakpointTable<M>
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Add a breakpoint.
    ///
    /// # Errors
    ///
    /// `DuplicateBreakpoint` if the address is taken. The rejected breakpoint
    /// is dropped, which restores memory if it had been enabled.
    pub fn insert(&mut self, breakpoint: Breakpoint<M>) -> Result<()>
    {
        let address = breakpoint.address();
        if self.entries.contains_key(&address) {
            return Err(DebuggerError::DuplicateBreakpoint(address));
        }
        self.entries.insert(address, breakpoint);
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, address: Address) -> bool
    {
        self.entries.contains_key(&address)
    }

    #[must_use]
    pub fn get(&self, address: Address) -> Option<&Breakpoint<M>>
    {
        self.entries.get(&address)
    }

    pub fn get_mut(&mut self, address: Address) -> Option<&mut Breakpoint<M>>
    {
        self.entries.get_mut(&address)
    }

    /// Breakpoint at `address`, or `NoBreakpoint`.
    ///
    /// # Errors
    ///
    /// `NoBreakpoint` if the address has none.
    pub fn require_mut(&mut self, address: Address) -> Result<&mut Breakpoint<M>>
    {
        self.entries.get_mut(&address).ok_or(DebuggerError::NoBreakpoint(address))
    }

    /// `true` if an enabled breakpoint sits at `address`.
    #[must_use]
    pub fn is_enabled_at(&self, address: Address) -> bool
    {
        self.entries.get(&address).is_some_and(Breakpoint::is_enabled)
    }

    /// Take a breakpoint out of the table without touching memory.
    ///
    /// # Errors
    ///
    /// `NoBreakpoint` if the address has none.
    pub fn remove(&mut self, address: Address) -> Result<Breakpoint<M>>
    {
        self.entries.remove(&address).ok_or(DebuggerError::NoBreakpoint(address))
    }

    #[must_use]
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    /// Snapshot of every breakpoint, sorted by address.
    #[must_use]
    pub fn list(&self) -> Vec<BreakpointInfo>
    {
        let mut infos: Vec<BreakpointInfo> = self.entries.values().map(Breakpoint::info).collect();
        infos.sort_by_key(|info| info.address);
        infos
    }

    /// Mark every breakpoint as gone with its process.
    pub(crate) fn abandon_all(&mut self)
    {
        for breakpoint in self.entries.values_mut() {
            breakpoint.abandon();
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::memory::read_byte;
    use crate::testing::FakeMemory;

    const CODE: Address = Address::new(0x1000);

    fn memory_with_code() -> FakeMemory
    {
        let memory = FakeMemory::default();
        memory.load(CODE, &[0x55, 0x48, 0x89, 0xe5, 0x90, 0x90, 0x90, 0xc3]);
        memory
    }

    #[test]
    fn test_new_breakpoint_does_not_touch_memory()
    {
        let memory = memory_with_code();
        let breakpoint = Breakpoint::new(memory.clone(), CODE);
        assert!(!breakpoint.is_enabled());
        assert_eq!(breakpoint.saved_byte(), None);
        assert_eq!(memory.writes(), 0);
    }

    #[test]
    fn test_enable_installs_trap()
    {
        let memory = memory_with_code();
        let mut breakpoint = Breakpoint::new(memory.clone(), CODE);
        breakpoint.enable().unwrap();

        assert!(breakpoint.is_enabled());
        assert_eq!(breakpoint.saved_byte(), Some(0x55));
        assert_eq!(read_byte(&memory, CODE).unwrap(), INT3);
        // neighbouring bytes survive the word-sized write
        assert_eq!(memory.byte(CODE + 1), 0x48);
        assert_eq!(memory.byte(CODE + 7), 0xc3);
    }

    #[test]
    fn test_enable_then_disable_restores_word()
    {
        let memory = memory_with_code();
        let before = memory.read_word(CODE).unwrap();
        let mut breakpoint = Breakpoint::new(memory.clone(), CODE);

        breakpoint.enable().unwrap();
        breakpoint.disable().unwrap();

        assert!(!breakpoint.is_enabled());
        assert_eq!(memory.read_word(CODE).unwrap(), before);
    }

    #[test]
    fn test_double_enable_keeps_original_byte()
    {
        let memory = memory_with_code();
        let mut breakpoint = Breakpoint::new(memory.clone(), CODE);

        breakpoint.enable().unwrap();
        let writes = memory.writes();
        breakpoint.enable().unwrap();

        assert_eq!(memory.writes(), writes);
        assert_eq!(breakpoint.saved_byte(), Some(0x55));
        breakpoint.disable().unwrap();
        assert_eq!(memory.byte(CODE), 0x55);
    }

    #[test]
    fn test_disable_when_disabled_is_noop()
    {
        let memory = memory_with_code();
        let mut breakpoint = Breakpoint::new(memory.clone(), CODE);
        breakpoint.disable().unwrap();
        assert_eq!(memory.writes(), 0);
        assert_eq!(memory.reads(), 0);
    }

    #[test]
    fn test_drop_restores_enabled_breakpoint()
    {
        let memory = memory_with_code();
        {
            let mut breakpoint = Breakpoint::new(memory.clone(), CODE);
            breakpoint.enable().unwrap();
            assert_eq!(memory.byte(CODE), INT3);
        }
        assert_eq!(memory.byte(CODE), 0x55);
    }

    #[test]
    fn test_abandoned_breakpoint_drop_skips_memory()
    {
        let memory = memory_with_code();
        let mut breakpoint = Breakpoint::new(memory.clone(), CODE);
        breakpoint.enable().unwrap();
        let writes = memory.writes();
        breakpoint.abandon();
        drop(breakpoint);
        assert_eq!(memory.writes(), writes);
    }

    #[test]
    fn test_failed_enable_leaves_breakpoint_disabled()
    {
        let memory = memory_with_code();
        memory.fail_writes(true);
        let mut breakpoint = Breakpoint::new(memory.clone(), CODE);

        assert!(breakpoint.enable().is_err());
        assert!(!breakpoint.is_enabled());
        assert_eq!(breakpoint.saved_byte(), None);
        assert_eq!(memory.byte(CODE), 0x55);
    }

    #[test]
    fn test_failed_disable_leaves_breakpoint_enabled()
    {
        let memory = memory_with_code();
        let mut breakpoint = Breakpoint::new(memory.clone(), CODE);
        breakpoint.enable().unwrap();

        memory.fail_writes(true);
        assert!(breakpoint.disable().is_err());
        assert!(breakpoint.is_enabled());
        assert_eq!(memory.byte(CODE), INT3);

        memory.fail_writes(false);
        breakpoint.disable().unwrap();
        assert_eq!(memory.byte(CODE), 0x55);
    }

    #[test]
    fn test_unmapped_address_fails()
    {
        let memory = FakeMemory::default();
        let mut breakpoint = Breakpoint::new(memory, Address::new(0xdead_0000));
        assert!(breakpoint.enable().is_err());
        assert!(!breakpoint.is_enabled());
    }

    #[test]
    fn test_table_rejects_duplicate_address()
    {
        let memory = memory_with_code();
        let mut table = BreakpointTable::new();
        let mut first = Breakpoint::new(memory.clone(), CODE);
        first.enable().unwrap();
        table.insert(first).unwrap();

        let second = Breakpoint::new(memory.clone(), CODE);
        assert!(matches!(table.insert(second), Err(DebuggerError::DuplicateBreakpoint(addr)) if addr == CODE));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(CODE).unwrap().saved_byte(), Some(0x55));
        assert_eq!(memory.byte(CODE), INT3);
    }

    #[test]
    fn test_table_remove_and_lookup()
    {
        let memory = memory_with_code();
        let mut table = BreakpointTable::new();
        table.insert(Breakpoint::new(memory.clone(), CODE + 4)).unwrap();
        table.insert(Breakpoint::new(memory.clone(), CODE)).unwrap();
        table.require_mut(CODE).unwrap().enable().unwrap();

        assert!(table.is_enabled_at(CODE));
        assert!(!table.is_enabled_at(CODE + 4));
        assert!(!table.is_enabled_at(CODE + 2));

        let listed: Vec<Address> = table.list().iter().map(|info| info.address).collect();
        assert_eq!(listed, vec![CODE, CODE + 4]);

        let removed = table.remove(CODE).unwrap();
        drop(removed);
        assert_eq!(memory.byte(CODE), 0x55);
        assert!(matches!(table.remove(CODE), Err(DebuggerError::NoBreakpoint(_))));
        assert!(matches!(table.require_mut(CODE), Err(DebuggerError::NoBreakpoint(_))));
    }
}
