//! CPU register identifiers, the register descriptor table, and register
//! file snapshots.
//!
//! The table is laid out in the same order as the kernel's
//! `user_regs_struct` on x86-64, so a descriptor's position in
//! [`REGISTER_DESCRIPTORS`] is also its slot in a [`RegisterFile`].
//!
//! DWARF register numbers follow the System V x86-64 psABI.
//!
//! See: [System V AMD64 psABI, figure 3.36](https://gitlab.com/x86-psABIs/x86-64-ABI)

use std::fmt;
use std::str::FromStr;

use crate::error::{DebuggerError, Result};

/// Number of registers in the x86-64 user register file.
pub const REGISTER_COUNT: usize = 27;

/// Identifier for one x86-64 user register
///
/// The variants cover the general-purpose registers, the instruction pointer,
/// the flags register, the segment registers and their bases, and the raw
/// `orig_rax` slot the kernel uses to remember the syscall number.
///
/// ## Example
///
/// ```rust
/// use cinder_core::types::RegisterId;
///
/// let rsp: RegisterId = "rsp".parse().unwrap();
/// assert_eq!(rsp, RegisterId::Rsp);
/// assert_eq!(rsp.dwarf_number(), Some(7));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterId
{
    /// RAX - accumulator, return value
    Rax,
    /// RBX - callee-saved
    Rbx,
    /// RCX - fourth argument
    Rcx,
    /// RDX - third argument
    Rdx,
    /// RDI - first argument
    Rdi,
    /// RSI - second argument
    Rsi,
    /// RBP - frame pointer
    Rbp,
    /// RSP - stack pointer
    Rsp,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    /// RIP - instruction pointer
    Rip,
    /// RFLAGS - shown as `eflags`
    Rflags,
    Cs,
    /// Syscall number saved by the kernel on syscall entry
    OrigRax,
    FsBase,
    GsBase,
    Fs,
    Gs,
    Ss,
    Ds,
    Es,
}

/// Static description of one register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDescriptor
{
    /// Register this entry describes
    pub id: RegisterId,
    /// DWARF register number, `None` when the psABI defines none
    pub dwarf: Option<u16>,
    /// Display name used by the command surface
    pub name: &'static str,
}

const fn descriptor(id: RegisterId, dwarf: Option<u16>, name: &'static str) -> RegisterDescriptor
{
    RegisterDescriptor { id, dwarf, name }
}

/// Process-wide register table, in `user_regs_struct` order.
pub static REGISTER_DESCRIPTORS: [RegisterDescriptor; REGISTER_COUNT] = [
    descriptor(RegisterId::R15, Some(15), "r15"),
    descriptor(RegisterId::R14, Some(14), "r14"),
    descriptor(RegisterId::R13, Some(13), "r13"),
    descriptor(RegisterId::R12, Some(12), "r12"),
    descriptor(RegisterId::Rbp, Some(6), "rbp"),
    descriptor(RegisterId::Rbx, Some(3), "rbx"),
    descriptor(RegisterId::R11, Some(11), "r11"),
    descriptor(RegisterId::R10, Some(10), "r10"),
    descriptor(RegisterId::R9, Some(9), "r9"),
    descriptor(RegisterId::R8, Some(8), "r8"),
    descriptor(RegisterId::Rax, Some(0), "rax"),
    descriptor(RegisterId::Rcx, Some(2), "rcx"),
    descriptor(RegisterId::Rdx, Some(1), "rdx"),
    descriptor(RegisterId::Rsi, Some(4), "rsi"),
    descriptor(RegisterId::Rdi, Some(5), "rdi"),
    descriptor(RegisterId::OrigRax, None, "orig_rax"),
    descriptor(RegisterId::Rip, None, "rip"),
    descriptor(RegisterId::Cs, Some(51), "cs"),
    descriptor(RegisterId::Rflags, Some(49), "eflags"),
    descriptor(RegisterId::Rsp, Some(7), "rsp"),
    descriptor(RegisterId::Ss, Some(52), "ss"),
    descriptor(RegisterId::FsBase, Some(58), "fs_base"),
    descriptor(RegisterId::GsBase, Some(59), "gs_base"),
    descriptor(RegisterId::Ds, Some(53), "ds"),
    descriptor(RegisterId::Es, Some(50), "es"),
    descriptor(RegisterId::Fs, Some(54), "fs"),
    descriptor(RegisterId::Gs, Some(55), "gs"),
];

impl RegisterId
{
    /// Slot of this register in [`REGISTER_DESCRIPTORS`] and in a [`RegisterFile`].
    #[must_use]
    pub const fn index(self) -> usize
    {
        match self {
            RegisterId::R15 => 0,
            RegisterId::R14 => 1,
            RegisterId::R13 => 2,
            RegisterId::R12 => 3,
            RegisterId::Rbp => 4,
            RegisterId::Rbx => 5,
            RegisterId::R11 => 6,
            RegisterId::R10 => 7,
            RegisterId::R9 => 8,
            RegisterId::R8 => 9,
            RegisterId::Rax => 10,
            RegisterId::Rcx => 11,
            RegisterId::Rdx => 12,
            RegisterId::Rsi => 13,
            RegisterId::Rdi => 14,
            RegisterId::OrigRax => 15,
            RegisterId::Rip => 16,
            RegisterId::Cs => 17,
            RegisterId::Rflags => 18,
            RegisterId::Rsp => 19,
            RegisterId::Ss => 20,
            RegisterId::FsBase => 21,
            RegisterId::GsBase => 22,
            RegisterId::Ds => 23,
            RegisterId::Es => 24,
            RegisterId::Fs => 25,
            RegisterId::Gs => 26,
        }
    }

    /// Table entry for this register.
    #[must_use]
    pub fn descriptor(self) -> &'static RegisterDescriptor
    {
        &REGISTER_DESCRIPTORS[self.index()]
    }

    /// Display name (`"rax"`, `"eflags"`, ...).
    #[must_use]
    pub fn name(self) -> &'static str
    {
        self.descriptor().name
    }

    /// DWARF register number, if the psABI assigns one.
    #[must_use]
    pub fn dwarf_number(self) -> Option<u16>
    {
        self.descriptor().dwarf
    }

    /// Look a register up by display name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self>
    {
        REGISTER_DESCRIPTORS
            .iter()
            .find(|descriptor| descriptor.name == name)
            .map(|descriptor| descriptor.id)
    }

    /// Look a register up by DWARF number. Unmapped registers never match.
    #[must_use]
    pub fn from_dwarf(number: u16) -> Option<Self>
    {
        REGISTER_DESCRIPTORS
            .iter()
            .find(|descriptor| descriptor.dwarf == Some(number))
            .map(|descriptor| descriptor.id)
    }

    /// Iterate every register in table order.
    pub fn all() -> impl Iterator<Item = RegisterId>
    {
        REGISTER_DESCRIPTORS.iter().map(|descriptor| descriptor.id)
    }
}

/// Resolve a register name, reporting a miss as [`DebuggerError::UnknownRegister`].
///
/// # Errors
///
/// `UnknownRegister` if no register has this name.
pub fn register_by_name(name: &str) -> Result<RegisterId>
{
    RegisterId::from_name(name).ok_or_else(|| DebuggerError::UnknownRegister(name.to_string()))
}

/// Resolve a DWARF register number, reporting a miss as
/// [`DebuggerError::UnknownDwarfRegister`].
///
/// # Errors
///
/// `UnknownDwarfRegister` if the number is unknown or belongs to no mapped register.
pub fn register_by_dwarf(number: u16) -> Result<RegisterId>
{
    RegisterId::from_dwarf(number).ok_or(DebuggerError::UnknownDwarfRegister(number))
}

impl fmt::Display for RegisterId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.name())
    }
}

impl FromStr for RegisterId
{
    type Err = DebuggerError;

    fn from_str(s: &str) -> Result<Self>
    {
        register_by_name(s)
    }
}

/// Snapshot of the complete user register file
///
/// Register reads and writes always move the whole file: the kernel offers no
/// per-register request for the general-purpose set, so a single `set` is a
/// read-modify-write of this snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterFile
{
    values: [u64; REGISTER_COUNT],
}

impl RegisterFile
{
    /// Build a snapshot from raw slots in table order.
    #[must_use]
    pub const fn from_slots(values: [u64; REGISTER_COUNT]) -> Self
    {
        Self { values }
    }

    /// Raw slots in table order.
    #[must_use]
    pub const fn slots(&self) -> &[u64; REGISTER_COUNT]
    {
        &self.values
    }

    #[must_use]
    pub const fn get(&self, id: RegisterId) -> u64
    {
        self.values[id.index()]
    }

    pub fn set(&mut self, id: RegisterId, value: u64)
    {
        self.values[id.index()] = value;
    }

    /// Every register paired with its value, in table order.
    pub fn iter(&self) -> impl Iterator<Item = RegisterValue> + '_
    {
        REGISTER_DESCRIPTORS
            .iter()
            .zip(self.values.iter())
            .map(|(descriptor, value)| RegisterValue {
                id: descriptor.id,
                name: descriptor.name,
                value: *value,
            })
    }
}

/// One line of a register dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterValue
{
    pub id: RegisterId,
    pub name: &'static str,
    pub value: u64,
}

impl fmt::Display for RegisterValue
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{:<8} 0x{:016x}", self.name, self.value)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_table_positions_match_index()
    {
        for (position, descriptor) in REGISTER_DESCRIPTORS.iter().enumerate() {
            assert_eq!(descriptor.id.index(), position, "{} is out of place", descriptor.name);
        }
    }

    #[test]
    fn test_names_are_unique()
    {
        for descriptor in &REGISTER_DESCRIPTORS {
            let count = REGISTER_DESCRIPTORS
                .iter()
                .filter(|other| other.name == descriptor.name)
                .count();
            assert_eq!(count, 1, "duplicate name {}", descriptor.name);
        }
    }

    #[test]
    fn test_dwarf_numbers_are_unique()
    {
        for descriptor in REGISTER_DESCRIPTORS.iter().filter(|d| d.dwarf.is_some()) {
            assert_eq!(RegisterId::from_dwarf(descriptor.dwarf.unwrap()), Some(descriptor.id));
        }
    }

    #[test]
    fn test_unmapped_registers()
    {
        assert_eq!(RegisterId::Rip.dwarf_number(), None);
        assert_eq!(RegisterId::OrigRax.dwarf_number(), None);
        assert!(matches!(register_by_dwarf(16), Err(DebuggerError::UnknownDwarfRegister(16))));
    }

    #[test]
    fn test_flags_register_name()
    {
        assert_eq!(RegisterId::Rflags.name(), "eflags");
        assert_eq!(RegisterId::from_name("eflags"), Some(RegisterId::Rflags));
        assert_eq!(RegisterId::from_name("rflags"), None);
    }

    #[test]
    fn test_register_file_round_trip()
    {
        let mut file = RegisterFile::default();
        for (offset, id) in RegisterId::all().enumerate() {
            file.set(id, 0x1000 + offset as u64);
        }
        for (offset, id) in RegisterId::all().enumerate() {
            assert_eq!(file.get(id), 0x1000 + offset as u64);
        }
        assert_eq!(file.iter().count(), REGISTER_COUNT);
    }
}
