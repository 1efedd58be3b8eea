//! # Register Access Layer
//!
//! Single-register reads and writes on top of whole-file snapshots.
//!
//! The kernel only exposes the general-purpose set as one block
//! (`PTRACE_GETREGS` / `PTRACE_SETREGS`), so:
//!
//! - `get` takes one snapshot and indexes it by the descriptor's table slot
//! - `set` is always read-modify-write of the whole file
//!
//! Any failing privileged call is returned as-is; nothing is retried.

use crate::error::Result;
use crate::types::{register_by_dwarf, RegisterFile, RegisterId};

/// Whole register file access for a stopped tracee
pub trait RegisterAccess
{
    /// Read the complete register file in one request.
    ///
    /// # Errors
    ///
    /// OS failure of the underlying request.
    fn read_registers(&self) -> Result<RegisterFile>;

    /// Write the complete register file in one request.
    ///
    /// # Errors
    ///
    /// OS failure of the underlying request. The kernel validates segment
    /// selectors and rejects invalid ones.
    fn write_registers(&mut self, registers: &RegisterFile) -> Result<()>;
}

/// Read one register.
///
/// # Errors
///
/// OS failure of the snapshot read.
pub fn get_register_value<R: RegisterAccess + ?Sized>(target: &R, id: RegisterId) -> Result<u64>
{
    Ok(target.read_registers()?.get(id))
}

/// Write one register (read-modify-write of the whole file).
///
/// # Errors
///
/// OS failure of the snapshot read or write. When the write fails the
/// tracee's registers are unchanged.
pub fn set_register_value<R: RegisterAccess + ?Sized>(target: &mut R, id: RegisterId, value: u64) -> Result<()>
{
    let mut registers = target.read_registers()?;
    registers.set(id, value);
    target.write_registers(&registers)
}

/// Read the register with the given DWARF number.
///
/// # Errors
///
/// `UnknownDwarfRegister` for unknown or unmapped numbers, otherwise OS failure.
pub fn get_register_value_from_dwarf<R: RegisterAccess + ?Sized>(target: &R, number: u16) -> Result<u64>
{
    let id = register_by_dwarf(number)?;
    get_register_value(target, id)
}
