//! # Memory Access Layer
//!
//! Word-granular access to the debuggee's address space.
//!
//! ptrace moves memory one machine word (8 bytes) at a time, so every access
//! here is a whole word even when only one byte matters. Byte helpers do the
//! read-merge-write so that neighbouring bytes survive.
//!
//! Nothing is cached: the target may change its own memory between any two
//! calls, and read-after-write consistency only holds while it is stopped.

use crate::error::Result;
use crate::types::Address;

/// Size of one transferred word in bytes.
pub const WORD_SIZE: u64 = 8;

/// Raw word access to a traced process
///
/// Implementations are cheap handles (the Linux one is just a pid) so a
/// breakpoint can keep one for its whole lifetime, including its `Drop`.
pub trait WordMemory
{
    /// Read the 8-byte little-endian word starting at `address`.
    ///
    /// # Errors
    ///
    /// Fails when the address is not mapped or the tracee is gone.
    fn read_word(&self, address: Address) -> Result<u64>;

    /// Write the 8-byte word starting at `address`.
    ///
    /// # Errors
    ///
    /// Fails when the address is not mapped or the tracee is gone.
    fn write_word(&self, address: Address, word: u64) -> Result<()>;
}

/// Low byte of the word at `address`.
///
/// # Errors
///
/// Propagates the word read failure.
pub fn read_byte<M: WordMemory + ?Sized>(memory: &M, address: Address) -> Result<u8>
{
    Ok(low_byte(memory.read_word(address)?))
}

/// Replace only the byte at `address`, preserving the other seven bytes of the
/// surrounding word. Returns the byte that was there before.
///
/// # Errors
///
/// Propagates the word read or write failure. If the write fails, memory is
/// unchanged.
pub fn write_byte<M: WordMemory + ?Sized>(memory: &M, address: Address, byte: u8) -> Result<u8>
{
    let word = memory.read_word(address)?;
    memory.write_word(address, with_low_byte(word, byte))?;
    Ok(low_byte(word))
}

/// Lowest-addressed byte of a little-endian word.
#[must_use]
pub const fn low_byte(word: u64) -> u8
{
    (word & 0xff) as u8
}

/// `word` with its lowest-addressed byte replaced.
#[must_use]
pub const fn with_low_byte(word: u64, byte: u8) -> u64
{
    (word & !0xff) | byte as u64
}
