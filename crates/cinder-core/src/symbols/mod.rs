//! # Symbols
//!
//! Mapping code addresses back to the functions that contain them.
//!
//! The session only depends on the [`SymbolResolver`] trait, so it works with
//! no debug info at all. [`DwarfResolver`] is the real implementation: it
//! reads the debuggee's ELF file and walks its DWARF `.debug_info`.
//!
//! ## Addresses
//!
//! DWARF talks about file addresses. A position-independent executable is
//! loaded at a random base (or a fixed one with ASLR off), so every lookup
//! subtracts the slide between the runtime load address and the lowest
//! segment address in the file.

mod demangle;
mod image;
mod resolver;

pub use resolver::DwarfResolver;

use crate::types::{Address, FunctionDescriptor};

/// Address to function lookup
///
/// A miss is `None`; it is never an error for the session.
pub trait SymbolResolver
{
    /// Function whose code range contains `address`.
    fn resolve(&self, address: Address) -> Option<FunctionDescriptor>;
}
