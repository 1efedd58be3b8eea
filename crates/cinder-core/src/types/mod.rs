//! # Types
//!
//! Platform-agnostic types used throughout the debugger.
//!
//! These types keep the breakpoint and session logic independent of the
//! ptrace backend, so the same code runs against a real process or a
//! simulated one in tests.

pub mod address;
pub mod process;
pub mod registers;
pub mod symbols;

// Re-export all public types
pub use address::Address;
pub use process::{ProcessId, SessionState, StopEvent, TrapKind};
pub use registers::{
    register_by_dwarf, register_by_name, RegisterDescriptor, RegisterFile, RegisterId, RegisterValue, REGISTER_COUNT,
    REGISTER_DESCRIPTORS,
};
pub use symbols::{FunctionDescriptor, SymbolLanguage, SymbolName};
