//! # Platform-Specific Implementations
//!
//! Backends that implement [`Tracee`](crate::tracee::Tracee) with the native
//! debugging API of one platform.
//!
//! - **Linux x86-64**: `ptrace`
//!   - See: [ptrace(2) man page](https://man7.org/linux/man-pages/man2/ptrace.2.html)
//!
//! Everything above this module is platform-agnostic and is tested against a
//! simulated tracee, so only this module is conditionally compiled.

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub mod linux;
