//! Build script for cinder-core
//!
//! This script checks system requirements before compilation:
//! - Minimum Rust version (Edition 2021 = Rust 1.56.0+)
//! - Target support for the ptrace backend
//!
//! ## Requirements
//!
//! - **Rust**: Edition 2021 (Rust 1.56.0 or newer)
//! - **Linux x86-64**: required for the ptrace backend. Other targets still
//!   build the portable layers (register table, breakpoints, session logic,
//!   symbol resolution) but cannot trace a real process.

fn main()
{
    // Edition 2021 requires Rust 1.56.0
    match rustc_version::version() {
        Ok(rustc_version) => {
            let min_rust_version = rustc_version::Version::new(1, 56, 0);

            if rustc_version < min_rust_version {
                panic!(
                    "cinder-core requires Rust {} or newer (Edition 2021), found {}",
                    min_rust_version, rustc_version
                );
            }
        }
        // Some build environments hide rustc; do not fail the build for it
        Err(_) => println!("cargo:warning=could not verify Rust version"),
    }

    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_arch = std::env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();

    if target_os != "linux" || target_arch != "x86_64" {
        println!(
            "cargo:warning=cinder-core: ptrace backend disabled for {target_arch}-{target_os}; only linux x86_64 can trace processes"
        );
    }
}
