//! Build script for tether-core
//!
//! This script checks system requirements before compilation:
//! - Minimum Rust version (`std::mem::offset_of!` = Rust 1.77.0+)
//! - Target operating system (ptrace and seccomp are Linux only)
//!
//! ## Requirements
//!
//! - **Rust**: 1.77.0 or newer
//! - **Linux**: 3.5+ for `PR_SET_NO_NEW_PRIVS` and `SECCOMP_MODE_FILTER`,
//!   3.8+ for `PTRACE_O_EXITKILL`

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    // Check minimum Rust version
    if let Ok(rustc_version) = rustc_version::version() {
        let min_rust_version = rustc_version::Version::new(1, 77, 0);

        if rustc_version < min_rust_version {
            panic!(
                "tether-core requires Rust {} or newer, found {}",
                min_rust_version, rustc_version
            );
        }
    } else {
        // If we can't get version (e.g., in some build environments), just warn
        println!("cargo:warning=could not verify Rust version");
    }

    // The build script runs on the host; the target comes from cargo.
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os != "linux" {
        println!(
            "cargo:warning=tether-core targets Linux; on {} only filter assembly and evaluation are available",
            if target_os.is_empty() { "this target" } else { target_os.as_str() }
        );
    }
}
