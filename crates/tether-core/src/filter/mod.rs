//! # Syscall Filter Synthesis
//!
//! Builds seccomp programs that send selected syscalls to the supervisor.
//!
//! - **table**: the per-architecture tables a program is built from
//! - **bpf**: instruction encoding and the growable program
//! - **assembler**: table → program, with section length checks
//! - **install**: privilege restriction and `PR_SET_SECCOMP`, including
//!   stacked extension filters
//! - **eval**: a userspace interpreter for inspecting verdicts
//!
//! ## Example
//!
//! ```rust
//! use tether_core::filter::{assemble, evaluate, ArchFilter, AuditArch, FilteredSyscall, SeccompData, Verdict};
//!
//! let syscalls = [FilteredSyscall::traced(59, 1), FilteredSyscall::END];
//! let filters = [ArchFilter::new(AuditArch::X86_64, &syscalls), ArchFilter::END];
//! let program = assemble(&filters)?;
//!
//! let execve = SeccompData::new(AuditArch::X86_64, 59);
//! assert_eq!(evaluate(&program, &execve)?, Verdict::Trace(1));
//! # Ok::<(), tether_core::error::TetherError>(())
//! ```

pub mod assembler;
pub mod bpf;
pub mod eval;
pub mod install;
pub mod table;

pub use assembler::{assemble, FilterAssembler};
pub use bpf::{BpfProgram, SockFilter};
pub use eval::{combine, evaluate, SeccompData, Verdict};
#[cfg(target_os = "linux")]
pub use install::SeccompInstaller;
pub use install::{
    enable_syscall_filtering, install_prepared, install_program, prepare_syscall_filtering, set_seccomp_filters,
    FilterInstaller,
};
pub use table::{sections, ArchFilter, AuditArch, FilteredSyscall};
