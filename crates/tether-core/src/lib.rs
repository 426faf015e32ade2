//! # tether-core
//!
//! The two low-level halves of a ptrace-based syscall supervisor.
//!
//! - **Remote process accessor** ([`accessor`]): read and write syscall
//!   arguments, move the stack pointer, and copy bytes and C strings in and
//!   out of a stopped process, on top of the word-sized transfers `ptrace`
//!   offers
//! - **Syscall filter synthesizer** ([`filter`]): assemble a seccomp program
//!   from per-architecture syscall tables and install it so only those
//!   syscalls stop in the supervisor
//!
//! Deciding what to do at a stop is the caller's business.
//!
//! ## Platform Support
//!
//! - **Linux**: `ptrace(2)` and `prctl(2)` (x86_64, i386 and 32-bit ARM
//!   register layouts)
//! - Everything else: filter assembly, evaluation, and the accessor logic
//!   against a custom [`WordTracer`] compile and run; there is no tracer
//!   backend
//!
//! ## Why unsafe code is needed
//!
//! `ptrace`, `prctl`, `fork` and `waitpid` are foreign functions. The unsafe
//! calls are confined to `platform::linux` and `filter::install`, behind
//! safe functions returning [`TetherResult`].

#![allow(unsafe_code)] // Required for ptrace, prctl, fork/exec

pub mod accessor;
pub mod error;
pub mod filter;
pub mod platform;
pub mod prelude;
pub mod tracer;
pub mod types;

pub use accessor::{StringRead, TraceeAccessor};
pub use error::{TetherError, TetherResult};
#[cfg(target_os = "linux")]
pub use platform::linux::Ptrace;
pub use platform::linux::RegisterLayout;
pub use tracer::WordTracer;
pub use types::{Address, ProcessId, SysArg, Word, WORD_SIZE};
