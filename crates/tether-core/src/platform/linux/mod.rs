//! # Linux Implementation
//!
//! - **registers**: USER area offsets per instruction set
//! - **ptrace**: the [`WordTracer`](crate::tracer::WordTracer) backed by `ptrace(2)`
//! - **launch**: fork/exec of a tracee with a filter installed, and the
//!   `waitpid()` event loop primitives

pub mod registers;

#[cfg(target_os = "linux")]
pub mod launch;
#[cfg(target_os = "linux")]
pub mod ptrace;

#[cfg(target_os = "linux")]
pub use ptrace::Ptrace;
pub use registers::RegisterLayout;
