//! # Types
//!
//! Plain data types shared by the accessor and the filter synthesizer.
//!
//! These keep raw integers apart: a process id, an address in the traced
//! process, and a syscall argument slot are all numbers to the kernel, but
//! mixing them up is always a bug.

pub mod address;
pub mod process;
pub mod sysarg;

pub use address::{Address, Word, WORD_SIZE};
pub use process::ProcessId;
pub use sysarg::SysArg;
