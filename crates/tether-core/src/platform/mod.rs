//! # Platform-Specific Implementations
//!
//! The debugging and filtering primitives wrapped by this crate only exist
//! on Linux:
//!
//! - **Linux**: `ptrace(2)` for register/memory access, `prctl(2)` with
//!   `PR_SET_SECCOMP` for filter installation
//!   - See: [ptrace(2) man page](https://man7.org/linux/man-pages/man2/ptrace.2.html)
//!   - See: [seccomp(2) man page](https://man7.org/linux/man-pages/man2/seccomp.2.html)
//!
//! Register layouts are plain data and compile everywhere, so filter
//! assembly and layout lookups can be exercised on any host.

pub mod linux;
