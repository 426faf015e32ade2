//! # Error Types
//!
//! General error handling for the accessor and the filter synthesizer.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use std::collections::TryReserveError;

use thiserror::Error;

/// Main error type for tether operations
///
/// Every operation in this crate returns one of these instead of aborting.
/// Whether a failure ends the traced session is up to the caller.
///
/// ## Error Categories
///
/// 1. **Caller defects**: InvalidSlot, FilterTooLarge (length invariant mismatch)
/// 2. **Tracer errors**: TracerFault
/// 3. **Arithmetic errors**: AddressOverflow
/// 4. **Resource errors**: OutOfMemory
/// 5. **Encoding errors**: FilterTooLarge, InvalidProgram
/// 6. **Host refusals**: InstallRejected, UnsupportedArchitecture
/// 7. **I/O errors**: Io (process launch and wait)
#[derive(Error, Debug)]
pub enum TetherError
{
    /// The syscall argument slot index is outside the valid enumeration
    ///
    /// This is a programming error in the caller. It is detected before any
    /// request is made to the kernel.
    #[error("Invalid syscall argument slot: {0}")]
    InvalidSlot(usize),

    /// The debugging interface reported a failure
    ///
    /// This happens when:
    /// - The traced process has exited
    /// - The traced process is not in a ptrace-stop
    /// - The supervisor is not the tracer of this process
    /// - The address is not mapped in the traced process
    ///
    /// After this error the caller should not trust partial results.
    #[error("ptrace {operation} failed for PID {pid}: {source}")]
    TracerFault
    {
        /// The ptrace request that failed (e.g. `PEEKUSER`)
        operation: &'static str,
        /// The traced process
        pid: u32,
        /// The OS error reported by the kernel
        #[source]
        source: std::io::Error,
    },

    /// Stack pointer arithmetic would wrap around the address space
    #[error("Stack pointer 0x{stack_pointer:x} cannot be moved by {delta} bytes")]
    AddressOverflow
    {
        /// Stack pointer value before the adjustment
        stack_pointer: u64,
        /// Requested adjustment (positive allocates)
        delta: i64,
    },

    /// Growing the filter program failed
    #[error("Out of memory while building filter program: {0}")]
    OutOfMemory(#[from] TryReserveError),

    /// A value does not fit the BPF encoding, or an emitted section does
    /// not have the length its guard jumps over
    ///
    /// The second case is an internal consistency failure, not a policy
    /// error: the guard's skip distance would land in the wrong place.
    #[error("Filter too large: {0}")]
    FilterTooLarge(String),

    /// The host refused privilege restriction or filter installation
    ///
    /// Common causes:
    /// - The kernel was built without `CONFIG_SECCOMP_FILTER`
    /// - An existing filter denies `prctl`
    /// - The program was rejected by the kernel BPF checker
    #[error("{operation} rejected: {source}")]
    InstallRejected
    {
        /// The prctl option that failed
        operation: &'static str,
        /// The OS error reported by the kernel
        #[source]
        source: std::io::Error,
    },

    /// The program contains an instruction the evaluator cannot run or a
    /// jump that leaves the program
    #[error("Invalid filter program: {0}")]
    InvalidProgram(String),

    /// No register layout or audit architecture exists for this target
    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(String),

    /// I/O error (process launch, wait, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TetherError
{
    /// Build a `TracerFault` from the current `errno`.
    pub(crate) fn tracer_fault(operation: &'static str, pid: u32) -> Self
    {
        TetherError::TracerFault {
            operation,
            pid,
            source: std::io::Error::last_os_error(),
        }
    }

    /// Whether the error indicates a defect in the calling code rather than
    /// a runtime condition.
    ///
    /// Callers should treat these as fatal and never retry them.
    pub fn is_caller_defect(&self) -> bool
    {
        matches!(self, TetherError::InvalidSlot(_) | TetherError::FilterTooLarge(_))
    }
}

/// Convenience type alias for `Result<T, TetherError>`
///
/// ```rust
/// use tether_core::error::TetherResult;
/// fn foo() -> TetherResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type TetherResult<T> = std::result::Result<T, TetherError>;
