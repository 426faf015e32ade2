//! # ptrace Word Tracer
//!
//! [`WordTracer`] implemented with `ptrace(2)`.
//!
//! The PEEK requests return the data word as the syscall result, so a word
//! holding `-1` cannot be told apart from a failure by the return value
//! alone. As documented in the man page, `errno` is cleared before the call
//! and checked afterwards.
//!
//! ## References
//!
//! - [ptrace(2) man page](https://man7.org/linux/man-pages/man2/ptrace.2.html)

use std::ptr;

use libc::c_void;
use tracing::{debug, trace};

use crate::error::{TetherError, TetherResult};
use crate::tracer::WordTracer;
use crate::types::{Address, ProcessId, Word};

/// `ptrace(2)`-backed word tracer
///
/// Stateless: the calling thread must be the tracer of every PID passed in.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ptrace;

impl Ptrace
{
    /// Create a new tracer.
    pub const fn new() -> Self
    {
        Ptrace
    }

    fn peek(request: PtraceRequest, operation: &'static str, pid: ProcessId, addr: *mut c_void) -> TetherResult<Word>
    {
        let value = unsafe {
            *libc::__errno_location() = 0;
            libc::ptrace(request, pid.as_raw(), addr, ptr::null_mut::<c_void>())
        };
        let errno = unsafe { *libc::__errno_location() };
        if errno != 0 {
            let err = TetherError::TracerFault {
                operation,
                pid: pid.0,
                source: std::io::Error::from_raw_os_error(errno),
            };
            debug!("{err}");
            return Err(err);
        }
        #[allow(clippy::cast_sign_loss)]
        Ok(value as Word)
    }

    fn poke(
        request: PtraceRequest,
        operation: &'static str,
        pid: ProcessId,
        addr: *mut c_void,
        value: Word,
    ) -> TetherResult<()>
    {
        let status = unsafe { libc::ptrace(request, pid.as_raw(), addr, value as usize as *mut c_void) };
        if status < 0 {
            let err = TetherError::tracer_fault(operation, pid.0);
            debug!("{err}");
            return Err(err);
        }
        Ok(())
    }
}

// glibc declares the request as `c_uint`, musl as `c_int`.
#[cfg(target_env = "gnu")]
type PtraceRequest = libc::c_uint;
#[cfg(not(target_env = "gnu"))]
type PtraceRequest = libc::c_int;

impl WordTracer for Ptrace
{
    fn peek_user(&self, pid: ProcessId, offset: usize) -> TetherResult<Word>
    {
        let value = Self::peek(libc::PTRACE_PEEKUSER, "PEEKUSER", pid, offset as *mut c_void)?;
        trace!(pid = pid.0, offset, value, "peek user");
        Ok(value)
    }

    fn poke_user(&self, pid: ProcessId, offset: usize, value: Word) -> TetherResult<()>
    {
        trace!(pid = pid.0, offset, value, "poke user");
        Self::poke(libc::PTRACE_POKEUSER, "POKEUSER", pid, offset as *mut c_void, value)
    }

    fn peek_data(&self, pid: ProcessId, addr: Address) -> TetherResult<Word>
    {
        let value = Self::peek(libc::PTRACE_PEEKDATA, "PEEKDATA", pid, addr.as_ptr())?;
        trace!(pid = pid.0, %addr, value, "peek data");
        Ok(value)
    }

    fn poke_data(&self, pid: ProcessId, addr: Address, value: Word) -> TetherResult<()>
    {
        trace!(pid = pid.0, %addr, value, "poke data");
        Self::poke(libc::PTRACE_POKEDATA, "POKEDATA", pid, addr.as_ptr(), value)
    }
}
