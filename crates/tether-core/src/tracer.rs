//! # Word Tracer Trait
//!
//! The four word-sized primitives the debugging interface offers.
//!
//! Everything the [`TraceeAccessor`](crate::accessor::TraceeAccessor) does is
//! built from these calls. Keeping them behind a trait lets the byte and
//! string logic be exercised against an in-memory process in tests, while
//! [`Ptrace`](crate::platform::linux::Ptrace) forwards them to `ptrace(2)`.
//!
//! ## Contract
//!
//! - Register offsets are byte offsets into the USER area (`struct user`).
//! - Memory addresses are addresses in the traced process; they do not have
//!   to be word aligned, the kernel transfers the word starting there.
//! - The process must be in a ptrace-stop owned by the caller.

use crate::error::TetherResult;
use crate::types::{Address, ProcessId, Word};

/// Word-granular access to a stopped process
///
/// ## Thread Safety
///
/// Implementations perform no locking. Calls against the same process must
/// be serialized by the caller; the kernel only accepts ptrace requests from
/// the thread that is the tracer anyway.
pub trait WordTracer
{
    /// Read one word from the saved register area
    ///
    /// - **Linux**: `ptrace(PTRACE_PEEKUSER, pid, offset, 0)`
    fn peek_user(&self, pid: ProcessId, offset: usize) -> TetherResult<Word>;

    /// Write one word into the saved register area
    ///
    /// The new value is observed by the traced process when it resumes.
    ///
    /// - **Linux**: `ptrace(PTRACE_POKEUSER, pid, offset, value)`
    fn poke_user(&self, pid: ProcessId, offset: usize, value: Word) -> TetherResult<()>;

    /// Read one word of memory
    ///
    /// - **Linux**: `ptrace(PTRACE_PEEKDATA, pid, addr, 0)`
    fn peek_data(&self, pid: ProcessId, addr: Address) -> TetherResult<Word>;

    /// Write one word of memory
    ///
    /// - **Linux**: `ptrace(PTRACE_POKEDATA, pid, addr, value)`
    fn poke_data(&self, pid: ProcessId, addr: Address, value: Word) -> TetherResult<()>;
}

impl<T: WordTracer + ?Sized> WordTracer for &T
{
    fn peek_user(&self, pid: ProcessId, offset: usize) -> TetherResult<Word>
    {
        (**self).peek_user(pid, offset)
    }

    fn poke_user(&self, pid: ProcessId, offset: usize, value: Word) -> TetherResult<()>
    {
        (**self).poke_user(pid, offset, value)
    }

    fn peek_data(&self, pid: ProcessId, addr: Address) -> TetherResult<Word>
    {
        (**self).peek_data(pid, addr)
    }

    fn poke_data(&self, pid: ProcessId, addr: Address, value: Word) -> TetherResult<()>
    {
        (**self).poke_data(pid, addr, value)
    }
}
