//! # Remote Process Accessor
//!
//! Byte-, string- and register-level access to a stopped process, built on
//! the word-sized primitives of a [`WordTracer`].
//!
//! The debugging interface only moves whole machine words. Everything here
//! exists to present syscall arguments, stack pointers, byte buffers and C
//! strings on top of that while never modifying memory outside the range
//! the caller asked for.
//!
//! ## Partial words
//!
//! ```text
//!        dest                                dest + len
//!         |<------------- bytes ------------->|
//!   ... [ word 0 ][ word 1 ][ word 2 ][ wo|rd 3 ] ...
//!        poke      poke      poke     peek, overlay, poke
//! ```
//!
//! Only the final word of a range can be partial. On writes it is read
//! first, the supplied bytes are laid over its low-address end, and it is
//! written back. On reads only the requested bytes are copied out of it.
//!
//! ## Failure model
//!
//! Operations are not transactional. If `write_bytes` fails halfway, the
//! words before the failing one have already been written. A `TracerFault`
//! usually means the process is gone or no longer stopped, and nothing read
//! before it should be trusted.

use tracing::trace;

use crate::error::{TetherError, TetherResult};
use crate::platform::linux::registers::RegisterLayout;
use crate::tracer::WordTracer;
use crate::types::{Address, ProcessId, SysArg, Word, WORD_SIZE};

/// Outcome of [`TraceeAccessor::read_cstring`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringRead
{
    /// Bytes written into the destination buffer
    ///
    /// Whole words are copied, so this may include bytes that follow the
    /// terminator in the same word. It never exceeds the buffer length.
    pub copied: usize,
    /// Length of the string including its terminator, or the buffer length
    /// if no terminator was found
    pub length: usize,
    /// Whether a zero byte was found within the buffer length
    pub terminated: bool,
}

impl StringRead
{
    /// Whether the string did not fit: no terminator within the cap.
    pub fn is_truncated(&self) -> bool
    {
        !self.terminated
    }

    /// The string bytes in `buf`, without the terminator.
    pub fn bytes<'b>(&self, buf: &'b [u8]) -> &'b [u8]
    {
        let end = if self.terminated { self.length - 1 } else { self.length };
        &buf[..end]
    }
}

/// Register and memory access to stopped traced processes
///
/// The accessor holds no per-process state. Each call names the process it
/// targets; that process must be in a ptrace-stop owned by the caller for
/// the duration of the call.
///
/// ## Example
///
/// ```rust,no_run
/// use tether_core::accessor::TraceeAccessor;
/// use tether_core::platform::linux::{Ptrace, RegisterLayout};
/// use tether_core::types::{ProcessId, SysArg};
///
/// let accessor = TraceeAccessor::new(Ptrace::new(), RegisterLayout::require_native()?);
/// let pid = ProcessId::from(12345);
///
/// let path_ptr = accessor.read_argument(pid, SysArg::Arg2)?;
/// let mut path = [0u8; 4096];
/// let read = accessor.read_cstring(pid, (path_ptr as u64).into(), &mut path)?;
/// println!("openat({:?})", String::from_utf8_lossy(read.bytes(&path)));
/// # Ok::<(), tether_core::error::TetherError>(())
/// ```
#[derive(Debug, Clone)]
pub struct TraceeAccessor<'a, T: WordTracer>
{
    tracer: T,
    layout: &'a RegisterLayout,
}

impl<'a, T: WordTracer> TraceeAccessor<'a, T>
{
    /// Create an accessor using `layout` to locate registers.
    pub fn new(tracer: T, layout: &'a RegisterLayout) -> Self
    {
        Self { tracer, layout }
    }

    /// The register layout in use.
    pub fn layout(&self) -> &'a RegisterLayout
    {
        self.layout
    }

    /// The underlying word tracer.
    pub fn tracer(&self) -> &T
    {
        &self.tracer
    }

    /// Read the register holding `slot` of the current syscall
    ///
    /// ## Errors
    ///
    /// - `InvalidSlot`: the layout has no offset for `slot` (checked before
    ///   any kernel call)
    /// - `TracerFault`: the peek failed
    pub fn read_argument(&self, pid: ProcessId, slot: SysArg) -> TetherResult<Word>
    {
        let offset = self.layout.offset(slot)?;
        self.tracer.peek_user(pid, offset)
    }

    /// Overwrite the register holding `slot`
    ///
    /// The traced process observes the new value when it resumes.
    pub fn write_argument(&self, pid: ProcessId, slot: SysArg, value: Word) -> TetherResult<()>
    {
        let offset = self.layout.offset(slot)?;
        trace!(pid = pid.0, %slot, value, "write argument");
        self.tracer.poke_user(pid, offset, value)
    }

    /// Read all six syscall arguments, in order.
    pub fn read_arguments(&self, pid: ProcessId) -> TetherResult<[Word; 6]>
    {
        let mut args = [0; 6];
        for (value, slot) in args.iter_mut().zip(SysArg::ARGUMENTS) {
            *value = self.read_argument(pid, slot)?;
        }
        Ok(args)
    }

    /// Current stack pointer.
    pub fn stack_pointer(&self, pid: ProcessId) -> TetherResult<Address>
    {
        let sp = self.tracer.peek_user(pid, self.layout.stack_pointer)?;
        Ok(Address::from(sp as u64))
    }

    /// Move the stack pointer by `delta` bytes and return the new value
    ///
    /// The stack grows toward lower addresses: a positive `delta` allocates
    /// space below the current pointer, a negative one releases it. The
    /// caller then fills the space with [`write_bytes`](Self::write_bytes).
    ///
    /// ## Errors
    ///
    /// - `AddressOverflow`: allocating would reach or pass address zero, or
    ///   releasing would reach the top of the address space. Nothing is
    ///   written in that case.
    /// - `TracerFault`: reading or writing the stack pointer failed
    pub fn grow_stack(&self, pid: ProcessId, delta: isize) -> TetherResult<Address>
    {
        let sp = self.tracer.peek_user(pid, self.layout.stack_pointer)?;
        let new_sp = adjust_stack_pointer(sp, delta).ok_or(TetherError::AddressOverflow {
            stack_pointer: sp as u64,
            delta: delta as i64,
        })?;

        trace!(pid = pid.0, delta, old = sp, new = new_sp, "grow stack");
        self.tracer.poke_user(pid, self.layout.stack_pointer, new_sp)?;
        Ok(Address::from(new_sp as u64))
    }

    /// Copy `bytes` into the traced process at `dest`
    ///
    /// Bytes outside `[dest, dest + bytes.len())` are left untouched: the
    /// trailing partial word, if any, is read back and only its leading
    /// bytes are replaced. Not transactional.
    pub fn write_bytes(&self, pid: ProcessId, dest: Address, bytes: &[u8]) -> TetherResult<()>
    {
        let mut chunks = bytes.chunks_exact(WORD_SIZE);
        let mut index = 0;
        for chunk in &mut chunks {
            self.tracer.poke_data(pid, dest.word(index), word_from_bytes(chunk))?;
            index += 1;
        }

        let trailing = chunks.remainder();
        if trailing.is_empty() {
            return Ok(());
        }

        let last = dest.word(index);
        let mut raw = self.tracer.peek_data(pid, last)?.to_ne_bytes();
        raw[..trailing.len()].copy_from_slice(trailing);
        self.tracer.poke_data(pid, last, Word::from_ne_bytes(raw))
    }

    /// Fill `buf` with memory of the traced process starting at `src`.
    pub fn read_bytes(&self, pid: ProcessId, src: Address, buf: &mut [u8]) -> TetherResult<()>
    {
        let mut chunks = buf.chunks_exact_mut(WORD_SIZE);
        let mut index = 0;
        for chunk in &mut chunks {
            chunk.copy_from_slice(&self.tracer.peek_data(pid, src.word(index))?.to_ne_bytes());
            index += 1;
        }

        let trailing = chunks.into_remainder();
        if !trailing.is_empty() {
            let raw = self.tracer.peek_data(pid, src.word(index))?.to_ne_bytes();
            let len = trailing.len();
            trailing.copy_from_slice(&raw[..len]);
        }
        Ok(())
    }

    /// Copy a NUL-terminated string from the traced process into `buf`
    ///
    /// At most `buf.len()` bytes are examined. Memory is read a word at a
    /// time and the scan stops at the first word containing a zero byte.
    ///
    /// The returned [`StringRead::length`] includes the terminator when one
    /// was found, and equals `buf.len()` otherwise; check
    /// [`StringRead::is_truncated`] to tell the two apart.
    pub fn read_cstring(&self, pid: ProcessId, src: Address, buf: &mut [u8]) -> TetherResult<StringRead>
    {
        let max = buf.len();
        let full_words = max / WORD_SIZE;

        for index in 0..full_words {
            let raw = self.tracer.peek_data(pid, src.word(index))?.to_ne_bytes();
            let start = index * WORD_SIZE;
            buf[start..start + WORD_SIZE].copy_from_slice(&raw);

            if let Some(zero) = raw.iter().position(|&byte| byte == 0) {
                return Ok(StringRead {
                    copied: start + WORD_SIZE,
                    length: start + zero + 1,
                    terminated: true,
                });
            }
        }

        let start = full_words * WORD_SIZE;
        if start == max {
            return Ok(StringRead {
                copied: max,
                length: max,
                terminated: false,
            });
        }

        let raw = self.tracer.peek_data(pid, src.word(full_words))?.to_ne_bytes();
        for (offset, (dest, &byte)) in buf[start..].iter_mut().zip(raw.iter()).enumerate() {
            *dest = byte;
            if byte == 0 {
                return Ok(StringRead {
                    copied: start + offset + 1,
                    length: start + offset + 1,
                    terminated: true,
                });
            }
        }

        Ok(StringRead {
            copied: max,
            length: max,
            terminated: false,
        })
    }
}

/// New stack pointer after moving `sp` by `delta`, or `None` on wrap-around.
///
/// An allocation must leave the pointer strictly above zero and a release
/// strictly below the largest word.
fn adjust_stack_pointer(sp: Word, delta: isize) -> Option<Word>
{
    let magnitude = delta.unsigned_abs() as Word;
    if delta >= 0 {
        (sp > magnitude).then(|| sp - magnitude)
    } else {
        sp.checked_add(magnitude).filter(|&new_sp| new_sp < Word::MAX)
    }
}

fn word_from_bytes(bytes: &[u8]) -> Word
{
    let mut raw = [0u8; WORD_SIZE];
    raw[..bytes.len()].copy_from_slice(bytes);
    Word::from_ne_bytes(raw)
}
