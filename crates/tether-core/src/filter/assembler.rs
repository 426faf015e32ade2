//! # Filter Assembler
//!
//! Turns a filter table into a seccomp program shaped like this:
//!
//! ```text
//! for each architecture in the table
//!     if arch != architecture: skip to the next architecture
//!     for each traced syscall
//!         if nr == syscall: return TRACE | flag
//!     return ALLOW
//! return KILL
//! ```
//!
//! Each architecture section is emitted as:
//!
//! ```text
//!   ld  [arch]                     \
//!   jeq #architecture, 0, len + 1   | guard (LENGTH_START_SECTION)
//!   ld  [nr]                       /
//!   jeq #syscall, 0, 1             \ trace check (LENGTH_TRACE_SYSCALL),
//!   ret #TRACE | flag              / once per traced syscall
//!   ret #ALLOW                     -- allow terminator (LENGTH_END_SECTION)
//! ```
//!
//! where `len = LENGTH_END_SECTION + traced × LENGTH_TRACE_SYSCALL`. The
//! guard's skip distance is computed from the traced count before the
//! section body exists, so after the section is closed the number of
//! instructions actually emitted is checked against that same formula. A
//! mismatch means the guard would jump into the middle of the next section,
//! and assembly is aborted.

use tracing::debug;

use crate::error::{TetherError, TetherResult};
use crate::filter::bpf::{
    BpfProgram, SockFilter, JEQ_K, LD_W_ABS, RET_K, SECCOMP_DATA_ARCH, SECCOMP_DATA_NR, SECCOMP_RET_ALLOW,
    SECCOMP_RET_KILL, SECCOMP_RET_TRACE,
};
use crate::filter::table::{sections, ArchFilter, AuditArch};

/// Instructions emitted per traced syscall.
pub const LENGTH_TRACE_SYSCALL: usize = 2;
/// Instructions closing an architecture section.
pub const LENGTH_END_SECTION: usize = 1;
/// Instructions opening an architecture section.
pub const LENGTH_START_SECTION: usize = 3;
/// Instructions closing the program.
pub const LENGTH_FINALIZE: usize = 1;

/// Number of instructions a guard skips over for `traced` syscalls,
/// excluding the syscall-number load that follows the comparison.
///
/// Fails with `FilterTooLarge` when the count overflows or the resulting
/// skip does not fit the 8-bit jump offset.
pub fn section_length(traced: usize) -> TetherResult<usize>
{
    let length = traced
        .checked_mul(LENGTH_TRACE_SYSCALL)
        .and_then(|body| body.checked_add(LENGTH_END_SECTION))
        .ok_or_else(|| TetherError::FilterTooLarge(format!("{traced} traced syscalls overflow the section length")))?;

    // The guard skips the section plus the syscall-number load.
    if length + 1 > usize::from(u8::MAX) {
        return Err(TetherError::FilterTooLarge(format!(
            "section of {length} instructions for {traced} traced syscalls exceeds the {} instruction jump range",
            u8::MAX
        )));
    }
    Ok(length)
}

/// Predicted program length for `filters`.
pub fn predicted_len(filters: &[ArchFilter<'_>]) -> usize
{
    sections(filters)
        .map(|filter| LENGTH_START_SECTION + LENGTH_END_SECTION + filter.traced_count() * LENGTH_TRACE_SYSCALL)
        .sum::<usize>()
        + LENGTH_FINALIZE
}

/// Incremental builder of a filter program
///
/// [`assemble`] drives this for a whole table. The section methods are
/// public so policy code emitting its own sections gets the same length
/// checks.
///
/// ## Example
///
/// ```rust
/// use tether_core::filter::assembler::FilterAssembler;
/// use tether_core::filter::AuditArch;
///
/// let mut assembler = FilterAssembler::new();
/// assembler.start_arch_section(AuditArch::X86_64, 1)?;
/// assembler.add_trace_syscall(257, 0)?;
/// assembler.end_arch_section(1)?;
/// let program = assembler.finish()?;
/// assert_eq!(program.len(), 3 + 2 + 1 + 1);
/// # Ok::<(), tether_core::error::TetherError>(())
/// ```
#[derive(Debug, Default)]
pub struct FilterAssembler
{
    program: BpfProgram,
    section_start: usize,
}

impl FilterAssembler
{
    /// Start an empty program.
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Number of instructions emitted so far.
    pub fn len(&self) -> usize
    {
        self.program.len()
    }

    /// Whether nothing has been emitted yet.
    pub fn is_empty(&self) -> bool
    {
        self.program.is_empty()
    }

    /// Emit the guard for `architecture`, which will skip the section of
    /// `traced` trace checks if the architecture does not match.
    pub fn start_arch_section(&mut self, architecture: AuditArch, traced: usize) -> TetherResult<()>
    {
        let length = section_length(traced)?;
        let skip = u8::try_from(length + 1)
            .map_err(|_| TetherError::FilterTooLarge(format!("guard skip of {} does not fit 8 bits", length + 1)))?;

        debug!("FILTER: if arch == {architecture}, up to {traced}th statement");

        self.program.push_all(&[
            // Load the current architecture into the accumulator.
            SockFilter::stmt(LD_W_ABS, SECCOMP_DATA_ARCH),
            // Skip the whole section if it is not the expected one.
            SockFilter::jump(JEQ_K, architecture.0, 0, skip),
            // Load the current syscall number into the accumulator.
            SockFilter::stmt(LD_W_ABS, SECCOMP_DATA_NR),
        ])?;

        self.section_start = self.program.len();
        Ok(())
    }

    /// Emit a check that returns `SECCOMP_RET_TRACE | flag` for `syscall`.
    pub fn add_trace_syscall(&mut self, syscall: i64, flag: u16) -> TetherResult<()>
    {
        let nr = u32::try_from(syscall).map_err(|_| {
            TetherError::FilterTooLarge(format!("syscall {syscall} does not fit a 32-bit comparison operand"))
        })?;

        debug!("FILTER:     trace if syscall == {nr}");

        self.program.push_all(&[
            // Skip the next statement if this is not the expected syscall.
            SockFilter::jump(JEQ_K, nr, 0, 1),
            // Notify the tracer.
            SockFilter::stmt(RET_K, SECCOMP_RET_TRACE | u32::from(flag)),
        ])
    }

    /// Emit the allow terminator and check the section has the length its
    /// guard was built for.
    pub fn end_arch_section(&mut self, traced: usize) -> TetherResult<()>
    {
        debug!("FILTER:     allow");

        self.program.push_all(&[SockFilter::stmt(RET_K, SECCOMP_RET_ALLOW)])?;

        let emitted = self.program.len() - self.section_start;
        let expected = traced
            .checked_mul(LENGTH_TRACE_SYSCALL)
            .and_then(|body| body.checked_add(LENGTH_END_SECTION));
        if expected != Some(emitted) {
            return Err(TetherError::FilterTooLarge(format!(
                "section emitted {emitted} instructions but its guard was built for {traced} traced syscalls"
            )));
        }
        Ok(())
    }

    /// Emit the kill terminator and return the finished program.
    pub fn finish(mut self) -> TetherResult<BpfProgram>
    {
        debug!("FILTER: kill");

        self.program.push_all(&[SockFilter::stmt(RET_K, SECCOMP_RET_KILL)])?;
        Ok(self.program)
    }
}

/// Assemble the program for a whole filter table
///
/// Sections are emitted in table order. On any error the partial program
/// is dropped.
pub fn assemble(filters: &[ArchFilter<'_>]) -> TetherResult<BpfProgram>
{
    let mut assembler = FilterAssembler::new();

    for filter in sections(filters) {
        let traced = filter.traced_count();

        assembler.start_arch_section(filter.architecture, traced)?;
        for syscall in filter.traced() {
            assembler.add_trace_syscall(syscall.value, syscall.flag)?;
        }
        assembler.end_arch_section(traced)?;
    }

    let program = assembler.finish()?;
    debug!("Assembled filter program of {} instructions", program.len());
    Ok(program)
}
