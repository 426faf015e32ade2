//! # Filter Evaluation
//!
//! A userspace interpreter for the programs the assembler emits, so a
//! filter's decisions can be inspected without installing it.
//!
//! Only the instruction shapes listed in [`bpf`](crate::filter::bpf) are
//! understood. Anything else is reported as
//! [`InvalidProgram`](crate::error::TetherError::InvalidProgram) instead of
//! being guessed at.

use std::fmt;

use crate::error::{TetherError, TetherResult};
use crate::filter::bpf::{
    BpfProgram, JA, JEQ_K, LD_W_ABS, RET_K, SECCOMP_DATA_SIZE, SECCOMP_RET_ACTION_FULL, SECCOMP_RET_ALLOW,
    SECCOMP_RET_DATA, SECCOMP_RET_ERRNO, SECCOMP_RET_KILL, SECCOMP_RET_KILL_PROCESS, SECCOMP_RET_LOG,
    SECCOMP_RET_TRACE, SECCOMP_RET_TRAP,
};
use crate::filter::table::AuditArch;

/// The record a filter runs against (`struct seccomp_data`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeccompData
{
    pub nr: i32,
    pub arch: AuditArch,
    pub instruction_pointer: u64,
    pub args: [u64; 6],
}

impl SeccompData
{
    /// A syscall `nr` on `arch` with zeroed arguments.
    pub fn new(arch: AuditArch, nr: i32) -> Self
    {
        SeccompData {
            nr,
            arch,
            instruction_pointer: 0,
            args: [0; 6],
        }
    }

    /// The 32-bit word at byte `offset`, as `BPF_LD | BPF_W | BPF_ABS`
    /// would load it.
    pub fn load_word(&self, offset: u32) -> TetherResult<u32>
    {
        if offset % 4 != 0 || offset.checked_add(4).map_or(true, |end| end > SECCOMP_DATA_SIZE) {
            return Err(TetherError::InvalidProgram(format!(
                "load at offset {offset} is outside seccomp_data"
            )));
        }

        let mut record = [0u8; SECCOMP_DATA_SIZE as usize];
        record[0..4].copy_from_slice(&self.nr.to_ne_bytes());
        record[4..8].copy_from_slice(&self.arch.0.to_ne_bytes());
        record[8..16].copy_from_slice(&self.instruction_pointer.to_ne_bytes());
        for (index, arg) in self.args.iter().enumerate() {
            let start = 16 + index * 8;
            record[start..start + 8].copy_from_slice(&arg.to_ne_bytes());
        }

        let start = offset as usize;
        let mut word = [0u8; 4];
        word.copy_from_slice(&record[start..start + 4]);
        Ok(u32::from_ne_bytes(word))
    }
}

/// A decoded filter return value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict
{
    /// Kill the offending thread
    Kill,
    /// Kill the whole process
    KillProcess,
    /// Deliver `SIGSYS` with this data
    Trap(u16),
    /// Fail the syscall with this errno
    Errno(u16),
    /// Stop in the tracer, which reads this data with `PTRACE_GETEVENTMSG`
    Trace(u16),
    /// Allow and log
    Log,
    /// Allow
    Allow,
    /// Any other return value, kept raw
    Other(u32),
}

impl Verdict
{
    /// Decode a `RET` operand.
    pub fn from_ret(value: u32) -> Self
    {
        let data = (value & SECCOMP_RET_DATA) as u16;
        match value & SECCOMP_RET_ACTION_FULL {
            SECCOMP_RET_KILL_PROCESS => Verdict::KillProcess,
            SECCOMP_RET_KILL => Verdict::Kill,
            SECCOMP_RET_TRAP => Verdict::Trap(data),
            SECCOMP_RET_ERRNO => Verdict::Errno(data),
            SECCOMP_RET_TRACE => Verdict::Trace(data),
            SECCOMP_RET_LOG => Verdict::Log,
            SECCOMP_RET_ALLOW => Verdict::Allow,
            _ => Verdict::Other(value),
        }
    }

    /// Encode as a `RET` operand.
    pub fn to_ret(self) -> u32
    {
        match self {
            Verdict::Kill => SECCOMP_RET_KILL,
            Verdict::KillProcess => SECCOMP_RET_KILL_PROCESS,
            Verdict::Trap(data) => SECCOMP_RET_TRAP | u32::from(data),
            Verdict::Errno(data) => SECCOMP_RET_ERRNO | u32::from(data),
            Verdict::Trace(data) => SECCOMP_RET_TRACE | u32::from(data),
            Verdict::Log => SECCOMP_RET_LOG,
            Verdict::Allow => SECCOMP_RET_ALLOW,
            Verdict::Other(value) => value,
        }
    }

    /// Precedence key: lower wins.
    fn precedence(self) -> i32
    {
        #[allow(clippy::cast_possible_wrap)]
        let action = (self.to_ret() & SECCOMP_RET_ACTION_FULL) as i32;
        action
    }
}

impl fmt::Display for Verdict
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Verdict::Kill => write!(f, "kill"),
            Verdict::KillProcess => write!(f, "kill-process"),
            Verdict::Trap(data) => write!(f, "trap({data})"),
            Verdict::Errno(data) => write!(f, "errno({data})"),
            Verdict::Trace(data) => write!(f, "trace({data})"),
            Verdict::Log => write!(f, "log"),
            Verdict::Allow => write!(f, "allow"),
            Verdict::Other(value) => write!(f, "0x{value:08x}"),
        }
    }
}

/// Combine the verdicts of stacked filters the way the kernel does
///
/// `verdicts` must be in evaluation order, i.e. the most recently
/// installed filter first. The verdict whose action has the lowest signed
/// value wins; on a tie the first one wins. Returns `None` when there is
/// nothing to combine.
pub fn combine<I>(verdicts: I) -> Option<Verdict>
where
    I: IntoIterator<Item = Verdict>,
{
    verdicts.into_iter().fold(None, |best, verdict| match best {
        Some(best) if best.precedence() <= verdict.precedence() => Some(best),
        _ => Some(verdict),
    })
}

/// Run `program` against `data`.
pub fn evaluate(program: &BpfProgram, data: &SeccompData) -> TetherResult<Verdict>
{
    let instructions = program.instructions();
    let mut accumulator: u32 = 0;
    let mut pc = 0usize;

    while let Some(insn) = instructions.get(pc) {
        let skip = match insn.code {
            LD_W_ABS => {
                accumulator = data.load_word(insn.k)?;
                0
            }
            JEQ_K => {
                if accumulator == insn.k {
                    usize::from(insn.jt)
                } else {
                    usize::from(insn.jf)
                }
            }
            JA => insn.k as usize,
            RET_K => return Ok(Verdict::from_ret(insn.k)),
            code => {
                return Err(TetherError::InvalidProgram(format!(
                    "unsupported opcode 0x{code:02x} at {pc}"
                )))
            }
        };

        pc = pc
            .checked_add(1 + skip)
            .filter(|next| *next < instructions.len())
            .ok_or_else(|| TetherError::InvalidProgram(format!("jump at {pc} leaves the program")))?;
    }

    Err(TetherError::InvalidProgram("program ended without a return".to_string()))
}
