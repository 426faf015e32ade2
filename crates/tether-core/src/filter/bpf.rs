//! # Classic BPF Encoding
//!
//! The instruction record and constants the kernel's seccomp filter mode
//! accepts, reproduced bit-exact from `<linux/filter.h>`,
//! `<linux/bpf_common.h>` and `<linux/seccomp.h>`.
//!
//! Only the instruction shapes the synthesizer emits are named here:
//!
//! | shape           | code   | meaning                                     |
//! |-----------------|--------|---------------------------------------------|
//! | `LD  W ABS k`   | `0x20` | accumulator = 32-bit word at `seccomp_data + k` |
//! | `JEQ K k,jt,jf` | `0x15` | skip `jt` if accumulator == `k`, else `jf`  |
//! | `JA k`          | `0x05` | skip `k` unconditionally                    |
//! | `RET K k`       | `0x06` | return verdict `k`                          |

use std::fmt;

use crate::error::{TetherError, TetherResult};

pub const BPF_LD: u16 = 0x00;
pub const BPF_JMP: u16 = 0x05;
pub const BPF_RET: u16 = 0x06;
pub const BPF_W: u16 = 0x00;
pub const BPF_ABS: u16 = 0x20;
pub const BPF_JA: u16 = 0x00;
pub const BPF_JEQ: u16 = 0x10;
pub const BPF_K: u16 = 0x00;

/// `BPF_LD | BPF_W | BPF_ABS`
pub const LD_W_ABS: u16 = BPF_LD | BPF_W | BPF_ABS;
/// `BPF_JMP | BPF_JEQ | BPF_K`
pub const JEQ_K: u16 = BPF_JMP | BPF_JEQ | BPF_K;
/// `BPF_JMP | BPF_JA`
pub const JA: u16 = BPF_JMP | BPF_JA;
/// `BPF_RET | BPF_K`
pub const RET_K: u16 = BPF_RET | BPF_K;

/// Longest program the kernel accepts.
pub const BPF_MAXINSNS: usize = 4096;

// Verdicts, see <linux/seccomp.h>.
pub const SECCOMP_RET_KILL_PROCESS: u32 = 0x8000_0000;
pub const SECCOMP_RET_KILL: u32 = 0x0000_0000;
pub const SECCOMP_RET_TRAP: u32 = 0x0003_0000;
pub const SECCOMP_RET_ERRNO: u32 = 0x0005_0000;
pub const SECCOMP_RET_TRACE: u32 = 0x7ff0_0000;
pub const SECCOMP_RET_LOG: u32 = 0x7ffc_0000;
pub const SECCOMP_RET_ALLOW: u32 = 0x7fff_0000;
pub const SECCOMP_RET_ACTION_FULL: u32 = 0xffff_0000;
pub const SECCOMP_RET_DATA: u32 = 0x0000_ffff;

/// `offsetof(struct seccomp_data, nr)`
pub const SECCOMP_DATA_NR: u32 = 0;
/// `offsetof(struct seccomp_data, arch)`
pub const SECCOMP_DATA_ARCH: u32 = 4;
/// `sizeof(struct seccomp_data)`
pub const SECCOMP_DATA_SIZE: u32 = 64;

/// One BPF instruction (`struct sock_filter`)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SockFilter
{
    /// Opcode
    pub code: u16,
    /// Skip distance when the comparison is true
    pub jt: u8,
    /// Skip distance when the comparison is false
    pub jf: u8,
    /// Operand
    pub k: u32,
}

impl SockFilter
{
    /// `BPF_STMT(code, k)`
    pub const fn stmt(code: u16, k: u32) -> Self
    {
        SockFilter { code, jt: 0, jf: 0, k }
    }

    /// `BPF_JUMP(code, k, jt, jf)`
    pub const fn jump(code: u16, k: u32, jt: u8, jf: u8) -> Self
    {
        SockFilter { code, jt, jf, k }
    }

    /// Whether this is a conditional jump.
    pub const fn is_conditional_jump(&self) -> bool
    {
        self.code & 0x07 == BPF_JMP && self.code != JA
    }

    /// Whether this instruction ends evaluation.
    pub const fn is_return(&self) -> bool
    {
        self.code & 0x07 == BPF_RET
    }
}

impl fmt::Display for SockFilter
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(
            f,
            "{{ 0x{:02x}, {:3}, {:3}, 0x{:08x} }}",
            self.code, self.jt, self.jf, self.k
        )
    }
}

/// A growable filter program
///
/// Built once, handed to the kernel, and dropped; the kernel keeps its own
/// copy. Growth is fallible so allocation failure is reported as
/// [`TetherError::OutOfMemory`] instead of aborting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BpfProgram
{
    instructions: Vec<SockFilter>,
}

impl BpfProgram
{
    /// Create an empty program.
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Number of instructions.
    pub fn len(&self) -> usize
    {
        self.instructions.len()
    }

    /// Whether the program has no instructions.
    pub fn is_empty(&self) -> bool
    {
        self.instructions.is_empty()
    }

    /// The instructions, in execution order.
    pub fn instructions(&self) -> &[SockFilter]
    {
        &self.instructions
    }

    /// Append `statements` to the program.
    pub fn push_all(&mut self, statements: &[SockFilter]) -> TetherResult<()>
    {
        self.instructions.try_reserve(statements.len())?;
        self.instructions.extend_from_slice(statements);
        Ok(())
    }

    /// Check the program is one the kernel will run as intended
    ///
    /// - it is not empty and has at most [`BPF_MAXINSNS`] instructions
    /// - every jump lands inside the program
    /// - the last instruction is a return
    pub fn validate(&self) -> TetherResult<()>
    {
        if self.instructions.is_empty() {
            return Err(TetherError::InvalidProgram("program is empty".to_string()));
        }
        if self.instructions.len() > BPF_MAXINSNS {
            return Err(TetherError::FilterTooLarge(format!(
                "{} instructions, the kernel accepts at most {BPF_MAXINSNS}",
                self.instructions.len()
            )));
        }

        let len = self.instructions.len();
        for (index, insn) in self.instructions.iter().enumerate() {
            let targets = if insn.is_conditional_jump() {
                [usize::from(insn.jt), usize::from(insn.jf)]
            } else if insn.code == JA {
                [insn.k as usize; 2]
            } else {
                continue;
            };

            for skip in targets {
                let target = index.saturating_add(1).saturating_add(skip);
                if target >= len {
                    return Err(TetherError::InvalidProgram(format!(
                        "jump at {index} skips {skip} past the end of a {len}-instruction program"
                    )));
                }
            }
        }

        if !self.instructions[len - 1].is_return() {
            return Err(TetherError::InvalidProgram("last instruction is not a return".to_string()));
        }
        Ok(())
    }

    /// Raw bytes of the program as the kernel reads them.
    pub fn to_bytes(&self) -> Vec<u8>
    {
        let mut bytes = Vec::with_capacity(self.instructions.len() * std::mem::size_of::<SockFilter>());
        for insn in &self.instructions {
            bytes.extend_from_slice(&insn.code.to_ne_bytes());
            bytes.push(insn.jt);
            bytes.push(insn.jf);
            bytes.extend_from_slice(&insn.k.to_ne_bytes());
        }
        bytes
    }
}

impl AsRef<[SockFilter]> for BpfProgram
{
    fn as_ref(&self) -> &[SockFilter]
    {
        &self.instructions
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_sock_filter_layout()
    {
        assert_eq!(std::mem::size_of::<SockFilter>(), 8);
        assert_eq!(std::mem::offset_of!(SockFilter, jt), 2);
        assert_eq!(std::mem::offset_of!(SockFilter, jf), 3);
        assert_eq!(std::mem::offset_of!(SockFilter, k), 4);
    }

    #[test]
    fn test_opcodes()
    {
        assert_eq!(LD_W_ABS, 0x20);
        assert_eq!(JEQ_K, 0x15);
        assert_eq!(JA, 0x05);
        assert_eq!(RET_K, 0x06);
    }

    #[test]
    fn test_validate_rejects_jump_past_end()
    {
        let mut program = BpfProgram::new();
        program
            .push_all(&[SockFilter::jump(JEQ_K, 1, 0, 2), SockFilter::stmt(RET_K, SECCOMP_RET_ALLOW)])
            .unwrap();
        assert!(matches!(program.validate(), Err(TetherError::InvalidProgram(_))));
    }

    #[test]
    fn test_validate_requires_final_return()
    {
        let mut program = BpfProgram::new();
        program.push_all(&[SockFilter::stmt(LD_W_ABS, SECCOMP_DATA_NR)]).unwrap();
        assert!(matches!(program.validate(), Err(TetherError::InvalidProgram(_))));
        assert!(matches!(BpfProgram::new().validate(), Err(TetherError::InvalidProgram(_))));
    }

    #[test]
    fn test_to_bytes()
    {
        let mut program = BpfProgram::new();
        program.push_all(&[SockFilter::jump(JEQ_K, 0x0102_0304, 5, 6)]).unwrap();
        let bytes = program.to_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..2], &JEQ_K.to_ne_bytes());
        assert_eq!(bytes[2], 5);
        assert_eq!(bytes[3], 6);
        assert_eq!(&bytes[4..], &0x0102_0304u32.to_ne_bytes());
    }
}
