//! # Register Offset Tables
//!
//! Where each syscall argument lives in the USER area of a stopped process.
//!
//! `PTRACE_PEEKUSER`/`PTRACE_POKEUSER` address registers by their byte
//! offset inside `struct user`, which starts with the architecture's
//! `struct user_regs_struct` (`struct pt_regs` on ARM). The offsets below are
//! `offsetof(struct user, regs) + offsetof(struct user_regs_struct, reg)` for
//! the register the syscall ABI uses for each slot.
//!
//! ## Supported layouts
//!
//! | layout  | num        | args                           | result | sp  |
//! |---------|------------|--------------------------------|--------|-----|
//! | x86_64  | `orig_rax` | rdi, rsi, rdx, r10, r8, r9     | rax    | rsp |
//! | i386    | `orig_eax` | ebx, ecx, edx, esi, edi, ebp   | eax    | esp |
//! | arm     | r7         | r0, r1, r2, r3, r4, r5         | r0     | sp  |
//!
//! aarch64 has no USER area peek/poke, so it has no layout here.
//!
//! ## References
//!
//! - [syscall(2) calling conventions](https://man7.org/linux/man-pages/man2/syscall.2.html)
//! - `<sys/user.h>`

use crate::error::{TetherError, TetherResult};
use crate::filter::table::AuditArch;
use crate::types::SysArg;

/// Immutable mapping from [`SysArg`] to USER area byte offsets
///
/// Layouts are `static` and selected at compile time; the accessor borrows
/// one for its whole life instead of consulting global mutable state.
///
/// ## Example
///
/// ```rust
/// use tether_core::platform::linux::registers::{RegisterLayout, X86_64};
/// use tether_core::types::SysArg;
///
/// let layout: &RegisterLayout = &X86_64;
/// assert_eq!(layout.offset(SysArg::Num).unwrap(), 120); // orig_rax
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterLayout
{
    /// Short architecture name (`x86_64`, `i386`, `arm`)
    pub name: &'static str,
    /// Size of a register slot in bytes
    pub word_size: usize,
    /// The audit architecture a filter section must match for this layout
    pub audit_arch: AuditArch,
    /// Offsets indexed by [`SysArg::index`]
    pub arguments: [usize; SysArg::COUNT],
    /// Offset of the stack pointer
    pub stack_pointer: usize,
    /// Offset of the instruction pointer
    pub instruction_pointer: usize,
}

impl RegisterLayout
{
    /// USER area offset of `slot`.
    pub fn offset(&self, slot: SysArg) -> TetherResult<usize>
    {
        self.arguments
            .get(slot.index())
            .copied()
            .ok_or(TetherError::InvalidSlot(slot.index()))
    }

    /// The layout matching the architecture this crate was compiled for.
    ///
    /// Returns `None` on targets without `PTRACE_PEEKUSER` support.
    pub fn native() -> Option<&'static RegisterLayout>
    {
        #[cfg(target_arch = "x86_64")]
        return Some(&X86_64);
        #[cfg(target_arch = "x86")]
        return Some(&I386);
        #[cfg(target_arch = "arm")]
        return Some(&ARM);
        #[cfg(not(any(target_arch = "x86_64", target_arch = "x86", target_arch = "arm")))]
        return None;
    }

    /// Like [`RegisterLayout::native`], but as an error for callers that
    /// cannot continue without one.
    pub fn require_native() -> TetherResult<&'static RegisterLayout>
    {
        Self::native().ok_or_else(|| TetherError::UnsupportedArchitecture(std::env::consts::ARCH.to_string()))
    }

    /// Look up a layout by its short name.
    pub fn by_name(name: &str) -> Option<&'static RegisterLayout>
    {
        [&X86_64, &I386, &ARM].into_iter().find(|layout| layout.name == name)
    }
}

const fn words(index: usize, size: usize) -> usize
{
    index * size
}

/// x86_64: `struct user_regs_struct` of 27 eight-byte registers.
pub static X86_64: RegisterLayout = RegisterLayout {
    name: "x86_64",
    word_size: 8,
    audit_arch: AuditArch::X86_64,
    arguments: [
        words(15, 8), // orig_rax
        words(14, 8), // rdi
        words(13, 8), // rsi
        words(12, 8), // rdx
        words(7, 8),  // r10
        words(9, 8),  // r8
        words(8, 8),  // r9
        words(10, 8), // rax
    ],
    stack_pointer: words(19, 8),       // rsp
    instruction_pointer: words(16, 8), // rip
};

/// i386: `struct user_regs_struct` of 17 four-byte registers.
pub static I386: RegisterLayout = RegisterLayout {
    name: "i386",
    word_size: 4,
    audit_arch: AuditArch::I386,
    arguments: [
        words(11, 4), // orig_eax
        words(0, 4),  // ebx
        words(1, 4),  // ecx
        words(2, 4),  // edx
        words(3, 4),  // esi
        words(4, 4),  // edi
        words(5, 4),  // ebp
        words(6, 4),  // eax
    ],
    stack_pointer: words(15, 4),       // esp
    instruction_pointer: words(12, 4), // eip
};

/// 32-bit ARM (EABI): `struct pt_regs` `uregs[18]`.
pub static ARM: RegisterLayout = RegisterLayout {
    name: "arm",
    word_size: 4,
    audit_arch: AuditArch::ARM,
    arguments: [
        words(7, 4), // r7
        words(0, 4), // r0
        words(1, 4),
        words(2, 4),
        words(3, 4),
        words(4, 4),
        words(5, 4),
        words(0, 4), // r0
    ],
    stack_pointer: words(13, 4),       // sp
    instruction_pointer: words(15, 4), // pc
};
