//! # Filter Specifications
//!
//! The table the synthesizer turns into a program: per audit architecture,
//! the syscalls that must stop in the supervisor.
//!
//! The tables are usually `static` data owned by the policy layer and are
//! only ever read here. They keep the terminator convention of the kernel
//! headers they are generated from:
//!
//! - a syscall list ends at [`FilteredSyscall::END`]
//! - any other negative syscall value means "known, but not traced on this
//!   architecture" (e.g. a syscall that does not exist there)
//! - the architecture table ends at [`ArchFilter::END`]
//!
//! Reaching the end of a slice is treated like a terminator.
//!
//! ## Example
//!
//! ```rust
//! use tether_core::filter::{ArchFilter, AuditArch, FilteredSyscall};
//!
//! static X86_64_SYSCALLS: [FilteredSyscall; 4] = [
//!     FilteredSyscall::traced(2, 0),   // open
//!     FilteredSyscall::traced(257, 0), // openat
//!     FilteredSyscall::UNTRACED,       // not on this architecture
//!     FilteredSyscall::END,
//! ];
//!
//! static FILTERS: [ArchFilter<'static>; 2] = [
//!     ArchFilter::new(AuditArch::X86_64, &X86_64_SYSCALLS),
//!     ArchFilter::END,
//! ];
//!
//! assert_eq!(FILTERS[0].traced_count(), 2);
//! ```

use std::fmt;

/// An `AUDIT_ARCH_*` identifier as found in `seccomp_data.arch`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AuditArch(pub u32);

impl AuditArch
{
    /// Table terminator; never a real architecture.
    pub const NONE: AuditArch = AuditArch(0);
    /// `AUDIT_ARCH_X86_64`
    pub const X86_64: AuditArch = AuditArch(0xc000_003e);
    /// `AUDIT_ARCH_I386`
    pub const I386: AuditArch = AuditArch(0x4000_0003);
    /// `AUDIT_ARCH_ARM`
    pub const ARM: AuditArch = AuditArch(0x4000_0028);
    /// `AUDIT_ARCH_AARCH64`
    pub const AARCH64: AuditArch = AuditArch(0xc000_00b7);
    /// `AUDIT_ARCH_RISCV64`
    pub const RISCV64: AuditArch = AuditArch(0xc000_00f3);

    /// The audit architecture of the compilation target, if known.
    pub const fn native() -> Option<AuditArch>
    {
        if cfg!(target_arch = "x86_64") {
            Some(AuditArch::X86_64)
        } else if cfg!(target_arch = "x86") {
            Some(AuditArch::I386)
        } else if cfg!(target_arch = "arm") {
            Some(AuditArch::ARM)
        } else if cfg!(target_arch = "aarch64") {
            Some(AuditArch::AARCH64)
        } else if cfg!(target_arch = "riscv64") {
            Some(AuditArch::RISCV64)
        } else {
            None
        }
    }

    /// Look up an architecture by its short name.
    pub fn by_name(name: &str) -> Option<AuditArch>
    {
        match name {
            "x86_64" | "amd64" => Some(AuditArch::X86_64),
            "i386" | "x86" => Some(AuditArch::I386),
            "arm" => Some(AuditArch::ARM),
            "aarch64" | "arm64" => Some(AuditArch::AARCH64),
            "riscv64" => Some(AuditArch::RISCV64),
            "native" => AuditArch::native(),
            _ => None,
        }
    }
}

impl fmt::Display for AuditArch
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:08x}", self.0)
    }
}

/// One entry of a per-architecture syscall list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilteredSyscall
{
    /// Syscall number; negative values are markers, see the module docs
    pub value: i64,
    /// Returned to the tracer as `SECCOMP_RET_DATA` when this syscall traps
    pub flag: u16,
}

impl FilteredSyscall
{
    /// List terminator.
    pub const END: FilteredSyscall = FilteredSyscall { value: -2, flag: 0 };
    /// Placeholder for a syscall that is not traced on this architecture.
    pub const UNTRACED: FilteredSyscall = FilteredSyscall { value: -1, flag: 0 };

    /// A syscall that must stop in the supervisor with `flag`.
    pub const fn traced(value: i64, flag: u16) -> Self
    {
        FilteredSyscall { value, flag }
    }

    /// Whether this entry terminates its list.
    pub const fn is_end(&self) -> bool
    {
        self.value == FilteredSyscall::END.value
    }

    /// Whether this entry produces a trace check.
    pub const fn is_traced(&self) -> bool
    {
        self.value >= 0
    }
}

/// The syscalls to trace for one audit architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchFilter<'a>
{
    /// Value `seccomp_data.arch` must equal for this section to apply
    pub architecture: AuditArch,
    /// Entries up to [`FilteredSyscall::END`]
    pub syscalls: &'a [FilteredSyscall],
}

impl<'a> ArchFilter<'a>
{
    /// Table terminator.
    pub const END: ArchFilter<'static> = ArchFilter {
        architecture: AuditArch::NONE,
        syscalls: &[],
    };

    /// Create a section for `architecture`.
    pub const fn new(architecture: AuditArch, syscalls: &'a [FilteredSyscall]) -> Self
    {
        ArchFilter { architecture, syscalls }
    }

    /// Whether this entry terminates the table.
    pub const fn is_end(&self) -> bool
    {
        self.architecture.0 == AuditArch::NONE.0
    }

    /// Entries before the terminator.
    pub fn entries(&self) -> impl Iterator<Item = &'a FilteredSyscall> + 'a
    {
        self.syscalls.iter().take_while(|syscall| !syscall.is_end())
    }

    /// Entries that produce a trace check, in table order.
    pub fn traced(&self) -> impl Iterator<Item = &'a FilteredSyscall> + 'a
    {
        self.entries().filter(|syscall| syscall.is_traced())
    }

    /// Number of entries that produce a trace check.
    pub fn traced_count(&self) -> usize
    {
        self.traced().count()
    }
}

/// Sections of `filters` before the table terminator.
pub fn sections<'t, 'a>(filters: &'t [ArchFilter<'a>]) -> impl Iterator<Item = &'t ArchFilter<'a>>
{
    filters.iter().take_while(|filter| !filter.is_end())
}
