//! Syscall argument slots.

use std::fmt;

use crate::error::{TetherError, TetherResult};

/// A register holding part of a syscall's state at a syscall stop
///
/// The slots are contiguous: `Num` is index 0, `Arg1`..`Arg6` are 1..=6 and
/// `Result` is 7. Each slot maps to a fixed byte offset in the traced
/// process's saved register area (see
/// [`RegisterLayout`](crate::platform::linux::registers::RegisterLayout)).
///
/// Raw indices coming from outside (configuration, command line) go through
/// [`SysArg::try_from`], so an out-of-range slot is rejected with
/// [`TetherError::InvalidSlot`] before anything reaches the kernel.
///
/// ## Example
///
/// ```rust
/// use tether_core::types::SysArg;
///
/// assert_eq!(SysArg::try_from(1).unwrap(), SysArg::Arg1);
/// assert!(SysArg::try_from(8).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SysArg
{
    /// The syscall number
    Num,
    /// First argument
    Arg1,
    /// Second argument
    Arg2,
    /// Third argument
    Arg3,
    /// Fourth argument
    Arg4,
    /// Fifth argument
    Arg5,
    /// Sixth argument
    Arg6,
    /// The return value, valid at syscall exit
    Result,
}

impl SysArg
{
    /// Number of slots.
    pub const COUNT: usize = 8;

    /// Every slot, in index order.
    pub const ALL: [SysArg; SysArg::COUNT] = [
        SysArg::Num,
        SysArg::Arg1,
        SysArg::Arg2,
        SysArg::Arg3,
        SysArg::Arg4,
        SysArg::Arg5,
        SysArg::Arg6,
        SysArg::Result,
    ];

    /// The six argument slots, in calling-convention order.
    pub const ARGUMENTS: [SysArg; 6] = [
        SysArg::Arg1,
        SysArg::Arg2,
        SysArg::Arg3,
        SysArg::Arg4,
        SysArg::Arg5,
        SysArg::Arg6,
    ];

    /// Position of this slot in the enumeration.
    pub const fn index(self) -> usize
    {
        self as usize
    }
}

impl TryFrom<usize> for SysArg
{
    type Error = TetherError;

    fn try_from(index: usize) -> TetherResult<Self>
    {
        SysArg::ALL.get(index).copied().ok_or(TetherError::InvalidSlot(index))
    }
}

impl fmt::Display for SysArg
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            SysArg::Num => write!(f, "num"),
            SysArg::Result => write!(f, "result"),
            arg => write!(f, "arg{}", arg.index()),
        }
    }
}
