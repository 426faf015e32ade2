//! Traced process handle.

use std::fmt;

/// Process identifier (PID) of a traced process
///
/// The handle is opaque to this crate: it is never created or destroyed
/// here, only passed through to the debugging interface. The caller is
/// responsible for making sure it denotes a process that is currently in a
/// ptrace-stop.
///
/// ## Example
///
/// ```rust
/// use tether_core::types::ProcessId;
///
/// let pid = ProcessId::from(12345);
/// assert_eq!(pid.0, 12345);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u32);

impl ProcessId
{
    /// The PID as the `pid_t` expected by libc calls.
    #[allow(clippy::cast_possible_wrap)]
    pub const fn as_raw(self) -> libc::pid_t
    {
        self.0 as libc::pid_t
    }
}

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}
