//! Common module for library exports

pub use crate::accessor::{StringRead, TraceeAccessor};
pub use crate::error::{TetherError, TetherResult};
pub use crate::filter::{ArchFilter, AuditArch, BpfProgram, FilterInstaller, FilteredSyscall, Verdict};
#[cfg(target_os = "linux")]
pub use crate::platform::linux::launch::{resume, spawn_traced, wait_event, TraceEvent};
#[cfg(target_os = "linux")]
pub use crate::platform::linux::Ptrace;
pub use crate::platform::linux::RegisterLayout;
pub use crate::tracer::WordTracer;
pub use crate::types::{Address, ProcessId, SysArg, Word};
