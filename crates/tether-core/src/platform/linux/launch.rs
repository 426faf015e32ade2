//! # Traced Process Launch
//!
//! Starting a program under `ptrace` with a seccomp filter already active.
//!
//! The sequence is the usual one for a seccomp-assisted tracer:
//!
//! 1. `fork()`
//! 2. child: `PTRACE_TRACEME`, then `raise(SIGSTOP)` so the parent can set
//!    its trace options before anything interesting happens
//! 3. child: install the filter(s), then `execvp()`
//! 4. parent: `PTRACE_SETOPTIONS` with `PTRACE_O_TRACESECCOMP` (plus
//!    fork/clone following so inherited filters always have a tracer)
//!
//! Everything the child needs is allocated before `fork()`; between `fork()`
//! and `execvp()` the child only makes raw syscalls.
//!
//! ## References
//!
//! - [ptrace(2) man page](https://man7.org/linux/man-pages/man2/ptrace.2.html)
//! - [seccomp(2) `SECCOMP_RET_TRACE`](https://man7.org/linux/man-pages/man2/seccomp.2.html)

use std::ffi::CString;
use std::ptr;

use libc::{c_int, c_void};
use tracing::{debug, info, trace};

use crate::error::{TetherError, TetherResult};
use crate::types::ProcessId;

/// Exit status used by the child when it cannot reach `execvp()`.
pub const CHILD_SETUP_FAILED: c_int = 127;

/// Signal a newly followed child reports before it first runs.
///
/// With fork/clone following on, every new tracee starts in a `SIGSTOP`
/// signal-delivery stop that must be suppressed, not delivered.
pub const SIGSTOP: i32 = libc::SIGSTOP;

/// Trace options set on the first child; inherited by its descendants.
const TRACE_OPTIONS: c_int = libc::PTRACE_O_TRACESECCOMP
    | libc::PTRACE_O_TRACEEXEC
    | libc::PTRACE_O_TRACEFORK
    | libc::PTRACE_O_TRACEVFORK
    | libc::PTRACE_O_TRACECLONE
    | libc::PTRACE_O_EXITKILL;

/// What a traced process reported through `waitpid()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent
{
    /// The process exited normally with this code
    Exited(ProcessId, i32),
    /// The process was killed by this signal
    Signaled(ProcessId, i32),
    /// The seccomp filter returned `SECCOMP_RET_TRACE` with this data
    ///
    /// The process is stopped at syscall entry.
    Seccomp(ProcessId, u16),
    /// Any other `PTRACE_EVENT_*` stop (exec, fork, clone, ...)
    Event(ProcessId, i32),
    /// Signal-delivery stop
    Signal(ProcessId, i32),
}

impl TraceEvent
{
    /// The process this event is about.
    pub fn pid(&self) -> ProcessId
    {
        match *self {
            TraceEvent::Exited(pid, _)
            | TraceEvent::Signaled(pid, _)
            | TraceEvent::Seccomp(pid, _)
            | TraceEvent::Event(pid, _)
            | TraceEvent::Signal(pid, _) => pid,
        }
    }
}

/// Fork and exec `program` as a tracee
///
/// `in_child` runs in the child after it stopped for the parent and before
/// `execvp()`. It must not allocate: use it to install programs that were
/// assembled before this call. If it fails, or `execvp()` fails, the child
/// exits with [`CHILD_SETUP_FAILED`].
///
/// On return the child is stopped, trace options are set, and the caller
/// resumes it with [`resume`].
///
/// ## Errors
///
/// - `InvalidProgram`: an argument contains an interior NUL byte
/// - `Io`: `fork()` or `waitpid()` failed
/// - `TracerFault`: the child did not stop as expected, or
///   `PTRACE_SETOPTIONS` failed
pub fn spawn_traced<F>(program: &str, args: &[String], in_child: F) -> TetherResult<ProcessId>
where
    F: FnOnce() -> TetherResult<()>,
{
    info!("Launching traced program: {} with args: {:?}", program, args);

    let c_program = CString::new(program)
        .map_err(|_| TetherError::InvalidProgram(format!("program path contains a NUL byte: {program:?}")))?;
    let mut c_args = Vec::with_capacity(args.len() + 1);
    c_args.push(c_program.clone());
    for arg in args {
        c_args.push(
            CString::new(arg.as_str())
                .map_err(|_| TetherError::InvalidProgram(format!("argument contains a NUL byte: {arg:?}")))?,
        );
    }
    let mut argv: Vec<*const libc::c_char> = c_args.iter().map(|arg| arg.as_ptr()).collect();
    argv.push(ptr::null());

    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(TetherError::Io(std::io::Error::last_os_error()));
    }

    if pid == 0 {
        unsafe {
            if libc::ptrace(libc::PTRACE_TRACEME, 0, ptr::null_mut::<c_void>(), ptr::null_mut::<c_void>()) < 0 {
                libc::_exit(CHILD_SETUP_FAILED);
            }
            libc::raise(libc::SIGSTOP);
        }
        if in_child().is_err() {
            unsafe { libc::_exit(CHILD_SETUP_FAILED) };
        }
        unsafe {
            libc::execvp(c_program.as_ptr(), argv.as_ptr());
            libc::_exit(CHILD_SETUP_FAILED);
        }
    }

    #[allow(clippy::cast_sign_loss)]
    let child = ProcessId(pid as u32);
    debug!("Forked child {child}, waiting for its initial stop");

    let mut status: c_int = 0;
    if unsafe { libc::waitpid(pid, &mut status, 0) } < 0 {
        return Err(TetherError::Io(std::io::Error::last_os_error()));
    }
    if !libc::WIFSTOPPED(status) {
        return Err(TetherError::TracerFault {
            operation: "TRACEME",
            pid: child.0,
            source: std::io::Error::other(format!("child did not stop (wait status 0x{status:x})")),
        });
    }

    let rc = unsafe {
        libc::ptrace(
            libc::PTRACE_SETOPTIONS,
            pid,
            ptr::null_mut::<c_void>(),
            TRACE_OPTIONS as usize as *mut c_void,
        )
    };
    if rc < 0 {
        return Err(TetherError::tracer_fault("SETOPTIONS", child.0));
    }

    Ok(child)
}

/// Resume a stopped tracee, delivering `signal` (0 for none).
pub fn resume(pid: ProcessId, signal: i32) -> TetherResult<()>
{
    trace!(pid = pid.0, signal, "resume");
    let rc = unsafe {
        libc::ptrace(
            libc::PTRACE_CONT,
            pid.as_raw(),
            ptr::null_mut::<c_void>(),
            signal as usize as *mut c_void,
        )
    };
    if rc < 0 {
        return Err(TetherError::tracer_fault("CONT", pid.0));
    }
    Ok(())
}

/// Wait for the next event from any traced process.
pub fn wait_event() -> TetherResult<TraceEvent>
{
    let mut status: c_int = 0;
    let pid = unsafe { libc::waitpid(-1, &mut status, libc::__WALL) };
    if pid < 0 {
        return Err(TetherError::Io(std::io::Error::last_os_error()));
    }
    #[allow(clippy::cast_sign_loss)]
    let pid = ProcessId(pid as u32);

    let event = if libc::WIFEXITED(status) {
        TraceEvent::Exited(pid, libc::WEXITSTATUS(status))
    } else if libc::WIFSIGNALED(status) {
        TraceEvent::Signaled(pid, libc::WTERMSIG(status))
    } else {
        let signal = libc::WSTOPSIG(status);
        let event = status >> 16;
        if signal == libc::SIGTRAP && event == libc::PTRACE_EVENT_SECCOMP {
            TraceEvent::Seccomp(pid, event_message(pid)? as u16)
        } else if signal == libc::SIGTRAP && event != 0 {
            TraceEvent::Event(pid, event)
        } else {
            TraceEvent::Signal(pid, signal)
        }
    };
    trace!("{event:?}");
    Ok(event)
}

fn event_message(pid: ProcessId) -> TetherResult<libc::c_ulong>
{
    let mut message: libc::c_ulong = 0;
    let rc = unsafe {
        libc::ptrace(
            libc::PTRACE_GETEVENTMSG,
            pid.as_raw(),
            ptr::null_mut::<c_void>(),
            ptr::from_mut(&mut message).cast::<c_void>(),
        )
    };
    if rc < 0 {
        return Err(TetherError::tracer_fault("GETEVENTMSG", pid.0));
    }
    Ok(message)
}
