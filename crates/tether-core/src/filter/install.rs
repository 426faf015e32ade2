//! # Filter Installation
//!
//! Handing assembled programs to the kernel.
//!
//! Installation always targets the *calling* process, and the filter is
//! inherited across `fork()` and kept across `execve()`. A supervisor
//! therefore installs from inside the tracee, after `fork()` and before
//! `execve()` (see [`spawn_traced`](crate::platform::linux::launch::spawn_traced)).
//! Once installed a filter cannot be removed.
//!
//! ## Stacked filters
//!
//! Extensions are installed as additional, independent filters. The kernel
//! runs every installed filter for each syscall and keeps the verdict whose
//! action has the lowest signed value (kill, trap, errno, trace, then
//! allow; see [`combine`](crate::filter::eval::combine)). Between two
//! filters returning the same action, the one installed last is evaluated
//! first and its data wins. That tie-break is a property of the kernel, not
//! of this crate.

use tracing::{debug, info};

use crate::error::TetherResult;
use crate::filter::assembler::assemble;
use crate::filter::bpf::BpfProgram;
use crate::filter::table::{sections, ArchFilter};

/// The two host calls filter installation consists of
///
/// [`SeccompInstaller`] is the real one; tests substitute a recorder to
/// check what would have been installed and in which order.
pub trait FilterInstaller
{
    /// Forbid the calling process and its descendants from gaining
    /// privileges (`PR_SET_NO_NEW_PRIVS`).
    fn restrict_privileges(&self) -> TetherResult<()>;

    /// Install `program` as an additional syscall filter of the calling
    /// process.
    fn install(&self, program: &BpfProgram) -> TetherResult<()>;
}

impl<T: FilterInstaller + ?Sized> FilterInstaller for &T
{
    fn restrict_privileges(&self) -> TetherResult<()>
    {
        (**self).restrict_privileges()
    }

    fn install(&self, program: &BpfProgram) -> TetherResult<()>
    {
        (**self).install(program)
    }
}

#[cfg(target_os = "linux")]
pub use self::linux::SeccompInstaller;

#[cfg(target_os = "linux")]
mod linux
{
    use std::io;

    use tracing::warn;

    use super::FilterInstaller;
    use crate::error::{TetherError, TetherResult};
    use crate::filter::bpf::{BpfProgram, SockFilter};

    /// `SECCOMP_MODE_FILTER` from `<linux/seccomp.h>`
    const SECCOMP_MODE_FILTER: libc::c_ulong = 2;

    /// `struct sock_fprog`
    #[repr(C)]
    struct SockFprog
    {
        len: libc::c_ushort,
        filter: *const SockFilter,
    }

    /// Installs filters with `prctl(2)`
    #[derive(Debug, Default, Clone, Copy)]
    pub struct SeccompInstaller;

    impl SeccompInstaller
    {
        pub fn new() -> Self
        {
            SeccompInstaller
        }
    }

    impl FilterInstaller for SeccompInstaller
    {
        fn restrict_privileges(&self) -> TetherResult<()>
        {
            let one: libc::c_ulong = 1;
            let zero: libc::c_ulong = 0;
            let rc = unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, one, zero, zero, zero) };
            if rc < 0 {
                let source = io::Error::last_os_error();
                warn!("prctl(PR_SET_NO_NEW_PRIVS) failed: {source}");
                return Err(TetherError::InstallRejected {
                    operation: "PR_SET_NO_NEW_PRIVS",
                    source,
                });
            }
            Ok(())
        }

        fn install(&self, program: &BpfProgram) -> TetherResult<()>
        {
            program.validate()?;
            // validate() bounds the length by BPF_MAXINSNS
            let len = libc::c_ushort::try_from(program.len())
                .map_err(|_| TetherError::FilterTooLarge(format!("{} instructions", program.len())))?;

            let fprog = SockFprog {
                len,
                filter: program.instructions().as_ptr(),
            };

            let rc = unsafe {
                libc::prctl(
                    libc::PR_SET_SECCOMP,
                    SECCOMP_MODE_FILTER,
                    std::ptr::from_ref(&fprog),
                    0 as libc::c_ulong,
                    0 as libc::c_ulong,
                )
            };
            if rc < 0 {
                let source = io::Error::last_os_error();
                warn!("prctl(PR_SET_SECCOMP) failed: {source}");
                return Err(TetherError::InstallRejected {
                    operation: "PR_SET_SECCOMP",
                    source,
                });
            }
            Ok(())
        }
    }
}

/// Restrict privileges, then install `program`.
pub fn install_program<I: FilterInstaller>(installer: &I, program: &BpfProgram) -> TetherResult<()>
{
    installer.restrict_privileges()?;
    installer.install(program)
}

/// Assemble `filters` and install the result
///
/// Nothing is installed if assembly fails.
pub fn set_seccomp_filters<I: FilterInstaller>(installer: &I, filters: &[ArchFilter<'_>]) -> TetherResult<()>
{
    let program = assemble(filters)?;
    install_program(installer, &program)
}

/// Assemble the base table and every non-empty extension table, in
/// installation order
///
/// All allocation happens here, so the result can be installed with
/// [`install_prepared`] in a freshly forked child.
pub fn prepare_syscall_filtering(
    filters: &[ArchFilter<'_>],
    extensions: &[&[ArchFilter<'_>]],
) -> TetherResult<Vec<BpfProgram>>
{
    let mut programs = Vec::with_capacity(1 + extensions.len());
    programs.push(assemble(filters)?);

    for (index, extension) in extensions.iter().enumerate() {
        if sections(extension).next().is_none() {
            debug!("Skipping empty extension filter {index}");
            continue;
        }
        programs.push(assemble(extension)?);
    }

    Ok(programs)
}

/// Install programs built by [`prepare_syscall_filtering`], in order.
///
/// Stops at the first failure; programs installed before it stay active.
pub fn install_prepared<I: FilterInstaller>(installer: &I, programs: &[BpfProgram]) -> TetherResult<()>
{
    for program in programs {
        install_program(installer, program)?;
    }
    Ok(())
}

/// Install the base filter table, then one stacked filter per non-empty
/// extension table
///
/// Every table is assembled before the first installation, so an assembly
/// failure in an extension leaves the process unfiltered rather than
/// partially filtered.
pub fn enable_syscall_filtering<I: FilterInstaller>(
    installer: &I,
    filters: &[ArchFilter<'_>],
    extensions: &[&[ArchFilter<'_>]],
) -> TetherResult<()>
{
    let programs = prepare_syscall_filtering(filters, extensions)?;
    info!("Installing {} syscall filter(s)", programs.len());
    install_prepared(installer, &programs)
}
