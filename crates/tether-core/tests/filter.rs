//! Tests for filter assembly, evaluation and stacked installation

use std::cell::RefCell;
use std::io;

use tether_core::error::{TetherError, TetherResult};
use tether_core::filter::assembler::{predicted_len, FilterAssembler};
use tether_core::filter::bpf::{JEQ_K, LD_W_ABS, RET_K, SECCOMP_DATA_ARCH, SECCOMP_DATA_NR, SECCOMP_RET_KILL};
use tether_core::filter::{
    assemble, combine, enable_syscall_filtering, evaluate, install_prepared, prepare_syscall_filtering, ArchFilter,
    AuditArch, BpfProgram, FilterInstaller, FilteredSyscall, SeccompData, SockFilter, Verdict,
};

const OPEN: i64 = 2;
const OPENAT: i64 = 257;
const EXECVE_I386: i64 = 11;

static X86_64_SYSCALLS: [FilteredSyscall; 4] = [
    FilteredSyscall::traced(OPEN, 1),
    FilteredSyscall::UNTRACED,
    FilteredSyscall::traced(OPENAT, 2),
    FilteredSyscall::END,
];

static I386_SYSCALLS: [FilteredSyscall; 2] = [FilteredSyscall::traced(EXECVE_I386, 3), FilteredSyscall::END];

static FILTERS: [ArchFilter<'static>; 3] = [
    ArchFilter::new(AuditArch::X86_64, &X86_64_SYSCALLS),
    ArchFilter::new(AuditArch::I386, &I386_SYSCALLS),
    ArchFilter::END,
];

fn verdict(program: &BpfProgram, arch: AuditArch, nr: i64) -> Verdict
{
    evaluate(program, &SeccompData::new(arch, nr as i32)).unwrap()
}

#[test]
fn test_program_length_matches_prediction()
{
    let program = assemble(&FILTERS).unwrap();

    // (3 + 2 * 2 + 1) + (3 + 2 * 1 + 1) + 1
    assert_eq!(program.len(), 15);
    assert_eq!(program.len(), predicted_len(&FILTERS));
    program.validate().unwrap();
}

#[test]
fn test_program_shape()
{
    let program = assemble(&FILTERS).unwrap();
    let insns = program.instructions();

    assert_eq!(insns[0], SockFilter::stmt(LD_W_ABS, SECCOMP_DATA_ARCH));
    assert_eq!(insns[1], SockFilter::jump(JEQ_K, AuditArch::X86_64.0, 0, 6));
    assert_eq!(insns[2], SockFilter::stmt(LD_W_ABS, SECCOMP_DATA_NR));
    assert_eq!(insns[3], SockFilter::jump(JEQ_K, OPEN as u32, 0, 1));
    assert_eq!(insns[4], SockFilter::stmt(RET_K, Verdict::Trace(1).to_ret()));
    assert_eq!(insns[7], SockFilter::stmt(RET_K, Verdict::Allow.to_ret()));
    // The x86_64 guard lands on the i386 guard.
    assert_eq!(insns[1 + 1 + 6], SockFilter::stmt(LD_W_ABS, SECCOMP_DATA_ARCH));
    assert_eq!(insns[14], SockFilter::stmt(RET_K, SECCOMP_RET_KILL));
}

#[test]
fn test_corrupted_count_aborts_section()
{
    let mut assembler = FilterAssembler::new();
    assembler.start_arch_section(AuditArch::X86_64, 2).unwrap();
    assembler.add_trace_syscall(OPEN, 1).unwrap();
    assembler.add_trace_syscall(OPENAT, 2).unwrap();

    let result = assembler.end_arch_section(3);

    match result {
        Err(error @ TetherError::FilterTooLarge(_)) => assert!(error.is_caller_defect()),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_correct_counts_pass_for_each_section()
{
    let mut assembler = FilterAssembler::new();
    for filter in &FILTERS[..2] {
        let traced = filter.traced_count();
        assembler.start_arch_section(filter.architecture, traced).unwrap();
        for syscall in filter.traced() {
            assembler.add_trace_syscall(syscall.value, syscall.flag).unwrap();
        }
        assembler.end_arch_section(traced).unwrap();
    }
    assert_eq!(assembler.finish().unwrap(), assemble(&FILTERS).unwrap());
}

#[test]
fn test_traced_syscall_returns_its_flag()
{
    let program = assemble(&FILTERS).unwrap();

    assert_eq!(verdict(&program, AuditArch::X86_64, OPEN), Verdict::Trace(1));
    assert_eq!(verdict(&program, AuditArch::X86_64, OPENAT), Verdict::Trace(2));
    assert_eq!(verdict(&program, AuditArch::I386, EXECVE_I386), Verdict::Trace(3));
}

#[test]
fn test_untraced_syscall_is_allowed()
{
    let program = assemble(&FILTERS).unwrap();

    assert_eq!(verdict(&program, AuditArch::X86_64, OPEN + 1), Verdict::Allow);
    assert_eq!(verdict(&program, AuditArch::X86_64, OPENAT + 1), Verdict::Allow);
    // Traced on x86_64 only.
    assert_eq!(verdict(&program, AuditArch::I386, OPENAT), Verdict::Allow);
}

#[test]
fn test_unknown_architecture_is_killed()
{
    let program = assemble(&FILTERS).unwrap();

    assert_eq!(verdict(&program, AuditArch::AARCH64, OPEN), Verdict::Kill);
    assert_eq!(verdict(&program, AuditArch::ARM, EXECVE_I386), Verdict::Kill);
}

#[test]
fn test_architecture_with_no_traced_syscalls_allows_everything()
{
    let filters = [ArchFilter::new(AuditArch::ARM, &[FilteredSyscall::UNTRACED]), ArchFilter::END];
    let program = assemble(&filters).unwrap();

    assert_eq!(program.len(), 3 + 1 + 1);
    assert_eq!(verdict(&program, AuditArch::ARM, 0), Verdict::Allow);
    assert_eq!(verdict(&program, AuditArch::X86_64, 0), Verdict::Kill);
}

#[test]
fn test_syscall_number_wider_than_operand()
{
    let syscalls = [FilteredSyscall::traced(i64::from(u32::MAX) + 1, 0)];
    let filters = [ArchFilter::new(AuditArch::X86_64, &syscalls)];

    assert!(matches!(assemble(&filters), Err(TetherError::FilterTooLarge(_))));
}

#[test]
fn test_section_longer_than_jump_range()
{
    let syscalls: Vec<FilteredSyscall> = (0..200).map(|nr| FilteredSyscall::traced(nr, 0)).collect();
    let filters = [ArchFilter::new(AuditArch::X86_64, &syscalls), ArchFilter::END];

    assert!(matches!(assemble(&filters), Err(TetherError::FilterTooLarge(_))));
}

#[test]
fn test_largest_section_that_fits()
{
    let syscalls: Vec<FilteredSyscall> = (0..126).map(|nr| FilteredSyscall::traced(nr, 0)).collect();
    let filters = [ArchFilter::new(AuditArch::X86_64, &syscalls), ArchFilter::END];
    let program = assemble(&filters).unwrap();

    program.validate().unwrap();
    assert_eq!(verdict(&program, AuditArch::X86_64, 125), Verdict::Trace(0));
    assert_eq!(verdict(&program, AuditArch::I386, 125), Verdict::Kill);
}

/// Records what would have been installed
#[derive(Default)]
struct RecordingInstaller
{
    installed: RefCell<Vec<BpfProgram>>,
    restricted: RefCell<usize>,
    reject_after: Option<usize>,
}

impl FilterInstaller for RecordingInstaller
{
    fn restrict_privileges(&self) -> TetherResult<()>
    {
        *self.restricted.borrow_mut() += 1;
        Ok(())
    }

    fn install(&self, program: &BpfProgram) -> TetherResult<()>
    {
        if self.reject_after == Some(self.installed.borrow().len()) {
            return Err(TetherError::InstallRejected {
                operation: "PR_SET_SECCOMP",
                source: io::Error::from_raw_os_error(libc::EACCES),
            });
        }
        self.installed.borrow_mut().push(program.clone());
        Ok(())
    }
}

#[test]
fn test_extensions_are_stacked_in_order()
{
    let extension_syscalls = [FilteredSyscall::traced(OPEN, 9), FilteredSyscall::END];
    let extension = [ArchFilter::new(AuditArch::X86_64, &extension_syscalls), ArchFilter::END];
    let installer = RecordingInstaller::default();

    enable_syscall_filtering(&installer, &FILTERS, &[&extension]).unwrap();

    let installed = installer.installed.borrow();
    assert_eq!(installed.len(), 2);
    assert_eq!(*installer.restricted.borrow(), 2);
    assert_eq!(installed[0], assemble(&FILTERS).unwrap());
    assert_eq!(installed[1], assemble(&extension).unwrap());

    // The kernel evaluates the newest filter first.
    let data = SeccompData::new(AuditArch::X86_64, OPEN as i32);
    let verdicts = installed.iter().rev().map(|program| evaluate(program, &data).unwrap());
    assert_eq!(combine(verdicts), Some(Verdict::Trace(9)));

    let data = SeccompData::new(AuditArch::X86_64, OPENAT as i32);
    let verdicts = installed.iter().rev().map(|program| evaluate(program, &data).unwrap());
    assert_eq!(combine(verdicts), Some(Verdict::Trace(2)));
}

#[test]
fn test_extension_assembly_failure_installs_nothing()
{
    let negative_syscalls = [FilteredSyscall::traced(-1_i64 << 40, 0)];
    let wide = [FilteredSyscall::traced(1_i64 << 40, 0)];
    let extension = [ArchFilter::new(AuditArch::X86_64, &wide)];
    let installer = RecordingInstaller::default();

    let result = enable_syscall_filtering(&installer, &FILTERS, &[&extension]);

    assert!(matches!(result, Err(TetherError::FilterTooLarge(_))));
    assert!(installer.installed.borrow().is_empty());
    // Negative values are never traced, so they cannot overflow the operand.
    let negative = [ArchFilter::new(AuditArch::X86_64, &negative_syscalls)];
    assert!(assemble(&negative).is_ok());
}

#[test]
fn test_rejection_is_reported_not_retried()
{
    let programs = prepare_syscall_filtering(&FILTERS, &[&FILTERS]).unwrap();
    let installer = RecordingInstaller {
        reject_after: Some(1),
        ..RecordingInstaller::default()
    };

    let result = install_prepared(&installer, &programs);

    assert!(matches!(result, Err(TetherError::InstallRejected { .. })));
    assert_eq!(installer.installed.borrow().len(), 1);
    assert_eq!(*installer.restricted.borrow(), 2);
}
