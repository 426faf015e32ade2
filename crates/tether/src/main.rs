use std::process;

use clap::{Parser, Subcommand};
use tether_core::filter::{assemble, evaluate, ArchFilter, AuditArch, FilteredSyscall, SeccompData};
#[cfg(target_os = "linux")]
use tether_core::{Address, ProcessId, Ptrace, SysArg, TraceeAccessor, Word};
use tether_utils::{info, init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingError, LoggingGuard};

/// Run programs under a ptrace supervisor that only stops on the syscalls it asked for.
#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(version)]
#[command(about = "Seccomp-assisted syscall supervision", long_about = None)]
struct Cli
{
    /// Log level (overrides RUST_LOG)
    #[arg(long, global = true, value_parser = parse_log_level)]
    log_level: Option<LogLevel>,

    /// Log format: pretty or json (overrides TETHER_LOG_FORMAT)
    #[arg(long, global = true, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Assemble a filter and print its instructions
    Filter
    {
        /// Syscall number to trace (repeatable; negative numbers are listed but not traced)
        #[arg(short, long = "syscall", required = true, allow_negative_numbers = true)]
        syscalls: Vec<i64>,
        /// Data returned to the tracer when a listed syscall stops
        #[arg(short, long, default_value_t = 0)]
        flag: u16,
        /// Architecture the section applies to (x86_64, i386, arm, aarch64, riscv64, native)
        #[arg(short, long, default_value = "native")]
        arch: String,
        /// Evaluate the program for this syscall number and print the verdict
        #[arg(long)]
        probe: Option<i64>,
    },
    /// Launch a program and report every traced syscall it makes
    Run
    {
        /// Syscall number to trace (repeatable)
        #[arg(short, long = "syscall", required = true)]
        syscalls: Vec<i64>,
        /// Also decode this argument slot (1-6) as a C string
        #[arg(long, value_name = "SLOT")]
        string_arg: Option<usize>,
        /// Program to launch (looked up in PATH)
        program: String,
        /// Arguments to pass to the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn parse_log_level(value: &str) -> Result<LogLevel, LoggingError>
{
    value.parse()
}

fn parse_log_format(value: &str) -> Result<LogFormat, LoggingError>
{
    value.parse()
}

fn start_logging(cli: &Cli) -> Result<LoggingGuard, LoggingError>
{
    if cli.log_level.is_none() && cli.log_format.is_none() {
        // Reads RUST_LOG, TETHER_LOG_FORMAT and TETHER_LOG_FILE
        return init_logging();
    }
    init_logging_with_level(cli.log_level.unwrap_or(LogLevel::Info), cli.log_format.unwrap_or_default())
}

fn main()
{
    let cli = Cli::parse();

    let guard = match start_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    let code = match run_command(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    };

    // Flush file logging before exiting
    drop(guard);
    process::exit(code);
}

fn run_command(cli: Cli) -> Result<i32, Box<dyn std::error::Error>>
{
    match cli.command {
        Commands::Filter {
            syscalls,
            flag,
            arch,
            probe,
        } => {
            print_filter(&syscalls, flag, &arch, probe)?;
            Ok(0)
        }
        Commands::Run {
            syscalls,
            string_arg,
            program,
            args,
        } => run_traced(&program, &args, &syscalls, string_arg),
    }
}

/// The syscall table for one architecture, each entry flagged with `flag`.
fn syscall_table<F>(syscalls: &[i64], flag: F) -> Result<Vec<FilteredSyscall>, Box<dyn std::error::Error>>
where
    F: Fn(usize) -> Result<u16, Box<dyn std::error::Error>>,
{
    let mut table = Vec::with_capacity(syscalls.len() + 1);
    for (index, &value) in syscalls.iter().enumerate() {
        table.push(FilteredSyscall::traced(value, flag(index)?));
    }
    table.push(FilteredSyscall::END);
    Ok(table)
}

fn print_filter(syscalls: &[i64], flag: u16, arch: &str, probe: Option<i64>) -> Result<(), Box<dyn std::error::Error>>
{
    let architecture = AuditArch::by_name(arch).ok_or_else(|| format!("unknown architecture: {arch}"))?;
    let table = syscall_table(syscalls, |_| Ok(flag))?;
    let filters = [ArchFilter::new(architecture, &table), ArchFilter::END];

    let program = assemble(&filters)?;
    info!("Assembled {} instructions for {arch} ({architecture})", program.len());

    println!("{:>4}  {{ code,  jt,  jf, k }}", "#");
    for (index, insn) in program.instructions().iter().enumerate() {
        println!("{index:>4}  {insn}");
    }

    if let Some(nr) = probe {
        let nr = i32::try_from(nr).map_err(|_| format!("probe syscall {nr} does not fit seccomp_data.nr"))?;
        let verdict = evaluate(&program, &SeccompData::new(architecture, nr))?;
        println!("syscall {nr} on {arch}: {verdict}");
    }

    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn run_traced(
    _program: &str,
    _args: &[String],
    _syscalls: &[i64],
    _string_arg: Option<usize>,
) -> Result<i32, Box<dyn std::error::Error>>
{
    Err("`tether run` requires Linux (ptrace and seccomp)".into())
}

#[cfg(target_os = "linux")]
fn run_traced(
    program: &str,
    args: &[String],
    syscalls: &[i64],
    string_arg: Option<usize>,
) -> Result<i32, Box<dyn std::error::Error>>
{
    use std::collections::HashSet;

    use tether_core::filter::{install_prepared, prepare_syscall_filtering, SeccompInstaller};
    use tether_core::platform::linux::launch::{resume, spawn_traced, wait_event, TraceEvent, SIGSTOP};
    use tether_core::platform::linux::RegisterLayout;
    use tether_utils::{debug, warn};

    let architecture = AuditArch::native().ok_or("no audit architecture for this target")?;
    let layout = RegisterLayout::require_native()?;
    let string_slot = string_arg.map(SysArg::try_from).transpose()?;

    // The flag carries the rule index back to the supervisor
    let table = syscall_table(syscalls, |index| {
        u16::try_from(index).map_err(|_| "too many syscalls for a 16-bit rule index".into())
    })?;
    let filters = [ArchFilter::new(architecture, &table), ArchFilter::END];

    // Assemble before fork: the child only makes the prctl calls
    let programs = prepare_syscall_filtering(&filters, &[])?;
    let installer = SeccompInstaller::new();
    let child = spawn_traced(program, args, || install_prepared(&installer, &programs))?;
    info!("Tracing {program} as PID {child}");

    let accessor = TraceeAccessor::new(Ptrace::new(), layout);
    let mut known = HashSet::from([child]);
    resume(child, 0)?;

    loop {
        match wait_event()? {
            TraceEvent::Exited(pid, code) => {
                debug!("PID {pid} exited with {code}");
                if pid == child {
                    return Ok(code);
                }
                known.remove(&pid);
            }
            TraceEvent::Signaled(pid, signal) => {
                debug!("PID {pid} killed by signal {signal}");
                if pid == child {
                    return Ok(128 + signal);
                }
                known.remove(&pid);
            }
            TraceEvent::Seccomp(pid, rule) => {
                known.insert(pid);
                match accessor.read_arguments(pid) {
                    Ok(arguments) => report_syscall(&accessor, pid, rule, &arguments, string_slot),
                    Err(e) => warn!("Could not read arguments of PID {pid}: {e}"),
                }
                resume(pid, 0)?;
            }
            TraceEvent::Event(pid, event) => {
                debug!("PID {pid} reported ptrace event {event}");
                known.insert(pid);
                resume(pid, 0)?;
            }
            TraceEvent::Signal(pid, signal) => {
                // A new child's initial stop is ours, not the program's
                let signal = if signal == SIGSTOP && known.insert(pid) { 0 } else { signal };
                resume(pid, signal)?;
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn report_syscall(
    accessor: &TraceeAccessor<'_, Ptrace>,
    pid: ProcessId,
    rule: u16,
    arguments: &[Word; 6],
    string_slot: Option<SysArg>,
)
{
    let number = accessor
        .read_argument(pid, SysArg::Num)
        .map_or_else(|_| "?".to_string(), |nr| nr.to_string());
    let formatted: Vec<String> = arguments.iter().map(|arg| format!("{arg:#x}")).collect();
    eprintln!("[{pid}] syscall {number}({}) rule {rule}", formatted.join(", "));

    let Some(slot) = string_slot else {
        return;
    };
    let mut buf = vec![0u8; 4096];
    let result = accessor
        .read_argument(pid, slot)
        .and_then(|pointer| accessor.read_cstring(pid, Address::from(pointer as u64), &mut buf));
    match result {
        Ok(read) => {
            let ellipsis = if read.is_truncated() { "..." } else { "" };
            eprintln!("[{pid}]     {slot} = {:?}{ellipsis}", String::from_utf8_lossy(read.bytes(&buf)));
        }
        Err(e) => tether_utils::warn!("Could not read {slot} of PID {pid} as a string: {e}"),
    }
}
