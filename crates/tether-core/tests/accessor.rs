//! Tests for the remote process accessor against an in-memory process

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;

use tether_core::accessor::TraceeAccessor;
use tether_core::error::{TetherError, TetherResult};
use tether_core::platform::linux::registers::X86_64;
use tether_core::tracer::WordTracer;
use tether_core::types::{Address, ProcessId, SysArg, Word, WORD_SIZE};

const BASE: u64 = 0x10_000;
const SIZE: usize = 256;
const FILL: u8 = 0xaa;
const PID: ProcessId = ProcessId(4242);

/// A stopped process with one mapped region and a register area
struct FakeTracer
{
    memory: RefCell<Vec<u8>>,
    user: RefCell<HashMap<usize, Word>>,
    peeks: Cell<usize>,
    pokes: Cell<usize>,
}

impl FakeTracer
{
    fn new() -> Self
    {
        Self {
            memory: RefCell::new(vec![FILL; SIZE]),
            user: RefCell::new(HashMap::new()),
            peeks: Cell::new(0),
            pokes: Cell::new(0),
        }
    }

    fn range(&self, pid: ProcessId, addr: Address, operation: &'static str) -> TetherResult<usize>
    {
        let start = addr.value().checked_sub(BASE).map(|offset| offset as usize);
        match start {
            Some(start) if pid == PID && start + WORD_SIZE <= SIZE => Ok(start),
            _ => Err(TetherError::TracerFault {
                operation,
                pid: pid.0,
                source: io::Error::from_raw_os_error(libc::EIO),
            }),
        }
    }

    fn load(&self, at: usize, bytes: &[u8])
    {
        self.memory.borrow_mut()[at..at + bytes.len()].copy_from_slice(bytes);
    }

    fn byte(&self, at: usize) -> u8
    {
        self.memory.borrow()[at]
    }
}

impl WordTracer for FakeTracer
{
    fn peek_user(&self, pid: ProcessId, offset: usize) -> TetherResult<Word>
    {
        if pid != PID {
            return Err(TetherError::TracerFault {
                operation: "PEEKUSER",
                pid: pid.0,
                source: io::Error::from_raw_os_error(libc::ESRCH),
            });
        }
        Ok(self.user.borrow().get(&offset).copied().unwrap_or(0))
    }

    fn poke_user(&self, pid: ProcessId, offset: usize, value: Word) -> TetherResult<()>
    {
        if pid != PID {
            return Err(TetherError::TracerFault {
                operation: "POKEUSER",
                pid: pid.0,
                source: io::Error::from_raw_os_error(libc::ESRCH),
            });
        }
        self.user.borrow_mut().insert(offset, value);
        Ok(())
    }

    fn peek_data(&self, pid: ProcessId, addr: Address) -> TetherResult<Word>
    {
        let start = self.range(pid, addr, "PEEKDATA")?;
        self.peeks.set(self.peeks.get() + 1);
        let mut raw = [0u8; WORD_SIZE];
        raw.copy_from_slice(&self.memory.borrow()[start..start + WORD_SIZE]);
        Ok(Word::from_ne_bytes(raw))
    }

    fn poke_data(&self, pid: ProcessId, addr: Address, value: Word) -> TetherResult<()>
    {
        let start = self.range(pid, addr, "POKEDATA")?;
        self.pokes.set(self.pokes.get() + 1);
        self.memory.borrow_mut()[start..start + WORD_SIZE].copy_from_slice(&value.to_ne_bytes());
        Ok(())
    }
}

fn at(offset: usize) -> Address
{
    Address::from(BASE + offset as u64)
}

#[test]
fn test_argument_round_trip()
{
    let fake = FakeTracer::new();
    let accessor = TraceeAccessor::new(&fake, &X86_64);

    for (index, slot) in SysArg::ALL.into_iter().enumerate() {
        accessor.write_argument(PID, slot, 0x100 + index as Word).unwrap();
    }
    for (index, slot) in SysArg::ALL.into_iter().enumerate() {
        assert_eq!(accessor.read_argument(PID, slot).unwrap(), 0x100 + index as Word, "{slot}");
    }
    assert_eq!(accessor.read_arguments(PID).unwrap(), [0x101, 0x102, 0x103, 0x104, 0x105, 0x106]);
}

#[test]
fn test_argument_lands_at_layout_offset()
{
    let fake = FakeTracer::new();
    let accessor = TraceeAccessor::new(&fake, &X86_64);

    accessor.write_argument(PID, SysArg::Arg4, 0xdead).unwrap();
    // r10
    assert_eq!(fake.user.borrow().get(&56), Some(&0xdead));
}

#[test]
fn test_invalid_slot_is_rejected_before_access()
{
    assert!(matches!(SysArg::try_from(SysArg::COUNT), Err(TetherError::InvalidSlot(8))));
    assert!(SysArg::try_from(SysArg::COUNT).unwrap_err().is_caller_defect());
}

#[test]
fn test_write_bytes_preserves_neighbours()
{
    let fake = FakeTracer::new();
    let accessor = TraceeAccessor::new(&fake, &X86_64);
    let payload: Vec<u8> = (1..=WORD_SIZE as u8 + 3).collect();

    accessor.write_bytes(PID, at(5), &payload).unwrap();

    for offset in 0..SIZE {
        let expected = if (5..5 + payload.len()).contains(&offset) { payload[offset - 5] } else { FILL };
        assert_eq!(fake.byte(offset), expected, "byte {offset}");
    }

    let mut back = vec![0u8; payload.len()];
    accessor.read_bytes(PID, at(5), &mut back).unwrap();
    assert_eq!(back, payload);
}

#[test]
fn test_write_bytes_whole_words_never_peek()
{
    let fake = FakeTracer::new();
    let accessor = TraceeAccessor::new(&fake, &X86_64);
    let payload = vec![0x11u8; WORD_SIZE * 2];

    accessor.write_bytes(PID, at(0), &payload).unwrap();

    assert_eq!(fake.peeks.get(), 0);
    assert_eq!(fake.pokes.get(), 2);
    assert_eq!(fake.byte(WORD_SIZE * 2), FILL);
}

#[test]
fn test_write_bytes_empty_is_noop()
{
    let fake = FakeTracer::new();
    let accessor = TraceeAccessor::new(&fake, &X86_64);

    accessor.write_bytes(PID, at(0), &[]).unwrap();

    assert_eq!(fake.peeks.get() + fake.pokes.get(), 0);
}

#[test]
fn test_read_cstring_length_includes_terminator()
{
    let fake = FakeTracer::new();
    fake.load(3, b"/etc/passwd\0");
    let accessor = TraceeAccessor::new(&fake, &X86_64);
    let mut buf = [0u8; 64];

    let read = accessor.read_cstring(PID, at(3), &mut buf).unwrap();

    assert_eq!(read.length, 12);
    assert!(!read.is_truncated());
    assert_eq!(read.bytes(&buf), b"/etc/passwd");
    assert!(read.copied >= read.length);
    assert!(read.copied <= buf.len());
}

#[test]
fn test_read_cstring_empty_string()
{
    let fake = FakeTracer::new();
    fake.load(0, b"\0");
    let accessor = TraceeAccessor::new(&fake, &X86_64);
    let mut buf = [0xffu8; 16];

    let read = accessor.read_cstring(PID, at(0), &mut buf).unwrap();

    assert_eq!(read.length, 1);
    assert_eq!(read.bytes(&buf), b"");
}

#[test]
fn test_read_cstring_truncates_at_cap()
{
    let fake = FakeTracer::new();
    fake.load(0, &[b'x'; 40]);
    let accessor = TraceeAccessor::new(&fake, &X86_64);
    let mut buf = [0u8; 13];

    let read = accessor.read_cstring(PID, at(0), &mut buf).unwrap();

    assert_eq!(read.length, 13);
    assert_eq!(read.copied, 13);
    assert!(read.is_truncated());
    assert_eq!(read.bytes(&buf), &[b'x'; 13]);
}

#[test]
fn test_read_cstring_terminator_at_cap()
{
    let fake = FakeTracer::new();
    fake.load(0, b"abcd\0");
    let accessor = TraceeAccessor::new(&fake, &X86_64);
    let mut buf = [0u8; 5];

    let read = accessor.read_cstring(PID, at(0), &mut buf).unwrap();

    assert_eq!(read.length, 5);
    assert!(!read.is_truncated());
    assert_eq!(read.bytes(&buf), b"abcd");
}

#[test]
fn test_read_cstring_fault_propagates()
{
    let fake = FakeTracer::new();
    let accessor = TraceeAccessor::new(&fake, &X86_64);
    let mut buf = [0u8; 16];

    let result = accessor.read_cstring(PID, Address::from(0x10), &mut buf);

    assert!(matches!(result, Err(TetherError::TracerFault { operation: "PEEKDATA", .. })));
}

#[test]
fn test_grow_stack_is_reversible()
{
    let fake = FakeTracer::new();
    let accessor = TraceeAccessor::new(&fake, &X86_64);
    fake.poke_user(PID, X86_64.stack_pointer, 0x7fff_1000).unwrap();

    let allocated = accessor.grow_stack(PID, 0x40).unwrap();
    assert_eq!(allocated, Address::from(0x7fff_0fc0));
    assert_eq!(accessor.stack_pointer(PID).unwrap(), allocated);

    let released = accessor.grow_stack(PID, -0x40).unwrap();
    assert_eq!(released, Address::from(0x7fff_1000));
}

#[test]
fn test_grow_stack_rejects_underflow_without_writing()
{
    let fake = FakeTracer::new();
    let accessor = TraceeAccessor::new(&fake, &X86_64);
    fake.poke_user(PID, X86_64.stack_pointer, 0x20).unwrap();

    let result = accessor.grow_stack(PID, 0x20);

    assert!(matches!(
        result,
        Err(TetherError::AddressOverflow {
            stack_pointer: 0x20,
            delta: 0x20
        })
    ));
    assert_eq!(accessor.stack_pointer(PID).unwrap(), Address::from(0x20));
}

#[test]
fn test_grow_stack_rejects_overflow()
{
    let fake = FakeTracer::new();
    let accessor = TraceeAccessor::new(&fake, &X86_64);
    fake.poke_user(PID, X86_64.stack_pointer, Word::MAX - 8).unwrap();

    assert!(matches!(accessor.grow_stack(PID, -8), Err(TetherError::AddressOverflow { .. })));
    assert!(matches!(accessor.grow_stack(PID, -16), Err(TetherError::AddressOverflow { .. })));
}

#[test]
fn test_allocate_then_copy_string()
{
    let fake = FakeTracer::new();
    let accessor = TraceeAccessor::new(&fake, &X86_64);
    fake.poke_user(PID, X86_64.stack_pointer, (BASE + 0x80) as Word).unwrap();

    let path = b"/tmp/redirected\0";
    let dest = accessor.grow_stack(PID, path.len() as isize).unwrap();
    accessor.write_bytes(PID, dest, path).unwrap();
    accessor.write_argument(PID, SysArg::Arg2, dest.value() as Word).unwrap();

    let pointer = accessor.read_argument(PID, SysArg::Arg2).unwrap();
    let mut buf = [0u8; 32];
    let read = accessor.read_cstring(PID, Address::from(pointer as u64), &mut buf).unwrap();
    assert_eq!(read.bytes(&buf), b"/tmp/redirected");
    assert_eq!(fake.byte(0x80), FILL);
}

#[test]
fn test_wrong_process_faults()
{
    let fake = FakeTracer::new();
    let accessor = TraceeAccessor::new(&fake, &X86_64);

    let result = accessor.read_argument(ProcessId(1), SysArg::Num);

    match result {
        Err(TetherError::TracerFault { operation, pid, source }) => {
            assert_eq!(operation, "PEEKUSER");
            assert_eq!(pid, 1);
            assert_eq!(source.raw_os_error(), Some(libc::ESRCH));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}
