//! Tests for platform-agnostic types

use tether_core::platform::linux::registers::{RegisterLayout, ARM, I386, X86_64};
use tether_core::types::{Address, ProcessId, SysArg, WORD_SIZE};

#[test]
fn test_process_id_from_u32()
{
    let pid = ProcessId::from(12345);
    assert_eq!(pid.0, 12345);
    assert_eq!(pid.as_raw(), 12345);
}

#[test]
fn test_process_id_to_u32()
{
    let pid = ProcessId::from(54321);
    let value: u32 = pid.into();
    assert_eq!(value, 54321);
}

#[test]
fn test_process_id_display()
{
    assert_eq!(format!("{}", ProcessId(7)), "7");
}

#[test]
fn test_address_word_steps()
{
    let base = Address::from(0x1000);
    assert_eq!(base.word(0), base);
    assert_eq!(base.word(3), Address::from(0x1000 + 3 * WORD_SIZE as u64));
    assert!(base.is_word_aligned());
    assert!(!Address::from(0x1003).is_word_aligned());
}

#[test]
fn test_address_checked_arithmetic()
{
    assert_eq!(Address::from(0x10).checked_sub(0x20), None);
    assert_eq!(Address::from(u64::MAX).checked_add(1), None);
    assert_eq!(Address::from(0x10).checked_add(0x10), Some(Address::from(0x20)));
    assert_eq!(Address::ZERO.value(), 0);
}

#[test]
fn test_address_display()
{
    assert_eq!(format!("{}", Address::from(0xdead_beef)), "0x00000000deadbeef");
}

#[test]
fn test_sysarg_indices_are_contiguous()
{
    for (index, slot) in SysArg::ALL.into_iter().enumerate() {
        assert_eq!(slot.index(), index);
        assert_eq!(SysArg::try_from(index).unwrap(), slot);
    }
    assert_eq!(SysArg::ARGUMENTS.len(), 6);
    assert_eq!(SysArg::ARGUMENTS[0], SysArg::Arg1);
}

#[test]
fn test_sysarg_display()
{
    assert_eq!(SysArg::Num.to_string(), "num");
    assert_eq!(SysArg::Arg3.to_string(), "arg3");
    assert_eq!(SysArg::Result.to_string(), "result");
}

#[test]
fn test_layout_offsets()
{
    assert_eq!(X86_64.offset(SysArg::Num).unwrap(), 120);
    assert_eq!(X86_64.offset(SysArg::Arg1).unwrap(), 112);
    assert_eq!(X86_64.stack_pointer, 152);
    assert_eq!(I386.offset(SysArg::Arg1).unwrap(), 0);
    assert_eq!(I386.offset(SysArg::Num).unwrap(), 44);
    assert_eq!(ARM.offset(SysArg::Num).unwrap(), 28);
    assert_eq!(ARM.offset(SysArg::Arg1).unwrap(), ARM.offset(SysArg::Result).unwrap());
}

#[test]
fn test_native_layout()
{
    let native = RegisterLayout::native();
    if cfg!(any(target_arch = "x86_64", target_arch = "x86", target_arch = "arm")) {
        let layout = native.unwrap();
        assert_eq!(layout.word_size, WORD_SIZE);
        assert!(RegisterLayout::require_native().is_ok());
    } else {
        assert!(native.is_none());
        assert!(RegisterLayout::require_native().is_err());
    }
}
