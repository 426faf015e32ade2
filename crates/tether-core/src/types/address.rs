//! Memory address and machine word types.

use std::fmt;
use std::ops::{Add, Sub};

/// A machine word as transferred by the debugging interface
///
/// `ptrace(2)` peeks and pokes exactly one `unsigned long` at a time, so
/// this is 8 bytes on 64-bit Linux and 4 bytes on 32-bit Linux.
pub type Word = libc::c_ulong;

/// Size in bytes of a [`Word`].
pub const WORD_SIZE: usize = std::mem::size_of::<Word>();

/// Strongly typed address in the traced process
///
/// This wrapper around `u64` keeps addresses in the *traced* process apart
/// from sizes, counts, and addresses in our own address space.
///
/// ## Example
///
/// ```rust
/// use tether_core::types::Address;
///
/// let addr = Address::from(0x1000);
/// let next_addr = addr + 0x100; // Add offset
/// assert_eq!(next_addr.value(), 0x1100);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    ///
    /// This is equivalent to `Address::from(value)` but can be used in const contexts.
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Add an offset to this address, checking for overflow
    ///
    /// ## Example
    ///
    /// ```rust
    /// use tether_core::types::Address;
    ///
    /// let addr = Address::from(0x1000);
    /// assert_eq!(addr.checked_add(0x100), Some(Address::from(0x1100)));
    /// assert_eq!(addr.checked_add(u64::MAX), None); // Overflow
    /// ```
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Subtract an offset from this address, checking for underflow
    pub fn checked_sub(self, offset: u64) -> Option<Self>
    {
        self.0.checked_sub(offset).map(Address)
    }

    /// Address of the `index`-th word starting at this address
    ///
    /// Word addresses wrap like the pointer arithmetic the kernel performs;
    /// an unmapped result surfaces as a tracer fault, not here.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use tether_core::types::{Address, WORD_SIZE};
    ///
    /// let base = Address::from(0x1000);
    /// assert_eq!(base.word(2).value(), 0x1000 + 2 * WORD_SIZE as u64);
    /// ```
    pub fn word(self, index: usize) -> Self
    {
        self + (index * WORD_SIZE) as u64
    }

    /// Whether this address is aligned to a machine word.
    pub const fn is_word_aligned(self) -> bool
    {
        self.0 % WORD_SIZE as u64 == 0
    }

    /// The address as the `void *` expected by `ptrace(2)`.
    pub(crate) fn as_ptr(self) -> *mut libc::c_void
    {
        self.0 as usize as *mut libc::c_void
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}
