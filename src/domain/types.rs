//! Newtype wrappers for addresses, handles and identifiers.
//!
//! Raw `u64`/`i32` values travel through a lot of signatures here; the
//! wrappers keep "address in the target module" and "opaque native handle"
//! from being mixed up at compile time.

use std::fmt;

/// An absolute address inside the instrumented process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub u64);

impl Address {
    pub const NULL: Address = Address(0);

    #[must_use]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Address `delta` bytes past `self`.
    #[must_use]
    pub fn add(self, delta: u64) -> Address {
        Address(self.0 + delta)
    }

    /// Byte distance from `base` to `self`. `base` must not be above `self`.
    #[must_use]
    pub fn offset_from(self, base: Address) -> u64 {
        self.0 - base.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Memory range of a loaded module in the process's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    pub start: u64,
    pub end: u64,
}

impl MemoryRange {
    /// Check if an address falls within this memory range
    #[must_use]
    pub fn contains(&self, addr: Address) -> bool {
        addr.0 >= self.start && addr.0 < self.end
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Opaque native object handle observed at a hook site.
///
/// The numeric value is the pointer the host passed through the hook; it is
/// only ever used as a map key, never dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JsonHandle(pub u64);

impl fmt::Display for JsonHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Identifier the host assigns to an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub i32);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "REQ:{}", self.0)
    }
}

/// The two in-game currency kinds whose update paths get intercepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurrencyKind {
    /// Earned currency (the host calls it "money").
    Soft,
    /// Premium currency (the host calls it "gold").
    Hard,
}

impl CurrencyKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            CurrencyKind::Soft => "soft",
            CurrencyKind::Hard => "hard",
        }
    }
}

impl fmt::Display for CurrencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
