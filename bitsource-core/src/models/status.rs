use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Status bit mask for a data source.
///
/// Bits are independent and may be combined. The numeric values are a wire
/// contract shared with existing bindings and must not change.
///
/// `GENERAL_ERROR` is derived: it is set whenever any of `BUSY`, `NO_DEVICE`,
/// `READ_ERROR` or `CANT_PROCESS` is set (see [`StatusFlags::with_derived`]).
/// When `INVALID` is set the handle no longer maps to a live source and all
/// other bits should be ignored.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusFlags(u32);

impl StatusFlags {
    /// No flags set. The device is fine.
    pub const GOOD: Self = Self(0x0000);
    /// Device connection is being established.
    pub const CONNECTING: Self = Self(0x0001);
    /// Waiting for device data (buffer empty).
    pub const WAITING: Self = Self(0x0002);
    /// Device is in use by another process.
    pub const BUSY: Self = Self(0x0004);
    /// Device is no longer connected.
    pub const NO_DEVICE: Self = Self(0x0008);
    /// The last device read failed.
    pub const READ_ERROR: Self = Self(0x0010);
    /// Device configuration was rejected.
    pub const BAD_CONFIG: Self = Self(0x0020);
    /// Device output could not be processed.
    pub const CANT_PROCESS: Self = Self(0x0040);
    /// Device initialization failed.
    pub const INIT_ERROR: Self = Self(0x0080);
    /// The reader timed out waiting for device data.
    pub const TIMEOUT: Self = Self(0x0100);
    /// The handle does not refer to a live source.
    pub const INVALID: Self = Self(0x0200);
    /// Summary bit, derived from the error bits above.
    pub const GENERAL_ERROR: Self = Self(0x8000);

    const GENERAL_ERROR_SOURCES: Self =
        Self(Self::BUSY.0 | Self::NO_DEVICE.0 | Self::READ_ERROR.0 | Self::CANT_PROCESS.0);

    const TRANSIENT: Self = Self(Self::CONNECTING.0 | Self::WAITING.0 | Self::BUSY.0);

    const DEVICE_FATAL: Self = Self(
        Self::NO_DEVICE.0
            | Self::READ_ERROR.0
            | Self::INIT_ERROR.0
            | Self::TIMEOUT.0
            | Self::CANT_PROCESS.0,
    );

    const USAGE: Self = Self(Self::BAD_CONFIG.0 | Self::INVALID.0);

    const NAMED: [(Self, &'static str); 11] = [
        (Self::CONNECTING, "CONNECTING"),
        (Self::WAITING, "WAITING"),
        (Self::BUSY, "BUSY"),
        (Self::NO_DEVICE, "NO_DEVICE"),
        (Self::READ_ERROR, "READ_ERROR"),
        (Self::BAD_CONFIG, "BAD_CONFIG"),
        (Self::CANT_PROCESS, "CANT_PROCESS"),
        (Self::INIT_ERROR, "INIT_ERROR"),
        (Self::TIMEOUT, "TIMEOUT"),
        (Self::INVALID, "INVALID"),
        (Self::GENERAL_ERROR, "GENERAL_ERROR"),
    ];

    /// Builds a mask from raw bits as received over a binding boundary.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_good(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when any bit of `other` is set in `self`.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub const fn is_invalid(self) -> bool {
        self.contains(Self::INVALID)
    }

    /// True when a device-fatal condition is present. Blocking reads stop
    /// waiting once this holds.
    pub const fn is_device_fatal(self) -> bool {
        self.intersects(Self::DEVICE_FATAL)
    }

    /// Recomputes the derived `GENERAL_ERROR` bit from the other error bits.
    pub const fn with_derived(self) -> Self {
        let base = self.0 & !Self::GENERAL_ERROR.0;
        if base & Self::GENERAL_ERROR_SOURCES.0 != 0 {
            Self(base | Self::GENERAL_ERROR.0)
        } else {
            Self(base)
        }
    }

    /// Sorts a status into the caller-facing error taxonomy.
    ///
    /// Usage errors win over device faults, which win over transient
    /// conditions.
    pub const fn classify(self) -> StatusClass {
        if self.intersects(Self::USAGE) {
            StatusClass::Usage
        } else if self.intersects(Self::DEVICE_FATAL) {
            StatusClass::DeviceFatal
        } else if self.intersects(Self::TRANSIENT) {
            StatusClass::Transient
        } else {
            StatusClass::Good
        }
    }
}

/// How a caller should react to a status value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    /// Nothing to do.
    Good,
    /// Retry or poll later.
    Transient,
    /// Close the source; reopening may or may not work.
    DeviceFatal,
    /// Programmer error: stale handle or bad configuration.
    Usage,
}

impl BitOr for StatusFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for StatusFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for StatusFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_good() {
            return f.write_str("GOOD");
        }
        let mut first = true;
        for (flag, name) in Self::NAMED {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        let unknown = self.0 & !Self::NAMED.iter().fold(0, |acc, (flag, _)| acc | flag.0);
        if unknown != 0 {
            if !first {
                f.write_str(" | ")?;
            }
            write!(f, "{unknown:#06x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatusFlags({:#06x}: {})", self.0, self)
    }
}
