use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque token naming a source in a [`SourceRegistry`](crate::SourceRegistry).
///
/// A handle carries the registry epoch it was issued in, so a handle that
/// outlives a `clear()` no longer resolves and reports `INVALID` instead of
/// aliasing a newer source. It grants no ownership of the source.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceHandle(u64);

impl SourceHandle {
    /// The distinguished "no source" value.
    pub const INVALID: Self = Self(u64::MAX);

    pub(crate) fn new(epoch: u32, slot: u32) -> Self {
        Self((u64::from(epoch) << 32) | u64::from(slot))
    }

    /// Rebuilds a handle from a token previously obtained via [`into_raw`](Self::into_raw).
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn into_raw(self) -> u64 {
        self.0
    }

    pub fn is_invalid(&self) -> bool {
        *self == Self::INVALID
    }

    pub(crate) fn epoch(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub(crate) fn slot(&self) -> usize {
        (self.0 & u64::from(u32::MAX)) as usize
    }
}

impl Default for SourceHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            f.write_str("SourceHandle(INVALID)")
        } else {
            write!(f, "SourceHandle({}:{})", self.epoch(), self.slot())
        }
    }
}
