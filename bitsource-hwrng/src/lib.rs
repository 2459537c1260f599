//! # bitsource-hwrng
//!
//! Unix hardware RNG backend for bitsource.
//!
//! Provides:
//! - `HwRngProbe`: `DeviceProbe` over hw_random character devices, with
//!   cross-process exclusivity via `flock`
//! - `DeviceScanner`: finds device nodes and the active kernel driver
//! - `permissions`: read-access check for device nodes
//!
//! ## Platform Requirements
//! - Linux or another Unix with `flock(2)`
//! - Read permission on the device node (usually root or the `rng` group)
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use bitsource_core::SourceRegistry;
//! use bitsource_hwrng::HwRngProbe;
//!
//! let registry = SourceRegistry::with_default_config(Arc::new(HwRngProbe::new()));
//! registry.enumerate()?;
//! let h = registry.get(0);
//! registry.open(h);
//! let bytes = registry.get_bytes(h, 32, true);
//! ```

#[cfg(unix)]
pub mod device_scanner;
#[cfg(unix)]
pub mod hwrng_probe;
#[cfg(unix)]
pub mod permissions;

#[cfg(unix)]
pub use device_scanner::DeviceScanner;
#[cfg(unix)]
pub use hwrng_probe::HwRngProbe;
