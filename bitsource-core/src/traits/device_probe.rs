use crate::models::device::DeviceDescriptor;
use crate::models::error::{DeviceFault, SourceError};

/// Interface to the physical transport that discovers and reads random-bit
/// devices.
///
/// Implemented by:
/// - `SimulatedProbe` (this crate)
/// - `HwRngProbe` (`bitsource-hwrng`, Unix character devices)
///
/// A registry shares one probe between all of its sources, and each open
/// source calls it from its own feeder thread, so implementations must be
/// thread-safe. `probe` may block briefly (hundreds of milliseconds).
pub trait DeviceProbe: Send + Sync {
    /// List the devices currently attached.
    fn probe(&self) -> Result<Vec<DeviceDescriptor>, SourceError>;

    /// Whether another process holds the device exclusively.
    fn is_exclusively_held(&self, descriptor: &DeviceDescriptor) -> bool;

    /// Take exclusive access to the device before reading.
    fn acquire(&self, _descriptor: &DeviceDescriptor) -> Result<(), DeviceFault> {
        Ok(())
    }

    /// Read up to `max_bytes` raw bytes. An empty result means no data yet.
    /// Should return promptly; `close()` waits for an in-flight read.
    fn raw_read(
        &self,
        descriptor: &DeviceDescriptor,
        max_bytes: usize,
    ) -> Result<Vec<u8>, DeviceFault>;

    /// Give up exclusive access so other processes may acquire the device.
    fn release(&self, _descriptor: &DeviceDescriptor) {}
}
