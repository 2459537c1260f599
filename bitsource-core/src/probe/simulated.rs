//! Simulated random-bit devices for running without hardware.
//!
//! Devices either produce seeded pseudo-random bytes or replay a scripted
//! byte sequence. Hooks let a test unplug devices, mark them as held by
//! another process, inject faults and pause production.

use std::collections::VecDeque;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::models::device::DeviceDescriptor;
use crate::models::error::{DeviceFault, SourceError};
use crate::traits::device_probe::DeviceProbe;

/// Device type reported by [`SimulatedProbe::with_devices`].
pub const SIMULATED_DEVICE_TYPE: &str = "REG-1 (simulated)";

enum DeviceOutput {
    Random(StdRng),
    Scripted(VecDeque<u8>),
}

struct SimulatedDevice {
    descriptor: DeviceDescriptor,
    attached: bool,
    held_elsewhere: bool,
    acquired: bool,
    producing: bool,
    output: DeviceOutput,
    acquire_fault: Option<DeviceFault>,
    read_fault: Option<DeviceFault>,
    reads: u64,
}

impl SimulatedDevice {
    fn new(descriptor: DeviceDescriptor, output: DeviceOutput) -> Self {
        Self {
            descriptor,
            attached: true,
            held_elsewhere: false,
            acquired: false,
            producing: true,
            output,
            acquire_fault: None,
            read_fault: None,
            reads: 0,
        }
    }
}

/// In-process [`DeviceProbe`] backed by simulated devices.
pub struct SimulatedProbe {
    seed: u64,
    devices: Mutex<Vec<SimulatedDevice>>,
    probe_failure: Mutex<Option<String>>,
}

impl SimulatedProbe {
    pub fn new() -> Self {
        Self::with_seed(0x5eed_0001)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            devices: Mutex::new(Vec::new()),
            probe_failure: Mutex::new(None),
        }
    }

    /// A probe with `count` pseudo-random devices named `SIM-0000`, `SIM-0001`, ...
    pub fn with_devices(count: usize) -> Self {
        let probe = Self::new();
        for index in 0..count {
            probe.add_device(SIMULATED_DEVICE_TYPE, format!("SIM-{:04}", index));
        }
        probe
    }

    /// Attach a device producing seeded pseudo-random bytes.
    pub fn add_device(
        &self,
        device_type: impl Into<String>,
        identity: impl Into<String>,
    ) -> DeviceDescriptor {
        let mut devices = self.devices.lock();
        let rng = StdRng::seed_from_u64(self.seed.wrapping_add(devices.len() as u64));
        let descriptor = DeviceDescriptor::new(device_type, identity);
        devices.push(SimulatedDevice::new(
            descriptor.clone(),
            DeviceOutput::Random(rng),
        ));
        descriptor
    }

    /// Attach a device that replays `bytes` and then goes quiet.
    pub fn add_scripted_device(
        &self,
        device_type: impl Into<String>,
        identity: impl Into<String>,
        bytes: &[u8],
    ) -> DeviceDescriptor {
        let descriptor = DeviceDescriptor::new(device_type, identity);
        self.devices.lock().push(SimulatedDevice::new(
            descriptor.clone(),
            DeviceOutput::Scripted(bytes.iter().copied().collect()),
        ));
        descriptor
    }

    /// Queue more output on a scripted device. Ignored for random devices.
    pub fn feed(&self, identity: &str, bytes: &[u8]) {
        self.with_device(identity, |device| {
            if let DeviceOutput::Scripted(queue) = &mut device.output {
                queue.extend(bytes.iter().copied());
            }
        });
    }

    /// Simulate unplugging. The device disappears from `probe()` and reads fail.
    pub fn detach(&self, identity: &str) {
        self.with_device(identity, |device| {
            device.attached = false;
            device.acquired = false;
        });
    }

    pub fn attach(&self, identity: &str) {
        self.with_device(identity, |device| device.attached = true);
    }

    /// Mark the device as exclusively held by some other process.
    pub fn set_held_elsewhere(&self, identity: &str, held: bool) {
        self.with_device(identity, |device| device.held_elsewhere = held);
    }

    /// Pause or resume output. A paused device returns empty reads.
    pub fn set_producing(&self, identity: &str, producing: bool) {
        self.with_device(identity, |device| device.producing = producing);
    }

    /// Make the next `acquire` of this device fail with `fault`.
    pub fn fail_acquire(&self, identity: &str, fault: DeviceFault) {
        self.with_device(identity, |device| device.acquire_fault = Some(fault));
    }

    /// Make the next `raw_read` of this device fail with `fault`.
    pub fn fail_next_read(&self, identity: &str, fault: DeviceFault) {
        self.with_device(identity, |device| device.read_fault = Some(fault));
    }

    /// Make every `probe()` call fail until cleared with `None`.
    pub fn fail_probe(&self, reason: Option<String>) {
        *self.probe_failure.lock() = reason;
    }

    pub fn is_acquired(&self, identity: &str) -> bool {
        self.with_device(identity, |device| device.acquired)
            .unwrap_or(false)
    }

    pub fn read_count(&self, identity: &str) -> u64 {
        self.with_device(identity, |device| device.reads)
            .unwrap_or(0)
    }

    fn with_device<R>(&self, identity: &str, f: impl FnOnce(&mut SimulatedDevice) -> R) -> Option<R> {
        let mut devices = self.devices.lock();
        devices
            .iter_mut()
            .find(|device| device.descriptor.identity == identity)
            .map(f)
    }
}

impl Default for SimulatedProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceProbe for SimulatedProbe {
    fn probe(&self) -> Result<Vec<DeviceDescriptor>, SourceError> {
        if let Some(reason) = self.probe_failure.lock().clone() {
            return Err(SourceError::ProbeFailed(reason));
        }
        Ok(self
            .devices
            .lock()
            .iter()
            .filter(|device| device.attached)
            .map(|device| device.descriptor.clone())
            .collect())
    }

    fn is_exclusively_held(&self, descriptor: &DeviceDescriptor) -> bool {
        self.with_device(&descriptor.identity, |device| {
            device.attached && device.held_elsewhere
        })
        .unwrap_or(false)
    }

    fn acquire(&self, descriptor: &DeviceDescriptor) -> Result<(), DeviceFault> {
        self.with_device(&descriptor.identity, |device| {
            if !device.attached {
                return Err(DeviceFault::NoDevice);
            }
            if device.held_elsewhere {
                return Err(DeviceFault::Busy);
            }
            if let Some(fault) = device.acquire_fault.take() {
                return Err(fault);
            }
            device.acquired = true;
            Ok(())
        })
        .unwrap_or(Err(DeviceFault::NoDevice))
    }

    fn raw_read(
        &self,
        descriptor: &DeviceDescriptor,
        max_bytes: usize,
    ) -> Result<Vec<u8>, DeviceFault> {
        self.with_device(&descriptor.identity, |device| {
            if !device.attached {
                return Err(DeviceFault::NoDevice);
            }
            if !device.acquired {
                return Err(DeviceFault::ReadError("device not acquired".into()));
            }
            if let Some(fault) = device.read_fault.take() {
                return Err(fault);
            }
            device.reads += 1;
            if !device.producing {
                return Ok(Vec::new());
            }
            match &mut device.output {
                DeviceOutput::Random(rng) => {
                    let mut bytes = vec![0u8; max_bytes];
                    rng.fill_bytes(&mut bytes);
                    Ok(bytes)
                }
                DeviceOutput::Scripted(queue) => {
                    let n = max_bytes.min(queue.len());
                    Ok(queue.drain(..n).collect())
                }
            }
        })
        .unwrap_or(Err(DeviceFault::NoDevice))
    }

    fn release(&self, descriptor: &DeviceDescriptor) {
        self.with_device(&descriptor.identity, |device| device.acquired = false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_lists_attached_devices() {
        let probe = SimulatedProbe::with_devices(3);
        probe.detach("SIM-0001");

        let ids: Vec<_> = probe
            .probe()
            .unwrap()
            .into_iter()
            .map(|d| d.identity)
            .collect();
        assert_eq!(ids, vec!["SIM-0000", "SIM-0002"]);
    }

    #[test]
    fn probe_failure_is_reported() {
        let probe = SimulatedProbe::with_devices(1);
        probe.fail_probe(Some("bus reset".into()));
        assert_eq!(
            probe.probe().unwrap_err(),
            SourceError::ProbeFailed("bus reset".into())
        );
        probe.fail_probe(None);
        assert_eq!(probe.probe().unwrap().len(), 1);
    }

    #[test]
    fn read_requires_acquire() {
        let probe = SimulatedProbe::new();
        let device = probe.add_device("REG-1", "A");

        assert!(matches!(
            probe.raw_read(&device, 4),
            Err(DeviceFault::ReadError(_))
        ));
        probe.acquire(&device).unwrap();
        assert_eq!(probe.raw_read(&device, 4).unwrap().len(), 4);
        probe.release(&device);
        assert!(!probe.is_acquired("A"));
    }

    #[test]
    fn same_seed_same_output() {
        let a = SimulatedProbe::with_seed(7);
        let b = SimulatedProbe::with_seed(7);
        let da = a.add_device("REG-1", "X");
        let db = b.add_device("REG-1", "X");
        a.acquire(&da).unwrap();
        b.acquire(&db).unwrap();

        assert_eq!(a.raw_read(&da, 32).unwrap(), b.raw_read(&db, 32).unwrap());
    }

    #[test]
    fn scripted_device_replays_then_goes_quiet() {
        let probe = SimulatedProbe::new();
        let device = probe.add_scripted_device("REG-1", "S", &[1, 2, 3]);
        probe.acquire(&device).unwrap();

        assert_eq!(probe.raw_read(&device, 2).unwrap(), vec![1, 2]);
        assert_eq!(probe.raw_read(&device, 2).unwrap(), vec![3]);
        assert!(probe.raw_read(&device, 2).unwrap().is_empty());

        probe.feed("S", &[4]);
        assert_eq!(probe.raw_read(&device, 2).unwrap(), vec![4]);
        assert_eq!(probe.read_count("S"), 4);
    }

    #[test]
    fn held_elsewhere_blocks_acquire() {
        let probe = SimulatedProbe::new();
        let device = probe.add_device("REG-1", "H");
        probe.set_held_elsewhere("H", true);

        assert!(probe.is_exclusively_held(&device));
        assert_eq!(probe.acquire(&device), Err(DeviceFault::Busy));
    }

    #[test]
    fn injected_faults_fire_once() {
        let probe = SimulatedProbe::new();
        let device = probe.add_device("REG-1", "F");

        probe.fail_acquire("F", DeviceFault::InitError("firmware".into()));
        assert!(probe.acquire(&device).is_err());
        probe.acquire(&device).unwrap();

        probe.fail_next_read("F", DeviceFault::Timeout);
        assert_eq!(probe.raw_read(&device, 1), Err(DeviceFault::Timeout));
        assert!(probe.raw_read(&device, 1).is_ok());
    }

    #[test]
    fn detached_device_reads_fail() {
        let probe = SimulatedProbe::new();
        let device = probe.add_device("REG-1", "D");
        probe.acquire(&device).unwrap();
        probe.detach("D");

        assert_eq!(probe.raw_read(&device, 1), Err(DeviceFault::NoDevice));
        assert_eq!(probe.acquire(&device), Err(DeviceFault::NoDevice));
    }

    #[test]
    fn unknown_device_is_no_device() {
        let probe = SimulatedProbe::new();
        let ghost = DeviceDescriptor::new("REG-1", "ghost");
        assert_eq!(probe.acquire(&ghost), Err(DeviceFault::NoDevice));
        assert!(!probe.is_exclusively_held(&ghost));
    }
}
