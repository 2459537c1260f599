//! `DeviceProbe` over hw_random character devices.
//!
//! Exclusivity between processes uses advisory `flock(LOCK_EX)` on the
//! device node. The kernel does not enforce it, but every bitsource process
//! honours it, so two programs never split one device's output.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use bitsource_core::models::device::DeviceDescriptor;
use bitsource_core::models::error::{DeviceFault, SourceError};
use bitsource_core::traits::device_probe::DeviceProbe;

use crate::device_scanner::DeviceScanner;

/// Hardware RNG probe for Unix device nodes.
///
/// Each acquired node is held open with an exclusive lock until released.
pub struct HwRngProbe {
    scanner: DeviceScanner,
    held: Mutex<HashMap<String, Arc<File>>>,
}

impl HwRngProbe {
    /// Probe the standard `/dev/hwrng` node.
    pub fn new() -> Self {
        Self::with_scanner(DeviceScanner::new())
    }

    pub fn with_scanner(scanner: DeviceScanner) -> Self {
        Self {
            scanner,
            held: Mutex::new(HashMap::new()),
        }
    }

    /// Probe an explicit list of nodes.
    pub fn with_nodes(nodes: Vec<PathBuf>) -> Self {
        Self::with_scanner(DeviceScanner::with_nodes(nodes))
    }

    pub fn is_held_here(&self, descriptor: &DeviceDescriptor) -> bool {
        self.held.lock().contains_key(&descriptor.identity)
    }

    fn held_file(&self, descriptor: &DeviceDescriptor) -> Option<Arc<File>> {
        self.held.lock().get(&descriptor.identity).cloned()
    }
}

impl Default for HwRngProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceProbe for HwRngProbe {
    fn probe(&self) -> Result<Vec<DeviceDescriptor>, SourceError> {
        self.scanner.scan()
    }

    fn is_exclusively_held(&self, descriptor: &DeviceDescriptor) -> bool {
        // Our own lock is not "elsewhere".
        if self.is_held_here(descriptor) {
            return false;
        }
        let Ok(file) = File::open(&descriptor.identity) else {
            return false;
        };
        match try_lock_exclusive(&file) {
            Ok(()) => false,
            Err(e) => lock_contended(&e),
        }
        // Dropping `file` closes it and drops the probe lock.
    }

    fn acquire(&self, descriptor: &DeviceDescriptor) -> Result<(), DeviceFault> {
        let mut held = self.held.lock();
        if held.contains_key(&descriptor.identity) {
            return Ok(());
        }

        // Non-blocking, so a read never outlives a stop request by more
        // than one refill interval.
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&descriptor.identity)
            .map_err(|e| open_fault(&e))?;

        try_lock_exclusive(&file).map_err(|e| {
            if lock_contended(&e) {
                DeviceFault::Busy
            } else {
                DeviceFault::InitError(format!("flock failed: {}", e))
            }
        })?;

        log::debug!("acquired {}", descriptor.display_name());
        held.insert(descriptor.identity.clone(), Arc::new(file));
        Ok(())
    }

    fn raw_read(
        &self,
        descriptor: &DeviceDescriptor,
        max_bytes: usize,
    ) -> Result<Vec<u8>, DeviceFault> {
        let file = self
            .held_file(descriptor)
            .ok_or_else(|| DeviceFault::ReadError("device not acquired".into()))?;

        let mut buf = vec![0u8; max_bytes];
        // The map lock is not held here. With O_NONBLOCK an idle hwrng
        // returns EAGAIN, reported as an empty read.
        match (&*file).read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) => read_fault(e),
        }
    }

    fn release(&self, descriptor: &DeviceDescriptor) {
        if self.held.lock().remove(&descriptor.identity).is_some() {
            log::debug!("released {}", descriptor.display_name());
        }
    }
}

fn try_lock_exclusive(file: &File) -> io::Result<()> {
    // SAFETY: the descriptor is owned by `file` and stays open for the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

fn lock_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK)
}

fn open_fault(err: &io::Error) -> DeviceFault {
    match err.raw_os_error() {
        Some(libc::ENOENT) | Some(libc::ENODEV) | Some(libc::ENXIO) => DeviceFault::NoDevice,
        Some(libc::EBUSY) => DeviceFault::Busy,
        _ => DeviceFault::InitError(format!("open failed: {}", err)),
    }
}

fn read_fault(err: io::Error) -> Result<Vec<u8>, DeviceFault> {
    match err.kind() {
        // Nothing ready yet; the feeder polls again.
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => Ok(Vec::new()),
        io::ErrorKind::TimedOut => Err(DeviceFault::Timeout),
        _ => match err.raw_os_error() {
            Some(libc::ENODEV) | Some(libc::ENXIO) => Err(DeviceFault::NoDevice),
            _ => Err(DeviceFault::ReadError(err.to_string())),
        },
    }
}
