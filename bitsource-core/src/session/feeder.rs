use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::models::config::SourceConfiguration;
use crate::models::device::DeviceDescriptor;
use crate::models::error::{DeviceFault, SourceError};
use crate::models::status::StatusFlags;
use crate::processing::stream_buffer::StreamBuffer;
use crate::traits::device_probe::DeviceProbe;

/// Background thread that connects one source's device and keeps its
/// stream buffer topped up.
///
/// The thread first acquires the device and settles the pending connection,
/// then reads raw bytes into the buffer until it is stopped, the source stops
/// being open, or the device reports a device-fatal fault. Other faults
/// (`Busy`, `BadConfig`) are flagged and retried. The device is released
/// when the thread exits.
pub(crate) struct Feeder {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Feeder {
    pub(crate) fn spawn(
        descriptor: DeviceDescriptor,
        probe: Arc<dyn DeviceProbe>,
        stream: Arc<StreamBuffer>,
        config: &SourceConfiguration,
    ) -> Result<Self, SourceError> {
        let running = Arc::new(AtomicBool::new(true));
        let task = FeedTask {
            running: Arc::clone(&running),
            descriptor,
            probe,
            stream,
            chunk_bytes: config.read_chunk_bytes,
            refill_interval: config.refill_interval(),
            stall_timeout: config.stall_timeout(),
        };

        let handle = thread::Builder::new()
            .name("bitsource-feeder".into())
            .spawn(move || task.run())
            .map_err(|e| SourceError::Spawn(format!("failed to spawn feeder thread: {}", e)))?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Signal the thread to stop and wait for it to release the device.
    pub(crate) fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("feeder thread panicked");
            }
        }
    }
}

impl Drop for Feeder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct FeedTask {
    running: Arc<AtomicBool>,
    descriptor: DeviceDescriptor,
    probe: Arc<dyn DeviceProbe>,
    stream: Arc<StreamBuffer>,
    chunk_bytes: usize,
    refill_interval: Duration,
    stall_timeout: Option<Duration>,
}

impl FeedTask {
    fn run(self) {
        let name = self.descriptor.display_name();
        let connected = self.probe.acquire(&self.descriptor);
        let acquired = connected.is_ok();
        if let Err(fault) = &connected {
            log::debug!("{}: connect failed: {}", name, fault);
        }

        if !self.stream.finish_connect(connected) {
            // Connect failed, or the source was closed while connecting.
            if acquired {
                self.probe.release(&self.descriptor);
            }
            return;
        }

        log::debug!("{}: open, feeding", name);
        self.feed(&name);
        self.probe.release(&self.descriptor);
        log::debug!("{}: feeder stopped", name);
    }

    fn feed(&self, name: &str) {
        let mut last_data = Instant::now();
        let mut retrying = StatusFlags::GOOD;

        while self.running.load(Ordering::SeqCst) {
            let room = self.stream.free_bits() / 8;
            if room == 0 {
                // Full buffer is not a stall.
                last_data = Instant::now();
                thread::sleep(self.refill_interval);
                continue;
            }

            match self.probe.raw_read(&self.descriptor, room.min(self.chunk_bytes)) {
                Ok(bytes) if !bytes.is_empty() => {
                    if !self.stream.push(&bytes) {
                        break;
                    }
                    last_data = Instant::now();
                    if !retrying.is_good() {
                        self.stream.clear_faults(retrying);
                        retrying = StatusFlags::GOOD;
                    }
                }
                Ok(_) => {
                    if self.stalled(last_data, name) {
                        break;
                    }
                    thread::sleep(self.refill_interval);
                }
                Err(fault) if fault.status_flag().is_device_fatal() => {
                    log::warn!("{}: device fault: {}", name, fault);
                    self.stream.record_fault(&fault);
                    break;
                }
                Err(fault) => {
                    // Not fatal: keep the flag up until a read succeeds again.
                    log::debug!("{}: read refused, retrying: {}", name, fault);
                    self.stream.record_fault(&fault);
                    retrying.insert(fault.status_flag());
                    if self.stalled(last_data, name) {
                        break;
                    }
                    thread::sleep(self.refill_interval);
                }
            }
        }
    }

    /// Raises `Timeout` once the device has gone quiet for longer than the
    /// configured stall timeout.
    fn stalled(&self, last_data: Instant, name: &str) -> bool {
        match self.stall_timeout {
            Some(limit) if last_data.elapsed() >= limit => {
                log::warn!("{}: no data for {:?}", name, limit);
                self.stream.record_fault(&DeviceFault::Timeout);
                true
            }
            _ => false,
        }
    }
}
