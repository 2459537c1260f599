use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::models::config::SourceConfiguration;
use crate::models::device::{DeviceDescriptor, SourceDiagnostics};
use crate::models::error::DeviceFault;
use crate::models::state::LifecycleState;
use crate::models::status::StatusFlags;
use crate::processing::stream_buffer::StreamBuffer;
use crate::session::feeder::Feeder;
use crate::traits::device_probe::DeviceProbe;

/// One registered random-bit device and its session state.
///
/// Owns the source's [`StreamBuffer`] and, while open, the feeder thread
/// that refills it. `open`, `close` and `reset` are serialized per source;
/// reads never take that lock, so a `close` from another thread always
/// reaches (and wakes) a blocked reader.
///
/// ```text
/// [DeviceProbe] → [Feeder thread] → [StreamBuffer] → get_bit / get_bits / ...
/// ```
pub struct DataSource {
    descriptor: DeviceDescriptor,
    probe: Arc<dyn DeviceProbe>,
    config: SourceConfiguration,
    stream: Arc<StreamBuffer>,

    // Serializes lifecycle operations; holds the running feeder, if any.
    feeder: Mutex<Option<Feeder>>,

    // Handles given out by the registry and not yet released.
    outstanding: AtomicUsize,
}

impl DataSource {
    pub(crate) fn new(
        descriptor: DeviceDescriptor,
        probe: Arc<dyn DeviceProbe>,
        config: SourceConfiguration,
    ) -> Self {
        Self {
            stream: Arc::new(StreamBuffer::new(config.buffer_capacity_bits)),
            descriptor,
            probe,
            config,
            feeder: Mutex::new(None),
            outstanding: AtomicUsize::new(0),
        }
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn device_type(&self) -> &str {
        &self.descriptor.device_type
    }

    pub fn device_id(&self) -> &str {
        &self.descriptor.identity
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.stream.lifecycle()
    }

    pub fn status(&self) -> StatusFlags {
        self.stream.status()
    }

    pub fn diagnostics(&self) -> SourceDiagnostics {
        self.stream.diagnostics()
    }

    /// True only when the source is exactly `Open`.
    pub fn opened(&self) -> bool {
        self.lifecycle().is_open()
    }

    /// Begin opening the device. Transitions: unopened/closed → connecting.
    ///
    /// Returns whether the attempt was accepted, not whether the device is
    /// ready: poll [`opened`](Self::opened) and [`status`](Self::status).
    /// Waits up to the configured `open_wait_ms` for connecting to settle.
    /// Opening an already open or connecting source is accepted as is.
    pub fn open(&self) -> bool {
        let mut feeder = self.feeder.lock();
        let state = self.stream.lifecycle();
        if state.is_active() {
            return true;
        }
        if !state.can_open() {
            return false;
        }

        // A feeder from an earlier failed or faulted session may have exited
        // on its own; reap it before starting over.
        if let Some(stale) = feeder.take() {
            stale.stop();
        }

        if !self.stream.begin_connect() {
            return false;
        }

        if self.probe.is_exclusively_held(&self.descriptor) {
            log::debug!("{}: held by another process", self.descriptor.display_name());
            self.stream.finish_connect(Err(DeviceFault::Busy));
            return false;
        }

        match Feeder::spawn(
            self.descriptor.clone(),
            Arc::clone(&self.probe),
            Arc::clone(&self.stream),
            &self.config,
        ) {
            Ok(spawned) => *feeder = Some(spawned),
            Err(e) => {
                log::warn!("{}: {}", self.descriptor.display_name(), e);
                self.stream
                    .finish_connect(Err(DeviceFault::InitError(e.to_string())));
                return false;
            }
        }
        drop(feeder);

        let settled = self.stream.await_settled(self.config.open_wait());
        log::debug!("{}: open requested, now {:?}", self.descriptor.display_name(), settled);
        true
    }

    /// Close the source and release the device. Transitions: any → closed.
    ///
    /// Buffered data is discarded and blocked readers return immediately
    /// with whatever they had collected. The source stays registered.
    /// Returns once the feeder has released the device, which takes at most
    /// one in-flight `raw_read` plus one refill interval; probes should not
    /// block indefinitely in `raw_read`.
    pub fn close(&self) {
        let mut feeder = self.feeder.lock();
        if self.stream.lifecycle().is_terminal() {
            return;
        }
        self.stream.shut();
        if let Some(running) = feeder.take() {
            running.stop();
        }
        log::debug!("{}: closed", self.descriptor.display_name());
    }

    /// Discard buffered data without changing the lifecycle. Always succeeds.
    pub fn reset(&self) {
        let _serialized = self.feeder.lock();
        let discarded = self.stream.discard();
        log::trace!("{}: reset discarded {} bits", self.descriptor.display_name(), discarded);
    }

    pub fn get_bit(&self) -> Option<u8> {
        self.stream.take_bit()
    }

    pub fn get_byte(&self) -> Option<u8> {
        self.stream.take_byte()
    }

    /// Fill `out` with bits (one per byte, 0 or 1), oldest first.
    /// See [`StreamBuffer::drain_bits`] for the blocking rules.
    pub fn read_bits(&self, out: &mut [u8], block: bool) -> usize {
        self.stream.drain_bits(out, block)
    }

    /// Fill `out` with whole bytes, oldest first.
    pub fn read_bytes(&self, out: &mut [u8], block: bool) -> usize {
        self.stream.drain_bytes(out, block)
    }

    pub fn get_bits(&self, max_bits: usize, block: bool) -> Vec<u8> {
        let mut bits = vec![0u8; max_bits];
        let got = self.read_bits(&mut bits, block);
        bits.truncate(got);
        bits
    }

    pub fn get_bytes(&self, max_bytes: usize, block: bool) -> Vec<u8> {
        let mut bytes = vec![0u8; max_bytes];
        let got = self.read_bytes(&mut bytes, block);
        bytes.truncate(got);
        bytes
    }

    pub fn outstanding_handles(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub(crate) fn retain(&self) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns false if no handle was outstanding.
    pub(crate) fn release(&self) -> bool {
        self.outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    pub(crate) fn lock_ops(&self) -> MutexGuard<'_, Option<Feeder>> {
        self.feeder.lock()
    }

    /// Terminal transition to `Invalid`, stopping any feeder. The caller
    /// holds the lifecycle lock obtained from [`lock_ops`](Self::lock_ops).
    pub(crate) fn retire(&self, ops: &mut Option<Feeder>) {
        self.stream.invalidate();
        if let Some(running) = ops.take() {
            running.stop();
        }
    }
}

impl Drop for DataSource {
    fn drop(&mut self) {
        if let Some(running) = self.feeder.get_mut().take() {
            self.stream.shut();
            running.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::probe::simulated::SimulatedProbe;

    fn source_for(probe: &Arc<SimulatedProbe>, descriptor: DeviceDescriptor) -> DataSource {
        let config = SourceConfiguration {
            buffer_capacity_bits: 512,
            refill_interval_ms: 1,
            open_wait_ms: 2_000,
            ..Default::default()
        };
        let probe: Arc<dyn DeviceProbe> = probe.clone();
        DataSource::new(descriptor, probe, config)
    }

    #[test]
    fn open_then_close() {
        let probe = Arc::new(SimulatedProbe::new());
        let source = source_for(&probe, probe.add_device("REG-1", "A"));
        assert_eq!(source.lifecycle(), LifecycleState::Unopened);

        assert!(source.open());
        assert!(source.opened());
        assert!(probe.is_acquired("A"));

        source.close();
        assert!(!source.opened());
        assert_eq!(source.lifecycle(), LifecycleState::Closed);
        assert!(!probe.is_acquired("A"));
        assert!(source.status().contains(StatusFlags::WAITING));
    }

    #[test]
    fn open_is_accepted_twice() {
        let probe = Arc::new(SimulatedProbe::new());
        let source = source_for(&probe, probe.add_device("REG-1", "A"));
        assert!(source.open());
        assert!(source.open());
        assert_eq!(source.diagnostics().sessions, 1);
    }

    #[test]
    fn busy_device_is_refused() {
        let probe = Arc::new(SimulatedProbe::new());
        let source = source_for(&probe, probe.add_device("REG-1", "B"));
        probe.set_held_elsewhere("B", true);

        assert!(!source.open());
        assert_eq!(source.lifecycle(), LifecycleState::Closed);
        let status = source.status();
        assert!(status.contains(StatusFlags::BUSY | StatusFlags::GENERAL_ERROR));

        probe.set_held_elsewhere("B", false);
        assert!(source.open());
        assert!(source.opened());
        assert!(!source.status().contains(StatusFlags::BUSY));
    }

    #[test]
    fn acquire_failure_closes_with_flag() {
        let probe = Arc::new(SimulatedProbe::new());
        let source = source_for(&probe, probe.add_device("REG-1", "C"));
        probe.fail_acquire("C", DeviceFault::InitError("bootloader".into()));

        assert!(source.open());
        assert!(!source.opened());
        assert!(source.status().contains(StatusFlags::INIT_ERROR));
        assert!(source.open());
        assert!(source.opened());
    }

    #[test]
    fn reads_deliver_device_bytes_in_order() {
        let probe = Arc::new(SimulatedProbe::new());
        let source = source_for(&probe, probe.add_scripted_device("REG-1", "S", &[0xc3, 0x5a]));
        assert!(source.open());

        assert_eq!(source.get_bits(8, true), vec![1, 1, 0, 0, 0, 0, 1, 1]);
        assert_eq!(source.get_byte(), Some(0x5a));
        assert_eq!(source.get_bit(), None);
        assert!(source.status().contains(StatusFlags::WAITING));
    }

    #[test]
    fn reset_empties_buffer_but_stays_open() {
        let probe = Arc::new(SimulatedProbe::new());
        let source = source_for(&probe, probe.add_scripted_device("REG-1", "S", &[0xff; 4]));
        assert!(source.open());
        assert_eq!(source.get_bytes(1, true), vec![0xff]);

        probe.set_producing("S", false);
        source.reset();
        assert!(source.opened());
        assert_eq!(source.get_bit(), None);
    }

    #[test]
    fn reads_on_unopened_source_return_nothing() {
        let probe = Arc::new(SimulatedProbe::new());
        let source = source_for(&probe, probe.add_device("REG-1", "U"));

        assert_eq!(source.get_bit(), None);
        assert_eq!(source.get_byte(), None);
        assert!(source.get_bits(16, true).is_empty());
        assert!(source.get_bytes(16, false).is_empty());
        assert_eq!(source.status(), StatusFlags::WAITING);
    }

    #[test]
    fn close_unblocks_reader() {
        let probe = Arc::new(SimulatedProbe::new());
        let source = Arc::new(source_for(&probe, probe.add_scripted_device("REG-1", "Q", &[])));
        assert!(source.open());

        let reader = Arc::clone(&source);
        let handle = thread::spawn(move || reader.get_bytes(64, true));

        thread::sleep(Duration::from_millis(30));
        source.close();
        assert!(handle.join().unwrap().is_empty());
    }

    #[test]
    fn unplug_sets_no_device_and_close_reopen_recovers() {
        let probe = Arc::new(SimulatedProbe::new());
        let source = source_for(&probe, probe.add_device("REG-1", "P"));
        assert!(source.open());

        probe.detach("P");
        let collected = source.get_bytes(100_000, true);
        assert!(collected.len() < 100_000);
        let status = source.status();
        assert!(status.contains(StatusFlags::NO_DEVICE | StatusFlags::GENERAL_ERROR));

        source.close();
        assert!(source.status().contains(StatusFlags::NO_DEVICE));

        probe.attach("P");
        assert!(source.open());
        assert!(source.opened());
        assert!(!source.status().contains(StatusFlags::NO_DEVICE));
    }

    #[test]
    fn retired_source_is_invalid() {
        let probe = Arc::new(SimulatedProbe::new());
        let source = source_for(&probe, probe.add_device("REG-1", "R"));
        {
            let mut ops = source.lock_ops();
            source.retire(&mut ops);
        }
        assert_eq!(source.status(), StatusFlags::INVALID);
        assert!(!source.open());
        source.reset();
        source.close();
        assert_eq!(source.lifecycle(), LifecycleState::Invalid);
    }

    #[test]
    fn handle_counting_saturates() {
        let probe = Arc::new(SimulatedProbe::new());
        let source = source_for(&probe, probe.add_device("REG-1", "H"));
        source.retain();
        assert!(source.release());
        assert!(!source.release());
        assert_eq!(source.outstanding_handles(), 0);
    }
}
