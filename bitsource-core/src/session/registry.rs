use std::sync::Arc;

use parking_lot::RwLock;

use crate::models::config::SourceConfiguration;
use crate::models::device::{DeviceDescriptor, SourceDiagnostics};
use crate::models::error::SourceError;
use crate::models::handle::SourceHandle;
use crate::models::state::LifecycleState;
use crate::models::status::StatusFlags;
use crate::session::data_source::DataSource;
use crate::traits::device_probe::DeviceProbe;

struct RegistryInner {
    epoch: u32,
    sources: Vec<Arc<DataSource>>,
}

/// Registry of every random-bit source a [`DeviceProbe`] has reported.
///
/// Sources are append-only between `clear()` calls; `enumerate()` never
/// removes or reorders entries, so index `i` names the same source until
/// the next clear. Callers address sources through [`SourceHandle`]s.
/// Operations on a handle that does not resolve are no-ops that report
/// `false`, `None`, empty results or [`StatusFlags::INVALID`].
///
/// Several registries may coexist (e.g. one per test). Dropping a registry
/// closes every source and releases its device.
pub struct SourceRegistry {
    probe: Arc<dyn DeviceProbe>,
    config: SourceConfiguration,
    inner: RwLock<RegistryInner>,
}

impl SourceRegistry {
    pub fn new(
        probe: Arc<dyn DeviceProbe>,
        config: SourceConfiguration,
    ) -> Result<Self, SourceError> {
        config.validate().map_err(SourceError::BadConfig)?;
        Ok(Self {
            probe,
            config,
            inner: RwLock::new(RegistryInner {
                epoch: 1,
                sources: Vec::new(),
            }),
        })
    }

    pub fn with_default_config(probe: Arc<dyn DeviceProbe>) -> Self {
        Self {
            probe,
            config: SourceConfiguration::default(),
            inner: RwLock::new(RegistryInner {
                epoch: 1,
                sources: Vec::new(),
            }),
        }
    }

    pub fn config(&self) -> &SourceConfiguration {
        &self.config
    }

    /// Probe for devices and register the ones not seen before.
    ///
    /// Devices are matched by identity, so a device that was unplugged and
    /// plugged back in keeps its existing source. Devices held exclusively
    /// by another process are skipped. Returns the number of new sources.
    /// May block while the probe scans hardware.
    pub fn enumerate(&self) -> Result<usize, SourceError> {
        let found = self.probe.probe()?;

        let candidates: Vec<DeviceDescriptor> = found
            .into_iter()
            .filter(|descriptor| !self.probe.is_exclusively_held(descriptor))
            .collect();

        let mut inner = self.inner.write();
        let mut added = 0;
        for descriptor in candidates {
            let known = inner
                .sources
                .iter()
                .any(|source| source.descriptor().same_device(&descriptor));
            if known {
                continue;
            }
            log::debug!("registered {}", descriptor.display_name());
            inner.sources.push(Arc::new(DataSource::new(
                descriptor,
                Arc::clone(&self.probe),
                self.config.clone(),
            )));
            added += 1;
        }

        log::debug!("enumerate: {} new, {} total", added, inner.sources.len());
        Ok(added)
    }

    pub fn count(&self) -> usize {
        self.inner.read().sources.len()
    }

    /// Handle for the source at `index`, or [`SourceHandle::INVALID`] if
    /// out of range. Each successful `get` must be paired with a `release`.
    pub fn get(&self, index: usize) -> SourceHandle {
        let inner = self.inner.read();
        let (Some(source), Ok(slot)) = (inner.sources.get(index), u32::try_from(index)) else {
            return SourceHandle::INVALID;
        };
        if slot == u32::MAX {
            return SourceHandle::INVALID;
        }
        source.retain();
        SourceHandle::new(inner.epoch, slot)
    }

    /// Give back a handle obtained from [`get`](Self::get). Releasing an
    /// invalid or already released handle does nothing.
    pub fn release(&self, handle: SourceHandle) {
        if let Some(source) = self.resolve(handle) {
            source.release();
        }
    }

    /// Remove every source.
    ///
    /// Refused while any handle is outstanding or any source is connecting
    /// or open. On success all earlier handles stop resolving.
    pub fn clear(&self) -> Result<(), SourceError> {
        let mut inner = self.inner.write();

        let count: usize = inner
            .sources
            .iter()
            .map(|source| source.outstanding_handles())
            .sum();
        if count > 0 {
            return Err(SourceError::HandlesOutstanding { count });
        }

        let mut guards = Vec::with_capacity(inner.sources.len());
        for (index, source) in inner.sources.iter().enumerate() {
            let ops = source.lock_ops();
            if source.lifecycle().is_active() {
                return Err(SourceError::SourceStillOpen { index });
            }
            guards.push(ops);
        }

        for (source, ops) in inner.sources.iter().zip(guards.iter_mut()) {
            source.retire(ops);
        }
        drop(guards);

        let removed = inner.sources.len();
        inner.sources.clear();
        inner.epoch = inner.epoch.wrapping_add(1).max(1);
        log::debug!("cleared {} sources", removed);
        Ok(())
    }

    /// Look up the source behind `handle`, if it still exists.
    pub fn source(&self, handle: SourceHandle) -> Option<Arc<DataSource>> {
        self.resolve(handle)
    }

    fn resolve(&self, handle: SourceHandle) -> Option<Arc<DataSource>> {
        if handle.is_invalid() {
            return None;
        }
        let inner = self.inner.read();
        if handle.epoch() != inner.epoch {
            return None;
        }
        inner.sources.get(handle.slot()).cloned()
    }

    pub fn open(&self, handle: SourceHandle) -> bool {
        self.resolve(handle).is_some_and(|source| source.open())
    }

    pub fn close(&self, handle: SourceHandle) {
        if let Some(source) = self.resolve(handle) {
            source.close();
        }
    }

    pub fn reset(&self, handle: SourceHandle) {
        if let Some(source) = self.resolve(handle) {
            source.reset();
        }
    }

    pub fn opened(&self, handle: SourceHandle) -> bool {
        self.resolve(handle).is_some_and(|source| source.opened())
    }

    pub fn lifecycle(&self, handle: SourceHandle) -> LifecycleState {
        self.resolve(handle)
            .map_or(LifecycleState::Invalid, |source| source.lifecycle())
    }

    pub fn status(&self, handle: SourceHandle) -> StatusFlags {
        self.resolve(handle)
            .map_or(StatusFlags::INVALID, |source| source.status())
    }

    /// Device type text; empty when the handle does not resolve.
    pub fn device_type(&self, handle: SourceHandle) -> String {
        self.resolve(handle)
            .map(|source| source.device_type().to_owned())
            .unwrap_or_default()
    }

    /// Device identity text; empty when the handle does not resolve.
    pub fn device_id(&self, handle: SourceHandle) -> String {
        self.resolve(handle)
            .map(|source| source.device_id().to_owned())
            .unwrap_or_default()
    }

    pub fn descriptor(&self, handle: SourceHandle) -> Option<DeviceDescriptor> {
        self.resolve(handle)
            .map(|source| source.descriptor().clone())
    }

    pub fn diagnostics(&self, handle: SourceHandle) -> Option<SourceDiagnostics> {
        self.resolve(handle).map(|source| source.diagnostics())
    }

    pub fn outstanding_handles(&self, handle: SourceHandle) -> usize {
        self.resolve(handle)
            .map_or(0, |source| source.outstanding_handles())
    }

    pub fn get_bit(&self, handle: SourceHandle) -> Option<u8> {
        self.resolve(handle).and_then(|source| source.get_bit())
    }

    pub fn get_byte(&self, handle: SourceHandle) -> Option<u8> {
        self.resolve(handle).and_then(|source| source.get_byte())
    }

    /// Up to `max_bits` bits, one per element. With `block`, waits until
    /// `max_bits` are collected, a device-fatal fault is raised, or the
    /// source is closed from another thread.
    pub fn get_bits(&self, handle: SourceHandle, max_bits: usize, block: bool) -> Vec<u8> {
        self.resolve(handle)
            .map(|source| source.get_bits(max_bits, block))
            .unwrap_or_default()
    }

    pub fn get_bytes(&self, handle: SourceHandle, max_bytes: usize, block: bool) -> Vec<u8> {
        self.resolve(handle)
            .map(|source| source.get_bytes(max_bytes, block))
            .unwrap_or_default()
    }

    pub fn read_bits(&self, handle: SourceHandle, out: &mut [u8], block: bool) -> usize {
        self.resolve(handle)
            .map_or(0, |source| source.read_bits(out, block))
    }

    pub fn read_bytes(&self, handle: SourceHandle, out: &mut [u8], block: bool) -> usize {
        self.resolve(handle)
            .map_or(0, |source| source.read_bytes(out, block))
    }
}

impl Drop for SourceRegistry {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        for source in &inner.sources {
            let mut ops = source.lock_ops();
            source.retire(&mut ops);
        }
    }
}
