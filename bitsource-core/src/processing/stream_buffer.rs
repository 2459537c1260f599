//! Per-source stream buffer shared by the feeder thread and consumers.
//!
//! One `parking_lot::Mutex` guards the bit ring together with the source's
//! lifecycle state and fault flags, so a drain can never observe data from a
//! session that has already been closed. A single `Condvar` is signalled on
//! every append, fault and lifecycle change; blocking drains and `open()`
//! wait on it.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::bit_ring::BitRing;
use crate::models::device::SourceDiagnostics;
use crate::models::error::DeviceFault;
use crate::models::state::LifecycleState;
use crate::models::status::StatusFlags;

struct StreamState {
    lifecycle: LifecycleState,
    faults: StatusFlags,
    ring: BitRing,
    diagnostics: SourceDiagnostics,
}

impl StreamState {
    fn discard(&mut self) -> usize {
        let discarded = self.ring.reset();
        self.diagnostics.bits_discarded += discarded as u64;
        discarded
    }
}

/// FIFO of not-yet-consumed bits for one source, with blocking and
/// non-blocking drains.
pub struct StreamBuffer {
    state: Mutex<StreamState>,
    data_ready: Condvar,
}

impl StreamBuffer {
    pub fn new(capacity_bits: usize) -> Self {
        Self {
            state: Mutex::new(StreamState {
                lifecycle: LifecycleState::Unopened,
                faults: StatusFlags::GOOD,
                ring: BitRing::new(capacity_bits),
                diagnostics: SourceDiagnostics::default(),
            }),
            data_ready: Condvar::new(),
        }
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.state.lock().lifecycle
    }

    /// Status recomputed from lifecycle, buffer level and recorded faults.
    pub fn status(&self) -> StatusFlags {
        let state = self.state.lock();
        if state.lifecycle.is_terminal() {
            return StatusFlags::INVALID;
        }
        let mut flags = state.faults;
        if state.lifecycle == LifecycleState::Connecting {
            flags |= StatusFlags::CONNECTING;
        }
        if state.ring.is_empty() {
            flags |= StatusFlags::WAITING;
        }
        flags.with_derived()
    }

    pub fn diagnostics(&self) -> SourceDiagnostics {
        self.state.lock().diagnostics.clone()
    }

    pub fn available_bits(&self) -> usize {
        self.state.lock().ring.count()
    }

    pub fn free_bits(&self) -> usize {
        self.state.lock().ring.free()
    }

    /// Move to `Connecting`, clearing faults and stale data.
    ///
    /// Returns false when the current state does not allow opening.
    pub(crate) fn begin_connect(&self) -> bool {
        let mut state = self.state.lock();
        if !state.lifecycle.can_open() {
            return false;
        }
        state.faults = StatusFlags::GOOD;
        state.discard();
        state.lifecycle = LifecycleState::Connecting;
        true
    }

    /// Settle a pending connection: `Open` on success, `Closed` plus the
    /// fault's flag on failure.
    ///
    /// Returns true only if the source is now open. If the source left
    /// `Connecting` in the meantime (closed or invalidated), nothing changes.
    pub(crate) fn finish_connect(&self, result: Result<(), DeviceFault>) -> bool {
        let mut state = self.state.lock();
        if state.lifecycle != LifecycleState::Connecting {
            return false;
        }
        let opened = match result {
            Ok(()) => {
                state.lifecycle = LifecycleState::Open;
                state.diagnostics.begin_session();
                true
            }
            Err(fault) => {
                state.lifecycle = LifecycleState::Closed;
                state.faults.insert(fault.status_flag());
                state.diagnostics.last_fault = Some(fault.to_string());
                false
            }
        };
        drop(state);
        self.data_ready.notify_all();
        opened
    }

    /// Wait while the source is `Connecting`, up to `timeout`.
    pub(crate) fn await_settled(&self, timeout: Duration) -> LifecycleState {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.lifecycle == LifecycleState::Connecting {
            if self.data_ready.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.lifecycle
    }

    /// Move to `Closed`, discarding buffered data and waking every blocked reader.
    /// Fault flags are kept so the caller can still see why a session ended.
    pub(crate) fn shut(&self) {
        let mut state = self.state.lock();
        if state.lifecycle.is_terminal() {
            return;
        }
        state.discard();
        state.lifecycle = LifecycleState::Closed;
        drop(state);
        self.data_ready.notify_all();
    }

    /// Terminal transition used when the owning registry drops the source.
    pub(crate) fn invalidate(&self) {
        let mut state = self.state.lock();
        state.discard();
        state.lifecycle = LifecycleState::Invalid;
        drop(state);
        self.data_ready.notify_all();
    }

    /// Append device output. Returns false if the source is no longer open,
    /// in which case the bytes are ignored.
    pub(crate) fn push(&self, bytes: &[u8]) -> bool {
        let mut state = self.state.lock();
        if !state.lifecycle.is_open() {
            return false;
        }
        let dropped = state.ring.write_bytes(bytes);
        state.diagnostics.bits_produced += bytes.len() as u64 * 8;
        state.diagnostics.bits_discarded += dropped as u64;
        state.diagnostics.refills += 1;
        drop(state);
        self.data_ready.notify_all();
        true
    }

    pub(crate) fn record_fault(&self, fault: &DeviceFault) {
        let mut state = self.state.lock();
        state.faults.insert(fault.status_flag());
        state.diagnostics.last_fault = Some(fault.to_string());
        drop(state);
        self.data_ready.notify_all();
    }

    /// Drop fault flags that no longer apply, e.g. after a refused read is
    /// followed by a successful one.
    pub(crate) fn clear_faults(&self, flags: StatusFlags) {
        let mut state = self.state.lock();
        state.faults.remove(flags);
        drop(state);
        self.data_ready.notify_all();
    }

    /// Throw away buffered data without touching the lifecycle.
    pub fn discard(&self) -> usize {
        self.state.lock().discard()
    }

    pub fn take_bit(&self) -> Option<u8> {
        let mut state = self.state.lock();
        if !state.lifecycle.is_open() {
            return None;
        }
        let bit = state.ring.read_bit();
        if bit.is_some() {
            state.diagnostics.bits_delivered += 1;
        }
        bit
    }

    pub fn take_byte(&self) -> Option<u8> {
        let mut state = self.state.lock();
        if !state.lifecycle.is_open() {
            return None;
        }
        let byte = state.ring.read_byte();
        if byte.is_some() {
            state.diagnostics.bits_delivered += 8;
        }
        byte
    }

    /// Fill `out` with one bit per byte, oldest first.
    ///
    /// Without `block`, returns whatever is buffered right now. With `block`,
    /// waits until `out` is full, a device-fatal fault is recorded, or the
    /// source stops being open.
    pub fn drain_bits(&self, out: &mut [u8], block: bool) -> usize {
        self.drain(out, block, 1, BitRing::read_bits)
    }

    /// Like [`drain_bits`](Self::drain_bits) with eight bits packed per byte.
    pub fn drain_bytes(&self, out: &mut [u8], block: bool) -> usize {
        self.drain(out, block, 8, BitRing::read_bytes)
    }

    fn drain(
        &self,
        out: &mut [u8],
        block: bool,
        unit_bits: u64,
        take: fn(&mut BitRing, &mut [u8]) -> usize,
    ) -> usize {
        if out.is_empty() {
            return 0;
        }

        let mut state = self.state.lock();
        let mut filled = 0;
        while state.lifecycle.is_open() {
            filled += take(&mut state.ring, &mut out[filled..]);
            if filled == out.len() || !block || state.faults.is_device_fatal() {
                break;
            }
            self.data_ready.wait(&mut state);
        }
        state.diagnostics.bits_delivered += filled as u64 * unit_bits;
        filled
    }
}
