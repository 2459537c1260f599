/// Circular FIFO of bits, packed eight per byte.
///
/// Bytes are enqueued MSB first, so reading eight bits after an aligned
/// write yields the original byte's bits from high to low, and `read_byte`
/// packs them back the same way. Not synchronized; the stream buffer wraps
/// it in a `parking_lot::Mutex`.
///
/// Overflow behavior: drops oldest bits.
#[derive(Debug)]
pub struct BitRing {
    storage: Vec<u8>,
    write_index: usize,
    read_index: usize,
    available: usize,
    capacity: usize,
}

impl BitRing {
    /// Create a ring holding `capacity_bits` bits, rounded up to whole bytes.
    pub fn new(capacity_bits: usize) -> Self {
        let bytes = capacity_bits.div_ceil(8).max(1);
        Self {
            storage: vec![0; bytes],
            write_index: 0,
            read_index: 0,
            available: 0,
            capacity: bytes * 8,
        }
    }

    /// Enqueue the bits of `bytes`, MSB first.
    ///
    /// If the ring overflows, the oldest bits are dropped.
    /// If `bytes` holds more bits than the capacity, only the tail is kept.
    /// Returns the number of bits dropped.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> usize {
        if bytes.is_empty() {
            return 0;
        }

        let max_bytes = self.capacity / 8;
        let mut dropped = 0;
        let bytes = if bytes.len() > max_bytes {
            dropped += (bytes.len() - max_bytes) * 8;
            &bytes[bytes.len() - max_bytes..]
        } else {
            bytes
        };

        let incoming = bytes.len() * 8;
        let overflow = (self.available + incoming).saturating_sub(self.capacity);
        if overflow > 0 {
            self.read_index = (self.read_index + overflow) % self.capacity;
            self.available -= overflow;
            dropped += overflow;
        }

        if self.write_index % 8 == 0 {
            // Byte-aligned: copy whole bytes.
            let mut slot = self.write_index / 8;
            for &byte in bytes {
                self.storage[slot] = byte;
                slot = (slot + 1) % self.storage.len();
            }
            self.write_index = (self.write_index + incoming) % self.capacity;
        } else {
            for &byte in bytes {
                for shift in (0..8).rev() {
                    self.set(self.write_index, (byte >> shift) & 1);
                    self.write_index = (self.write_index + 1) % self.capacity;
                }
            }
        }
        self.available += incoming;
        dropped
    }

    /// Dequeue up to `out.len()` bits, one bit per output byte (0 or 1).
    ///
    /// Returns the number of bits written to `out`.
    pub fn read_bits(&mut self, out: &mut [u8]) -> usize {
        let to_read = out.len().min(self.available);
        for slot in out.iter_mut().take(to_read) {
            *slot = self.get(self.read_index);
            self.read_index = (self.read_index + 1) % self.capacity;
        }
        self.available -= to_read;
        to_read
    }

    /// Dequeue up to `out.len()` whole bytes, eight bits packed MSB first.
    ///
    /// Trailing bits that do not fill a byte stay queued.
    pub fn read_bytes(&mut self, out: &mut [u8]) -> usize {
        let to_read = out.len().min(self.available / 8);
        for slot in out.iter_mut().take(to_read) {
            *slot = self.pop_byte();
        }
        to_read
    }

    pub fn read_bit(&mut self) -> Option<u8> {
        let mut bit = [0u8; 1];
        (self.read_bits(&mut bit) == 1).then_some(bit[0])
    }

    pub fn read_byte(&mut self) -> Option<u8> {
        (self.available >= 8).then(|| self.pop_byte())
    }

    /// Number of bits currently available for reading.
    pub fn count(&self) -> usize {
        self.available
    }

    /// Number of bits that can be written without dropping any.
    pub fn free(&self) -> usize {
        self.capacity - self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    /// Reset the ring to empty state. Returns the number of bits discarded.
    pub fn reset(&mut self) -> usize {
        let discarded = self.available;
        self.write_index = 0;
        self.read_index = 0;
        self.available = 0;
        discarded
    }

    /// The total capacity in bits.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn pop_byte(&mut self) -> u8 {
        let byte = if self.read_index % 8 == 0 {
            self.storage[self.read_index / 8]
        } else {
            let mut packed = 0u8;
            for offset in 0..8 {
                packed = (packed << 1) | self.get((self.read_index + offset) % self.capacity);
            }
            packed
        };
        self.read_index = (self.read_index + 8) % self.capacity;
        self.available -= 8;
        byte
    }

    fn get(&self, index: usize) -> u8 {
        (self.storage[index / 8] >> (7 - index % 8)) & 1
    }

    fn set(&mut self, index: usize, bit: u8) {
        let mask = 1u8 << (7 - index % 8);
        if bit == 0 {
            self.storage[index / 8] &= !mask;
        } else {
            self.storage[index / 8] |= mask;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_bits(ring: &mut BitRing, n: usize) -> Vec<u8> {
        let mut out = vec![0u8; n];
        let got = ring.read_bits(&mut out);
        out.truncate(got);
        out
    }

    #[test]
    fn bits_come_out_msb_first() {
        let mut ring = BitRing::new(64);
        ring.write_bytes(&[0b1010_0011]);

        assert_eq!(ring.count(), 8);
        assert_eq!(drain_bits(&mut ring, 8), vec![1, 0, 1, 0, 0, 0, 1, 1]);
        assert!(ring.is_empty());
    }

    #[test]
    fn aligned_bytes_round_trip() {
        let mut ring = BitRing::new(64);
        ring.write_bytes(&[0xde, 0xad, 0xbe, 0xef]);

        let mut out = [0u8; 4];
        assert_eq!(ring.read_bytes(&mut out), 4);
        assert_eq!(out, [0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn unaligned_byte_read_packs_following_bits() {
        let mut ring = BitRing::new(64);
        ring.write_bytes(&[0b1000_0000, 0b1111_1111]);

        assert_eq!(ring.read_bit(), Some(1));
        // next eight bits: 0000000 from the first byte, then 1
        assert_eq!(ring.read_byte(), Some(0b0000_0001));
        assert_eq!(ring.count(), 7);
        assert_eq!(ring.read_byte(), None);
        assert_eq!(drain_bits(&mut ring, 10), vec![1; 7]);
    }

    #[test]
    fn read_bytes_leaves_partial_byte() {
        let mut ring = BitRing::new(64);
        ring.write_bytes(&[0xff, 0x00]);
        ring.read_bit();

        let mut out = [0u8; 4];
        assert_eq!(ring.read_bytes(&mut out), 1);
        assert_eq!(out[0], 0b1111_1110);
        assert_eq!(ring.count(), 7);
    }

    #[test]
    fn read_partial() {
        let mut ring = BitRing::new(64);
        ring.write_bytes(&[0xf0]);

        assert_eq!(drain_bits(&mut ring, 3), vec![1, 1, 1]);
        assert_eq!(ring.count(), 5);
        // request more than available
        assert_eq!(drain_bits(&mut ring, 20), vec![1, 0, 0, 0, 0]);
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut ring = BitRing::new(16);
        ring.write_bytes(&[0x01, 0x02]);
        let dropped = ring.write_bytes(&[0x03]);

        assert_eq!(dropped, 8);
        assert_eq!(ring.count(), 16);
        let mut out = [0u8; 2];
        ring.read_bytes(&mut out);
        assert_eq!(out, [0x02, 0x03]);
    }

    #[test]
    fn write_larger_than_capacity_keeps_tail() {
        let mut ring = BitRing::new(16);
        let dropped = ring.write_bytes(&[1, 2, 3, 4]);

        assert_eq!(dropped, 16);
        let mut out = [0u8; 2];
        assert_eq!(ring.read_bytes(&mut out), 2);
        assert_eq!(out, [3, 4]);
    }

    #[test]
    fn wraparound_unaligned() {
        let mut ring = BitRing::new(16);
        ring.write_bytes(&[0xff]);
        drain_bits(&mut ring, 3);
        ring.write_bytes(&[0x00]);
        // wraps and drops the five unread bits left over from 0xff
        ring.write_bytes(&[0xaa]);

        assert_eq!(ring.count(), 16);
        let mut out = [0u8; 2];
        assert_eq!(ring.read_bytes(&mut out), 2);
        assert_eq!(out, [0x00, 0xaa]);
    }

    #[test]
    fn reset_clears_ring() {
        let mut ring = BitRing::new(32);
        ring.write_bytes(&[1, 2, 3]);

        assert_eq!(ring.reset(), 24);
        assert!(ring.is_empty());
        assert_eq!(ring.read_bit(), None);
        assert_eq!(ring.free(), 32);
    }

    #[test]
    fn capacity_rounds_up_to_bytes() {
        assert_eq!(BitRing::new(9).capacity(), 16);
        assert_eq!(BitRing::new(0).capacity(), 8);
    }

    #[test]
    fn empty_operations() {
        let mut ring = BitRing::new(8);

        assert!(ring.is_empty());
        assert_eq!(ring.read_byte(), None);
        assert_eq!(ring.write_bytes(&[]), 0);
        assert!(drain_bits(&mut ring, 4).is_empty());
    }
}
