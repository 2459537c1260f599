pub mod bit_ring;
pub mod stream_buffer;
