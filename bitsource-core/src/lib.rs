//! # bitsource-core
//!
//! Platform-agnostic core for hardware random-bit sources.
//!
//! A [`SourceRegistry`] asks a [`DeviceProbe`] which devices are attached,
//! keeps one [`DataSource`] per device and hands out opaque
//! [`SourceHandle`]s. An open source runs a background feeder that refills
//! its bit buffer from the device; callers drain bits or bytes, blocking
//! or not, and poll [`StatusFlags`] to learn why data is not arriving.
//! Platform backends (e.g. `bitsource-hwrng`) implement `DeviceProbe`.
//!
//! ## Architecture
//!
//! ```text
//! bitsource-core (this crate)
//! ├── traits/       ← DeviceProbe
//! ├── models/       ← SourceError, DeviceFault, StatusFlags, LifecycleState, SourceHandle, etc.
//! ├── processing/   ← BitRing, StreamBuffer
//! ├── session/      ← SourceRegistry, DataSource, feeder thread
//! └── probe/        ← SimulatedProbe
//! ```

pub mod models;
pub mod probe;
pub mod processing;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::config::SourceConfiguration;
pub use models::device::{DeviceDescriptor, SourceDiagnostics, DEVICE_TEXT_CAPACITY};
pub use models::error::{DeviceFault, SourceError};
pub use models::handle::SourceHandle;
pub use models::state::LifecycleState;
pub use models::status::{StatusClass, StatusFlags};
pub use probe::simulated::{SimulatedProbe, SIMULATED_DEVICE_TYPE};
pub use processing::bit_ring::BitRing;
pub use processing::stream_buffer::StreamBuffer;
pub use session::data_source::DataSource;
pub use session::registry::SourceRegistry;
pub use traits::device_probe::DeviceProbe;
