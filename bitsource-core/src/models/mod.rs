pub mod config;
pub mod device;
pub mod error;
pub mod handle;
pub mod state;
pub mod status;
