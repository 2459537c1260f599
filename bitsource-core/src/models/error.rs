use thiserror::Error;

use super::status::StatusFlags;

/// Errors returned by registry-level operations.
///
/// These are setup and usage failures. Device trouble on an individual
/// source is never returned as an error; it shows up in the source status.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("device probe failed: {0}")]
    ProbeFailed(String),

    #[error("invalid configuration: {0}")]
    BadConfig(String),

    #[error("cannot clear sources: {count} handle(s) not released")]
    HandlesOutstanding { count: usize },

    #[error("cannot clear sources: source {index} is still open")]
    SourceStillOpen { index: usize },

    #[error("failed to start feeder: {0}")]
    Spawn(String),

    #[error("configuration file error: {0}")]
    ConfigFile(String),
}

/// Failures reported by a [`DeviceProbe`](crate::DeviceProbe).
///
/// Each variant maps to exactly one status flag.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceFault {
    #[error("device is in use by another process")]
    Busy,

    #[error("device is no longer connected")]
    NoDevice,

    #[error("read failed: {0}")]
    ReadError(String),

    #[error("bad device configuration: {0}")]
    BadConfig(String),

    #[error("device output could not be processed: {0}")]
    CantProcess(String),

    #[error("initialization failed: {0}")]
    InitError(String),

    #[error("read timed out")]
    Timeout,
}

impl DeviceFault {
    pub fn status_flag(&self) -> StatusFlags {
        match self {
            Self::Busy => StatusFlags::BUSY,
            Self::NoDevice => StatusFlags::NO_DEVICE,
            Self::ReadError(_) => StatusFlags::READ_ERROR,
            Self::BadConfig(_) => StatusFlags::BAD_CONFIG,
            Self::CantProcess(_) => StatusFlags::CANT_PROCESS,
            Self::InitError(_) => StatusFlags::INIT_ERROR,
            Self::Timeout => StatusFlags::TIMEOUT,
        }
    }
}
