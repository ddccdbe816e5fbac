use crate::lifecycle::Subsystem;
use keel_io::{MemoryError, SyncError};
use thiserror::Error;

/// Failure taxonomy shared by every subsystem.
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Platform unavailable: {0}")]
    PlatformUnavailable(String),
    #[error("Out of memory: {requested} bytes refused")]
    OutOfMemory { requested: usize },
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    #[error("Device lost: {0}")]
    DeviceLost(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("Subsystem {0} is not initialized")]
    NotInitialized(Subsystem),
}

impl PlatformError {
    /// Whether trying again can succeed without changing the request. Device
    /// errors may clear after re-enumerating; configuration and capability
    /// errors never clear on their own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PlatformError::Timeout(_)
                | PlatformError::DeviceNotFound(_)
                | PlatformError::DeviceLost(_)
                | PlatformError::OutOfMemory { .. }
        )
    }
}

impl From<MemoryError> for PlatformError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::OutOfMemory { requested } => PlatformError::OutOfMemory { requested },
            MemoryError::InvalidAlignment(_) | MemoryError::OutOfRange { .. } | MemoryError::ZeroSize => {
                PlatformError::InvalidConfiguration(err.to_string())
            }
            MemoryError::LockFailed(_) | MemoryError::Os(_) => PlatformError::PlatformUnavailable(err.to_string()),
        }
    }
}

impl From<SyncError> for PlatformError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::SemaphoreOverflow { .. } => PlatformError::InvalidConfiguration(err.to_string()),
            SyncError::Spawn { .. } => PlatformError::PlatformUnavailable(err.to_string()),
        }
    }
}
