//! Audio playback: formats, settings, the device seam, and the
//! fill-thread/device-callback pipeline that connects them.

mod device;
mod pipeline;

pub use device::{AudioBackend, AudioDevice, DeviceCallback, DeviceInfo};
pub use pipeline::{AudioPipeline, AudioStats, PipelineState, JITTER_PERIODS};

use crate::error::PlatformError;
use keel_io::{MemoryError, SyncError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Invalid audio settings: {0}")]
    InvalidSettings(String),
    #[error("No audio devices available")]
    NoDevices,
    #[error("Audio device '{0}' not found")]
    DeviceNotFound(String),
    #[error("Audio device failure: {0}")]
    Device(String),
    #[error("Audio pipeline is already running")]
    AlreadyStarted,
    #[error("Audio ring allocation failed: {0}")]
    Memory(#[from] MemoryError),
    #[error("Audio thread failure: {0}")]
    Sync(#[from] SyncError),
}

impl From<AudioError> for PlatformError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::InvalidSettings(msg) => PlatformError::InvalidConfiguration(msg),
            AudioError::NoDevices => PlatformError::DeviceNotFound("no audio devices".into()),
            AudioError::DeviceNotFound(id) => PlatformError::DeviceNotFound(id),
            AudioError::Device(msg) => PlatformError::DeviceLost(msg),
            AudioError::AlreadyStarted => PlatformError::InvalidConfiguration(err.to_string()),
            AudioError::Memory(e) => e.into(),
            AudioError::Sync(e) => e.into(),
        }
    }
}

/// Sample encoding. Samples are interleaved and little-endian.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    U8,
    #[default]
    S16,
    /// Packed 24-bit.
    S24,
    S32,
    F32,
}

impl AudioFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            AudioFormat::U8 => 1,
            AudioFormat::S16 => 2,
            AudioFormat::S24 => 3,
            AudioFormat::S32 | AudioFormat::F32 => 4,
        }
    }

    /// Byte value of a silent sample.
    pub fn silence(self) -> u8 {
        match self {
            AudioFormat::U8 => 0x80,
            _ => 0,
        }
    }
}

const SAMPLE_RATE_RANGE: std::ops::RangeInclusive<u32> = 8_000..=384_000;
const MAX_CHANNELS: u16 = 8;
const MAX_BUFFER_FRAMES: u32 = 1 << 16;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub channels: u16,
    pub format: AudioFormat,
    /// Frames per period; `0` lets the device choose.
    pub buffer_frames: u32,
    /// Device id to open; `None` picks the default device.
    pub device: Option<String>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self { sample_rate: 48_000, channels: 2, format: AudioFormat::S16, buffer_frames: 0, device: None }
    }
}

impl AudioSettings {
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.format.bytes_per_sample()
    }

    pub fn validate(&self) -> Result<(), AudioError> {
        if !SAMPLE_RATE_RANGE.contains(&self.sample_rate) {
            return Err(AudioError::InvalidSettings(format!("sample rate {} Hz out of range", self.sample_rate)));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(AudioError::InvalidSettings(format!("{} channels (1..={})", self.channels, MAX_CHANNELS)));
        }
        if self.buffer_frames > MAX_BUFFER_FRAMES {
            return Err(AudioError::InvalidSettings(format!(
                "buffer of {} frames exceeds {}",
                self.buffer_frames, MAX_BUFFER_FRAMES
            )));
        }
        Ok(())
    }
}
