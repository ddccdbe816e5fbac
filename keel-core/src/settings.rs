use crate::audio::AudioSettings;
use crate::error::PlatformError;
use crate::event::DEFAULT_EVENT_CAPACITY;
use crate::lifecycle::InitFlags;
use crate::video::VideoBackend;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything `initialize` needs, grouped per subsystem.
///
/// Every field has a default, so a settings file only has to name what it
/// changes:
///
/// ```json
/// { "window": { "title": "Synth", "width": 1280 }, "audio": { "sample_rate": 44100 } }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub window: WindowSettings,
    pub video: VideoSettings,
    pub audio: AudioSettings,
    pub memory: MemorySettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
    pub resizable: bool,
    pub event_capacity: usize,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            title: "Keel Window".to_string(),
            width: 800,
            height: 600,
            fullscreen: false,
            resizable: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub backend: VideoBackend,
    pub vsync: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Bytes of address space reserved for the platform arena.
    pub arena_size: usize,
    /// Lock the process's current pages in RAM after bring-up.
    pub lock_pages: bool,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self { arena_size: 1 << 20, lock_pages: false }
    }
}

impl Settings {
    pub fn from_json_str(json: &str) -> Result<Self, PlatformError> {
        serde_json::from_str(json).map_err(|e| PlatformError::InvalidConfiguration(format!("settings: {}", e)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PlatformError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PlatformError::InvalidConfiguration(format!("{}: {}", path.display(), e)))?;
        let settings = Self::from_json_str(&text)?;
        info!("Settings loaded from {}", path.display());
        Ok(settings)
    }

    pub fn to_json_string(&self) -> String {
        // Serializing plain structs of strings and numbers cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Checks the groups of the subsystems `flags` brings up. Memory is always
    /// checked; window and audio only when requested.
    pub fn validate(&self, flags: InitFlags) -> Result<(), PlatformError> {
        self.memory.validate()?;
        if flags.contains(InitFlags::WINDOW) {
            self.window.validate()?;
        }
        if flags.contains(InitFlags::AUDIO) {
            self.audio.validate()?;
        }
        Ok(())
    }
}

impl WindowSettings {
    pub fn validate(&self) -> Result<(), PlatformError> {
        if self.width == 0 || self.height == 0 {
            return Err(PlatformError::InvalidConfiguration(format!(
                "window size {}x{} must be non-zero",
                self.width, self.height
            )));
        }
        if self.event_capacity == 0 {
            return Err(PlatformError::InvalidConfiguration("event queue capacity must be non-zero".into()));
        }
        Ok(())
    }
}

impl MemorySettings {
    pub fn validate(&self) -> Result<(), PlatformError> {
        if self.arena_size == 0 {
            return Err(PlatformError::InvalidConfiguration("arena size must be non-zero".into()));
        }
        Ok(())
    }
}
