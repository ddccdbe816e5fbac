//! Backend wrapper that fails one chosen subsystem on demand.

use crate::audio::AudioSettings;
use crate::backend::PlatformBackend;
use crate::error::PlatformError;
use crate::headless::{HeadlessAudio, HeadlessBackend, HeadlessWindow};
use crate::lifecycle::Subsystem;
use crate::settings::{VideoSettings, WindowSettings};
use crate::video::SoftwareContext;

pub struct FaultyBackend {
    inner: HeadlessBackend,
    fail: Option<Subsystem>,
    pub calls: Vec<Subsystem>,
}

impl FaultyBackend {
    pub fn failing(subsystem: Subsystem) -> Self {
        Self { inner: HeadlessBackend::new(), fail: Some(subsystem), calls: Vec::new() }
    }

    fn check(&mut self, subsystem: Subsystem) -> Result<(), PlatformError> {
        self.calls.push(subsystem);
        if self.fail == Some(subsystem) {
            return Err(PlatformError::PlatformUnavailable(format!("injected {} failure", subsystem)));
        }
        Ok(())
    }
}

impl PlatformBackend for FaultyBackend {
    type Window = HeadlessWindow;
    type Video = SoftwareContext;
    type Audio = HeadlessAudio;

    fn name(&self) -> &'static str {
        "faulty"
    }

    fn create_window(&mut self, settings: &WindowSettings) -> Result<HeadlessWindow, PlatformError> {
        self.check(Subsystem::Window)?;
        self.inner.create_window(settings)
    }

    fn create_video(&mut self, window: &HeadlessWindow, settings: &VideoSettings) -> Result<SoftwareContext, PlatformError> {
        self.check(Subsystem::Video)?;
        self.inner.create_video(window, settings)
    }

    fn connect_audio(&mut self, settings: &AudioSettings) -> Result<HeadlessAudio, PlatformError> {
        self.check(Subsystem::Audio)?;
        self.inner.connect_audio(settings)
    }
}
