use crate::audio::{AudioBackend, AudioSettings};
use crate::error::PlatformError;
use crate::settings::{VideoSettings, WindowSettings};
use crate::video::VideoContext;
use crate::window::NativeWindow;

/// One OS implementation of the window, video, and audio subsystems.
///
/// The platform context is generic over this trait, so exactly one backend is
/// compiled into any given context and dispatch is static.
pub trait PlatformBackend {
    type Window: NativeWindow;
    type Video: VideoContext;
    type Audio: AudioBackend;

    fn name(&self) -> &'static str;

    fn create_window(&mut self, settings: &WindowSettings) -> Result<Self::Window, PlatformError>;

    fn create_video(&mut self, window: &Self::Window, settings: &VideoSettings) -> Result<Self::Video, PlatformError>;

    /// Connects to the audio system. Device selection happens afterwards.
    fn connect_audio(&mut self, settings: &AudioSettings) -> Result<Self::Audio, PlatformError>;
}

/// The backend used when none is named.
pub type DefaultBackend = crate::headless::HeadlessBackend;
