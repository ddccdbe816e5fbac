//! Keel core: one context that brings the platform up and tears it down.
//!
//! ```no_run
//! use keel_core::{InitFlags, PlatformContext, Settings};
//!
//! let mut platform = PlatformContext::with_default_backend();
//! platform.initialize(InitFlags::WINDOW | InitFlags::VIDEO | InitFlags::AUDIO, Settings::default())?;
//! platform.start_audio(|buf, frames| {
//!     buf.fill(0);
//!     frames
//! })?;
//! while platform.update() {
//!     while let Some(_event) = platform.poll_event() {}
//!     platform.present()?;
//! }
//! # Ok::<(), keel_core::PlatformError>(())
//! ```

pub mod audio;
pub mod backend;
pub mod context;
pub mod error;
pub mod event;
pub mod headless;
pub mod lifecycle;
pub mod settings;
pub mod threads;
pub mod video;
pub mod window;

#[cfg(test)]
mod testing;

pub use audio::{AudioError, AudioFormat, AudioSettings, AudioStats, PipelineState};
pub use backend::{DefaultBackend, PlatformBackend};
pub use context::PlatformContext;
pub use error::PlatformError;
pub use event::{Event, EventSink, KeyCode, Modifiers, MouseButton, MouseButtons};
pub use lifecycle::{InitFlags, Subsystem, SubsystemState};
pub use settings::{MemorySettings, Settings, VideoSettings, WindowSettings};
pub use video::{BackBuffer, VideoBackend, VideoContext};
