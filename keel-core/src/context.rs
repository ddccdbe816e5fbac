use crate::audio::{AudioPipeline, AudioStats};
use crate::backend::{DefaultBackend, PlatformBackend};
use crate::error::PlatformError;
use crate::event::{Event, EventSink};
use crate::lifecycle::{ErrorLog, InitFlags, Registry, Subsystem, SubsystemState};
use crate::settings::Settings;
use crate::threads::ThreadTracker;
use crate::video::VideoContext;
use crate::window::Window;
use keel_io::{Arena, Console, StdConsole, StopFlag, SyncError, SystemTopology, ThreadHandle};
use log::{debug, error, info, warn};

struct MemorySystem {
    topology: SystemTopology,
    arena: Arena,
}

/// Owner of every platform subsystem.
///
/// # Logic
/// `initialize` brings subsystems up in the fixed order of
/// [`Subsystem::ORDER`], skipping optional ones whose flag is absent. If any
/// step fails, everything this call brought up is torn down again in reverse
/// order, so callers only ever observe "all requested subsystems ready" or
/// "nothing ready". `shutdown` (also run on drop) walks the ready set
/// backwards.
///
/// # Thread Safety
/// Bring-up and teardown take `&mut self`; concurrent access to the context
/// is ruled out by the borrow checker rather than a lock. The pieces meant to
/// cross threads are handed out explicitly: [`PlatformContext::event_sink`]
/// and [`PlatformContext::spawn_thread`].
pub struct PlatformContext<B: PlatformBackend = DefaultBackend> {
    backend: B,
    registry: Registry,
    errors: ErrorLog,
    settings: Option<Settings>,
    memory: Option<MemorySystem>,
    threads: Option<ThreadTracker>,
    window: Option<Window<B::Window>>,
    video: Option<B::Video>,
    audio: Option<AudioPipeline<B::Audio>>,
    console: Option<Box<dyn Console>>,
}

impl PlatformContext<DefaultBackend> {
    pub fn with_default_backend() -> Self {
        Self::new(DefaultBackend::default())
    }
}

impl<B: PlatformBackend> PlatformContext<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            registry: Registry::new(),
            errors: ErrorLog::new(),
            settings: None,
            memory: None,
            threads: None,
            window: None,
            video: None,
            audio: None,
            console: None,
        }
    }

    /// Brings up Memory and Synchronization, then every subsystem in `flags`.
    ///
    /// # Errors
    /// - `InvalidConfiguration` if the context is already initialized, if
    ///   `VIDEO` is requested without `WINDOW`, or if the settings of a
    ///   requested subsystem are invalid.
    /// - Whatever the first failing subsystem reports. Nothing is left
    ///   initialized in that case.
    pub fn initialize(&mut self, flags: InitFlags, settings: Settings) -> Result<(), PlatformError> {
        if !self.registry.all_uninitialized() {
            return Err(self.record(PlatformError::InvalidConfiguration("platform is already initialized".into())));
        }
        if flags.contains(InitFlags::VIDEO) && !flags.contains(InitFlags::WINDOW) {
            return Err(self.record(PlatformError::InvalidConfiguration("VIDEO requires WINDOW".into())));
        }
        if let Err(err) = settings.validate(flags) {
            return Err(self.record(err));
        }

        info!("Platform: initializing {:?} on the {} backend", flags, self.backend.name());
        let mut brought_up: Vec<Subsystem> = Vec::with_capacity(Subsystem::ORDER.len());
        for kind in Subsystem::ORDER {
            if kind.flag().is_some_and(|flag| !flags.contains(flag)) {
                continue;
            }
            self.registry.transition(kind, SubsystemState::Initializing);
            match self.bring_up(kind, &settings) {
                Ok(()) => {
                    self.registry.transition(kind, SubsystemState::Ready);
                    brought_up.push(kind);
                }
                Err(err) => {
                    self.registry.transition(kind, SubsystemState::Uninitialized);
                    error!("Platform: {} bring-up failed: {}; rolling back", kind, err);
                    for done in brought_up.iter().rev() {
                        self.tear_down(*done);
                    }
                    self.errors.push(format!("{} bring-up failed: {}", kind, err));
                    return Err(err);
                }
            }
        }

        self.settings = Some(settings);
        info!("Platform: ready ({:?})", brought_up);
        Ok(())
    }

    fn bring_up(&mut self, kind: Subsystem, settings: &Settings) -> Result<(), PlatformError> {
        match kind {
            Subsystem::Memory => {
                let topology = SystemTopology::new();
                let arena = Arena::new(settings.memory.arena_size)?;
                if settings.memory.lock_pages {
                    keel_io::platform::lock_memory_pages();
                }
                self.memory = Some(MemorySystem { topology, arena });
            }
            Subsystem::Synchronization => {
                self.threads = Some(ThreadTracker::new());
            }
            Subsystem::Window => {
                let native = self.backend.create_window(&settings.window)?;
                self.window = Some(Window::new(native, settings.window.event_capacity));
            }
            Subsystem::Video => {
                let window = self.window.as_ref().ok_or(PlatformError::NotInitialized(Subsystem::Window))?;
                let video = self.backend.create_video(window.native(), &settings.video)?;
                info!("Platform: {:?} video context created", video.backend());
                self.video = Some(video);
            }
            Subsystem::Audio => {
                let threads = self.threads.clone().ok_or(PlatformError::NotInitialized(Subsystem::Synchronization))?;
                let audio = self.backend.connect_audio(&settings.audio)?;
                self.audio = Some(AudioPipeline::open(audio, settings.audio.clone(), threads)?);
            }
            Subsystem::Console => {
                self.console = Some(Box::new(StdConsole::new()));
            }
        }
        Ok(())
    }

    fn tear_down(&mut self, kind: Subsystem) {
        self.registry.transition(kind, SubsystemState::ShuttingDown);
        match kind {
            Subsystem::Memory => {
                self.memory = None;
            }
            Subsystem::Synchronization => {
                if let Some(threads) = self.threads.take() {
                    let live = threads.live();
                    if live > 0 {
                        warn!("Platform: {} tracked threads still running at shutdown", live);
                    }
                }
            }
            Subsystem::Window => {
                self.window = None;
            }
            Subsystem::Video => {
                self.video = None;
            }
            Subsystem::Audio => {
                if let Some(mut audio) = self.audio.take() {
                    audio.stop();
                }
            }
            Subsystem::Console => {
                self.console = None;
            }
        }
        self.registry.transition(kind, SubsystemState::Uninitialized);
    }

    /// Tears down every ready subsystem in reverse bring-up order. Safe to
    /// call any number of times.
    pub fn shutdown(&mut self) {
        let ready = self.registry.ready_in_reverse();
        if ready.is_empty() {
            return;
        }
        info!("Platform: shutting down {:?}", ready);
        for kind in ready {
            self.tear_down(kind);
        }
        self.settings = None;
        info!("Platform: shutdown complete");
    }

    fn record(&mut self, err: PlatformError) -> PlatformError {
        error!("Platform: {}", err);
        self.errors.push(err.to_string());
        err
    }

    pub fn state(&self, kind: Subsystem) -> SubsystemState {
        self.registry.state(kind)
    }

    pub fn is_initialized(&self, kind: Subsystem) -> bool {
        self.registry.is_ready(kind)
    }

    /// Settings of the current session.
    pub fn settings(&self) -> Option<&Settings> {
        self.settings.as_ref()
    }

    /// Most recent error messages, oldest first.
    pub fn last_errors(&self) -> Vec<String> {
        self.errors.entries().map(str::to_string).collect()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.errors.latest()
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    // Memory

    pub fn topology(&self) -> Result<&SystemTopology, PlatformError> {
        self.memory.as_ref().map(|m| &m.topology).ok_or(PlatformError::NotInitialized(Subsystem::Memory))
    }

    pub fn arena_mut(&mut self) -> Result<&mut Arena, PlatformError> {
        self.memory.as_mut().map(|m| &mut m.arena).ok_or(PlatformError::NotInitialized(Subsystem::Memory))
    }

    // Synchronization

    pub fn threads(&self) -> Result<&ThreadTracker, PlatformError> {
        self.threads.as_ref().ok_or(PlatformError::NotInitialized(Subsystem::Synchronization))
    }

    /// Spawns a thread accounted to the synchronization subsystem.
    pub fn spawn_thread<F, R>(&self, name: &str, entry: F) -> Result<ThreadHandle<R>, PlatformError>
    where
        F: FnOnce(StopFlag) -> R + Send + 'static,
        R: Send + 'static,
    {
        let threads = self.threads()?;
        threads.spawn(name, entry).map_err(|err: SyncError| err.into())
    }

    // Window

    pub fn window(&self) -> Result<&Window<B::Window>, PlatformError> {
        self.window.as_ref().ok_or(PlatformError::NotInitialized(Subsystem::Window))
    }

    pub fn window_mut(&mut self) -> Result<&mut Window<B::Window>, PlatformError> {
        self.window.as_mut().ok_or(PlatformError::NotInitialized(Subsystem::Window))
    }

    /// Pumps native events. Returns `false` once quit has been requested, or
    /// if there is no window.
    pub fn update(&mut self) -> bool {
        self.window.as_mut().is_some_and(|w| w.update())
    }

    /// Oldest pending event. Never blocks.
    pub fn poll_event(&mut self) -> Option<Event> {
        self.window.as_mut()?.poll_event()
    }

    /// Frame boundary: applies a pending resize to the video context and then
    /// to the `on_resize` callbacks, and presents the frame.
    ///
    /// A zero-area size (a minimized window) keeps the current backbuffer;
    /// the callbacks still see it.
    pub fn present(&mut self) -> Result<(), PlatformError> {
        let window = self.window.as_mut().ok_or(PlatformError::NotInitialized(Subsystem::Window))?;
        if let Some((width, height)) = window.take_pending_resize() {
            if width == 0 || height == 0 {
                debug!("Platform: window minimized, keeping the {}x{} video surface", width, height);
            } else if let Some(video) = self.video.as_mut() {
                if let Err(err) = video.resize(width, height) {
                    return Err(self.record(err));
                }
            }
            window.notify_resize(width, height);
        }
        if let Some(video) = self.video.as_mut() {
            if let Err(err) = video.present() {
                return Err(self.record(err));
            }
        }
        Ok(())
    }

    pub fn on_resize<F>(&mut self, callback: F) -> Result<(), PlatformError>
    where
        F: FnMut(u32, u32) + Send + 'static,
    {
        self.window_mut()?.on_resize(callback);
        Ok(())
    }

    pub fn event_sink(&self) -> Result<EventSink, PlatformError> {
        Ok(self.window()?.event_sink())
    }

    pub fn request_quit(&self) -> Result<(), PlatformError> {
        self.window()?.request_quit();
        Ok(())
    }

    pub fn window_size(&self) -> Result<(u32, u32), PlatformError> {
        Ok(self.window()?.size())
    }

    pub fn set_window_title(&mut self, title: &str) -> Result<(), PlatformError> {
        self.window_mut()?.set_title(title);
        Ok(())
    }

    pub fn set_fullscreen(&mut self, fullscreen: bool) -> Result<(), PlatformError> {
        self.window_mut()?.set_fullscreen(fullscreen)
    }

    pub fn is_fullscreen(&self) -> Result<bool, PlatformError> {
        Ok(self.window()?.is_fullscreen())
    }

    /// Requests a new client area; see [`Window::set_size`].
    pub fn set_window_size(&mut self, width: u32, height: u32) -> Result<(), PlatformError> {
        self.window_mut()?.set_size(width, height)
    }

    pub fn window_position(&self) -> Result<(i32, i32), PlatformError> {
        Ok(self.window()?.position())
    }

    pub fn set_window_position(&mut self, x: i32, y: i32) -> Result<(), PlatformError> {
        self.window_mut()?.set_position(x, y);
        Ok(())
    }

    pub fn is_window_resizable(&self) -> Result<bool, PlatformError> {
        Ok(self.window()?.is_resizable())
    }

    pub fn set_window_resizable(&mut self, resizable: bool) -> Result<(), PlatformError> {
        self.window_mut()?.set_resizable(resizable);
        Ok(())
    }

    pub fn set_cursor_enabled(&mut self, enabled: bool) -> Result<(), PlatformError> {
        self.window_mut()?.set_cursor_enabled(enabled);
        Ok(())
    }

    pub fn clipboard_text(&self) -> Result<Option<String>, PlatformError> {
        Ok(self.window()?.clipboard_text())
    }

    pub fn set_clipboard_text(&mut self, text: &str) -> Result<(), PlatformError> {
        self.window_mut()?.set_clipboard_text(text)
    }

    pub fn dropped_events(&self) -> Result<u64, PlatformError> {
        Ok(self.window()?.dropped_events())
    }

    // Video

    pub fn video_mut(&mut self) -> Result<&mut B::Video, PlatformError> {
        self.video.as_mut().ok_or(PlatformError::NotInitialized(Subsystem::Video))
    }

    // Audio

    pub fn audio(&self) -> Result<&AudioPipeline<B::Audio>, PlatformError> {
        self.audio.as_ref().ok_or(PlatformError::NotInitialized(Subsystem::Audio))
    }

    /// Starts playback with `fill` as the sample source.
    pub fn start_audio<F>(&mut self, fill: F) -> Result<(), PlatformError>
    where
        F: FnMut(&mut [u8], u32) -> u32 + Send + 'static,
    {
        let audio = self.audio.as_mut().ok_or(PlatformError::NotInitialized(Subsystem::Audio))?;
        match audio.start(fill) {
            Ok(()) => Ok(()),
            Err(err) => Err(self.record(err.into())),
        }
    }

    pub fn stop_audio(&mut self) -> Result<(), PlatformError> {
        self.audio.as_mut().ok_or(PlatformError::NotInitialized(Subsystem::Audio))?.stop();
        Ok(())
    }

    pub fn audio_stats(&self) -> Result<AudioStats, PlatformError> {
        Ok(self.audio()?.stats())
    }

    // Console

    pub fn console(&mut self) -> Result<&mut dyn Console, PlatformError> {
        match self.console.as_mut() {
            Some(console) => Ok(console.as_mut()),
            None => Err(PlatformError::NotInitialized(Subsystem::Console)),
        }
    }

    /// Replaces the console sink, e.g. with an in-memory one.
    pub fn set_console(&mut self, console: Box<dyn Console>) -> Result<(), PlatformError> {
        let slot = self.console.as_mut().ok_or(PlatformError::NotInitialized(Subsystem::Console))?;
        *slot = console;
        Ok(())
    }
}

impl<B: PlatformBackend> Drop for PlatformContext<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessBackend;
    use crate::testing::FaultyBackend;
    use crate::video::VideoBackend;
    use keel_io::console::BufferConsole;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn assert_all_uninitialized<B: PlatformBackend>(ctx: &PlatformContext<B>) {
        for kind in Subsystem::ORDER {
            assert_eq!(ctx.state(kind), SubsystemState::Uninitialized, "{} still up", kind);
        }
    }

    #[test]
    fn test_video_without_window_is_rejected() {
        let mut ctx = PlatformContext::new(HeadlessBackend::new());
        let err = ctx.initialize(InitFlags::VIDEO, Settings::default()).unwrap_err();
        assert!(matches!(err, PlatformError::InvalidConfiguration(_)));
        assert_all_uninitialized(&ctx);
        assert!(ctx.last_error().unwrap().contains("VIDEO requires WINDOW"));
    }

    #[test]
    fn test_shutdown_for_every_flag_subset() {
        for bits in 0..=InitFlags::ALL.bits() {
            let flags = InitFlags::from_bits_truncate(bits);
            if flags.contains(InitFlags::VIDEO) && !flags.contains(InitFlags::WINDOW) {
                continue;
            }
            let mut ctx = PlatformContext::new(HeadlessBackend::new());
            ctx.initialize(flags, Settings::default()).unwrap();
            assert!(ctx.is_initialized(Subsystem::Memory));
            assert!(ctx.is_initialized(Subsystem::Synchronization));
            assert_eq!(ctx.is_initialized(Subsystem::Audio), flags.contains(InitFlags::AUDIO));

            ctx.shutdown();
            assert_all_uninitialized(&ctx);
            ctx.shutdown();
            assert_all_uninitialized(&ctx);
        }
    }

    #[test]
    fn test_video_failure_rolls_back_everything() {
        let mut ctx = PlatformContext::new(FaultyBackend::failing(Subsystem::Video));
        let err = ctx.initialize(InitFlags::ALL, Settings::default()).unwrap_err();
        assert!(matches!(err, PlatformError::PlatformUnavailable(_)));
        assert_all_uninitialized(&ctx);
        // Audio was never attempted.
        assert_eq!(ctx.backend().calls, vec![Subsystem::Window, Subsystem::Video]);
        assert!(matches!(ctx.window_size(), Err(PlatformError::NotInitialized(Subsystem::Window))));
        assert!(ctx.last_error().unwrap().starts_with("Video bring-up failed"));

        // A failed bring-up leaves the context reusable.
        ctx.initialize(InitFlags::WINDOW, Settings::default()).unwrap();
        assert!(ctx.is_initialized(Subsystem::Window));
    }

    #[test]
    fn test_audio_failure_rolls_back_window_and_video() {
        let mut ctx = PlatformContext::new(FaultyBackend::failing(Subsystem::Audio));
        assert!(ctx.initialize(InitFlags::ALL, Settings::default()).is_err());
        assert_all_uninitialized(&ctx);
    }

    #[test]
    fn test_invalid_audio_settings_fail_bring_up() {
        let mut ctx = PlatformContext::new(HeadlessBackend::new());
        let mut settings = Settings::default();
        settings.audio.channels = 0;
        let err = ctx.initialize(InitFlags::AUDIO, settings).unwrap_err();
        assert!(matches!(err, PlatformError::InvalidConfiguration(_)));
        assert_all_uninitialized(&ctx);
    }

    #[test]
    fn test_second_initialize_is_rejected() {
        let mut ctx = PlatformContext::new(HeadlessBackend::new());
        ctx.initialize(InitFlags::WINDOW, Settings::default()).unwrap();
        assert!(matches!(
            ctx.initialize(InitFlags::WINDOW, Settings::default()),
            Err(PlatformError::InvalidConfiguration(_))
        ));
        assert!(ctx.is_initialized(Subsystem::Window));
        ctx.clear_errors();
        assert!(ctx.last_errors().is_empty());
    }

    #[test]
    fn test_opengl_request_fails_on_headless() {
        let mut ctx = PlatformContext::new(HeadlessBackend::new());
        let mut settings = Settings::default();
        settings.video.backend = VideoBackend::OpenGL;
        let err = ctx.initialize(InitFlags::WINDOW | InitFlags::VIDEO, settings).unwrap_err();
        assert!(matches!(err, PlatformError::PlatformUnavailable(_)));
        assert_all_uninitialized(&ctx);
    }

    #[test]
    fn test_resize_reaches_video_then_callbacks() {
        let mut ctx = PlatformContext::new(HeadlessBackend::new());
        ctx.initialize(InitFlags::WINDOW | InitFlags::VIDEO, Settings::default()).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        ctx.on_resize(move |w, h| seen_cb.lock().push((w, h))).unwrap();

        ctx.window().unwrap().native().event_source().push(Event::WindowResize { width: 320, height: 240 });
        assert!(ctx.update());
        assert_eq!(ctx.poll_event(), Some(Event::WindowResize { width: 320, height: 240 }));
        assert_eq!(ctx.window_size().unwrap(), (320, 240));
        assert!(seen.lock().is_empty());

        ctx.present().unwrap();
        let bb = ctx.video_mut().unwrap().backbuffer_mut().unwrap();
        assert_eq!((bb.width(), bb.height()), (320, 240));
        assert_eq!(*seen.lock(), vec![(320, 240)]);

        ctx.present().unwrap();
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_minimized_window_still_notifies_callbacks() {
        let mut ctx = PlatformContext::new(HeadlessBackend::new());
        ctx.initialize(InitFlags::WINDOW | InitFlags::VIDEO, Settings::default()).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        ctx.on_resize(move |w, h| seen_cb.lock().push((w, h))).unwrap();

        ctx.event_sink().unwrap().push(Event::WindowResize { width: 0, height: 0 });
        assert!(ctx.update());
        assert_eq!(ctx.poll_event(), Some(Event::WindowResize { width: 0, height: 0 }));
        ctx.present().unwrap();

        assert_eq!(*seen.lock(), vec![(0, 0)]);
        assert_eq!(ctx.window_size().unwrap(), (0, 0));
        // The surface keeps its last drawable size until the window comes back.
        let bb = ctx.video_mut().unwrap().backbuffer_mut().unwrap();
        assert_eq!((bb.width(), bb.height()), (800, 600));
        assert!(ctx.last_error().is_none());

        ctx.event_sink().unwrap().push(Event::WindowResize { width: 400, height: 300 });
        ctx.update();
        ctx.poll_event();
        ctx.present().unwrap();
        let bb = ctx.video_mut().unwrap().backbuffer_mut().unwrap();
        assert_eq!((bb.width(), bb.height()), (400, 300));
        assert_eq!(*seen.lock(), vec![(0, 0), (400, 300)]);
    }

    #[test]
    fn test_window_settings_ignored_without_window() {
        let mut ctx = PlatformContext::new(HeadlessBackend::new());
        let mut settings = Settings::default();
        settings.window.width = 0;
        settings.window.event_capacity = 0;
        ctx.initialize(InitFlags::AUDIO | InitFlags::CONSOLE, settings.clone()).unwrap();
        assert!(ctx.is_initialized(Subsystem::Audio));
        ctx.shutdown();

        let err = ctx.initialize(InitFlags::WINDOW, settings).unwrap_err();
        assert!(matches!(err, PlatformError::InvalidConfiguration(_)));
        assert_all_uninitialized(&ctx);
    }

    #[test]
    fn test_window_controls_through_context() {
        let mut ctx = PlatformContext::new(HeadlessBackend::new());
        let mut settings = Settings::default();
        settings.window.resizable = false;
        ctx.initialize(InitFlags::WINDOW, settings).unwrap();

        assert!(!ctx.is_window_resizable().unwrap());
        ctx.set_window_resizable(true).unwrap();
        assert!(ctx.is_window_resizable().unwrap());

        ctx.set_window_position(10, 20).unwrap();
        assert_eq!(ctx.window_position().unwrap(), (10, 20));

        ctx.set_window_size(1024, 768).unwrap();
        ctx.update();
        assert_eq!(ctx.poll_event(), Some(Event::WindowResize { width: 1024, height: 768 }));
        assert_eq!(ctx.window_size().unwrap(), (1024, 768));

        ctx.set_cursor_enabled(false).unwrap();
        assert!(!ctx.window().unwrap().is_cursor_enabled());
        ctx.set_clipboard_text("keel").unwrap();
        assert_eq!(ctx.clipboard_text().unwrap().as_deref(), Some("keel"));

        ctx.shutdown();
        assert!(matches!(ctx.clipboard_text(), Err(PlatformError::NotInitialized(Subsystem::Window))));
    }

    #[test]
    fn test_close_event_ends_update_loop() {
        let mut ctx = PlatformContext::new(HeadlessBackend::new());
        ctx.initialize(InitFlags::WINDOW, Settings::default()).unwrap();
        ctx.event_sink().unwrap().push(Event::WindowClose);
        assert!(!ctx.update());
        assert_eq!(ctx.poll_event(), Some(Event::WindowClose));
        assert_eq!(ctx.poll_event(), None);
    }

    #[test]
    fn test_audio_start_stop_leaves_no_threads() {
        let backend = HeadlessBackend::new();
        let probe = backend.audio_probe();
        let mut ctx = PlatformContext::new(backend);
        ctx.initialize(InitFlags::AUDIO, Settings::default()).unwrap();
        let threads = ctx.threads().unwrap().clone();

        ctx.start_audio(|buf, frames| {
            buf.fill(0);
            frames
        })
        .unwrap();
        assert_eq!(threads.live(), 1);
        ctx.stop_audio().unwrap();

        assert_eq!(threads.live(), 0);
        assert_eq!(probe.open_devices(), 0);
        assert_eq!(probe.running_devices(), 0);
    }

    #[test]
    fn test_drop_stops_playing_audio() {
        let backend = HeadlessBackend::new();
        let probe = backend.audio_probe();
        let threads;
        {
            let mut ctx = PlatformContext::new(backend);
            ctx.initialize(InitFlags::AUDIO | InitFlags::CONSOLE, Settings::default()).unwrap();
            threads = ctx.threads().unwrap().clone();
            ctx.start_audio(|_, frames| frames).unwrap();
        }
        assert_eq!(threads.live(), 0);
        assert_eq!(probe.open_devices(), 0);
    }

    #[test]
    fn test_accessors_after_shutdown() {
        let mut ctx = PlatformContext::new(HeadlessBackend::new());
        ctx.initialize(InitFlags::ALL, Settings::default()).unwrap();
        assert!(ctx.arena_mut().unwrap().alloc_aligned(64, 64).is_ok());
        assert!(ctx.topology().unwrap().core_count() >= 1);
        ctx.set_console(Box::new(BufferConsole::default())).unwrap();
        ctx.console().unwrap().write_line("hello").unwrap();
        assert!(ctx.settings().is_some());

        ctx.shutdown();
        assert!(matches!(ctx.arena_mut(), Err(PlatformError::NotInitialized(Subsystem::Memory))));
        assert!(matches!(ctx.audio(), Err(PlatformError::NotInitialized(Subsystem::Audio))));
        assert!(matches!(ctx.console(), Err(PlatformError::NotInitialized(Subsystem::Console))));
        assert!(matches!(ctx.video_mut(), Err(PlatformError::NotInitialized(Subsystem::Video))));
        assert!(ctx.settings().is_none());
        assert!(!ctx.update());
        assert_eq!(ctx.poll_event(), None);
    }

    #[test]
    fn test_spawned_threads_are_tracked() {
        let mut ctx = PlatformContext::new(HeadlessBackend::new());
        assert!(matches!(ctx.spawn_thread("early", |_| ()), Err(PlatformError::NotInitialized(Subsystem::Synchronization))));
        ctx.initialize(InitFlags::empty(), Settings::default()).unwrap();
        let mut pump = ctx
            .spawn_thread("pump", |stop| {
                while !stop.is_stop_requested() {
                    std::thread::yield_now();
                }
            })
            .unwrap();
        assert_eq!(ctx.threads().unwrap().live(), 1);
        pump.request_stop();
        pump.join(keel_io::Timeout::INFINITE);
        assert_eq!(ctx.threads().unwrap().live(), 0);
    }
}
