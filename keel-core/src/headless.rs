//! Backend without a display server or sound card.
//!
//! The window is offscreen and its "native" events are whatever any thread
//! pushes through [`HeadlessWindow::event_source`]. Video is the software
//! context. Audio runs a timer-paced device thread that calls the drain
//! callback once per period, standing in for the OS audio thread, and can tap
//! everything it plays for inspection.

use crate::audio::{AudioBackend, AudioDevice, AudioError, AudioSettings, DeviceCallback, DeviceInfo};
use crate::backend::PlatformBackend;
use crate::error::PlatformError;
use crate::event::{Event, EventSink};
use crate::settings::{VideoSettings, WindowSettings};
use crate::video::{SoftwareContext, VideoBackend, VideoContext};
use crate::window::NativeWindow;
use crossbeam_queue::SegQueue;
use keel_io::{ThreadHandle, Timeout};
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_DEVICE_FRAMES: u32 = 512;

#[derive(Debug, Default)]
pub struct HeadlessBackend {
    capture: Option<AudioCapture>,
    probe: Arc<AudioProbe>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records up to `limit` bytes of everything the audio device plays.
    pub fn with_audio_capture(limit: usize) -> (Self, AudioCapture) {
        let capture = AudioCapture::new(limit);
        (Self { capture: Some(capture.clone()), probe: Arc::default() }, capture)
    }

    pub fn audio_probe(&self) -> Arc<AudioProbe> {
        self.probe.clone()
    }
}

impl PlatformBackend for HeadlessBackend {
    type Window = HeadlessWindow;
    type Video = SoftwareContext;
    type Audio = HeadlessAudio;

    fn name(&self) -> &'static str {
        "headless"
    }

    fn create_window(&mut self, settings: &WindowSettings) -> Result<HeadlessWindow, PlatformError> {
        info!("Headless: window '{}' {}x{}", settings.title, settings.width, settings.height);
        Ok(HeadlessWindow::new(settings))
    }

    fn create_video(&mut self, window: &HeadlessWindow, settings: &VideoSettings) -> Result<SoftwareContext, PlatformError> {
        match settings.backend {
            VideoBackend::Software => {
                let (w, h) = window.size();
                let mut video = SoftwareContext::new(w, h)?;
                video.set_vsync(settings.vsync)?;
                Ok(video)
            }
            VideoBackend::OpenGL => {
                Err(PlatformError::PlatformUnavailable("OpenGL needs a display; the headless backend has none".into()))
            }
        }
    }

    fn connect_audio(&mut self, _settings: &AudioSettings) -> Result<HeadlessAudio, PlatformError> {
        Ok(HeadlessAudio { capture: self.capture.clone(), probe: self.probe.clone(), fail_start: false })
    }
}

/// Cloneable feed for a headless window's event source.
#[derive(Clone, Debug, Default)]
pub struct HeadlessEventSource {
    pending: Arc<SegQueue<Event>>,
}

impl HeadlessEventSource {
    pub fn push(&self, event: Event) {
        self.pending.push(event);
    }
}

/// Offscreen window. Its clipboard is private to the window.
#[derive(Debug)]
pub struct HeadlessWindow {
    title: String,
    size: (u32, u32),
    position: (i32, i32),
    fullscreen: bool,
    resizable: bool,
    cursor_enabled: bool,
    clipboard: Option<String>,
    source: HeadlessEventSource,
}

impl HeadlessWindow {
    pub fn new(settings: &WindowSettings) -> Self {
        Self {
            title: settings.title.clone(),
            size: (settings.width, settings.height),
            position: (0, 0),
            fullscreen: settings.fullscreen,
            resizable: settings.resizable,
            cursor_enabled: true,
            clipboard: None,
            source: HeadlessEventSource::default(),
        }
    }

    pub fn event_source(&self) -> HeadlessEventSource {
        self.source.clone()
    }
}

impl NativeWindow for HeadlessWindow {
    fn title(&self) -> &str {
        &self.title
    }

    fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }

    // Granted as requested; the new size arrives with the next pump.
    fn set_size(&mut self, width: u32, height: u32) -> Result<(), PlatformError> {
        self.source.push(Event::WindowResize { width, height });
        Ok(())
    }

    fn position(&self) -> (i32, i32) {
        self.position
    }

    fn set_position(&mut self, x: i32, y: i32) {
        self.position = (x, y);
    }

    fn set_fullscreen(&mut self, fullscreen: bool) -> Result<(), PlatformError> {
        self.fullscreen = fullscreen;
        Ok(())
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    fn is_resizable(&self) -> bool {
        self.resizable
    }

    fn set_resizable(&mut self, resizable: bool) {
        self.resizable = resizable;
    }

    fn is_cursor_enabled(&self) -> bool {
        self.cursor_enabled
    }

    fn set_cursor_enabled(&mut self, enabled: bool) {
        self.cursor_enabled = enabled;
    }

    fn clipboard_text(&self) -> Option<String> {
        self.clipboard.clone()
    }

    fn set_clipboard_text(&mut self, text: &str) -> Result<(), PlatformError> {
        self.clipboard = Some(text.to_string());
        Ok(())
    }

    fn pump_events(&mut self, sink: &EventSink) {
        while let Some(event) = self.source.pending.pop() {
            if let Event::WindowResize { width, height } = event {
                self.size = (width, height);
            }
            sink.push(event);
        }
    }
}

/// Counters describing the headless audio devices, for tests and demos.
#[derive(Debug, Default)]
pub struct AudioProbe {
    open: AtomicUsize,
    running: AtomicUsize,
}

impl AudioProbe {
    pub fn open_devices(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }

    pub fn running_devices(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }
}

/// Bytes played by a headless device, up to a limit.
#[derive(Clone, Debug)]
pub struct AudioCapture {
    data: Arc<Mutex<Vec<u8>>>,
    limit: usize,
}

impl AudioCapture {
    fn new(limit: usize) -> Self {
        Self { data: Arc::new(Mutex::new(Vec::with_capacity(limit))), limit }
    }

    fn record(&self, bytes: &[u8]) {
        let mut data = self.data.lock();
        let room = self.limit - data.len();
        data.extend_from_slice(&bytes[..bytes.len().min(room)]);
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct HeadlessAudio {
    capture: Option<AudioCapture>,
    probe: Arc<AudioProbe>,
    fail_start: bool,
}

impl HeadlessAudio {
    pub fn new() -> Self {
        Self { capture: None, probe: Arc::default(), fail_start: false }
    }

    pub fn with_capture(limit: usize) -> (Self, AudioCapture) {
        let capture = AudioCapture::new(limit);
        (Self { capture: Some(capture.clone()), probe: Arc::default(), fail_start: false }, capture)
    }

    /// Makes every device refuse to start.
    pub fn fail_device_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn probe(&self) -> Arc<AudioProbe> {
        self.probe.clone()
    }
}

impl Default for HeadlessAudio {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for HeadlessAudio {
    type Device = HeadlessAudioDevice;

    fn enumerate_devices(&mut self) -> Result<Vec<DeviceInfo>, AudioError> {
        Ok(vec![DeviceInfo { id: "headless:0".into(), name: "Headless Output".into(), is_default: true }])
    }

    fn open_device(&mut self, info: &DeviceInfo, settings: &AudioSettings) -> Result<HeadlessAudioDevice, AudioError> {
        self.probe.open.fetch_add(1, Ordering::AcqRel);
        debug!("Headless: opened audio device '{}'", info.id);
        Ok(HeadlessAudioDevice {
            info: info.clone(),
            settings: settings.clone(),
            capture: self.capture.clone(),
            probe: self.probe.clone(),
            fail_start: self.fail_start,
            thread: None,
            open: true,
        })
    }
}

pub struct HeadlessAudioDevice {
    info: DeviceInfo,
    settings: AudioSettings,
    capture: Option<AudioCapture>,
    probe: Arc<AudioProbe>,
    fail_start: bool,
    thread: Option<ThreadHandle>,
    open: bool,
}

impl AudioDevice for HeadlessAudioDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn preferred_buffer_frames(&self) -> u32 {
        DEFAULT_DEVICE_FRAMES
    }

    fn start(&mut self, mut callback: DeviceCallback) -> Result<(), AudioError> {
        if self.fail_start {
            return Err(AudioError::Device(format!("{} refused to start", self.info.id)));
        }
        if !self.open {
            return Err(AudioError::Device(format!("{} is closed", self.info.id)));
        }
        if self.thread.is_some() {
            return Ok(());
        }

        let frames = match self.settings.buffer_frames {
            0 => DEFAULT_DEVICE_FRAMES,
            n => n,
        };
        let period = Duration::from_secs_f64(frames as f64 / self.settings.sample_rate as f64);
        let mut buffer = vec![0u8; frames as usize * self.settings.bytes_per_frame()];
        let capture = self.capture.clone();
        let probe = self.probe.clone();

        probe.running.fetch_add(1, Ordering::AcqRel);
        let spawned = ThreadHandle::spawn("keel-headless-audio", move |stop| {
            let mut next = Instant::now();
            while !stop.is_stop_requested() {
                callback(&mut buffer);
                if let Some(capture) = &capture {
                    capture.record(&buffer);
                }
                next += period;
                let now = Instant::now();
                if next > now {
                    std::thread::sleep(next - now);
                } else {
                    next = now;
                }
            }
            probe.running.fetch_sub(1, Ordering::AcqRel);
        });
        match spawned {
            Ok(handle) => {
                self.thread = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.probe.running.fetch_sub(1, Ordering::AcqRel);
                Err(err.into())
            }
        }
    }

    fn stop(&mut self) {
        if let Some(mut thread) = self.thread.take() {
            thread.request_stop();
            thread.join(Timeout::INFINITE);
        }
    }

    fn close(&mut self) {
        self.stop();
        if self.open {
            self.open = false;
            self.probe.open.fetch_sub(1, Ordering::AcqRel);
            debug!("Headless: closed audio device '{}'", self.info.id);
        }
    }

    fn is_running(&self) -> bool {
        self.thread.is_some()
    }
}

impl Drop for HeadlessAudioDevice {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventQueue;

    #[test]
    fn test_event_source_feeds_sink_in_order() {
        let mut window = HeadlessWindow::new(&WindowSettings::default());
        let source = window.event_source();
        std::thread::spawn(move || {
            source.push(Event::Char { ch: 'a' });
            source.push(Event::WindowResize { width: 320, height: 200 });
        })
        .join()
        .unwrap();

        let queue = EventQueue::new(4);
        window.pump_events(&queue.sink());
        assert_eq!(queue.pop(), Some(Event::Char { ch: 'a' }));
        assert_eq!(queue.pop(), Some(Event::WindowResize { width: 320, height: 200 }));
        assert_eq!(window.size(), (320, 200));
    }

    #[test]
    fn test_opengl_is_unavailable() {
        let mut backend = HeadlessBackend::new();
        let window = backend.create_window(&WindowSettings::default()).unwrap();
        let settings = VideoSettings { backend: VideoBackend::OpenGL, vsync: false };
        assert!(matches!(backend.create_video(&window, &settings), Err(PlatformError::PlatformUnavailable(_))));
    }

    #[test]
    fn test_software_video_takes_vsync_from_settings() {
        let mut backend = HeadlessBackend::new();
        let window = backend.create_window(&WindowSettings::default()).unwrap();
        let settings = VideoSettings { backend: VideoBackend::Software, vsync: true };
        let video = backend.create_video(&window, &settings).unwrap();
        assert!(video.vsync());
    }

    #[test]
    fn test_device_thread_calls_back_until_closed() {
        let mut audio = HeadlessAudio::new();
        let probe = audio.probe();
        let info = audio.enumerate_devices().unwrap().remove(0);
        let settings = AudioSettings { buffer_frames: 64, ..Default::default() };
        let mut device = audio.open_device(&info, &settings).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        device
            .start(Box::new(move |buf: &mut [u8]| {
                assert_eq!(buf.len(), 64 * 4);
                counted.fetch_add(1, Ordering::Relaxed);
            }))
            .unwrap();
        assert!(device.is_running());
        while calls.load(Ordering::Relaxed) < 3 {
            std::thread::sleep(Duration::from_millis(1));
        }
        device.close();
        assert!(!device.is_running());
        assert_eq!(probe.running_devices(), 0);
        assert_eq!(probe.open_devices(), 0);
        assert!(device.start(Box::new(|_: &mut [u8]| {})).is_err());
    }
}
