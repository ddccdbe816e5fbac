use crate::error::PlatformError;
use crate::event::{Event, EventQueue, EventSink};
use log::debug;

/// What a backend's window must provide.
pub trait NativeWindow: Send {
    fn title(&self) -> &str;
    fn set_title(&mut self, title: &str);
    fn size(&self) -> (u32, u32);

    /// Requests a new client area. The native side reports the size it
    /// actually got as a `WindowResize` event.
    fn set_size(&mut self, width: u32, height: u32) -> Result<(), PlatformError>;

    /// Top-left corner of the window on the desktop.
    fn position(&self) -> (i32, i32);
    fn set_position(&mut self, x: i32, y: i32);

    fn set_fullscreen(&mut self, fullscreen: bool) -> Result<(), PlatformError>;
    fn is_fullscreen(&self) -> bool;
    fn is_resizable(&self) -> bool;
    fn set_resizable(&mut self, resizable: bool);
    fn is_cursor_enabled(&self) -> bool;
    fn set_cursor_enabled(&mut self, enabled: bool);

    /// Text currently on the clipboard, if any.
    fn clipboard_text(&self) -> Option<String>;
    fn set_clipboard_text(&mut self, text: &str) -> Result<(), PlatformError>;

    /// Translates every pending native event and pushes it into `sink`.
    /// Must not block.
    fn pump_events(&mut self, sink: &EventSink);
}

pub type ResizeCallback = Box<dyn FnMut(u32, u32) + Send>;

/// A native window plus its event queue and resize bookkeeping.
///
/// Polling a `WindowResize` updates [`Window::size`] right away but defers
/// the reaction: the new size is parked until the next frame boundary, where
/// the video context and the `on_resize` callbacks see it, in that order.
pub struct Window<W: NativeWindow> {
    native: W,
    events: EventQueue,
    sink: EventSink,
    size: (u32, u32),
    pending_resize: Option<(u32, u32)>,
    resize_callbacks: Vec<ResizeCallback>,
}

impl<W: NativeWindow> Window<W> {
    pub fn new(native: W, event_capacity: usize) -> Self {
        let events = EventQueue::new(event_capacity);
        let sink = events.sink();
        let size = native.size();
        Self { native, events, sink, size, pending_resize: None, resize_callbacks: Vec::new() }
    }

    /// Pumps the native source. Returns `false` once quit has been requested.
    pub fn update(&mut self) -> bool {
        self.native.pump_events(&self.sink);
        !self.events.should_quit()
    }

    pub fn poll_event(&mut self) -> Option<Event> {
        let event = self.events.pop()?;
        if let Event::WindowResize { width, height } = event {
            self.size = (width, height);
            self.pending_resize = Some((width, height));
        }
        Some(event)
    }

    pub fn should_quit(&self) -> bool {
        self.events.should_quit()
    }

    pub fn request_quit(&self) {
        self.events.request_quit();
    }

    pub fn on_resize<F>(&mut self, callback: F)
    where
        F: FnMut(u32, u32) + Send + 'static,
    {
        self.resize_callbacks.push(Box::new(callback));
    }

    pub(crate) fn take_pending_resize(&mut self) -> Option<(u32, u32)> {
        self.pending_resize.take()
    }

    pub(crate) fn notify_resize(&mut self, width: u32, height: u32) {
        debug!("Window: delivering resize {}x{} to {} callbacks", width, height, self.resize_callbacks.len());
        for callback in self.resize_callbacks.iter_mut() {
            callback(width, height);
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn title(&self) -> &str {
        self.native.title()
    }

    pub fn set_title(&mut self, title: &str) {
        self.native.set_title(title);
    }

    /// Asks for a new client area. [`Window::size`] follows once the
    /// resulting `WindowResize` has been polled.
    pub fn set_size(&mut self, width: u32, height: u32) -> Result<(), PlatformError> {
        if width == 0 || height == 0 {
            return Err(PlatformError::InvalidConfiguration(format!(
                "window size {}x{} must be non-zero",
                width, height
            )));
        }
        self.native.set_size(width, height)
    }

    pub fn position(&self) -> (i32, i32) {
        self.native.position()
    }

    pub fn set_position(&mut self, x: i32, y: i32) {
        self.native.set_position(x, y);
    }

    pub fn set_fullscreen(&mut self, fullscreen: bool) -> Result<(), PlatformError> {
        self.native.set_fullscreen(fullscreen)
    }

    pub fn is_fullscreen(&self) -> bool {
        self.native.is_fullscreen()
    }

    pub fn is_resizable(&self) -> bool {
        self.native.is_resizable()
    }

    pub fn set_resizable(&mut self, resizable: bool) {
        self.native.set_resizable(resizable);
    }

    pub fn is_cursor_enabled(&self) -> bool {
        self.native.is_cursor_enabled()
    }

    pub fn set_cursor_enabled(&mut self, enabled: bool) {
        self.native.set_cursor_enabled(enabled);
    }

    pub fn clipboard_text(&self) -> Option<String> {
        self.native.clipboard_text()
    }

    pub fn set_clipboard_text(&mut self, text: &str) -> Result<(), PlatformError> {
        self.native.set_clipboard_text(text)
    }

    pub fn dropped_events(&self) -> u64 {
        self.events.dropped()
    }

    /// Extra producer handle, e.g. for an input thread.
    pub fn event_sink(&self) -> EventSink {
        self.sink.clone()
    }

    pub fn native(&self) -> &W {
        &self.native
    }

    pub fn native_mut(&mut self) -> &mut W {
        &mut self.native
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessWindow;
    use crate::settings::WindowSettings;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn window() -> Window<HeadlessWindow> {
        Window::new(HeadlessWindow::new(&WindowSettings::default()), 16)
    }

    #[test]
    fn test_resize_is_recorded_then_delivered_once() {
        let mut win = window();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        win.on_resize(move |w, h| seen_cb.lock().push((w, h)));

        win.native().event_source().push(Event::WindowResize { width: 1024, height: 768 });
        assert!(win.update());
        assert_eq!(win.poll_event(), Some(Event::WindowResize { width: 1024, height: 768 }));
        assert_eq!(win.size(), (1024, 768));

        let pending = win.take_pending_resize().unwrap();
        win.notify_resize(pending.0, pending.1);
        assert!(win.take_pending_resize().is_none());
        assert_eq!(*seen.lock(), vec![(1024, 768)]);
    }

    #[test]
    fn test_close_stops_update() {
        let mut win = window();
        win.native().event_source().push(Event::WindowClose);
        assert!(!win.update());
        assert_eq!(win.poll_event(), Some(Event::WindowClose));
        assert!(win.should_quit());
    }

    #[test]
    fn test_set_size_arrives_as_resize_event() {
        let mut win = window();
        win.set_size(640, 480).unwrap();
        assert_eq!(win.size(), (800, 600));
        assert!(win.update());
        assert_eq!(win.poll_event(), Some(Event::WindowResize { width: 640, height: 480 }));
        assert_eq!(win.size(), (640, 480));
        assert_eq!(win.take_pending_resize(), Some((640, 480)));

        assert!(matches!(win.set_size(0, 480), Err(PlatformError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_position_cursor_and_clipboard() {
        let mut win = window();
        win.set_position(-20, 35);
        assert_eq!(win.position(), (-20, 35));

        assert!(win.is_cursor_enabled());
        win.set_cursor_enabled(false);
        assert!(!win.is_cursor_enabled());

        assert_eq!(win.clipboard_text(), None);
        win.set_clipboard_text("copied").unwrap();
        assert_eq!(win.clipboard_text().as_deref(), Some("copied"));
    }

    #[test]
    fn test_resizable_follows_settings() {
        let settings = WindowSettings { resizable: false, ..Default::default() };
        let mut win = Window::new(HeadlessWindow::new(&settings), 16);
        assert!(!win.is_resizable());
        win.set_resizable(true);
        assert!(win.is_resizable());
    }

    #[test]
    fn test_title_and_fullscreen() {
        let mut win = window();
        assert_eq!(win.title(), "Keel Window");
        win.set_title("Renamed");
        assert_eq!(win.title(), "Renamed");
        win.set_fullscreen(true).unwrap();
        assert!(win.is_fullscreen());
    }
}
