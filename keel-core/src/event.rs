//! Platform events and the bounded queue that carries them.
//!
//! The native event source pushes through an [`EventSink`]; the application
//! thread pops from the [`EventQueue`]. The queue is lock-free and bounded.
//! When it is full the oldest event is discarded to make room, and the loss is
//! counted in [`EventQueue::dropped`]. A `WindowClose` additionally latches
//! the quit flag at push time, so a close request survives even if the event
//! itself is later overwritten.

use bitflags::bitflags;
use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub const DEFAULT_EVENT_CAPACITY: usize = 32_768;

pub type KeyCode = u32;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        const SHIFT = 1 << 0;
        const CTRL = 1 << 1;
        const ALT = 1 << 2;
        const SUPER = 1 << 3;
    }
}

bitflags! {
    /// Buttons held during a mouse move.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MouseButtons: u8 {
        const LEFT = 1 << 0;
        const RIGHT = 1 << 1;
        const MIDDLE = 1 << 2;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u8),
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[non_exhaustive]
pub enum Event {
    WindowClose,
    WindowResize { width: u32, height: u32 },
    WindowFocus { focused: bool },
    Key { code: KeyCode, down: bool, modifiers: Modifiers },
    Char { ch: char },
    MouseMove { x: i32, y: i32, buttons: MouseButtons },
    MouseButton { button: MouseButton, down: bool, x: i32, y: i32 },
    MouseWheel { delta: f32, x: i32, y: i32 },
    GamepadConnection { index: u32, connected: bool },
    /// A native event with no mapping; `kind` is the raw native code.
    Unknown { kind: u32 },
}

struct Shared {
    queue: ArrayQueue<Event>,
    dropped: AtomicU64,
    quit: AtomicBool,
}

/// Consumer side of the event queue.
pub struct EventQueue {
    shared: Arc<Shared>,
}

impl EventQueue {
    /// # Panics
    /// If `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: ArrayQueue::new(capacity),
                dropped: AtomicU64::new(0),
                quit: AtomicBool::new(false),
            }),
        }
    }

    /// Producer handle for the native event source.
    pub fn sink(&self) -> EventSink {
        EventSink { shared: self.shared.clone() }
    }

    /// Oldest pending event. Never blocks.
    pub fn pop(&self) -> Option<Event> {
        self.shared.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.shared.queue.capacity()
    }

    /// Events discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn should_quit(&self) -> bool {
        self.shared.quit.load(Ordering::Acquire)
    }

    pub fn request_quit(&self) {
        self.shared.quit.store(true, Ordering::Release);
    }
}

/// Producer handle. Clones share one queue and are treated as one logical
/// producer.
#[derive(Clone)]
pub struct EventSink {
    shared: Arc<Shared>,
}

impl EventSink {
    pub fn push(&self, event: Event) {
        if let Event::WindowClose = event {
            self.shared.quit.store(true, Ordering::Release);
        }
        if self.shared.queue.force_push(event).is_some() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn request_quit(&self) {
        self.shared.quit.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = EventQueue::new(8);
        let sink = queue.sink();
        sink.push(Event::WindowFocus { focused: true });
        sink.push(Event::Char { ch: 'k' });
        sink.push(Event::WindowResize { width: 640, height: 480 });

        assert_eq!(queue.pop(), Some(Event::WindowFocus { focused: true }));
        assert_eq!(queue.pop(), Some(Event::Char { ch: 'k' }));
        assert_eq!(queue.pop(), Some(Event::WindowResize { width: 640, height: 480 }));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let queue = EventQueue::new(4);
        let sink = queue.sink();
        for kind in 0..6 {
            sink.push(Event::Unknown { kind });
        }
        assert_eq!(queue.dropped(), 2);
        let kinds: Vec<u32> = std::iter::from_fn(|| queue.pop())
            .map(|e| match e {
                Event::Unknown { kind } => kind,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(kinds, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_close_latches_quit_even_when_dropped() {
        let queue = EventQueue::new(2);
        let sink = queue.sink();
        sink.push(Event::WindowClose);
        sink.push(Event::Unknown { kind: 1 });
        sink.push(Event::Unknown { kind: 2 });
        assert!(queue.should_quit());
        assert_eq!(queue.pop(), Some(Event::Unknown { kind: 1 }));
    }

    #[test]
    fn test_cross_thread_producer() {
        use rand::Rng;
        let queue = EventQueue::new(DEFAULT_EVENT_CAPACITY);
        let sink = queue.sink();
        let count = rand::thread_rng().gen_range(100..1000u32);
        std::thread::spawn(move || {
            for kind in 0..count {
                sink.push(Event::Unknown { kind });
            }
        })
        .join()
        .unwrap();

        let mut expected = 0;
        while let Some(Event::Unknown { kind }) = queue.pop() {
            assert_eq!(kind, expected);
            expected += 1;
        }
        assert_eq!(expected, count);
        assert_eq!(queue.dropped(), 0);
    }
}
