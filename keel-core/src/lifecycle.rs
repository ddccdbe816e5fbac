//! Subsystem identities, flags, and the state registry.
//!
//! The registry is the single source of truth for "is X up". Every state
//! change goes through [`Registry::transition`], which rejects anything
//! outside the lifecycle graph:
//!
//! ```text
//! Uninitialized -> Initializing -> Ready -> ShuttingDown -> Uninitialized
//!                  Initializing -> Uninitialized   (failed bring-up)
//! ```

use bitflags::bitflags;
use log::{debug, warn};
use std::collections::VecDeque;
use std::fmt;

bitflags! {
    /// Optional subsystems to bring up. Memory and synchronization are
    /// always initialized.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct InitFlags: u32 {
        const WINDOW = 1 << 0;
        /// Requires `WINDOW`.
        const VIDEO = 1 << 1;
        const AUDIO = 1 << 2;
        const CONSOLE = 1 << 3;
        const ALL = Self::WINDOW.bits() | Self::VIDEO.bits() | Self::AUDIO.bits() | Self::CONSOLE.bits();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Memory,
    Synchronization,
    Window,
    Video,
    Audio,
    Console,
}

impl Subsystem {
    /// Bring-up order. Teardown walks it backwards.
    pub const ORDER: [Subsystem; 6] = [
        Subsystem::Memory,
        Subsystem::Synchronization,
        Subsystem::Window,
        Subsystem::Video,
        Subsystem::Audio,
        Subsystem::Console,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// The flag that requests this subsystem, or `None` if it is mandatory.
    pub fn flag(self) -> Option<InitFlags> {
        match self {
            Subsystem::Memory | Subsystem::Synchronization => None,
            Subsystem::Window => Some(InitFlags::WINDOW),
            Subsystem::Video => Some(InitFlags::VIDEO),
            Subsystem::Audio => Some(InitFlags::AUDIO),
            Subsystem::Console => Some(InitFlags::CONSOLE),
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SubsystemState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    ShuttingDown,
}

impl SubsystemState {
    pub fn can_transition_to(self, next: SubsystemState) -> bool {
        use SubsystemState::*;
        matches!(
            (self, next),
            (Uninitialized, Initializing)
                | (Initializing, Ready)
                | (Initializing, Uninitialized)
                | (Ready, ShuttingDown)
                | (ShuttingDown, Uninitialized)
        )
    }
}

/// Per-subsystem state table.
#[derive(Debug, Default)]
pub struct Registry {
    states: [SubsystemState; 6],
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, kind: Subsystem) -> SubsystemState {
        self.states[kind.index()]
    }

    pub fn is_ready(&self, kind: Subsystem) -> bool {
        self.state(kind) == SubsystemState::Ready
    }

    /// Moves `kind` to `to`.
    ///
    /// # Panics
    /// In debug builds, on a transition outside the lifecycle graph. Release
    /// builds log it and apply the transition anyway.
    pub fn transition(&mut self, kind: Subsystem, to: SubsystemState) {
        let from = self.state(kind);
        debug_assert!(from.can_transition_to(to), "illegal {} transition {:?} -> {:?}", kind, from, to);
        if !from.can_transition_to(to) {
            warn!("Lifecycle: illegal {} transition {:?} -> {:?}", kind, from, to);
        }
        debug!("Lifecycle: {} {:?} -> {:?}", kind, from, to);
        self.states[kind.index()] = to;
    }

    pub fn all_uninitialized(&self) -> bool {
        self.states.iter().all(|s| *s == SubsystemState::Uninitialized)
    }

    /// Ready subsystems, last brought up first.
    pub fn ready_in_reverse(&self) -> Vec<Subsystem> {
        Subsystem::ORDER.iter().rev().copied().filter(|s| self.is_ready(*s)).collect()
    }
}

pub const ERROR_LOG_CAPACITY: usize = 16;

/// The most recent error messages, oldest dropped first.
#[derive(Debug)]
pub struct ErrorLog {
    entries: VecDeque<String>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self { entries: VecDeque::with_capacity(ERROR_LOG_CAPACITY) }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        if self.entries.len() == ERROR_LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(message.into());
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn latest(&self) -> Option<&str> {
        self.entries.back().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new()
    }
}
