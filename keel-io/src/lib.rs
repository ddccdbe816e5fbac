//! Keel I/O: the hardware abstraction layer.
//!
//! Everything in here talks to the operating system directly: atomics with
//! explicit ordering, blocking primitives with uniform timeout semantics,
//! virtual memory reservation, and the thin collaborator helpers (files,
//! paths, dynamic libraries, console, hardware topology) that `keel-core`
//! consumes. Exactly one implementation of each OS-facing function is
//! compiled per build target.

pub mod atomic;
pub mod console;
pub mod fs;
pub mod library;
pub mod memory;
pub mod path;
pub mod platform;
pub mod ring;
pub mod sync;

// Re-exports for easier access by keel-core
pub use memory::{AlignedBuffer, Arena, MemoryError, Reservation};
pub use ring::{byte_ring, RingConsumer, RingProducer};
pub use sync::{
    ConditionSignal, Mutex, MutexGuard, ResetMode, Semaphore, StopFlag, SyncError, ThreadBuilder,
    ThreadExit, ThreadHandle, ThreadState, Timeout, WaitStatus,
};
pub use platform::affinity;
pub use platform::topology::SystemTopology;
pub use console::{Console, StdConsole};
pub use library::{Library, LibraryError};
