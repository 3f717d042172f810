#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![doc = include_str!("../README.md")]

use core::sync::atomic::{AtomicBool, Ordering};

pub mod api;
pub mod comm;
pub mod csma;
pub mod host;
pub mod idle;
pub mod isf;
pub mod kernel;
pub mod net;
pub mod queue;
pub mod radio;
pub mod session;
pub mod shared;

pub use comm::{ActiveSettings, CommBlock, CsmaParams, IdleState, NetConfig};
pub use kernel::{Kernel, KernelConfig, SysMutex, Task};
pub use queue::DirQueue;
pub use session::{DialogCall, NetState, Session, SessionStack};

/// Byte capacity of the TX and RX frame queues.
pub const QUEUE_LEN: usize = 256;
/// Depth of the session stack.
pub const SESSION_DEPTH: usize = 4;

/// Frame queue type used throughout the kernel and its trait contracts.
pub type FrameQueue = DirQueue<QUEUE_LEN>;
/// Session stack type used throughout the kernel and its trait contracts.
pub type Sessions = SessionStack<SESSION_DEPTH>;

/// Ticks are the Mode 2 MAC time unit (~0.977 ms, 1/1024 s).
///
/// Counters that may legitimately run negative (contention remaining, idle
/// event countdowns) use [`Ticks`]; durations handed to or from the outside
/// use `u16`.
pub type Ticks = i32;

/// Authentication context for building outbound payloads.
///
/// Key management is out of scope for the kernel; this only selects which
/// access level a payload builder should assume. Beacons are always built as
/// [`AuthLevel::Guest`].
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthLevel {
    Root,
    User,
    Guest,
}

/// A preempt cell shared between the kernel and the embedding's sleep loop.
///
/// Radio completion entry points raise it whenever the dispatcher must be
/// re-entered before its last returned sleep duration elapses. The embedding
/// clears it with [`Wake::take`] at each wake-up. This is the only state
/// shared across interrupt context; everything else is mutated under
/// `&mut Kernel` (or the [`shared::SharedKernel`] lock).
#[derive(Debug, Default)]
pub struct Wake(AtomicBool);

impl Wake {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Request immediate re-entry of the event manager.
    #[inline]
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Consume a pending preempt request.
    #[inline]
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
