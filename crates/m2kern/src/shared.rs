//! ISR-shareable kernel wrapper
//!
//! The bare [`Kernel`] is a plain owned value: perfect when the whole system
//! runs on one thread of control, but radio drivers usually complete from
//! interrupt context. [`SharedKernel`] wraps the kernel in a
//! [`BlockingMutex`] so completions can be delivered from an ISR or soft-IRQ
//! while the main loop owns it the rest of the time:
//!
//! ```ignore
//! static KERNEL: SharedKernel<CriticalSectionRawMutex, Rf, Net, Board, Store> =
//!     SharedKernel::const_new(CriticalSectionRawMutex::new(), kernel);
//!
//! // main loop
//! let sleep = KERNEL.event_manager(elapsed);
//!
//! // radio ISR
//! KERNEL.on_fg_rx_done(pcode, fcode);
//! ```
//!
//! Completion entry points only mutate kernel state and raise the [`Wake`]
//! cell — they never block inside the lock.
//!
//! [`Wake`]: crate::Wake

use mutex::{BlockingMutex, ConstInit, ScopedRawMutex};

use crate::host::Host;
use crate::isf::IsfStore;
use crate::kernel::Kernel;
use crate::net::NetLayer;
use crate::radio::Radio;

pub struct SharedKernel<RM: ScopedRawMutex, R, N, H, S> {
    inner: BlockingMutex<RM, Kernel<R, N, H, S>>,
}

impl<RM, R, N, H, S> SharedKernel<RM, R, N, H, S>
where
    RM: ScopedRawMutex + ConstInit,
{
    pub const fn new(kernel: Kernel<R, N, H, S>) -> Self {
        Self {
            inner: BlockingMutex::new(kernel),
        }
    }
}

impl<RM, R, N, H, S> SharedKernel<RM, R, N, H, S>
where
    RM: ScopedRawMutex,
{
    pub const fn const_new(raw: RM, kernel: Kernel<R, N, H, S>) -> Self {
        Self {
            inner: BlockingMutex::const_new(raw, kernel),
        }
    }
}

impl<RM, R, N, H, S> SharedKernel<RM, R, N, H, S>
where
    RM: ScopedRawMutex,
    R: Radio,
    N: NetLayer,
    H: Host,
    S: IsfStore,
{
    /// Run arbitrary kernel operations under the lock.
    pub fn with<U>(&self, f: impl FnOnce(&mut Kernel<R, N, H, S>) -> U) -> U {
        self.inner.with_lock(f)
    }

    /// Drive the dispatcher. See [`Kernel::event_manager`].
    pub fn event_manager(&self, elapsed: u16) -> u16 {
        self.inner.with_lock(|k| k.event_manager(elapsed))
    }

    pub fn on_bg_rx_done(&self, scode: i16, fcode: i16) {
        self.inner.with_lock(|k| k.on_bg_rx_done(scode, fcode));
    }

    pub fn on_fg_rx_done(&self, pcode: i16, fcode: i16) {
        self.inner.with_lock(|k| k.on_fg_rx_done(pcode, fcode));
    }

    pub fn on_fg_tx_done(&self, pcode: i16) {
        self.inner.with_lock(|k| k.on_fg_tx_done(pcode));
    }

    pub fn on_bg_tx_done(&self, flcode: i16) {
        self.inner.with_lock(|k| k.on_bg_tx_done(flcode));
    }

    /// Cancel in-progress work and preempt the main loop.
    pub fn start_dialog(&self) -> u16 {
        self.inner.with_lock(|k| k.start_dialog())
    }
}
