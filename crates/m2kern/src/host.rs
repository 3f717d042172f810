//! Platform services and kernel hooks
//!
//! [`Host`] collects everything the kernel needs from the platform besides
//! the radio: the general-purpose tick timer, the RTC alarm, the hardware
//! watchdog, and the hook set that applications may implement to observe or
//! steer the kernel. Every hook has a default no-op body, so a minimal port
//! only supplies the timer.

/// Which idle-time event a hook refers to.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleIdx {
    HoldScan = 0,
    SleepScan = 1,
    BeaconTx = 2,
    External = 3,
}

pub trait Host {
    /// Reset the general-purpose timer. The kernel calls this at the top of
    /// every dispatcher iteration; the time a task consumes is read back
    /// with [`Host::timer_ticks`].
    fn flush_timer(&mut self);

    /// Ticks elapsed since the last [`Host::flush_timer`].
    fn timer_ticks(&mut self) -> u16;

    /// Program the RTC alarm `sched_id` to fire when
    /// `rtc & mask == value & mask`. Only called when an idle event is
    /// schedule-bound.
    fn set_rtc_alarm(&mut self, sched_id: u8, mask: u16, value: u16) {
        let _ = (sched_id, mask, value);
    }

    /// Re-arm the hardware watchdog, if this platform has one.
    fn reset_watchdog(&mut self, period: u16) {
        let _ = period;
    }

    /// Application load hook, polled when the kernel is otherwise idle.
    /// Return true after creating work (usually a session) to keep the
    /// dispatcher looping.
    fn load_app(&mut self) -> bool {
        false
    }

    /// Fatal-error hook. Must not allocate or touch the radio.
    fn on_panic(&mut self, code: u8) {
        let _ = code;
    }

    /// A radio activity is starting; `event_no` is its RFA number.
    fn rfa_init(&mut self, event_no: u8) {
        let _ = event_no;
    }

    /// A radio activity finished; `code` is the driver's final status.
    fn rfa_terminate(&mut self, event_no: u8, code: i16) {
        let _ = (event_no, code);
    }

    /// An idle-time event is about to fire.
    fn prestart(&mut self, event: IdleIdx) {
        let _ = event;
    }

    /// The external event slot was dispatched.
    fn external_event(&mut self) {}
}
