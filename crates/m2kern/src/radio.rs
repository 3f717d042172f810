//! The radio driver contract
//!
//! The kernel never touches hardware; it drives a [`Radio`] implementation
//! and tracks what the radio is doing in an [`RfActivity`] record. The
//! driver completes asynchronously: when an RX, TX, or flood operation ends,
//! the embedding delivers the completion into the matching
//! `Kernel::on_*_done` entry point (from ISR context via
//! [`SharedKernel`](crate::shared::SharedKernel) if needed).

use crate::Ticks;

/// Outcome of one CSMA-CA attempt ([`Radio::tx_csma`]).
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsmaStep {
    /// Clear channel; data transfer has begun.
    Granted,
    /// Carrier sensed; back off and retry within the contention window.
    CcaFail,
    /// The configured channel cannot be used at all.
    BadChannel,
    /// Radio is not ready; retry after this many ticks.
    Wait(u16),
}

/// Completion report for a receive operation.
///
/// `code` is the driver's status: for foreground RX, non-negative is the
/// number of frames still expected (0 = packet complete) and negative is a
/// listen timeout or abort. For background scan, `-1` asks for a re-arm
/// (CRC/init retry) and other negatives are terminal. `crc` is nonzero when
/// the received frame failed its CRC.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxDone {
    pub code: i16,
    pub crc: i16,
}

impl RxDone {
    /// The canonical listen-timeout report.
    pub const TIMEOUT: Self = Self { code: -2, crc: 0 };
}

/// The Mode 2 radio driver.
///
/// All operations are non-blocking arms of hardware processes; ticks-level
/// timing stays with the kernel. The PRNG rides on this trait because the
/// radio core is the platform's entropy source.
pub trait Radio {
    /// Arm background-frame reception on `channel`.
    fn init_rx_background(&mut self, channel: u8);
    /// Arm foreground-frame reception on `channel`, expecting roughly
    /// `est_frames` frames (0 = unknown).
    fn init_rx_foreground(&mut self, channel: u8, est_frames: u8);
    /// Terminate an armed RX now, reporting how it ended. The kernel calls
    /// this when the software listen window expires.
    fn force_rx_timeout(&mut self) -> RxDone;
    /// Re-arm reception without leaving the RX state (mid-dialog retry).
    fn reenter_rx(&mut self);

    /// Arm background (advert/flood) transmission of the queued frame.
    fn init_tx_background(&mut self);
    /// Arm foreground transmission, expecting roughly `est_frames` frames.
    fn init_tx_foreground(&mut self, est_frames: u8);
    /// Run one CSMA-CA attempt against the armed TX.
    fn tx_csma(&mut self) -> CsmaStep;
    /// Requeue the last packet for an immediate resend (CSMA off).
    fn prep_resend(&mut self);
    /// Stop dumping flood adverts and let the flood completion fire.
    fn stop_flood(&mut self);

    /// Airtime of a `bytes`-long frame, in ticks.
    fn pkt_duration(&self, bytes: u16) -> u16;
    /// Default turnaround guard (Tgd) for `channel`, in ticks.
    fn default_tgd(&self, channel: u8) -> u16;
    /// Physical guard time Tg, in ticks.
    fn guard_time(&self) -> u16;
    /// RSSI of the most recent reception, in dBm.
    fn rssi(&self) -> i16;
    /// Link-loss ceiling from the PHY/MAC configuration, in dB.
    fn link_quality_limit(&self) -> u8;

    /// Abort whatever the radio is doing. The driver must still deliver the
    /// completion (with an error code) so the state machine unwinds.
    fn kill(&mut self);
    /// Power the radio down.
    fn sleep(&mut self);
    /// Suppress driver callbacks during idle transitions.
    fn gag(&mut self);

    fn rand_u8(&mut self) -> u8;
    fn rand_u16(&mut self) -> u16;
}

/// Radio-activity (RFA) event numbers. At most one is active; `IDLE` means
/// no session dialog owns the radio.
pub mod rfa {
    pub const IDLE: u8 = 0;
    pub const BG_SCAN: u8 = 1;
    pub const FG_SCAN: u8 = 2;
    pub const BG_TX: u8 = 3;
    pub const FG_TX: u8 = 4;
    /// `BG_TX + 2`: flood data in flight.
    pub const BG_DATA: u8 = 5;
    /// `FG_TX + 2`: foreground data in flight.
    pub const FG_DATA: u8 = 6;
}

/// The single radio-activity record.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, Default)]
pub struct RfActivity {
    pub event_no: u8,
    /// Ticks until the kernel must service this activity again.
    pub nextevent: Ticks,
}

impl RfActivity {
    pub const fn idle() -> Self {
        Self {
            event_no: rfa::IDLE,
            nextevent: 0,
        }
    }

    pub fn set(&mut self, event_no: u8, nextevent: Ticks) {
        self.event_no = event_no;
        self.nextevent = nextevent;
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.event_no == rfa::IDLE
    }

    /// True while TX data (foreground or flood) is on the air.
    #[inline]
    pub fn in_flight(&self) -> bool {
        self.event_no >= rfa::BG_DATA
    }
}
