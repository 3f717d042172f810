//! Per-dialog MAC parameters and persisted network configuration
//!
//! [`CommBlock`] is the DLL communication block: everything the radio tasks
//! need to run one dialog (contention window, listen timeout, redundancy,
//! channel lists, CSMA discipline). It is rewritten at every session or
//! idle-event initialisation. [`NetConfig`] mirrors the network-settings ISF
//! and only changes on [`refresh`].
//!
//! [`refresh`]: crate::Kernel::refresh

use heapless::Vec;

use crate::Ticks;

/// Channels a dialog may use on one side (TX or RX).
pub type ChanList = Vec<u8, 8>;

/// CSMA-CA parameter byte.
///
/// Bit 2 selects A2P (slotted, whole-packet-in-window) contention, bits 3–4
/// the backoff discipline, bit 5 MAC-layer carrier sensing, bit 6 disables
/// CSMA entirely (used for immediate resends and post-flood requests).
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsmaParams(pub u8);

impl CsmaParams {
    pub const NA2P: Self = Self(0);
    pub const A2P: Self = Self(0x04);
    pub const MAC_CA: Self = Self(0x20);
    pub const NO_CSMA: Self = Self(0x40);

    const MODE_SHIFT: u8 = 3;
    const MODE_MASK: u8 = 0x18;

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    pub const fn is_a2p(self) -> bool {
        self.contains(Self::A2P)
    }

    pub fn with_mode(self, mode: CsmaMode) -> Self {
        Self((self.0 & !Self::MODE_MASK) | ((mode as u8) << Self::MODE_SHIFT))
    }

    pub fn mode(self) -> CsmaMode {
        match (self.0 & Self::MODE_MASK) >> Self::MODE_SHIFT {
            0 => CsmaMode::Rigd,
            1 => CsmaMode::Raind,
            2 => CsmaMode::Aind,
            _ => CsmaMode::Default,
        }
    }
}

/// Backoff discipline selected by [`CsmaParams`] bits 3–4.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsmaMode {
    /// Random Increase Geometric Decay: halving subslots, random offsets.
    Rigd = 0,
    /// Randomized Additive Increase No Decay: fixed slots, random start.
    Raind = 1,
    /// Additive Increase No Decay: fixed slots from zero.
    Aind = 2,
    /// Plain guard-time retry.
    Default = 3,
}

/// The DLL communication block.
#[derive(Debug, Default)]
pub struct CommBlock {
    /// Contention window total, in ticks.
    pub tc: Ticks,
    /// Contention remaining. `tca <= tc` at all times; CSMA fails when it
    /// runs out.
    pub tca: Ticks,
    /// Listen window for the next RX phase, in ticks. Zero means no response
    /// is expected.
    pub rx_timeout: u16,
    /// Remaining (re-)transmissions for the current dialog.
    pub redundants: u8,
    pub csmaca: CsmaParams,
    pub tx_chanlist: ChanList,
    pub rx_chanlist: ChanList,
}

impl CommBlock {
    pub fn new() -> Self {
        Self {
            csmaca: CsmaParams::NA2P.union(CsmaParams::MAC_CA),
            ..Default::default()
        }
    }

    /// Point both channel lists at a single channel.
    pub fn set_single_channel(&mut self, channel: u8) {
        self.tx_chanlist.clear();
        self.rx_chanlist.clear();
        let _ = self.tx_chanlist.push(channel);
        let _ = self.rx_chanlist.push(channel);
    }

    /// Replace the RX channel list with a single channel.
    pub fn set_rx_channel(&mut self, channel: u8) {
        self.rx_chanlist.clear();
        let _ = self.rx_chanlist.push(channel);
    }
}

impl Default for CsmaParams {
    fn default() -> Self {
        Self::NA2P.union(Self::MAC_CA)
    }
}

/// Device idle policy. Endpoints may sleep; every other class collapses to
/// hold; off disables all idle-time events.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdleState {
    Off = 0,
    Sleep = 1,
    #[default]
    Hold = 2,
}

/// Active-settings bitmap persisted in the network-settings ISF.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActiveSettings(pub u16);

impl ActiveSettings {
    pub const CLASS_MASK: u16 = 0x0700;
    pub const GATEWAY: u16 = 0x0400;
    pub const SUBCONTROLLER: u16 = 0x0200;
    pub const ENDPOINT: u16 = 0x0100;

    pub const SLEEP_SCHED: u16 = 0x0010;
    pub const HOLD_SCHED: u16 = 0x0020;
    pub const BEACON_SCHED: u16 = 0x0040;

    pub const fn contains(self, bits: u16) -> bool {
        self.0 & bits == bits
    }

    pub const fn class(self) -> u16 {
        self.0 & Self::CLASS_MASK
    }

    pub const fn is_endpoint(self) -> bool {
        self.class() == Self::ENDPOINT
    }

    /// The idle state this device class defaults to when nothing is pending.
    pub fn default_idle(self) -> IdleState {
        if self.class() >= Self::SUBCONTROLLER {
            IdleState::Hold
        } else if self.contains(Self::ENDPOINT) {
            IdleState::Sleep
        } else {
            IdleState::Off
        }
    }
}

/// Persisted network configuration (network-settings ISF image).
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, Default)]
pub struct NetConfig {
    pub subnet: u8,
    /// Subnet used for beacon dialogs.
    pub b_subnet: u8,
    /// Default device-discovery frame flags.
    pub dd_flags: u8,
    /// Beacon redundancy; zero disables beaconing.
    pub b_attempts: u8,
    pub active: ActiveSettings,
    /// Hold cycles before an endpoint descends to sleep.
    pub hold_limit: u16,
}
