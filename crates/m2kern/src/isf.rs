//! The configuration file store
//!
//! Persistent configuration lives in Indexed Subordinate Files (ISFs), a
//! record-oriented store the kernel reads at every idle-event firing. The
//! store itself is platform property; the kernel sees it through
//! [`IsfStore`]. Every multi-byte field is big-endian in the file — reads
//! and writes here never depend on host byte order.

use crate::Ticks;

/// Well-known file identifiers.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileId(pub u8);

impl FileId {
    pub const NETWORK_SETTINGS: Self = Self(0x00);
    pub const SUPPORTED_SETTINGS: Self = Self(0x01);
    pub const SLEEP_SCAN_SEQUENCE: Self = Self(0x04);
    pub const HOLD_SCAN_SEQUENCE: Self = Self(0x05);
    pub const BEACON_TRANSMIT_SEQUENCE: Self = Self(0x06);
    pub const REAL_TIME_SCHEDULER: Self = Self(0x07);
}

/// Field offsets within [`FileId::NETWORK_SETTINGS`].
pub mod netconf_offsets {
    pub const SUBNET: u16 = 0;
    pub const B_SUBNET: u16 = 1;
    pub const ACTIVE: u16 = 4;
    pub const DD_FLAGS: u16 = 6;
    pub const B_ATTEMPTS: u16 = 7;
    pub const HOLD_LIMIT: u16 = 8;
}

/// Offset of the supported-settings mask within
/// [`FileId::SUPPORTED_SETTINGS`].
pub const SUPPORTED_MASK_OFFSET: u16 = 8;

#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum IsfError {
    /// The file does not exist on this device.
    NoSuchFile,
    /// Read or write past the end of the file.
    OutOfBounds,
    /// The store rejected a write (read-only file, wear limit, ...).
    WriteRefused,
}

/// Read-mostly access to the ISF store.
///
/// The kernel performs exactly one write: persisting the active-settings
/// bitmap from [`change_settings`].
///
/// [`change_settings`]: crate::Kernel::change_settings
pub trait IsfStore {
    fn length(&self, file: FileId) -> Result<u16, IsfError>;
    fn read_u8(&self, file: FileId, offset: u16) -> Result<u8, IsfError>;

    fn read_u16_be(&self, file: FileId, offset: u16) -> Result<u16, IsfError> {
        let hi = self.read_u8(file, offset)?;
        let lo = self.read_u8(file, offset + 1)?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    fn write_u16_be(&mut self, file: FileId, offset: u16, value: u16) -> Result<(), IsfError>;
}

/// One hold/sleep scan-sequence record: 4 bytes on file.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanEntry {
    pub channel: u8,
    /// Bit 7 background scan, bit 6 ×1024 timeout, bits 5:0 timeout code.
    pub flags: u8,
    /// Ticks until the event after this one.
    pub next_interval: u16,
}

impl ScanEntry {
    pub const SIZE: u16 = 4;

    pub fn read<S: IsfStore>(store: &S, file: FileId, cursor: u16) -> Result<Self, IsfError> {
        Ok(Self {
            channel: store.read_u8(file, cursor)?,
            flags: store.read_u8(file, cursor + 1)?,
            next_interval: store.read_u16_be(file, cursor + 2)?,
        })
    }

    pub const fn is_background(&self) -> bool {
        self.flags & 0x80 != 0
    }

    /// Expanded listen window for this entry.
    pub fn rx_timeout(&self) -> u16 {
        decode_timeout(self.flags & 0x7F)
    }
}

/// One beacon-sequence record: 8 bytes on file.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconEntry {
    pub channel: u8,
    pub params: u8,
    /// ISF call template handed to the query protocol.
    pub call: [u8; 4],
    pub next_interval: u16,
}

impl BeaconEntry {
    pub const SIZE: u16 = 8;

    pub fn read<S: IsfStore>(store: &S, file: FileId, cursor: u16) -> Result<Self, IsfError> {
        Ok(Self {
            channel: store.read_u8(file, cursor)?,
            params: store.read_u8(file, cursor + 1)?,
            call: [
                store.read_u8(file, cursor + 2)?,
                store.read_u8(file, cursor + 3)?,
                store.read_u8(file, cursor + 4)?,
                store.read_u8(file, cursor + 5)?,
            ],
            next_interval: store.read_u16_be(file, cursor + 6)?,
        })
    }
}

/// One RTC schedule rule. Stored as four bytes `{mask, value}`, both
/// big-endian, at offset `(sched_file_id - 4) * 4`.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcRule {
    pub mask: u16,
    pub value: u16,
}

impl RtcRule {
    pub fn read_for<S: IsfStore>(store: &S, sequence: FileId) -> Result<Self, IsfError> {
        let offset = (sequence.0 as u16 - 4) * 4;
        Ok(Self {
            mask: store.read_u16_be(FileId::REAL_TIME_SCHEDULER, offset)?,
            value: store.read_u16_be(FileId::REAL_TIME_SCHEDULER, offset + 2)?,
        })
    }
}

/// Expand the 7-bit exp-mantissa timeout field into ticks.
///
/// Bits 2:0 mantissa, bits 5:3 exponent, bit 6 a ×1024 multiplier:
/// `ticks = (mantissa + 1) << exponent`, saturating at the tick ceiling.
pub fn decode_timeout(code: u8) -> u16 {
    let mantissa = (code & 0x07) as u32 + 1;
    let exponent = (code >> 3) & 0x07;
    let mut ticks = mantissa << exponent;
    if code & 0x40 != 0 {
        ticks <<= 10;
    }
    ticks.min(u16::MAX as u32) as u16
}

/// Inverse of [`decode_timeout`]: the smallest code whose expansion covers
/// `ticks`.
pub fn encode_timeout(ticks: u16) -> u8 {
    if ticks == 0 {
        return 0;
    }
    let mut best: Option<(u8, u32)> = None;
    for code in 0u8..0x80 {
        let span = decode_timeout(code) as u32;
        if span >= ticks as u32 {
            match best {
                Some((_, b)) if b <= span => {}
                _ => best = Some((code, span)),
            }
        }
    }
    best.map(|(c, _)| c).unwrap_or(0x7F)
}

/// Clamp a tick count into the dispatcher's sleep-return range.
pub fn clamp_eta(eta: Ticks) -> u16 {
    eta.clamp(0, u16::MAX as Ticks) as u16
}
