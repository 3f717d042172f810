//! Network and transport layer contract
//!
//! Frame parsing and construction (M2NP headers and footers, M2AdvP flood
//! adverts, M2QP queries) belong to the layers above the MAC. The kernel
//! calls them through [`NetLayer`] at fixed points: scoring a received
//! request, parsing a background frame, building beacon payloads, and
//! opening or closing an advertising flood.

use crate::{AuthLevel, FrameQueue, Session, Sessions};

/// Routing material copied into the network layer when a unicast or anycast
/// request is opened.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingTmpl {
    pub hop_code: u8,
    pub hop_ext: u8,
    pub orig_addr: [u8; 8],
    pub dest_addr: [u8; 8],
}

/// The flood could not be prepared (advert framing failed or the duration
/// cannot be met on this channel).
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloodError;

/// The beacon payload could not be built (bad call template, missing file).
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconError;

pub trait NetLayer {
    /// Store routing material for the next header build.
    fn load_routing(&mut self, routing: &RoutingTmpl);

    /// Write an M2NP header for `session` into the TX queue. `addr` is the
    /// addressing control byte (bit 6 set = broadcast); `nack` is zero for
    /// normal requests.
    fn build_header(&mut self, session: &Session, addr: u8, nack: u8, txq: &mut FrameQueue);

    /// Finalise the frame footer on the TX queue.
    fn build_footer(&mut self, session: &Session, txq: &mut FrameQueue);

    /// Score a received foreground frame against this device. Non-negative
    /// means the frame is addressed to us and a response (if any) has been
    /// staged in `txq`; negative means it is not for us.
    fn route_foreground(
        &mut self,
        session: &Session,
        rxq: &FrameQueue,
        txq: &mut FrameQueue,
    ) -> i16;

    /// Parse a received background frame. On success the layer pushes a
    /// follow-up session (typically a scheduled foreground scan).
    fn parse_background(&mut self, rxq: &FrameQueue, sessions: &mut Sessions);

    /// Mark the current frame of a multiframe datastream as damaged.
    fn mark_ds_frame(&mut self, session: &Session, rxq: &mut FrameQueue);

    /// Append an ISF-call payload (beacon body) under the given
    /// authentication context. `call_type` selects announcement form.
    fn isf_call(
        &mut self,
        call_type: u8,
        template: &[u8; 4],
        auth: AuthLevel,
        txq: &mut FrameQueue,
    ) -> Result<(), BeaconError>;

    /// Stage an advertising flood of `duration` ticks for `session`.
    fn open_flood(
        &mut self,
        session: &Session,
        duration: u16,
        txq: &mut FrameQueue,
    ) -> Result<(), FloodError>;

    /// Swap control back from the flood to the foreground request frame.
    fn close_flood(&mut self, txq: &mut FrameQueue);
}
