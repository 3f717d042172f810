//! Flow and congestion control
//!
//! Mode 2 contention is time-sliced: a dialog gets a contention window of
//! `tc` ticks, counted down in `tca`, and the discipline selected by
//! [`CsmaParams`] decides where in the window transmission attempts land.
//! [`fc_init`] picks the first offset when a TX activity starts; [`fc_loop`]
//! picks each subsequent offset after a clear-channel failure.

use crate::comm::{ChanList, CommBlock, CsmaMode};
use crate::radio::Radio;
use crate::CsmaParams;

/// First TX backoff for a freshly initialised TX activity, in ticks.
///
/// Expects `tca == tc` on entry.
pub fn fc_init<R: Radio>(comm: &mut CommBlock, radio: &mut R, first_frame_len: u8) -> u16 {
    match comm.csmaca.mode() {
        CsmaMode::Rigd => rigd_new_slot(comm, radio),
        CsmaMode::Raind => {
            let span = comm.tca - radio.pkt_duration(first_frame_len as u16) as i32;
            if span <= 0 {
                0
            } else {
                radio.rand_u16() % span as u16
            }
        }
        CsmaMode::Aind | CsmaMode::Default => 0,
    }
}

/// Subsequent TX backoff after a carrier-sense failure, in ticks.
pub fn fc_loop<R: Radio>(comm: &mut CommBlock, radio: &mut R, first_frame_len: u8) -> u16 {
    match comm.csmaca.mode() {
        CsmaMode::Rigd => rigd_next_slot(comm).saturating_add(rigd_new_slot(comm, radio)),
        CsmaMode::Raind | CsmaMode::Aind => aind_next_slot(radio, first_frame_len),
        CsmaMode::Default => radio.guard_time(),
    }
}

/// Reserved: weight TX slot selection by the quality of the answered query.
/// Higher scores may eventually claim earlier slots; today the score is
/// accepted and ignored.
pub fn fc_eval(comm: &mut CommBlock, query_score: i16) {
    let _ = (comm, query_score);
}

/// Halve the contention window and pick a random offset inside the new
/// subslot. Once `tc` decays to nothing the offset is 0 and `tca` follows it
/// down, which fails the CSMA process on the next check.
fn rigd_new_slot<R: Radio>(comm: &mut CommBlock, radio: &mut R) -> u16 {
    comm.tc >>= 1;
    comm.tca = comm.tc;
    if comm.tc <= 0 {
        return 0;
    }
    radio.rand_u16() % comm.tc as u16
}

/// Time already consumed in the current subslot.
fn rigd_next_slot(comm: &CommBlock) -> u16 {
    (comm.tc - comm.tca).max(0) as u16
}

/// RAIND/AIND slots advance by exactly one packet duration.
fn aind_next_slot<R: Radio>(radio: &mut R, first_frame_len: u8) -> u16 {
    radio.pkt_duration(first_frame_len as u16)
}

/// Permute a multi-channel TX list with two random bytes so that devices
/// answering the same query spread across the available channels instead of
/// colliding in lockstep.
pub fn scramble_chanlist<R: Radio>(list: &mut ChanList, radio: &mut R) {
    if list.len() < 2 {
        return;
    }
    let mut rot1 = radio.rand_u8();
    let mut rot2 = radio.rand_u8();
    let last = list.len() - 1;
    for i in 0..last {
        let j = i + (rot1 & 1) as usize;
        let k = last * (rot2 & 1) as usize;
        list.swap(i, k);
        list.swap(i, j);
        rot1 >>= 1;
        rot2 >>= 1;
    }
}

/// Default CSMA parameters for a channel: the strictly-slotted classes
/// (0x00, 0x30) require A2P contention.
pub fn default_csma(chan_id: u8) -> CsmaParams {
    let class = chan_id & 0x30;
    if class == 0x00 || class == 0x30 {
        CsmaParams::A2P
    } else {
        CsmaParams::NA2P
    }
}
