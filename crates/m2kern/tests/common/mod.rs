//! Scripted collaborators for driving the kernel in integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};

use m2kern::host::{Host, IdleIdx};
use m2kern::isf::{FileId, IsfError, IsfStore};
use m2kern::net::{BeaconError, FloodError, NetLayer, RoutingTmpl};
use m2kern::radio::{CsmaStep, Radio, RxDone};
use m2kern::{AuthLevel, FrameQueue, Kernel, KernelConfig, NetState, Session, Sessions, Wake};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioCall {
    RxBg(u8),
    RxFg(u8),
    ReenterRx,
    TxBg,
    TxFg,
    Csma,
    PrepResend,
    StopFlood,
    Kill,
    Sleep,
    Gag,
    ForceTimeout,
}

/// A radio driver that answers from scripts and logs everything it is asked
/// to do.
pub struct TestRadio {
    pub calls: Vec<RadioCall>,
    pub csma_script: VecDeque<CsmaStep>,
    pub timeout_result: RxDone,
    pub rand_script: VecDeque<u16>,
    pub pkt_ticks: u16,
    pub tgd_ticks: u16,
    pub rssi_dbm: i16,
    pub link_limit: u8,
    pub asleep: bool,
}

impl Default for TestRadio {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            csma_script: VecDeque::new(),
            timeout_result: RxDone::TIMEOUT,
            rand_script: VecDeque::new(),
            pkt_ticks: 5,
            tgd_ticks: 10,
            rssi_dbm: -60,
            link_limit: 80,
            asleep: false,
        }
    }
}

impl Radio for TestRadio {
    fn init_rx_background(&mut self, channel: u8) {
        self.asleep = false;
        self.calls.push(RadioCall::RxBg(channel));
    }
    fn init_rx_foreground(&mut self, channel: u8, _est_frames: u8) {
        self.asleep = false;
        self.calls.push(RadioCall::RxFg(channel));
    }
    fn force_rx_timeout(&mut self) -> RxDone {
        self.calls.push(RadioCall::ForceTimeout);
        self.timeout_result
    }
    fn reenter_rx(&mut self) {
        self.calls.push(RadioCall::ReenterRx);
    }
    fn init_tx_background(&mut self) {
        self.asleep = false;
        self.calls.push(RadioCall::TxBg);
    }
    fn init_tx_foreground(&mut self, _est_frames: u8) {
        self.asleep = false;
        self.calls.push(RadioCall::TxFg);
    }
    fn tx_csma(&mut self) -> CsmaStep {
        self.calls.push(RadioCall::Csma);
        self.csma_script.pop_front().unwrap_or(CsmaStep::Granted)
    }
    fn prep_resend(&mut self) {
        self.calls.push(RadioCall::PrepResend);
    }
    fn stop_flood(&mut self) {
        self.calls.push(RadioCall::StopFlood);
    }
    fn pkt_duration(&self, _bytes: u16) -> u16 {
        self.pkt_ticks
    }
    fn default_tgd(&self, _channel: u8) -> u16 {
        self.tgd_ticks
    }
    fn guard_time(&self) -> u16 {
        2
    }
    fn rssi(&self) -> i16 {
        self.rssi_dbm
    }
    fn link_quality_limit(&self) -> u8 {
        self.link_limit
    }
    fn kill(&mut self) {
        self.calls.push(RadioCall::Kill);
    }
    fn sleep(&mut self) {
        self.asleep = true;
        self.calls.push(RadioCall::Sleep);
    }
    fn gag(&mut self) {
        self.calls.push(RadioCall::Gag);
    }
    fn rand_u8(&mut self) -> u8 {
        self.rand_u16() as u8
    }
    fn rand_u16(&mut self) -> u16 {
        self.rand_script.pop_front().unwrap_or(1)
    }
}

/// Byte-image ISF store.
#[derive(Default)]
pub struct RamIsf {
    files: HashMap<u8, Vec<u8>>,
}

impl RamIsf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, id: FileId, bytes: &[u8]) -> Self {
        self.files.insert(id.0, bytes.to_vec());
        self
    }

    pub fn file(&self, id: FileId) -> &[u8] {
        &self.files[&id.0]
    }
}

impl IsfStore for RamIsf {
    fn length(&self, file: FileId) -> Result<u16, IsfError> {
        self.files
            .get(&file.0)
            .map(|f| f.len() as u16)
            .ok_or(IsfError::NoSuchFile)
    }
    fn read_u8(&self, file: FileId, offset: u16) -> Result<u8, IsfError> {
        self.files
            .get(&file.0)
            .ok_or(IsfError::NoSuchFile)?
            .get(offset as usize)
            .copied()
            .ok_or(IsfError::OutOfBounds)
    }
    fn write_u16_be(&mut self, file: FileId, offset: u16, value: u16) -> Result<(), IsfError> {
        let f = self.files.get_mut(&file.0).ok_or(IsfError::NoSuchFile)?;
        let o = offset as usize;
        if o + 2 > f.len() {
            return Err(IsfError::OutOfBounds);
        }
        f[o..o + 2].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }
}

/// Build a network-settings file image.
pub fn netconf_image(
    subnet: u8,
    b_subnet: u8,
    active: u16,
    dd_flags: u8,
    b_attempts: u8,
    hold_limit: u16,
) -> [u8; 10] {
    let a = active.to_be_bytes();
    let h = hold_limit.to_be_bytes();
    [
        subnet, b_subnet, 0, 0, a[0], a[1], dd_flags, b_attempts, h[0], h[1],
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetCall {
    LoadRouting,
    Header(u8),
    Footer,
    Route,
    ParseBg,
    MarkDs,
    IsfCall(u8),
    OpenFlood(u16),
    CloseFlood,
}

/// A network layer that writes recognisable markers and answers from fields.
pub struct TestNet {
    pub calls: Vec<NetCall>,
    pub route_score: i16,
    /// Session pushed by a successful background parse.
    pub parse_spawn: Option<(NetState, u8)>,
    pub flood_ok: bool,
    pub isf_call_ok: bool,
}

impl Default for TestNet {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            route_score: -1,
            parse_spawn: None,
            flood_ok: true,
            isf_call_ok: true,
        }
    }
}

impl NetLayer for TestNet {
    fn load_routing(&mut self, _routing: &RoutingTmpl) {
        self.calls.push(NetCall::LoadRouting);
    }
    fn build_header(&mut self, _s: &Session, addr: u8, _nack: u8, txq: &mut FrameQueue) {
        self.calls.push(NetCall::Header(addr));
        txq.write_slice(&[0xA0, addr]).unwrap();
    }
    fn build_footer(&mut self, _s: &Session, txq: &mut FrameQueue) {
        self.calls.push(NetCall::Footer);
        txq.write_u8(0xFE).unwrap();
    }
    fn route_foreground(&mut self, _s: &Session, _rxq: &FrameQueue, txq: &mut FrameQueue) -> i16 {
        self.calls.push(NetCall::Route);
        if self.route_score >= 0 {
            txq.write_slice(&[0xC0; 10]).unwrap();
        }
        self.route_score
    }
    fn parse_background(&mut self, _rxq: &FrameQueue, sessions: &mut Sessions) {
        self.calls.push(NetCall::ParseBg);
        if let Some((netstate, channel)) = self.parse_spawn {
            sessions.new_session(0, netstate, channel);
        }
    }
    fn mark_ds_frame(&mut self, _s: &Session, _rxq: &mut FrameQueue) {
        self.calls.push(NetCall::MarkDs);
    }
    fn isf_call(
        &mut self,
        call_type: u8,
        _template: &[u8; 4],
        _auth: AuthLevel,
        txq: &mut FrameQueue,
    ) -> Result<(), BeaconError> {
        self.calls.push(NetCall::IsfCall(call_type));
        if self.isf_call_ok {
            txq.write_u8(0xB0).unwrap();
            Ok(())
        } else {
            Err(BeaconError)
        }
    }
    fn open_flood(
        &mut self,
        _s: &Session,
        duration: u16,
        txq: &mut FrameQueue,
    ) -> Result<(), FloodError> {
        self.calls.push(NetCall::OpenFlood(duration));
        if self.flood_ok {
            txq.empty();
            txq.write_slice(&[0xB0, 0xB1, 0xB2, 0x00, 0x00, 0xB5, 0xB6])
                .unwrap();
            Ok(())
        } else {
            Err(FloodError)
        }
    }
    fn close_flood(&mut self, txq: &mut FrameQueue) {
        self.calls.push(NetCall::CloseFlood);
        txq.empty();
    }
}

/// Platform host with a settable timer and hook counters.
#[derive(Default)]
pub struct TestHost {
    /// Value returned by every `timer_ticks` read.
    pub now: u16,
    pub prestarts: Vec<IdleIdx>,
    pub rfa_inits: Vec<u8>,
    pub rfa_terms: Vec<(u8, i16)>,
    pub panics: Vec<u8>,
    pub alarms: Vec<(u8, u16, u16)>,
}

impl Host for TestHost {
    fn flush_timer(&mut self) {}
    fn timer_ticks(&mut self) -> u16 {
        self.now
    }
    fn set_rtc_alarm(&mut self, sched_id: u8, mask: u16, value: u16) {
        self.alarms.push((sched_id, mask, value));
    }
    fn on_panic(&mut self, code: u8) {
        self.panics.push(code);
    }
    fn rfa_init(&mut self, event_no: u8) {
        self.rfa_inits.push(event_no);
    }
    fn rfa_terminate(&mut self, event_no: u8, code: i16) {
        self.rfa_terms.push((event_no, code));
    }
    fn prestart(&mut self, event: IdleIdx) {
        self.prestarts.push(event);
    }
}

pub type TestKernel = Kernel<TestRadio, TestNet, TestHost, RamIsf>;

pub fn leak_wake() -> &'static Wake {
    Box::leak(Box::new(Wake::new()))
}

pub fn make_kernel(isf: RamIsf) -> TestKernel {
    Kernel::new(
        TestRadio::default(),
        TestNet::default(),
        TestHost::default(),
        isf,
        leak_wake(),
        KernelConfig::default(),
    )
}
