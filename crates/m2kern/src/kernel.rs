//! The event manager
//!
//! [`Kernel`] is the core of the crate: a single-threaded cooperative
//! dispatcher that multiplexes the radio across packet processing, session
//! dialogs, and the idle-time scan/beacon sequences. The embedding drives it
//! from its main loop:
//!
//! 1. call [`Kernel::event_manager`] with the ticks elapsed since the last
//!    call;
//! 2. sleep the MCU for (at most) the returned number of ticks;
//! 3. wake early whenever the [`Wake`] cell is raised by a radio completion.
//!
//! Radio completions enter through [`Kernel::on_bg_rx_done`],
//! [`Kernel::on_fg_rx_done`], [`Kernel::on_fg_tx_done`] and
//! [`Kernel::on_bg_tx_done`]. They never block; when delivered from
//! interrupt context, wrap the kernel in
//! [`SharedKernel`](crate::shared::SharedKernel).
//!
//! Task priority is strict: Processing > Radio > Session > idle-time events
//! (Beacon > Sleep > Hold among due ones) > External > Idle. Lower
//! priorities may starve while the radio is busy; bounded contention windows
//! guarantee no dialog owns the radio forever.

use log::{debug, trace, warn};

use crate::comm::{ActiveSettings, CommBlock, CsmaParams, IdleState, NetConfig};
use crate::csma;
use crate::host::{Host, IdleIdx};
use crate::idle::{IDLE_BEACON, IDLE_EVENTS, IDLE_HOLD, IDLE_SLEEP, IdleEvent};
use crate::isf::{
    BeaconEntry, FileId, IsfError, IsfStore, RtcRule, SUPPORTED_MASK_OFFSET, ScanEntry, clamp_eta,
    netconf_offsets,
};
use crate::net::NetLayer;
use crate::radio::{CsmaStep, Radio, RfActivity, rfa};
use crate::session::{DialogCall, FLAG_LISTEN, NetState};
use crate::{AuthLevel, FrameQueue, Sessions, Ticks, Wake};

/// Panic code for a configuration-store failure.
pub const PANIC_CONFIG: u8 = 0x01;

/// CSMA termination code: the contention window ran out.
pub const CSMA_ERR_EXHAUSTED: i16 = -1;
/// CSMA termination code: the configured channel is unusable.
pub const CSMA_ERR_BADCHANNEL: i16 = -3;

/// Non-blocking busy indicator. Not a lock: a single-thread advisory state
/// the embedding (and the radio driver, via [`Kernel::set_mutex`]) can
/// observe before poking the kernel.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SysMutex(pub u8);

impl SysMutex {
    pub const NONE: Self = Self(0);
    /// Radio is listening (scan or CSMA phase).
    pub const RADIO_LISTEN: Self = Self(1);
    /// Radio is moving frame data.
    pub const RADIO_DATA: Self = Self(2);
    /// A received frame awaits processing.
    pub const PROCESSING: Self = Self(4);

    pub const fn contains(self, flags: Self) -> bool {
        self.0 & flags.0 == flags.0
    }

    pub const fn is_clear(self) -> bool {
        self.0 == 0
    }

    pub fn set(&mut self, flags: Self) {
        self.0 |= flags.0;
    }

    pub fn clear(&mut self, flags: Self) {
        self.0 &= !flags.0;
    }
}

/// What one dispatcher iteration decided to run.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Idle,
    Processing,
    Radio,
    Session,
    Hold,
    Sleep,
    Beacon,
    External,
}

/// Tunables that were build-time constants in classic Mode 2 stacks.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct KernelConfig {
    /// Soft-watchdog budget, in dispatcher iterations of radio data wait.
    pub watchdog_period: i16,
    /// Contention window for beacon dialogs, in ticks.
    pub beacon_tca: Ticks,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            watchdog_period: 32,
            beacon_tca: 12,
        }
    }
}

/// The Mode 2 session/MAC kernel.
///
/// Generic over its four external collaborators: the radio driver `R`, the
/// network/transport layer `N`, the platform host `H`, and the configuration
/// store `S`.
pub struct Kernel<R, N, H, S> {
    pub radio: R,
    pub net: N,
    pub host: H,
    pub isf: S,
    wake: &'static Wake,
    config: KernelConfig,

    pub comm: CommBlock,
    pub netconf: NetConfig,
    pub idle_state: IdleState,
    pub sessions: Sessions,
    pub txq: FrameQueue,
    pub rxq: FrameQueue,

    /// HSS, SSS, BTS — indexed by the `idle` module constants.
    idle_events: [IdleEvent; IDLE_EVENTS],
    ext: IdleEvent,
    rfa: RfActivity,
    mutex: SysMutex,
    watchdog: i16,
    hold_cycle: u16,
    /// Remaining advertising-flood budget, in ticks.
    adv_time: Ticks,
}

impl<R, N, H, S> Kernel<R, N, H, S>
where
    R: Radio,
    N: NetLayer,
    H: Host,
    S: IsfStore,
{
    pub fn new(radio: R, net: N, host: H, isf: S, wake: &'static Wake, config: KernelConfig) -> Self {
        Self {
            radio,
            net,
            host,
            isf,
            wake,
            config,
            comm: CommBlock::new(),
            netconf: NetConfig::default(),
            idle_state: IdleState::Off,
            sessions: Sessions::new(),
            txq: FrameQueue::new(),
            rxq: FrameQueue::new(),
            idle_events: [IdleEvent::disabled(); IDLE_EVENTS],
            ext: IdleEvent::disabled(),
            rfa: RfActivity::idle(),
            mutex: SysMutex::NONE,
            watchdog: config.watchdog_period,
            hold_cycle: 0,
            adv_time: 0,
        }
    }

    /// Bring the kernel up: load network settings and enter the idle state
    /// appropriate for the configured device class.
    pub fn init(&mut self) {
        self.refresh();
    }

    pub fn wake(&self) -> &Wake {
        self.wake
    }

    pub fn rfa(&self) -> &RfActivity {
        &self.rfa
    }

    pub fn mutex(&self) -> SysMutex {
        self.mutex
    }

    /// Set busy bits on behalf of the radio driver (e.g. `RADIO_DATA` while
    /// a frame is being clocked in).
    pub fn set_mutex(&mut self, bits: SysMutex) {
        self.mutex.set(bits);
    }

    pub fn clear_mutex(&mut self, bits: SysMutex) {
        self.mutex.clear(bits);
    }

    pub fn idle_event(&self, which: IdleIdx) -> &IdleEvent {
        match which {
            IdleIdx::HoldScan => &self.idle_events[IDLE_HOLD],
            IdleIdx::SleepScan => &self.idle_events[IDLE_SLEEP],
            IdleIdx::BeaconTx => &self.idle_events[IDLE_BEACON],
            IdleIdx::External => &self.ext,
        }
    }

    pub fn idle_event_mut(&mut self, which: IdleIdx) -> &mut IdleEvent {
        match which {
            IdleIdx::HoldScan => &mut self.idle_events[IDLE_HOLD],
            IdleIdx::SleepScan => &mut self.idle_events[IDLE_SLEEP],
            IdleIdx::BeaconTx => &mut self.idle_events[IDLE_BEACON],
            IdleIdx::External => &mut self.ext,
        }
    }

    pub fn hold_cycle(&self) -> u16 {
        self.hold_cycle
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Reload network settings from the store and flush the system.
    /// Store failures are fatal and go through [`Kernel::panic_sys`].
    pub fn refresh(&mut self) {
        if self.try_refresh().is_err() {
            self.panic_sys(PANIC_CONFIG);
        }
    }

    fn try_refresh(&mut self) -> Result<(), IsfError> {
        use netconf_offsets as off;
        let f = FileId::NETWORK_SETTINGS;
        self.netconf.subnet = self.isf.read_u8(f, off::SUBNET)?;
        self.netconf.b_subnet = self.isf.read_u8(f, off::B_SUBNET)?;
        self.netconf.active = ActiveSettings(self.isf.read_u16_be(f, off::ACTIVE)?);
        self.netconf.dd_flags = self.isf.read_u8(f, off::DD_FLAGS)?;
        self.netconf.b_attempts = self.isf.read_u8(f, off::B_ATTEMPTS)?;
        self.netconf.hold_limit = self.isf.read_u16_be(f, off::HOLD_LIMIT)?;
        self.flush_sys();
        Ok(())
    }

    /// Apply new active settings, masked by what the device supports, and
    /// persist them. Flushes sessions and events afterwards.
    pub fn change_settings(&mut self, new_mask: u16, new_settings: u16) -> Result<(), IsfError> {
        let supported = self
            .isf
            .read_u16_be(FileId::SUPPORTED_SETTINGS, SUPPORTED_MASK_OFFSET)?;
        let mask = new_mask & supported;
        let current = self
            .isf
            .read_u16_be(FileId::NETWORK_SETTINGS, netconf_offsets::ACTIVE)?;
        let active = (current & !mask) | (new_settings & mask);
        self.isf
            .write_u16_be(FileId::NETWORK_SETTINGS, netconf_offsets::ACTIVE, active)?;
        self.netconf.active = ActiveSettings(active);
        self.flush_sys();
        Ok(())
    }

    /// Reset sessions and idle-time events, reassign RTC schedule slots, and
    /// drop into the class-default idle state.
    pub fn flush_sys(&mut self) {
        self.sessions.init();
        self.idle_state = self.netconf.active.default_idle();
        self.hold_cycle = 0;

        let mut accum = 0u8;
        let schedules = [
            (IDLE_SLEEP, ActiveSettings::SLEEP_SCHED),
            (IDLE_HOLD, ActiveSettings::HOLD_SCHED),
            (IDLE_BEACON, ActiveSettings::BEACON_SCHED),
        ];
        for (idx, bit) in schedules {
            let ev = &mut self.idle_events[idx];
            if self.netconf.active.contains(bit) {
                accum += 1;
                ev.sched_id = accum;
            } else {
                ev.sched_id = 0;
            }
            ev.restart();
        }
        self.idle_events[IDLE_BEACON].event_no = (self.netconf.b_attempts != 0) as u8;

        self.idle_sys();
    }

    /// Idle routine: power the radio down, clear the busy state, and route
    /// to the configured idle mode.
    pub fn idle_sys(&mut self) {
        self.radio.gag();
        self.radio.sleep();
        self.mutex = SysMutex::NONE;
        match self.idle_state {
            IdleState::Off => self.goto_off(),
            IdleState::Sleep => self.goto_sleep(),
            IdleState::Hold => self.goto_hold(),
        }
    }

    /// Kill everything and shut down all events. `init` turns the device
    /// back on; external callers can still initiate TX dialogs.
    pub fn goto_off(&mut self) {
        self.sessions.init();
        self.rfa.event_no = rfa::IDLE;
        for ev in &mut self.idle_events {
            ev.event_no = 0;
        }
    }

    /// Enter the sleep idle mode. Only endpoints truly sleep; every other
    /// class holds instead.
    pub fn goto_sleep(&mut self) {
        if !self.netconf.active.is_endpoint() {
            self.goto_hold();
            return;
        }
        let sss = &mut self.idle_events[IDLE_SLEEP];
        sss.cursor = 0;
        sss.event_no = 1;
        self.idle_events[IDLE_HOLD].event_no = 0;
        self.rfa.event_no = rfa::IDLE;
    }

    pub fn goto_hold(&mut self) {
        self.idle_events[IDLE_HOLD].event_no = 1;
        self.idle_events[IDLE_SLEEP].event_no = 0;
        self.rfa.event_no = rfa::IDLE;
    }

    /// Fatal-error routine: disable idle events, flush expired sessions,
    /// force idle, and invoke the panic hook. Does not allocate and does not
    /// start radio activity.
    pub fn panic_sys(&mut self, code: u8) {
        warn!("kernel panic {code:#04x}");
        self.idle_state = IdleState::Off;
        self.sessions.flush();
        self.idle_sys();
        self.host.flush_timer();
        self.host.on_panic(code);
    }

    // ------------------------------------------------------------------
    // The dispatcher
    // ------------------------------------------------------------------

    /// Run the event manager until nothing is immediately pending.
    ///
    /// `elapsed` is the tick count since the previous call. The return value
    /// is how long the caller may sleep; re-enter earlier if the [`Wake`]
    /// cell is raised.
    pub fn event_manager(&mut self, elapsed: u16) -> u16 {
        let mut elapsed = elapsed as Ticks;
        loop {
            self.host.flush_timer();

            // A haywire radio task trips the soft watchdog; the kill forces
            // an error completion which unwinds the state machine.
            if self.watchdog <= 0 {
                warn!("soft watchdog expired, killing radio");
                self.radio.kill();
            }

            let task = self.clock_tasks(elapsed);
            trace!("dispatch {task:?}");
            match task {
                Task::Idle => {
                    if let Some(top) = self.sessions.top() {
                        if top.netstate.contains(NetState::CONNECTED) {
                            return clamp_eta(top.counter);
                        }
                    }
                    // The load hook returns true when it produced work
                    // (usually a session); loop again to pick it up.
                    if !self.host.load_app() {
                        let eta = self.next_event_eta();
                        if eta > 0 {
                            return clamp_eta(eta);
                        }
                    }
                }
                Task::Processing => self.task_processing(),
                Task::Radio => {
                    if let Some(sleep) = self.task_radio() {
                        return sleep;
                    }
                }
                Task::Session => self.task_session(),
                Task::Hold => self.task_hold(),
                Task::Sleep => self.task_sleep(),
                Task::Beacon => self.task_beacon(),
                Task::External => {
                    self.ext.event_no = 0;
                    self.host.external_event();
                }
            }

            self.watchdog = self.config.watchdog_period;
            self.host.reset_watchdog(self.config.watchdog_period as u16);
            elapsed = self.host.timer_ticks() as Ticks;
        }
    }

    /// Subtract `elapsed` from every countdown and pick the highest-priority
    /// task that needs servicing.
    fn clock_tasks(&mut self, elapsed: Ticks) -> Task {
        let mut task = Task::Idle;

        self.comm.tca -= elapsed;

        // Among due idle events: smallest countdown first, ties to the
        // highest index, so Beacon > Sleep > Hold.
        let mut best: Option<(Ticks, Task)> = None;
        let order = [Task::Hold, Task::Sleep, Task::Beacon];
        for (i, ev) in self.idle_events.iter_mut().enumerate() {
            ev.nextevent -= elapsed;
            if ev.is_due() {
                match best {
                    Some((t, _)) if t < ev.nextevent => {}
                    _ => best = Some((ev.nextevent, order[i])),
                }
            }
        }
        self.ext.nextevent -= elapsed;
        match best {
            Some((_, t)) => task = t,
            None if self.ext.is_due() => task = Task::External,
            None => {}
        }

        if self.sessions.refresh(elapsed) {
            task = Task::Session;
        }

        if !self.rfa.is_idle() {
            task = Task::Radio;
            self.rfa.nextevent -= elapsed;
        }

        if self.mutex.contains(SysMutex::PROCESSING) {
            task = Task::Processing;
        }

        task
    }

    /// ETA of the next idle-time event, binding schedule-driven events to
    /// their RTC alarm on the way.
    fn next_event_eta(&mut self) -> Ticks {
        const SEQ_FILES: [FileId; IDLE_EVENTS] = [
            FileId::HOLD_SCAN_SEQUENCE,
            FileId::SLEEP_SCAN_SEQUENCE,
            FileId::BEACON_TRANSMIT_SEQUENCE,
        ];
        let mut eta: Ticks = u16::MAX as Ticks;
        for i in (0..IDLE_EVENTS).rev() {
            let ev = &mut self.idle_events[i];
            if ev.event_no == 0 {
                continue;
            }
            if ev.sched_id != 0 {
                // Hand the cadence to the RTC; the alarm re-arms the event
                // through `on_rtc_alarm`.
                if let Ok(rule) = RtcRule::read_for(&self.isf, SEQ_FILES[i]) {
                    self.host.set_rtc_alarm(ev.sched_id, rule.mask, rule.value);
                    ev.restart();
                    ev.event_no = 0;
                    continue;
                }
            }
            eta = eta.min(ev.nextevent);
        }
        if self.ext.event_no != 0 {
            eta = eta.min(self.ext.nextevent);
        }
        eta
    }

    /// RTC alarm delivery: re-enable the bound idle event for an immediate
    /// firing.
    pub fn on_rtc_alarm(&mut self, which: IdleIdx) {
        let ev = self.idle_event_mut(which);
        ev.event_no = 1;
        ev.restart();
        self.wake.raise();
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    /// A received frame is ready: score it, and when it addresses us,
    /// prepare the response dialog (and a follow-up listen session when the
    /// peer asked for one).
    fn task_processing(&mut self) {
        let Some(top) = self.sessions.top_mut() else {
            self.mutex.clear(SysMutex::PROCESSING);
            return;
        };
        top.counter = 0;
        let request = *top;

        let score = self
            .net
            .route_foreground(&request, &self.rxq, &mut self.txq);
        if score >= 0 {
            csma::fc_eval(&mut self.comm, score);
            self.hold_cycle = 0;
            self.idle_state = IdleState::Hold;

            if request.flags & FLAG_LISTEN != 0 {
                // The peer will speak again after our response: retire the
                // request session and schedule a listen on the response
                // channel at the end of the contention window.
                let listen_chan = self
                    .comm
                    .rx_chanlist
                    .first()
                    .copied()
                    .unwrap_or(request.channel);
                let wait =
                    self.comm.tc - self.radio.pkt_duration(self.txq.len() as u16) as Ticks;
                self.sessions.refresh(self.comm.tc);
                self.sessions.drop_top();
                self.comm.tc = wait;

                if let Some(clone) = self.sessions.new_session(
                    wait.max(0),
                    NetState::REQ_RX.union(NetState::CONNECTED),
                    listen_chan,
                ) {
                    clone.dialog_id = request.dialog_id;
                    clone.subnet = request.subnet;
                }
                self.comm.redundants = 0;
                self.comm.set_rx_channel(listen_chan);
                self.comm.rx_timeout = 10;
                debug!("listen clone on chan {listen_chan} in {wait} ticks");
            }
        }
        self.mutex.clear(SysMutex::PROCESSING);
    }

    /// Service the radio activity. Returns a sleep duration when the radio
    /// needs time, `None` to keep dispatching.
    fn task_radio(&mut self) -> Option<u16> {
        if self.rfa.nextevent > 0 {
            return Some(clamp_eta(self.rfa.nextevent));
        }
        match self.rfa.event_no {
            rfa::BG_SCAN | rfa::FG_SCAN => {
                self.drive_rx_timeout();
                None
            }
            rfa::BG_TX | rfa::FG_TX => {
                self.drive_tx_csma();
                None
            }
            _ => {
                // Data on the air; check back every tick and let the soft
                // watchdog bound the wait.
                self.watchdog -= 1;
                Some(1)
            }
        }
    }

    /// The software listen window expired. A2P dialogs close on the slot
    /// edge even mid-frame; otherwise an in-progress reception finishes
    /// first.
    fn drive_rx_timeout(&mut self) {
        if self.mutex.contains(SysMutex::RADIO_DATA) && !self.comm.csmaca.is_a2p() {
            self.rfa.nextevent = 1;
            return;
        }
        let done = self.radio.force_rx_timeout();
        match self.rfa.event_no {
            rfa::BG_SCAN => self.on_bg_rx_done(done.code, done.crc),
            _ => self.on_fg_rx_done(done.code, done.crc),
        }
    }

    /// One CSMA-CA step for the armed TX.
    fn drive_tx_csma(&mut self) {
        let first_len = self.txq.front().first().copied().unwrap_or(0);
        let failure = if self.comm.tca >= 0 {
            match self.radio.tx_csma() {
                CsmaStep::CcaFail => {
                    self.rfa.nextevent =
                        csma::fc_loop(&mut self.comm, &mut self.radio, first_len) as Ticks;
                    return;
                }
                CsmaStep::Granted => {
                    // Into the in-flight state. Floods run on their advert
                    // budget; everything else on packet airtime.
                    self.mutex = SysMutex::RADIO_DATA;
                    self.rfa.event_no += 2;
                    self.rfa.nextevent = if self.rfa.event_no == rfa::BG_DATA {
                        self.adv_time
                    } else {
                        self.radio.pkt_duration(self.txq.len() as u16) as Ticks
                    };
                    return;
                }
                CsmaStep::Wait(t) => {
                    self.rfa.nextevent = t as Ticks;
                    return;
                }
                CsmaStep::BadChannel => CSMA_ERR_BADCHANNEL,
            }
        } else {
            CSMA_ERR_EXHAUSTED
        };

        warn!("csma gave up ({failure})");
        self.host.rfa_terminate(3, failure);
        self.sessions.pop();
        self.idle_sys();
    }

    /// Dispatch the ready session into its dialog initializer.
    fn task_session(&mut self) {
        while let Some(top) = self.sessions.top() {
            if top.netstate.contains(NetState::DROPPED) {
                self.sessions.pop();
            } else {
                break;
            }
        }
        self.idle_state = self.netconf.active.default_idle();
        let Some(top) = self.sessions.top() else {
            self.idle_sys();
            return;
        };
        match top.netstate.dialog_call() {
            DialogCall::Scrap => {
                trace!("scrapping session");
                self.sessions.pop();
                self.idle_sys();
            }
            DialogCall::ForegroundTx => self.init_fg_tx(),
            DialogCall::ForegroundScan => self.fg_scan(),
            DialogCall::BackgroundTx => self.init_bg_tx(),
            DialogCall::BackgroundScan => self.bg_scan(),
        }
    }

    fn task_hold(&mut self) {
        self.hold_cycle += (self.idle_events[IDLE_HOLD].cursor == 0) as u16;
        if self.netconf.active.is_endpoint() && self.hold_cycle == self.netconf.hold_limit {
            debug!("hold limit reached, descending to sleep");
            self.goto_sleep();
            self.task_sleep();
        } else {
            self.scan_channel(IDLE_HOLD, FileId::HOLD_SCAN_SEQUENCE, IdleIdx::HoldScan);
        }
    }

    fn task_sleep(&mut self) {
        self.scan_channel(IDLE_SLEEP, FileId::SLEEP_SCAN_SEQUENCE, IdleIdx::SleepScan);
    }

    /// Fire one scan-sequence entry: configure the listen and push the scan
    /// session. The actual reception is the session task's business.
    fn scan_channel(&mut self, idx: usize, file: FileId, which: IdleIdx) {
        self.host.prestart(which);
        if self.try_scan_channel(idx, file).is_err() {
            self.panic_sys(PANIC_CONFIG);
        }
    }

    fn try_scan_channel(&mut self, idx: usize, file: FileId) -> Result<(), IsfError> {
        let len = self.isf.length(file)?;
        let entry = ScanEntry::read(&self.isf, file, self.idle_events[idx].cursor)?;

        let ev = &mut self.idle_events[idx];
        ev.nextevent = entry.next_interval as Ticks;
        ev.advance(ScanEntry::SIZE, len);

        self.comm.rx_timeout = entry.rx_timeout();
        self.comm.redundants = 0;
        self.comm.set_rx_channel(entry.channel);

        let netstate = if entry.is_background() {
            NetState::REQ_RX.union(NetState::INIT).union(NetState::FLOOD)
        } else {
            NetState::REQ_RX.union(NetState::INIT)
        };
        trace!(
            "scan entry chan={} bg={} timeout={}",
            entry.channel,
            entry.is_background(),
            self.comm.rx_timeout
        );
        self.sessions.new_session(0, netstate, entry.channel);
        Ok(())
    }

    /// Fire one beacon-sequence entry: build the full broadcast frame and
    /// leave a TX session on top of the stack.
    fn task_beacon(&mut self) {
        if self.try_beacon().is_err() {
            self.panic_sys(PANIC_CONFIG);
        }
    }

    fn try_beacon(&mut self) -> Result<(), IsfError> {
        let file = FileId::BEACON_TRANSMIT_SEQUENCE;
        let len = self.isf.length(file).unwrap_or(0);

        // No beacon material: park and check back much later. A settings
        // flush re-arms the event immediately.
        if self.netconf.b_attempts == 0 || len == 0 {
            self.idle_events[IDLE_BEACON].nextevent = u16::MAX as Ticks;
            return Ok(());
        }

        let entry = BeaconEntry::read(&self.isf, file, self.idle_events[IDLE_BEACON].cursor)?;
        {
            let ev = &mut self.idle_events[IDLE_BEACON];
            ev.nextevent = entry.next_interval as Ticks;
            ev.advance(BeaconEntry::SIZE, len);
        }

        // Beacons are ad-hoc broadcast announcements on the beacon subnet.
        let subnet = self.netconf.b_subnet;
        let flags = (self.netconf.dd_flags & !0x30) | (entry.params & 0x30);
        let Some(session) = self.sessions.new_session(
            0,
            NetState::INIT.union(NetState::FIRST_RX),
            entry.channel,
        ) else {
            return Ok(());
        };
        session.subnet = subnet;
        session.flags = flags;
        let session = *session;

        self.txq.empty();
        self.net.build_header(&session, 0x40, 0, &mut self.txq);
        let _ = self.txq.write_u8(0x20 + (entry.params & 1));
        if entry.params & 0x04 != 0 {
            let _ = self.txq.write_u8(entry.params & 0x04);
        }

        self.comm.tc = self.config.beacon_tca;
        self.comm.rx_timeout = if entry.params & 0x02 != 0 {
            0
        } else {
            self.radio.default_tgd(session.channel)
        };
        let _ = self.txq.write_u8(self.comm.rx_timeout as u8);

        self.comm.csmaca = csma::default_csma(session.channel)
            .union(CsmaParams(entry.params & 0x04))
            .union(CsmaParams::NA2P)
            .union(CsmaParams::MAC_CA);
        self.comm.redundants = self.netconf.b_attempts;
        self.comm.set_single_channel(session.channel);

        if self
            .net
            .isf_call(entry.params & 1, &entry.call, AuthLevel::Guest, &mut self.txq)
            .is_ok()
        {
            self.net.build_footer(&session, &mut self.txq);
            self.host.prestart(IdleIdx::BeaconTx);
        } else {
            self.sessions.pop();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Radio I/O initializers
    // ------------------------------------------------------------------

    /// Foreground TX with a software-managed CSMA-CA phase.
    pub(crate) fn init_fg_tx(&mut self) {
        debug!("init fg tx");
        self.host.rfa_init(rfa::FG_TX);
        if self.comm.tx_chanlist.len() > 1 {
            csma::scramble_chanlist(&mut self.comm.tx_chanlist, &mut self.radio);
        }
        self.radio.init_tx_foreground(0);
        self.mutex = SysMutex::RADIO_LISTEN;
        self.comm.tca = self.comm.tc;
        let first_len = self.txq.front().first().copied().unwrap_or(0);
        let offset = csma::fc_init(&mut self.comm, &mut self.radio, first_len);
        self.rfa.set(rfa::FG_TX, offset as Ticks);
    }

    /// Background flood TX; contention starts immediately.
    pub(crate) fn init_bg_tx(&mut self) {
        debug!("init bg tx (flood {})", self.adv_time);
        self.host.rfa_init(rfa::BG_TX);
        self.radio.init_tx_background();
        self.mutex = SysMutex::RADIO_LISTEN;
        self.comm.tca = self.comm.tc;
        self.rfa.set(rfa::BG_TX, 0);
    }

    /// Foreground listen on the top session's channel.
    fn fg_scan(&mut self) {
        self.host.rfa_init(rfa::FG_SCAN);
        self.mutex = SysMutex::RADIO_LISTEN;
        self.rfa.set(rfa::FG_SCAN, self.comm.rx_timeout as Ticks);
        let chan = self.sessions.top().map(|s| s.channel).unwrap_or_default();
        self.radio.init_rx_foreground(chan, 0);
    }

    /// Background (advert) listen. Sessionless: the scan session is popped
    /// on completion and reception spawns its own follow-up.
    fn bg_scan(&mut self) {
        self.host.rfa_init(rfa::BG_SCAN);
        self.rfa.set(rfa::BG_SCAN, self.comm.rx_timeout as Ticks);
        self.mutex = SysMutex::RADIO_LISTEN;
        let chan = self.comm.rx_chanlist.first().copied().unwrap_or_default();
        self.radio.init_rx_background(chan);
    }

    // ------------------------------------------------------------------
    // Radio completion entry points
    // ------------------------------------------------------------------

    /// Background scan finished. `scode == -1` asks for a re-arm while
    /// redundancy remains; otherwise the scan is over and a passing frame is
    /// handed to the network layer, which schedules the follow-up session.
    pub fn on_bg_rx_done(&mut self, scode: i16, _fcode: i16) {
        if scode == -1 && self.comm.redundants != 0 {
            let chan = self.comm.rx_chanlist.first().copied().unwrap_or_default();
            self.radio.init_rx_background(chan);
            return;
        }

        self.radio.sleep();
        self.sessions.pop();
        if scode >= 0 && self.mac_filter() {
            self.mutex = SysMutex::PROCESSING;
            self.net.parse_background(&self.rxq, &mut self.sessions);
        }
        self.host.rfa_terminate(rfa::BG_SCAN, scode);
        self.mutex = SysMutex::NONE;
        self.rfa.event_no = rfa::IDLE;
        self.wake.raise();
    }

    /// Foreground reception event. Negative `pcode` is a listen timeout;
    /// otherwise `pcode` frames remain and `fcode` carries CRC status.
    pub fn on_fg_rx_done(&mut self, pcode: i16, fcode: i16) {
        let mut frx_code: i16 = 0;
        let mut preempt_code = pcode;

        if pcode < 0 {
            // Listen window expired. Retry the request while redundancy
            // remains; under A2P swap dialog direction; otherwise the
            // session is over.
            self.rfa.event_no = rfa::IDLE;
            let redundants = self.comm.redundants;
            let a2p = self.comm.csmaca.is_a2p();
            if let Some(top) = self.sessions.top_mut() {
                if redundants != 0 {
                    top.netstate = NetState::INIT.union(NetState::FIRST_RX);
                } else if a2p {
                    top.netstate.toggle_phase();
                } else {
                    top.netstate = NetState::SCRAP;
                }
            }
        } else {
            if fcode != 0 {
                // Damaged frame: datastreams mark it and continue, single
                // frames are simply ignored.
                if let Some(top) = self.sessions.top().copied() {
                    if top.netstate.contains(NetState::DS_DIALOG) {
                        self.net.mark_ds_frame(&top, &mut self.rxq);
                    }
                }
                frx_code = -1;
            } else if !self.mac_filter() {
                frx_code = -4;
            }

            if pcode == 0 {
                // Packet complete. Good requests finish the listen; bad
                // frames and responses keep the window open.
                let in_resp = self
                    .sessions
                    .top()
                    .is_some_and(|s| s.netstate.contains(NetState::RESP));
                if frx_code == 0 {
                    self.mutex.set(SysMutex::PROCESSING);
                }
                if frx_code != 0 || in_resp {
                    preempt_code = frx_code;
                    self.radio.reenter_rx();
                } else {
                    self.rfa.event_no = rfa::IDLE;
                    self.radio.sleep();
                }
            }
        }

        if self.rfa.event_no == rfa::IDLE {
            self.host.rfa_terminate(rfa::FG_SCAN, frx_code);
        }
        // Counters are reapplied on re-entry, so a finished (or continuing)
        // dialog preempts the kernel; bad frames don't.
        if preempt_code == 0 {
            self.wake.raise();
        }
    }

    /// Foreground transmission completed (`pcode == 1` marks a mid-packet
    /// frame boundary and is ignored).
    pub fn on_fg_tx_done(&mut self, pcode: i16) {
        if pcode == 1 {
            return;
        }

        self.mutex = SysMutex::NONE;
        self.rfa.event_no = rfa::IDLE;

        let was_resp = self
            .sessions
            .top()
            .is_some_and(|s| s.netstate.contains(NetState::RESP));
        let mut scrap = self.comm.rx_timeout == 0 || was_resp;
        self.comm.redundants = self.comm.redundants.saturating_sub(1);

        if scrap && self.comm.redundants != 0 {
            // No response window to honor: burn the remaining redundancy
            // with immediate resends, contention off.
            self.comm.csmaca = CsmaParams::NO_CSMA.union(CsmaParams::MAC_CA);
            self.radio.prep_resend();
        } else {
            scrap |= pcode != 0;
            if let Some(top) = self.sessions.top_mut() {
                if scrap {
                    top.netstate.set(NetState::SCRAP);
                }
                top.netstate.clear(NetState::PHASE_MASK);
                top.netstate.set(NetState::RESP_RX);
            }
        }

        self.host.rfa_terminate(5, pcode);
        self.wake.raise();
    }

    /// Background flood event. `flcode == 0` ends the flood and swaps in the
    /// foreground request; `flcode == 2` asks for the next advert frame.
    pub fn on_bg_tx_done(&mut self, flcode: i16) {
        match flcode {
            0 => {
                self.host.rfa_terminate(4, 0);
                self.net.close_flood(&mut self.txq);
                if let Some(top) = self.sessions.top_mut() {
                    top.counter = 0;
                }
                self.adv_time = 0;
                self.rfa.event_no = rfa::IDLE;
                self.mutex = SysMutex::NONE;
                // The request rides immediately behind the flood: tiny
                // window, no contention, single shot.
                self.comm.tc = 2;
                self.comm.csmaca = CsmaParams::NO_CSMA.union(CsmaParams::MAC_CA);
                self.comm.redundants = 1;
                self.wake.raise();
            }
            2 => {
                let remaining = self.adv_time - self.host.timer_ticks() as Ticks;
                if remaining < self.radio.pkt_duration(7) as Ticks {
                    self.radio.stop_flood();
                } else {
                    let _ = self.txq.patch_u16_be(3, remaining as u16);
                }
            }
            _ => {
                self.host.rfa_terminate(4, flcode);
                self.idle_sys();
                self.wake.raise();
            }
        }
    }

    // ------------------------------------------------------------------
    // MAC filter
    // ------------------------------------------------------------------

    /// Subnet and link-budget qualification of the frame at the front of the
    /// RX queue.
    pub fn mac_filter(&mut self) -> bool {
        let front = self.rxq.front();
        if front.len() < 3 {
            return false;
        }
        // TX EIRP is encoded as (dBm + 40) * 2 in the frame header.
        let tx_eirp = ((front[1] >> 1) & 0x3F) as i16 - 40;
        let linkloss = tx_eirp - self.radio.rssi();
        let budget_ok = linkloss <= self.radio.link_quality_limit() as i16;

        let fr_subnet = front[2];
        let ds = self.netconf.subnet;
        let dsm = ds & 0x0F;
        let specifier_ok = (fr_subnet & 0xF0 == 0xF0) || ((fr_subnet ^ ds) & 0xF0 == 0);
        let mask_ok = fr_subnet & dsm == dsm;

        budget_ok && specifier_ok && mask_ok
    }

    pub(crate) fn set_adv_time(&mut self, ticks: Ticks) {
        self.adv_time = ticks;
    }
}
