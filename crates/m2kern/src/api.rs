//! The application dialog API
//!
//! External callers (transport servers, application logic, a command
//! processor) open dialogs through these methods rather than touching the
//! session stack directly. The shape mirrors the classic Mode 2 server API:
//! create an ad-hoc request session, fill the request between `open_request`
//! and `close_request`, then kick the event manager with `start_dialog` (or
//! `start_flood` for an advertised wake-up).

use crate::host::Host;
use crate::isf::IsfStore;
use crate::kernel::{Kernel, SysMutex};
use crate::net::{NetLayer, RoutingTmpl};
use crate::radio::Radio;
use crate::session::NetState;
use crate::{CsmaParams, Ticks};

/// Parameters for [`Kernel::new_session`]. Masked fields overlay the
/// network defaults.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionTmpl {
    pub channel: u8,
    pub subnet: u8,
    pub subnet_mask: u8,
    pub flags: u8,
    pub flag_mask: u8,
    /// Contention budget for starting the dialog, in ticks.
    pub timeout: u16,
}

impl<R, N, H, S> Kernel<R, N, H, S>
where
    R: Radio,
    N: NetLayer,
    H: Host,
    S: IsfStore,
{
    /// Open an ad-hoc request-TX session. Returns an opaque 16-bit session
    /// id, or 0 if no session could be created.
    ///
    /// The caller still needs to build the request and invoke the event
    /// manager (directly or via [`Kernel::start_dialog`]).
    pub fn new_session(&mut self, tmpl: &SessionTmpl) -> u16 {
        // Expired sessions would shadow the new dialog; clear them out.
        self.sessions.flush();

        let subnet =
            (self.netconf.subnet & !tmpl.subnet_mask) | (tmpl.subnet & tmpl.subnet_mask);
        let flags = (self.netconf.dd_flags & !tmpl.flag_mask) | (tmpl.flags & tmpl.flag_mask);

        let Some(session) = self
            .sessions
            .new_session(0, NetState::INIT, tmpl.channel)
        else {
            return 0;
        };
        session.subnet = subnet;
        session.flags = flags;
        let id = session.id();

        self.comm.tc = tmpl.timeout as Ticks;
        self.comm.redundants = 1;
        self.comm.set_single_channel(tmpl.channel);
        self.comm.csmaca = CsmaParams::NA2P.union(CsmaParams::MAC_CA);
        id
    }

    /// Build the request header on the top session. Unicast and anycast
    /// (`addr` bit 6 clear) carry routing material into the network layer
    /// first. Returns false when no session is open.
    pub fn open_request(&mut self, addr: u8, routing: &RoutingTmpl) -> bool {
        if self.sessions.count() < 0 {
            return false;
        }
        if addr & 0x40 == 0 {
            self.net.load_routing(routing);
        }
        if let Some(top) = self.sessions.top().copied() {
            self.net.build_header(&top, addr, 0, &mut self.txq);
            return true;
        }
        false
    }

    /// Finalise the request footer. Returns false when no session is open.
    pub fn close_request(&mut self) -> bool {
        if let Some(top) = self.sessions.top().copied() {
            self.net.build_footer(&top, &mut self.txq);
            return true;
        }
        false
    }

    /// Advertise for `duration` ticks, then run the queued request.
    ///
    /// A zero duration degenerates to [`Kernel::start_dialog`]. Returns the
    /// sleep budget from the event manager, or 0 if the flood could not be
    /// staged (the session is scrapped in that case).
    pub fn start_flood(&mut self, duration: u16) -> u16 {
        if duration == 0 {
            return self.start_dialog();
        }
        let Some(top) = self.sessions.top().copied() else {
            return 0;
        };
        if self.net.open_flood(&top, duration, &mut self.txq).is_err() {
            self.sessions.pop();
            return 0;
        }
        self.set_adv_time(duration as Ticks);
        self.init_bg_tx();
        self.event_manager(0)
    }

    /// Stop whatever is in progress and hand control to the event manager.
    ///
    /// The radio kill makes the driver deliver an error completion, which
    /// unwinds the radio state machine through its normal path. Qualify
    /// app-initiated calls by checking [`Kernel::mutex`] first if killing
    /// in-flight data is unacceptable.
    pub fn start_dialog(&mut self) -> u16 {
        if !self.mutex().is_clear() {
            self.clear_mutex(SysMutex(0xFF));
            self.radio.kill();
        }
        self.wake().raise();
        1
    }

    /// Re-run the configuration refresh.
    pub fn sysinit(&mut self) -> u16 {
        self.refresh();
        1
    }
}
