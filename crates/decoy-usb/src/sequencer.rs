//! Port sequencer: hub-class request handling plus the polled action
//! scheduler that fabricates the hot-plug choreography.
//!
//! The sequencer owns the six virtual ports' status/change words and a small
//! set of one-shot pending actions (connect, reset, disconnect, the
//! disconnect chain marker, the deferred address, the jig exchange). Hub
//! requests and descriptor fetches set those flags; `poll()` executes at
//! most one of them per main-loop iteration, and only while the settle
//! countdown is idle.
//!
//! Field ownership: the request path (interrupt context) sets pending
//! actions and clears change bits on the host's behalf; `poll()` (foreground
//! loop) consumes actions and writes port status. A change bit is set only
//! by a scheduled action and cleared only by the matching ClearFeature.

use crate::bd::{self, TogglePolicy, BD_STAT_DTS};
use crate::ch9::{ClassControl, DeviceFunction};
use crate::descriptors;
use crate::device::UsbCore;
use crate::hw::{Dir, UsbHw};
use crate::script::{self, DescriptorError, ScriptEffect};
use crate::timer::{IndicatorMode, TickTimer};
use crate::usb::{self, SetupPacket};

/// Interrupt IN endpoint carrying status-change notifications and jig
/// replies.
pub const NOTIFY_ENDPOINT: usize = 1;
/// Interrupt OUT endpoint the jig host sends its eight packets to.
pub const JIG_RX_ENDPOINT: usize = 2;

pub const NUM_PORTS: usize = 6;

// Port status words (little-endian on the wire): bit 0 connection present,
// bit 1 enabled, bit 8 powered.
pub const PORT_STATUS_EMPTY: u16 = 0x0100;
pub const PORT_STATUS_FULL: u16 = 0x0103;
// Change words: bit 0 connection changed, bit 4 reset completed.
pub const PORT_CHANGE_NONE: u16 = 0x0000;
pub const PORT_CHANGE_CONNECTION: u16 = 0x0001;
pub const PORT_CHANGE_RESET: u16 = 0x0010;

// Hub-class port feature selectors.
const PORT_FEATURE_RESET: u16 = 4;
const PORT_FEATURE_POWER: u16 = 8;
const PORT_FEATURE_C_CONNECTION: u16 = 16;
const PORT_FEATURE_C_RESET: u16 = 20;

// Settle times, in 10 ms ticks.
const RESET_SETTLE: u16 = 2;
const ADDRESS_SETTLE: u16 = 1;
const JIG_TURNAROUND_SETTLE: u16 = 50;
const JIG_PACKET_SETTLE: u16 = 1;
const JIG_DONE_SETTLE: u16 = 15;

const JIG_PACKETS: u8 = 8;

/// Progress of the vendor handshake on the jig port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JigState {
    Idle,
    /// Draining the eight inbound packets, one per loop iteration.
    Receiving { count: u8 },
    /// Sending the eight reply packets from the fixed table.
    Replying { count: u8 },
}

#[derive(Clone, Copy, Debug)]
struct VirtualPort {
    status: u16,
    change: u16,
}

pub struct HubSequencer<'t> {
    timer: &'t TickTimer,
    /// Which descriptor set endpoint 0 currently serves; 0 is the hub's own.
    current_port: u8,
    /// The address the host assigned to the hub, re-applied before every
    /// fabricated plug event.
    hub_address: u8,
    /// One-shot override: send the next connect notification as DATA0.
    force_data0: bool,
    connect: Option<u8>,
    reset: Option<u8>,
    disconnect: Option<u8>,
    /// Port whose disconnect is waiting for the host's ClearFeature to
    /// advance the chain.
    disconnecting: Option<u8>,
    pending_address: Option<u8>,
    address_settled: bool,
    jig: JigState,
    ports: [VirtualPort; NUM_PORTS],
}

impl<'t> HubSequencer<'t> {
    pub fn new(timer: &'t TickTimer) -> Self {
        Self {
            timer,
            current_port: 0,
            hub_address: 0,
            force_data0: false,
            connect: None,
            reset: None,
            disconnect: None,
            disconnecting: None,
            pending_address: None,
            address_settled: false,
            jig: JigState::Idle,
            ports: [VirtualPort {
                status: PORT_STATUS_EMPTY,
                change: PORT_CHANGE_NONE,
            }; NUM_PORTS],
        }
    }

    pub fn current_port(&self) -> u8 {
        self.current_port
    }

    pub fn jig_state(&self) -> JigState {
        self.jig
    }

    /// Status and change words of a downstream port (1-based).
    pub fn port_words(&self, port: u8) -> Option<(u16, u16)> {
        let idx = usize::from(port.checked_sub(1)?);
        self.ports.get(idx).map(|p| (p.status, p.change))
    }

    pub fn pending_connect(&self) -> Option<u8> {
        self.connect
    }

    pub fn pending_disconnect(&self) -> Option<u8> {
        self.disconnect
    }

    fn port_mut(&mut self, port: u8) -> Option<&mut VirtualPort> {
        if port == 0 {
            return None;
        }
        self.ports.get_mut(usize::from(port - 1))
    }

    fn apply_effect(&mut self, effect: ScriptEffect) {
        match effect {
            ScriptEffect::Connect {
                port,
                settle,
                force_data0,
            } => {
                self.connect = Some(port);
                if force_data0 {
                    self.force_data0 = true;
                }
                self.timer.delay(settle);
            }
            ScriptEffect::Disconnect { port, settle } => {
                self.disconnect = Some(port);
                self.timer.delay(settle);
            }
            ScriptEffect::ChirpIndicator => {
                self.timer.set_mode(IndicatorMode::Chirp);
            }
            ScriptEffect::BeginJig => {
                self.jig = JigState::Receiving { count: 0 };
            }
        }
    }

    fn set_port_feature(&mut self, feature: u16, port: u8, bus_address: u8) -> ClassControl {
        self.timer.chirp();
        match feature {
            PORT_FEATURE_RESET => {
                let Some(p) = self.port_mut(port) else {
                    return ClassControl::Unsupported;
                };
                p.change |= PORT_CHANGE_RESET;
                self.reset = Some(port);
                self.timer.delay(RESET_SETTLE);
                ClassControl::Ack
            }
            PORT_FEATURE_POWER => {
                if self.port_mut(port).is_none() {
                    return ClassControl::Unsupported;
                }
                self.hub_address = bus_address;
                // Powering the last port is the host finishing hub bring-up;
                // that is the top of the scripted chain.
                if port == NUM_PORTS as u8 {
                    self.connect = Some(1);
                }
                ClassControl::Ack
            }
            _ => ClassControl::Ack,
        }
    }

    fn clear_port_feature(&mut self, feature: u16, port: u8) -> ClassControl {
        self.timer.chirp();
        match feature {
            PORT_FEATURE_C_CONNECTION => {
                let Some(p) = self.port_mut(port) else {
                    return ClassControl::Unsupported;
                };
                p.change &= !PORT_CHANGE_CONNECTION;
                if let Some(stage) = self.disconnecting.take() {
                    self.advance_disconnect_chain(stage);
                }
                ClassControl::Ack
            }
            PORT_FEATURE_C_RESET => {
                let Some(p) = self.port_mut(port) else {
                    return ClassControl::Unsupported;
                };
                p.change &= !PORT_CHANGE_RESET;
                // The fake device behind the freshly reset port must come up
                // at the default address; applying zero is itself a
                // scheduled, settled action.
                self.pending_address = Some(0);
                self.address_settled = false;
                ClassControl::Ack
            }
            _ => ClassControl::Ack,
        }
    }

    /// One step of the fixed teardown/bring-up chain, keyed by which port's
    /// disconnect the host just acknowledged.
    fn advance_disconnect_chain(&mut self, stage: u8) {
        match stage {
            1 => {
                self.connect = Some(6);
                // The sequence has done its job; hold the lamps steady.
                self.timer.set_mode(IndicatorMode::Ready);
                self.timer.delay(20);
            }
            2 => {
                self.connect = Some(4);
                self.timer.delay(15);
            }
            3 => {
                self.disconnect = Some(5);
                self.timer.delay(20);
            }
            4 => {
                self.disconnect = Some(1);
                self.timer.delay(20);
            }
            5 => {
                self.disconnect = Some(4);
                self.timer.delay(20);
            }
            _ => {}
        }
    }

    fn port_get_status(&mut self, port: u8) -> ClassControl {
        self.timer.chirp();
        let Some((status, change)) = self.port_words(port) else {
            return ClassControl::Unsupported;
        };
        let mut data = [0u8; 8];
        data[..2].copy_from_slice(&status.to_le_bytes());
        data[2..4].copy_from_slice(&change.to_le_bytes());
        ClassControl::RespondShort { data, len: 4 }
    }

    fn send_notification(&mut self, hw: &mut dyn UsbHw, port: u8, tgl: TogglePolicy) {
        bd::put_packet(hw, NOTIFY_ENDPOINT, &[1u8 << port], tgl);
    }

    fn do_connect(&mut self, core: &mut UsbCore, hw: &mut dyn UsbHw, port: u8) {
        if hw.address() != self.hub_address {
            core.set_address(hw, self.hub_address);
        }
        self.current_port = port;
        if let Some(p) = self.port_mut(port) {
            p.status = PORT_STATUS_FULL;
            p.change = PORT_CHANGE_CONNECTION;
        }
        let tgl = if self.force_data0 {
            TogglePolicy::Data0
        } else {
            TogglePolicy::Toggle
        };
        self.send_notification(hw, port, tgl);
        self.force_data0 = false;
    }

    fn do_disconnect(&mut self, core: &mut UsbCore, hw: &mut dyn UsbHw, port: u8) {
        if hw.address() != self.hub_address {
            core.set_address(hw, self.hub_address);
        }
        self.current_port = port;
        if let Some(p) = self.port_mut(port) {
            p.status = PORT_STATUS_EMPTY;
            p.change = PORT_CHANGE_CONNECTION;
        }
        self.send_notification(hw, port, TogglePolicy::Toggle);
        self.disconnecting = Some(port);
    }

    fn jig_step(&mut self, core: &UsbCore, hw: &mut dyn UsbHw) {
        match self.jig {
            JigState::Idle => {}
            JigState::Receiving { count } => {
                if !bd::is_data_ready(hw, JIG_RX_ENDPOINT) {
                    return;
                }
                self.timer.chirp();
                let mut scratch = [0u8; 8];
                bd::take_packet(hw, core.endpoints(), JIG_RX_ENDPOINT, &mut scratch);

                // A reply queued before the drain finishes must not race the
                // host's next interrupt poll; reclaim the transmit
                // descriptor by hand, parking its toggle at DATA1.
                let mut bd_in = hw.bd(NOTIFY_ENDPOINT, Dir::In);
                bd_in.stat = BD_STAT_DTS;
                hw.set_bd(NOTIFY_ENDPOINT, Dir::In, bd_in);

                let count = count + 1;
                if count == JIG_PACKETS {
                    self.jig = JigState::Replying { count: 0 };
                    self.timer.delay(JIG_TURNAROUND_SETTLE);
                } else {
                    self.jig = JigState::Receiving { count };
                }
            }
            JigState::Replying { count } => {
                let tgl = if count == 0 {
                    TogglePolicy::Data0
                } else {
                    TogglePolicy::Toggle
                };
                let packet = &descriptors::JIG_RESPONSE[count as usize];
                if !bd::put_packet(hw, NOTIFY_ENDPOINT, packet, tgl) {
                    // Transmit side still busy; retry next iteration.
                    return;
                }
                self.timer.delay(JIG_PACKET_SETTLE);
                self.timer.chirp();
                let count = count + 1;
                if count == JIG_PACKETS {
                    self.jig = JigState::Idle;
                    self.timer.delay(JIG_DONE_SETTLE);
                    self.disconnect = Some(3);
                } else {
                    self.jig = JigState::Replying { count };
                }
            }
        }
    }

    /// Runs the scheduler for one main-loop iteration: nothing at all while
    /// the settle countdown is live, otherwise at most one pending action.
    pub fn poll(&mut self, core: &mut UsbCore, hw: &mut dyn UsbHw) {
        if !self.timer.gate_open() {
            return;
        }

        if let Some(port) = self.connect.take() {
            self.do_connect(core, hw, port);
        } else if let Some(port) = self.reset.take() {
            self.send_notification(hw, port, TogglePolicy::Toggle);
        } else if let Some(port) = self.disconnect.take() {
            self.do_disconnect(core, hw, port);
        } else if self.jig != JigState::Idle {
            self.jig_step(core, hw);
        } else if let Some(address) = self.pending_address {
            if !self.address_settled {
                self.address_settled = true;
                self.timer.delay(ADDRESS_SETTLE);
            } else {
                core.set_address(hw, address);
                self.pending_address = None;
                self.address_settled = false;
            }
        }
    }
}

impl DeviceFunction for HubSequencer<'_> {
    fn device_descriptor(&mut self) -> Result<&'static [u8], DescriptorError> {
        self.timer.chirp();
        script::device_descriptor(self.current_port)
    }

    fn config_descriptor(
        &mut self,
        index: u8,
        short: bool,
    ) -> Result<&'static [u8], DescriptorError> {
        self.timer.chirp();
        let selection = script::config_descriptor(self.current_port, index, short)?;
        if let Some(effect) = selection.effect {
            self.apply_effect(effect);
        }
        Ok(selection.descriptor)
    }

    fn string_descriptor(&mut self, index: u8) -> Option<&'static [u8]> {
        script::string_descriptor(index)
    }

    fn hub_descriptor(&mut self) -> &'static [u8] {
        &descriptors::HUB_CLASS_DESCRIPTOR
    }

    fn class_request(&mut self, setup: &SetupPacket, bus_address: u8) -> ClassControl {
        let port = (setup.index & 0x00ff) as u8;
        match (setup.request_type, setup.request) {
            // Class-typed hub descriptor read.
            (0xa0, usb::REQUEST_GET_DESCRIPTOR) => {
                if setup.descriptor_type() == usb::DESCRIPTOR_TYPE_HUB {
                    ClassControl::Respond(&descriptors::HUB_CLASS_DESCRIPTOR)
                } else {
                    ClassControl::Unsupported
                }
            }
            (0xa0, usb::REQUEST_GET_STATUS) => {
                // Hub-level status: no local-power or over-current change.
                ClassControl::RespondShort {
                    data: [0; 8],
                    len: 4,
                }
            }
            (0xa3, usb::REQUEST_GET_STATUS) => self.port_get_status(port),
            (0x23, usb::REQUEST_SET_FEATURE) => {
                self.set_port_feature(setup.value, port, bus_address)
            }
            (0x23, usb::REQUEST_CLEAR_FEATURE) => self.clear_port_feature(setup.value, port),
            _ => ClassControl::Unsupported,
        }
    }
}
