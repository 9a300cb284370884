//! Peripheral state machine and token dispatcher.
//!
//! [`UsbCore`] owns the device lifecycle (attach/detach, the six-state
//! enumeration ladder) and drains the peripheral's event flags: bus reset,
//! error, idle/suspend, wake, stall-detected, and token completions. Token
//! completions on endpoint 0 run the control-transfer engine, which decides
//! per SETUP/OUT/IN whether to re-arm, respond, or stall, and defers request
//! semantics to the [`RequestHandler`] collaborator.
//!
//! The two entry points mirror how the firmware is wired on hardware:
//! `task()` is polled from the main loop, `isr()` is called from the USB
//! event interrupt (or polled as well; it only acts on latched flags).

use crate::bd::{self, EndpointTable, TogglePolicy, BD_PID_SETUP, BD_STAT_KEEP, BD_STAT_PID_MASK,
    BD_STAT_UOWN};
use crate::hw::{Bd, Dir, UsbHw, CTRL_ENABLE, CTRL_PKT_DISABLE, CTRL_SUSPEND, EP_MODE_CONTROL,
    EP_MODE_HANDSHAKE, EP_MODE_STALLED, ERR_ALL, ERR_BIT_STUFF, ERR_BUS_TURNAROUND, ERR_CRC16,
    ERR_CRC5, ERR_DFN8, ERR_PID, INT_ACTIVITY, INT_ALL, INT_ERROR, INT_IDLE, INT_RESET, INT_SOF,
    INT_STALL, INT_TOKEN_DONE, TOKEN_STATUS_IN, token_status_endpoint};
use crate::usb::{SetupPacket, EP0_MAX_PACKET};

/// Interrupt sources the device runs with once enumerating.
const STANDARD_INTS: u8 =
    INT_STALL | INT_IDLE | INT_TOKEN_DONE | INT_ACTIVITY | INT_ERROR | INT_RESET;

/// Upper bound on token completions retired per `isr()` invocation. Bounds
/// worst-case interrupt latency; it makes no fairness promise across
/// endpoints.
const TOKEN_DRAIN_LIMIT: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceState {
    Detached,
    Attached,
    Powered,
    Default,
    Addressed,
    Configured,
}

/// What endpoint 0 should do once the current request step completes.
///
/// Exactly one of these is declared by the [`RequestHandler`] for every
/// SETUP packet; between completions the engine keeps the last declaration
/// so a data stage knows whether a trailing acknowledgment is owed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ep0Disposition {
    /// Unsupported request: answer the data/status stages with STALL.
    Stall,
    /// Host owes us more OUT data; leave the IN side alone.
    AwaitData,
    /// A response of this many bytes is staged in the endpoint-0 transmit
    /// buffer.
    Respond(u8),
}

/// Counts of the error conditions the engine can detect. Physical-layer
/// errors are never fatal (the host retries the transaction); the counters
/// exist so an embedder can tell a flaky cable from a protocol bug.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ErrorCounters {
    pub pid: u16,
    pub crc5: u16,
    pub crc16: u16,
    pub dfn8: u16,
    pub bus_turnaround: u16,
    pub bit_stuff: u16,
}

/// Handle given to the [`RequestHandler`] while a control transaction is
/// being serviced. Collects the handler's declaration and gives it the few
/// driver operations request semantics need (address, configuration,
/// endpoint halt).
pub struct ControlPipe<'a> {
    hw: &'a mut dyn UsbHw,
    state: &'a mut DeviceState,
    endpoints: &'static EndpointTable,
    disposition: &'a mut Ep0Disposition,
}

impl ControlPipe<'_> {
    /// Stages `data` in the endpoint-0 transmit buffer and declares a
    /// response. `data` must fit in one control packet; longer transfers are
    /// chunked by the handler across IN completions.
    pub fn respond(&mut self, data: &[u8]) {
        debug_assert!(data.len() <= EP0_MAX_PACKET);
        let addr = self.hw.bd(0, Dir::In).addr;
        self.hw.mem_write(addr, data);
        *self.disposition = Ep0Disposition::Respond(data.len() as u8);
    }

    /// Declares that the request carries an OUT data stage still to come.
    pub fn expect_data(&mut self) {
        *self.disposition = Ep0Disposition::AwaitData;
    }

    /// Declares the request unsupported.
    pub fn stall(&mut self) {
        *self.disposition = Ep0Disposition::Stall;
    }

    /// Current bus address of the peripheral.
    pub fn address(&self) -> u8 {
        self.hw.address()
    }

    /// Writes the hardware address register. Called from the status-stage
    /// completion of a SET_ADDRESS, never from the SETUP itself (the status
    /// handshake still runs at the old address).
    pub fn apply_address(&mut self, address: u8) {
        set_address(self.hw, self.state, address);
    }

    /// Applies the active configuration: enables the non-zero endpoints and
    /// enters the Configured state.
    pub fn configure(&mut self) {
        bd::configure_endpoints(self.hw, self.endpoints);
        *self.state = DeviceState::Configured;
    }

    pub fn device_state(&self) -> DeviceState {
        *self.state
    }

    pub fn endpoint_is_valid(&self, ep_addr: u8) -> bool {
        self.endpoints.is_valid(ep_addr)
    }

    pub fn stall_endpoint(&mut self, ep_addr: u8) {
        bd::stall(self.hw, ep_addr);
    }

    pub fn unstall_endpoint(&mut self, ep_addr: u8) {
        bd::unstall(self.hw, ep_addr);
    }

    pub fn endpoint_stalled(&self, ep_addr: u8) -> bool {
        bd::is_stalled(&*self.hw, ep_addr)
    }
}

/// Request-semantics collaborator driven by the control-transfer engine.
pub trait RequestHandler {
    /// The bus was reset (or the module re-attached); drop per-enumeration
    /// state. Scripted sequencing state deliberately survives this.
    fn bus_reset(&mut self);

    /// A SETUP packet arrived on endpoint 0. The handler must declare
    /// exactly one outcome on `pipe` before returning.
    fn control_request(&mut self, setup: &SetupPacket, pipe: &mut ControlPipe<'_>);

    /// An OUT data packet arrived on endpoint 0 (not a SETUP). Handlers
    /// consuming a data stage declare `respond(&[])` once it is complete.
    fn control_out(&mut self, data: &[u8], pipe: &mut ControlPipe<'_>);

    /// An IN packet on endpoint 0 was collected by the host. The handler may
    /// stage the next chunk of a longer response; if it declares nothing the
    /// endpoint is left idle awaiting the next SETUP.
    fn control_in_complete(&mut self, pipe: &mut ControlPipe<'_>);

    /// A token finished on a non-zero endpoint. Most applications poll the
    /// descriptor state instead and ignore this.
    fn transfer_complete(&mut self, ep: u8, dir: Dir) {
        let _ = (ep, dir);
    }
}

pub fn set_address(hw: &mut dyn UsbHw, state: &mut DeviceState, address: u8) {
    hw.set_address(address & 0x7f);
    *state = if address != 0 {
        DeviceState::Addressed
    } else {
        DeviceState::Powered
    };
}

pub struct UsbCore {
    state: DeviceState,
    endpoints: &'static EndpointTable,
    ep0: Ep0Disposition,
    counters: ErrorCounters,
}

impl UsbCore {
    pub fn new(endpoints: &'static EndpointTable) -> Self {
        Self {
            state: DeviceState::Detached,
            endpoints,
            ep0: Ep0Disposition::Stall,
            counters: ErrorCounters::default(),
        }
    }

    pub fn device_state(&self) -> DeviceState {
        self.state
    }

    pub fn is_configured(&self) -> bool {
        self.state == DeviceState::Configured
    }

    pub fn error_counters(&self) -> &ErrorCounters {
        &self.counters
    }

    pub fn endpoints(&self) -> &'static EndpointTable {
        self.endpoints
    }

    /// Re-addresses the peripheral outside of a control transfer. Used by
    /// the port sequencer when it re-targets the hub's own address.
    pub fn set_address(&mut self, hw: &mut dyn UsbHw, address: u8) {
        set_address(hw, &mut self.state, address);
    }

    /// Polled housekeeping: attaches the module when bus power appears,
    /// detaches when it goes away, and advances Attached to Powered once the
    /// bus leaves single-ended zero.
    pub fn task(&mut self, hw: &mut dyn UsbHw, handler: &mut dyn RequestHandler) {
        if hw.attached() {
            if hw.ctrl() & CTRL_ENABLE == 0 {
                self.attach(hw, handler);
            }
        } else if hw.ctrl() & CTRL_ENABLE != 0 {
            self.detach(hw, handler);
        }

        if self.state == DeviceState::Attached && !hw.bus_se0() {
            hw.clear_int_flags(INT_ALL);
            hw.set_int_mask(INT_IDLE | INT_RESET);
            self.state = DeviceState::Powered;
        }
    }

    fn attach(&mut self, hw: &mut dyn UsbHw, handler: &mut dyn RequestHandler) {
        handler.bus_reset();
        self.ep0 = Ep0Disposition::Stall;
        hw.set_ctrl(0);
        hw.set_pullup(true);
        hw.set_int_mask(0);
        hw.set_ctrl(CTRL_ENABLE);
        self.state = DeviceState::Attached;
    }

    fn detach(&mut self, hw: &mut dyn UsbHw, handler: &mut dyn RequestHandler) {
        hw.set_ctrl(0);
        hw.set_int_mask(0);
        hw.set_pullup(false);
        self.state = DeviceState::Detached;
        handler.bus_reset();
        self.ep0 = Ep0Disposition::Stall;
    }

    /// Drains the latched event flags. Dispatch order matters: activity
    /// first (it clears suspend), nothing else while suspended, then stall,
    /// error, reset, idle, start-of-frame, and finally a bounded batch of
    /// token completions.
    pub fn isr(&mut self, hw: &mut dyn UsbHw, handler: &mut dyn RequestHandler) {
        if self.state == DeviceState::Detached {
            return;
        }
        if hw.int_flags() == 0 {
            return;
        }

        let pending = |hw: &dyn UsbHw, bit: u8| hw.int_flags() & hw.int_mask() & bit != 0;

        if pending(hw, INT_ACTIVITY) {
            self.isr_activity(hw);
        }
        if hw.ctrl() & CTRL_SUSPEND != 0 {
            return;
        }
        if pending(hw, INT_STALL) {
            self.isr_stall(hw);
        }
        if pending(hw, INT_ERROR) {
            self.isr_error(hw);
        }
        if pending(hw, INT_RESET) {
            self.isr_reset(hw, handler);
        }
        if pending(hw, INT_IDLE) {
            self.isr_idle(hw);
        }
        if pending(hw, INT_SOF) {
            hw.clear_int_flags(INT_SOF);
        }

        for _ in 0..TOKEN_DRAIN_LIMIT {
            if !pending(hw, INT_TOKEN_DONE) {
                break;
            }
            let status = hw.token_status();
            hw.clear_int_flags(INT_TOKEN_DONE);
            self.token_done(hw, handler, status);
        }
    }

    /// Bus reset: back to the Default state with only endpoint 0 alive.
    fn isr_reset(&mut self, hw: &mut dyn UsbHw, handler: &mut dyn RequestHandler) {
        hw.clear_err_flags(ERR_ALL);
        hw.clear_int_flags(INT_ALL);
        hw.set_err_mask(ERR_ALL);
        hw.set_int_mask(STANDARD_INTS & !INT_ACTIVITY);

        hw.set_address(0);
        bd::disable_all_endpoints(hw, self.endpoints);

        handler.bus_reset();
        self.ep0 = Ep0Disposition::Stall;

        hw.set_ep_mode(0, EP_MODE_CONTROL | EP_MODE_HANDSHAKE);

        // Retire any completions that raced the reset.
        while hw.int_flags() & INT_TOKEN_DONE != 0 {
            hw.clear_int_flags(INT_TOKEN_DONE);
        }

        hw.set_ctrl(hw.ctrl() & !CTRL_PKT_DISABLE);
        self.init_ep0_setup(hw);

        self.state = DeviceState::Default;
    }

    /// Arms endpoint 0 OUT for the next SETUP packet (DATA0, toggle
    /// synchronization on) and parks the IN side firmware-owned.
    fn init_ep0_setup(&mut self, hw: &mut dyn UsbHw) {
        hw.set_bd(
            0,
            Dir::Out,
            Bd {
                stat: BD_STAT_UOWN | crate::bd::BD_STAT_DTS_ENABLE,
                cnt: EP0_MAX_PACKET as u8,
                addr: bd::EP0_OUT_BUFFER,
            },
        );
        hw.set_bd(
            0,
            Dir::In,
            Bd {
                stat: 0,
                cnt: 0,
                addr: bd::EP0_IN_BUFFER,
            },
        );
    }

    /// The engine answered some token with STALL. If it was endpoint 0, the
    /// control pipe must be re-primed for the next SETUP by hand.
    fn isr_stall(&mut self, hw: &mut dyn UsbHw) {
        if hw.ep_mode(0) & EP_MODE_STALLED != 0 {
            self.init_ep0_setup(hw);
            hw.set_ep_mode(0, hw.ep_mode(0) & !EP_MODE_STALLED);
        }
        hw.clear_int_flags(INT_STALL);
    }

    fn isr_error(&mut self, hw: &mut dyn UsbHw) {
        let errs = hw.err_flags() & hw.err_mask();
        if errs & ERR_PID != 0 {
            self.counters.pid = self.counters.pid.wrapping_add(1);
        }
        if errs & ERR_CRC5 != 0 {
            self.counters.crc5 = self.counters.crc5.wrapping_add(1);
        }
        if errs & ERR_CRC16 != 0 {
            self.counters.crc16 = self.counters.crc16.wrapping_add(1);
        }
        if errs & ERR_DFN8 != 0 {
            self.counters.dfn8 = self.counters.dfn8.wrapping_add(1);
        }
        if errs & ERR_BUS_TURNAROUND != 0 {
            self.counters.bus_turnaround = self.counters.bus_turnaround.wrapping_add(1);
        }
        if errs & ERR_BIT_STUFF != 0 {
            self.counters.bit_stuff = self.counters.bit_stuff.wrapping_add(1);
        }

        hw.clear_err_flags(ERR_ALL);
        hw.clear_int_flags(INT_ERROR);
    }

    /// Idle detected: suspend the module and wait for bus activity to wake
    /// us back up.
    fn isr_idle(&mut self, hw: &mut dyn UsbHw) {
        hw.set_int_mask(hw.int_mask() | INT_ACTIVITY);
        hw.clear_int_flags(INT_IDLE);
        hw.set_ctrl(hw.ctrl() | CTRL_SUSPEND);
    }

    fn isr_activity(&mut self, hw: &mut dyn UsbHw) {
        hw.set_ctrl(hw.ctrl() & !CTRL_SUSPEND);
        hw.set_int_mask(hw.int_mask() & !INT_ACTIVITY);
        while hw.int_flags() & INT_ACTIVITY != 0 {
            hw.clear_int_flags(INT_ACTIVITY);
        }
    }

    fn token_done(&mut self, hw: &mut dyn UsbHw, handler: &mut dyn RequestHandler, status: u8) {
        let ep = token_status_endpoint(status);
        let is_in = status & TOKEN_STATUS_IN != 0;

        if ep == 0 && !is_in {
            self.ep0_out_or_setup(hw, handler);
        } else if ep == 0 {
            self.ep0_in_done(hw, handler);
        } else {
            // Reclaim the descriptor's PID field so a stale value can't be
            // misread later, then hand the completion to the application.
            let dir = if is_in { Dir::In } else { Dir::Out };
            let mut bdsc = hw.bd(ep, dir);
            bdsc.stat &= BD_STAT_KEEP;
            hw.set_bd(ep, dir, bdsc);
            handler.transfer_complete(ep as u8, dir);
        }
    }

    fn ep0_out_or_setup(&mut self, hw: &mut dyn UsbHw, handler: &mut dyn RequestHandler) {
        let mut bd_out = hw.bd(0, Dir::Out);
        let pid = bd_out.stat & BD_STAT_PID_MASK;
        bd_out.stat &= BD_STAT_KEEP;
        hw.set_bd(0, Dir::Out, bd_out);

        if pid == BD_PID_SETUP {
            // A SETUP supersedes whatever response was queued; reclaim the
            // IN descriptor if the engine still holds it.
            let mut bd_in = hw.bd(0, Dir::In);
            if bd_in.stat & BD_STAT_UOWN != 0 {
                bd_in.stat = 0;
                hw.set_bd(0, Dir::In, bd_in);
            }

            let mut raw = [0u8; 8];
            hw.mem_read(bd_out.addr, &mut raw);
            let setup = SetupPacket::parse(raw);

            // Fail closed: a handler that declares nothing stalls.
            self.ep0 = Ep0Disposition::Stall;
            let mut pipe = ControlPipe {
                hw: &mut *hw,
                state: &mut self.state,
                endpoints: self.endpoints,
                disposition: &mut self.ep0,
            };
            handler.control_request(&setup, &mut pipe);

            // SETUP reception freezes token processing; release it now that
            // the request has been classified.
            hw.set_ctrl(hw.ctrl() & !CTRL_PKT_DISABLE);

            match self.ep0 {
                Ep0Disposition::Stall => {
                    bd::arm_receive(hw, self.endpoints, 0, TogglePolicy::Stall);
                }
                Ep0Disposition::AwaitData => {
                    bd::arm_receive(hw, self.endpoints, 0, TogglePolicy::Toggle);
                }
                Ep0Disposition::Respond(len) => {
                    // Arm the OUT side first: the response's toggle is then
                    // mirrored from it, keeping the data stage parity in
                    // step with the status stage.
                    bd::arm_receive(hw, self.endpoints, 0, TogglePolicy::Toggle);
                    bd::arm_transmit(hw, 0, len as u16, TogglePolicy::FromLastReceived);
                }
            }
        } else {
            // Plain OUT: a data stage or the status handshake of an IN
            // transfer.
            let len = bd::read_received_length(hw, 0) as usize;
            let mut data = [0u8; EP0_MAX_PACKET];
            let len = len.min(EP0_MAX_PACKET);
            hw.mem_read(bd_out.addr, &mut data[..len]);

            let mut pipe = ControlPipe {
                hw: &mut *hw,
                state: &mut self.state,
                endpoints: self.endpoints,
                disposition: &mut self.ep0,
            };
            handler.control_out(&data[..len], &mut pipe);

            bd::arm_receive(hw, self.endpoints, 0, TogglePolicy::Toggle);
            if let Ep0Disposition::Respond(len) = self.ep0 {
                bd::arm_transmit(hw, 0, len as u16, TogglePolicy::Data1);
            }
        }
    }

    fn ep0_in_done(&mut self, hw: &mut dyn UsbHw, handler: &mut dyn RequestHandler) {
        let mut bd_in = hw.bd(0, Dir::In);
        bd_in.stat &= BD_STAT_KEEP;
        hw.set_bd(0, Dir::In, bd_in);

        // Default to "nothing further"; the completion hook may stage the
        // next chunk of a longer response.
        self.ep0 = Ep0Disposition::Stall;
        let mut pipe = ControlPipe {
            hw: &mut *hw,
            state: &mut self.state,
            endpoints: self.endpoints,
            disposition: &mut self.ep0,
        };
        handler.control_in_complete(&mut pipe);

        if let Ep0Disposition::Respond(len) = self.ep0 {
            bd::arm_transmit(hw, 0, len as u16, TogglePolicy::Toggle);
        }
    }
}
