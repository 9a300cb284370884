#![allow(dead_code)]

//! Shared test harness: an in-memory model of the USB peripheral that plays
//! the host side of each transaction, plus control-transfer helpers.

use std::collections::VecDeque;

use decoy_usb::bd::{BD_PID_IN, BD_PID_OUT, BD_PID_SETUP, BD_STAT_BC8, BD_STAT_BC9, BD_STAT_DTS,
    BD_STAT_DTS_ENABLE, BD_STAT_STALL, BD_STAT_UOWN};
use decoy_usb::ch9::ControlDispatcher;
use decoy_usb::device::UsbCore;
use decoy_usb::hw::{Bd, Dir, UsbHw, CTRL_PKT_DISABLE, EP_MODE_STALLED, INT_RESET, INT_STALL,
    INT_TOKEN_DONE, NUM_ENDPOINTS, PACKET_MEM_SIZE, TOKEN_STATUS_IN};
use decoy_usb::sequencer::HubSequencer;
use decoy_usb::usb::EP0_MAX_PACKET;

pub type Stack<'t> = ControlDispatcher<HubSequencer<'t>>;

/// Lamp sink for tests that tick the timer but don't watch the indicator.
pub struct NullLamp;

impl decoy_usb::timer::StatusLamp for NullLamp {
    fn set_red(&mut self, _on: bool) {}
    fn set_green(&mut self, _on: bool) {}
}

/// Outcome of a host-initiated transaction against the mock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Host {
    /// Handshake was ACK; for IN transactions carries the packet payload and
    /// its DATA1 flag.
    Ack { data: Vec<u8>, data1: bool },
    Nak,
    Stall,
}

impl Host {
    pub fn unwrap_ack(self) -> (Vec<u8>, bool) {
        match self {
            Host::Ack { data, data1 } => (data, data1),
            other => panic!("expected ACK, got {other:?}"),
        }
    }
}

/// Register-accurate model of the device-side USB engine, with helper
/// methods emulating host transactions. Completions are queued in a token
/// FIFO exactly as the hardware does; clearing the token-done flag retires
/// one entry.
pub struct MockSie {
    pub vbus: bool,
    pub se0: bool,
    pub pullup: bool,
    ctrl: u8,
    int_flags: u8,
    int_mask: u8,
    err_flags: u8,
    err_mask: u8,
    address: u8,
    ep_mode: [u8; NUM_ENDPOINTS],
    bds: [[Bd; 2]; NUM_ENDPOINTS],
    mem: Vec<u8>,
    tokens: VecDeque<u8>,
}

impl MockSie {
    pub fn new() -> Self {
        Self {
            vbus: true,
            se0: false,
            pullup: false,
            ctrl: 0,
            int_flags: 0,
            int_mask: 0,
            err_flags: 0,
            err_mask: 0,
            address: 0,
            ep_mode: [0; NUM_ENDPOINTS],
            bds: [[Bd::default(); 2]; NUM_ENDPOINTS],
            mem: vec![0; PACKET_MEM_SIZE],
            tokens: VecDeque::new(),
        }
    }

    fn dir_index(dir: Dir) -> usize {
        match dir {
            Dir::Out => 0,
            Dir::In => 1,
        }
    }

    fn push_token(&mut self, ep: usize, dir: Dir) {
        let mut status = (ep as u8) << 3;
        if dir == Dir::In {
            status |= TOKEN_STATUS_IN;
        }
        self.tokens.push_back(status);
        self.int_flags |= INT_TOKEN_DONE;
    }

    fn bd_len(bd: &Bd) -> usize {
        let mut len = bd.cnt as usize;
        if bd.stat & BD_STAT_BC8 != 0 {
            len |= 0x100;
        }
        if bd.stat & BD_STAT_BC9 != 0 {
            len |= 0x200;
        }
        len
    }

    /// Raises the bus-reset condition.
    pub fn host_reset(&mut self) {
        self.int_flags |= INT_RESET;
    }

    /// Flags one of the physical-layer error conditions.
    pub fn host_line_error(&mut self, bits: u8) {
        self.err_flags |= bits;
        self.int_flags |= decoy_usb::hw::INT_ERROR;
    }

    /// Delivers a SETUP packet on endpoint 0. SETUPs are always accepted
    /// regardless of the armed toggle; reception freezes token processing
    /// until the firmware releases it.
    pub fn host_send_setup(&mut self, bytes: [u8; 8]) {
        let bd = &mut self.bds[0][0];
        assert!(
            bd.stat & BD_STAT_UOWN != 0,
            "endpoint 0 OUT not armed for SETUP"
        );
        let addr = bd.addr as usize;
        self.mem[addr..addr + 8].copy_from_slice(&bytes);
        bd.cnt = 8;
        bd.stat = BD_PID_SETUP;
        self.ctrl |= CTRL_PKT_DISABLE;
        self.push_token(0, Dir::Out);
    }

    /// Delivers an OUT data packet with the given toggle parity.
    pub fn host_out(&mut self, ep: usize, data: &[u8], data1: bool) -> Host {
        let bd = self.bds[ep][0];
        if bd.stat & BD_STAT_UOWN == 0 {
            return Host::Nak;
        }
        if bd.stat & BD_STAT_STALL != 0 {
            self.int_flags |= INT_STALL;
            if ep == 0 {
                self.ep_mode[0] |= EP_MODE_STALLED;
            }
            return Host::Stall;
        }
        if bd.stat & BD_STAT_DTS_ENABLE != 0 && (bd.stat & BD_STAT_DTS != 0) != data1 {
            panic!("OUT toggle mismatch on endpoint {ep}: host sent DATA{}", data1 as u8);
        }

        let addr = bd.addr as usize;
        self.mem[addr..addr + data.len()].copy_from_slice(data);
        let bd = &mut self.bds[ep][0];
        bd.cnt = (data.len() & 0xff) as u8;
        bd.stat = BD_PID_OUT
            | if data1 { BD_STAT_DTS } else { 0 }
            | if data.len() & 0x100 != 0 { BD_STAT_BC8 } else { 0 }
            | if data.len() & 0x200 != 0 { BD_STAT_BC9 } else { 0 };
        self.push_token(ep, Dir::Out);
        Host::Ack {
            data: Vec::new(),
            data1,
        }
    }

    /// Polls an IN endpoint once.
    pub fn host_in(&mut self, ep: usize) -> Host {
        let bd = self.bds[ep][1];
        if bd.stat & BD_STAT_UOWN == 0 {
            return Host::Nak;
        }
        if bd.stat & BD_STAT_STALL != 0 {
            self.int_flags |= INT_STALL;
            if ep == 0 {
                self.ep_mode[0] |= EP_MODE_STALLED;
            }
            return Host::Stall;
        }

        let len = Self::bd_len(&bd);
        let addr = bd.addr as usize;
        let data = self.mem[addr..addr + len].to_vec();
        let data1 = bd.stat & BD_STAT_DTS != 0;

        let bd = &mut self.bds[ep][1];
        bd.stat = (bd.stat & (BD_STAT_DTS | BD_STAT_BC8 | BD_STAT_BC9)) | BD_PID_IN;
        self.push_token(ep, Dir::In);
        Host::Ack { data, data1 }
    }
}

impl UsbHw for MockSie {
    fn attached(&self) -> bool {
        self.vbus
    }

    fn bus_se0(&self) -> bool {
        self.se0
    }

    fn set_pullup(&mut self, on: bool) {
        self.pullup = on;
    }

    fn ctrl(&self) -> u8 {
        self.ctrl
    }

    fn set_ctrl(&mut self, value: u8) {
        self.ctrl = value;
    }

    fn int_flags(&self) -> u8 {
        self.int_flags
    }

    fn clear_int_flags(&mut self, bits: u8) {
        if bits & INT_TOKEN_DONE != 0 {
            self.tokens.pop_front();
            self.int_flags &= !INT_TOKEN_DONE;
            if !self.tokens.is_empty() {
                self.int_flags |= INT_TOKEN_DONE;
            }
        }
        self.int_flags &= !(bits & !INT_TOKEN_DONE);
    }

    fn int_mask(&self) -> u8 {
        self.int_mask
    }

    fn set_int_mask(&mut self, value: u8) {
        self.int_mask = value;
    }

    fn err_flags(&self) -> u8 {
        self.err_flags
    }

    fn clear_err_flags(&mut self, bits: u8) {
        self.err_flags &= !bits;
    }

    fn err_mask(&self) -> u8 {
        self.err_mask
    }

    fn set_err_mask(&mut self, value: u8) {
        self.err_mask = value;
    }

    fn address(&self) -> u8 {
        self.address
    }

    fn set_address(&mut self, address: u8) {
        self.address = address;
    }

    fn token_status(&self) -> u8 {
        self.tokens.front().copied().unwrap_or(0)
    }

    fn ep_mode(&self, ep: usize) -> u8 {
        self.ep_mode[ep]
    }

    fn set_ep_mode(&mut self, ep: usize, value: u8) {
        self.ep_mode[ep] = value;
    }

    fn bd(&self, ep: usize, dir: Dir) -> Bd {
        self.bds[ep][Self::dir_index(dir)]
    }

    fn set_bd(&mut self, ep: usize, dir: Dir, bd: Bd) {
        self.bds[ep][Self::dir_index(dir)] = bd;
    }

    fn mem_read(&self, addr: u16, buf: &mut [u8]) {
        let addr = addr as usize;
        buf.copy_from_slice(&self.mem[addr..addr + buf.len()]);
    }

    fn mem_write(&mut self, addr: u16, data: &[u8]) {
        let addr = addr as usize;
        self.mem[addr..addr + data.len()].copy_from_slice(data);
    }
}

pub fn setup_bytes(
    request_type: u8,
    request: u8,
    value: u16,
    index: u16,
    length: u16,
) -> [u8; 8] {
    let v = value.to_le_bytes();
    let i = index.to_le_bytes();
    let l = length.to_le_bytes();
    [request_type, request, v[0], v[1], i[0], i[1], l[0], l[1]]
}

/// Attaches the module and resets the bus, leaving the device in the
/// Default state with endpoint 0 armed for SETUP.
pub fn bring_up(core: &mut UsbCore, stack: &mut Stack<'_>, sie: &mut MockSie) {
    core.task(sie, stack);
    assert_eq!(core.device_state(), decoy_usb::DeviceState::Powered);
    sie.host_reset();
    core.isr(sie, stack);
    assert_eq!(core.device_state(), decoy_usb::DeviceState::Default);
}

/// Runs a full device-to-host control transfer, returning the concatenated
/// data stage, or `Err(())` if any stage stalled.
pub fn control_read(
    core: &mut UsbCore,
    stack: &mut Stack<'_>,
    sie: &mut MockSie,
    setup: [u8; 8],
) -> Result<Vec<u8>, ()> {
    let wanted = u16::from_le_bytes([setup[6], setup[7]]) as usize;
    sie.host_send_setup(setup);
    core.isr(sie, stack);

    let mut data = Vec::new();
    loop {
        match sie.host_in(0) {
            Host::Ack { data: chunk, .. } => {
                let n = chunk.len();
                data.extend_from_slice(&chunk);
                core.isr(sie, stack);
                if n < EP0_MAX_PACKET || data.len() >= wanted {
                    break;
                }
            }
            Host::Nak => break,
            Host::Stall => {
                core.isr(sie, stack);
                return Err(());
            }
        }
    }

    // Status stage: zero-length OUT with DATA1.
    match sie.host_out(0, &[], true) {
        Host::Ack { .. } => core.isr(sie, stack),
        Host::Stall => {
            core.isr(sie, stack);
            return Err(());
        }
        Host::Nak => {}
    }
    Ok(data)
}

/// Runs a host-to-device control transfer with no data stage. Returns
/// whether the status stage acknowledged.
pub fn control_no_data(
    core: &mut UsbCore,
    stack: &mut Stack<'_>,
    sie: &mut MockSie,
    setup: [u8; 8],
) -> bool {
    sie.host_send_setup(setup);
    core.isr(sie, stack);

    match sie.host_in(0) {
        Host::Ack { data, .. } => {
            assert!(data.is_empty(), "status stage carried data: {data:?}");
            core.isr(sie, stack);
            true
        }
        Host::Stall => {
            core.isr(sie, stack);
            false
        }
        Host::Nak => false,
    }
}

/// Advances the timer by `n` ticks against a throwaway lamp.
pub fn tick_n(timer: &decoy_usb::timer::TickTimer, n: u16) {
    let mut lamp = NullLamp;
    for _ in 0..n {
        timer.tick(&mut lamp);
    }
}

/// Drives the scripted chain from a freshly enumerated hub all the way to
/// the jig port: fabricated connects for ports 1 through 5, with every
/// descriptor fetch and settle delay the script expects along the way.
pub fn run_script_to_jig(
    core: &mut UsbCore,
    stack: &mut Stack<'_>,
    sie: &mut MockSie,
    timer: &decoy_usb::timer::TickTimer,
) {
    use decoy_usb::sequencer::JigState;

    // Hub bring-up finishes by powering the ports; the last one starts the
    // script.
    for port in 1..=6u16 {
        assert!(control_no_data(
            core,
            stack,
            sie,
            setup_bytes(0x23, 0x03, 8, port, 0),
        ));
    }

    // Connect port 1, then walk each decoy's descriptor cue.
    stack.function.poll(core, sie);
    sie.host_in(1).unwrap_ack();
    core.isr(sie, stack);
    let total1 = decoy_usb::descriptors::PORT1_CONFIG_DESCRIPTOR.len() as u16;
    control_read(core, stack, sie, setup_bytes(0x80, 0x06, 0x0203, 0, total1)).unwrap();
    tick_n(timer, 10);
    stack.function.poll(core, sie);
    sie.host_in(1).unwrap_ack();
    core.isr(sie, stack);

    control_read(core, stack, sie, setup_bytes(0x80, 0x06, 0x0200, 0, 18)).unwrap();
    tick_n(timer, 15);
    stack.function.poll(core, sie);
    sie.host_in(1).unwrap_ack();
    core.isr(sie, stack);

    control_read(core, stack, sie, setup_bytes(0x80, 0x06, 0x0200, 0, 18)).unwrap();
    tick_n(timer, 10);
    stack.function.poll(core, sie);
    sie.host_in(1).unwrap_ack();
    core.isr(sie, stack);

    // Port 2's fabricated disconnect; acknowledging it resumes the chain
    // with port 4.
    assert!(control_no_data(
        core,
        stack,
        sie,
        setup_bytes(0x23, 0x01, 16, 2, 0),
    ));
    tick_n(timer, 15);
    stack.function.poll(core, sie);
    sie.host_in(1).unwrap_ack();
    core.isr(sie, stack);

    control_read(core, stack, sie, setup_bytes(0x80, 0x06, 0x0202, 0, 18)).unwrap();
    tick_n(timer, 20);
    stack.function.poll(core, sie);
    sie.host_in(1).unwrap_ack();
    core.isr(sie, stack);

    control_read(core, stack, sie, setup_bytes(0x80, 0x06, 0x0200, 0, 32)).unwrap();
    assert_eq!(stack.function.jig_state(), JigState::Receiving { count: 0 });
}

/// SetAddress + SetConfiguration(1), the generic half of hub enumeration.
pub fn enumerate(core: &mut UsbCore, stack: &mut Stack<'_>, sie: &mut MockSie, address: u8) {
    assert!(control_no_data(
        core,
        stack,
        sie,
        setup_bytes(0x00, 0x05, address as u16, 0, 0),
    ));
    assert_eq!(sie.address, address);

    assert!(control_no_data(
        core,
        stack,
        sie,
        setup_bytes(0x00, 0x09, 1, 0, 0),
    ));
    assert!(core.is_configured());
}
