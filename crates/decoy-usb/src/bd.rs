//! Buffer descriptor driver.
//!
//! Every transfer on this peripheral is staged through a per-endpoint,
//! per-direction buffer descriptor: software fills in the byte count and a
//! status byte, then flips the ownership bit to hand the descriptor to the
//! engine; the engine clears ownership when the transaction completes. The
//! status byte also carries the DATA0/DATA1 toggle, and getting that bit
//! wrong makes the host silently discard or duplicate packets, so every arm
//! operation takes an explicit [`TogglePolicy`] instead of letting callers
//! poke the bit themselves.

use crate::hw::{Bd, Dir, UsbHw, EP_MODE_DISABLED, EP_MODE_HANDSHAKE, EP_MODE_IN_ONLY,
    EP_MODE_NON_CONTROL, EP_MODE_OUT_ONLY, NUM_ENDPOINTS};
use crate::usb::EP0_MAX_PACKET;

// Buffer descriptor status bits.
pub const BD_STAT_UOWN: u8 = 1 << 7;
pub const BD_STAT_DTS: u8 = 1 << 6;
pub const BD_STAT_DTS_ENABLE: u8 = 1 << 3;
pub const BD_STAT_STALL: u8 = 1 << 2;
pub const BD_STAT_BC9: u8 = 1 << 1;
pub const BD_STAT_BC8: u8 = 1 << 0;

/// PID of the last completed transaction, written back by the engine into
/// bits 2..=5 of the status byte.
pub const BD_STAT_PID_MASK: u8 = 0x3c;
pub const BD_PID_SETUP: u8 = 0x34;
pub const BD_PID_OUT: u8 = 0x04;
pub const BD_PID_IN: u8 = 0x24;

/// Mask applied when reclaiming a completed descriptor: keeps the toggle and
/// the count-extension bits, drops the PID field so a stale PID can never be
/// mistaken for a stall indication on the next completion.
pub const BD_STAT_KEEP: u8 = BD_STAT_DTS | BD_STAT_BC9 | BD_STAT_BC8;

// Packet memory layout: the two endpoint-0 buffers sit at the bottom,
// everything else is allocated sequentially by `configure_endpoints`.
pub const EP0_OUT_BUFFER: u16 = 0;
pub const EP0_IN_BUFFER: u16 = EP0_MAX_PACKET as u16;
pub const DYNAMIC_BUFFER_BASE: u16 = 2 * EP0_MAX_PACKET as u16;

/// How the data-toggle bit of an armed descriptor is chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TogglePolicy {
    Data0,
    Data1,
    /// Flip the toggle the descriptor last carried. On transmit this reads
    /// the IN descriptor, on receive the OUT descriptor.
    Toggle,
    /// Mirror the OUT descriptor's current toggle. Used for control
    /// responses so the IN data stage matches the parity the status/data
    /// stage was just armed with. Transmit-side only.
    FromLastReceived,
    /// Stall the endpoint instead of arming a transfer. On receive this
    /// stalls both directions at once.
    Stall,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferKind {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

#[derive(Clone, Copy, Debug)]
pub struct EndpointDir {
    pub kind: TransferKind,
    pub size: u16,
}

/// Static endpoint configuration: which endpoints exist, their transfer
/// kinds and buffer sizes. Endpoint 0 must be configured as control in both
/// directions.
pub struct EndpointTable {
    pub tx: [Option<EndpointDir>; NUM_ENDPOINTS],
    pub rx: [Option<EndpointDir>; NUM_ENDPOINTS],
}

impl EndpointTable {
    pub fn rx_size(&self, ep: usize) -> u16 {
        self.rx[ep].map(|d| d.size).unwrap_or(0)
    }

    pub fn tx_size(&self, ep: usize) -> u16 {
        self.tx[ep].map(|d| d.size).unwrap_or(0)
    }

    /// Whether the endpoint address (direction in bit 7) names a configured
    /// endpoint.
    pub fn is_valid(&self, ep_addr: u8) -> bool {
        let ep = (ep_addr & 0x7f) as usize;
        if ep >= NUM_ENDPOINTS {
            return false;
        }
        if ep_addr & 0x80 != 0 {
            self.tx[ep].is_some()
        } else {
            self.rx[ep].is_some()
        }
    }
}

fn stat_for_data_toggle(data1: bool) -> u8 {
    if data1 {
        BD_STAT_UOWN | BD_STAT_DTS | BD_STAT_DTS_ENABLE
    } else {
        BD_STAT_UOWN | BD_STAT_DTS_ENABLE
    }
}

fn stat_with_count_extension(stat: u8, len: u16) -> u8 {
    let mut stat = stat;
    if len & 0x100 != 0 {
        stat |= BD_STAT_BC8;
    }
    if len & 0x200 != 0 {
        stat |= BD_STAT_BC9;
    }
    stat
}

/// Whether the OUT side of `ep` holds a packet the firmware has not yet
/// consumed.
pub fn is_data_ready(hw: &dyn UsbHw, ep: usize) -> bool {
    hw.ep_mode(ep) != EP_MODE_DISABLED && hw.bd(ep, Dir::Out).stat & BD_STAT_UOWN == 0
}

/// Whether the IN side of `ep` is firmware-owned and can accept a new packet.
pub fn is_transmit_free(hw: &dyn UsbHw, ep: usize) -> bool {
    hw.ep_mode(ep) != EP_MODE_DISABLED && hw.bd(ep, Dir::In).stat & BD_STAT_UOWN == 0
}

/// Arms the IN descriptor of `ep` for a `len`-byte transmission.
///
/// Returns `false` without touching anything if the descriptor is still
/// owned by the engine (the previous packet has not been collected yet);
/// callers retry on a later loop iteration.
pub fn arm_transmit(hw: &mut dyn UsbHw, ep: usize, len: u16, tgl: TogglePolicy) -> bool {
    if !is_transmit_free(hw, ep) {
        return false;
    }

    let mut bd = hw.bd(ep, Dir::In);
    let stat = match tgl {
        TogglePolicy::Stall => BD_STAT_UOWN | BD_STAT_STALL,
        TogglePolicy::Data0 => stat_for_data_toggle(false),
        TogglePolicy::Data1 => stat_for_data_toggle(true),
        TogglePolicy::Toggle => stat_for_data_toggle(bd.stat & BD_STAT_DTS == 0),
        TogglePolicy::FromLastReceived => {
            stat_for_data_toggle(hw.bd(ep, Dir::Out).stat & BD_STAT_DTS != 0)
        }
    };

    bd.cnt = (len & 0xff) as u8;
    bd.stat = stat_with_count_extension(stat, len);
    hw.set_bd(ep, Dir::In, bd);
    true
}

/// Hands the OUT descriptor of `ep` back to the engine for the next packet,
/// using the endpoint's configured receive size.
///
/// `TogglePolicy::Stall` stalls both directions of the endpoint at once (a
/// control stall must answer the data and status stages alike).
pub fn arm_receive(hw: &mut dyn UsbHw, endpoints: &EndpointTable, ep: usize, tgl: TogglePolicy) {
    let mut bd = hw.bd(ep, Dir::Out);

    let stat = match tgl {
        TogglePolicy::Stall => {
            let mut bd_in = hw.bd(ep, Dir::In);
            bd_in.stat = BD_STAT_UOWN | BD_STAT_STALL;
            hw.set_bd(ep, Dir::In, bd_in);
            BD_STAT_UOWN | BD_STAT_STALL
        }
        TogglePolicy::Data0 => stat_for_data_toggle(false),
        TogglePolicy::Data1 => stat_for_data_toggle(true),
        // Receive-side policies resolve against the OUT descriptor's own
        // toggle history.
        TogglePolicy::Toggle | TogglePolicy::FromLastReceived => {
            stat_for_data_toggle(bd.stat & BD_STAT_DTS == 0)
        }
    };

    let len = endpoints.rx_size(ep);
    bd.cnt = (len & 0xff) as u8;
    bd.stat = stat_with_count_extension(stat, len);
    hw.set_bd(ep, Dir::Out, bd);
}

/// Byte count of the packet sitting in the OUT descriptor of `ep`, including
/// the two count-extension bits.
pub fn read_received_length(hw: &dyn UsbHw, ep: usize) -> u16 {
    let bd = hw.bd(ep, Dir::Out);
    let mut len = bd.cnt as u16;
    if bd.stat & BD_STAT_BC8 != 0 {
        len |= 0x100;
    }
    if bd.stat & BD_STAT_BC9 != 0 {
        len |= 0x200;
    }
    len
}

/// Copies a packet into the IN buffer of `ep` and arms it. Returns `false`
/// if the descriptor is still engine-owned.
pub fn put_packet(hw: &mut dyn UsbHw, ep: usize, data: &[u8], tgl: TogglePolicy) -> bool {
    if !is_transmit_free(hw, ep) {
        return false;
    }
    let addr = hw.bd(ep, Dir::In).addr;
    hw.mem_write(addr, data);
    arm_transmit(hw, ep, data.len() as u16, tgl)
}

/// Copies the received packet out of the OUT buffer of `ep` (up to
/// `buf.len()` bytes) and re-arms the endpoint with alternating toggle.
/// Returns the number of bytes copied.
pub fn take_packet(
    hw: &mut dyn UsbHw,
    endpoints: &EndpointTable,
    ep: usize,
    buf: &mut [u8],
) -> u16 {
    let bd = hw.bd(ep, Dir::Out);
    let len = (read_received_length(hw, ep) as usize).min(buf.len());
    hw.mem_read(bd.addr, &mut buf[..len]);
    arm_receive(hw, endpoints, ep, TogglePolicy::Toggle);
    len as u16
}

/// Stalls one direction of an endpoint. Direction is carried in bit 7 of
/// `ep_addr` (set for IN).
pub fn stall(hw: &mut dyn UsbHw, ep_addr: u8) {
    let ep = (ep_addr & 0x7f) as usize;
    let dir = if ep_addr & 0x80 != 0 { Dir::In } else { Dir::Out };
    let mut bd = hw.bd(ep, dir);
    bd.stat = BD_STAT_UOWN | BD_STAT_STALL;
    hw.set_bd(ep, dir, bd);
}

pub fn unstall(hw: &mut dyn UsbHw, ep_addr: u8) {
    let ep = (ep_addr & 0x7f) as usize;
    if ep_addr & 0x80 != 0 {
        let mut bd = hw.bd(ep, Dir::In);
        // Re-arm with toggle synchronization at DATA0; the next transfer
        // after a cleared halt restarts the sequence.
        bd.stat = BD_STAT_UOWN | BD_STAT_DTS_ENABLE;
        hw.set_bd(ep, Dir::In, bd);
    } else {
        let mut bd = hw.bd(ep, Dir::Out);
        bd.stat = 0;
        hw.set_bd(ep, Dir::Out, bd);
    }
}

pub fn is_stalled(hw: &dyn UsbHw, ep_addr: u8) -> bool {
    let ep = (ep_addr & 0x7f) as usize;
    let dir = if ep_addr & 0x80 != 0 { Dir::In } else { Dir::Out };
    let stat = hw.bd(ep, dir).stat;
    stat & BD_STAT_UOWN != 0 && stat & BD_STAT_STALL != 0
}

/// Enables every configured non-zero endpoint: allocates buffer space
/// sequentially past the endpoint-0 buffers, arms the receive sides, and
/// programs the per-endpoint mode registers.
pub fn configure_endpoints(hw: &mut dyn UsbHw, endpoints: &EndpointTable) {
    let mut addr = DYNAMIC_BUFFER_BASE;

    for ep in 1..NUM_ENDPOINTS {
        disable_endpoint(hw, endpoints, ep);

        let mut mode = 0u8;
        if let Some(rx) = endpoints.rx[ep] {
            mode |= EP_MODE_OUT_ONLY;
            let stat = stat_with_count_extension(
                BD_STAT_UOWN | BD_STAT_DTS_ENABLE,
                rx.size,
            );
            hw.set_bd(
                ep,
                Dir::Out,
                Bd {
                    stat,
                    cnt: (rx.size & 0xff) as u8,
                    addr,
                },
            );
            addr += rx.size;
        }
        if let Some(tx) = endpoints.tx[ep] {
            mode |= EP_MODE_IN_ONLY;
            // Leave the IN side firmware-owned with the toggle parked at
            // DATA1, so the first alternating transmit goes out as DATA0.
            hw.set_bd(
                ep,
                Dir::In,
                Bd {
                    stat: BD_STAT_DTS,
                    cnt: 0,
                    addr,
                },
            );
            addr += tx.size;
        }

        if mode == EP_MODE_IN_ONLY | EP_MODE_OUT_ONLY {
            mode = EP_MODE_NON_CONTROL;
        }
        if mode != 0 {
            let iso = matches!(
                endpoints.tx[ep],
                Some(EndpointDir {
                    kind: TransferKind::Isochronous,
                    ..
                })
            );
            if !iso {
                mode |= EP_MODE_HANDSHAKE;
            }
            hw.set_ep_mode(ep, mode);
        }
    }
}

pub fn disable_endpoint(hw: &mut dyn UsbHw, endpoints: &EndpointTable, ep: usize) {
    hw.set_ep_mode(ep, EP_MODE_DISABLED);

    // Descriptors exist only for endpoints the table allocates (and for
    // endpoint 0); leave unallocated slots alone.
    if endpoints.rx[ep].is_some() || endpoints.tx[ep].is_some() || ep == 0 {
        let mut out = hw.bd(ep, Dir::Out);
        out.stat = 0;
        hw.set_bd(ep, Dir::Out, out);
        let mut inn = hw.bd(ep, Dir::In);
        inn.stat = 0;
        hw.set_bd(ep, Dir::In, inn);
    }
}

pub fn disable_all_endpoints(hw: &mut dyn UsbHw, endpoints: &EndpointTable) {
    for ep in 1..NUM_ENDPOINTS {
        disable_endpoint(hw, endpoints, ep);
    }
}
