//! Buffer-descriptor driver contracts, exercised directly against the mock
//! peripheral.

mod util;

use decoy_usb::bd::{self, TogglePolicy, BD_STAT_DTS, BD_STAT_STALL, BD_STAT_UOWN,
    DYNAMIC_BUFFER_BASE};
use decoy_usb::descriptors::ENDPOINTS;
use decoy_usb::hw::{Dir, UsbHw};

use util::MockSie;

#[test]
fn arm_transmit_fails_without_side_effects_while_engine_owned() {
    let mut sie = MockSie::new();
    bd::configure_endpoints(&mut sie, &ENDPOINTS);

    assert!(bd::arm_transmit(&mut sie, 1, 4, TogglePolicy::Data0));
    let armed = sie.bd(1, Dir::In);
    assert!(armed.stat & BD_STAT_UOWN != 0);

    // Second arm while the engine still owns the descriptor: refused, and
    // the descriptor is untouched.
    assert!(!bd::arm_transmit(&mut sie, 1, 7, TogglePolicy::Data1));
    assert_eq!(sie.bd(1, Dir::In), armed);
}

#[test]
fn alternating_transmits_start_at_data0() {
    let mut sie = MockSie::new();
    bd::configure_endpoints(&mut sie, &ENDPOINTS);

    for k in 1..=6u8 {
        assert!(bd::put_packet(&mut sie, 1, &[k], TogglePolicy::Toggle));
        let (_, data1) = sie.host_in(1).unwrap_ack();
        // The k-th packet carries toggle (k - 1) mod 2.
        assert_eq!(data1, (k - 1) % 2 == 1, "packet {k}");
    }
}

#[test]
fn mirrored_toggle_follows_the_receive_side() {
    let mut sie = MockSie::new();
    bd::configure_endpoints(&mut sie, &ENDPOINTS);
    sie.set_ep_mode(0, decoy_usb::hw::EP_MODE_CONTROL | decoy_usb::hw::EP_MODE_HANDSHAKE);

    // Park the endpoint-0 OUT toggle at DATA1, then arm the IN side from it.
    let mut out = sie.bd(0, Dir::Out);
    out.stat = BD_STAT_DTS;
    out.addr = 0;
    sie.set_bd(0, Dir::Out, out);
    let mut inn = sie.bd(0, Dir::In);
    inn.addr = 64;
    sie.set_bd(0, Dir::In, inn);

    assert!(bd::arm_transmit(&mut sie, 0, 0, TogglePolicy::FromLastReceived));
    assert!(sie.bd(0, Dir::In).stat & BD_STAT_DTS != 0);
}

#[test]
fn receive_stall_stalls_both_directions() {
    let mut sie = MockSie::new();
    bd::configure_endpoints(&mut sie, &ENDPOINTS);

    bd::arm_receive(&mut sie, &ENDPOINTS, 2, TogglePolicy::Stall);
    assert!(sie.bd(2, Dir::Out).stat & BD_STAT_STALL != 0);
    assert!(sie.bd(2, Dir::In).stat & BD_STAT_STALL != 0);
    assert!(bd::is_stalled(&sie, 0x02));
    assert!(bd::is_stalled(&sie, 0x82));

    bd::unstall(&mut sie, 0x02);
    bd::unstall(&mut sie, 0x82);
    assert!(!bd::is_stalled(&sie, 0x02));
    assert!(!bd::is_stalled(&sie, 0x82));
}

#[test]
fn configure_allocates_buffers_sequentially_past_endpoint_zero() {
    let mut sie = MockSie::new();
    bd::configure_endpoints(&mut sie, &ENDPOINTS);

    // Endpoint 1 is transmit-only (8 bytes), endpoint 2 receive-only: the
    // transmit buffer sits at the base, the receive buffer right after it.
    assert_eq!(sie.bd(1, Dir::In).addr, DYNAMIC_BUFFER_BASE);
    assert_eq!(sie.bd(2, Dir::Out).addr, DYNAMIC_BUFFER_BASE + 8);

    // Receive side armed for the engine, transmit side parked at DATA1.
    assert!(sie.bd(2, Dir::Out).stat & BD_STAT_UOWN != 0);
    assert_eq!(sie.bd(1, Dir::In).stat, BD_STAT_DTS);
}

#[test]
fn disable_all_clears_modes_and_descriptors() {
    let mut sie = MockSie::new();
    bd::configure_endpoints(&mut sie, &ENDPOINTS);
    assert!(sie.ep_mode(1) != 0);

    bd::disable_all_endpoints(&mut sie, &ENDPOINTS);
    assert_eq!(sie.ep_mode(1), 0);
    assert_eq!(sie.ep_mode(2), 0);
    assert_eq!(sie.bd(1, Dir::In).stat, 0);
    assert_eq!(sie.bd(2, Dir::Out).stat, 0);
}

#[test]
fn received_packets_report_their_length_and_rearm_flips_toggle() {
    let mut sie = MockSie::new();
    bd::configure_endpoints(&mut sie, &ENDPOINTS);

    assert!(!bd::is_data_ready(&sie, 2));
    sie.host_out(2, &[1, 2, 3, 4, 5], false).unwrap_ack();
    assert!(bd::is_data_ready(&sie, 2));
    assert_eq!(bd::read_received_length(&sie, 2), 5);

    let mut buf = [0u8; 8];
    let len = bd::take_packet(&mut sie, &ENDPOINTS, 2, &mut buf);
    assert_eq!(len, 5);
    assert_eq!(&buf[..5], &[1, 2, 3, 4, 5]);

    // Endpoint re-armed, now expecting the opposite parity.
    assert!(!bd::is_data_ready(&sie, 2));
    let armed = sie.bd(2, Dir::Out);
    assert!(armed.stat & BD_STAT_UOWN != 0);
    assert!(armed.stat & BD_STAT_DTS != 0);
}
