//! Static descriptor, string and jig-response tables.
//!
//! One descriptor set exists per virtual port: the hub's own set (port 0)
//! plus one set per downstream device the hub pretends to enumerate. The
//! long form of port 1's configuration carries the embedded payload blob
//! after its last real descriptor; hosts fetch it as opaque descriptor
//! bytes.

use crate::bd::{EndpointDir, EndpointTable, TransferKind};
use crate::payload;
use crate::usb::EP0_MAX_PACKET;

const NO_EP: Option<EndpointDir> = None;

/// Endpoint layout of the hub function: a control pipe, the status-change /
/// jig-response interrupt IN on endpoint 1, and the jig-request interrupt
/// OUT on endpoint 2.
pub static ENDPOINTS: EndpointTable = EndpointTable {
    tx: [
        Some(EndpointDir {
            kind: TransferKind::Control,
            size: EP0_MAX_PACKET as u16,
        }),
        Some(EndpointDir {
            kind: TransferKind::Interrupt,
            size: 8,
        }),
        NO_EP, NO_EP, NO_EP, NO_EP, NO_EP, NO_EP, NO_EP, NO_EP, NO_EP, NO_EP, NO_EP, NO_EP,
        NO_EP, NO_EP,
    ],
    rx: [
        Some(EndpointDir {
            kind: TransferKind::Control,
            size: EP0_MAX_PACKET as u16,
        }),
        NO_EP,
        Some(EndpointDir {
            kind: TransferKind::Interrupt,
            size: 8,
        }),
        NO_EP, NO_EP, NO_EP, NO_EP, NO_EP, NO_EP, NO_EP, NO_EP, NO_EP, NO_EP, NO_EP, NO_EP,
        NO_EP,
    ],
};

pub static HUB_DEVICE_DESCRIPTOR: [u8; 18] = [
    0x12, // bLength
    0x01, // bDescriptorType (Device)
    0x00, 0x02, // bcdUSB (2.00)
    0x09, // bDeviceClass (Hub)
    0x00, // bDeviceSubClass
    0x00, // bDeviceProtocol (full-speed hub)
    EP0_MAX_PACKET as u8, // bMaxPacketSize0
    0x09, 0x04, // idVendor (0x0409)
    0x5a, 0x00, // idProduct (0x005a)
    0x00, 0x01, // bcdDevice (1.00)
    0x00, // iManufacturer
    0x01, // iProduct
    0x00, // iSerialNumber
    0x01, // bNumConfigurations
];

/// Hub configuration: Config(9) + Interface(9) + Endpoint(7).
pub static HUB_CONFIG_DESCRIPTOR: [u8; 25] = [
    0x09, 0x02, 25, 0x00, // wTotalLength
    0x01, // bNumInterfaces
    0x01, // bConfigurationValue
    0x00, // iConfiguration
    0xe0, // bmAttributes (self powered + remote wakeup)
    0x32, // bMaxPower (100mA)
    0x09, 0x04, 0x00, 0x00, 0x01, // one endpoint
    0x09, // bInterfaceClass (Hub)
    0x00, 0x00, 0x00, //
    0x07, 0x05, 0x81, // Interrupt IN, endpoint 1
    0x03, 0x08, 0x00, // wMaxPacketSize 8
    0x0c, // bInterval
];

/// Hub class descriptor: 6 downstream ports.
pub static HUB_CLASS_DESCRIPTOR: [u8; 9] = [
    0x09, // bDescLength
    0x29, // bDescriptorType (Hub)
    0x06, // bNbrPorts
    0xa9, 0x00, // wHubCharacteristics
    0x32, // bPwrOn2PwrGood
    0x64, // bHubContrCurrent
    0x00, // DeviceRemovable
    0xff, // PortPwrCtrlMask
];

const fn port_device_descriptor(pid: u8, num_configurations: u8) -> [u8; 18] {
    [
        0x12, 0x01, //
        0x00, 0x02, // bcdUSB (2.00)
        0x00, 0x00, 0x00, // class defined at interface level
        EP0_MAX_PACKET as u8, //
        0x09, 0x12, // idVendor (0x1209)
        pid, 0xd0, // idProduct (0xd0xx)
        0x00, 0x01, // bcdDevice
        0x00, 0x00, 0x00, // no strings
        num_configurations,
    ]
}

pub static PORT1_DEVICE_DESCRIPTOR: [u8; 18] = port_device_descriptor(0x01, 4);
pub static PORT2_DEVICE_DESCRIPTOR: [u8; 18] = port_device_descriptor(0x02, 1);
pub static PORT3_DEVICE_DESCRIPTOR: [u8; 18] = port_device_descriptor(0x03, 1);
pub static PORT4_DEVICE_DESCRIPTOR: [u8; 18] = port_device_descriptor(0x04, 3);
pub static PORT5_DEVICE_DESCRIPTOR: [u8; 18] = port_device_descriptor(0x05, 1);

/// Config(9) + Interface(9) with no endpoints; the filler shape shared by
/// most of the downstream decoys.
const fn bare_config(total_len: usize, value: u8) -> [u8; 18] {
    [
        0x09, 0x02, //
        (total_len & 0xff) as u8,
        (total_len >> 8) as u8, // wTotalLength
        0x01, value, 0x00, //
        0x80, // bmAttributes (bus powered)
        0x32, //
        0x09, 0x04, 0x00, 0x00, //
        0x00, // bNumEndpoints
        0xff, 0x00, 0x00, // vendor interface
        0x00, //
    ]
}

/// 9-byte probe response: just the configuration header, advertising the
/// total length the full read will return.
const fn short_config(total_len: usize, value: u8) -> [u8; 9] {
    [
        0x09, 0x02, //
        (total_len & 0xff) as u8,
        (total_len >> 8) as u8, //
        0x01, value, 0x00, 0x80, 0x32,
    ]
}

pub const PORT1_CONFIG_LEN: usize = 25 + payload::PAYLOAD_LEN;

/// Long form of port 1's configuration: a plausible config/interface/
/// endpoint chain with the payload appended as trailing descriptor bytes.
pub static PORT1_CONFIG_DESCRIPTOR: [u8; PORT1_CONFIG_LEN] = port1_config();

const fn port1_config() -> [u8; PORT1_CONFIG_LEN] {
    let header: [u8; 25] = [
        0x09, 0x02, //
        (PORT1_CONFIG_LEN & 0xff) as u8,
        (PORT1_CONFIG_LEN >> 8) as u8, // wTotalLength
        0x01, 0x01, 0x00, 0x80, 0x32, //
        0x09, 0x04, 0x00, 0x00, 0x01, 0xff, 0x00, 0x00, 0x00, //
        0x07, 0x05, 0x81, 0x03, 0x08, 0x00, 0x0a,
    ];

    let mut out = [0u8; PORT1_CONFIG_LEN];
    let mut i = 0;
    while i < header.len() {
        out[i] = header[i];
        i += 1;
    }
    let mut j = 0;
    while j < payload::PAYLOAD_LEN {
        out[header.len() + j] = payload::PAYLOAD[j];
        j += 1;
    }
    out
}

pub static PORT1_SHORT_CONFIG_DESCRIPTOR: [u8; 9] = short_config(PORT1_CONFIG_LEN, 0x01);

pub static PORT2_CONFIG_DESCRIPTOR: [u8; 18] = bare_config(18, 0x01);
pub static PORT3_CONFIG_DESCRIPTOR: [u8; 18] = bare_config(18, 0x01);

pub static PORT4_CONFIG_1_DESCRIPTOR: [u8; 18] = bare_config(18, 0x01);
pub static PORT4_CONFIG_2_DESCRIPTOR: [u8; 18] = bare_config(18, 0x02);
pub static PORT4_SHORT_CONFIG_2_DESCRIPTOR: [u8; 9] = short_config(18, 0x02);
pub static PORT4_CONFIG_3_DESCRIPTOR: [u8; 18] = bare_config(18, 0x03);

/// The jig function: one vendor interface with an interrupt pair (IN on
/// endpoint 1, OUT on endpoint 2).
pub static PORT5_CONFIG_DESCRIPTOR: [u8; 32] = [
    0x09, 0x02, 32, 0x00, //
    0x01, 0x01, 0x00, 0x80, 0x32, //
    0x09, 0x04, 0x00, 0x00, 0x02, 0xff, 0x00, 0x00, 0x00, //
    0x07, 0x05, 0x81, 0x03, 0x08, 0x00, 0x01, //
    0x07, 0x05, 0x02, 0x03, 0x08, 0x00, 0x01,
];

pub static STRING_LANGID: [u8; 4] = [0x04, 0x03, 0x09, 0x04]; // en-US

pub static STRING_PRODUCT: [u8; 22] = [
    22, 0x03, //
    b'U', 0, b'S', 0, b'B', 0, b'2', 0, b'.', 0, b'0', 0, b' ', 0, b'H', 0, b'u', 0, b'b', 0,
];

/// The eight fixed reply packets of the vendor handshake, sent in table
/// order after the eight inbound packets have been drained.
pub static JIG_RESPONSE: [[u8; 8]; 8] = [
    [0x0e, 0x41, 0x97, 0x2c, 0x58, 0xaa, 0x3b, 0x10],
    [0xf2, 0x86, 0x4d, 0xe1, 0x09, 0x7f, 0xc0, 0x55],
    [0x23, 0xb8, 0x5e, 0x64, 0xd1, 0x0c, 0x92, 0xe7],
    [0x6a, 0x1f, 0xd4, 0x83, 0x3e, 0xf5, 0x48, 0x0b],
    [0xc9, 0x70, 0x2a, 0x16, 0xbd, 0x61, 0xfe, 0x94],
    [0x35, 0xe2, 0x8f, 0x49, 0x07, 0xda, 0x13, 0x6c],
    [0x81, 0x5c, 0xc6, 0xfa, 0x20, 0x4b, 0xa9, 0xd7],
    [0x18, 0x9d, 0x72, 0x05, 0xec, 0x36, 0x50, 0xbf],
];
