//! @generated by payload-embed from stage1.bin (256 bytes, 0 bytes padding).
//! Do not edit; regenerate with:
//!
//! ```text
//! payload-embed stage1.bin --name PAYLOAD -o src/payload.rs
//! ```

pub const PAYLOAD_LEN: usize = 256;
pub const PAYLOAD_PAD: usize = 0;

pub const PAYLOAD: [u8; PAYLOAD_LEN] = [
    0x7c, 0x08, 0x02, 0xa6, 0x80, 0x01, 0x00, 0xb0,
    0x48, 0x00, 0x54, 0x41, 0x48, 0x00, 0xbe, 0x55,
    0x90, 0x01, 0x00, 0x7c, 0x3c, 0x80, 0x62, 0x8d,
    0x38, 0x60, 0x1d, 0xd8, 0x80, 0x01, 0x00, 0x68,
    0x90, 0x01, 0x00, 0x7a, 0x90, 0x01, 0x00, 0x77,
    0x3c, 0x80, 0xce, 0x05, 0x7c, 0x68, 0x03, 0xa6,
    0x7c, 0x68, 0x03, 0xa6, 0x48, 0x00, 0xb1, 0xbd,
    0x48, 0x00, 0xb0, 0x65, 0x7c, 0x68, 0x03, 0xa6,
    0x90, 0x01, 0x00, 0x4e, 0x60, 0x00, 0x00, 0x00,
    0x60, 0x00, 0x00, 0x00, 0x3c, 0x80, 0x40, 0xac,
    0x80, 0x01, 0x00, 0x73, 0x3c, 0x80, 0x4e, 0xc3,
    0x48, 0x00, 0x23, 0x6d, 0x80, 0x01, 0x00, 0x75,
    0x7c, 0x68, 0x03, 0xa6, 0x3c, 0x80, 0xc7, 0xe5,
    0x3c, 0x80, 0xb8, 0xea, 0x3c, 0x80, 0x21, 0x9e,
    0x7c, 0x68, 0x03, 0xa6, 0x80, 0x01, 0x00, 0xe9,
    0x3c, 0x80, 0x02, 0x9b, 0x4e, 0x80, 0x00, 0x20,
    0x00, 0x00, 0x56, 0x00, 0x00, 0xe4, 0x00, 0xd0,
    0x00, 0x00, 0x90, 0x00, 0xf0, 0x02, 0x00, 0xc9,
    0x59, 0x00, 0x00, 0xab, 0x00, 0x4a, 0x33, 0x00,
    0x92, 0xf0, 0x00, 0x00, 0x00, 0x90, 0x8a, 0x00,
    0x2b, 0x00, 0x53, 0x7c, 0xdb, 0x00, 0x1b, 0x00,
    0x00, 0x00, 0xbe, 0x48, 0xeb, 0x00, 0x00, 0x24,
    0x00, 0x00, 0x1e, 0x98, 0x00, 0x90, 0x00, 0x00,
    0x00, 0xde, 0x00, 0x00, 0x34, 0x7a, 0x00, 0x00,
    0xe0, 0xc4, 0x00, 0x00, 0x00, 0x00, 0x00, 0x84,
    0x8f, 0x00, 0xdb, 0x1f, 0xf4, 0x1e, 0x00, 0xcb,
    0x93, 0x9a, 0x00, 0x00, 0x00, 0x47, 0x00, 0x00,
    0x31, 0x50, 0x47, 0x00, 0x84, 0x00, 0x7d, 0x00,
    0xe1, 0x00, 0x8b, 0x24, 0x00, 0x00, 0x00, 0x28,
    0x4f, 0x59, 0x7d, 0x00, 0x00, 0x72, 0x00, 0x00,
    0x8a, 0x00, 0x00, 0xcb, 0xac, 0x00, 0x00, 0xbc,
    0xdc, 0x00, 0x00, 0x00, 0xd8, 0x00, 0x00, 0x85,
];
