//! Firmware core for a programmable USB hub impersonator.
//!
//! The device presents itself to a host as a 6-port full-speed hub and then
//! walks the host's enumeration stack through a scripted sequence of
//! fabricated hot-plug events: virtual devices connect, reset, disconnect
//! and serve descriptor sets chosen per "virtual port", with the timing a
//! real hub would impose. Once the scripted chain reaches the jig port, an
//! 8-packet vendor handshake is exchanged and the teardown chain runs.
//!
//! The crate is split along the hardware seam:
//!
//! - [`hw`] defines the register/packet-memory interface ([`hw::UsbHw`]),
//!   implemented once per target chip and by an in-memory model in tests;
//! - [`bd`] drives the per-endpoint buffer descriptors (arm, stall,
//!   toggle policy, endpoint configuration);
//! - [`device`] owns the device lifecycle and drains peripheral events into
//!   the endpoint-0 control engine;
//! - [`ch9`] implements the standard requests and chunks long responses;
//! - [`sequencer`] holds the virtual ports, the hub-class handlers, the
//!   action scheduler and the jig exchange;
//! - [`script`] is the table of descriptor selections and their scripted
//!   side effects; [`descriptors`] and [`payload`] hold the bytes;
//! - [`timer`] paces the scheduler off a 10 ms tick and renders the board
//!   indicator.
//!
//! Wiring on a target looks like:
//!
//! ```no_run
//! use decoy_usb::{ch9::ControlDispatcher, descriptors, device::UsbCore,
//!     sequencer::HubSequencer, timer::TickTimer};
//! # struct Sie; // per-target register access
//! # impl decoy_usb::hw::UsbHw for Sie {
//! #     fn attached(&self) -> bool { true }
//! #     fn bus_se0(&self) -> bool { false }
//! #     fn set_pullup(&mut self, _: bool) {}
//! #     fn ctrl(&self) -> u8 { 0 }
//! #     fn set_ctrl(&mut self, _: u8) {}
//! #     fn int_flags(&self) -> u8 { 0 }
//! #     fn clear_int_flags(&mut self, _: u8) {}
//! #     fn int_mask(&self) -> u8 { 0 }
//! #     fn set_int_mask(&mut self, _: u8) {}
//! #     fn err_flags(&self) -> u8 { 0 }
//! #     fn clear_err_flags(&mut self, _: u8) {}
//! #     fn err_mask(&self) -> u8 { 0 }
//! #     fn set_err_mask(&mut self, _: u8) {}
//! #     fn address(&self) -> u8 { 0 }
//! #     fn set_address(&mut self, _: u8) {}
//! #     fn token_status(&self) -> u8 { 0 }
//! #     fn ep_mode(&self, _: usize) -> u8 { 0 }
//! #     fn set_ep_mode(&mut self, _: usize, _: u8) {}
//! #     fn bd(&self, _: usize, _: decoy_usb::hw::Dir) -> decoy_usb::hw::Bd { Default::default() }
//! #     fn set_bd(&mut self, _: usize, _: decoy_usb::hw::Dir, _: decoy_usb::hw::Bd) {}
//! #     fn mem_read(&self, _: u16, _: &mut [u8]) {}
//! #     fn mem_write(&mut self, _: u16, _: &[u8]) {}
//! # }
//! static TIMER: TickTimer = TickTimer::new();
//!
//! let mut hw = Sie; // per-target UsbHw implementation
//! let mut core = UsbCore::new(&descriptors::ENDPOINTS);
//! let mut stack = ControlDispatcher::new(HubSequencer::new(&TIMER));
//!
//! // The periodic timer interrupt calls TIMER.tick(&mut lamp).
//! loop {
//!     core.task(&mut hw, &mut stack);
//!     core.isr(&mut hw, &mut stack); // or from the USB event interrupt
//!     stack.function.poll(&mut core, &mut hw);
//! }
//! ```

pub mod bd;
pub mod ch9;
pub mod descriptors;
pub mod device;
pub mod hw;
pub mod payload;
pub mod script;
pub mod sequencer;
pub mod timer;
pub mod usb;

pub use ch9::{ControlDispatcher, DeviceFunction};
pub use device::{DeviceState, ErrorCounters, RequestHandler, UsbCore};
pub use hw::UsbHw;
pub use script::DescriptorError;
pub use sequencer::HubSequencer;
pub use timer::TickTimer;
