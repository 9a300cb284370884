//! Chapter-9 request dispatcher.
//!
//! Classifies each SETUP packet and implements the standard device requests;
//! descriptor contents and everything class-specific are delegated to the
//! [`DeviceFunction`] collaborator. Responses longer than one control packet
//! are streamed chunk by chunk from the IN-completion hook, with a trailing
//! zero-length packet when the response is a packet multiple shorter than
//! the host asked for.

use crate::device::{ControlPipe, RequestHandler};
use crate::script::DescriptorError;
use crate::usb::{self, SetupPacket, EP0_MAX_PACKET};

/// Outcome of a class-specific request, declared by the [`DeviceFunction`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassControl {
    /// Not a request this function understands; the dispatcher stalls.
    Unsupported,
    /// No data stage; acknowledge with a zero-length status packet.
    Ack,
    /// Respond with a (possibly multi-packet) descriptor.
    Respond(&'static [u8]),
    /// Respond with a small computed payload.
    RespondShort { data: [u8; 8], len: u8 },
}

/// The function behind endpoint 0: descriptor lookups (selected by whatever
/// identity the function currently presents) plus class request handling.
pub trait DeviceFunction {
    fn device_descriptor(&mut self) -> Result<&'static [u8], DescriptorError>;
    fn config_descriptor(
        &mut self,
        index: u8,
        short: bool,
    ) -> Result<&'static [u8], DescriptorError>;
    fn string_descriptor(&mut self, index: u8) -> Option<&'static [u8]>;
    fn hub_descriptor(&mut self) -> &'static [u8];

    /// Handles a class request. `bus_address` is the peripheral's current
    /// hardware address at the time of the request.
    fn class_request(&mut self, setup: &SetupPacket, bus_address: u8) -> ClassControl;
}

/// A multi-packet IN response in flight.
struct PendingIn {
    data: &'static [u8],
    offset: usize,
    limit: usize,
    /// A short terminating packet is owed once the data runs out.
    zlp: bool,
}

impl PendingIn {
    fn next_chunk(&mut self) -> Option<&'static [u8]> {
        if self.offset < self.limit {
            let data = self.data;
            let len = (self.limit - self.offset).min(EP0_MAX_PACKET);
            let chunk = &data[self.offset..self.offset + len];
            self.offset += len;
            Some(chunk)
        } else if self.zlp {
            self.zlp = false;
            Some(&[])
        } else {
            None
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Deferred {
    None,
    /// SET_ADDRESS takes effect only after its status stage completes at the
    /// old address.
    SetAddress(u8),
}

pub struct ControlDispatcher<F: DeviceFunction> {
    pub function: F,
    configuration: u8,
    remote_wakeup: bool,
    deferred: Deferred,
    pending_in: Option<PendingIn>,
}

impl<F: DeviceFunction> ControlDispatcher<F> {
    pub fn new(function: F) -> Self {
        Self {
            function,
            configuration: 0,
            remote_wakeup: false,
            deferred: Deferred::None,
            pending_in: None,
        }
    }

    pub fn configuration(&self) -> u8 {
        self.configuration
    }

    /// Stages the first chunk of `data` (clamped to the host's `wLength`)
    /// and queues the rest for the IN-completion hook.
    fn start_in(&mut self, pipe: &mut ControlPipe<'_>, data: &'static [u8], wanted: u16) {
        let limit = data.len().min(wanted as usize);
        let first = limit.min(EP0_MAX_PACKET);
        pipe.respond(&data[..first]);

        let zlp = limit < wanted as usize && limit % EP0_MAX_PACKET == 0 && limit > 0;
        if first < limit || zlp {
            self.pending_in = Some(PendingIn {
                data,
                offset: first,
                limit,
                zlp,
            });
        }
    }

    fn get_descriptor(&mut self, setup: &SetupPacket, pipe: &mut ControlPipe<'_>) {
        match setup.descriptor_type() {
            usb::DESCRIPTOR_TYPE_DEVICE => match self.function.device_descriptor() {
                Ok(desc) => self.start_in(pipe, desc, setup.length),
                Err(_) => pipe.stall(),
            },
            usb::DESCRIPTOR_TYPE_CONFIGURATION => {
                let short = setup.length <= 9;
                match self
                    .function
                    .config_descriptor(setup.descriptor_index(), short)
                {
                    Ok(desc) => self.start_in(pipe, desc, setup.length),
                    Err(_) => pipe.stall(),
                }
            }
            usb::DESCRIPTOR_TYPE_STRING => {
                match self.function.string_descriptor(setup.descriptor_index()) {
                    Some(desc) => self.start_in(pipe, desc, setup.length),
                    None => pipe.stall(),
                }
            }
            // Some host stacks probe the hub descriptor with a
            // standard-typed GET_DESCRIPTOR despite it being class-specific.
            usb::DESCRIPTOR_TYPE_HUB => {
                let desc = self.function.hub_descriptor();
                self.start_in(pipe, desc, setup.length);
            }
            _ => pipe.stall(),
        }
    }

    fn standard_request(&mut self, setup: &SetupPacket, pipe: &mut ControlPipe<'_>) {
        match (setup.recipient(), setup.request) {
            (usb::RECIPIENT_DEVICE, usb::REQUEST_GET_DESCRIPTOR) if setup.is_device_to_host() => {
                self.get_descriptor(setup, pipe);
            }
            (usb::RECIPIENT_DEVICE, usb::REQUEST_SET_ADDRESS) => {
                if setup.value > 127 || setup.index != 0 {
                    pipe.stall();
                    return;
                }
                self.deferred = Deferred::SetAddress((setup.value & 0x007f) as u8);
                pipe.respond(&[]);
            }
            (usb::RECIPIENT_DEVICE, usb::REQUEST_SET_CONFIGURATION) => {
                // The decoys advertise up to three configurations; any of
                // their values is selectable, but only one is ever active.
                let config = (setup.value & 0x00ff) as u8;
                if setup.index != 0 || config > 3 {
                    pipe.stall();
                    return;
                }
                self.configuration = config;
                pipe.configure();
                pipe.respond(&[]);
            }
            (usb::RECIPIENT_DEVICE, usb::REQUEST_GET_CONFIGURATION)
                if setup.is_device_to_host() =>
            {
                let config = self.configuration;
                pipe.respond(&[config]);
            }
            (usb::RECIPIENT_DEVICE, usb::REQUEST_GET_STATUS) if setup.is_device_to_host() => {
                // Bit 0: self-powered (we are), bit 1: remote wakeup.
                let status: u16 = 0x0001 | (u16::from(self.remote_wakeup) << 1);
                pipe.respond(&status.to_le_bytes());
            }
            (usb::RECIPIENT_DEVICE, usb::REQUEST_SET_FEATURE)
                if setup.value == usb::FEATURE_DEVICE_REMOTE_WAKEUP =>
            {
                self.remote_wakeup = true;
                pipe.respond(&[]);
            }
            (usb::RECIPIENT_DEVICE, usb::REQUEST_CLEAR_FEATURE)
                if setup.value == usb::FEATURE_DEVICE_REMOTE_WAKEUP =>
            {
                self.remote_wakeup = false;
                pipe.respond(&[]);
            }
            (usb::RECIPIENT_INTERFACE, usb::REQUEST_GET_STATUS) if setup.is_device_to_host() => {
                pipe.respond(&[0, 0]);
            }
            (usb::RECIPIENT_INTERFACE, usb::REQUEST_GET_INTERFACE)
                if setup.is_device_to_host() =>
            {
                if setup.index == 0 {
                    pipe.respond(&[0]);
                } else {
                    pipe.stall();
                }
            }
            (usb::RECIPIENT_INTERFACE, usb::REQUEST_SET_INTERFACE) => {
                if setup.value == 0 && setup.index == 0 {
                    pipe.respond(&[]);
                } else {
                    pipe.stall();
                }
            }
            (usb::RECIPIENT_ENDPOINT, usb::REQUEST_GET_STATUS) if setup.is_device_to_host() => {
                let ep_addr = (setup.index & 0x00ff) as u8;
                if pipe.endpoint_is_valid(ep_addr) {
                    let status = u16::from(pipe.endpoint_stalled(ep_addr));
                    pipe.respond(&status.to_le_bytes());
                } else {
                    pipe.stall();
                }
            }
            (usb::RECIPIENT_ENDPOINT, usb::REQUEST_SET_FEATURE)
                if setup.value == usb::FEATURE_ENDPOINT_HALT =>
            {
                let ep_addr = (setup.index & 0x00ff) as u8;
                if pipe.endpoint_is_valid(ep_addr) {
                    pipe.stall_endpoint(ep_addr);
                    pipe.respond(&[]);
                } else {
                    pipe.stall();
                }
            }
            (usb::RECIPIENT_ENDPOINT, usb::REQUEST_CLEAR_FEATURE)
                if setup.value == usb::FEATURE_ENDPOINT_HALT =>
            {
                let ep_addr = (setup.index & 0x00ff) as u8;
                if pipe.endpoint_is_valid(ep_addr) {
                    pipe.unstall_endpoint(ep_addr);
                    pipe.respond(&[]);
                } else {
                    pipe.stall();
                }
            }
            _ => pipe.stall(),
        }
    }

    fn class_request(&mut self, setup: &SetupPacket, pipe: &mut ControlPipe<'_>) {
        let address = pipe.address();
        match self.function.class_request(setup, address) {
            ClassControl::Unsupported => pipe.stall(),
            ClassControl::Ack => pipe.respond(&[]),
            ClassControl::Respond(data) => self.start_in(pipe, data, setup.length),
            ClassControl::RespondShort { data, len } => {
                pipe.respond(&data[..len as usize]);
            }
        }
    }
}

impl<F: DeviceFunction> RequestHandler for ControlDispatcher<F> {
    fn bus_reset(&mut self) {
        self.configuration = 0;
        self.remote_wakeup = false;
        self.deferred = Deferred::None;
        self.pending_in = None;
    }

    fn control_request(&mut self, setup: &SetupPacket, pipe: &mut ControlPipe<'_>) {
        // A fresh SETUP abandons any half-streamed response.
        self.pending_in = None;

        match setup.kind() {
            usb::REQUEST_TYPE_STANDARD => self.standard_request(setup, pipe),
            usb::REQUEST_TYPE_CLASS => self.class_request(setup, pipe),
            _ => pipe.stall(),
        }
    }

    fn control_out(&mut self, _data: &[u8], _pipe: &mut ControlPipe<'_>) {
        // No supported request carries an OUT data stage; OUT packets here
        // are status handshakes and need no action.
    }

    fn control_in_complete(&mut self, pipe: &mut ControlPipe<'_>) {
        if let Deferred::SetAddress(address) = self.deferred {
            self.deferred = Deferred::None;
            pipe.apply_address(address);
            return;
        }

        if let Some(pending) = self.pending_in.as_mut() {
            match pending.next_chunk() {
                Some(chunk) => pipe.respond(chunk),
                None => self.pending_in = None,
            }
        }
    }
}
