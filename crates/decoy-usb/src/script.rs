//! Descriptor selection for the scripted enumeration chain.
//!
//! Every virtual port owns a descriptor set, and fetching certain
//! configuration descriptors is itself a scripting trigger: the host reading
//! a particular (port, index, variant) combination is the cue to arm the
//! next fabricated hot-plug event. Those side effects are kept out of the
//! lookup itself; a lookup returns the matched [`ConfigSelection`] and the
//! caller applies its [`ScriptEffect`], which makes the whole chain
//! table-driven and inspectable.
//!
//! Lookups that match no rule are a hard failure: the caller answers the
//! request with a STALL rather than serving whatever bytes happen to be
//! nearby.

use crate::descriptors;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("no device descriptor for virtual port {port}")]
    UnknownPort { port: u8 },
    #[error("no configuration for port {port}, index {index}, short={short}")]
    UnmatchedConfig { port: u8, index: u8, short: bool },
}

/// Scripted side effect fired by a configuration-descriptor fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptEffect {
    /// Arm a connect of `port` after `settle` ticks. `force_data0` makes the
    /// resulting status-change notification go out as DATA0 regardless of
    /// the endpoint's toggle history.
    Connect {
        port: u8,
        settle: u16,
        force_data0: bool,
    },
    /// Arm a disconnect of `port` after `settle` ticks.
    Disconnect { port: u8, settle: u16 },
    /// The hub's own configuration was read; switch the indicator to its
    /// chirp pattern.
    ChirpIndicator,
    /// The jig port's configuration was read; start draining the handshake.
    BeginJig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfigSelection {
    pub descriptor: &'static [u8],
    pub effect: Option<ScriptEffect>,
}

struct ConfigRule {
    port: u8,
    /// `None` matches any requested index.
    index: Option<u8>,
    /// `None` matches both variants, otherwise the required `short` flag.
    short: Option<bool>,
    descriptor: &'static [u8],
    effect: Option<ScriptEffect>,
}

/// First match wins; the narrow rules sit above their catch-alls.
static CONFIG_RULES: &[ConfigRule] = &[
    ConfigRule {
        port: 0,
        index: None,
        short: None,
        descriptor: &descriptors::HUB_CONFIG_DESCRIPTOR,
        effect: Some(ScriptEffect::ChirpIndicator),
    },
    ConfigRule {
        port: 1,
        index: None,
        short: Some(true),
        descriptor: &descriptors::PORT1_SHORT_CONFIG_DESCRIPTOR,
        effect: None,
    },
    // The full read of port 1's fourth configuration is the cue to surface
    // the next decoy.
    ConfigRule {
        port: 1,
        index: Some(3),
        short: Some(false),
        descriptor: &descriptors::PORT1_CONFIG_DESCRIPTOR,
        effect: Some(ScriptEffect::Connect {
            port: 2,
            settle: 10,
            force_data0: false,
        }),
    },
    ConfigRule {
        port: 1,
        index: None,
        short: Some(false),
        descriptor: &descriptors::PORT1_CONFIG_DESCRIPTOR,
        effect: None,
    },
    ConfigRule {
        port: 2,
        index: None,
        short: Some(true),
        descriptor: &descriptors::PORT2_CONFIG_DESCRIPTOR,
        effect: None,
    },
    ConfigRule {
        port: 2,
        index: None,
        short: Some(false),
        descriptor: &descriptors::PORT2_CONFIG_DESCRIPTOR,
        effect: Some(ScriptEffect::Connect {
            port: 3,
            settle: 15,
            force_data0: false,
        }),
    },
    ConfigRule {
        port: 3,
        index: None,
        short: Some(true),
        descriptor: &descriptors::PORT3_CONFIG_DESCRIPTOR,
        effect: None,
    },
    ConfigRule {
        port: 3,
        index: None,
        short: Some(false),
        descriptor: &descriptors::PORT3_CONFIG_DESCRIPTOR,
        effect: Some(ScriptEffect::Disconnect {
            port: 2,
            settle: 10,
        }),
    },
    ConfigRule {
        port: 4,
        index: Some(0),
        short: None,
        descriptor: &descriptors::PORT4_CONFIG_1_DESCRIPTOR,
        effect: None,
    },
    ConfigRule {
        port: 4,
        index: Some(1),
        short: Some(true),
        descriptor: &descriptors::PORT4_SHORT_CONFIG_2_DESCRIPTOR,
        effect: None,
    },
    ConfigRule {
        port: 4,
        index: Some(1),
        short: Some(false),
        descriptor: &descriptors::PORT4_CONFIG_2_DESCRIPTOR,
        effect: None,
    },
    ConfigRule {
        port: 4,
        index: Some(2),
        short: Some(true),
        descriptor: &descriptors::PORT4_CONFIG_3_DESCRIPTOR,
        effect: None,
    },
    // Port 4's third configuration read in full arms the final connect. The
    // notification toggle is forced to DATA0 to keep the host's interrupt
    // pipe in sync with the re-selected port.
    ConfigRule {
        port: 4,
        index: Some(2),
        short: Some(false),
        descriptor: &descriptors::PORT4_CONFIG_3_DESCRIPTOR,
        effect: Some(ScriptEffect::Connect {
            port: 5,
            settle: 20,
            force_data0: true,
        }),
    },
    ConfigRule {
        port: 5,
        index: None,
        short: None,
        descriptor: &descriptors::PORT5_CONFIG_DESCRIPTOR,
        effect: Some(ScriptEffect::BeginJig),
    },
];

pub fn device_descriptor(port: u8) -> Result<&'static [u8], DescriptorError> {
    match port {
        0 => Ok(&descriptors::HUB_DEVICE_DESCRIPTOR),
        1 => Ok(&descriptors::PORT1_DEVICE_DESCRIPTOR),
        2 => Ok(&descriptors::PORT2_DEVICE_DESCRIPTOR),
        3 => Ok(&descriptors::PORT3_DEVICE_DESCRIPTOR),
        4 => Ok(&descriptors::PORT4_DEVICE_DESCRIPTOR),
        5 => Ok(&descriptors::PORT5_DEVICE_DESCRIPTOR),
        _ => Err(DescriptorError::UnknownPort { port }),
    }
}

pub fn config_descriptor(
    port: u8,
    index: u8,
    short: bool,
) -> Result<ConfigSelection, DescriptorError> {
    CONFIG_RULES
        .iter()
        .find(|rule| {
            rule.port == port
                && rule.index.map_or(true, |i| i == index)
                && rule.short.map_or(true, |s| s == short)
        })
        .map(|rule| ConfigSelection {
            descriptor: rule.descriptor,
            effect: rule.effect,
        })
        .ok_or(DescriptorError::UnmatchedConfig { port, index, short })
}

pub fn string_descriptor(index: u8) -> Option<&'static [u8]> {
    match index {
        0 => Some(&descriptors::STRING_LANGID),
        1 => Some(&descriptors::STRING_PRODUCT),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_config_selects_the_chirp_indicator() {
        let sel = config_descriptor(0, 0, false).unwrap();
        assert_eq!(sel.descriptor, &descriptors::HUB_CONFIG_DESCRIPTOR);
        assert_eq!(sel.effect, Some(ScriptEffect::ChirpIndicator));
    }

    #[test]
    fn port1_effect_requires_the_fourth_configuration_in_full() {
        let probe = config_descriptor(1, 3, true).unwrap();
        assert_eq!(probe.effect, None);

        let other = config_descriptor(1, 0, false).unwrap();
        assert_eq!(other.effect, None);

        let full = config_descriptor(1, 3, false).unwrap();
        assert!(matches!(
            full.effect,
            Some(ScriptEffect::Connect { port: 2, .. })
        ));
    }

    #[test]
    fn port4_final_configuration_forces_data0() {
        let sel = config_descriptor(4, 2, false).unwrap();
        assert_eq!(
            sel.effect,
            Some(ScriptEffect::Connect {
                port: 5,
                settle: 20,
                force_data0: true,
            })
        );
    }

    #[test]
    fn lookups_are_referentially_stable() {
        let a = config_descriptor(2, 0, false).unwrap();
        let b = config_descriptor(2, 0, false).unwrap();
        assert!(core::ptr::eq(a.descriptor, b.descriptor));
        assert_eq!(a.descriptor.len(), b.descriptor.len());
        assert_eq!(a.effect, b.effect);
    }

    #[test]
    fn unmatched_selectors_fail_closed() {
        assert_eq!(
            config_descriptor(4, 3, false),
            Err(DescriptorError::UnmatchedConfig {
                port: 4,
                index: 3,
                short: false,
            })
        );
        assert_eq!(
            device_descriptor(6),
            Err(DescriptorError::UnknownPort { port: 6 })
        );
    }
}
