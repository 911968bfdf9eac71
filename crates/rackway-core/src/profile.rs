//! Device configuration surface.
//!
//! Profiles are externally supplied data: they name a device, point at its
//! controller, and map every register the engine touches. The engine never
//! hardcodes a register address.

use crate::constants;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Network address of a device controller. The link pool keys connections
/// by `host`, so devices sharing a controller share one connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkAddress {
    pub host: String,
    pub rack: u16,
    pub slot: u16,
}

impl LinkAddress {
    #[must_use]
    pub fn new(host: impl Into<String>, rack: u16, slot: u16) -> Self {
        Self {
            host: host.into(),
            rack,
            slot,
        }
    }
}

/// Register address map for one device.
///
/// Command and handshake registers are booleans; location, gate and error
/// registers are 16-bit integers. The ten `barcode_chars` registers each
/// hold one character code of the scanned barcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMap {
    // Command triggers
    pub inbound_command: String,
    pub outbound_command: String,
    pub transfer_command: String,
    pub start_command: String,

    // Handshake
    pub acknowledged: String,
    pub rejected: String,

    // Completion and fault
    pub inbound_complete: String,
    pub outbound_complete: String,
    pub transfer_complete: String,
    pub alarm: String,
    pub error_code: String,

    // Command parameters
    pub in_direction: String,
    pub out_direction: String,
    pub gate_number: String,
    pub source_floor: String,
    pub source_rail: String,
    pub source_block: String,
    pub target_floor: String,
    pub target_rail: String,
    pub target_block: String,

    // Barcode round trip
    pub barcode_valid: String,
    pub barcode_invalid: String,
    pub barcode_chars: [String; constants::BARCODE_LENGTH],

    // Live position
    pub actual_floor: String,
    pub actual_rail: String,
    pub actual_block: String,
}

impl SignalMap {
    /// Build a map where every register address is `<prefix>.<name>`.
    /// Convenient for mocks and fixtures; production maps come from
    /// configuration.
    #[must_use]
    pub fn prefixed(prefix: &str) -> Self {
        let addr = |name: &str| format!("{prefix}.{name}");
        Self {
            inbound_command: addr("inbound_command"),
            outbound_command: addr("outbound_command"),
            transfer_command: addr("transfer_command"),
            start_command: addr("start_command"),
            acknowledged: addr("acknowledged"),
            rejected: addr("rejected"),
            inbound_complete: addr("inbound_complete"),
            outbound_complete: addr("outbound_complete"),
            transfer_complete: addr("transfer_complete"),
            alarm: addr("alarm"),
            error_code: addr("error_code"),
            in_direction: addr("in_direction"),
            out_direction: addr("out_direction"),
            gate_number: addr("gate_number"),
            source_floor: addr("source_floor"),
            source_rail: addr("source_rail"),
            source_block: addr("source_block"),
            target_floor: addr("target_floor"),
            target_rail: addr("target_rail"),
            target_block: addr("target_block"),
            barcode_valid: addr("barcode_valid"),
            barcode_invalid: addr("barcode_invalid"),
            barcode_chars: std::array::from_fn(|i| addr(&format!("barcode_char_{i}"))),
            actual_floor: addr("actual_floor"),
            actual_rail: addr("actual_rail"),
            actual_block: addr("actual_block"),
        }
    }

    /// All boolean register addresses in this map.
    pub fn bool_signals(&self) -> impl Iterator<Item = &str> {
        [
            &self.inbound_command,
            &self.outbound_command,
            &self.transfer_command,
            &self.start_command,
            &self.acknowledged,
            &self.rejected,
            &self.inbound_complete,
            &self.outbound_complete,
            &self.transfer_complete,
            &self.alarm,
            &self.in_direction,
            &self.out_direction,
            &self.barcode_valid,
            &self.barcode_invalid,
        ]
        .into_iter()
        .map(String::as_str)
    }

    /// All integer register addresses in this map, barcode characters
    /// included.
    pub fn int_signals(&self) -> impl Iterator<Item = &str> {
        [
            &self.error_code,
            &self.gate_number,
            &self.source_floor,
            &self.source_rail,
            &self.source_block,
            &self.target_floor,
            &self.target_rail,
            &self.target_block,
            &self.actual_floor,
            &self.actual_rail,
            &self.actual_block,
        ]
        .into_iter()
        .map(String::as_str)
        .chain(self.barcode_chars.iter().map(String::as_str))
    }
}

/// Static configuration for one transport device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub id: String,
    pub address: LinkAddress,
    pub signals: SignalMap,

    /// Whether the device can serve inbound (putaway) commands. Sizes the
    /// barcode announcement channel.
    #[serde(default)]
    pub supports_inbound: bool,

    /// Cadence of the inbound polling loop for this device.
    #[serde(default = "default_polling_interval")]
    pub polling_interval: Duration,

    /// Ceiling on how long a command may poll before it is failed.
    #[serde(default = "default_command_timeout")]
    pub command_timeout: Duration,
}

impl DeviceProfile {
    #[must_use]
    pub fn new(id: impl Into<String>, address: LinkAddress, signals: SignalMap) -> Self {
        Self {
            id: id.into(),
            address,
            signals,
            supports_inbound: false,
            polling_interval: default_polling_interval(),
            command_timeout: default_command_timeout(),
        }
    }

    #[must_use]
    pub fn with_inbound(mut self) -> Self {
        self.supports_inbound = true;
        self
    }
}

fn default_polling_interval() -> Duration {
    constants::DEFAULT_POLLING_INTERVAL
}

fn default_command_timeout() -> Duration {
    constants::DEFAULT_COMMAND_TIMEOUT
}
