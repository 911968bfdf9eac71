//! Core value types for the dispatch engine.

use crate::{Error, Result, constants};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A position in the rack structure, identified by floor, rail and block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub floor: i16,
    pub rail: i16,
    pub block: i16,
}

impl Location {
    /// Create a new location.
    ///
    /// # Examples
    ///
    /// ```
    /// use rackway_core::Location;
    ///
    /// let slot = Location::new(2, 7, 3);
    /// assert_eq!(slot.floor, 2);
    /// ```
    #[must_use]
    pub const fn new(floor: i16, rail: i16, block: i16) -> Self {
        Self { floor, rail, block }
    }

    /// Manhattan distance to another location: the sum of absolute
    /// differences across floor, rail and block. Used to rank idle devices
    /// by proximity to a command's reference location.
    #[must_use]
    pub fn distance_to(&self, other: &Location) -> u32 {
        self.floor.abs_diff(other.floor) as u32
            + self.rail.abs_diff(other.rail) as u32
            + self.block.abs_diff(other.block) as u32
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.floor, self.rail, self.block)
    }
}

/// Tracked status of a transport device.
///
/// The monitor is the only writer; every transition is published as a
/// [`StatusChange`]. A device never activated reports `Offline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// Not activated, or deactivated.
    Offline,

    /// Connected and eligible for new command assignment.
    Idle,

    /// Executing a command.
    Busy,

    /// Last command was rejected or alarmed; requires an explicit reset.
    Error,

    /// Recharging; not eligible for assignment.
    Charging,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DeviceStatus::Offline => "Offline",
            DeviceStatus::Idle => "Idle",
            DeviceStatus::Busy => "Busy",
            DeviceStatus::Error => "Error",
            DeviceStatus::Charging => "Charging",
        };
        write!(f, "{}", label)
    }
}

/// Kind of transport command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Putaway from the gate into the rack; destination assigned externally
    /// after barcode validation.
    Inbound,

    /// Retrieval from a rack location to the gate.
    Outbound,

    /// Move between two rack locations.
    Transfer,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CommandKind::Inbound => "Inbound",
            CommandKind::Outbound => "Outbound",
            CommandKind::Transfer => "Transfer",
        };
        write!(f, "{}", label)
    }
}

/// Entry direction into a block that is reachable from both sides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Approach from below.
    #[default]
    Bottom,

    /// Approach from above.
    Top,
}

impl Direction {
    /// Register encoding: `Top` writes `true`, `Bottom` writes `false`.
    #[must_use]
    pub fn as_register_flag(&self) -> bool {
        matches!(self, Direction::Top)
    }
}

/// A transport command, queued until assigned to an idle device.
///
/// Field requirements depend on the kind: `Outbound` and `Transfer` must
/// carry a source location, `Transfer` additionally a target location. The
/// target of an `Inbound` command is decided externally after barcode
/// validation and written straight to the device, so it is never set here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportCommand {
    /// Caller-supplied identity, unique among queued and in-flight commands.
    pub id: String,

    pub kind: CommandKind,

    /// Pickup location; required for `Outbound` and `Transfer`.
    pub source: Option<Location>,

    /// Drop-off location; required for `Transfer`.
    pub target: Option<Location>,

    /// Gate number for the in/out handoff.
    pub gate: i16,

    /// Entry direction into the target block.
    pub in_dir: Direction,

    /// Exit direction out of the source block.
    pub out_dir: Direction,
}

impl TransportCommand {
    /// Create an inbound (putaway) command.
    #[must_use]
    pub fn inbound(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: CommandKind::Inbound,
            source: None,
            target: None,
            gate: 0,
            in_dir: Direction::Bottom,
            out_dir: Direction::Bottom,
        }
    }

    /// Create an outbound (retrieval) command.
    #[must_use]
    pub fn outbound(id: impl Into<String>, source: Location, gate: i16, out_dir: Direction) -> Self {
        Self {
            id: id.into(),
            kind: CommandKind::Outbound,
            source: Some(source),
            target: None,
            gate,
            in_dir: Direction::Bottom,
            out_dir,
        }
    }

    /// Create a transfer command between two rack locations.
    #[must_use]
    pub fn transfer(
        id: impl Into<String>,
        source: Location,
        target: Location,
        gate: i16,
        in_dir: Direction,
        out_dir: Direction,
    ) -> Self {
        Self {
            id: id.into(),
            kind: CommandKind::Transfer,
            source: Some(source),
            target: Some(target),
            gate,
            in_dir,
            out_dir,
        }
    }

    /// Validate field requirements for this command's kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCommand`] if the id is empty, if an
    /// `Outbound`/`Transfer` command has no source location, or if a
    /// `Transfer` command has no target location.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidCommand("command id must not be empty".into()));
        }

        match self.kind {
            CommandKind::Inbound => {}
            CommandKind::Outbound => {
                if self.source.is_none() {
                    return Err(Error::InvalidCommand(format!(
                        "outbound command '{}' requires a source location",
                        self.id
                    )));
                }
            }
            CommandKind::Transfer => {
                if self.source.is_none() {
                    return Err(Error::InvalidCommand(format!(
                        "transfer command '{}' requires a source location",
                        self.id
                    )));
                }
                if self.target.is_none() {
                    return Err(Error::InvalidCommand(format!(
                        "transfer command '{}' requires a target location",
                        self.id
                    )));
                }
            }
        }

        Ok(())
    }
}

/// A barcode scan announced to the external validator.
#[derive(Debug, Clone)]
pub struct BarcodeRequest {
    pub device_id: String,
    pub command_id: String,
    pub barcode: String,

    /// Device position at scan time, if it could be read.
    pub actual_location: Option<Location>,

    pub scanned_at: DateTime<Utc>,
}

/// An idle device together with its live position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleDevice {
    pub device_id: String,
    pub location: Location,
}

/// A published device status transition.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub device_id: String,
    pub status: DeviceStatus,
    pub changed_at: DateTime<Utc>,
}

/// Numeric code plus human-readable message, carried in `TaskFailed` events.
///
/// Codes 1001-1006 form the closed engine taxonomy (see
/// [`constants`](crate::constants)); device-reported codes are passed
/// through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: i32,
    pub message: String,
}

impl ErrorDetail {
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// No pending validation correlation for this command.
    #[must_use]
    pub fn validation_not_found(device_id: &str, command_id: &str) -> Self {
        Self::new(
            constants::CODE_VALIDATION_NOT_FOUND,
            format!(
                "No pending validation found for command {command_id} on device {device_id}"
            ),
        )
    }

    /// Validation reply named a different device than the scanning one.
    #[must_use]
    pub fn mismatched_device(command_id: &str, expected: &str, provided: &str) -> Self {
        Self::new(
            constants::CODE_MISMATCHED_DEVICE,
            format!(
                "Mismatched device for command {command_id}: expected {expected}, provided {provided}"
            ),
        )
    }

    /// Device id unknown at runtime.
    #[must_use]
    pub fn device_not_registered(device_id: &str) -> Self {
        Self::new(
            constants::CODE_DEVICE_NOT_REGISTERED,
            format!("Device {device_id} is not registered"),
        )
    }

    /// Unexpected failure inside a polling loop tick.
    #[must_use]
    pub fn polling_exception(kind: CommandKind, device_id: &str, command_id: &str, cause: &Error) -> Self {
        Self::new(
            constants::CODE_POLLING_EXCEPTION,
            format!(
                "{kind} polling failed for command {command_id} on device {device_id}: {cause}"
            ),
        )
    }

    /// Command could not be triggered on the chosen device.
    #[must_use]
    pub fn assignment_failure(device_id: &str, command_id: &str, cause: &Error) -> Self {
        Self::new(
            constants::CODE_ASSIGNMENT_FAILURE,
            format!(
                "Assignment of command {command_id} to device {device_id} failed: {cause}"
            ),
        )
    }

    /// Polling reached the timeout ceiling without a terminal signal.
    #[must_use]
    pub fn poll_timeout(kind: CommandKind, device_id: &str, command_id: &str) -> Self {
        Self::new(
            constants::CODE_POLL_TIMEOUT,
            format!(
                "{kind} polling for command {command_id} on device {device_id} timed out without completion"
            ),
        )
    }

    /// Device rejected the command; code is device-reported.
    #[must_use]
    pub fn command_rejected(code: i16) -> Self {
        Self::new(code as i32, format!("Command rejected with error code {code}"))
    }

    /// Device alarmed during execution; code is device-reported.
    #[must_use]
    pub fn run_failure(device_id: &str, command_id: &str, code: i16) -> Self {
        Self::new(
            code as i32,
            format!("Command {command_id} on device {device_id} failed with error code {code}"),
        )
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_distance() {
        let a = Location::new(1, 14, 5);
        let b = Location::new(2, 10, 7);
        assert_eq!(a.distance_to(&b), 1 + 4 + 2);
        assert_eq!(b.distance_to(&a), a.distance_to(&b));
        assert_eq!(a.distance_to(&a), 0);
    }

    #[test]
    fn test_location_distance_negative_coordinates() {
        let a = Location::new(-1, 0, 0);
        let b = Location::new(1, 0, 0);
        assert_eq!(a.distance_to(&b), 2);
    }

    #[test]
    fn test_device_status_display() {
        assert_eq!(DeviceStatus::Offline.to_string(), "Offline");
        assert_eq!(DeviceStatus::Charging.to_string(), "Charging");
    }

    #[test]
    fn test_direction_register_flag() {
        assert!(Direction::Top.as_register_flag());
        assert!(!Direction::Bottom.as_register_flag());
        assert_eq!(Direction::default(), Direction::Bottom);
    }

    #[test]
    fn test_inbound_command_valid_without_locations() {
        let command = TransportCommand::inbound("T-001");
        assert!(command.validate().is_ok());
        assert_eq!(command.kind, CommandKind::Inbound);
        assert!(command.source.is_none());
    }

    #[test]
    fn test_empty_id_rejected() {
        let command = TransportCommand::inbound("  ");
        assert!(matches!(command.validate(), Err(Error::InvalidCommand(_))));
    }

    #[test]
    fn test_outbound_requires_source() {
        let mut command = TransportCommand::outbound(
            "T-002",
            Location::new(1, 2, 3),
            4,
            Direction::Top,
        );
        assert!(command.validate().is_ok());

        command.source = None;
        assert!(matches!(command.validate(), Err(Error::InvalidCommand(_))));
    }

    #[test]
    fn test_transfer_requires_source_and_target() {
        let mut command = TransportCommand::transfer(
            "T-003",
            Location::new(1, 2, 3),
            Location::new(2, 3, 4),
            1,
            Direction::Bottom,
            Direction::Top,
        );
        assert!(command.validate().is_ok());

        command.target = None;
        assert!(matches!(command.validate(), Err(Error::InvalidCommand(_))));

        command.target = Some(Location::new(2, 3, 4));
        command.source = None;
        assert!(matches!(command.validate(), Err(Error::InvalidCommand(_))));
    }

    #[test]
    fn test_error_detail_codes() {
        assert_eq!(ErrorDetail::validation_not_found("S1", "T1").code, 1001);
        assert_eq!(ErrorDetail::mismatched_device("T1", "S1", "S2").code, 1002);
        assert_eq!(ErrorDetail::device_not_registered("S1").code, 1003);
        assert_eq!(
            ErrorDetail::poll_timeout(CommandKind::Outbound, "S1", "T1").code,
            1006
        );
        // Device-reported codes pass through verbatim.
        assert_eq!(ErrorDetail::command_rejected(42).code, 42);
        assert_eq!(ErrorDetail::run_failure("S1", "T1", 7).code, 7);
    }

    #[test]
    fn test_error_detail_display() {
        let detail = ErrorDetail::command_rejected(42);
        assert_eq!(
            detail.to_string(),
            "[42] Command rejected with error code 42"
        );
    }

    #[test]
    fn test_command_serde_round_trip() {
        let command = TransportCommand::transfer(
            "T-010",
            Location::new(1, 2, 3),
            Location::new(3, 2, 1),
            2,
            Direction::Top,
            Direction::Bottom,
        );
        let json = serde_json::to_string(&command).unwrap();
        let back: TransportCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, command);
    }
}
