//! Tuning constants for the rackway dispatch engine.
//!
//! These values govern queue scanning, polling, the barcode validation round
//! trip, and connection retry behavior. They are centralized here so the
//! dispatch logic reads as policy-free as possible; changing a value changes
//! behavior fleet-wide.

use crate::types::Location;
use std::time::Duration;

/// Fixed handoff location of the in/out gate, used as the reference point
/// when ranking idle devices for an inbound command.
pub const GATE_LOCATION: Location = Location::new(1, 14, 5);

/// Interval between background assignment passes over the pending queue.
pub const QUEUE_SCAN_INTERVAL: Duration = Duration::from_millis(200);

/// Polling cadence for outbound and transfer commands.
///
/// Inbound commands poll on the device's configured interval instead,
/// because barcode scanners differ in how quickly they latch a read.
pub const COMPLETION_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Hold time after a command completes before its polling loop exits and
/// the device becomes eligible for reassignment. Prevents handing the device
/// a new command before it has physically cleared the rack position.
pub const SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Ceiling on the barcode validation round trip: a submitted scan that the
/// external validator has not resolved within this window fails with
/// [`Error::ValidationTimeout`](crate::Error::ValidationTimeout).
pub const VALIDATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Connection attempts before `ensure_connected` gives up.
pub const MAX_CONNECT_ATTEMPTS: u32 = 3;

/// Fixed backoff between connection attempts.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Number of single-character barcode registers on a device controller.
pub const BARCODE_LENGTH: usize = 10;

/// Sentinel read from the barcode registers when no pallet has been scanned.
pub const BARCODE_EMPTY: &str = "0000000000";

/// Default polling interval for a device profile.
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(1);

/// Default command timeout for a device profile.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

// Runtime error codes carried in `ErrorDetail`. Device-reported codes are
// passed through verbatim and never collide with this range in practice.

/// No pending validation correlation for the command id.
pub const CODE_VALIDATION_NOT_FOUND: i32 = 1001;

/// Validation reply named a different device than the one that scanned.
pub const CODE_MISMATCHED_DEVICE: i32 = 1002;

/// Device id unknown at runtime (profile missing).
pub const CODE_DEVICE_NOT_REGISTERED: i32 = 1003;

/// Unexpected failure inside a polling loop tick.
pub const CODE_POLLING_EXCEPTION: i32 = 1004;

/// Command could not be triggered on the chosen device.
pub const CODE_ASSIGNMENT_FAILURE: i32 = 1005;

/// Polling reached the timeout ceiling without a terminal device signal.
pub const CODE_POLL_TIMEOUT: i32 = 1006;
