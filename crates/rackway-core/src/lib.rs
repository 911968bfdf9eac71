//! Shared vocabulary for the rackway warehouse automation gateway.
//!
//! This crate defines the data model used across the workspace: storage
//! locations, device status, transport commands, barcode round-trip payloads,
//! the device configuration surface (`DeviceProfile` / `SignalMap`), the
//! workspace error type, and the tuning constants that govern dispatch
//! behavior.

pub mod constants;
pub mod error;
pub mod profile;
pub mod types;

pub use error::{Error, Result};
pub use profile::{DeviceProfile, LinkAddress, SignalMap};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
