//! Register-level device connectivity for the rackway gateway.
//!
//! This crate defines the [`DeviceLink`] trait, the seam between the
//! dispatch engine and the physical register protocol driver, plus a
//! [`LinkPool`] that shares one connection per controller host, and a
//! [`MockLink`] for testing without hardware.

pub mod mock;
pub mod pool;
pub mod traits;

pub use mock::{MockLink, MockLinkHandle};
pub use pool::LinkPool;
pub use traits::DeviceLink;

pub use rackway_core::{Error, Result};
