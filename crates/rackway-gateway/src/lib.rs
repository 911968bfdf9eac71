//! Orchestration engine for a fleet of warehouse transport shuttles.
//!
//! The gateway tracks device status, runs the barcode-validation round trip
//! used during putaway, and owns the command queue that assigns transport
//! commands to idle devices and polls each in-flight command to completion.
//!
//! Most callers interact with [`AutomationGateway`] and consume
//! [`GatewayEvent`]s from the paired [`GatewayEvents`] stream:
//!
//! ```no_run
//! use rackway_core::profile::LinkAddress;
//! use rackway_gateway::{AutomationGateway, GatewayEvent};
//! use rackway_link::{LinkPool, MockLink};
//!
//! # async fn example(profiles: Vec<rackway_core::DeviceProfile>) -> rackway_core::Result<()> {
//! let pool = LinkPool::new(Box::new(|addr: &LinkAddress| MockLink::new(addr).0));
//! let (gateway, mut events) = AutomationGateway::new(profiles, pool)?;
//!
//! gateway.activate_device("shuttle-1").await?;
//! gateway.send_inbound_command("T-001")?;
//!
//! while let Some(event) = events.recv().await {
//!     if let GatewayEvent::TaskSucceeded { command_id, .. } = event {
//!         println!("done: {command_id}");
//!         break;
//!     }
//! }
//!
//! gateway.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod barcode;
pub mod dispatcher;
pub mod events;
pub mod gateway;
pub mod monitor;

pub use barcode::BarcodeCoordinator;
pub use dispatcher::CommandDispatcher;
pub use events::{GatewayEvent, GatewayEvents};
pub use gateway::AutomationGateway;
pub use monitor::DeviceMonitor;

pub use rackway_core::{Error, Result};
