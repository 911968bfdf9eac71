//! Device link trait definition.
//!
//! [`DeviceLink`] is the contract between the dispatch engine and whatever
//! drives the register protocol on the wire. The engine only ever reads and
//! writes named registers; everything protocol-specific lives behind this
//! trait.
//!
//! Methods return `impl Future + Send` (Rust 1.90 + Edition 2024 RPITIT), so
//! the trait is not object-safe and the engine's polling tasks, which are
//! spawned generic over `L: DeviceLink`, stay spawnable. Implementations can
//! still use plain `async fn`.

use rackway_core::Result;
use std::future::Future;

/// A connection to one device controller.
///
/// Implementations are shared behind `Arc` by the [`LinkPool`](crate::pool::LinkPool),
/// so all methods take `&self` and interior state must be synchronized.
///
/// # Examples
///
/// ```no_run
/// use rackway_link::DeviceLink;
/// use rackway_core::Result;
///
/// async fn handshake<L: DeviceLink>(link: &L, ack: &str, start: &str) -> Result<bool> {
///     link.ensure_connected().await?;
///     link.write_bool(start, true).await?;
///     link.read_bool(ack).await
/// }
/// ```
pub trait DeviceLink: Send + Sync {
    /// Establish the connection if it is not already up.
    ///
    /// Idempotent: calling on a live connection is a no-op. On a dead
    /// connection the implementation retries a bounded number of times with
    /// a fixed backoff before giving up.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionFailed`](rackway_core::Error::ConnectionFailed)
    /// once the retry budget is exhausted.
    fn ensure_connected(&self) -> impl Future<Output = Result<()>> + Send;

    /// Whether the connection is currently up. Does not touch the wire.
    fn is_connected(&self) -> bool;

    /// Read a boolean register.
    ///
    /// # Errors
    ///
    /// Fails if the register is missing, holds a non-boolean value, or the
    /// read itself fails.
    fn read_bool(&self, address: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Read a 16-bit integer register.
    ///
    /// # Errors
    ///
    /// Fails if the register is missing, holds a non-integer value, or the
    /// read itself fails.
    fn read_int(&self, address: &str) -> impl Future<Output = Result<i16>> + Send;

    /// Write a boolean register.
    ///
    /// # Errors
    ///
    /// Fails if the write cannot be delivered.
    fn write_bool(&self, address: &str, value: bool) -> impl Future<Output = Result<()>> + Send;

    /// Write a 16-bit integer register.
    ///
    /// # Errors
    ///
    /// Fails if the write cannot be delivered.
    fn write_int(&self, address: &str, value: i16) -> impl Future<Output = Result<()>> + Send;
}
