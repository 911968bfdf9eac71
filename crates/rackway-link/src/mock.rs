//! Mock device link for testing and development.
//!
//! [`MockLink`] simulates a register-level device controller with an
//! in-memory register map. The paired [`MockLinkHandle`] drives the
//! simulation from test code: seeding registers, flipping handshake bits,
//! and injecting connection or read failures.

use crate::traits::DeviceLink;
use rackway_core::{
    Error, Result, constants,
    profile::{LinkAddress, SignalMap},
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegisterValue {
    Bool(bool),
    Int(i16),
}

#[derive(Debug, Default)]
struct MockState {
    registers: HashMap<String, RegisterValue>,
    connected: bool,
    connect_attempts: u32,
    fail_connect: bool,
    fail_reads: bool,
    fail_writes: bool,
}

/// Mock device controller link.
///
/// # Examples
///
/// ```
/// use rackway_link::{DeviceLink, MockLink};
/// use rackway_core::profile::LinkAddress;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> rackway_core::Result<()> {
/// let (link, handle) = MockLink::new(&LinkAddress::new("10.0.0.1", 0, 1));
///
/// handle.set_bool("s1.acknowledged", true);
/// assert!(link.read_bool("s1.acknowledged").await?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MockLink {
    host: String,
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    /// Create a mock link and its controlling handle.
    pub fn new(address: &LinkAddress) -> (Self, MockLinkHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let link = Self {
            host: address.host.clone(),
            state: Arc::clone(&state),
        };
        let handle = MockLinkHandle { state };
        (link, handle)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DeviceLink for MockLink {
    async fn ensure_connected(&self) -> Result<()> {
        if self.lock().connected {
            return Ok(());
        }

        for attempt in 1..=constants::MAX_CONNECT_ATTEMPTS {
            {
                let mut state = self.lock();
                state.connect_attempts += 1;
                if !state.fail_connect {
                    state.connected = true;
                    return Ok(());
                }
            }
            if attempt < constants::MAX_CONNECT_ATTEMPTS {
                tokio::time::sleep(constants::CONNECT_RETRY_DELAY).await;
            }
        }

        Err(Error::ConnectionFailed {
            address: self.host.clone(),
            attempts: constants::MAX_CONNECT_ATTEMPTS,
        })
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn read_bool(&self, address: &str) -> Result<bool> {
        let state = self.lock();
        if state.fail_reads {
            return Err(Error::ReadFailed {
                address: address.to_string(),
                message: "injected read failure".to_string(),
            });
        }
        match state.registers.get(address) {
            Some(RegisterValue::Bool(value)) => Ok(*value),
            Some(RegisterValue::Int(_)) => Err(Error::TypeMismatch {
                address: address.to_string(),
                expected: "bool",
                actual: "int",
            }),
            None => Err(Error::ReadFailed {
                address: address.to_string(),
                message: "no such register".to_string(),
            }),
        }
    }

    async fn read_int(&self, address: &str) -> Result<i16> {
        let state = self.lock();
        if state.fail_reads {
            return Err(Error::ReadFailed {
                address: address.to_string(),
                message: "injected read failure".to_string(),
            });
        }
        match state.registers.get(address) {
            Some(RegisterValue::Int(value)) => Ok(*value),
            Some(RegisterValue::Bool(_)) => Err(Error::TypeMismatch {
                address: address.to_string(),
                expected: "int",
                actual: "bool",
            }),
            None => Err(Error::ReadFailed {
                address: address.to_string(),
                message: "no such register".to_string(),
            }),
        }
    }

    async fn write_bool(&self, address: &str, value: bool) -> Result<()> {
        let mut state = self.lock();
        if state.fail_writes {
            return Err(Error::WriteFailed {
                address: address.to_string(),
                message: "injected write failure".to_string(),
            });
        }
        state
            .registers
            .insert(address.to_string(), RegisterValue::Bool(value));
        Ok(())
    }

    async fn write_int(&self, address: &str, value: i16) -> Result<()> {
        let mut state = self.lock();
        if state.fail_writes {
            return Err(Error::WriteFailed {
                address: address.to_string(),
                message: "injected write failure".to_string(),
            });
        }
        state
            .registers
            .insert(address.to_string(), RegisterValue::Int(value));
        Ok(())
    }
}

/// Handle for driving a [`MockLink`] from test code.
///
/// Clones share the same register map, so a handle kept by the test can
/// flip registers while the engine polls through the link.
#[derive(Debug, Clone)]
pub struct MockLinkHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockLinkHandle {
    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set a boolean register.
    pub fn set_bool(&self, address: &str, value: bool) {
        self.lock()
            .registers
            .insert(address.to_string(), RegisterValue::Bool(value));
    }

    /// Set an integer register.
    pub fn set_int(&self, address: &str, value: i16) {
        self.lock()
            .registers
            .insert(address.to_string(), RegisterValue::Int(value));
    }

    /// Read back a boolean register, if set as one.
    pub fn get_bool(&self, address: &str) -> Option<bool> {
        match self.lock().registers.get(address) {
            Some(RegisterValue::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    /// Read back an integer register, if set as one.
    pub fn get_int(&self, address: &str) -> Option<i16> {
        match self.lock().registers.get(address) {
            Some(RegisterValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    /// Default every register a signal map names: booleans to `false`,
    /// integers to `0`, barcode characters to `'0'`. After seeding, the
    /// barcode registers read as the unscanned sentinel.
    pub fn seed_signals(&self, signals: &SignalMap) {
        let mut state = self.lock();
        for address in signals.bool_signals() {
            state
                .registers
                .insert(address.to_string(), RegisterValue::Bool(false));
        }
        for address in signals.int_signals() {
            state
                .registers
                .insert(address.to_string(), RegisterValue::Int(0));
        }
        for address in &signals.barcode_chars {
            state
                .registers
                .insert(address.clone(), RegisterValue::Int('0' as i16));
        }
    }

    /// Latch a scanned barcode into the character registers. Shorter codes
    /// are right-padded with `'0'`.
    pub fn set_barcode(&self, signals: &SignalMap, barcode: &str) {
        let mut chars = barcode.chars();
        let mut state = self.lock();
        for address in &signals.barcode_chars {
            let ch = chars.next().unwrap_or('0');
            state
                .registers
                .insert(address.clone(), RegisterValue::Int(ch as i16));
        }
    }

    /// Set the live position registers.
    pub fn set_location(&self, signals: &SignalMap, floor: i16, rail: i16, block: i16) {
        let mut state = self.lock();
        state
            .registers
            .insert(signals.actual_floor.clone(), RegisterValue::Int(floor));
        state
            .registers
            .insert(signals.actual_rail.clone(), RegisterValue::Int(rail));
        state
            .registers
            .insert(signals.actual_block.clone(), RegisterValue::Int(block));
    }

    /// Make future connection attempts fail (or succeed again).
    pub fn fail_connections(&self, fail: bool) {
        self.lock().fail_connect = fail;
    }

    /// Make every read fail (or succeed again).
    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Make every write fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Drop the simulated connection.
    pub fn disconnect(&self) {
        self.lock().connected = false;
    }

    /// Total connection attempts made so far.
    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link() -> (MockLink, MockLinkHandle) {
        MockLink::new(&LinkAddress::new("10.0.0.1", 0, 1))
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let (link, handle) = link();
        link.ensure_connected().await.unwrap();
        link.ensure_connected().await.unwrap();
        assert!(link.is_connected());
        assert_eq!(handle.connect_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_retries_then_fails() {
        let (link, handle) = link();
        handle.fail_connections(true);

        let result = link.ensure_connected().await;
        assert!(matches!(
            result,
            Err(Error::ConnectionFailed { attempts: 3, .. })
        ));
        assert_eq!(handle.connect_attempts(), 3);
        assert!(!link.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_succeeds_after_transient_failure() {
        let (link, handle) = link();
        handle.fail_connections(true);

        let worker = tokio::spawn({
            let link = link.clone();
            async move { link.ensure_connected().await }
        });

        // Let the first attempt fail, then clear the fault.
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        handle.fail_connections(false);

        worker.await.unwrap().unwrap();
        assert!(link.is_connected());
        assert_eq!(handle.connect_attempts(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_link_usable_from_spawned_task() {
        let (link, handle) = link();
        handle.set_bool("r.flag", true);

        let link = Arc::new(link);
        let worker = tokio::spawn({
            let link = Arc::clone(&link);
            async move { link.read_bool("r.flag").await }
        });
        assert!(worker.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_read_write_round_trip() {
        let (link, handle) = link();

        link.write_bool("r.flag", true).await.unwrap();
        assert!(link.read_bool("r.flag").await.unwrap());
        assert_eq!(handle.get_bool("r.flag"), Some(true));

        link.write_int("r.count", 42).await.unwrap();
        assert_eq!(link.read_int("r.count").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_missing_register_fails() {
        let (link, _handle) = link();
        assert!(matches!(
            link.read_bool("nope").await,
            Err(Error::ReadFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_type_mismatch() {
        let (link, handle) = link();
        handle.set_int("r.count", 7);
        assert!(matches!(
            link.read_bool("r.count").await,
            Err(Error::TypeMismatch { expected: "bool", .. })
        ));
        handle.set_bool("r.flag", true);
        assert!(matches!(
            link.read_int("r.flag").await,
            Err(Error::TypeMismatch { expected: "int", .. })
        ));
    }

    #[tokio::test]
    async fn test_injected_read_failure() {
        let (link, handle) = link();
        handle.set_bool("r.flag", true);
        handle.fail_reads(true);
        assert!(link.read_bool("r.flag").await.is_err());
        handle.fail_reads(false);
        assert!(link.read_bool("r.flag").await.unwrap());
    }

    #[tokio::test]
    async fn test_seed_signals_reads_empty_barcode() {
        let (link, handle) = link();
        let signals = SignalMap::prefixed("s1");
        handle.seed_signals(&signals);

        assert!(!link.read_bool(&signals.acknowledged).await.unwrap());
        assert_eq!(link.read_int(&signals.gate_number).await.unwrap(), 0);

        let mut barcode = String::new();
        for address in &signals.barcode_chars {
            let code = link.read_int(address).await.unwrap();
            barcode.push(code as u8 as char);
        }
        assert_eq!(barcode, constants::BARCODE_EMPTY);
    }

    #[tokio::test]
    async fn test_set_barcode_pads_short_codes() {
        let (link, handle) = link();
        let signals = SignalMap::prefixed("s1");
        handle.seed_signals(&signals);
        handle.set_barcode(&signals, "AB12");

        let mut barcode = String::new();
        for address in &signals.barcode_chars {
            let code = link.read_int(address).await.unwrap();
            barcode.push(code as u8 as char);
        }
        assert_eq!(barcode, "AB12000000");
    }
}
