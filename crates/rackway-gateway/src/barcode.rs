//! Barcode validation round trip.
//!
//! During putaway a shuttle scans the pallet barcode and holds position
//! until an external validator decides whether the pallet is accepted and
//! where it goes. The coordinator carries that round trip: it announces the
//! scan, parks the polling loop on a oneshot reply, and on resolution writes
//! the verdict (and destination) back to the device before waking the loop.

use crate::events::{self, EventSender, GatewayEvent};
use crate::monitor::DeviceMonitor;
use chrono::Utc;
use rackway_core::{
    BarcodeRequest, Direction, Error, ErrorDetail, Location, Result, constants,
};
use rackway_link::DeviceLink;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

struct PendingValidation {
    device_id: String,
    reply: oneshot::Sender<bool>,
}

/// Correlates scanned barcodes with validation verdicts.
pub struct BarcodeCoordinator {
    pending: Mutex<HashMap<String, PendingValidation>>,
    announce_tx: mpsc::Sender<BarcodeRequest>,
}

impl BarcodeCoordinator {
    /// Create the coordinator and the announcement stream it feeds.
    ///
    /// `capacity` bounds how many unconsumed announcements may pile up
    /// before scanning loops block; the facade sizes it from the number of
    /// inbound-capable devices.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<BarcodeRequest>) {
        let (announce_tx, announce_rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                pending: Mutex::new(HashMap::new()),
                announce_tx,
            },
            announce_rx,
        )
    }

    /// Announce a scanned barcode and wait for the validator's verdict.
    ///
    /// Blocks the calling polling loop until the verdict arrives, the
    /// 2-minute ceiling passes, or the correlation is cancelled.
    ///
    /// # Errors
    ///
    /// [`Error::ValidationTimeout`] once the ceiling passes (the
    /// correlation is discarded), [`Error::ValidationCancelled`] when the
    /// correlation is dropped without a verdict, and
    /// [`Error::AnnouncementQueueClosed`] if the announcement consumer is
    /// gone.
    pub async fn submit_scan<L: DeviceLink>(
        &self,
        monitor: &DeviceMonitor<L>,
        device_id: &str,
        command_id: &str,
        barcode: String,
    ) -> Result<bool> {
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.insert(
                command_id.to_string(),
                PendingValidation {
                    device_id: device_id.to_string(),
                    reply: reply_tx,
                },
            );
        }

        let actual_location = monitor.actual_location(device_id).await.unwrap_or(None);
        let request = BarcodeRequest {
            device_id: device_id.to_string(),
            command_id: command_id.to_string(),
            barcode,
            actual_location,
            scanned_at: Utc::now(),
        };

        info!(
            "Barcode {} scanned by {} for command {}",
            request.barcode, device_id, command_id
        );
        if self.announce_tx.send(request).await.is_err() {
            self.discard(command_id);
            return Err(Error::AnnouncementQueueClosed);
        }

        match tokio::time::timeout(constants::VALIDATION_TIMEOUT, reply_rx).await {
            Ok(Ok(valid)) => Ok(valid),
            Ok(Err(_)) => Err(Error::ValidationCancelled(command_id.to_string())),
            Err(_) => {
                self.discard(command_id);
                warn!("Barcode validation for command {} timed out", command_id);
                Err(Error::ValidationTimeout(command_id.to_string()))
            }
        }
    }

    /// Apply the external validator's verdict.
    ///
    /// Unknown command ids and device mismatches surface as `TaskFailed`
    /// events (codes 1001 and 1002) rather than errors: the validator
    /// cannot fix them by retrying. A mismatch also cancels the waiting
    /// scan. Otherwise the verdict is written to the device registers
    /// (accept: valid flag, destination triple, entry direction and gate;
    /// reject: invalid flag) and the parked polling loop is woken.
    ///
    /// # Errors
    ///
    /// A write-back link failure re-parks the correlation and propagates,
    /// so the validator may retry until the scan times out.
    pub async fn resolve_validation<L: DeviceLink>(
        &self,
        monitor: &DeviceMonitor<L>,
        events: &EventSender,
        device_id: &str,
        command_id: &str,
        valid: bool,
        target: Option<Location>,
        in_dir: Direction,
        gate: i16,
    ) -> Result<()> {
        let entry = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.remove(command_id)
        };

        let Some(entry) = entry else {
            warn!("No pending validation for command {}", command_id);
            events::emit(
                events,
                GatewayEvent::TaskFailed {
                    device_id: device_id.to_string(),
                    command_id: command_id.to_string(),
                    detail: ErrorDetail::validation_not_found(device_id, command_id),
                },
            );
            return Ok(());
        };

        if entry.device_id != device_id {
            warn!(
                "Validation for command {} names {}, but {} scanned it",
                command_id, device_id, entry.device_id
            );
            events::emit(
                events,
                GatewayEvent::TaskFailed {
                    device_id: device_id.to_string(),
                    command_id: command_id.to_string(),
                    detail: ErrorDetail::mismatched_device(command_id, &entry.device_id, device_id),
                },
            );
            // Dropping the reply sender cancels the waiting scan.
            return Ok(());
        }

        let link = match monitor.link(device_id).await {
            Ok(link) => link,
            Err(e @ Error::DeviceNotRegistered(_)) => {
                warn!("Validation write-back failed: {}", e);
                events::emit(
                    events,
                    GatewayEvent::TaskFailed {
                        device_id: device_id.to_string(),
                        command_id: command_id.to_string(),
                        detail: ErrorDetail::device_not_registered(device_id),
                    },
                );
                return Ok(());
            }
            Err(e) => {
                self.park(command_id, entry);
                return Err(e);
            }
        };
        // Registration was just checked; a later failure re-parks the entry.
        let signals = match monitor.profile(device_id) {
            Ok(profile) => profile.signals.clone(),
            Err(e) => {
                self.park(command_id, entry);
                return Err(e);
            }
        };

        let write = async {
            if valid {
                link.write_bool(&signals.barcode_valid, true).await?;
                link.write_bool(&signals.barcode_invalid, false).await?;
                if let Some(target) = target {
                    link.write_int(&signals.target_floor, target.floor).await?;
                    link.write_int(&signals.target_rail, target.rail).await?;
                    link.write_int(&signals.target_block, target.block).await?;
                }
                link.write_bool(&signals.in_direction, in_dir.as_register_flag())
                    .await?;
                link.write_int(&signals.gate_number, gate).await?;
            } else {
                link.write_bool(&signals.barcode_valid, false).await?;
                link.write_bool(&signals.barcode_invalid, true).await?;
            }
            Ok(())
        };

        if let Err(e) = write.await {
            self.park(command_id, entry);
            return Err(e);
        }

        info!(
            "Barcode for command {} on {} resolved as {}",
            command_id,
            device_id,
            if valid { "valid" } else { "invalid" }
        );
        // Waiter may have timed out in the meantime; nothing left to wake.
        let _ = entry.reply.send(valid);
        Ok(())
    }

    /// Number of scans currently awaiting a verdict.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn discard(&self, command_id: &str) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.remove(command_id);
    }

    fn park(&self, command_id: &str, entry: PendingValidation) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.insert(command_id.to_string(), entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rackway_core::DeviceProfile;
    use rackway_core::profile::{LinkAddress, SignalMap};
    use rackway_link::{LinkPool, MockLink, MockLinkHandle};
    use std::sync::Arc;
    use tokio::task::JoinHandle;

    struct Fixture {
        monitor: Arc<DeviceMonitor<MockLink>>,
        coordinator: Arc<BarcodeCoordinator>,
        announce_rx: mpsc::Receiver<BarcodeRequest>,
        events_tx: EventSender,
        events_rx: crate::events::GatewayEvents,
        handles: Arc<Mutex<Vec<MockLinkHandle>>>,
    }

    async fn fixture() -> Fixture {
        let handles = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&handles);
        let pool = LinkPool::new(Box::new(move |addr: &LinkAddress| {
            let (link, handle) = MockLink::new(addr);
            handle.seed_signals(&SignalMap::prefixed("s1"));
            sink.lock().unwrap().push(handle);
            link
        }));
        let profile = DeviceProfile::new(
            "s1",
            LinkAddress::new("10.0.0.1", 0, 1),
            SignalMap::prefixed("s1"),
        )
        .with_inbound();
        let monitor = Arc::new(DeviceMonitor::new(vec![profile], pool).unwrap());
        monitor.activate("s1").await.unwrap();
        let (coordinator, announce_rx) = BarcodeCoordinator::new(2);
        let (events_tx, events_rx) = crate::events::GatewayEvents::new();
        Fixture {
            monitor,
            coordinator: Arc::new(coordinator),
            announce_rx,
            events_tx,
            events_rx,
            handles,
        }
    }

    fn spawn_scan(fx: &Fixture, command_id: &str, barcode: &str) -> JoinHandle<Result<bool>> {
        let monitor = Arc::clone(&fx.monitor);
        let coordinator = Arc::clone(&fx.coordinator);
        let command_id = command_id.to_string();
        let barcode = barcode.to_string();
        tokio::spawn(async move {
            coordinator
                .submit_scan(&monitor, "s1", &command_id, barcode)
                .await
        })
    }

    #[tokio::test]
    async fn test_valid_verdict_writes_destination_and_wakes_scan() {
        let mut fx = fixture().await;
        let scan = spawn_scan(&fx, "T-1", "AB12345678");

        let request = fx.announce_rx.recv().await.unwrap();
        assert_eq!(request.command_id, "T-1");
        assert_eq!(request.barcode, "AB12345678");
        assert_eq!(fx.coordinator.pending_count(), 1);

        fx.coordinator
            .resolve_validation(
                &fx.monitor,
                &fx.events_tx,
                "s1",
                "T-1",
                true,
                Some(Location::new(3, 8, 2)),
                Direction::Top,
                4,
            )
            .await
            .unwrap();

        assert_eq!(scan.await.unwrap().unwrap(), true);
        assert_eq!(fx.coordinator.pending_count(), 0);

        let signals = SignalMap::prefixed("s1");
        let handle = fx.handles.lock().unwrap()[0].clone();
        assert_eq!(handle.get_bool(&signals.barcode_valid), Some(true));
        assert_eq!(handle.get_bool(&signals.barcode_invalid), Some(false));
        assert_eq!(handle.get_int(&signals.target_floor), Some(3));
        assert_eq!(handle.get_int(&signals.target_rail), Some(8));
        assert_eq!(handle.get_int(&signals.target_block), Some(2));
        assert_eq!(handle.get_bool(&signals.in_direction), Some(true));
        assert_eq!(handle.get_int(&signals.gate_number), Some(4));
    }

    #[tokio::test]
    async fn test_invalid_verdict_sets_invalid_flag_only() {
        let mut fx = fixture().await;
        let scan = spawn_scan(&fx, "T-2", "XX00000001");
        fx.announce_rx.recv().await.unwrap();

        fx.coordinator
            .resolve_validation(
                &fx.monitor,
                &fx.events_tx,
                "s1",
                "T-2",
                false,
                None,
                Direction::Bottom,
                0,
            )
            .await
            .unwrap();

        assert_eq!(scan.await.unwrap().unwrap(), false);

        let signals = SignalMap::prefixed("s1");
        let handle = fx.handles.lock().unwrap()[0].clone();
        assert_eq!(handle.get_bool(&signals.barcode_valid), Some(false));
        assert_eq!(handle.get_bool(&signals.barcode_invalid), Some(true));
        // Destination untouched on rejection.
        assert_eq!(handle.get_int(&signals.target_floor), Some(0));
    }

    #[tokio::test]
    async fn test_unknown_command_emits_not_found() {
        let mut fx = fixture().await;

        fx.coordinator
            .resolve_validation(
                &fx.monitor,
                &fx.events_tx,
                "s1",
                "ghost",
                true,
                None,
                Direction::Bottom,
                0,
            )
            .await
            .unwrap();

        match fx.events_rx.try_recv() {
            Some(GatewayEvent::TaskFailed { detail, .. }) => assert_eq!(detail.code, 1001),
            other => panic!("expected TaskFailed, got {:?}", other.is_some()),
        }
    }

    #[tokio::test]
    async fn test_mismatched_device_cancels_scan() {
        let mut fx = fixture().await;
        let scan = spawn_scan(&fx, "T-3", "AB12345678");
        fx.announce_rx.recv().await.unwrap();

        fx.coordinator
            .resolve_validation(
                &fx.monitor,
                &fx.events_tx,
                "other-device",
                "T-3",
                true,
                None,
                Direction::Bottom,
                0,
            )
            .await
            .unwrap();

        match fx.events_rx.try_recv() {
            Some(GatewayEvent::TaskFailed { detail, .. }) => assert_eq!(detail.code, 1002),
            other => panic!("expected TaskFailed, got {:?}", other.is_some()),
        }
        assert!(matches!(
            scan.await.unwrap(),
            Err(Error::ValidationCancelled(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_times_out_and_discards_correlation() {
        let mut fx = fixture().await;
        let scan = spawn_scan(&fx, "T-4", "AB12345678");
        fx.announce_rx.recv().await.unwrap();

        tokio::time::sleep(constants::VALIDATION_TIMEOUT + std::time::Duration::from_secs(1)).await;

        assert!(matches!(
            scan.await.unwrap(),
            Err(Error::ValidationTimeout(_))
        ));
        assert_eq!(fx.coordinator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_write_back_failure_reparks_correlation() {
        let mut fx = fixture().await;
        let scan = spawn_scan(&fx, "T-5", "AB12345678");
        fx.announce_rx.recv().await.unwrap();

        fx.handles.lock().unwrap()[0].fail_writes(true);
        let result = fx
            .coordinator
            .resolve_validation(
                &fx.monitor,
                &fx.events_tx,
                "s1",
                "T-5",
                true,
                Some(Location::new(1, 1, 1)),
                Direction::Bottom,
                1,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(fx.coordinator.pending_count(), 1);

        // Validator retries after the fault clears.
        fx.handles.lock().unwrap()[0].fail_writes(false);
        fx.coordinator
            .resolve_validation(
                &fx.monitor,
                &fx.events_tx,
                "s1",
                "T-5",
                true,
                Some(Location::new(1, 1, 1)),
                Direction::Bottom,
                1,
            )
            .await
            .unwrap();
        assert_eq!(scan.await.unwrap().unwrap(), true);
    }
}
