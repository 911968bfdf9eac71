//! Gateway facade.
//!
//! Wires the monitor, barcode coordinator and dispatcher together, spawns
//! the background tasks, and exposes the full operation surface callers
//! interact with. Everything asynchronous comes back through the
//! [`GatewayEvents`] stream handed out at construction.

use crate::barcode::BarcodeCoordinator;
use crate::dispatcher::CommandDispatcher;
use crate::events::{self, EventSender, GatewayEvent, GatewayEvents};
use crate::monitor::DeviceMonitor;
use rackway_core::{
    DeviceProfile, DeviceStatus, Direction, IdleDevice, Location, Result, TransportCommand,
};
use rackway_link::{DeviceLink, LinkPool};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Facade over the whole orchestration engine.
///
/// Construction validates the device profiles, sizes the barcode
/// announcement channel from the inbound-capable fleet, and spawns three
/// supervised background tasks: the assignment loop, the barcode
/// announcement consumer, and the status forwarder.
pub struct AutomationGateway<L: DeviceLink + 'static> {
    monitor: Arc<DeviceMonitor<L>>,
    coordinator: Arc<BarcodeCoordinator>,
    dispatcher: Arc<CommandDispatcher<L>>,
    events: EventSender,
    shutdown: CancellationToken,
    tasks: JoinSet<()>,
}

impl<L: DeviceLink + 'static> AutomationGateway<L> {
    /// Build the gateway and its event stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateDevice`](rackway_core::Error::DuplicateDevice)
    /// when profiles repeat an id.
    pub fn new(profiles: Vec<DeviceProfile>, pool: LinkPool<L>) -> Result<(Self, GatewayEvents)> {
        let (events_tx, events_rx) = GatewayEvents::new();
        let monitor = Arc::new(DeviceMonitor::new(profiles, pool)?);

        let capacity = (2 * monitor.inbound_capable_count()).max(1);
        let (coordinator, mut announce_rx) = BarcodeCoordinator::new(capacity);
        let coordinator = Arc::new(coordinator);

        let shutdown = CancellationToken::new();
        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::clone(&monitor),
            Arc::clone(&coordinator),
            events_tx.clone(),
            shutdown.clone(),
        ));

        let mut tasks = JoinSet::new();

        tasks.spawn(Arc::clone(&dispatcher).run(monitor.subscribe()));

        // Announcement consumer: drains scans in order so every
        // BarcodeReceived hits the stream before the next scan blocks.
        let announce_events = events_tx.clone();
        let announce_shutdown = shutdown.clone();
        tasks.spawn(async move {
            loop {
                tokio::select! {
                    _ = announce_shutdown.cancelled() => break,
                    request = announce_rx.recv() => {
                        let Some(request) = request else { break };
                        events::emit(&announce_events, GatewayEvent::BarcodeReceived(request));
                    }
                }
            }
        });

        let mut status_rx = monitor.subscribe();
        let status_events = events_tx.clone();
        let status_shutdown = shutdown.clone();
        tasks.spawn(async move {
            loop {
                tokio::select! {
                    _ = status_shutdown.cancelled() => break,
                    change = status_rx.recv() => {
                        let Some(change) = change else { break };
                        events::emit(&status_events, GatewayEvent::DeviceStatusChanged(change));
                    }
                }
            }
        });

        info!("Gateway started with {} device(s)", monitor.device_count());
        Ok((
            Self {
                monitor,
                coordinator,
                dispatcher,
                events: events_tx,
                shutdown,
                tasks,
            },
            events_rx,
        ))
    }

    // Device operations

    /// Connect a device's controller and start tracking it. A device that
    /// is already executing a command is left untouched.
    pub async fn activate_device(&self, device_id: &str) -> Result<()> {
        self.monitor.activate(device_id).await
    }

    /// Disconnect a device and stop tracking it; it reports Offline
    /// afterwards.
    pub fn deactivate_device(&self, device_id: &str) -> Result<()> {
        self.monitor.deactivate(device_id)
    }

    /// Whether the device is online, meaning Idle or Busy.
    pub fn is_connected(&self, device_id: &str) -> Result<bool> {
        self.monitor.is_connected(device_id)
    }

    /// Current tracked status of a device.
    pub fn device_status(&self, device_id: &str) -> DeviceStatus {
        self.monitor.status(device_id)
    }

    /// Clear a device's Error status back to Idle. Refused while Busy.
    pub fn reset_device_status(&self, device_id: &str) -> Result<()> {
        self.monitor.reset_status(device_id)
    }

    /// Every Idle device with its live position.
    pub async fn idle_devices(&self) -> Vec<IdleDevice> {
        self.monitor.idle_devices().await
    }

    /// A device's live position, when it is Idle or Busy.
    pub async fn actual_location(&self, device_id: &str) -> Result<Option<Location>> {
        self.monitor.actual_location(device_id).await
    }

    // Command operations

    /// Queue a putaway command; the destination arrives later through
    /// barcode validation.
    pub fn send_inbound_command(&self, command_id: &str) -> Result<()> {
        self.dispatcher
            .enqueue(vec![TransportCommand::inbound(command_id)])
    }

    /// Queue a retrieval command from a rack slot to a gate.
    pub fn send_outbound_command(
        &self,
        command_id: &str,
        source: Location,
        gate: i16,
        out_dir: Direction,
    ) -> Result<()> {
        self.dispatcher
            .enqueue(vec![TransportCommand::outbound(command_id, source, gate, out_dir)])
    }

    /// Queue a slot-to-slot transfer command.
    #[allow(clippy::too_many_arguments)]
    pub fn send_transfer_command(
        &self,
        command_id: &str,
        source: Location,
        target: Location,
        gate: i16,
        in_dir: Direction,
        out_dir: Direction,
    ) -> Result<()> {
        self.dispatcher.enqueue(vec![TransportCommand::transfer(
            command_id, source, target, gate, in_dir, out_dir,
        )])
    }

    /// Queue a batch of commands, all or nothing.
    pub fn send_commands(&self, commands: Vec<TransportCommand>) -> Result<()> {
        self.dispatcher.enqueue(commands)
    }

    /// Queued commands awaiting assignment, in order.
    pub fn pending_commands(&self) -> Vec<TransportCommand> {
        self.dispatcher.pending_commands()
    }

    /// Remove queued commands by id; requires a paused queue.
    pub fn remove_commands(&self, ids: &[String]) -> Result<bool> {
        self.dispatcher.remove_queued(ids)
    }

    /// The command a device is currently executing, if any.
    pub fn current_command(&self, device_id: &str) -> Option<String> {
        self.dispatcher.current_command(device_id)
    }

    /// Stop handing out new commands.
    pub fn pause_queue(&self) {
        self.dispatcher.pause();
    }

    /// Resume assignment.
    pub fn resume_queue(&self) {
        self.dispatcher.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.dispatcher.is_paused()
    }

    // Barcode operations

    /// Apply the external validator's verdict for a scanned barcode.
    ///
    /// # Errors
    ///
    /// A write-back link failure propagates so the validator can retry;
    /// unknown commands and device mismatches surface as `TaskFailed`
    /// events instead.
    #[allow(clippy::too_many_arguments)]
    pub async fn resolve_validation_result(
        &self,
        device_id: &str,
        command_id: &str,
        valid: bool,
        target: Option<Location>,
        in_dir: Direction,
        gate: i16,
    ) -> Result<()> {
        self.coordinator
            .resolve_validation(
                &self.monitor,
                &self.events,
                device_id,
                command_id,
                valid,
                target,
                in_dir,
                gate,
            )
            .await
    }

    /// Stop every background and polling task and wait for them.
    pub async fn shutdown(mut self) {
        info!("Gateway shutting down");
        self.dispatcher.shutdown().await;
        self.shutdown.cancel();
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    error!("Background task panicked: {}", e);
                }
            }
        }
        info!("Gateway stopped");
    }
}
