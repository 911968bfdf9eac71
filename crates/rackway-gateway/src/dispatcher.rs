//! Command queue and dispatch.
//!
//! Commands wait in a FIFO queue until a background assignment pass hands
//! them to idle devices. Device choice balances proximity and fairness:
//! candidates are sorted by Manhattan distance to the command's reference
//! location, then picked round-robin so a well-placed shuttle cannot starve
//! the rest of the fleet. Each in-flight command gets its own polling task
//! that drives it to a terminal state; there is no retry.

use crate::barcode::BarcodeCoordinator;
use crate::events::{self, EventSender, GatewayEvent};
use crate::monitor::DeviceMonitor;
use futures::future::try_join_all;
use rackway_core::{
    CommandKind, DeviceStatus, Error, ErrorDetail, IdleDevice, Location, Result, StatusChange,
    TransportCommand, constants, profile::SignalMap,
};
use rackway_link::DeviceLink;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

struct ActiveCommand {
    device_id: String,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

enum PollEnd {
    Succeeded,
    Failed(ErrorDetail),
}

/// Owns the pending queue and every in-flight command.
pub struct CommandDispatcher<L: DeviceLink> {
    monitor: Arc<DeviceMonitor<L>>,
    coordinator: Arc<BarcodeCoordinator>,
    events: EventSender,
    queue: Mutex<VecDeque<TransportCommand>>,
    /// device id -> command id, held from assignment until the polling
    /// task's settle delay has passed.
    assigning: Mutex<HashMap<String, String>>,
    /// command id -> polling task.
    active: Mutex<HashMap<String, ActiveCommand>>,
    paused: AtomicBool,
    round_robin: AtomicUsize,
    kick: Notify,
    shutdown: CancellationToken,
}

impl<L: DeviceLink + 'static> CommandDispatcher<L> {
    pub fn new(
        monitor: Arc<DeviceMonitor<L>>,
        coordinator: Arc<BarcodeCoordinator>,
        events: EventSender,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            monitor,
            coordinator,
            events,
            queue: Mutex::new(VecDeque::new()),
            assigning: Mutex::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
            paused: AtomicBool::new(false),
            round_robin: AtomicUsize::new(0),
            kick: Notify::new(),
            shutdown,
        }
    }

    /// Append commands to the queue, all or nothing.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCommand`] if any command fails field validation;
    /// [`Error::DuplicateCommand`] listing every id that collides with the
    /// queue, an in-flight command, or another command in the batch.
    pub fn enqueue(&self, commands: Vec<TransportCommand>) -> Result<()> {
        for command in &commands {
            command.validate()?;
        }

        let mut queue = lock(&self.queue);
        let assigning = lock(&self.assigning);
        let active = lock(&self.active);

        let mut duplicates: Vec<String> = Vec::new();
        {
            let mut seen: HashSet<&str> = queue.iter().map(|c| c.id.as_str()).collect();
            seen.extend(active.keys().map(String::as_str));
            seen.extend(assigning.values().map(String::as_str));
            for command in &commands {
                if !seen.insert(command.id.as_str()) && !duplicates.contains(&command.id) {
                    duplicates.push(command.id.clone());
                }
            }
        }
        if !duplicates.is_empty() {
            return Err(Error::DuplicateCommand(duplicates.join(", ")));
        }

        for command in commands {
            info!("Command {} ({}) queued", command.id, command.kind);
            queue.push_back(command);
        }
        drop((queue, assigning, active));
        self.kick.notify_one();
        Ok(())
    }

    /// Remove queued commands by id, preserving the order of the rest.
    /// Returns whether anything was removed. In-flight commands are not
    /// touched.
    ///
    /// # Errors
    ///
    /// [`Error::QueueActive`] unless the queue is paused; removal from a
    /// live queue would race the assignment pass.
    pub fn remove_queued(&self, ids: &[String]) -> Result<bool> {
        if !self.is_paused() {
            return Err(Error::QueueActive);
        }
        let mut queue = lock(&self.queue);
        let before = queue.len();
        queue.retain(|command| !ids.contains(&command.id));
        let removed = queue.len() != before;
        if removed {
            info!("Removed {} queued command(s)", before - queue.len());
        }
        Ok(removed)
    }

    /// Stop handing out new commands. In-flight commands keep running.
    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::SeqCst) {
            info!("Command queue paused");
        }
    }

    /// Resume assignment and kick an immediate pass.
    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            info!("Command queue resumed");
        }
        self.kick.notify_one();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Snapshot of the queued (not yet assigned) commands, in order.
    pub fn pending_commands(&self) -> Vec<TransportCommand> {
        lock(&self.queue).iter().cloned().collect()
    }

    /// The command currently assigned to a device, if any.
    pub fn current_command(&self, device_id: &str) -> Option<String> {
        lock(&self.assigning).get(device_id).cloned()
    }

    /// Background assignment loop. Runs until the shutdown token fires;
    /// wakes on a fixed interval, an explicit kick (enqueue, resume,
    /// polling-task exit), or a device going Idle.
    pub async fn run(self: Arc<Self>, mut status_rx: mpsc::UnboundedReceiver<StatusChange>) {
        let mut tick = tokio::time::interval(constants::QUEUE_SCAN_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!("Dispatch loop started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tick.tick() => {}
                _ = self.kick.notified() => {}
                change = status_rx.recv() => {
                    match change {
                        Some(change) if change.status == DeviceStatus::Idle => {}
                        // Other transitions never free up a device.
                        Some(_) => continue,
                        // Monitor gone; the interval still drives passes.
                        None => continue,
                    }
                }
            }
            if self.is_paused() {
                continue;
            }
            Self::assignment_pass(&self).await;
        }
        info!("Dispatch loop stopped");
    }

    async fn assignment_pass(this: &Arc<Self>) {
        if lock(&this.queue).is_empty() {
            return;
        }

        // One fleet snapshot per pass; devices drop out as they are taken.
        let idle = this.monitor.idle_devices().await;
        let mut available: Vec<IdleDevice> = {
            let assigning = lock(&this.assigning);
            idle.into_iter()
                .filter(|d| !assigning.contains_key(&d.device_id))
                .collect()
        };

        loop {
            if this.is_paused() || available.is_empty() {
                return;
            }
            let Some(command) = lock(&this.queue).front().cloned() else {
                return;
            };

            let reference = reference_location(&command);
            let counter = this.round_robin.fetch_add(1, Ordering::SeqCst);
            let Some(chosen) = select_candidate(&available, &reference, counter) else {
                return;
            };

            {
                let mut queue = lock(&this.queue);
                let mut assigning = lock(&this.assigning);
                match queue.front() {
                    Some(head) if head.id == command.id => {
                        queue.pop_front();
                    }
                    _ => continue,
                }
                assigning.insert(chosen.device_id.clone(), command.id.clone());
            }
            available.retain(|d| d.device_id != chosen.device_id);

            match this.trigger(&chosen.device_id, &command).await {
                Ok(()) => {
                    debug!(
                        "Command {} assigned to {} at {}",
                        command.id, chosen.device_id, chosen.location
                    );
                    this.monitor.update_status(&chosen.device_id, DeviceStatus::Busy);
                    Self::spawn_polling(this, chosen.device_id.clone(), command);
                }
                Err(e) => {
                    lock(&this.assigning).remove(&chosen.device_id);
                    error!(
                        "Assignment of command {} to {} failed: {}",
                        command.id, chosen.device_id, e
                    );
                    let detail = match &e {
                        Error::DeviceNotRegistered(_) => {
                            ErrorDetail::device_not_registered(&chosen.device_id)
                        }
                        _ => ErrorDetail::assignment_failure(&chosen.device_id, &command.id, &e),
                    };
                    events::emit(
                        &this.events,
                        GatewayEvent::TaskFailed {
                            device_id: chosen.device_id.clone(),
                            command_id: command.id.clone(),
                            detail,
                        },
                    );
                    // Infrastructure fault: stop assigning until an operator
                    // resumes. The command itself is not re-queued.
                    this.pause();
                    return;
                }
            }
        }
    }

    /// Write the command registers and raise the start flag.
    async fn trigger(&self, device_id: &str, command: &TransportCommand) -> Result<()> {
        let link = self.monitor.link(device_id).await?;
        let signals = self.monitor.profile(device_id)?.signals.clone();
        debug!(
            "Triggering {} command {} on {}",
            command.kind, command.id, device_id
        );

        match command.kind {
            CommandKind::Inbound => {
                link.write_bool(&signals.inbound_command, true).await?;
            }
            CommandKind::Outbound => {
                let source = required_source(command)?;
                link.write_int(&signals.source_floor, source.floor).await?;
                link.write_int(&signals.source_rail, source.rail).await?;
                link.write_int(&signals.source_block, source.block).await?;
                link.write_int(&signals.gate_number, command.gate).await?;
                link.write_bool(&signals.out_direction, command.out_dir.as_register_flag())
                    .await?;
                link.write_bool(&signals.outbound_command, true).await?;
            }
            CommandKind::Transfer => {
                let source = required_source(command)?;
                let target = command.target.ok_or_else(|| {
                    Error::InvalidCommand(format!("command '{}' has no target location", command.id))
                })?;
                link.write_int(&signals.source_floor, source.floor).await?;
                link.write_int(&signals.source_rail, source.rail).await?;
                link.write_int(&signals.source_block, source.block).await?;
                link.write_int(&signals.target_floor, target.floor).await?;
                link.write_int(&signals.target_rail, target.rail).await?;
                link.write_int(&signals.target_block, target.block).await?;
                link.write_int(&signals.gate_number, command.gate).await?;
                link.write_bool(&signals.in_direction, command.in_dir.as_register_flag())
                    .await?;
                link.write_bool(&signals.out_direction, command.out_dir.as_register_flag())
                    .await?;
                link.write_bool(&signals.transfer_command, true).await?;
            }
        }
        link.write_bool(&signals.start_command, true).await?;
        Ok(())
    }

    fn spawn_polling(this: &Arc<Self>, device_id: String, command: TransportCommand) {
        let token = CancellationToken::new();
        let command_id = command.id.clone();
        lock(&this.active).insert(
            command_id.clone(),
            ActiveCommand {
                device_id: device_id.clone(),
                token: token.clone(),
                handle: None,
            },
        );

        let dispatcher = Arc::clone(this);
        let handle = tokio::spawn(async move {
            dispatcher.run_polling(device_id, command, token).await;
        });

        // The polling task may already have finished and removed its entry;
        // a missing entry just means there is nothing left to track.
        let mut active = lock(&this.active);
        if let Some(entry) = active.get_mut(&command_id) {
            entry.handle = Some(handle);
        }
    }

    async fn run_polling(
        self: Arc<Self>,
        device_id: String,
        command: TransportCommand,
        token: CancellationToken,
    ) {
        let command_id = command.id.clone();
        tokio::select! {
            _ = token.cancelled() => {
                debug!("Polling for command {} cancelled", command_id);
            }
            _ = self.poll_to_completion(&device_id, &command) => {}
        }

        lock(&self.assigning).remove(&device_id);
        lock(&self.active).remove(&command_id);
        self.kick.notify_one();
    }

    async fn poll_to_completion(&self, device_id: &str, command: &TransportCommand) {
        let timeout = match self.monitor.profile(device_id) {
            Ok(profile) => profile.command_timeout,
            Err(_) => {
                self.fail(
                    device_id,
                    &command.id,
                    ErrorDetail::device_not_registered(device_id),
                );
                return;
            }
        };

        match tokio::time::timeout(timeout, self.poll_loop(device_id, command)).await {
            Err(_) => {
                self.fail(
                    device_id,
                    &command.id,
                    ErrorDetail::poll_timeout(command.kind, device_id, &command.id),
                );
            }
            Ok(Ok(PollEnd::Succeeded)) => {
                info!("Command {} on {} succeeded", command.id, device_id);
                events::emit(
                    &self.events,
                    GatewayEvent::TaskSucceeded {
                        device_id: device_id.to_string(),
                        command_id: command.id.clone(),
                    },
                );
                self.monitor.update_status(device_id, DeviceStatus::Idle);
                // Hold the assignment until the device has physically
                // cleared the position.
                tokio::time::sleep(constants::SETTLE_DELAY).await;
            }
            Ok(Ok(PollEnd::Failed(detail))) => {
                self.fail(device_id, &command.id, detail);
            }
            Ok(Err(e)) => {
                self.fail(
                    device_id,
                    &command.id,
                    ErrorDetail::polling_exception(command.kind, device_id, &command.id, &e),
                );
            }
        }
    }

    fn fail(&self, device_id: &str, command_id: &str, detail: ErrorDetail) {
        warn!("Command {} on {} failed: {}", command_id, device_id, detail);
        self.monitor.update_status(device_id, DeviceStatus::Error);
        events::emit(
            &self.events,
            GatewayEvent::TaskFailed {
                device_id: device_id.to_string(),
                command_id: command_id.to_string(),
                detail,
            },
        );
    }

    async fn poll_loop(&self, device_id: &str, command: &TransportCommand) -> Result<PollEnd> {
        let (signals, interval) = {
            let profile = self.monitor.profile(device_id)?;
            (profile.signals.clone(), profile.polling_interval)
        };
        let link = self.monitor.link(device_id).await?;

        match command.kind {
            CommandKind::Inbound => {
                self.poll_inbound(link.as_ref(), &signals, interval, device_id, command)
                    .await
            }
            CommandKind::Outbound | CommandKind::Transfer => {
                poll_completion(link.as_ref(), &signals, command.kind, device_id, &command.id).await
            }
        }
    }

    /// Inbound polling: read the barcode registers every tick until a real
    /// scan is latched, run the validation round trip, then wait for
    /// completion. Ticks on the device's configured interval.
    async fn poll_inbound(
        &self,
        link: &L,
        signals: &SignalMap,
        interval: Duration,
        device_id: &str,
        command: &TransportCommand,
    ) -> Result<PollEnd> {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut barcode_processed = false;

        loop {
            tick.tick().await;

            if link.read_bool(&signals.rejected).await? {
                let code = link.read_int(&signals.error_code).await?;
                return Ok(PollEnd::Failed(ErrorDetail::command_rejected(code)));
            }

            if !barcode_processed {
                let Some(barcode) = read_barcode(link, signals).await? else {
                    continue;
                };
                let valid = self
                    .coordinator
                    .submit_scan(&self.monitor, device_id, &command.id, barcode)
                    .await?;
                barcode_processed = true;
                if !valid {
                    debug!(
                        "Barcode for command {} on {} rejected by validator",
                        command.id, device_id
                    );
                }
                continue;
            }

            if let Some(end) =
                check_completion(link, signals, &signals.inbound_complete, device_id, &command.id)
                    .await?
            {
                return Ok(end);
            }
        }
    }

    /// Cancel every polling task, wait for them, and reset dispatch state.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let entries: Vec<ActiveCommand> = {
            let mut active = lock(&self.active);
            active.drain().map(|(_, entry)| entry).collect()
        };
        for entry in &entries {
            entry.token.cancel();
        }
        for entry in entries {
            if let Some(handle) = entry.handle {
                if let Err(e) = handle.await {
                    if !e.is_cancelled() {
                        error!("Polling task for {} panicked: {}", entry.device_id, e);
                    }
                }
            }
        }

        lock(&self.assigning).clear();
        self.round_robin.store(0, Ordering::SeqCst);
        info!("Dispatcher shut down");
    }
}

/// Reference point for ranking idle devices: the gate for inbound pickups,
/// the source slot otherwise.
fn reference_location(command: &TransportCommand) -> Location {
    match command.kind {
        CommandKind::Inbound => constants::GATE_LOCATION,
        CommandKind::Outbound | CommandKind::Transfer => {
            command.source.unwrap_or(constants::GATE_LOCATION)
        }
    }
}

/// Pick a device for a command: sort by distance to the reference (ties by
/// id for determinism), then index round-robin so closer devices do not
/// starve the rest of the fleet.
fn select_candidate(
    available: &[IdleDevice],
    reference: &Location,
    counter: usize,
) -> Option<IdleDevice> {
    if available.is_empty() {
        return None;
    }
    let mut candidates: Vec<&IdleDevice> = available.iter().collect();
    candidates.sort_by(|a, b| {
        a.location
            .distance_to(reference)
            .cmp(&b.location.distance_to(reference))
            .then_with(|| a.device_id.cmp(&b.device_id))
    });
    Some(candidates[counter % candidates.len()].clone())
}

fn required_source(command: &TransportCommand) -> Result<Location> {
    command.source.ok_or_else(|| {
        Error::InvalidCommand(format!("command '{}' has no source location", command.id))
    })
}

/// Assemble the scanned barcode from the character registers, read
/// concurrently.
///
/// Returns `None` until a real scan is latched: power-on registers still
/// holding integer zero and the all-`'0'` sentinel both mean no scan yet.
async fn read_barcode<L: DeviceLink>(link: &L, signals: &SignalMap) -> Result<Option<String>> {
    let codes = try_join_all(signals.barcode_chars.iter().map(|addr| link.read_int(addr))).await?;
    if codes.iter().all(|&code| code == 0) {
        return Ok(None);
    }
    let barcode: String = codes.into_iter().map(|code| (code as u8) as char).collect();
    if barcode == constants::BARCODE_EMPTY {
        return Ok(None);
    }
    Ok(Some(barcode))
}

/// Terminal-state check shared by all command kinds. Alarm wins over
/// completion.
async fn check_completion<L: DeviceLink>(
    link: &L,
    signals: &SignalMap,
    complete_register: &str,
    device_id: &str,
    command_id: &str,
) -> Result<Option<PollEnd>> {
    if link.read_bool(&signals.alarm).await? {
        let code = link.read_int(&signals.error_code).await?;
        return Ok(Some(PollEnd::Failed(ErrorDetail::run_failure(
            device_id, command_id, code,
        ))));
    }
    if link.read_bool(complete_register).await? {
        return Ok(Some(PollEnd::Succeeded));
    }
    Ok(None)
}

/// Outbound and transfer polling: a once-per-second rejection and
/// completion check.
async fn poll_completion<L: DeviceLink>(
    link: &L,
    signals: &SignalMap,
    kind: CommandKind,
    device_id: &str,
    command_id: &str,
) -> Result<PollEnd> {
    let complete_register = match kind {
        CommandKind::Inbound => &signals.inbound_complete,
        CommandKind::Outbound => &signals.outbound_complete,
        CommandKind::Transfer => &signals.transfer_complete,
    };
    let mut tick = tokio::time::interval(constants::COMPLETION_POLL_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tick.tick().await;

        if link.read_bool(&signals.rejected).await? {
            let code = link.read_int(&signals.error_code).await?;
            return Ok(PollEnd::Failed(ErrorDetail::command_rejected(code)));
        }
        if let Some(end) =
            check_completion(link, signals, complete_register, device_id, command_id).await?
        {
            return Ok(end);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rackway_core::DeviceProfile;
    use rackway_core::profile::LinkAddress;
    use rackway_link::{LinkPool, MockLink};

    fn device(id: &str, floor: i16, rail: i16, block: i16) -> IdleDevice {
        IdleDevice {
            device_id: id.to_string(),
            location: Location::new(floor, rail, block),
        }
    }

    fn dispatcher() -> Arc<CommandDispatcher<MockLink>> {
        let pool = LinkPool::new(Box::new(|addr: &LinkAddress| MockLink::new(addr).0));
        let profile = DeviceProfile::new(
            "s1",
            LinkAddress::new("10.0.0.1", 0, 1),
            SignalMap::prefixed("s1"),
        );
        let monitor = Arc::new(DeviceMonitor::new(vec![profile], pool).unwrap());
        let (coordinator, _announce_rx) = BarcodeCoordinator::new(1);
        let (events_tx, _events_rx) = crate::events::GatewayEvents::new();
        Arc::new(CommandDispatcher::new(
            monitor,
            Arc::new(coordinator),
            events_tx,
            CancellationToken::new(),
        ))
    }

    #[test]
    fn test_select_candidate_prefers_nearest() {
        let available = vec![
            device("far", 9, 9, 9),
            device("near", 1, 14, 4),
            device("mid", 3, 14, 5),
        ];
        let chosen = select_candidate(&available, &constants::GATE_LOCATION, 0).unwrap();
        assert_eq!(chosen.device_id, "near");
    }

    #[test]
    fn test_select_candidate_round_robins_over_sorted_set() {
        let available = vec![device("b", 2, 14, 5), device("a", 1, 14, 4)];
        let first = select_candidate(&available, &constants::GATE_LOCATION, 0).unwrap();
        let second = select_candidate(&available, &constants::GATE_LOCATION, 1).unwrap();
        let third = select_candidate(&available, &constants::GATE_LOCATION, 2).unwrap();
        assert_eq!(first.device_id, "a");
        assert_eq!(second.device_id, "b");
        assert_eq!(third.device_id, "a");
    }

    #[test]
    fn test_select_candidate_breaks_distance_ties_by_id() {
        let available = vec![device("z", 1, 14, 4), device("a", 1, 14, 6)];
        let chosen = select_candidate(&available, &constants::GATE_LOCATION, 0).unwrap();
        assert_eq!(chosen.device_id, "a");
        assert!(select_candidate(&[], &constants::GATE_LOCATION, 0).is_none());
    }

    #[test]
    fn test_reference_location_per_kind() {
        assert_eq!(
            reference_location(&TransportCommand::inbound("T-1")),
            constants::GATE_LOCATION
        );
        let source = Location::new(2, 3, 4);
        assert_eq!(
            reference_location(&TransportCommand::outbound(
                "T-2",
                source,
                1,
                rackway_core::Direction::Top
            )),
            source
        );
    }

    #[test]
    fn test_enqueue_rejects_duplicates_listing_all_offenders() {
        let dispatcher = dispatcher();
        dispatcher
            .enqueue(vec![
                TransportCommand::inbound("T-1"),
                TransportCommand::inbound("T-2"),
            ])
            .unwrap();

        let result = dispatcher.enqueue(vec![
            TransportCommand::inbound("T-1"),
            TransportCommand::inbound("T-3"),
            TransportCommand::inbound("T-2"),
        ]);
        assert!(matches!(
            result,
            Err(Error::DuplicateCommand(ids)) if ids == "T-1, T-2"
        ));
        // All or nothing: T-3 was not queued.
        assert_eq!(dispatcher.pending_commands().len(), 2);
    }

    #[test]
    fn test_enqueue_rejects_duplicates_within_batch() {
        let dispatcher = dispatcher();
        let result = dispatcher.enqueue(vec![
            TransportCommand::inbound("T-1"),
            TransportCommand::inbound("T-1"),
        ]);
        assert!(matches!(result, Err(Error::DuplicateCommand(_))));
    }

    #[test]
    fn test_enqueue_validates_fields() {
        let dispatcher = dispatcher();
        let mut command = TransportCommand::outbound(
            "T-1",
            Location::new(1, 2, 3),
            1,
            rackway_core::Direction::Bottom,
        );
        command.source = None;
        assert!(matches!(
            dispatcher.enqueue(vec![command]),
            Err(Error::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_remove_queued_requires_pause() {
        let dispatcher = dispatcher();
        dispatcher
            .enqueue(vec![
                TransportCommand::inbound("T-1"),
                TransportCommand::inbound("T-2"),
                TransportCommand::inbound("T-3"),
            ])
            .unwrap();

        assert!(matches!(
            dispatcher.remove_queued(&["T-2".to_string()]),
            Err(Error::QueueActive)
        ));

        dispatcher.pause();
        assert!(dispatcher.remove_queued(&["T-2".to_string()]).unwrap());
        assert!(!dispatcher.remove_queued(&["ghost".to_string()]).unwrap());

        let remaining: Vec<String> = dispatcher
            .pending_commands()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(remaining, vec!["T-1", "T-3"]);
    }

    #[test]
    fn test_pause_resume() {
        let dispatcher = dispatcher();
        assert!(!dispatcher.is_paused());
        dispatcher.pause();
        assert!(dispatcher.is_paused());
        dispatcher.resume();
        assert!(!dispatcher.is_paused());
    }

    #[test]
    fn test_enqueue_allowed_while_paused() {
        let dispatcher = dispatcher();
        dispatcher.pause();
        dispatcher
            .enqueue(vec![TransportCommand::inbound("T-1")])
            .unwrap();
        assert_eq!(dispatcher.pending_commands().len(), 1);
    }

    #[test]
    fn test_current_command_empty_without_assignment() {
        let dispatcher = dispatcher();
        assert_eq!(dispatcher.current_command("s1"), None);
    }

    #[tokio::test]
    async fn test_read_barcode_skips_unscanned_registers() {
        let (link, handle) = MockLink::new(&LinkAddress::new("10.0.0.1", 0, 1));
        let signals = SignalMap::prefixed("s1");

        // Power-on defaults: every character register holds integer zero.
        for address in &signals.barcode_chars {
            handle.set_int(address, 0);
        }
        assert_eq!(read_barcode(&link, &signals).await.unwrap(), None);

        // Seeded sentinel: ASCII '0' in every register.
        handle.set_barcode(&signals, constants::BARCODE_EMPTY);
        assert_eq!(read_barcode(&link, &signals).await.unwrap(), None);

        handle.set_barcode(&signals, "AB12345678");
        assert_eq!(
            read_barcode(&link, &signals).await.unwrap().as_deref(),
            Some("AB12345678")
        );
    }
}
