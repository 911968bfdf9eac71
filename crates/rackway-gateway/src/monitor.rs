//! Device registry and status tracking.
//!
//! The monitor is the single writer of device status. Every transition is
//! published, in order and without coalescing, to each subscriber; readers
//! everywhere else only observe.

use chrono::Utc;
use rackway_core::{
    DeviceProfile, DeviceStatus, Error, IdleDevice, Location, Result, StatusChange,
    profile::SignalMap,
};
use rackway_link::{DeviceLink, LinkPool};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Tracks reachability and status for a fixed set of devices.
///
/// Owns the [`LinkPool`]; components that need a device's connection go
/// through [`DeviceMonitor::link`] so connect-with-retry happens in one
/// place.
pub struct DeviceMonitor<L: DeviceLink> {
    profiles: HashMap<String, DeviceProfile>,
    pool: LinkPool<L>,
    statuses: RwLock<HashMap<String, DeviceStatus>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<StatusChange>>>,
}

impl<L: DeviceLink> DeviceMonitor<L> {
    /// Build a monitor over the given device profiles.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateDevice`] listing every repeated id.
    pub fn new(profiles: Vec<DeviceProfile>, pool: LinkPool<L>) -> Result<Self> {
        let mut map = HashMap::with_capacity(profiles.len());
        let mut duplicates = Vec::new();
        for profile in profiles {
            if map.contains_key(&profile.id) && !duplicates.contains(&profile.id) {
                duplicates.push(profile.id.clone());
            }
            map.insert(profile.id.clone(), profile);
        }
        if !duplicates.is_empty() {
            return Err(Error::DuplicateDevice(duplicates.join(", ")));
        }

        Ok(Self {
            profiles: map,
            pool,
            statuses: RwLock::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    /// Look up a device profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotRegistered`] for an unknown id.
    pub fn profile(&self, device_id: &str) -> Result<&DeviceProfile> {
        self.profiles
            .get(device_id)
            .ok_or_else(|| Error::DeviceNotRegistered(device_id.to_string()))
    }

    /// Number of registered devices.
    pub fn device_count(&self) -> usize {
        self.profiles.len()
    }

    /// Number of registered devices that can serve inbound commands.
    pub fn inbound_capable_count(&self) -> usize {
        self.profiles.values().filter(|p| p.supports_inbound).count()
    }

    /// Resolve the pooled, connected link for a device.
    pub async fn link(&self, device_id: &str) -> Result<Arc<L>> {
        let profile = self.profile(device_id)?;
        self.pool.acquire(&profile.address).await
    }

    /// Connect to a device's controller and start tracking its status.
    ///
    /// A device already executing a command is left untouched. Otherwise the
    /// live acknowledgment signal decides the initial status: a controller
    /// that is mid-handshake comes up Busy, anything else Idle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotRegistered`] for an unknown id,
    /// [`Error::ConnectionFailed`] when the link cannot be established, and
    /// a read error when the acknowledgment register is unreachable; status
    /// stays untouched on failure.
    pub async fn activate(&self, device_id: &str) -> Result<()> {
        let profile = self.profile(device_id)?;
        if self.status(device_id) == DeviceStatus::Busy {
            debug!("Device {} is executing; activation left it alone", device_id);
            return Ok(());
        }
        let link = self.pool.acquire(&profile.address).await?;
        let executing = link.read_bool(&profile.signals.acknowledged).await?;
        info!("Device {} activated", device_id);
        self.update_status(
            device_id,
            if executing {
                DeviceStatus::Busy
            } else {
                DeviceStatus::Idle
            },
        );
        Ok(())
    }

    /// Drop the device's pooled connection and stop tracking it. The device
    /// reports Offline afterwards; no status transition is published.
    pub fn deactivate(&self, device_id: &str) -> Result<()> {
        let profile = self.profile(device_id)?;
        self.pool.release(&profile.address.host);
        self.statuses
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(device_id);
        info!("Device {} deactivated", device_id);
        Ok(())
    }

    /// Whether the device is online, meaning its tracked status is Idle or
    /// Busy. A device in Error or Charging answers false even while its
    /// controller link is up.
    pub fn is_connected(&self, device_id: &str) -> Result<bool> {
        self.profile(device_id)?;
        Ok(matches!(
            self.status(device_id),
            DeviceStatus::Idle | DeviceStatus::Busy
        ))
    }

    /// Current tracked status. A device never activated reports Offline.
    pub fn status(&self, device_id: &str) -> DeviceStatus {
        self.statuses
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(device_id)
            .copied()
            .unwrap_or(DeviceStatus::Offline)
    }

    /// Record a status transition and publish it to every subscriber.
    /// Idempotent: setting the current status publishes nothing.
    pub fn update_status(&self, device_id: &str, status: DeviceStatus) {
        {
            let mut statuses = self.statuses.write().unwrap_or_else(|e| e.into_inner());
            let previous = statuses.insert(device_id.to_string(), status);
            if previous == Some(status) {
                return;
            }
        }

        debug!("Device {} status -> {}", device_id, status);
        let change = StatusChange {
            device_id: device_id.to_string(),
            status,
            changed_at: Utc::now(),
        };
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }

    /// Clear an Error status back to Idle.
    ///
    /// # Errors
    ///
    /// Refused with [`Error::DeviceBusy`] while the device is executing a
    /// command.
    pub fn reset_status(&self, device_id: &str) -> Result<()> {
        self.profile(device_id)?;
        if self.status(device_id) == DeviceStatus::Busy {
            return Err(Error::DeviceBusy(device_id.to_string()));
        }
        self.update_status(device_id, DeviceStatus::Idle);
        Ok(())
    }

    /// Subscribe to status transitions. Each subscriber sees every
    /// transition, in order.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StatusChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    /// Every Idle device with its live position.
    ///
    /// A failed position read means the fleet view is stale, so the whole
    /// result is empty rather than partial; the caller's next pass retries.
    pub async fn idle_devices(&self) -> Vec<IdleDevice> {
        let idle_ids: Vec<String> = {
            let statuses = self.statuses.read().unwrap_or_else(|e| e.into_inner());
            statuses
                .iter()
                .filter(|(_, status)| **status == DeviceStatus::Idle)
                .map(|(id, _)| id.clone())
                .collect()
        };

        let mut devices = Vec::with_capacity(idle_ids.len());
        for device_id in idle_ids {
            match self.read_location(&device_id).await {
                Ok(location) => devices.push(IdleDevice {
                    device_id,
                    location,
                }),
                Err(e) => {
                    warn!("Position read for idle device {} failed: {}", device_id, e);
                    return Vec::new();
                }
            }
        }
        devices
    }

    /// The device's live position, or `None` when it is neither Idle nor
    /// Busy or the position cannot be read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotRegistered`] for an unknown id.
    pub async fn actual_location(&self, device_id: &str) -> Result<Option<Location>> {
        self.profile(device_id)?;
        match self.status(device_id) {
            DeviceStatus::Idle | DeviceStatus::Busy => {}
            _ => return Ok(None),
        }
        Ok(self.read_location(device_id).await.ok())
    }

    async fn read_location(&self, device_id: &str) -> Result<Location> {
        let profile = self.profile(device_id)?;
        let link = self.pool.acquire(&profile.address).await?;
        read_location(link.as_ref(), &profile.signals).await
    }
}

/// Read the live position triple through a link.
pub(crate) async fn read_location<L: DeviceLink>(link: &L, signals: &SignalMap) -> Result<Location> {
    let (floor, rail, block) = tokio::try_join!(
        link.read_int(&signals.actual_floor),
        link.read_int(&signals.actual_rail),
        link.read_int(&signals.actual_block),
    )?;
    Ok(Location::new(floor, rail, block))
}
