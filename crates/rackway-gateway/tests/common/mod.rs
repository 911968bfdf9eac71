#![allow(dead_code)]

use rackway_core::profile::{LinkAddress, SignalMap};
use rackway_core::{DeviceProfile, DeviceStatus};
use rackway_gateway::{AutomationGateway, GatewayEvent, GatewayEvents};
use rackway_link::{LinkPool, MockLink, MockLinkHandle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A gateway over mock devices, with per-device register handles.
pub struct Fleet {
    pub gateway: AutomationGateway<MockLink>,
    pub events: GatewayEvents,
    handles: Arc<Mutex<HashMap<String, MockLinkHandle>>>,
    hosts: HashMap<String, String>,
}

/// Build a gateway over mock devices. Each entry is `(device id,
/// supports_inbound)`; every device gets its own controller host and a
/// register map prefixed with its id, fully seeded.
pub fn fleet(devices: &[(&str, bool)]) -> Fleet {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let mut seeds: HashMap<String, SignalMap> = HashMap::new();
    let mut hosts: HashMap<String, String> = HashMap::new();
    let mut profiles = Vec::new();

    for (i, (id, supports_inbound)) in devices.iter().enumerate() {
        let host = format!("10.0.0.{}", i + 1);
        let signals = SignalMap::prefixed(id);
        seeds.insert(host.clone(), signals.clone());
        hosts.insert((*id).to_string(), host.clone());

        let mut profile = DeviceProfile::new(*id, LinkAddress::new(host, 0, 1), signals);
        profile.supports_inbound = *supports_inbound;
        profiles.push(profile);
    }

    let handles = Arc::new(Mutex::new(HashMap::new()));
    let sink = Arc::clone(&handles);
    let pool = LinkPool::new(Box::new(move |addr: &LinkAddress| {
        let (link, handle) = MockLink::new(addr);
        if let Some(signals) = seeds.get(&addr.host) {
            handle.seed_signals(signals);
        }
        sink.lock().unwrap().insert(addr.host.clone(), handle);
        link
    }));

    let (gateway, events) = AutomationGateway::new(profiles, pool).unwrap();
    Fleet {
        gateway,
        events,
        handles,
        hosts,
    }
}

impl Fleet {
    /// Register handle for a device. The device must have been activated
    /// (the link exists only once the pool built it).
    pub fn handle(&self, device_id: &str) -> MockLinkHandle {
        let host = self.hosts.get(device_id).expect("unknown device");
        self.handles
            .lock()
            .unwrap()
            .get(host)
            .expect("device not activated")
            .clone()
    }

    pub fn signals(&self, device_id: &str) -> SignalMap {
        SignalMap::prefixed(device_id)
    }

    /// Place a device at a rack position.
    pub fn place(&self, device_id: &str, floor: i16, rail: i16, block: i16) {
        let signals = self.signals(device_id);
        self.handle(device_id).set_location(&signals, floor, rail, block);
    }
}

/// Next event that is not a status change.
pub async fn next_task_event(events: &mut GatewayEvents) -> GatewayEvent {
    loop {
        match events.recv().await.expect("event stream closed") {
            GatewayEvent::DeviceStatusChanged(_) => continue,
            other => return other,
        }
    }
}

/// Wait until the given device reports the given status, discarding other
/// events on the way.
pub async fn wait_for_status(events: &mut GatewayEvents, device_id: &str, status: DeviceStatus) {
    loop {
        if let GatewayEvent::DeviceStatusChanged(change) =
            events.recv().await.expect("event stream closed")
        {
            if change.device_id == device_id && change.status == status {
                return;
            }
        }
    }
}
