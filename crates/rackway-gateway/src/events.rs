//! Gateway event stream.
//!
//! Everything asynchronous the engine has to say, from barcode announcements
//! to terminal command outcomes and status transitions, is delivered as a
//! [`GatewayEvent`] through a single unbounded channel. Unbounded because
//! the producers are polling loops that must never block on a slow consumer;
//! ordering within one device's lifecycle is preserved.

use rackway_core::{BarcodeRequest, ErrorDetail, StatusChange};
use tokio::sync::mpsc;

/// An asynchronous notification from the gateway.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum GatewayEvent {
    /// A pallet barcode was scanned and awaits external validation.
    BarcodeReceived(BarcodeRequest),

    /// A transport command ran to completion.
    TaskSucceeded {
        device_id: String,
        command_id: String,
    },

    /// A transport command failed; the detail carries the engine or
    /// device-reported error code.
    TaskFailed {
        device_id: String,
        command_id: String,
        detail: ErrorDetail,
    },

    /// A tracked device changed status.
    DeviceStatusChanged(StatusChange),
}

pub(crate) type EventSender = mpsc::UnboundedSender<GatewayEvent>;

/// Receiving half of the gateway event stream.
pub struct GatewayEvents {
    rx: mpsc::UnboundedReceiver<GatewayEvent>,
}

impl GatewayEvents {
    pub(crate) fn new() -> (EventSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Receive the next event. Returns `None` once the gateway has shut
    /// down and all pending events are drained.
    pub async fn recv(&mut self) -> Option<GatewayEvent> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<GatewayEvent> {
        self.rx.try_recv().ok()
    }
}

pub(crate) fn emit(events: &EventSender, event: GatewayEvent) {
    // Receiver dropped means the caller stopped listening; nothing to do.
    let _ = events.send(event);
}
