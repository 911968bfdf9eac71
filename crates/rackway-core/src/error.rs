use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Validation errors
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Duplicate command ids: {0}")]
    DuplicateCommand(String),

    #[error("Duplicate device ids: {0}")]
    DuplicateDevice(String),

    #[error("Device not registered: {0}")]
    DeviceNotRegistered(String),

    #[error("Device {0} is busy; status reset refused")]
    DeviceBusy(String),

    #[error("Queue must be paused to remove commands")]
    QueueActive,

    // Connection errors
    #[error("Connection to {address} failed after {attempts} attempts")]
    ConnectionFailed { address: String, attempts: u32 },

    // Link runtime errors
    #[error("Read from register '{address}' failed: {message}")]
    ReadFailed { address: String, message: String },

    #[error("Write to register '{address}' failed: {message}")]
    WriteFailed { address: String, message: String },

    #[error("Register '{address}' holds {actual}, expected {expected}")]
    TypeMismatch {
        address: String,
        expected: &'static str,
        actual: &'static str,
    },

    // Barcode round trip
    #[error("Barcode validation for command '{0}' timed out")]
    ValidationTimeout(String),

    #[error("Barcode validation for command '{0}' was cancelled")]
    ValidationCancelled(String),

    #[error("Barcode announcement queue is closed")]
    AnnouncementQueueClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
