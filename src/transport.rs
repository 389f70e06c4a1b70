use std::fmt;

/// Primary GATT service of a Tuya BLE peripheral.
pub const SERVICE_UUID: u16 = 0x1910;
/// Inbound characteristic; the device notifies packet fragments here.
pub const NOTIFY_CHARACTERISTIC_UUID: u16 = 0x2B10;
/// Outbound characteristic; fragments are written without response.
pub const WRITE_CHARACTERISTIC_UUID: u16 = 0x2B11;

/// The narrow surface the session engine needs from a BLE stack.
///
/// Implementations connect to the peer, resolve [`SERVICE_UUID`] with its
/// two characteristics, subscribe to notifications, and deliver each
/// notification's bytes to [`Session::handle_notification`]. The engine
/// never holds a callback into the transport.
///
/// [`Session::handle_notification`]: crate::session::Session::handle_notification
pub trait Transport {
    /// Open the connection and resolve service and characteristics.
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Write one fragment (at most 20 bytes) without response.
    fn write_packet(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    fn disconnect(&mut self);
}

#[derive(Debug)]
pub enum TransportError {
    ConnectFailed(String),
    /// Service 0x1910 or one of its characteristics is missing.
    ServiceUnavailable,
    WriteFailed(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::ConnectFailed(reason) => write!(f, "Connect failed: {reason}"),
            TransportError::ServiceUnavailable => {
                write!(f, "Service {SERVICE_UUID:#06x} or its characteristics not found")
            }
            TransportError::WriteFailed(reason) => write!(f, "Write failed: {reason}"),
        }
    }
}

impl std::error::Error for TransportError {}
