//! Client-side session and framing engine for the Tuya BLE application
//! protocol.
//!
//! The engine turns writes to and notifications from a GATT characteristic
//! pair into authenticated, encrypted request/response exchanges: messages
//! are framed, CRC'd, AES-CBC encrypted and fragmented into 20-byte
//! packets; a handshake derives a session key from the device's srand
//! nonce; typed data points flow both ways once paired. The BLE stack
//! itself stays outside, behind the [`Transport`] trait.

pub mod advertisement;
pub mod buffer;
pub mod credentials;
pub mod crypto;
pub mod datapoint;
pub mod lock;
pub mod message;
pub mod packet;
pub mod session;
pub mod transport;

pub use advertisement::{AdvertisedDeviceInfo, parse_advertisement};
pub use credentials::{Credentials, CredentialsError, load_credentials};
pub use datapoint::{DataPoint, DataPointValue};
pub use message::ProtocolError;
pub use session::{Phase, Session, SessionError, SessionEvent, VersionInfo};
pub use transport::{Transport, TransportError};
