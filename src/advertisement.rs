use crate::crypto;

/// Company identifier in the manufacturer data, little-endian on the wire.
pub const COMPANY_ID: u16 = 0x07D0;

/// Service-data UUID whose payload keys the UUID decryption.
pub const SERVICE_DATA_UUID: u16 = 0xA201;

const MANUFACTURER_DATA_MIN_LEN: usize = 24;

/// Device identity recovered from an active-scan advertisement.
///
/// Derived, not authoritative: once paired, the UUID in the credentials is
/// the one that counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisedDeviceInfo {
    pub address: String,
    pub is_bound: bool,
    pub protocol_version: u8,
    pub encryption_method: u8,
    pub communication_capacity: u16,
    pub uuid: String,
}

/// Parse a Tuya BLE advertisement from its manufacturer data and the
/// service data advertised under [`SERVICE_DATA_UUID`].
///
/// Returns `None` when the advertisement is not a Tuya device. Manufacturer
/// data is only present in active scan results.
pub fn parse_advertisement(
    address: &str,
    manufacturer_data: &[u8],
    service_data: &[u8],
) -> Option<AdvertisedDeviceInfo> {
    if manufacturer_data.len() < MANUFACTURER_DATA_MIN_LEN {
        return None;
    }
    if manufacturer_data[0] != 0xD0 || manufacturer_data[1] != 0x07 {
        return None;
    }

    let is_bound = manufacturer_data[2] & 0x80 != 0;
    let protocol_version = manufacturer_data[3];
    let encryption_method = manufacturer_data[4];
    let communication_capacity = u16::from_be_bytes([manufacturer_data[5], manufacturer_data[6]]);
    // manufacturer_data[7] is reserved
    let encrypted_uuid = &manufacturer_data[8..24];

    if service_data.is_empty() {
        return None;
    }

    // The UUID is encrypted with key and IV both set to the MD5 of the
    // service data minus its first byte.
    let digest = crypto::md5(&service_data[1..]);
    let uuid = crypto::aes_cbc128_decrypt(&digest, &digest, encrypted_uuid).ok()?;

    Some(AdvertisedDeviceInfo {
        address: address.to_owned(),
        is_bound,
        protocol_version,
        encryption_method,
        communication_capacity,
        uuid: String::from_utf8_lossy(&uuid).into_owned(),
    })
}
