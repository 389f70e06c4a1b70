//! Data-point payload builders for the Tuya BLE lock device classes.
//!
//! These are thin helpers over the session engine: they only construct
//! [`DataPoint`] values; sending them is [`Session::send_data_point`]'s job.
//!
//! [`DataPoint`]: crate::datapoint::DataPoint
//! [`Session::send_data_point`]: crate::session::Session::send_data_point

/// Locks driven by the short-range unlock data point.
pub mod simple_lock {
    use crate::datapoint::DataPoint;

    /// [send] raw `{op, member_id}`.
    pub const DP_SHORT_RANGE_UNLOCK: u8 = 6;
    /// [receive] enum: 0 = high, 1 = medium, 2 = low, 3 = exhausted.
    pub const DP_BATTERY_LEVEL: u8 = 9;
    /// [receive] bool: true = unlocked.
    pub const DP_UNLOCK_STATUS: u8 = 47;

    pub fn unlock(member_id: u8) -> DataPoint {
        DataPoint::raw(DP_SHORT_RANGE_UNLOCK, vec![1, member_id])
    }

    pub fn lock(member_id: u8) -> DataPoint {
        DataPoint::raw(DP_SHORT_RANGE_UNLOCK, vec![0, member_id])
    }
}

/// Locks driven by the 19-byte DP 71 unlock command.
pub mod advanced_lock {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64;

    use crate::buffer::{Buffer, BufferReader};
    use crate::datapoint::DataPoint;

    /// [receive] bool: true = unlocked.
    pub const DP_UNLOCK_STATUS: u8 = 47;
    /// [send] raw 19-byte lock/unlock command.
    pub const DP_LOCK_UNLOCK: u8 = 71;

    /// Identity material for the DP 71 command, provisioned through the
    /// vendor API (DP 71 reads back as a base64 blob).
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct UnlockParameters {
        pub central_id: u16,
        pub peripheral_id: u16,
        /// 8 ASCII characters.
        pub central_random_number: String,
    }

    impl Default for UnlockParameters {
        fn default() -> Self {
            UnlockParameters {
                central_id: 0xFFFF,
                peripheral_id: 0x0001,
                central_random_number: String::new(),
            }
        }
    }

    /// Parse the vendor API's base64 DP 71 value. The blob leads with the
    /// peripheral id, then the central id, then the 8-character random.
    pub fn from_dp71_value(base64_value: &str) -> Option<UnlockParameters> {
        let data = BASE64.decode(base64_value).ok()?;
        if data.len() < 12 {
            return None;
        }

        let mut reader = BufferReader::new(&data);
        let peripheral_id = reader.read_u16_be();
        let central_id = reader.read_u16_be();
        let central_random_number =
            String::from_utf8_lossy(&reader.read_buffer(8)).into_owned();

        Some(UnlockParameters {
            central_id,
            peripheral_id,
            central_random_number,
        })
    }

    pub fn unlock(parameters: &UnlockParameters, member_id: u8) -> DataPoint {
        lock_unlock(parameters, member_id, false, unix_timestamp())
    }

    pub fn lock(parameters: &UnlockParameters, member_id: u8) -> DataPoint {
        lock_unlock(parameters, member_id, true, unix_timestamp())
    }

    /// Build the 19-byte command: central id, peripheral id, 8-char random,
    /// op (0 = lock, 1 = unlock), timestamp, phone flag, member id.
    pub fn lock_unlock(
        parameters: &UnlockParameters,
        member_id: u8,
        should_lock: bool,
        timestamp: u32,
    ) -> DataPoint {
        let mut data = Buffer::with_capacity(19);
        data.append_u16_be(parameters.central_id);
        data.append_u16_be(parameters.peripheral_id);
        data.append_str(&parameters.central_random_number);
        data.append_u8(u8::from(!should_lock));
        data.append_u32_be(timestamp);
        data.append_u8(0x00); // mobile phone
        data.append_u8(member_id);

        DataPoint::raw(DP_LOCK_UNLOCK, data.into_vec())
    }

    fn unix_timestamp() -> u32 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32
    }
}
