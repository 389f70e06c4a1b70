use crate::buffer::{Buffer, BufferReader};

// Wire type tags.
const TYPE_RAW: u8 = 0;
const TYPE_BOOLEAN: u8 = 1;
const TYPE_VALUE: u8 = 2;
const TYPE_STRING: u8 = 3;
const TYPE_ENUMERATION: u8 = 4;
const TYPE_BITMAP: u8 = 5;

/// The typed payload of a data point. Exactly one representation exists per
/// data point; the wire tag is derived from the variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataPointValue {
    /// Opaque bytes, variable length.
    Raw(Vec<u8>),
    /// Single byte, 0 = false, nonzero = true.
    Boolean(bool),
    /// Big-endian signed 32-bit integer.
    Value(i32),
    /// UTF-8 text, variable length.
    String(String),
    /// Big-endian unsigned 32-bit integer.
    Enumeration(u32),
    /// Opaque bytes, variable length.
    Bitmap(Vec<u8>),
}

impl DataPointValue {
    pub fn type_tag(&self) -> u8 {
        match self {
            DataPointValue::Raw(_) => TYPE_RAW,
            DataPointValue::Boolean(_) => TYPE_BOOLEAN,
            DataPointValue::Value(_) => TYPE_VALUE,
            DataPointValue::String(_) => TYPE_STRING,
            DataPointValue::Enumeration(_) => TYPE_ENUMERATION,
            DataPointValue::Bitmap(_) => TYPE_BITMAP,
        }
    }
}

/// A device data point: a 1-byte id and a typed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPoint {
    pub dp: u8,
    pub value: DataPointValue,
}

impl DataPoint {
    pub fn raw(dp: u8, data: impl Into<Vec<u8>>) -> Self {
        DataPoint {
            dp,
            value: DataPointValue::Raw(data.into()),
        }
    }

    pub fn boolean(dp: u8, value: bool) -> Self {
        DataPoint {
            dp,
            value: DataPointValue::Boolean(value),
        }
    }

    pub fn value(dp: u8, value: i32) -> Self {
        DataPoint {
            dp,
            value: DataPointValue::Value(value),
        }
    }

    pub fn string(dp: u8, value: impl Into<String>) -> Self {
        DataPoint {
            dp,
            value: DataPointValue::String(value.into()),
        }
    }

    pub fn enumeration(dp: u8, value: u32) -> Self {
        DataPoint {
            dp,
            value: DataPointValue::Enumeration(value),
        }
    }

    pub fn bitmap(dp: u8, data: impl Into<Vec<u8>>) -> Self {
        DataPoint {
            dp,
            value: DataPointValue::Bitmap(data.into()),
        }
    }

    pub fn type_tag(&self) -> u8 {
        self.value.type_tag()
    }

    pub fn as_raw(&self) -> Option<&[u8]> {
        match &self.value {
            DataPointValue::Raw(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self.value {
            DataPointValue::Boolean(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<i32> {
        match self.value {
            DataPointValue::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            DataPointValue::String(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_enumeration(&self) -> Option<u32> {
        match self.value {
            DataPointValue::Enumeration(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bitmap(&self) -> Option<&[u8]> {
        match &self.value {
            DataPointValue::Bitmap(data) => Some(data),
            _ => None,
        }
    }
}

/// Serialize a batch of data points for a `senderDps` payload.
///
/// The per-item length field is 1 byte below protocol v4 and 2 bytes
/// big-endian from v4 on.
pub fn encode_data_points(dps: &[DataPoint], protocol_version: u8) -> Vec<u8> {
    let length_bytes = if protocol_version >= 4 { 2 } else { 1 };
    let mut out = Buffer::new();

    for dp in dps {
        out.append_u8(dp.dp);
        out.append_u8(dp.type_tag());

        match &dp.value {
            DataPointValue::Raw(data) | DataPointValue::Bitmap(data) => {
                out.append_big_endian_with_number_of_bytes(data.len() as u32, length_bytes);
                out.append_slice(data);
            }
            DataPointValue::Boolean(value) => {
                out.append_big_endian_with_number_of_bytes(1, length_bytes);
                out.append_u8(u8::from(*value));
            }
            DataPointValue::Value(value) => {
                out.append_big_endian_with_number_of_bytes(4, length_bytes);
                out.append_i32_be(*value);
            }
            DataPointValue::String(text) => {
                out.append_big_endian_with_number_of_bytes(text.len() as u32, length_bytes);
                out.append_str(text);
            }
            DataPointValue::Enumeration(value) => {
                out.append_big_endian_with_number_of_bytes(4, length_bytes);
                out.append_u32_be(*value);
            }
        }
    }

    out.into_vec()
}

/// Deserialize a `receiveDp` batch. Items repeat while at least 4 bytes
/// remain. An unknown type tag skips that item; a declared length that
/// overruns the remaining bytes ends the batch.
pub fn decode_data_points(data: &[u8], protocol_version: u8) -> Vec<DataPoint> {
    let mut reader = BufferReader::new(data);
    let mut dps = Vec::new();

    while reader.remaining().len() >= 4 {
        let dp = reader.read_u8();
        let tag = reader.read_u8();
        let length = if protocol_version >= 4 {
            reader.read_u16_be() as usize
        } else {
            reader.read_u8() as usize
        };

        if reader.remaining().len() < length {
            break;
        }
        let item = reader.read_buffer(length);

        let value = match tag {
            TYPE_RAW => DataPointValue::Raw(item.into_vec()),
            TYPE_BOOLEAN => DataPointValue::Boolean(item.as_big_endian_unsigned_int() != 0),
            TYPE_VALUE => DataPointValue::Value(item.as_big_endian_signed_int()),
            TYPE_STRING => DataPointValue::String(String::from_utf8_lossy(&item).into_owned()),
            TYPE_ENUMERATION => DataPointValue::Enumeration(item.as_big_endian_unsigned_int()),
            TYPE_BITMAP => DataPointValue::Bitmap(item.into_vec()),
            other => {
                tracing::warn!(dp, tag = other, "unknown data point type, skipping");
                continue;
            }
        };

        dps.push(DataPoint { dp, value });
    }

    dps
}
