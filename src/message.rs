use std::fmt;

use crate::buffer::{Buffer, BufferReader};
use crate::crypto;

// -- Function codes --

/// Requests device info and the srand nonce for the session key.
pub const FC_DEVICE_INFO: u16 = 0x0000;
/// Pairs by sending uuid, local-key prefix and device id.
pub const FC_PAIR: u16 = 0x0001;
/// Submits data points (protocol v3).
pub const FC_SEND_DPS: u16 = 0x0002;
/// Asks the device to re-emit its data points via `FC_RECEIVE_DP`.
pub const FC_DEVICE_STATUS: u16 = 0x0003;
/// Removes this device from the account.
pub const FC_UNBIND: u16 = 0x0005;
/// Factory-resets the device.
pub const FC_DEVICE_RESET: u16 = 0x0006;

// Over-the-air update flow.
pub const FC_OTA_START: u16 = 0x000C;
pub const FC_OTA_FILE: u16 = 0x000D;
pub const FC_OTA_OFFSET: u16 = 0x000E;
pub const FC_OTA_UPGRADE: u16 = 0x000F;
pub const FC_OTA_OVER: u16 = 0x0010;

/// Submits data points (protocol v4).
pub const FC_SEND_DPS_V4: u16 = 0x0027;

/// Device reports data points, on change or after `FC_DEVICE_STATUS`.
pub const FC_RECEIVE_DP: u16 = 0x8001;
pub const FC_RECEIVE_TIME_DP: u16 = 0x8003;
pub const FC_RECEIVE_SIGN_DP: u16 = 0x8004;
pub const FC_RECEIVE_SIGN_TIME_DP: u16 = 0x8005;
/// Device reports data points (protocol v4).
pub const FC_RECEIVE_DP_V4: u16 = 0x8006;
pub const FC_RECEIVE_TIME_DP_V4: u16 = 0x8007;

// Device asks for the current time. Ignored: our clock is not authoritative.
pub const FC_TIME1_REQUEST: u16 = 0x8011;
pub const FC_TIME2_REQUEST: u16 = 0x8012;

// -- Security flags --

/// Bootstrap key: md5 of the first six local-key bytes.
pub const SECURITY_FLAG_LOCAL_KEY: u8 = 0x04;
/// Session key: md5 of the local-key prefix and the device srand.
pub const SECURITY_FLAG_SESSION_KEY: u8 = 0x05;

// Sizes
pub const MESSAGE_HEADER_SIZE: usize = 12; // seq(4) + rseq(4) + code(2) + len(2)
pub const CRC_SIZE: usize = 2;
pub const ENVELOPE_OVERHEAD: usize = 17; // flag(1) + iv(16)

// -- Data types --

/// A decrypted, CRC-verified message received from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub sequence_number: u32,
    pub response_to_sequence_number: u32,
    pub function_code: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ProtocolError {
    MessageTooShort,
    UnknownSecurityFlag(u8),
    MissingSessionKey,
    DecryptionFailed,
    InvalidDataLength { declared: usize, available: usize },
    CrcMismatch { expected: u16, actual: u16 },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::MessageTooShort => write!(f, "Message too short for an envelope"),
            ProtocolError::UnknownSecurityFlag(flag) => {
                write!(f, "Unknown security flag: {flag:#04x}")
            }
            ProtocolError::MissingSessionKey => {
                write!(f, "Session-key message before key exchange")
            }
            ProtocolError::DecryptionFailed => write!(f, "AES decryption failed"),
            ProtocolError::InvalidDataLength {
                declared,
                available,
            } => write!(
                f,
                "Declared data length {declared} exceeds the {available} available bytes"
            ),
            ProtocolError::CrcMismatch { expected, actual } => {
                write!(f, "CRC mismatch: expected {expected:#06x}, got {actual:#06x}")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

// -- Pure functions --

/// Which security flag protects a message with this function code.
/// Only the key-exchange request itself can use the bootstrap key.
pub fn security_flag_for(code: u16) -> u8 {
    if code == FC_DEVICE_INFO {
        SECURITY_FLAG_LOCAL_KEY
    } else {
        SECURITY_FLAG_SESSION_KEY
    }
}

/// Build a complete encrypted message envelope with a fresh random IV.
pub fn build_message(
    sequence_number: u32,
    response_to: u32,
    code: u16,
    data: &[u8],
    security_flag: u8,
    key: &[u8; 16],
) -> Vec<u8> {
    build_message_with_iv(
        sequence_number,
        response_to,
        code,
        data,
        security_flag,
        key,
        crypto::random_iv(),
    )
}

/// Deterministic-IV form of [`build_message`].
///
/// Layout of the plaintext (all big-endian): seq(4), responseTo(4),
/// code(2), dataLen(2), data, crc16 over everything so far, then zero
/// padding to a 16-byte boundary. On the wire: flag(1), iv(16), ciphertext.
pub fn build_message_with_iv(
    sequence_number: u32,
    response_to: u32,
    code: u16,
    data: &[u8],
    security_flag: u8,
    key: &[u8; 16],
    iv: [u8; 16],
) -> Vec<u8> {
    let mut plaintext = Buffer::with_capacity(MESSAGE_HEADER_SIZE + data.len() + CRC_SIZE);
    plaintext.append_u32_be(sequence_number);
    plaintext.append_u32_be(response_to);
    plaintext.append_u16_be(code);
    plaintext.append_u16_be(data.len() as u16);
    plaintext.append_slice(data);
    plaintext.append_u16_be(crypto::crc16(&plaintext));
    plaintext.pad_to_multiple_of(crypto::AES_BLOCK_SIZE);

    let ciphertext = crypto::aes_cbc128_encrypt(key, &iv, &plaintext)
        .expect("plaintext was padded to the block size");

    let mut envelope = Buffer::with_capacity(ENVELOPE_OVERHEAD + ciphertext.len());
    envelope.append_u8(security_flag);
    envelope.append_slice(&iv);
    envelope.append_slice(&ciphertext);
    envelope.into_vec()
}

/// Parse and verify a reassembled message envelope.
///
/// The key is selected by the leading security flag; `session_key` may be
/// absent before the key exchange completes.
pub fn parse_message(
    data: &[u8],
    local_key_md5: &[u8; 16],
    session_key: Option<&[u8; 16]>,
) -> Result<ReceivedMessage, ProtocolError> {
    if data.len() < ENVELOPE_OVERHEAD + crypto::AES_BLOCK_SIZE {
        return Err(ProtocolError::MessageTooShort);
    }

    let security_flag = data[0];
    let iv = &data[1..17];
    let key = match security_flag {
        SECURITY_FLAG_LOCAL_KEY => local_key_md5,
        SECURITY_FLAG_SESSION_KEY => session_key.ok_or(ProtocolError::MissingSessionKey)?,
        other => return Err(ProtocolError::UnknownSecurityFlag(other)),
    };

    let plaintext = crypto::aes_cbc128_decrypt(key, iv, &data[ENVELOPE_OVERHEAD..])
        .map_err(|_| ProtocolError::DecryptionFailed)?;

    let mut reader = BufferReader::new(&plaintext);
    let sequence_number = reader.read_u32_be();
    let response_to_sequence_number = reader.read_u32_be();
    let function_code = reader.read_u16_be();
    let data_length = reader.read_u16_be() as usize;

    let crc_end = MESSAGE_HEADER_SIZE + data_length;
    if crc_end + CRC_SIZE > plaintext.len() {
        return Err(ProtocolError::InvalidDataLength {
            declared: data_length,
            available: plaintext.len().saturating_sub(MESSAGE_HEADER_SIZE + CRC_SIZE),
        });
    }

    let message_data = reader.read_buffer(data_length);
    let expected = reader.read_u16_be();
    let actual = crypto::crc16(&plaintext[..crc_end]);
    if expected != actual {
        return Err(ProtocolError::CrcMismatch { expected, actual });
    }

    Ok(ReceivedMessage {
        sequence_number,
        response_to_sequence_number,
        function_code,
        data: message_data.into_vec(),
    })
}
