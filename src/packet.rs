use crate::buffer::{Buffer, BufferReader};

/// Largest fragment a GATT write-without-response carries.
pub const MAX_PACKET_SIZE: usize = 20;

/// Split an encrypted message into numbered GATT fragments.
///
/// Fragment layout: `varint(packetNumber)`, then (on fragment 0 only)
/// `varint(totalLength)` and one byte `protocolVersion << 4`, then as much
/// message data as fits under [`MAX_PACKET_SIZE`].
pub fn split_into_packets(message: &[u8], protocol_version: u8) -> Vec<Vec<u8>> {
    let mut packets = Vec::new();
    let mut position = 0;
    let mut packet_number: u32 = 0;

    while position < message.len() {
        let mut packet = Buffer::with_capacity(MAX_PACKET_SIZE);
        packet.append_packed_int(packet_number);
        if packet_number == 0 {
            packet.append_packed_int(message.len() as u32);
            packet.append_u8(protocol_version << 4);
        }

        let chunk = (MAX_PACKET_SIZE - packet.len()).min(message.len() - position);
        packet.append_slice(&message[position..position + chunk]);
        packets.push(packet.into_vec());

        packet_number += 1;
        position += chunk;
    }

    packets
}

/// Reassembles inbound fragments into complete messages.
///
/// Fragments with an unexpected packet number are dropped; the request
/// layer above recovers by timing out. More bytes than the declared length
/// reset the assembler entirely.
#[derive(Debug, Default)]
pub struct PacketAssembler {
    expected_packet_number: u32,
    expected_message_length: usize,
    received: Buffer,
}

impl PacketAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Feed one notification's bytes. Returns the reassembled message once
    /// the declared length is reached exactly.
    pub fn feed(&mut self, fragment: &[u8]) -> Option<Vec<u8>> {
        if fragment.is_empty() {
            return None;
        }

        let mut reader = BufferReader::new(fragment);
        let packet_number = reader.read_packed_int();
        if packet_number != self.expected_packet_number {
            tracing::debug!(
                got = packet_number,
                expected = self.expected_packet_number,
                "unexpected packet number, fragment dropped"
            );
            return None;
        }

        if packet_number == 0 {
            self.expected_message_length = reader.read_packed_int() as usize;
            let _protocol_version = reader.read_u8() >> 4;
            self.received = Buffer::new();
        }

        self.received.append_slice(reader.remaining());

        if self.received.len() < self.expected_message_length {
            self.expected_packet_number += 1;
            None
        } else if self.received.len() == self.expected_message_length {
            let message = std::mem::take(&mut self.received).into_vec();
            self.reset();
            Some(message)
        } else {
            tracing::debug!(
                received = self.received.len(),
                expected = self.expected_message_length,
                "reassembled more than declared, resetting"
            );
            self.reset();
            None
        }
    }
}
