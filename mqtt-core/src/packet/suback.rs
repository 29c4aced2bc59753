use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    err::{DecodeError, DecodeErrorKind, EncodeError},
    io::encode_packet_length,
    packet::PacketType,
};

/// Confirms a SUBSCRIBE. This broker always grants QoS 0 regardless of what
/// was requested, so every entry in the returned list is a plain success
/// code (`0x00`); `0x80` (failure) is never produced.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Debug)]
pub struct SubAckPacket {
    packet_id: u16,
    granted: usize,
}

impl SubAckPacket {
    /// `granted` is the number of Topic Filters being acknowledged, taken
    /// directly from the SUBSCRIBE packet being answered.
    pub fn new(packet_id: u16, granted: usize) -> Self {
        return Self { packet_id, granted };
    }

    pub fn decode(bytes: &mut Bytes) -> Result<Self, DecodeError> {
        if bytes.remaining() < 2 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("SUBACK packets must contain at least a packet id."),
            ));
        }

        let packet_id = bytes.get_u16();
        let granted = bytes.remaining();
        bytes.advance(granted);
        return Ok(Self { packet_id, granted });
    }

    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let len = 2 + self.granted;

        let mut bytes = BytesMut::with_capacity(len + 5);

        bytes.put_u8(PacketType::SUBACK as u8);
        encode_packet_length(&mut bytes, len)?;

        bytes.put_u16(self.packet_id);

        for _ in 0..self.granted {
            bytes.put_u8(0);
        }

        return Ok(bytes.into());
    }

    pub fn id(&self) -> u16 {
        return self.packet_id;
    }
}

#[cfg(test)]
mod packet {
    use super::SubAckPacket;
    use crate::packet::{FixedHeader, MqttPacket};
    use bytes::Buf;

    #[test]
    fn serialize_deserialize() {
        let packet = SubAckPacket::new(1234, 2);
        let mut buf = packet.encode().unwrap();

        let f_header = FixedHeader::decode(&mut buf).unwrap();
        buf.advance(f_header.header_len);
        let packet_de = MqttPacket::decode(f_header, &mut buf).expect("Could not decode packet");

        assert_eq!(packet_de, MqttPacket::SubAck(packet));
    }
}
