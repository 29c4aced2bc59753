use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    err::{DecodeError, DecodeErrorKind},
    packet::{FixedHeader, PacketType},
};

/// Acknowledges a QoS 1 PUBLISH. Completes the exchange on receipt; the
/// broker drops its in-flight record for the packet id on both send and
/// receive of this packet.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub struct PubAckPacket {
    id: u16,
}

impl PubAckPacket {
    pub fn new(id: u16) -> Self {
        return Self { id };
    }

    pub fn decode(f_header: FixedHeader, bytes: &mut Bytes) -> Result<Self, DecodeError> {
        if f_header.rest_len() != 2 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("PUBACK packets can only contain a packet id."),
            ));
        }

        let id = bytes.get_u16();
        return Ok(Self { id });
    }

    pub fn encode(&self) -> Bytes {
        let mut bytes = BytesMut::with_capacity(4);

        bytes.put_u8(PacketType::PUBACK as u8);
        bytes.put_u8(2);
        bytes.put_u16(self.id);
        return bytes.into();
    }

    pub fn id(&self) -> u16 {
        return self.id;
    }
}

#[cfg(test)]
mod packet {
    use super::PubAckPacket;
    use crate::packet::{FixedHeader, MqttPacket};
    use bytes::Buf;

    #[test]
    fn serialize_deserialize() {
        let packet = PubAckPacket::new(1234);
        let mut buf = packet.encode();

        let f_header = FixedHeader::decode(&mut buf).unwrap();
        buf.advance(f_header.header_len);
        let packet_de = MqttPacket::decode(f_header, &mut buf).expect("Could not decode packet");

        assert_eq!(packet_de, MqttPacket::PubAck(packet));
    }
}
