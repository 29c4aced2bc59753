use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    err::{DecodeError, DecodeErrorKind},
    packet::PacketType,
    ConnectReturnCode,
};

/// Sent by the broker in response to CONNECT. The broker only ever encodes
/// this packet (decoding it would only make sense on the client side).
#[derive(PartialEq, Debug, Clone)]
pub struct ConnAckPacket {
    return_code: ConnectReturnCode,
}

impl ConnAckPacket {
    pub fn new(return_code: ConnectReturnCode) -> Self {
        return Self { return_code };
    }

    pub fn decode(bytes: &mut Bytes) -> Result<Self, DecodeError> {
        if bytes.remaining() < 2 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("CONNACK packets must contain an acknowledge flags byte and a return code."),
            ));
        }

        let session_present_byte = bytes.get_u8();

        if (session_present_byte & 0b1111_1110) != 0 {
            return Err(DecodeError::new(
                DecodeErrorKind::ProtocolError,
                String::from("A reserved bit in the CONNACK acknowledge flags byte was set."),
            ));
        }

        let return_code = bytes.get_u8().try_into()?;

        return Ok(Self { return_code });
    }

    pub fn encode(&self) -> Bytes {
        let mut bytes = BytesMut::with_capacity(4);

        bytes.put_u8(PacketType::CONNACK as u8);
        bytes.put_u8(2);
        bytes.put_u8(0); // session present is always 0; persistent sessions are not implemented.
        bytes.put_u8(self.return_code as u8);

        return bytes.into();
    }

    pub fn return_code(&self) -> ConnectReturnCode {
        return self.return_code;
    }
}

#[cfg(test)]
mod packet {
    use super::ConnAckPacket;
    use crate::packet::{FixedHeader, MqttPacket};
    use crate::ConnectReturnCode;
    use bytes::Buf;

    #[test]
    fn serialize_deserialize() {
        let packet = ConnAckPacket::new(ConnectReturnCode::Accept);
        let mut buf = packet.encode();

        let f_header = FixedHeader::decode(&mut buf).unwrap();
        buf.advance(f_header.header_len);
        let packet_de = MqttPacket::decode(f_header, &mut buf).expect("Could not decode packet");

        assert_eq!(packet_de, MqttPacket::ConnAck(packet));
    }
}
