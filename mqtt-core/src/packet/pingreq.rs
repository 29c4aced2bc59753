use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    err::{DecodeError, DecodeErrorKind},
    packet::{FixedHeader, PacketType},
};

/// Keep-alive heartbeat from the client. Keep-alive is parsed from CONNECT
/// but not enforced: PINGREQ is answered unconditionally with PINGRESP and
/// no connection is ever dropped for going quiet.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub struct PingReqPacket;

impl PingReqPacket {
    pub fn new() -> Self {
        return Self;
    }

    pub fn decode(f_header: FixedHeader) -> Result<Self, DecodeError> {
        if f_header.rest_len() != 0 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("PINGREQ packets can only contain a fixed header."),
            ));
        }

        return Ok(Self);
    }

    pub fn encode(&self) -> Bytes {
        let mut bytes = BytesMut::with_capacity(2);

        bytes.put_u8(PacketType::PINGREQ as u8);
        bytes.put_u8(0);

        return bytes.into();
    }
}

#[cfg(test)]
mod packet {
    use super::PingReqPacket;
    use crate::packet::{FixedHeader, MqttPacket};
    use bytes::Buf;

    #[test]
    fn serialize_deserialize() {
        let packet = PingReqPacket::new();
        let mut buf = packet.encode();

        let f_header = FixedHeader::decode(&mut buf).unwrap();
        buf.advance(f_header.header_len);
        let packet_de = MqttPacket::decode(f_header, &mut buf).expect("Could not decode packet");

        assert_eq!(packet_de, MqttPacket::PingReq(packet));
    }
}
