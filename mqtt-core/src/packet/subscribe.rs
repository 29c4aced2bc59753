use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    err::{DecodeError, EncodeError},
    io::{decode_utf8, encode_packet_length, encode_utf8},
    packet::{FixedHeader, PacketType},
    qos::QosLevel,
    topic::TopicName,
};

/// A single (topic, requested QoS) entry in a SUBSCRIBE payload.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Debug)]
pub struct TopicSubscription {
    topic: TopicName,
    qos: QosLevel,
}

impl TopicSubscription {
    pub fn new(topic: TopicName, qos: QosLevel) -> Self {
        return Self { topic, qos };
    }

    pub fn topic(&self) -> &TopicName {
        return &self.topic;
    }

    pub fn qos(&self) -> QosLevel {
        return self.qos;
    }
}

/// Registers the sender's interest in one or more topics. Topic filters are
/// exact-match names here; wildcard tokens are not recognized.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Debug)]
pub struct SubscribePacket {
    packet_id: u16,
    payload: Vec<TopicSubscription>,
}

impl SubscribePacket {
    pub fn new(packet_id: u16, payload: Vec<TopicSubscription>) -> Self {
        return Self { packet_id, payload };
    }

    pub fn decode(_f_header: FixedHeader, bytes: &mut Bytes) -> Result<Self, DecodeError> {
        if bytes.remaining() < 2 {
            return Err(DecodeError::new(
                crate::err::DecodeErrorKind::MalformedLength,
                String::from("SUBSCRIBE packets must contain at least a packet id."),
            ));
        }

        let packet_id = bytes.get_u16();

        let mut payload: Vec<TopicSubscription> = Vec::new();

        loop {
            let topic = TopicName::decode(bytes)?;

            if bytes.remaining() == 0 {
                return Err(DecodeError::new(
                    crate::err::DecodeErrorKind::MalformedLength,
                    String::from("SUBSCRIBE topic filter is missing its requested QoS byte."),
                ));
            }

            let qos: QosLevel = bytes.get_u8().try_into()?;
            payload.push(TopicSubscription::new(topic, qos));

            if bytes.remaining() == 0 {
                break;
            }
        }

        return Ok(Self { packet_id, payload });
    }

    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut len = 2;

        for sub in &self.payload {
            len += 2 + 1 + sub.topic.len();
        }

        let mut bytes = BytesMut::with_capacity(len + 5);

        bytes.put_u8(PacketType::SUBSCRIBE as u8 | 0x02);

        encode_packet_length(&mut bytes, len)?;

        bytes.put_u16(self.packet_id);

        for sub in &self.payload {
            encode_utf8(&mut bytes, sub.topic.as_str())?;
            bytes.put_u8(sub.qos as u8);
        }

        return Ok(bytes.into());
    }

    pub fn id(&self) -> u16 {
        return self.packet_id;
    }

    pub fn subscriptions(&self) -> &Vec<TopicSubscription> {
        return &self.payload;
    }
}

#[cfg(test)]
mod packet {
    use super::{SubscribePacket, TopicSubscription};
    use crate::packet::{FixedHeader, MqttPacket};
    use crate::qos::QosLevel;
    use crate::topic::TopicName;
    use bytes::Buf;

    #[test]
    fn serialize_deserialize() {
        let packet = SubscribePacket::new(
            1234,
            vec![TopicSubscription::new(
                TopicName::from_str("test").unwrap(),
                QosLevel::AtLeastOnce,
            )],
        );
        let mut buf = packet.encode().unwrap();

        let f_header = FixedHeader::decode(&mut buf).unwrap();
        buf.advance(f_header.header_len);
        let packet_de = MqttPacket::decode(f_header, &mut buf).expect("Could not decode packet");

        assert_eq!(packet_de, MqttPacket::Subscribe(packet));
    }

    #[test]
    fn rejects_truncated_packet_id() {
        use bytes::{BufMut, BytesMut};

        let mut buf = BytesMut::new();
        buf.put_u8(0b1000_0010); // SUBSCRIBE, reserved flag bits
        buf.put_u8(0x01);
        buf.put_u8(0x00); // only one byte of what should be a 2-byte packet id

        let mut bytes: bytes::Bytes = buf.freeze();
        let f_header = FixedHeader::decode(&mut bytes).unwrap();
        bytes.advance(f_header.header_len);

        assert!(MqttPacket::decode(f_header, &mut bytes).is_err());
    }

    #[test]
    fn decodes_multiple_filters() {
        let packet = SubscribePacket::new(
            7,
            vec![
                TopicSubscription::new(TopicName::from_str("a").unwrap(), QosLevel::AtMostOnce),
                TopicSubscription::new(TopicName::from_str("b/c").unwrap(), QosLevel::ExactlyOnce),
            ],
        );
        let mut buf = packet.encode().unwrap();

        let f_header = FixedHeader::decode(&mut buf).unwrap();
        buf.advance(f_header.header_len);
        let packet_de = MqttPacket::decode(f_header, &mut buf).expect("Could not decode packet");

        match packet_de {
            MqttPacket::Subscribe(p) => assert_eq!(p.subscriptions().len(), 2),
            _ => panic!("expected a SUBSCRIBE packet"),
        }
    }
}
