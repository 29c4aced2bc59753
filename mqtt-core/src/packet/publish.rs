use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    err::{DecodeError, EncodeError},
    io::{decode_utf8, encode_packet_length, encode_utf8},
    packet::{FixedHeader, PacketType},
    qos::QosLevel,
    topic::TopicName,
};

const RETAIN: u8 = 0b0000_0001;
const QOS_1: u8 = 0b0000_0010;
const QOS_2: u8 = 0b0000_0100;
const QOS_BITS: u8 = 0b0000_0110;
const DUP: u8 = 0b0000_1000;

/// Carries an application message from a publisher to the broker, or from
/// the broker to a subscriber. Retained messages and topic wildcards are not
/// implemented, so `retain` is accepted on the wire but never acted on.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Debug)]
pub struct PublishPacket {
    flags: PublishFixedHeaderFlags,
    topic_name: TopicName,
    packet_id: Option<u16>,
    payload: Bytes,
}

impl PublishPacket {
    pub fn new(topic_name: &TopicName, payload: Bytes) -> Self {
        return Self {
            packet_id: None,
            topic_name: topic_name.clone(),
            flags: PublishFixedHeaderFlags::zero(),
            payload,
        };
    }

    pub fn decode(f_header: FixedHeader, bytes: &mut Bytes) -> Result<Self, DecodeError> {
        let topic_name_in = decode_utf8(bytes)?;
        let topic_name = TopicName::from_str(topic_name_in.as_str())?;

        let flags = PublishFixedHeaderFlags::from_byte(f_header.flags.as_byte())?;

        let packet_id = if flags.qos() != QosLevel::AtMostOnce {
            if bytes.remaining() < 2 {
                return Err(DecodeError::new(
                    crate::err::DecodeErrorKind::MalformedLength,
                    String::from("PUBLISH packet declared QoS 1 or 2 but has no room for a packet id."),
                ));
            }
            Some(bytes.get_u16())
        } else {
            None
        };

        return Ok(Self {
            packet_id,
            flags,
            topic_name,
            payload: bytes.clone(),
        });
    }

    pub fn set_qos_atmostonce(&mut self) {
        self.flags.set_qos(QosLevel::AtMostOnce);
        self.packet_id = None;
    }

    pub fn set_qos_atleastonce(&mut self, packet_id: u16) {
        self.flags.set_qos(QosLevel::AtLeastOnce);
        self.packet_id = Some(packet_id);
    }

    pub fn set_qos_exactlyonce(&mut self, packet_id: u16) {
        self.flags.set_qos(QosLevel::ExactlyOnce);
        self.packet_id = Some(packet_id);
    }

    pub fn topic(&self) -> &TopicName {
        return &self.topic_name;
    }

    pub fn qos(&self) -> QosLevel {
        return self.flags.qos();
    }

    pub fn retain(&self) -> bool {
        return self.flags.retain();
    }

    pub fn set_retain(&mut self, val: bool) {
        self.flags.set_retain(val);
    }

    pub fn dup(&self) -> bool {
        return self.flags.dup();
    }

    pub fn set_dup(&mut self, val: bool) {
        self.flags.set_dup(val);
    }

    pub fn id(&self) -> Option<u16> {
        return self.packet_id;
    }

    pub fn payload(&self) -> &Bytes {
        return &self.payload;
    }
}

impl crate::packet::Encode for PublishPacket {
    fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut len = 2 + self.topic_name.len();

        if self.packet_id.is_some() {
            len += 2;
        }

        len += self.payload.len();

        let mut bytes = BytesMut::with_capacity(len + 5);

        bytes.put_u8(PacketType::PUBLISH as u8 | self.flags.byte);

        encode_packet_length(&mut bytes, len)?;

        encode_utf8(&mut bytes, self.topic_name.as_str())?;

        if let Some(packet_id) = self.packet_id {
            bytes.put_u16(packet_id);
        }

        bytes.put_slice(&self.payload);

        return Ok(bytes.into());
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub struct PublishFixedHeaderFlags {
    byte: u8,
}

impl PublishFixedHeaderFlags {
    /// The wire value `0b11` for the QoS bits is reserved by MQTT 3.1.1 and
    /// must never appear; `QosLevel` only models `{0, 1, 2}` (spec.md §3),
    /// so it is rejected here rather than silently folded into QoS 0.
    fn from_byte(byte: u8) -> Result<Self, DecodeError> {
        let byte = byte & 0b0000_1111;

        if byte & QOS_BITS == QOS_BITS {
            return Err(DecodeError::new(
                crate::err::DecodeErrorKind::QoS,
                String::from("PUBLISH packet declared the reserved QoS bit pattern 0b11."),
            ));
        }

        return Ok(Self { byte });
    }

    fn zero() -> Self {
        return Self { byte: 0 };
    }

    fn qos(&self) -> QosLevel {
        match self.byte & QOS_BITS {
            QOS_1 => QosLevel::AtLeastOnce,
            QOS_2 => QosLevel::ExactlyOnce,
            _ => QosLevel::AtMostOnce,
        }
    }

    fn set_qos(&mut self, val: QosLevel) {
        self.byte &= !QOS_BITS;
        self.byte |= (val as u8) << 1;
    }

    fn retain(&self) -> bool {
        return self.byte & RETAIN == RETAIN;
    }

    fn set_retain(&mut self, val: bool) {
        if val {
            self.byte |= RETAIN;
        } else {
            self.byte &= !RETAIN;
        }
    }

    fn dup(&self) -> bool {
        return self.byte & DUP == DUP;
    }

    fn set_dup(&mut self, val: bool) {
        if val {
            self.byte |= DUP;
        } else {
            self.byte &= !DUP;
        }
    }
}
