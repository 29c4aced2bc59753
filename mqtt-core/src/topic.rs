use std::fmt::Display;

use bytes::Bytes;

use crate::{
    err::{DecodeError, DecodeErrorKind},
    io::decode_utf8,
};

/// A plain topic name or filter. Subscriptions here are exact-match only;
/// MQTT wildcard tokens (`+`, `#`) are not interpreted.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Debug, Hash)]
pub struct TopicName(String);

impl TopicName {
    pub fn from_str(str: &str) -> Result<Self, DecodeError> {
        if str.is_empty() {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedTopicName,
                String::from("Invalid topic, topic contains no bytes."),
            ));
        }

        return Ok(Self(str.to_owned()));
    }

    pub fn decode(bytes: &mut Bytes) -> Result<Self, DecodeError> {
        let string = decode_utf8(bytes)?;
        return Self::from_str(string.as_str());
    }

    pub fn as_str(&self) -> &str {
        return &self.0;
    }

    pub fn len(&self) -> usize {
        return self.0.len();
    }
}

impl Display for TopicName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
