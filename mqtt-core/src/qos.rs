use crate::err::{DecodeError, DecodeErrorKind};

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug, Hash)]
pub enum QosLevel {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QosLevel {
    type Error = DecodeError;
    /// Takes a byte with non-QoS bits masked, and QoS bits right-shifted to the right-hand side (idx 0)
    fn try_from(value: u8) -> Result<Self, DecodeError> {
        let out = match value {
            0 => Self::AtMostOnce,
            1 => Self::AtLeastOnce,
            2 => Self::ExactlyOnce,
            _ => {
                return Err(DecodeError::new(
                    DecodeErrorKind::QoS,
                    format!("Invalid QoS: {value}, only values 0-2 are valid"),
                ));
            }
        };

        return Ok(out);
    }
}
