//! Binary Codec
//!
//! Wire formats used by the micro:bit profile and by Eddystone beacons.
//!
//! ```text
//! Pin bitmask (PinAD / PinIO configuration), 4 bytes:
//!   byte i/8, bit i%8 set  <=>  pin i enabled
//!
//! Pin data (PinData), repeated pairs:
//!   [pin u8][value u8] [pin u8][value u8] ...
//!
//! Event record (ClientRequirement / ClientEvent / MicrobitEvent), 4 bytes:
//!   [0-1] event type  (u16 little-endian)
//!   [2-3] event value (u16 little-endian)
//!
//! Eddystone service data:
//!   [0]      frame type (0x00 = UID, anything else treated as URL)
//!   UID:  [4-11]  namespace (big-endian, 8 bytes)
//!         [14-17] instance  (big-endian, 4 bytes)
//!   URL:  [2..]   UTF-8 text
//! ```

use crate::domain::models::{MicrobitEvent, PinConfig, PinValues};
use crate::error::DecodeError;
use tracing::{trace, warn};

/// Size of the pin configuration bitmask
pub const PIN_MASK_LEN: usize = 4;

/// Highest pin index on the micro:bit edge connector
pub const MAX_PIN: u8 = 20;

/// Size of one encoded event record
pub const EVENT_RECORD_LEN: usize = 4;

const EDDYSTONE_FRAME_UID: u8 = 0x00;
const EDDYSTONE_UID_NAMESPACE: std::ops::Range<usize> = 4..12;
const EDDYSTONE_UID_INSTANCE: std::ops::Range<usize> = 14..18;
const EDDYSTONE_URL_OFFSET: usize = 2;

/// Fixed-width integers with a little-endian wire representation
pub trait LeBytes: Sized {
    const WIDTH: usize;

    fn to_le_vec(self) -> Vec<u8>;

    /// Read a value from the start of `bytes`
    fn from_le_slice(bytes: &[u8]) -> Result<Self, DecodeError>;
}

macro_rules! impl_le_bytes {
    ($($ty:ty),*) => {
        $(
            impl LeBytes for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                fn to_le_vec(self) -> Vec<u8> {
                    self.to_le_bytes().to_vec()
                }

                fn from_le_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
                    let raw = bytes
                        .get(..Self::WIDTH)
                        .ok_or(DecodeError::Truncated {
                            needed: Self::WIDTH,
                            actual: bytes.len(),
                        })?;
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    buf.copy_from_slice(raw);
                    Ok(<$ty>::from_le_bytes(buf))
                }
            }
        )*
    };
}

impl_le_bytes!(u16);

/// Encode a pin configuration as a 4-byte bitmask.
///
/// Only `true` entries set bits; pins beyond [`MAX_PIN`] are dropped.
pub fn encode_pin_mask(config: &PinConfig) -> [u8; PIN_MASK_LEN] {
    let mut mask = [0u8; PIN_MASK_LEN];
    for (&pin, &enabled) in config {
        if pin > MAX_PIN {
            warn!("Ignoring out-of-range pin {} in configuration", pin);
            continue;
        }
        if enabled {
            mask[usize::from(pin / 8)] |= 1 << (pin % 8);
        }
    }
    mask
}

/// Encode pin values as (pin, value) byte pairs in ascending pin order
pub fn encode_pin_values(values: &PinValues) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 2);
    for (&pin, &value) in values {
        if pin > MAX_PIN {
            warn!("Ignoring out-of-range pin {} in pin values", pin);
            continue;
        }
        bytes.push(pin);
        bytes.push(value);
    }
    bytes
}

/// Decode (pin, value) byte pairs. A trailing unpaired byte is dropped.
pub fn decode_pin_values(bytes: &[u8]) -> PinValues {
    let pairs = bytes.chunks_exact(2);
    if !pairs.remainder().is_empty() {
        warn!(
            "Pin data payload has odd length {}, dropping trailing byte",
            bytes.len()
        );
    }
    pairs.map(|pair| (pair[0], pair[1])).collect()
}

impl MicrobitEvent {
    pub fn new(kind: u16, value: u16) -> Self {
        Self { kind, value }
    }

    pub fn to_bytes(self) -> [u8; EVENT_RECORD_LEN] {
        let mut record = [0u8; EVENT_RECORD_LEN];
        record[..u16::WIDTH].copy_from_slice(&self.kind.to_le_vec());
        record[u16::WIDTH..].copy_from_slice(&self.value.to_le_vec());
        record
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < EVENT_RECORD_LEN {
            return Err(DecodeError::Truncated {
                needed: EVENT_RECORD_LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            kind: u16::from_le_slice(bytes)?,
            value: u16::from_le_slice(&bytes[u16::WIDTH..])?,
        })
    }
}

/// Encode a sequence of event records back to back
pub fn encode_events(events: &[MicrobitEvent]) -> Vec<u8> {
    events.iter().flat_map(|event| event.to_bytes()).collect()
}

/// Decode consecutive event records. A trailing partial record is dropped.
pub fn decode_events(bytes: &[u8]) -> Vec<MicrobitEvent> {
    let records = bytes.chunks_exact(EVENT_RECORD_LEN);
    if !records.remainder().is_empty() {
        warn!(
            "Event payload length {} is not a multiple of {}, dropping tail",
            bytes.len(),
            EVENT_RECORD_LEN
        );
    }
    records
        .filter_map(|record| MicrobitEvent::from_bytes(record).ok())
        .collect()
}

/// Decode a UTF-8 text characteristic
pub fn decode_text(bytes: &[u8]) -> Result<String, DecodeError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| DecodeError::InvalidUtf8)
}

/// Decoded Eddystone frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EddystoneFrame {
    Url(String),
    Uid { namespace: u64, instance: u32 },
}

/// Decode the service data of an Eddystone advertisement
pub fn decode_eddystone(bytes: &[u8]) -> Result<EddystoneFrame, DecodeError> {
    let frame_type = *bytes.first().ok_or(DecodeError::Empty)?;
    trace!("Eddystone frame type {:#04X}, {} bytes", frame_type, bytes.len());

    if frame_type == EDDYSTONE_FRAME_UID {
        let needed = EDDYSTONE_UID_INSTANCE.end;
        let truncated = DecodeError::Truncated {
            needed,
            actual: bytes.len(),
        };
        let namespace = bytes
            .get(EDDYSTONE_UID_NAMESPACE)
            .and_then(|raw| <[u8; 8]>::try_from(raw).ok())
            .ok_or_else(|| truncated.clone())?;
        let instance = bytes
            .get(EDDYSTONE_UID_INSTANCE)
            .and_then(|raw| <[u8; 4]>::try_from(raw).ok())
            .ok_or(truncated)?;

        return Ok(EddystoneFrame::Uid {
            namespace: u64::from_be_bytes(namespace),
            instance: u32::from_be_bytes(instance),
        });
    }

    let url = bytes
        .get(EDDYSTONE_URL_OFFSET..)
        .ok_or(DecodeError::Truncated {
            needed: EDDYSTONE_URL_OFFSET,
            actual: bytes.len(),
        })?;
    Ok(EddystoneFrame::Url(decode_text(url)?))
}

/// Split text into pieces of at most `max_len` bytes without breaking a
/// character. A character wider than `max_len` forms its own piece.
pub fn split_utf8(text: &str, max_len: usize) -> Vec<&str> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let mut end = max_len.min(rest.len());
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            end = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        let (chunk, tail) = rest.split_at(end);
        chunks.push(chunk);
        rest = tail;
    }
    chunks
}

/// Uppercase hex rendering for logs
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_le_encoding() {
        assert_eq!(0x1234u16.to_le_vec(), vec![0x34, 0x12]);
        assert_eq!(9501u16.to_le_vec(), vec![0x1D, 0x25]);
        assert_eq!(u16::from_le_slice(&[0x34, 0x12, 0xFF]), Ok(0x1234));
        assert_eq!(
            u16::from_le_slice(&[0x01]),
            Err(DecodeError::Truncated {
                needed: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn test_pin_mask_bits() {
        let config: PinConfig = [(0, true), (1, false), (8, true), (17, true)]
            .into_iter()
            .collect();
        let mask = encode_pin_mask(&config);
        assert_eq!(mask, [0b0000_0001, 0b0000_0001, 0b0000_0010, 0x00]);
    }

    #[test]
    fn test_pin_mask_empty_and_out_of_range() {
        assert_eq!(encode_pin_mask(&PinConfig::new()), [0; 4]);
        let config: PinConfig = [(31, true), (200, true)].into_iter().collect();
        assert_eq!(encode_pin_mask(&config), [0; 4]);
    }

    #[test]
    fn test_pin_values_layout() {
        let values: PinValues = [(17, 128), (0, 255), (3, 0)].into_iter().collect();
        assert_eq!(encode_pin_values(&values), vec![0, 255, 3, 0, 17, 128]);
    }

    proptest! {
        #[test]
        fn test_pin_values_round_trip(
            values in prop::collection::btree_map(0u8..=17, any::<u8>(), 0..=18)
        ) {
            let encoded = encode_pin_values(&values);
            prop_assert_eq!(encoded.len(), values.len() * 2);
            prop_assert_eq!(decode_pin_values(&encoded), values);
        }

        #[test]
        fn test_pin_mask_sets_exactly_enabled_keys(
            config in prop::collection::btree_map(0u8..=17, any::<bool>(), 0..=18)
        ) {
            let mask = encode_pin_mask(&config);
            for pin in 0..=17u8 {
                let set = mask[usize::from(pin / 8)] & (1 << (pin % 8)) != 0;
                prop_assert_eq!(set, config.get(&pin) == Some(&true), "pin {}", pin);
            }
            prop_assert_eq!(mask[3], 0);
        }
    }

    #[test]
    fn test_pin_values_odd_length_drops_tail() {
        let decoded = decode_pin_values(&[1, 10, 2]);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded.get(&1), Some(&10));
    }

    #[test]
    fn test_event_records() {
        let event = MicrobitEvent::new(1104, 3);
        assert_eq!(event.to_bytes(), [0x50, 0x04, 0x03, 0x00]);

        let bytes = encode_events(&[event, MicrobitEvent::new(9501, 0)]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(
            decode_events(&bytes),
            vec![event, MicrobitEvent::new(9501, 0)]
        );
        assert_eq!(decode_events(&bytes[..6]), vec![event]);
    }

    #[test]
    fn test_decode_text() {
        assert_eq!(decode_text(b"BBC micro:bit"), Ok("BBC micro:bit".to_string()));
        assert_eq!(decode_text(&[0xFF, 0xFE]), Err(DecodeError::InvalidUtf8));
    }

    #[test]
    fn test_eddystone_uid() {
        let mut frame = vec![0x00, 0xEE, 0xAA, 0xBB];
        frame.extend_from_slice(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        frame.extend_from_slice(&[0xCC, 0xDD]);
        frame.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

        assert_eq!(
            decode_eddystone(&frame),
            Ok(EddystoneFrame::Uid {
                namespace: 0x0102_0304_0506_0708,
                instance: 0xDEAD_BEEF,
            })
        );
    }

    #[test]
    fn test_eddystone_uid_too_short() {
        let frame = [0x00u8; 17];
        assert_eq!(
            decode_eddystone(&frame),
            Err(DecodeError::Truncated {
                needed: 18,
                actual: 17
            })
        );
        assert!(decode_eddystone(&[0x00, 0x01]).is_err());
    }

    #[test]
    fn test_eddystone_url() {
        let mut frame = vec![0x10, 0xEB];
        frame.extend_from_slice(b"microbit.org");
        assert_eq!(
            decode_eddystone(&frame),
            Ok(EddystoneFrame::Url("microbit.org".to_string()))
        );
        assert_eq!(
            decode_eddystone(&[0x10, 0x00]),
            Ok(EddystoneFrame::Url(String::new()))
        );
    }

    #[test]
    fn test_eddystone_malformed() {
        assert_eq!(decode_eddystone(&[]), Err(DecodeError::Empty));
        assert_eq!(
            decode_eddystone(&[0x10]),
            Err(DecodeError::Truncated {
                needed: 2,
                actual: 1
            })
        );
        assert_eq!(
            decode_eddystone(&[0x10, 0x00, 0xC3]),
            Err(DecodeError::InvalidUtf8)
        );
    }

    #[test]
    fn test_split_utf8() {
        assert!(split_utf8("", 20).is_empty());
        assert_eq!(split_utf8("hello", 20), vec!["hello"]);
        assert_eq!(
            split_utf8("abcdefghijklmnopqrstuvwxyz", 20),
            vec!["abcdefghijklmnopqrst", "uvwxyz"]
        );
        // "é" is two bytes and must not be split
        assert_eq!(split_utf8("abé", 3), vec!["ab", "é"]);
        assert_eq!(split_utf8("€", 1), vec!["€"]);
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(to_hex(&[0x00, 0xAB, 0x10]), "00AB10");
    }
}
