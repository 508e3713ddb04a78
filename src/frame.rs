//! Wire format of the micro-inverter report frame
//!
//! Devices POST a fixed 43-byte frame. Only the serial number and one
//! power byte carry information; everything else is a constant template
//! that the decoder does not inspect.
//!
//! # Frame Format
//!
//! ```text
//! offset  0..19   header (constant, not validated)
//! offset 19..23   serial number (u32 little-endian)
//! offset 23       0x00
//! offset 24..26   0x00 0x5a
//! offset 26       power byte, watts = round(byte * 3.190)
//! offset 27..43   trailer (constant, not validated)
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::{FrameError, Result};

/// Length of a frame produced by [`encode`]
pub const FRAME_LEN: usize = 43;

/// Shortest buffer [`decode`] accepts (serial number and power byte addressable)
pub const MIN_FRAME_LEN: usize = 27;

/// Watts per unit of the power byte
pub const WATT_FACTOR: f64 = 3.190;

const SERIAL_OFFSET: usize = 19;
const SPACER_OFFSET: usize = 23;
const POWER_OFFSET: usize = 26;

const HEADER: [u8; SERIAL_OFFSET] = [
    0x79, 0x26, 0x00, 0x40, 0x14, 0x00, 0x00, 0x0f, 0x0f, 0x0f, 0x0f, 0x00, 0x00, 0x1c, 0x00,
    0xc3, 0xc3, 0xc3, 0xc3,
];

const FIXED_PAIR: [u8; 2] = [0x00, 0x5a];

const TRAILER: [u8; FRAME_LEN - MIN_FRAME_LEN] = [
    0x9d, 0x16, 0x80, 0x0f, 0x05, 0x02, 0xa6, 0x31, 0xd0, 0x0a, 0x11, 0x03, 0x05, 0x8a, 0x63, 0x17,
];

/// Device identifier carried at offsets 19..23
///
/// Rendered as exactly 8 lowercase hex digits, most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SerialNumber(u32);

impl SerialNumber {
    /// Wrap a raw 32-bit serial number
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Raw 32-bit value
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Bytes in wire order
    pub fn to_le_bytes(&self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl FromStr for SerialNumber {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(FrameError::InvalidSerialNumber(s.to_string()));
        }
        u32::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| FrameError::InvalidSerialNumber(s.to_string()))
    }
}

impl From<u32> for SerialNumber {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Serialize for SerialNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Decoded content of one device report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reading {
    /// Reporting device
    pub serial_number: SerialNumber,
    /// AC output power in watts
    pub power_watts: u32,
}

impl Reading {
    /// Create a new reading
    pub fn new(serial_number: SerialNumber, power_watts: u32) -> Self {
        Self {
            serial_number,
            power_watts,
        }
    }

    /// Decode a reading from a frame, see [`decode`]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        decode(data)
    }

    /// Serialize the reading into a full 43-byte frame
    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut frame = [0u8; FRAME_LEN];
        frame[..SERIAL_OFFSET].copy_from_slice(&HEADER);
        frame[SERIAL_OFFSET..SPACER_OFFSET].copy_from_slice(&self.serial_number.to_le_bytes());
        frame[SPACER_OFFSET] = 0x00;
        frame[SPACER_OFFSET + 1..POWER_OFFSET].copy_from_slice(&FIXED_PAIR);
        frame[POWER_OFFSET] = power_to_byte(self.power_watts);
        frame[MIN_FRAME_LEN..].copy_from_slice(&TRAILER);
        frame
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "serial_number={}, watt={}",
            self.serial_number, self.power_watts
        )
    }
}

/// Decode a frame into a [`Reading`]
///
/// Header and trailer bytes are ignored so firmware variants with
/// different padding still decode. Only the length is checked.
pub fn decode(data: &[u8]) -> Result<Reading> {
    if data.len() < MIN_FRAME_LEN {
        return Err(FrameError::FrameTooShort {
            needed: MIN_FRAME_LEN,
            available: data.len(),
        });
    }

    let serial = u32::from_le_bytes([
        data[SERIAL_OFFSET],
        data[SERIAL_OFFSET + 1],
        data[SERIAL_OFFSET + 2],
        data[SERIAL_OFFSET + 3],
    ]);

    Ok(Reading {
        serial_number: SerialNumber(serial),
        power_watts: byte_to_power(data[POWER_OFFSET]),
    })
}

/// Encode a serial number string and wattage into a 43-byte frame
pub fn encode(serial_number: &str, power_watts: u32) -> Result<[u8; FRAME_LEN]> {
    let serial_number = serial_number.parse::<SerialNumber>()?;
    Ok(Reading::new(serial_number, power_watts).to_bytes())
}

/// Watts represented by a power byte.
///
/// Ties round to even: byte 150 is 478.5 W and reports as 478.
pub fn byte_to_power(byte: u8) -> u32 {
    (f64::from(byte) * WATT_FACTOR).round_ties_even() as u32
}

/// Power byte for a wattage. Truncates rather than rounds; saturates at 255.
pub fn power_to_byte(power_watts: u32) -> u8 {
    let units = (f64::from(power_watts) / WATT_FACTOR).floor();
    units.min(f64::from(u8::MAX)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_length() {
        let frame = Reading::new(SerialNumber::new(0), 0).to_bytes();
        assert_eq!(frame.len(), FRAME_LEN);
        assert_eq!(&frame[..SERIAL_OFFSET], &HEADER);
        assert_eq!(frame[24], 0x00);
        assert_eq!(frame[25], 0x5a);
        assert_eq!(&frame[MIN_FRAME_LEN..], &TRAILER);
    }

    #[test]
    fn test_serial_byte_order() {
        let mut frame = [0u8; FRAME_LEN];
        frame[19..23].copy_from_slice(&[0xe1, 0x77, 0xc5, 0x30]);
        let reading = decode(&frame).unwrap();
        assert_eq!(reading.serial_number.to_string(), "30c577e1");
    }

    #[test]
    fn test_power_byte() {
        let mut frame = [0u8; MIN_FRAME_LEN];
        frame[26] = 0x5a;
        assert_eq!(decode(&frame).unwrap().power_watts, 287);
    }

    #[test]
    fn test_serial_zero_padded() {
        assert_eq!(SerialNumber::new(0x1f).to_string(), "0000001f");
    }

    #[test]
    fn test_serial_parse_rejects() {
        for bad in ["", "30c577e", "30c577e1f", "0x30c577", "3oc577e1", "+30c577e"] {
            assert!(
                matches!(
                    bad.parse::<SerialNumber>(),
                    Err(FrameError::InvalidSerialNumber(_))
                ),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_serial_parse_uppercase() {
        let sn: SerialNumber = "30C577E1".parse().unwrap();
        assert_eq!(sn.value(), 0x30c577e1);
    }

    #[test]
    fn test_encode_truncates() {
        // 230 / 3.19 = 72.1
        assert_eq!(power_to_byte(230), 72);
        assert_eq!(byte_to_power(72), 230);
        // 3 W is below one unit
        assert_eq!(power_to_byte(3), 0);
    }

    #[test]
    fn test_encode_saturates() {
        assert_eq!(power_to_byte(5000), 255);
        assert_eq!(byte_to_power(255), 813);
    }

    #[test]
    fn test_ties_round_even() {
        assert_eq!(byte_to_power(50), 160);
        assert_eq!(byte_to_power(150), 478);
        assert_eq!(byte_to_power(250), 798);
    }

    #[test]
    fn test_reading_display() {
        let reading = Reading::new(SerialNumber::new(0x30c577e1), 230);
        assert_eq!(reading.to_string(), "serial_number=30c577e1, watt=230");
    }

    #[test]
    fn test_reading_serializes_serial_as_hex() {
        let reading = Reading::new(SerialNumber::new(0x30c577e1), 230);
        let json = serde_json::to_value(reading).unwrap();
        assert_eq!(json["serial_number"], "30c577e1");
        assert_eq!(json["power_watts"], 230);
    }
}
