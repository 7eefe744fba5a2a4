//! Bit-packed binary status frames.
//!
//! Units speaking the binary variant report and accept their whole state as one
//! fixed-layout frame:
//!
//! ```text
//! +-------+-------+-----+------+---------------------------+-----+
//! | 0xAA  | 0xAA  | len | type | payload (offsets 4..n-1)  | sum |
//! +-------+-------+-----+------+---------------------------+-----+
//! ```
//!
//! `len` counts every byte after itself (`n - 3`) and `sum` is the low byte
//! of the sum of all preceding bytes. Every field lives at a fixed offset and
//! bit range given by [`Field::slot`]; decoding and editing both go through
//! that one table.

use crate::error::WireError;
use bytes::{BufMut, Bytes, BytesMut};

/// Length of a status frame as produced by current units
pub const STATUS_FRAME_LEN: usize = 21;

/// Shortest frame that still covers every field of the layout plus checksum
pub const MIN_STATUS_FRAME_LEN: usize = 18;

/// Status frame preamble
pub const STATUS_PREAMBLE: [u8; 2] = [0xAA, 0xAA];

/// Endpoint frame preamble
pub const ENDPOINT_PREAMBLE: [u8; 2] = [0xAC, 0xAC];

/// Frame type byte of a status report or query
pub const FRAME_TYPE_STATUS: u8 = 0xA0;

/// Frame type byte of a command
pub const FRAME_TYPE_COMMAND: u8 = 0x01;

/// Frame type byte of an endpoint announcement
pub const FRAME_TYPE_ENDPOINT: u8 = 0xB4;

const QUERY_FRAME: [u8; STATUS_FRAME_LEN] = [
    0xAA, 0xAA, 0x12, 0xA0, 0x0A, 0x0A, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x1A,
];

/// Location of a field: byte offset, shift of its lowest bit, bit width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Byte offset in the frame
    pub offset: usize,
    /// Position of the field's least significant bit (bit 7 is the MSB)
    pub shift: u8,
    /// Width in bits
    pub width: u8,
}

impl Slot {
    const fn new(offset: usize, shift: u8, width: u8) -> Self {
        Self {
            offset,
            shift,
            width,
        }
    }

    fn mask(self) -> u8 {
        (((1u16 << self.width) - 1) as u8) << self.shift
    }
}

/// Named field of the status layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Turbo
    Turbo,
    /// Fan level, 0 = auto
    FanLevel,
    /// Power
    Power,
    /// Run mode, same codes as the JSON `Mod` column
    RunMode,
    /// Quiet / mute
    Quiet,
    /// Target temperature is in Fahrenheit
    Fahrenheit,
    /// Encoded target temperature
    TargetTemperature,
    /// Horizontal swing
    SwingHorizontal,
    /// Vertical swing
    SwingVertical,
    /// Display lights
    Lights,
    /// Health / ionizer
    Health,
    /// Timer mode
    TimerMode,
    /// Coil drying (X-fan)
    Drying,
    /// Stepless fan mode
    SteplessMode,
    /// Sleep
    Sleep,
    /// Power save
    Eco,
    /// Off timer armed
    OffTimerEnabled,
    /// Off timer minutes, bits 10..8
    OffTimerHigh,
    /// On timer armed
    OnTimerEnabled,
    /// On timer minutes, bits 10..8
    OnTimerHigh,
    /// On timer minutes, bits 7..0
    OnTimerLow,
    /// Off timer minutes, bits 7..0
    OffTimerLow,
    /// Stepless fan value
    SteplessFan,
    /// Indoor temperature, whole degrees
    IndoorWhole,
    /// Indoor temperature, tenths
    IndoorTenths,
}

impl Field {
    /// Every field of the layout
    pub const ALL: [Field; 25] = [
        Field::Turbo,
        Field::FanLevel,
        Field::Power,
        Field::RunMode,
        Field::Quiet,
        Field::Fahrenheit,
        Field::TargetTemperature,
        Field::SwingHorizontal,
        Field::SwingVertical,
        Field::Lights,
        Field::Health,
        Field::TimerMode,
        Field::Drying,
        Field::SteplessMode,
        Field::Sleep,
        Field::Eco,
        Field::OffTimerEnabled,
        Field::OffTimerHigh,
        Field::OnTimerEnabled,
        Field::OnTimerHigh,
        Field::OnTimerLow,
        Field::OffTimerLow,
        Field::SteplessFan,
        Field::IndoorWhole,
        Field::IndoorTenths,
    ];

    /// The status layout
    pub const fn slot(self) -> Slot {
        match self {
            Field::Turbo => Slot::new(7, 7, 1),
            Field::FanLevel => Slot::new(7, 4, 3),
            Field::Power => Slot::new(7, 3, 1),
            Field::RunMode => Slot::new(7, 0, 3),
            Field::Quiet => Slot::new(8, 6, 1),
            Field::Fahrenheit => Slot::new(8, 5, 1),
            Field::TargetTemperature => Slot::new(8, 0, 5),
            Field::SwingHorizontal => Slot::new(9, 4, 4),
            Field::SwingVertical => Slot::new(9, 0, 4),
            Field::Lights => Slot::new(10, 7, 1),
            Field::Health => Slot::new(10, 6, 1),
            Field::TimerMode => Slot::new(10, 5, 1),
            Field::Drying => Slot::new(10, 4, 1),
            Field::SteplessMode => Slot::new(10, 2, 2),
            Field::Sleep => Slot::new(10, 1, 1),
            Field::Eco => Slot::new(10, 0, 1),
            Field::OffTimerEnabled => Slot::new(11, 7, 1),
            Field::OffTimerHigh => Slot::new(11, 4, 3),
            Field::OnTimerEnabled => Slot::new(11, 3, 1),
            Field::OnTimerHigh => Slot::new(11, 0, 3),
            Field::OnTimerLow => Slot::new(12, 0, 8),
            Field::OffTimerLow => Slot::new(13, 0, 8),
            Field::SteplessFan => Slot::new(14, 0, 8),
            Field::IndoorWhole => Slot::new(15, 0, 8),
            Field::IndoorTenths => Slot::new(16, 0, 8),
        }
    }
}

/// Additive checksum: low byte of the sum of `bytes`
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// One binary status or command frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFrame {
    buf: BytesMut,
}

impl StatusFrame {
    /// The fixed status query frame
    pub fn query() -> Self {
        Self {
            buf: BytesMut::from(&QUERY_FRAME[..]),
        }
    }

    /// Validate and wrap a received frame
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < MIN_STATUS_FRAME_LEN {
            return Err(WireError::FrameLength(bytes.len()));
        }
        if bytes[..2] != STATUS_PREAMBLE {
            return Err(WireError::MalformedFrame(format!(
                "unexpected preamble {:02x}{:02x}",
                bytes[0], bytes[1]
            )));
        }
        if usize::from(bytes[2]) != bytes.len() - 3 {
            return Err(WireError::MalformedFrame(format!(
                "length byte {} does not match frame of {} bytes",
                bytes[2],
                bytes.len()
            )));
        }

        let (body, trailer) = bytes.split_at(bytes.len() - 1);
        let expected = checksum(body);
        if trailer[0] != expected {
            return Err(WireError::Checksum {
                expected,
                found: trailer[0],
            });
        }

        Ok(Self {
            buf: BytesMut::from(bytes),
        })
    }

    /// Parse the hex text carried in a pack's `bin` field
    pub fn from_hex(text: &str) -> Result<Self, WireError> {
        let bytes = hex::decode(text.trim())
            .map_err(|e| WireError::MalformedFrame(format!("bin: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Read a field
    pub fn get(&self, field: Field) -> u8 {
        let slot = field.slot();
        (self.buf[slot.offset] & slot.mask()) >> slot.shift
    }

    /// Read a one-bit field
    pub fn flag(&self, field: Field) -> bool {
        self.get(field) != 0
    }

    /// Read-modify-write a field; bits above its width are discarded
    pub fn set(&mut self, field: Field, value: u8) {
        let slot = field.slot();
        let mask = slot.mask();
        let byte = &mut self.buf[slot.offset];
        *byte = (*byte & !mask) | ((value << slot.shift) & mask);
    }

    /// Write a one-bit field
    pub fn set_flag(&mut self, field: Field, on: bool) {
        self.set(field, u8::from(on));
    }

    /// Frame type byte
    pub fn frame_type(&self) -> u8 {
        self.buf[3]
    }

    /// Overwrite the frame type byte
    pub fn set_frame_type(&mut self, frame_type: u8) {
        self.buf[3] = frame_type;
    }

    /// Checksum byte as carried
    pub fn checksum(&self) -> u8 {
        self.buf[self.buf.len() - 1]
    }

    /// Recompute the trailing checksum after edits
    pub fn seal(&mut self) {
        let last = self.buf.len() - 1;
        self.buf[last] = checksum(&self.buf[..last]);
    }

    /// Whether the trailing checksum matches the body
    pub fn is_sealed(&self) -> bool {
        let last = self.buf.len() - 1;
        self.buf[last] == checksum(&self.buf[..last])
    }

    /// Raw frame bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Frozen copy of the frame bytes
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buf)
    }

    /// Lowercase hex text for a pack's `bin` field
    pub fn to_hex(&self) -> String {
        hex::encode(&self.buf)
    }

    /// Scheduled on-timer in minutes (11 bits)
    pub fn on_timer_minutes(&self) -> u16 {
        (u16::from(self.get(Field::OnTimerHigh)) << 8) | u16::from(self.get(Field::OnTimerLow))
    }

    /// Scheduled off-timer in minutes (11 bits)
    pub fn off_timer_minutes(&self) -> u16 {
        (u16::from(self.get(Field::OffTimerHigh)) << 8) | u16::from(self.get(Field::OffTimerLow))
    }

    /// Store the on-timer minute count; values above 11 bits are truncated
    pub fn set_on_timer_minutes(&mut self, minutes: u16) {
        self.set(Field::OnTimerHigh, (minutes >> 8) as u8);
        self.set(Field::OnTimerLow, (minutes & 0xFF) as u8);
    }

    /// Store the off-timer minute count; values above 11 bits are truncated
    pub fn set_off_timer_minutes(&mut self, minutes: u16) {
        self.set(Field::OffTimerHigh, (minutes >> 8) as u8);
        self.set(Field::OffTimerLow, (minutes & 0xFF) as u8);
    }
}

/// Build the `AC AC len B4 <ascii> 00 sum` frame announcing a cloud endpoint.
///
/// The length byte covers everything after itself, so endpoints longer than
/// 252 bytes cannot be expressed and are rejected.
pub fn endpoint_frame(endpoint: &str) -> Result<Bytes, WireError> {
    // preamble, len, type, text, terminator, checksum
    let total = 2 + 1 + 1 + endpoint.len() + 1 + 1;
    let len = u8::try_from(total - 3).map_err(|_| {
        WireError::MalformedFrame(format!("endpoint of {} bytes too long", endpoint.len()))
    })?;
    let mut buf = BytesMut::with_capacity(total);
    buf.put_slice(&ENDPOINT_PREAMBLE);
    buf.put_u8(len);
    buf.put_u8(FRAME_TYPE_ENDPOINT);
    buf.put_slice(endpoint.as_bytes());
    buf.put_u8(0x00);
    let sum = checksum(&buf);
    buf.put_u8(sum);
    Ok(buf.freeze())
}

/// Format a timer minute count as `HH:MM`
pub fn format_minutes(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Parse `HH:MM` into a minute count that fits the 11-bit timer fields
pub fn parse_minutes(text: &str) -> Result<u16, WireError> {
    let invalid = || WireError::invalid("timer", text);
    let (h, m) = text.split_once(':').ok_or_else(invalid)?;
    let h: u16 = h.trim().parse().map_err(|_| invalid())?;
    let m: u16 = m.trim().parse().map_err(|_| invalid())?;
    if h > 23 || m > 59 {
        return Err(invalid());
    }
    Ok(h * 60 + m)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StatusFrame {
        let mut frame = StatusFrame::query();
        frame.set(Field::FanLevel, 3);
        frame.set_flag(Field::Power, true);
        frame.set(Field::RunMode, 1);
        frame.set(Field::TargetTemperature, 8);
        frame.set(Field::IndoorWhole, 23);
        frame.set(Field::IndoorTenths, 5);
        frame.seal();
        frame
    }

    #[test]
    fn test_query_frame() {
        let query = StatusFrame::query();
        assert_eq!(query.as_bytes().len(), STATUS_FRAME_LEN);
        assert_eq!(query.frame_type(), FRAME_TYPE_STATUS);
        assert!(query.is_sealed());
        assert_eq!(query.checksum(), 0x1A);
    }

    #[test]
    fn test_checksum_law() {
        let frame = sample();
        let bytes = frame.as_bytes();
        let n = bytes.len();
        let sum: u32 = bytes[..n - 1].iter().map(|b| u32::from(*b)).sum();
        assert_eq!(u32::from(bytes[n - 1]), sum % 256);
        assert!(StatusFrame::from_bytes(bytes).is_ok());
    }

    #[test]
    fn test_rejects_bad_checksum() {
        let mut bytes = sample().as_bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] = bytes[last].wrapping_add(1);
        assert!(matches!(
            StatusFrame::from_bytes(&bytes),
            Err(WireError::Checksum { .. })
        ));
    }

    #[test]
    fn test_rejects_short_and_foreign_frames() {
        assert_eq!(
            StatusFrame::from_bytes(&[0xAA, 0xAA, 0x01]),
            Err(WireError::FrameLength(3))
        );
        let mut bytes = sample().as_bytes().to_vec();
        bytes[0] = 0x55;
        assert!(matches!(
            StatusFrame::from_bytes(&bytes),
            Err(WireError::MalformedFrame(_))
        ));
        let mut bytes = sample().as_bytes().to_vec();
        bytes[2] = 0x10;
        assert!(matches!(
            StatusFrame::from_bytes(&bytes),
            Err(WireError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_fields_do_not_overlap() {
        for field in Field::ALL {
            let mut frame = StatusFrame::query();
            let max = ((1u16 << field.slot().width) - 1) as u8;
            frame.set(field, max);
            for other in Field::ALL.iter().filter(|f| **f != field) {
                let baseline = StatusFrame::query().get(*other);
                assert_eq!(frame.get(*other), baseline, "{field:?} leaked into {other:?}");
            }
            assert_eq!(frame.get(field), max);
        }
    }

    #[test]
    fn test_set_masks_to_width() {
        let mut frame = StatusFrame::query();
        frame.set(Field::RunMode, 0xFF);
        assert_eq!(frame.get(Field::RunMode), 0x07);
        assert!(!frame.flag(Field::Power));
    }

    #[test]
    fn test_timer_minutes() {
        let mut frame = StatusFrame::query();
        let minutes = parse_minutes("22:45").unwrap();
        assert_eq!(minutes, 1365);
        frame.set_on_timer_minutes(minutes);
        frame.set_off_timer_minutes(90);
        assert_eq!(frame.on_timer_minutes(), 1365);
        assert_eq!(frame.off_timer_minutes(), 90);
        assert_eq!(format_minutes(frame.on_timer_minutes()), "22:45");
        assert!(parse_minutes("24:00").is_err());
        assert!(parse_minutes("noon").is_err());
    }

    #[test]
    fn test_hex_transport() {
        let frame = sample();
        assert_eq!(StatusFrame::from_hex(&frame.to_hex()).unwrap(), frame);
        assert!(StatusFrame::from_hex("zz").is_err());
    }

    #[test]
    fn test_endpoint_frame() {
        let frame = endpoint_frame("dis.gree.com").unwrap();
        assert_eq!(&frame[..2], &ENDPOINT_PREAMBLE);
        assert_eq!(usize::from(frame[2]), frame.len() - 3);
        assert_eq!(frame[3], FRAME_TYPE_ENDPOINT);
        assert_eq!(&frame[4..16], b"dis.gree.com");
        assert_eq!(frame[16], 0x00);
        assert_eq!(frame[17], checksum(&frame[..17]));
    }

    #[test]
    fn test_endpoint_frame_length_limit() {
        let longest = "a".repeat(252);
        let frame = endpoint_frame(&longest).unwrap();
        assert_eq!(frame[2], 0xFF);
        assert_eq!(frame.len(), 258);

        let too_long = "a".repeat(253);
        assert!(matches!(
            endpoint_frame(&too_long),
            Err(WireError::MalformedFrame(_))
        ));
    }
}
