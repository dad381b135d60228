//! # Telemetry Line Decoder
//!
//! Decodes telemetry lines of the form
//! `##<tag>_<seq>_<x>-<y>-<z>_<bit0><bit1>_<value>`.
//!
//! All numeric groups are hexadecimal except the two flag bits, which are
//! single decimal digits. Lines arrive over an unreliable radio link, so any
//! deviation from the format yields `None` instead of an error.

use serde::Serialize;

/// Literal prefix that marks a telemetry line
pub const TELEMETRY_MARKER: &str = "##";

/// Number of `_`-separated groups after the marker
const GROUP_COUNT: usize = 5;

/// Number of `-`-separated subfields in the position group
const POSITION_AXES: usize = 3;

/// Three-axis position sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub x: u16,
    pub y: u16,
    pub z: u16,
}

/// The two status bits carried in the fourth group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Flags {
    pub bit0: u8,
    pub bit1: u8,
}

/// One decoded telemetry line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TelemetryRecord {
    /// Device identifier
    pub device_tag: u16,

    /// Sample sequence number
    pub sequence: u16,

    /// Position sample
    pub position: Position,

    /// Status bits
    pub flags: Flags,

    /// Sensor reading
    pub value: u16,
}

/// Decode a raw line into a telemetry record
///
/// # Arguments
///
/// * `line` - Raw text line, trailing `\r\n` allowed
///
/// # Returns
///
/// * `Option<TelemetryRecord>` - Decoded record, or `None` if the line is not
///   telemetry or is malformed
///
/// # Examples
///
/// ```
/// use ble_uart_bridge::telemetry::decode;
///
/// let record = decode("##00AB_0001_0010-0020-0030_12_00FF\r\n").unwrap();
/// assert_eq!(record.device_tag, 0xAB);
/// assert_eq!(record.flags.bit1, 2);
///
/// assert!(decode("boot ok").is_none());
/// ```
pub fn decode(line: &str) -> Option<TelemetryRecord> {
    let body = line.trim_end().strip_prefix(TELEMETRY_MARKER)?;

    let groups: Vec<&str> = body.split('_').collect();
    if groups.len() != GROUP_COUNT {
        return None;
    }

    let axes: Vec<&str> = groups[2].split('-').collect();
    if axes.len() != POSITION_AXES {
        return None;
    }

    let flags = groups[3].as_bytes();
    if flags.len() != 2 {
        return None;
    }

    Some(TelemetryRecord {
        device_tag: parse_hex(groups[0])?,
        sequence: parse_hex(groups[1])?,
        position: Position {
            x: parse_hex(axes[0])?,
            y: parse_hex(axes[1])?,
            z: parse_hex(axes[2])?,
        },
        flags: Flags {
            bit0: parse_digit(flags[0])?,
            bit1: parse_digit(flags[1])?,
        },
        value: parse_hex(groups[4])?,
    })
}

/// Parse a non-empty run of hex digits into a `u16`
fn parse_hex(field: &str) -> Option<u16> {
    // from_str_radix would accept a leading '+'
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u16::from_str_radix(field, 16).ok()
}

fn parse_digit(byte: u8) -> Option<u8> {
    byte.is_ascii_digit().then(|| byte - b'0')
}
