//! MicroStepper wire protocol.
//!
//! Protocol Overview:
//! - Format: ASCII command/response over RS-232 (USB serial)
//! - Baud: 9600, 8N1, no flow control
//! - Commands: `VERB[:ARG]#`, case-sensitive, `#` terminated
//!
//! | Command | Frame sent | Response |
//! |---|---|---|
//! | Query position | `GETPOS#` | 7 bytes, `P` + decimal from offset 1 |
//! | Move absolute | `GOTO:<signed decimal>#` | none |
//! | Query temperature | `GETTEMP#` | 5 bytes, sentinel + decimal from offset 1 |

use crate::transport::Expect;
use focus_core::error::FocusError;

/// Terminator of commands and unbounded responses.
pub const STOP_CHAR: u8 = b'#';

/// First byte of a valid position response.
pub const POSITION_SENTINEL: u8 = b'P';

/// Length of the `GETPOS#` response frame.
pub const POSITION_FRAME_LEN: usize = 7;

/// Length of the `GETTEMP#` response frame.
pub const TEMPERATURE_FRAME_LEN: usize = 5;

/// Value the firmware reports when the temperature sensor is absent or failed.
pub const TEMPERATURE_FAILURE: i32 = -127;

/// Readings outside this open interval are rejected.
pub const TEMPERATURE_RANGE: (f64, f64) = (-100.0, 100.0);

/// A command understood by the MicroStepper firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `GETPOS#`
    GetPosition,
    /// `GOTO:<position>#`
    Goto(i32),
    /// `GETTEMP#`
    GetTemperature,
}

impl Command {
    /// Frame the command for the wire, terminator included.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::GetPosition => b"GETPOS#".to_vec(),
            Self::Goto(position) => format!("GOTO:{}#", position).into_bytes(),
            Self::GetTemperature => b"GETTEMP#".to_vec(),
        }
    }

    /// How the response to this command is framed.
    pub fn expect(&self) -> Expect {
        match self {
            Self::GetPosition => Expect::Exact(POSITION_FRAME_LEN),
            Self::Goto(_) => Expect::Nothing,
            Self::GetTemperature => Expect::Exact(TEMPERATURE_FRAME_LEN),
        }
    }
}

/// Parse a signed decimal integer starting at offset 1 of `frame`.
///
/// Mirrors `scanf("%d")`: leading whitespace is skipped, an optional sign is accepted,
/// and parsing stops at the first non-digit. Returns `None` when no digit follows.
pub fn parse_payload_int(frame: &[u8]) -> Option<i32> {
    let payload = frame.get(1..)?;
    let mut rest = payload
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .copied()
        .peekable();

    let negative = match rest.peek() {
        Some(&b'-') => {
            rest.next();
            true
        }
        Some(&b'+') => {
            rest.next();
            false
        }
        _ => false,
    };

    let mut value: i64 = 0;
    let mut digits = 0usize;
    while let Some(b) = rest.next_if(u8::is_ascii_digit) {
        value = value * 10 + i64::from(b - b'0');
        digits += 1;
        if value > i64::from(i32::MAX) + 1 {
            return None;
        }
    }

    if digits == 0 {
        return None;
    }

    let value = if negative { -value } else { value };
    i32::try_from(value).ok()
}

/// Parse a `GETPOS#` response into a tick position.
pub fn parse_position(frame: &[u8]) -> Result<i32, FocusError> {
    parse_payload_int(frame).ok_or_else(|| FocusError::parse("position", frame))
}

/// Parse a `GETTEMP#` response into degrees Celsius.
///
/// Returns `None` for unparseable frames, the firmware failure value, and readings
/// outside [`TEMPERATURE_RANGE`].
pub fn parse_temperature(frame: &[u8]) -> Option<f64> {
    let raw = parse_payload_int(frame)?;
    if raw == TEMPERATURE_FAILURE {
        return None;
    }
    let celsius = f64::from(raw);
    let (low, high) = TEMPERATURE_RANGE;
    (celsius > low && celsius < high).then_some(celsius)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_commands() {
        assert_eq!(Command::GetPosition.encode(), b"GETPOS#");
        assert_eq!(Command::GetTemperature.encode(), b"GETTEMP#");
        assert_eq!(Command::Goto(5000).encode(), b"GOTO:5000#");
        assert_eq!(Command::Goto(-10).encode(), b"GOTO:-10#");
    }

    #[test]
    fn test_expected_framing() {
        assert_eq!(Command::GetPosition.expect(), Expect::Exact(7));
        assert_eq!(Command::GetTemperature.expect(), Expect::Exact(5));
        assert_eq!(Command::Goto(1).expect(), Expect::Nothing);
    }

    #[test]
    fn test_parse_position_frames() {
        assert_eq!(parse_position(b"P005000").unwrap(), 5000);
        assert_eq!(parse_position(b"P5000#\n").unwrap(), 5000);
        assert_eq!(parse_position(b"P  1234").unwrap(), 1234);
        assert_eq!(parse_position(b"P-00010").unwrap(), -10);
        assert_eq!(parse_position(b"P000000").unwrap(), 0);
    }

    #[test]
    fn test_parse_position_rejects_garbage() {
        assert!(matches!(
            parse_position(b"P######"),
            Err(FocusError::Parse { what: "position", .. })
        ));
        assert!(parse_position(b"P").is_err());
        assert!(parse_position(b"").is_err());
        assert!(parse_position(b"P-").is_err());
        assert!(parse_position(b"P99999999999").is_err());
    }

    #[test]
    fn test_goto_round_trip_through_position_frame() {
        let frame = Command::Goto(5000).encode();
        let arg = &frame[b"GOTO:".len()..frame.len() - 1];
        let reply = [b"P00".as_slice(), arg].concat();
        assert_eq!(reply.len(), POSITION_FRAME_LEN);
        assert_eq!(parse_position(&reply).unwrap(), 5000);
    }

    #[test]
    fn test_parse_temperature() {
        assert_eq!(parse_temperature(b"P-15"), Some(-15.0));
        assert_eq!(parse_temperature(b"T0021"), Some(21.0));
        assert_eq!(parse_temperature(b"T-015"), Some(-15.0));
    }

    #[test]
    fn test_parse_temperature_rejects_invalid() {
        assert_eq!(parse_temperature(b"T-127"), None);
        assert_eq!(parse_temperature(b"T-100"), None);
        assert_eq!(parse_temperature(b"T0100"), None);
        assert_eq!(parse_temperature(b"T????"), None);
    }
}
