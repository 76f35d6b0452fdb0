//! CC1101 frequency registers and hex byte codec.
//!
//! The bridge's radio derives its carrier frequency from three 8-bit
//! registers (`FREQ2`/`FREQ1`/`FREQ0`) and a 26 MHz reference crystal with a
//! 16-bit fractional divider. This module converts registers to a
//! human-readable megahertz value and parses the hex-string register
//! representation used everywhere on the wire.
//!
//! Register-to-frequency is the authoritative direction; the megahertz value
//! is a lossy display derivation and is never converted back.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Reference crystal frequency of the CC1101 (Hz).
const CRYSTAL_HZ: f64 = 26_000_000.0;

/// Default register triple (FREQ2/FREQ1/FREQ0) shipped with the bridge,
/// tuning the radio to roughly 869.525 MHz.
pub const DEFAULT_REGISTERS: (u8, u8, u8) = (0x21, 0x71, 0x7a);

// ============================================================================
// Hex Parsing
// ============================================================================

/// Parses an optionally `0x`-prefixed hex byte string.
///
/// Returns `default` for empty or unparsable input. Never fails; invalid
/// user input degrades to the default rather than producing an error.
///
/// # Example
///
/// ```
/// use rfbridge_client::freq::parse_hex_byte;
///
/// assert_eq!(parse_hex_byte("0x1F", 0), 31);
/// assert_eq!(parse_hex_byte("", 5), 5);
/// assert_eq!(parse_hex_byte("zz", 5), 5);
/// ```
#[must_use]
pub fn parse_hex_byte(s: &str, default: u8) -> u8 {
    try_parse_hex_byte(s).unwrap_or(default)
}

/// Parses an optionally `0x`-prefixed hex byte string, strictly.
#[must_use]
pub fn try_parse_hex_byte(s: &str) -> Option<u8> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return None;
    }
    u8::from_str_radix(digits, 16).ok()
}

/// Formats a byte in the canonical wire form (`0x` prefix, two lower-case
/// hex digits).
#[inline]
#[must_use]
pub fn format_hex_byte(value: u8) -> String {
    format!("0x{value:02x}")
}

// ============================================================================
// Serde Helpers
// ============================================================================

/// Serde adapter for bytes carried as `0x`-prefixed hex strings.
///
/// The bridge firmware emits registers either as hex strings or as raw
/// numbers depending on the field's origin, so deserialization accepts both.
pub mod hex_byte {
    use serde::de::{self, Deserializer, Unexpected};
    use serde::ser::Serializer;
    use serde::Deserialize;

    use super::{format_hex_byte, try_parse_hex_byte};

    pub fn serialize<S: Serializer>(value: &u8, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_hex_byte(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => u8::try_from(n)
                .map_err(|_| de::Error::invalid_value(Unexpected::Unsigned(n), &"a byte")),
            Raw::Text(s) => try_parse_hex_byte(&s)
                .ok_or_else(|| de::Error::invalid_value(Unexpected::Str(&s), &"a hex byte")),
        }
    }
}

/// Serde adapter for optional hex byte fields.
pub mod hex_byte_opt {
    use serde::de::Deserializer;
    use serde::ser::Serializer;
    use serde::Deserialize;
    use serde_json::Value;

    use super::{format_hex_byte, try_parse_hex_byte};

    pub fn serialize<S: Serializer>(value: &Option<u8>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&format_hex_byte(*v)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u8>, D::Error> {
        // Absent, null, numeric, and hex-string forms all occur in practice.
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::String(s)) => try_parse_hex_byte(&s),
            Some(Value::Number(n)) => n.as_u64().and_then(|n| u8::try_from(n).ok()),
            _ => None,
        })
    }
}

// ============================================================================
// FrequencyRegisters
// ============================================================================

/// The three CC1101 frequency control registers.
///
/// Carried on the wire as `0x`-prefixed hex strings. The derived megahertz
/// value is display-only; a frequency-to-register round trip is not defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyRegisters {
    /// Frequency control word, high byte.
    #[serde(with = "hex_byte", default = "defaults::freq2")]
    pub freq2: u8,
    /// Frequency control word, middle byte.
    #[serde(with = "hex_byte", default = "defaults::freq1")]
    pub freq1: u8,
    /// Frequency control word, low byte.
    #[serde(with = "hex_byte", default = "defaults::freq0")]
    pub freq0: u8,
}

// The firmware occasionally omits individual registers; missing fields fall
// back to the shipped defaults.
mod defaults {
    use super::DEFAULT_REGISTERS;

    pub const fn freq2() -> u8 {
        DEFAULT_REGISTERS.0
    }
    pub const fn freq1() -> u8 {
        DEFAULT_REGISTERS.1
    }
    pub const fn freq0() -> u8 {
        DEFAULT_REGISTERS.2
    }
}

impl FrequencyRegisters {
    /// Creates a register triple.
    #[inline]
    #[must_use]
    pub const fn new(freq2: u8, freq1: u8, freq0: u8) -> Self {
        Self {
            freq2,
            freq1,
            freq0,
        }
    }

    /// Computes the carrier frequency in megahertz.
    ///
    /// `((freq2 * 65536 + freq1 * 256 + freq0) * 26 MHz) / 2^16`, scaled to
    /// megahertz. Lossy in the reverse direction.
    #[must_use]
    pub fn mhz(&self) -> f64 {
        let word = f64::from(
            (u32::from(self.freq2) << 16) | (u32::from(self.freq1) << 8) | u32::from(self.freq0),
        );
        word * CRYSTAL_HZ / 65536.0 / 1_000_000.0
    }
}

impl Default for FrequencyRegisters {
    fn default() -> Self {
        let (freq2, freq1, freq0) = DEFAULT_REGISTERS;
        Self::new(freq2, freq1, freq0)
    }
}

impl fmt::Display for FrequencyRegisters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3} MHz", self.mhz())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_byte_valid() {
        assert_eq!(parse_hex_byte("0x1F", 0), 31);
        assert_eq!(parse_hex_byte("0x00", 9), 0);
        assert_eq!(parse_hex_byte("ff", 0), 255);
        assert_eq!(parse_hex_byte("0XAB", 0), 0xab);
    }

    #[test]
    fn test_parse_hex_byte_degrades_to_default() {
        assert_eq!(parse_hex_byte("", 5), 5);
        assert_eq!(parse_hex_byte("zz", 5), 5);
        assert_eq!(parse_hex_byte("0x", 7), 7);
        assert_eq!(parse_hex_byte("0x100", 7), 7);
    }

    #[test]
    fn test_format_hex_byte() {
        assert_eq!(format_hex_byte(0x0a), "0x0a");
        assert_eq!(format_hex_byte(0xff), "0xff");
        assert_eq!(format_hex_byte(0), "0x00");
    }

    #[test]
    fn test_default_frequency() {
        let freq = FrequencyRegisters::default();
        assert_eq!(freq, FrequencyRegisters::new(0x21, 0x71, 0x7a));
        assert!((freq.mhz() - 869.525).abs() < 0.001);
        assert_eq!(freq.to_string(), "869.525 MHz");
    }

    #[test]
    fn test_zero_registers() {
        let freq = FrequencyRegisters::new(0, 0, 0);
        assert_eq!(freq.mhz(), 0.0);
    }

    #[test]
    fn test_serde_hex_strings() {
        let freq = FrequencyRegisters::default();
        let json = serde_json::to_string(&freq).expect("serialize");
        assert_eq!(json, r#"{"freq2":"0x21","freq1":"0x71","freq0":"0x7a"}"#);

        let parsed: FrequencyRegisters = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, freq);
    }

    #[test]
    fn test_serde_partial_object_uses_defaults() {
        let parsed: FrequencyRegisters =
            serde_json::from_str(r#"{"freq2":"0x10"}"#).expect("parse");
        assert_eq!(parsed, FrequencyRegisters::new(0x10, 0x71, 0x7a));
    }

    #[test]
    fn test_serde_accepts_numbers() {
        let parsed: FrequencyRegisters =
            serde_json::from_str(r#"{"freq2":33,"freq1":113,"freq0":122}"#).expect("parse");
        assert_eq!(parsed, FrequencyRegisters::default());
    }
}
