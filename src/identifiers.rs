//! Type-safe identifiers.
//!
//! Newtype wrappers keep request ids and device addresses from being mixed
//! with plain strings at compile time, and pin down the canonical wire form
//! of each.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::Error;

// ============================================================================
// RequestId
// ============================================================================

/// Unique identifier correlating a command request with its response.
///
/// Generated per request as a v4 UUID; collision probability over a
/// connection's lifetime is negligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generates a fresh random id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// DeviceAddress
// ============================================================================

/// A 24-bit Elero device address.
///
/// Parsed case-insensitively from an optionally `0x`-prefixed hex string;
/// stored and serialized in the canonical form: lower-case, `0x` prefix,
/// six hex digits. Equality and hashing operate on the canonical form, so
/// `0xABCDEF` and `abcdef` compare equal after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    /// Parses an address, canonicalizing case and prefix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the input is not 1-6 hex digits.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.is_empty() || digits.len() > 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(Error::invalid_argument(format!(
                "invalid device address: {s:?}"
            )));
        }

        let value = u32::from_str_radix(digits, 16).map_err(|_| {
            Error::invalid_argument(format!("invalid device address: {s:?}"))
        })?;

        Ok(Self(format!("0x{value:06x}")))
    }

    /// Returns the canonical string form (`0x` + six lower-case hex digits).
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DeviceAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DeviceAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Tests
// ============================================================================
