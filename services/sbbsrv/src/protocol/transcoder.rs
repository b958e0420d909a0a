//! Module value transcoding
//!
//! Maps a logical value to the flap position a module type understands. The
//! mapping is total: anything a module cannot show lands on its blank flap.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Alphanumeric modules: A-Z, '/', '-', 1-9, '.', then blank
pub const ALPHANUMERIC_BLANK: u8 = 38;
/// Hour modules: 0-23, then blank
pub const HOUR_BLANK: u8 = 24;
/// Minute modules: the blank flap sits between :59 and :00
pub const MINUTE_BLANK: u8 = 29;

/// Kind of display module, selects the transcoding rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleType {
    Alphanumeric,
    Hour,
    Minute,
    GenericSmallRange,
    GenericLargeRange,
}

impl ModuleType {
    /// Position code for `value`
    ///
    /// For alphanumeric modules `value` is a character code.
    pub fn position(self, value: i64) -> u8 {
        match self {
            ModuleType::Alphanumeric => alphanumeric_position(value),
            ModuleType::Hour => hour_position(value),
            ModuleType::Minute => minute_position(value),
            ModuleType::GenericSmallRange | ModuleType::GenericLargeRange => {
                value.clamp(0, i64::from(u8::MAX)) as u8
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModuleType::Alphanumeric => "alphanumeric",
            ModuleType::Hour => "hour",
            ModuleType::Minute => "minute",
            ModuleType::GenericSmallRange => "generic_small_range",
            ModuleType::GenericLargeRange => "generic_large_range",
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "alphanumeric" | "alpha" => Ok(ModuleType::Alphanumeric),
            "hour" => Ok(ModuleType::Hour),
            "minute" => Ok(ModuleType::Minute),
            "generic_small_range" | "small" => Ok(ModuleType::GenericSmallRange),
            "generic_large_range" | "large" => Ok(ModuleType::GenericLargeRange),
            other => Err(format!("Unknown module type: {other}")),
        }
    }
}

fn alphanumeric_position(value: i64) -> u8 {
    let Ok(byte) = u8::try_from(value) else {
        return ALPHANUMERIC_BLANK;
    };
    match byte {
        b'A'..=b'Z' => byte - b'A',
        b'/' => 26,
        b'-' => 27,
        b'1'..=b'9' => 28 + (byte - b'1'),
        b'.' => 37,
        _ => ALPHANUMERIC_BLANK,
    }
}

fn hour_position(value: i64) -> u8 {
    match value {
        0..=23 => value as u8,
        _ => HOUR_BLANK,
    }
}

// The band starts at :31, wraps through the blank flap, then :00 to :30
fn minute_position(value: i64) -> u8 {
    match value {
        31..=59 => (value - 31) as u8,
        0..=30 => (value + 30) as u8,
        _ => MINUTE_BLANK,
    }
}
