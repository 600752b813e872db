//! Flight metadata.
//!
//! A [`FlightMeta`] is filled in while a parser reads the file header and is
//! then copied once per output segment.

use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Broad airframe category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AirframeKind {
    /// Conventional fixed-wing aircraft.
    #[default]
    FixedWing,
    /// Helicopter.
    Rotorcraft,
    /// Uncrewed fixed-wing aircraft.
    UasFixedWing,
    /// Uncrewed multirotor.
    UasRotorcraft,
}

impl AirframeKind {
    /// Whether this is an uncrewed airframe family.
    #[must_use]
    pub fn is_uas(self) -> bool {
        matches!(self, Self::UasFixedWing | Self::UasRotorcraft)
    }
}

impl std::fmt::Display for AirframeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FixedWing => write!(f, "Fixed Wing"),
            Self::Rotorcraft => write!(f, "Rotorcraft"),
            Self::UasFixedWing => write!(f, "UAS Fixed Wing"),
            Self::UasRotorcraft => write!(f, "UAS Rotorcraft"),
        }
    }
}

/// Airframe name and category.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Airframe {
    /// Canonical airframe name.
    pub name: String,
    /// Airframe category.
    pub kind: AirframeKind,
}

impl Airframe {
    /// Create an airframe.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: AirframeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Bit set describing problems found while processing a flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ProcessingStatus(u32);

impl ProcessingStatus {
    /// Nothing went wrong.
    pub const OK: Self = Self(0);
    /// At least one recoverable problem was recorded.
    pub const WARNING: Self = Self(1);
    /// No start time could be established.
    pub const NO_START_TIME: Self = Self(1 << 1);
    /// No end time could be established.
    pub const NO_END_TIME: Self = Self(1 << 2);
    /// No airport was visited.
    pub const NO_AIRPORT: Self = Self(1 << 3);

    /// Raw bits.
    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set.
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the flight carries any warning.
    #[must_use]
    pub fn is_warning(self) -> bool {
        self.0 != 0
    }
}

impl BitOr for ProcessingStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ProcessingStatus {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Identifying attributes of one flight.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlightMeta {
    /// Owning fleet.
    pub fleet_id: i64,
    /// User who uploaded the archive.
    pub uploader_id: i64,
    /// Upload the file came from.
    pub upload_id: i64,
    /// Start timestamp (`yyyy-MM-dd HH:mm:ss±HH:mm`).
    pub start_datetime: Option<String>,
    /// End timestamp.
    pub end_datetime: Option<String>,
    /// Content hash used for deduplication.
    pub md5_hash: String,
    /// Recorder system id.
    pub system_id: String,
    /// File name, with a segment suffix where a file was split.
    pub filename: String,
    /// Suggested tail number.
    pub suggested_tail_number: Option<String>,
    /// Resolved airframe.
    pub airframe: Airframe,
    /// Processing problems.
    pub status: ProcessingStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_airframe_kind_display() {
        assert_eq!(AirframeKind::FixedWing.to_string(), "Fixed Wing");
        assert_eq!(AirframeKind::UasRotorcraft.to_string(), "UAS Rotorcraft");
    }

    #[test]
    fn test_airframe_kind_is_uas() {
        assert!(AirframeKind::UasFixedWing.is_uas());
        assert!(AirframeKind::UasRotorcraft.is_uas());
        assert!(!AirframeKind::FixedWing.is_uas());
        assert!(!AirframeKind::Rotorcraft.is_uas());
    }

    #[test]
    fn test_status_bit_or() {
        let mut status = ProcessingStatus::OK;
        assert!(!status.is_warning());
        status |= ProcessingStatus::WARNING;
        status |= ProcessingStatus::NO_START_TIME;
        assert!(status.contains(ProcessingStatus::WARNING));
        assert!(status.contains(ProcessingStatus::NO_START_TIME));
        assert!(!status.contains(ProcessingStatus::NO_END_TIME));
        assert_eq!(status.bits(), 0b11);
        assert_eq!(
            ProcessingStatus::NO_END_TIME | ProcessingStatus::NO_AIRPORT,
            ProcessingStatus(0b1100)
        );
    }

    #[test]
    fn test_meta_clone_is_independent() {
        let template = FlightMeta {
            filename: "log.csv".to_string(),
            ..FlightMeta::default()
        };
        let mut copy = template.clone();
        copy.filename = "log.csv:0-10".to_string();
        assert_eq!(template.filename, "log.csv");
    }
}
