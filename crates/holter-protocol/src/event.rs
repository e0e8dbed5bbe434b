//! Decoded device events
//!
//! This module provides the `DeviceEvent` enum, the normalized
//! representation of everything the recorder reports over the line
//! protocol. One complete line decodes to at most one event.

use std::fmt;

/// Metadata for one recording stored in the device's flash
///
/// Fields are carried as the device sent them; the dashboard decides how to
/// render them. `timestamp` is `"N/A"` when the device did not report one.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionEntry {
    /// Session identifier
    pub id: String,
    /// Recording length in bytes
    pub byte_count: String,
    /// Capture timestamp, or `"N/A"`
    pub timestamp: String,
}

/// One decoded report from the recorder
///
/// Events are immutable values produced by [`LineDecoder`](crate::LineDecoder)
/// and consumed once by the presentation layer. No event carries cross-line
/// state: bulk-transfer bracketing and session ordering are the consumer's
/// responsibility.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceEvent {
    /// One live waveform sample: `LIVE:<int>`
    LiveSample { value: i32 },
    /// Reported sampling frequency: `DEBUG_FS:<text>`
    SampleRateReport { hz: String },
    /// One stored session's metadata: `<id>|<sector>|<byteCount>[|<timestamp>]`
    SessionEntry(SessionEntry),
    /// Flash erase finished: `CHIP_ERASE_COMPLETE`
    EraseComplete,
    /// Start of a multi-session download: `BULK_TRANSFER_START`
    BulkTransferStart,
    /// End of a multi-session download: `BULK_TRANSFER_END`
    BulkTransferEnd,
    /// Free-form device output that matched no report pattern
    Unrecognized { raw: String },
}

impl DeviceEvent {
    /// Returns true for the bulk transfer start/end markers
    pub fn is_transfer_marker(&self) -> bool {
        matches!(self, Self::BulkTransferStart | Self::BulkTransferEnd)
    }

    /// Returns true if this event updates the live view (sample or rate)
    pub fn is_live(&self) -> bool {
        matches!(self, Self::LiveSample { .. } | Self::SampleRateReport { .. })
    }

    /// Extract the sample value if this is a live sample
    pub fn sample_value(&self) -> Option<i32> {
        match self {
            Self::LiveSample { value } => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LiveSample { value } => write!(f, "sample {value}"),
            Self::SampleRateReport { hz } => write!(f, "sample rate {hz} Hz"),
            Self::SessionEntry(entry) => write!(
                f,
                "session #{} ({} bytes, {})",
                entry.id, entry.byte_count, entry.timestamp
            ),
            Self::EraseComplete => write!(f, "erase complete"),
            Self::BulkTransferStart => write!(f, "bulk transfer start"),
            Self::BulkTransferEnd => write!(f, "bulk transfer end"),
            Self::Unrecognized { raw } => write!(f, "device output: {raw}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_markers() {
        assert!(DeviceEvent::BulkTransferStart.is_transfer_marker());
        assert!(DeviceEvent::BulkTransferEnd.is_transfer_marker());
        assert!(!DeviceEvent::EraseComplete.is_transfer_marker());
    }

    #[test]
    fn test_sample_value() {
        assert_eq!(DeviceEvent::LiveSample { value: 1234 }.sample_value(), Some(1234));
        assert_eq!(DeviceEvent::EraseComplete.sample_value(), None);
    }

    #[test]
    fn test_display_session() {
        let event = DeviceEvent::SessionEntry(SessionEntry {
            id: "7".into(),
            byte_count: "1024".into(),
            timestamp: "N/A".into(),
        });
        assert_eq!(event.to_string(), "session #7 (1024 bytes, N/A)");
    }
}
