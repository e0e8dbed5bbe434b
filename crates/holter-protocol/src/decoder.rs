//! Streaming line protocol decoder
//!
//! The recorder reports everything as newline-terminated ASCII lines over
//! the radio link. Chunks arrive at arbitrary boundaries, so the decoder
//! keeps the unterminated tail of the stream in an accumulator and emits
//! one [`DeviceEvent`] per complete, non-empty line.
//!
//! # Format
//! - `LIVE:<int>` - one waveform sample
//! - `DEBUG_FS:<text>` - reported sampling frequency
//! - `<id>|<sector>|<byteCount>[|<timestamp>]` - stored session metadata
//!   (the listing header containing `ID |` is excluded)
//! - `CHIP_ERASE_COMPLETE`, `BULK_TRANSFER_START`, `BULK_TRANSFER_END`
//! - anything else decodes to [`DeviceEvent::Unrecognized`]

use crate::error::ParseError;
use crate::event::{DeviceEvent, SessionEntry};

/// Maximum bytes retained while waiting for a line terminator
///
/// Far above any valid line length; only a stream of terminator-free
/// garbage can hit it.
const MAX_PENDING_LEN: usize = 4096;

/// Listing header fragment that disqualifies a line from session parsing
const LISTING_HEADER: &str = "ID |";

/// Streaming decoder for the recorder's line protocol
///
/// One instance per connection, driven from a single stream of arriving
/// chunks with calls never overlapping. Holds no resources beyond the
/// accumulator; dropping it on disconnect is sufficient cleanup.
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    /// Create a new decoder with an empty accumulator
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(128),
        }
    }

    /// Feed one transport chunk and drain every event it completes
    ///
    /// Returns the events for all newline-terminated lines now available,
    /// in stream order. The unterminated remainder (possibly empty) stays
    /// in the accumulator for the next call. Never fails: malformed lines
    /// are dropped with a warning and decoding continues.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<DeviceEvent> {
        self.push_bytes(chunk);

        let mut events = Vec::new();
        while let Some(event) = self.next_event() {
            events.push(event);
        }
        events
    }

    /// Push raw bytes into the accumulator without draining events
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // Terminator-free garbage guard: keep only the tail. Never applies
        // while a complete line is waiting to be drained.
        if self.buffer.len() > MAX_PENDING_LEN && !self.buffer.contains(&b'\n') {
            let start = self.buffer.len() - MAX_PENDING_LEN / 2;
            self.buffer.drain(..start);
        }
    }

    /// Try to extract the next event from the accumulator
    ///
    /// Consumes complete lines until one classifies to an event or no
    /// terminator remains. Empty lines and malformed lines are skipped.
    pub fn next_event(&mut self) -> Option<DeviceEvent> {
        loop {
            let term_pos = self.buffer.iter().position(|&b| b == b'\n')?;

            let line_bytes: Vec<u8> = self.buffer.drain(..=term_pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]);
            let line = line.trim();

            if line.is_empty() {
                continue;
            }

            match classify_line(line) {
                Ok(event) => {
                    if let DeviceEvent::Unrecognized { raw } = &event {
                        tracing::debug!("device output: {}", raw);
                    }
                    return Some(event);
                }
                Err(e) => {
                    tracing::warn!("dropping malformed line {:?}: {}", line, e);
                }
            }
        }
    }

    /// Bytes received since the last line terminator
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Discard the accumulator
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify a complete, trimmed, non-empty line
///
/// First match wins; the order here is the protocol's priority order.
fn classify_line(line: &str) -> Result<DeviceEvent, ParseError> {
    if let Some(payload) = line.strip_prefix("LIVE:") {
        let payload = payload.trim();
        let value = payload
            .parse::<i32>()
            .map_err(|_| ParseError::InvalidSample(payload.into()))?;
        return Ok(DeviceEvent::LiveSample { value });
    }

    if let Some(hz) = line.strip_prefix("DEBUG_FS:") {
        return Ok(DeviceEvent::SampleRateReport {
            hz: hz.trim().to_string(),
        });
    }

    if line.contains('|') && !line.contains(LISTING_HEADER) {
        return parse_session_entry(line).map(DeviceEvent::SessionEntry);
    }

    match line {
        "CHIP_ERASE_COMPLETE" => Ok(DeviceEvent::EraseComplete),
        "BULK_TRANSFER_START" => Ok(DeviceEvent::BulkTransferStart),
        "BULK_TRANSFER_END" => Ok(DeviceEvent::BulkTransferEnd),
        other => Ok(DeviceEvent::Unrecognized {
            raw: other.to_string(),
        }),
    }
}

/// Parse a pipe-delimited session listing line
///
/// Field 1 (the flash sector) is reported by the device but unused here.
/// An absent or empty timestamp field becomes `"N/A"`.
fn parse_session_entry(line: &str) -> Result<SessionEntry, ParseError> {
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();

    if fields.len() < 3 {
        return Err(ParseError::TruncatedSessionEntry {
            fields: fields.len(),
        });
    }

    let timestamp = match fields.get(3) {
        Some(t) if !t.is_empty() => (*t).to_string(),
        _ => "N/A".to_string(),
    };

    Ok(SessionEntry {
        id: fields[0].to_string(),
        byte_count: fields[2].to_string(),
        timestamp,
    })
}
