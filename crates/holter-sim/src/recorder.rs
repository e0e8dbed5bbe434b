//! Virtual recorder simulation
//!
//! Provides a simulated Holter recorder that answers directives with
//! protocol-accurate output lines and streams a synthetic ECG waveform.

use std::collections::VecDeque;

use holter_protocol::RecorderCommand;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Flash sector size used when reporting session start sectors
const SECTOR_BYTES: u32 = 4096;

/// Samples emitted per payload line during a session export
const EXPORT_SAMPLES_PER_LINE: usize = 8;

/// Cap on samples dumped per exported session
const EXPORT_SAMPLE_CAP: u32 = 256;

/// One recording stored in the simulated flash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    /// Session identifier
    pub id: u32,
    /// Recording length in bytes (two bytes per sample)
    pub byte_count: u32,
    /// Capture timestamp; omitted from the listing line when absent
    pub timestamp: Option<String>,
}

/// Configuration for creating a virtual recorder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualRecorderConfig {
    /// Display name/identifier
    pub id: String,
    /// Sampling frequency reported and used for live streaming
    pub sample_rate_hz: u32,
    /// Sessions pre-loaded into the simulated flash
    pub sessions: Vec<StoredSession>,
}

impl Default for VirtualRecorderConfig {
    fn default() -> Self {
        Self {
            id: "Virtual Recorder".to_string(),
            sample_rate_hz: 250,
            sessions: vec![
                StoredSession {
                    id: 1,
                    byte_count: 92_160,
                    timestamp: Some("2024-01-01T08:15".to_string()),
                },
                StoredSession {
                    id: 2,
                    byte_count: 30_720,
                    timestamp: None,
                },
            ],
        }
    }
}

/// A simulated recorder that generates protocol-accurate output
///
/// Inbound directive bytes go through [`process_input`](Self::process_input);
/// everything the device would transmit accumulates in a pending-output
/// queue drained with [`take_output`](Self::take_output).
#[derive(Debug)]
pub struct VirtualRecorder {
    /// Identifier for logging
    id: String,
    /// Sampling frequency in Hz
    sample_rate_hz: u32,
    /// Sessions stored in the simulated flash
    sessions: Vec<StoredSession>,
    /// Whether live samples are being generated
    streaming: bool,
    /// Position in the synthetic heartbeat cycle
    phase: u32,
    /// Unterminated tail of the inbound directive stream
    input: Vec<u8>,
    /// Pending output lines (terminator included)
    pending_output: VecDeque<Vec<u8>>,
}

impl VirtualRecorder {
    /// Create a new virtual recorder with default sessions
    pub fn new(id: impl Into<String>, sample_rate_hz: u32) -> Self {
        Self::from_config(VirtualRecorderConfig {
            id: id.into(),
            sample_rate_hz,
            ..Default::default()
        })
    }

    /// Create a virtual recorder from configuration
    pub fn from_config(config: VirtualRecorderConfig) -> Self {
        Self {
            id: config.id,
            sample_rate_hz: config.sample_rate_hz,
            sessions: config.sessions,
            streaming: false,
            phase: 0,
            input: Vec::new(),
            pending_output: VecDeque::new(),
        }
    }

    /// Get the recorder's identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the sampling frequency in Hz
    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    /// Sessions currently stored in the simulated flash
    pub fn sessions(&self) -> &[StoredSession] {
        &self.sessions
    }

    /// Whether the live stream is running
    pub fn streaming(&self) -> bool {
        self.streaming
    }

    /// Start or stop the live stream
    pub fn set_streaming(&mut self, on: bool) {
        self.streaming = on;
    }

    /// Process inbound directive bytes
    ///
    /// Accumulates until a line terminator, then dispatches each complete
    /// directive. Returns true if at least one directive was dispatched.
    pub fn process_input(&mut self, data: &[u8]) -> bool {
        self.input.extend_from_slice(data);

        let mut dispatched = false;
        while let Some(pos) = self.input.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.input.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            self.dispatch(line);
            dispatched = true;
        }
        dispatched
    }

    /// Dispatch one complete directive line
    fn dispatch(&mut self, line: &str) {
        debug!("recorder {} received directive {:?}", self.id, line);
        match parse_directive(line) {
            Some(RecorderCommand::ListSessions) => {
                self.queue_listing();
                self.streaming = true;
            }
            Some(RecorderCommand::ExportSession { id }) => self.queue_export(id),
            Some(RecorderCommand::EraseAll) => self.queue_erase(),
            Some(RecorderCommand::Raw(_)) | None => {
                self.queue_line(format!("ERR unknown directive: {line}"));
            }
        }
    }

    /// Queue the sample-rate report, listing header, and one entry per session
    fn queue_listing(&mut self) {
        self.queue_line(format!("DEBUG_FS:{}", self.sample_rate_hz));
        self.queue_line("ID | BYTES | TIME");

        let mut sector = 0u32;
        let sessions = self.sessions.clone();
        for session in &sessions {
            match &session.timestamp {
                Some(ts) => self.queue_line(format!(
                    "{} | {} | {} | {}",
                    session.id, sector, session.byte_count, ts
                )),
                None => self.queue_line(format!(
                    "{} | {} | {}",
                    session.id, sector, session.byte_count
                )),
            }
            sector += session.byte_count.div_ceil(SECTOR_BYTES);
        }
    }

    /// Queue a bracketed payload dump for one session
    fn queue_export(&mut self, id: u32) {
        let Some(session) = self.sessions.iter().find(|s| s.id == id).cloned() else {
            self.queue_line(format!("ERR no such session: {id}"));
            return;
        };

        self.queue_line("BULK_TRANSFER_START");

        let total = (session.byte_count / 2).min(EXPORT_SAMPLE_CAP);
        let mut offset = 0u32;
        while offset < total {
            let count = EXPORT_SAMPLES_PER_LINE.min((total - offset) as usize);
            let samples: Vec<String> = (0..count)
                .map(|i| synth_sample(offset + i as u32).to_string())
                .collect();
            self.queue_line(format!("{:06}: {}", offset * 2, samples.join(" ")));
            offset += count as u32;
        }

        self.queue_line("BULK_TRANSFER_END");
    }

    /// Wipe the simulated flash and queue the completion marker
    fn queue_erase(&mut self) {
        self.sessions.clear();
        self.queue_line("CHIP_ERASE_COMPLETE");
    }

    /// Queue one live sample line, advancing the heartbeat cycle
    ///
    /// Does nothing unless the stream has been started with a `read`
    /// directive or [`set_streaming`](Self::set_streaming).
    pub fn emit_live_sample(&mut self) {
        if !self.streaming {
            return;
        }
        let value = synth_sample(self.phase);
        self.phase = self.phase.wrapping_add(1);
        self.queue_line(format!("LIVE:{value}"));
    }

    /// Queue a single output line, appending the terminator
    fn queue_line(&mut self, line: impl AsRef<str>) {
        let mut bytes = line.as_ref().as_bytes().to_vec();
        bytes.push(b'\n');
        self.pending_output.push_back(bytes);
    }

    /// Take the next pending output line
    pub fn take_output(&mut self) -> Option<Vec<u8>> {
        self.pending_output.pop_front()
    }

    /// Check if there is pending output
    pub fn has_output(&self) -> bool {
        !self.pending_output.is_empty()
    }

    /// Get the number of pending output lines
    pub fn output_count(&self) -> usize {
        self.pending_output.len()
    }

    /// Clear all pending output
    pub fn clear_output(&mut self) {
        self.pending_output.clear();
    }
}

/// Parse an app-to-device directive line
fn parse_directive(line: &str) -> Option<RecorderCommand> {
    if line == "read" {
        return Some(RecorderCommand::ListSessions);
    }
    if let Some(arg) = line.strip_prefix("read ") {
        let id = arg.trim().parse::<u32>().ok()?;
        return Some(RecorderCommand::ExportSession { id });
    }
    if line == "erase" {
        return Some(RecorderCommand::EraseAll);
    }
    None
}

/// Synthetic ECG sample for one position in the stream
///
/// A crude PQRST shape on a 1200-count baseline, one beat per 200 samples
/// (75 bpm at 250 Hz), staying inside the 1100-1400 ADC band the recorder
/// produces.
fn synth_sample(phase: u32) -> i32 {
    const BASELINE: i32 = 1200;
    const BEAT_LEN: u32 = 200;

    let t = phase % BEAT_LEN;
    let offset = match t {
        // P wave
        30..=49 => {
            let x = (t - 30) as f32 / 20.0;
            (30.0 * (x * std::f32::consts::PI).sin()) as i32
        }
        // Q dip
        70..=75 => -40,
        // R spike
        76..=83 => {
            let x = (t - 76) as f32 / 8.0;
            (180.0 * (x * std::f32::consts::PI).sin()) as i32
        }
        // S dip
        84..=90 => -60,
        // T wave
        120..=159 => {
            let x = (t - 120) as f32 / 40.0;
            (50.0 * (x * std::f32::consts::PI).sin()) as i32
        }
        _ => 0,
    };

    // Slow baseline drift, one cycle per 1000 samples
    let drift = (phase as f32 / 1000.0 * std::f32::consts::TAU).sin() * 8.0;

    BASELINE + offset + drift as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use holter_protocol::{DeviceEvent, LineDecoder};

    fn drain_to_events(recorder: &mut VirtualRecorder) -> Vec<DeviceEvent> {
        let mut decoder = LineDecoder::new();
        let mut events = Vec::new();
        while let Some(out) = recorder.take_output() {
            events.extend(decoder.feed(&out));
        }
        events
    }

    #[test]
    fn test_create_recorder() {
        let recorder = VirtualRecorder::new("Test Recorder", 250);
        assert_eq!(recorder.id(), "Test Recorder");
        assert_eq!(recorder.sample_rate_hz(), 250);
        assert!(!recorder.streaming());
        assert!(!recorder.has_output());
    }

    #[test]
    fn test_read_produces_listing_and_starts_stream() {
        let mut recorder = VirtualRecorder::new("Test", 250);
        assert!(recorder.process_input(b"read\n"));
        assert!(recorder.streaming());

        let events = drain_to_events(&mut recorder);

        assert_eq!(
            events[0],
            DeviceEvent::SampleRateReport { hz: "250".into() }
        );
        // The header line is free-form output, never a session entry
        assert!(matches!(events[1], DeviceEvent::Unrecognized { .. }));

        let entries: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                DeviceEvent::SessionEntry(entry) => Some(entry),
                _ => None,
            })
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "1");
        assert_eq!(entries[0].timestamp, "2024-01-01T08:15");
        assert_eq!(entries[1].id, "2");
        assert_eq!(entries[1].timestamp, "N/A");
    }

    #[test]
    fn test_partial_directive_accumulates() {
        let mut recorder = VirtualRecorder::new("Test", 250);
        assert!(!recorder.process_input(b"re"));
        assert!(!recorder.has_output());
        assert!(recorder.process_input(b"ad\n"));
        assert!(recorder.has_output());
    }

    #[test]
    fn test_erase_wipes_sessions() {
        let mut recorder = VirtualRecorder::new("Test", 250);
        recorder.process_input(b"erase\n");

        assert!(recorder.sessions().is_empty());
        let events = drain_to_events(&mut recorder);
        assert_eq!(events, vec![DeviceEvent::EraseComplete]);
    }

    #[test]
    fn test_export_is_bracketed() {
        let mut recorder = VirtualRecorder::new("Test", 250);
        recorder.process_input(b"read 1\n");

        let events = drain_to_events(&mut recorder);
        assert_eq!(events.first(), Some(&DeviceEvent::BulkTransferStart));
        assert_eq!(events.last(), Some(&DeviceEvent::BulkTransferEnd));
        // Payload lines surface as free-form output between the markers
        assert!(events[1..events.len() - 1]
            .iter()
            .all(|e| matches!(e, DeviceEvent::Unrecognized { .. })));
    }

    #[test]
    fn test_export_unknown_session() {
        let mut recorder = VirtualRecorder::new("Test", 250);
        recorder.process_input(b"read 99\n");

        let events = drain_to_events(&mut recorder);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], DeviceEvent::Unrecognized { raw } if raw.contains("99")));
    }

    #[test]
    fn test_unknown_directive_answers_error_line() {
        let mut recorder = VirtualRecorder::new("Test", 250);
        recorder.process_input(b"reboot\n");

        let events = drain_to_events(&mut recorder);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], DeviceEvent::Unrecognized { raw } if raw.contains("reboot")));
    }

    #[test]
    fn test_no_live_samples_before_read() {
        let mut recorder = VirtualRecorder::new("Test", 250);
        recorder.emit_live_sample();
        assert!(!recorder.has_output());
    }

    #[test]
    fn test_live_samples_stay_in_band() {
        let mut recorder = VirtualRecorder::new("Test", 250);
        recorder.set_streaming(true);
        for _ in 0..1000 {
            recorder.emit_live_sample();
        }

        let events = drain_to_events(&mut recorder);
        assert_eq!(events.len(), 1000);
        for event in events {
            let value = event.sample_value().unwrap();
            assert!((1100..=1400).contains(&value), "out of band: {value}");
        }
    }

    mod listing_roundtrip {
        use super::*;
        use proptest::prelude::*;

        fn stored_session() -> impl Strategy<Value = StoredSession> {
            (
                1u32..1000,
                2u32..200_000,
                prop::option::of("[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}"),
            )
                .prop_map(|(id, byte_count, timestamp)| StoredSession {
                    id,
                    byte_count,
                    timestamp,
                })
        }

        proptest! {
            #[test]
            fn any_listing_decodes_to_matching_entries(
                sessions in prop::collection::vec(stored_session(), 0..8),
            ) {
                let mut recorder = VirtualRecorder::from_config(VirtualRecorderConfig {
                    id: "Prop".into(),
                    sample_rate_hz: 250,
                    sessions: sessions.clone(),
                });
                recorder.process_input(b"read\n");

                let events = drain_to_events(&mut recorder);
                let entries: Vec<_> = events
                    .iter()
                    .filter_map(|e| match e {
                        DeviceEvent::SessionEntry(entry) => Some(entry),
                        _ => None,
                    })
                    .collect();

                prop_assert_eq!(entries.len(), sessions.len());
                for (entry, session) in entries.iter().zip(&sessions) {
                    prop_assert_eq!(&entry.id, &session.id.to_string());
                    prop_assert_eq!(&entry.byte_count, &session.byte_count.to_string());
                    let expected_ts = session.timestamp.clone()
                        .unwrap_or_else(|| "N/A".to_string());
                    prop_assert_eq!(&entry.timestamp, &expected_ts);
                }
            }
        }
    }
}
