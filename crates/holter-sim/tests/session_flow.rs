//! Integration tests for the virtual recorder
//!
//! These tests drive the recorder task end-to-end over a duplex stream:
//! encoded app commands in, decoded device events out. They verify:
//! - The sync flow (listing + live stream start)
//! - The erase flow (wipe + completion marker + empty re-listing)
//! - The bulk export flow (bracketed payload)

use std::time::Duration;

use holter_protocol::{DeviceEvent, EncodeCommand, LineDecoder, RecorderCommand};
use holter_sim::{
    run_virtual_recorder_task, StoredSession, VirtualRecorder, VirtualRecorderCommand,
    VirtualRecorderConfig,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    pub struct Harness {
        pub stream: DuplexStream,
        pub decoder: LineDecoder,
        pub cmd_tx: mpsc::Sender<VirtualRecorderCommand>,
        pub task: tokio::task::JoinHandle<std::io::Result<()>>,
    }

    /// Spawn a recorder task wired to an app-side duplex stream
    pub fn start(config: VirtualRecorderConfig) -> Harness {
        let (stream, recorder_stream) = tokio::io::duplex(8192);
        let recorder = VirtualRecorder::from_config(config);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let task = tokio::spawn(run_virtual_recorder_task(recorder_stream, recorder, cmd_rx));

        Harness {
            stream,
            decoder: LineDecoder::new(),
            cmd_tx,
            task,
        }
    }

    /// One session pre-loaded, live stream rate 250 Hz
    pub fn single_session_config() -> VirtualRecorderConfig {
        VirtualRecorderConfig {
            id: "Flow Test".into(),
            sample_rate_hz: 250,
            sessions: vec![StoredSession {
                id: 7,
                byte_count: 1024,
                timestamp: Some("2024-01-01T00:00".into()),
            }],
        }
    }

    impl Harness {
        /// Send one encoded command to the recorder
        pub async fn send(&mut self, cmd: RecorderCommand) {
            self.stream.write_all(&cmd.encode()).await.unwrap();
        }

        /// Read and decode until the predicate is satisfied
        pub async fn events_until<F>(&mut self, mut done: F) -> Vec<DeviceEvent>
        where
            F: FnMut(&[DeviceEvent]) -> bool,
        {
            let mut events = Vec::new();
            let mut buf = [0u8; 512];
            while !done(&events) {
                let n = tokio::time::timeout(Duration::from_secs(2), self.stream.read(&mut buf))
                    .await
                    .expect("timed out waiting for recorder output")
                    .expect("stream read failed");
                assert!(n > 0, "recorder stream closed early");
                events.extend(self.decoder.feed(&buf[..n]));
            }
            events
        }

        pub async fn shutdown(self) {
            let _ = self.cmd_tx.send(VirtualRecorderCommand::Shutdown).await;
            let _ = self.task.await;
        }
    }

    pub fn session_entries(events: &[DeviceEvent]) -> Vec<holter_protocol::SessionEntry> {
        events
            .iter()
            .filter_map(|e| match e {
                DeviceEvent::SessionEntry(entry) => Some(entry.clone()),
                _ => None,
            })
            .collect()
    }
}

// ============================================================================
// Sync Flow
// ============================================================================

#[tokio::test]
async fn sync_flow_lists_sessions_then_streams() {
    let mut harness = helpers::start(helpers::single_session_config());

    harness.send(RecorderCommand::ListSessions).await;

    let events = harness
        .events_until(|events| {
            !helpers::session_entries(events).is_empty()
                && events
                    .iter()
                    .filter(|e| matches!(e, DeviceEvent::LiveSample { .. }))
                    .count()
                    >= 5
        })
        .await;

    // Rate report arrives before the listing
    assert!(matches!(
        events[0],
        DeviceEvent::SampleRateReport { ref hz } if hz == "250"
    ));

    let entries = helpers::session_entries(&events);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, "7");
    assert_eq!(entries[0].byte_count, "1024");
    assert_eq!(entries[0].timestamp, "2024-01-01T00:00");

    // Live samples only begin after the listing completes
    let first_sample = events
        .iter()
        .position(|e| matches!(e, DeviceEvent::LiveSample { .. }))
        .unwrap();
    let last_entry = events
        .iter()
        .rposition(|e| matches!(e, DeviceEvent::SessionEntry(_)))
        .unwrap();
    assert!(first_sample > last_entry);

    harness.shutdown().await;
}

// ============================================================================
// Erase Flow
// ============================================================================

#[tokio::test]
async fn erase_flow_completes_and_relisting_is_empty() {
    let mut harness = helpers::start(helpers::single_session_config());

    harness.send(RecorderCommand::EraseAll).await;
    let events = harness
        .events_until(|events| events.contains(&DeviceEvent::EraseComplete))
        .await;
    assert!(events.contains(&DeviceEvent::EraseComplete));

    // Re-sync the way the dashboard does after an erase
    harness.send(RecorderCommand::ListSessions).await;
    let events = harness
        .events_until(|events| {
            events
                .iter()
                .any(|e| matches!(e, DeviceEvent::SampleRateReport { .. }))
        })
        .await;
    assert!(helpers::session_entries(&events).is_empty());

    harness.shutdown().await;
}

// ============================================================================
// Bulk Export Flow
// ============================================================================

#[tokio::test]
async fn export_flow_brackets_payload() {
    let mut harness = helpers::start(helpers::single_session_config());

    harness.send(RecorderCommand::ExportSession { id: 7 }).await;

    let events = harness
        .events_until(|events| events.contains(&DeviceEvent::BulkTransferEnd))
        .await;

    let start = events
        .iter()
        .position(|e| *e == DeviceEvent::BulkTransferStart)
        .expect("missing start marker");
    let end = events
        .iter()
        .position(|e| *e == DeviceEvent::BulkTransferEnd)
        .expect("missing end marker");
    assert!(start < end);

    // 1024 bytes = 512 samples, capped at 256, 8 per line
    let payload = &events[start + 1..end];
    assert_eq!(payload.len(), 32);
    assert!(payload
        .iter()
        .all(|e| matches!(e, DeviceEvent::Unrecognized { .. })));

    harness.shutdown().await;
}

#[tokio::test]
async fn export_of_missing_session_reports_error_line() {
    let mut harness = helpers::start(helpers::single_session_config());

    harness.send(RecorderCommand::ExportSession { id: 42 }).await;

    let events = harness
        .events_until(|events| !events.is_empty())
        .await;
    assert!(matches!(
        &events[0],
        DeviceEvent::Unrecognized { raw } if raw.contains("42")
    ));
    assert!(!events.contains(&DeviceEvent::BulkTransferStart));

    harness.shutdown().await;
}
