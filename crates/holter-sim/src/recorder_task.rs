//! Virtual recorder actor task
//!
//! This module provides a pure async task that owns a VirtualRecorder and
//! communicates via an async stream. The task uses a select! loop to:
//! - Read directive lines from the connection stream and process them
//! - Tick a sample-period timer that drives the live waveform stream
//! - Handle shutdown commands from a channel

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::VirtualRecorder;

/// Commands that can be sent to a virtual recorder actor
#[derive(Debug, Clone)]
pub enum VirtualRecorderCommand {
    /// Start or stop the live sample stream without a `read` directive
    SetStreaming(bool),
    /// Shutdown the virtual recorder actor
    Shutdown,
}

/// Run the virtual recorder actor task
///
/// This task owns the VirtualRecorder and processes:
/// 1. Directive bytes read from the stream (the app side of the link)
/// 2. Shutdown/streaming commands from the command channel
/// 3. A sample-period timer that emits `LIVE:` lines while streaming
///
/// The task ends when the stream closes, the channel closes, or a
/// shutdown command arrives.
pub async fn run_virtual_recorder_task<S>(
    mut stream: S,
    mut recorder: VirtualRecorder,
    mut cmd_rx: mpsc::Receiver<VirtualRecorderCommand>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 1024];

    let period_us = 1_000_000 / u64::from(recorder.sample_rate_hz().max(1));
    let mut sample_timer = interval(Duration::from_micros(period_us));

    info!(
        "Starting virtual recorder task for {} at {} Hz",
        recorder.id(),
        recorder.sample_rate_hz()
    );

    loop {
        tokio::select! {
            // Read directives from the connection stream
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Virtual recorder stream closed for {}", recorder.id());
                        break;
                    }
                    Ok(n) => {
                        recorder.process_input(&buf[..n]);
                        flush_output(&mut stream, &mut recorder).await?;
                    }
                    Err(e) => {
                        warn!("Virtual recorder {} stream error: {}", recorder.id(), e);
                        return Err(e);
                    }
                }
            }

            // Handle commands from the channel
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(VirtualRecorderCommand::SetStreaming(on)) => {
                        info!("Virtual recorder {} streaming set to {}", recorder.id(), on);
                        recorder.set_streaming(on);
                    }
                    Some(VirtualRecorderCommand::Shutdown) | None => {
                        info!("Shutdown requested for virtual recorder {}", recorder.id());
                        break;
                    }
                }
            }

            // Sample timer - emit live waveform lines while streaming
            _ = sample_timer.tick(), if recorder.streaming() => {
                recorder.emit_live_sample();
                flush_output(&mut stream, &mut recorder).await?;
            }
        }
    }

    info!("Virtual recorder task ended for {}", recorder.id());
    Ok(())
}

/// Write every pending output line to the stream
async fn flush_output<S>(stream: &mut S, recorder: &mut VirtualRecorder) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let had_output = recorder.has_output();
    while let Some(line) = recorder.take_output() {
        stream.write_all(&line).await?;
    }
    if had_output {
        stream.flush().await?;
    }
    Ok(())
}
