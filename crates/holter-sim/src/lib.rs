//! Holter Recorder Simulation Library
//!
//! This crate provides a simulation layer for testing the dashboard and
//! protocol code without a physical recorder. It includes:
//!
//! - **VirtualRecorder**: answers directives with protocol-accurate output
//!   lines and generates a synthetic ECG waveform
//! - **run_virtual_recorder_task**: an async actor driving a VirtualRecorder
//!   over any byte stream
//!
//! # Example
//!
//! ```rust
//! use holter_sim::VirtualRecorder;
//!
//! // Create a virtual recorder with two pre-loaded sessions
//! let mut recorder = VirtualRecorder::new("Bench Recorder", 250);
//!
//! // Ask it for the session listing
//! recorder.process_input(b"read\n");
//!
//! // Drain the protocol lines it would transmit
//! while let Some(bytes) = recorder.take_output() {
//!     print!("{}", String::from_utf8_lossy(&bytes));
//! }
//! ```

pub mod recorder;
pub mod recorder_task;

pub use recorder::{StoredSession, VirtualRecorder, VirtualRecorderConfig};
pub use recorder_task::{run_virtual_recorder_task, VirtualRecorderCommand};
