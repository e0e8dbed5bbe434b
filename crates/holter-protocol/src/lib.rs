//! Holter recorder line protocol
//!
//! This crate provides parsing and encoding for the line protocol spoken
//! by the wireless Holter ECG recorder over its transparent-UART radio
//! link:
//!
//! - **Decoding**: a streaming [`LineDecoder`] that reassembles arbitrary
//!   transport chunks into newline-terminated lines and classifies each
//!   into a [`DeviceEvent`]
//! - **Encoding**: typed [`RecorderCommand`]s with newline-terminated wire
//!   encodings
//!
//! # Architecture
//!
//! The decoder is a per-connection object owning the pending-partial-line
//! accumulator. Decoding is pure with respect to the outside world: a feed
//! pass produces events and touches nothing else, so the protocol layer is
//! testable without a transport or a UI. Malformed lines never abort a
//! pass; they are dropped and decoding continues with the next line.
//!
//! # Example
//!
//! ```rust
//! use holter_protocol::{DeviceEvent, EncodeCommand, LineDecoder, RecorderCommand};
//!
//! let mut decoder = LineDecoder::new();
//!
//! // Chunks split mid-line decode the same as whole lines
//! assert!(decoder.feed(b"LIVE:12").is_empty());
//! let events = decoder.feed(b"34\n");
//! assert_eq!(events, vec![DeviceEvent::LiveSample { value: 1234 }]);
//!
//! // The reverse direction appends the line terminator
//! assert_eq!(RecorderCommand::ExportSession { id: 5 }.encode(), b"read 5\n");
//! ```

pub mod command;
pub mod decoder;
pub mod error;
pub mod event;

pub use command::RecorderCommand;
pub use decoder::LineDecoder;
pub use error::ParseError;
pub use event::{DeviceEvent, SessionEntry};

/// Trait for commands that can be encoded to bytes
pub trait EncodeCommand {
    /// Encode this command to its wire format
    fn encode(&self) -> Vec<u8>;
}
