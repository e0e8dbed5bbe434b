//! Commands sent to the recorder
//!
//! The app-to-device direction is three plain-text directives, each
//! terminated by a single newline. There is no escaping and no length
//! limit; [`RecorderCommand::Raw`] callers must not embed newlines.

use crate::EncodeCommand;

/// A directive for the recorder
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RecorderCommand {
    /// Request the session listing and start the live stream: `read`
    ListSessions,
    /// Request export of one stored session: `read <id>`
    ExportSession { id: u32 },
    /// Wipe all stored sessions from flash: `erase`
    EraseAll,
    /// Raw passthrough for directives this crate does not model
    Raw(String),
}

impl RecorderCommand {
    /// The command text without its line terminator
    pub fn as_line(&self) -> String {
        match self {
            RecorderCommand::ListSessions => "read".to_string(),
            RecorderCommand::ExportSession { id } => format!("read {id}"),
            RecorderCommand::EraseAll => "erase".to_string(),
            RecorderCommand::Raw(text) => text.clone(),
        }
    }
}

impl EncodeCommand for RecorderCommand {
    fn encode(&self) -> Vec<u8> {
        format!("{}\n", self.as_line()).into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_list() {
        assert_eq!(RecorderCommand::ListSessions.encode(), b"read\n");
    }

    #[test]
    fn test_encode_export() {
        assert_eq!(RecorderCommand::ExportSession { id: 5 }.encode(), b"read 5\n");
    }

    #[test]
    fn test_encode_erase() {
        assert_eq!(RecorderCommand::EraseAll.encode(), b"erase\n");
    }

    #[test]
    fn test_encode_raw() {
        assert_eq!(RecorderCommand::Raw("stat".into()).encode(), b"stat\n");
    }
}
