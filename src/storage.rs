use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Prefix carried by every persisted line that came from the child's error stream.
pub const ERROR_PREFIX: &str = "ERROR: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEntry {
    pub timestamp: String,    // Time of day the command line was accepted
    pub command: String,      // Command text as persisted (masked)
    pub output: Vec<String>,  // Output lines in arrival order (masked)
}

impl CommandEntry {
    pub fn new(timestamp: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            command: command.into(),
            output: Vec::new(),
        }
    }

    /// True if any output line carries the error-stream prefix. Stdout text
    /// that happens to start with `ERROR: ` counts too.
    pub fn had_error(&self) -> bool {
        self.output.iter().any(|line| line.starts_with(ERROR_PREFIX))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    pub process_id: u32,         // Recorder process, target of `stop`
    pub log_file_path: PathBuf,  // Day log being appended to
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn had_error_follows_error_prefix() {
        let mut entry = CommandEntry::new("10:00:00", "ls missing");
        entry.output.push("total 0".to_string());
        assert!(!entry.had_error());

        entry.output.push(format!("{}ls: missing: No such file", ERROR_PREFIX));
        assert!(entry.had_error());
    }

    #[test]
    fn active_session_uses_camel_case_keys() {
        let session = ActiveSession {
            process_id: 42,
            log_file_path: PathBuf::from("/tmp/session-2024-01-01.log"),
        };
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"processId\":42"));
        assert!(json.contains("\"logFilePath\""));
    }
}
