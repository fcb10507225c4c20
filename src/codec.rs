//! On-disk session log format.
//!
//! A log is plain text. Each recorded command is a self-terminated block:
//!
//! ```text
//! === [14:03:22] COMMAND: git status ===
//! On branch main
//! ERROR: fatal: something went wrong
//! === END ===
//!
//! ```
//!
//! Session boundaries are standalone lines outside any block. Lines read
//! from the child's error stream carry the `ERROR: ` prefix. Stdout lines
//! are written as-is, so a program that itself prints `ERROR: ...` on stdout
//! reads back as error output. Decoding never
//! fails: an entry without `=== END ===` (crash mid-command) or an open line
//! without a command marker is left out of the decoded sequence.

use crate::storage::{CommandEntry, OutputStream, ERROR_PREFIX};

pub const TOOL_NAME: &str = "scribe";
pub const ENTRY_OPEN: &str = "=== [";
pub const COMMAND_MARKER: &str = "] COMMAND: ";
pub const MARKER_CLOSE: &str = " ===";
pub const END_MARKER: &str = "=== END ===";

pub fn entry_open_line(timestamp: &str, masked_command: &str) -> String {
    format!("{}{}{}{}{}\n", ENTRY_OPEN, timestamp, COMMAND_MARKER, masked_command, MARKER_CLOSE)
}

pub fn output_line(masked_text: &str, stream: OutputStream) -> String {
    match stream {
        OutputStream::Stdout => format!("{}\n", masked_text),
        OutputStream::Stderr => format!("{}{}\n", ERROR_PREFIX, masked_text),
    }
}

/// Closing marker followed by the blank separator line.
pub fn entry_close_lines() -> String {
    format!("{}\n\n", END_MARKER)
}

pub fn session_started_line(time: &str) -> String {
    format!("=== {} session started at {} ===\n", TOOL_NAME, time)
}

pub fn session_ended_line(time: &str) -> String {
    format!("=== {} session ended at {} ===\n", TOOL_NAME, time)
}

/// Serialize a sealed entry. Output lines are written verbatim.
pub fn encode_entry(entry: &CommandEntry) -> String {
    let mut block = entry_open_line(&entry.timestamp, &entry.command);
    for line in &entry.output {
        block.push_str(line);
        block.push('\n');
    }
    block.push_str(&entry_close_lines());
    block
}

#[cfg(test)]
pub fn encode_entries<'a>(entries: impl IntoIterator<Item = &'a CommandEntry>) -> String {
    entries.into_iter().map(encode_entry).collect()
}

/// Parse an entry-open line into `(timestamp, command)`.
fn parse_open_line(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix(ENTRY_OPEN)?;
    let marker_at = rest.find(COMMAND_MARKER)?;
    let timestamp = &rest[..marker_at];
    let command = &rest[marker_at + COMMAND_MARKER.len()..];
    let command = command.strip_suffix(MARKER_CLOSE).unwrap_or(command).trim();
    Some((timestamp.to_string(), command.to_string()))
}

fn is_boundary_line(line: &str) -> bool {
    let prefix = format!("=== {} session ", TOOL_NAME);
    line.starts_with(&prefix) && line.ends_with(MARKER_CLOSE)
}

enum DecodeState {
    Outside,
    Collecting(CommandEntry),
}

/// Lazy decoder over a log's text. Cloning restarts from the same point,
/// calling [`decode`] again restarts from the beginning.
#[derive(Clone)]
pub struct Entries<'a> {
    lines: std::str::Lines<'a>,
}

impl<'a> Iterator for Entries<'a> {
    type Item = CommandEntry;

    fn next(&mut self) -> Option<CommandEntry> {
        let mut state = DecodeState::Outside;

        for raw in self.lines.by_ref() {
            let line = raw.strip_suffix('\r').unwrap_or(raw);

            if let Some((timestamp, command)) = parse_open_line(line) {
                // An open line while collecting abandons the unterminated entry.
                state = DecodeState::Collecting(CommandEntry::new(timestamp, command));
                continue;
            }

            match &mut state {
                DecodeState::Outside => continue,
                DecodeState::Collecting(entry) if line != END_MARKER => {
                    entry.output.push(line.to_string());
                    continue;
                }
                DecodeState::Collecting(_) => {}
            }

            if let DecodeState::Collecting(entry) = std::mem::replace(&mut state, DecodeState::Outside) {
                return Some(entry);
            }
        }

        None
    }
}

/// Decode every fully terminated entry in `text`.
pub fn decode(text: &str) -> Entries<'_> {
    Entries { lines: text.lines() }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind<'a> {
    Boundary(&'a str),
    EntryOpen { timestamp: String, command: String },
    Output(&'a str),
    EntryEnd,
    Other(&'a str),
}

/// Classify every line of a raw log, boundary lines included.
pub fn scan_lines(text: &str) -> Vec<LineKind<'_>> {
    let mut inside = false;
    text.lines()
        .map(|raw| {
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            if let Some((timestamp, command)) = parse_open_line(line) {
                inside = true;
                LineKind::EntryOpen { timestamp, command }
            } else if line == END_MARKER {
                inside = false;
                LineKind::EntryEnd
            } else if inside {
                LineKind::Output(line)
            } else if is_boundary_line(line) {
                LineKind::Boundary(line)
            } else {
                LineKind::Other(line)
            }
        })
        .collect()
}
