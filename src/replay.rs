use crate::storage::CommandEntry;
use colored::*;
use regex::Regex;
use std::io::{self, Write};
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayMode {
    Fast,
    Timed { delay: Duration, jitter: Duration },
}

/// Suspends playback between entries.
pub trait Pacer {
    fn pause(&mut self, duration: Duration);
}

pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

fn error_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)error|failed").expect("valid error pattern"))
}

pub fn looks_like_error(line: &str) -> bool {
    error_line_pattern().is_match(line)
}

/// Replays decoded entries in order, forward only. Never touches the log.
pub struct ReplayEngine {
    mode: ReplayMode,
    highlight_errors: bool,
}

impl ReplayEngine {
    pub fn new(mode: ReplayMode, highlight_errors: bool) -> Self {
        Self { mode, highlight_errors }
    }

    /// Gap before entry `index` (1-based gaps); spread deterministically
    /// inside `[delay, delay + jitter]` so pacing does not look mechanical.
    fn gap(&self, index: usize) -> Option<Duration> {
        match self.mode {
            ReplayMode::Fast => None,
            ReplayMode::Timed { delay, jitter } => {
                let jitter_ms = jitter.as_millis() as u64;
                let spread = if jitter_ms == 0 {
                    0
                } else {
                    (index as u64).wrapping_mul(7919) % (jitter_ms + 1)
                };
                Some(delay + Duration::from_millis(spread))
            }
        }
    }

    fn print_entry<W: Write>(&self, entry: &CommandEntry, out: &mut W) -> io::Result<()> {
        writeln!(out, "{} {} {}", format!("[{}]", entry.timestamp).dimmed(), "$".green().bold(), entry.command.bold())?;
        for line in &entry.output {
            if self.highlight_errors && looks_like_error(line) {
                writeln!(out, "{}", line.red())?;
            } else {
                writeln!(out, "{}", line)?;
            }
        }
        out.flush()
    }

    /// Print every entry, pausing between them in timed mode. Returns the
    /// number of entries replayed.
    pub fn run<I, W, P>(&self, entries: I, out: &mut W, pacer: &mut P) -> io::Result<usize>
    where
        I: IntoIterator<Item = CommandEntry>,
        W: Write,
        P: Pacer,
    {
        let mut count = 0;
        for entry in entries {
            if count > 0 {
                if let Some(gap) = self.gap(count) {
                    pacer.pause(gap);
                }
            }
            self.print_entry(&entry, out)?;
            count += 1;
        }
        Ok(count)
    }
}
