use crate::error::SessionError;
use crate::storage::CommandEntry;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Turns a day's decoded entries into a Markdown summary.
///
/// Implementations backed by a remote service report failures as
/// [`SessionError::ExternalService`].
pub trait Summarizer {
    fn summarize(&self, date: NaiveDate, entries: &[CommandEntry]) -> Result<String, SessionError>;
}

/// Offline digest built from the entries alone.
pub struct LocalSummarizer {
    pub top_programs: usize,
}

impl Default for LocalSummarizer {
    fn default() -> Self {
        Self { top_programs: 5 }
    }
}

fn program_of(command: &str) -> &str {
    command
        .split_whitespace()
        .find(|word| !word.contains('=') || word.starts_with('-'))
        .unwrap_or("")
}

impl Summarizer for LocalSummarizer {
    fn summarize(&self, date: NaiveDate, entries: &[CommandEntry]) -> Result<String, SessionError> {
        let mut out = format!("# Session summary {}\n\n", date.format("%Y-%m-%d"));

        if entries.is_empty() {
            out.push_str("No commands were recorded.\n");
            return Ok(out);
        }

        let failed: Vec<&CommandEntry> = entries.iter().filter(|e| e.had_error()).collect();
        let output_lines: usize = entries.iter().map(|e| e.output.len()).sum();
        out.push_str(&format!(
            "- {} commands between {} and {}\n- {} output lines\n- {} commands wrote to stderr\n\n",
            entries.len(),
            entries[0].timestamp,
            entries[entries.len() - 1].timestamp,
            output_lines,
            failed.len()
        ));

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for entry in entries {
            let program = program_of(&entry.command);
            if !program.is_empty() {
                *counts.entry(program).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        out.push_str("## Most used programs\n\n");
        for (program, count) in ranked.iter().take(self.top_programs) {
            out.push_str(&format!("- `{}` x{}\n", program, count));
        }

        if !failed.is_empty() {
            out.push_str("\n## Commands with errors\n\n");
            for entry in failed {
                out.push_str(&format!("- {} `{}`\n", entry.timestamp, entry.command));
            }
        }

        Ok(out)
    }
}

/// Summarize and write `summary-<date>.md` under `dir`. Nothing is written
/// when the summarizer fails or hands back an empty summary.
pub fn write_summary<S: Summarizer>(
    summarizer: &S,
    dir: &Path,
    date: NaiveDate,
    entries: &[CommandEntry],
) -> Result<PathBuf, SessionError> {
    let summary = summarizer.summarize(date, entries)?;
    if summary.trim().is_empty() {
        return Err(SessionError::ExternalService("summarizer returned an empty summary".to_string()));
    }
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("summary-{}.md", date.format("%Y-%m-%d")));
    fs::write(&path, summary)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(ts: &str, cmd: &str, output: &[&str]) -> CommandEntry {
        CommandEntry {
            timestamp: ts.to_string(),
            command: cmd.to_string(),
            output: output.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    struct FailingService;

    impl Summarizer for FailingService {
        fn summarize(&self, _date: NaiveDate, _entries: &[CommandEntry]) -> Result<String, SessionError> {
            Err(SessionError::ExternalService("quota exceeded".to_string()))
        }
    }

    #[test]
    fn program_skips_env_assignments() {
        assert_eq!(program_of("RUST_LOG=debug cargo run"), "cargo");
        assert_eq!(program_of("git status"), "git");
        assert_eq!(program_of("   "), "");
    }

    #[test]
    fn local_summary_counts_and_flags_errors() {
        let entries = vec![
            entry("09:00:00", "git status", &["clean"]),
            entry("09:01:00", "git push", &["ERROR: rejected"]),
            entry("09:05:00", "ls", &[]),
        ];
        let summary = LocalSummarizer::default().summarize(date(), &entries).unwrap();

        assert!(summary.contains("# Session summary 2024-07-01"));
        assert!(summary.contains("- 3 commands between 09:00:00 and 09:05:00"));
        assert!(summary.contains("- `git` x2\n"));
        assert!(summary.contains("- 09:01:00 `git push`"));
    }

    #[test]
    fn empty_day_is_summarized() {
        let summary = LocalSummarizer::default().summarize(date(), &[]).unwrap();
        assert!(summary.contains("No commands were recorded."));
    }

    #[test]
    fn failed_service_writes_nothing() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("summaries");
        let err = write_summary(&FailingService, &target, date(), &[]).unwrap_err();
        assert!(matches!(err, SessionError::ExternalService(_)));
        assert!(!target.exists());
    }

    struct SilentService;

    impl Summarizer for SilentService {
        fn summarize(&self, _date: NaiveDate, _entries: &[CommandEntry]) -> Result<String, SessionError> {
            Ok("  \n".to_string())
        }
    }

    #[test]
    fn empty_summary_is_a_service_failure() {
        let dir = tempdir().unwrap();
        let err = write_summary(&SilentService, dir.path(), date(), &[]).unwrap_err();
        assert!(matches!(err, SessionError::ExternalService(_)));
        assert!(err.is_recoverable());
        assert!(!dir.path().join("summary-2024-07-01.md").exists());
    }

    #[test]
    fn summary_file_is_written() {
        let dir = tempdir().unwrap();
        let path = write_summary(&LocalSummarizer::default(), dir.path(), date(), &[]).unwrap();
        assert!(path.ends_with("summary-2024-07-01.md"));
        assert!(path.exists());
    }
}
