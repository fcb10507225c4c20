use crate::codec;
use crate::masking::mask;
use crate::storage::CommandEntry;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

fn fence_for(lines: &[String]) -> String {
    // Longer fence than any backtick run inside the output.
    let longest = lines
        .iter()
        .map(|line| {
            line.split(|c: char| c != '`')
                .map(str::len)
                .max()
                .unwrap_or(0)
        })
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}

fn render_entry(entry: &CommandEntry, out: &mut String) {
    let flag = if entry.had_error() { " (error)" } else { "" };
    out.push_str(&format!("### `{}` at {}{}\n\n", entry.command, entry.timestamp, flag));
    if entry.output.is_empty() {
        out.push_str("_no output_\n\n");
        return;
    }
    let fence = fence_for(&entry.output);
    out.push_str(&format!("{}text\n", fence));
    for line in &entry.output {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&format!("{}\n\n", fence));
}

/// Render a day log as Markdown. The raw text is masked again first, so
/// anything the streaming pass missed is caught before decoding.
pub fn export_markdown(date: NaiveDate, raw: &str) -> String {
    let remasked = mask(raw);
    let entries: Vec<CommandEntry> = codec::decode(&remasked).collect();
    let failed = entries.iter().filter(|e| e.had_error()).count();

    let mut out = format!("# Terminal session {}\n\n", date.format("%Y-%m-%d"));
    out.push_str(&format!("{} commands, {} with errors\n\n", entries.len(), failed));
    for entry in &entries {
        render_entry(entry, &mut out);
    }
    out
}

/// Write the Markdown export for `date` under `dir`, returning its path.
pub fn write_export(dir: &Path, date: NaiveDate, raw: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(format!("session-{}.md", date.format("%Y-%m-%d")));
    fs::write(&path, export_markdown(date, raw))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
