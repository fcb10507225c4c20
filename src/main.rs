mod codec;
mod config;
mod error;
mod executor;
mod exporter;
mod i18n;
mod logging;
mod masking;
mod recorder;
mod replay;
mod search;
mod state_store;
mod storage;
mod store_manager;
mod summarizer;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::*;
use std::io::{self, BufReader, Write};
use std::path::Path;
use std::time::Duration;

use codec::LineKind;
use config::Config;
use error::SessionError;
use i18n::I18n;
use recorder::Recorder;
use replay::{ReplayEngine, ReplayMode, ThreadPacer};
use search::{search_entries, SearchHit, SearchQuery};
use storage::{CommandEntry, ERROR_PREFIX};
use store_manager::StoreManager;
use summarizer::LocalSummarizer;

#[derive(Parser)]
#[command(name = "scribe", version)]
#[command(about = "Record shell sessions into redacted daily logs, then search, export and replay them")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start recording an interactive session
    Start,
    /// Stop the active recording session
    Stop,
    /// List recorded session logs
    History,
    /// Print a day's raw log
    Show {
        /// Day to show (YYYY-MM-DD) [default: today]
        #[arg(long)]
        date: Option<String>,
    },
    /// List the commands typed on a day
    Inputs {
        /// Day to list (YYYY-MM-DD) [default: today]
        #[arg(long)]
        date: Option<String>,
    },
    /// Search a day's log (case-insensitive regex)
    Search {
        pattern: String,
        /// Day to search (YYYY-MM-DD) [default: today]
        #[arg(long)]
        date: Option<String>,
        /// Fuzzy-match commands instead
        #[arg(long)]
        fuzzy: bool,
    },
    /// Search every recorded log
    SearchAll {
        pattern: String,
        /// Fuzzy-match commands instead
        #[arg(long)]
        fuzzy: bool,
    },
    /// Export a day's log as Markdown
    Export {
        /// Day to export (YYYY-MM-DD) [default: today]
        #[arg(long)]
        date: Option<String>,
    },
    /// Export every log as Markdown
    ExportAll,
    /// Replay a recorded log (path or YYYY-MM-DD)
    Replay {
        file: String,
        /// No delay between commands
        #[arg(long)]
        fast: bool,
    },
    /// Write a summary of a day's session
    Summarize {
        /// Day to summarize (YYYY-MM-DD) [default: today]
        #[arg(long)]
        date: Option<String>,
    },
}

fn main() -> Result<()> {
    logging::init();

    let cli = Cli::parse();
    let home = Config::home_dir();
    let config = Config::load_or_init(&home)?;
    let i18n = I18n::new(&config.get_effective_language());
    let store = StoreManager::new_with_config(config.clone(), home)?;

    match cli.command {
        Commands::Start => start(&store, &config, &i18n),
        Commands::Stop => stop(&store, &i18n),
        Commands::History => history(&store, &i18n),
        Commands::Show { date } => {
            let Some(date) = resolve_date(date.as_deref(), &i18n) else { return Ok(()) };
            show(&store, date, &i18n)
        }
        Commands::Inputs { date } => {
            let Some(date) = resolve_date(date.as_deref(), &i18n) else { return Ok(()) };
            inputs(&store, date, &i18n)
        }
        Commands::Search { pattern, date, fuzzy } => {
            let Some(date) = resolve_date(date.as_deref(), &i18n) else { return Ok(()) };
            let query = SearchQuery::new(&pattern, fuzzy)?;
            search_day(&store, date, &pattern, &query, &i18n)
        }
        Commands::SearchAll { pattern, fuzzy } => {
            let query = SearchQuery::new(&pattern, fuzzy)?;
            search_all(&store, &pattern, &query, &i18n)
        }
        Commands::Export { date } => {
            let Some(date) = resolve_date(date.as_deref(), &i18n) else { return Ok(()) };
            export(&store, Some(date), &i18n)
        }
        Commands::ExportAll => export(&store, None, &i18n),
        Commands::Replay { file, fast } => replay(&store, &config, &file, fast, &i18n),
        Commands::Summarize { date } => {
            let Some(date) = resolve_date(date.as_deref(), &i18n) else { return Ok(()) };
            summarize(&store, date, &i18n)
        }
    }
}

fn resolve_date(arg: Option<&str>, i18n: &I18n) -> Option<NaiveDate> {
    match arg {
        None => Some(store_manager::today()),
        Some(text) => {
            let parsed = store_manager::parse_date(text);
            if parsed.is_none() {
                println!("{}", i18n.t_format("invalid_date", &[text]).red());
            }
            parsed
        }
    }
}

fn start(store: &StoreManager, config: &Config, i18n: &I18n) -> Result<()> {
    if config.storage.auto_prune {
        let removed = store.prune(store_manager::today())?;
        if removed > 0 {
            let days = config.storage.max_retention_days.to_string();
            println!("{}", i18n.t_format("pruned_logs", &[&removed.to_string(), &days]).dimmed());
        }
    }

    let state = store.state_store();
    let log_path = store.log_path(store_manager::today());
    let settings = config.recorder_settings();
    let exit_keyword = settings.exit_keyword.clone();
    let mut recorder = Recorder::new(&state, &log_path, settings);

    let token = recorder.cancel_token();
    ctrlc::set_handler(move || token.cancel()).context("failed to install signal handler")?;

    let banner = i18n
        .t_format("session_started", &[&log_path.display().to_string(), &exit_keyword])
        .green()
        .bold()
        .to_string();
    match begin_session(&mut recorder, &banner, &mut io::stdout()) {
        Ok(()) => {}
        Err(SessionError::Conflict { pid, log_file }) => {
            eprintln!(
                "{}",
                i18n.t_format("session_conflict", &[&pid.to_string(), &log_file.display().to_string()])
                    .red()
                    .bold()
            );
            std::process::exit(1);
        }
        Err(err) => return Err(err.into()),
    }

    let stdin = BufReader::new(io::stdin());
    let summary = recorder.run(stdin, &mut io::stdout(), &mut io::stderr())?;
    let file = summary.log_file.display().to_string();
    if summary.cancelled {
        println!();
        println!("{}", i18n.t_format("session_interrupted", &[&file]).yellow());
    } else {
        println!("{}", i18n.t_format("session_saved", &[&file, &summary.commands.to_string()]).green());
    }
    Ok(())
}

/// Take the lease, then announce the session. A conflict prints nothing.
fn begin_session<W: Write>(recorder: &mut Recorder, banner: &str, out: &mut W) -> Result<(), SessionError> {
    recorder.acquire()?;
    writeln!(out, "{}", banner)?;
    Ok(())
}

fn stop(store: &StoreManager, i18n: &I18n) -> Result<()> {
    match store.state_store().stop() {
        Ok(session) => {
            println!(
                "{}",
                i18n.t_format(
                    "stop_signalled",
                    &[&session.process_id.to_string(), &session.log_file_path.display().to_string()]
                )
                .green()
            );
            Ok(())
        }
        Err(SessionError::NotFound(_)) => {
            println!("{}", i18n.t("stop_no_session").yellow());
            std::process::exit(1);
        }
        Err(SessionError::SignalFailed { pid, reason }) => {
            eprintln!("{}", i18n.t_format("stop_signal_failed", &[&pid.to_string(), &reason]).red());
            std::process::exit(1);
        }
        Err(err) => Err(err.into()),
    }
}

fn history(store: &StoreManager, i18n: &I18n) -> Result<()> {
    let logs = store.list_logs()?;
    if logs.is_empty() {
        println!("{}", i18n.t("no_logs").yellow());
        return Ok(());
    }

    let active = store.state_store().load();
    println!("{}", i18n.t("history_title").cyan().bold());
    for log in logs {
        let text = std::fs::read_to_string(&log.path)
            .with_context(|| format!("failed to read {}", log.path.display()))?;
        let count = codec::decode(&text).count();
        let mut line = i18n.t_format(
            "history_line",
            &[&log.date.to_string(), &count.to_string(), &log.size.to_string()],
        );
        if active.as_ref().is_some_and(|s| s.log_file_path == log.path) {
            line.push_str(" *");
        }
        println!("  {}", line);
    }
    Ok(())
}

fn read_day(store: &StoreManager, date: NaiveDate, i18n: &I18n) -> Result<Option<String>> {
    let text = store.read_log(date)?;
    if text.is_none() {
        println!("{}", i18n.t_format("log_not_found", &[&date.to_string()]).yellow());
    }
    Ok(text)
}

fn show(store: &StoreManager, date: NaiveDate, i18n: &I18n) -> Result<()> {
    let Some(text) = read_day(store, date, i18n)? else { return Ok(()) };

    for kind in codec::scan_lines(&text) {
        match kind {
            LineKind::Boundary(line) => println!("{}", line.cyan().bold()),
            LineKind::EntryOpen { timestamp, command } => {
                println!("{} {} {}", format!("[{}]", timestamp).dimmed(), "$".green().bold(), command.bold())
            }
            LineKind::Output(line) if line.starts_with(ERROR_PREFIX) => println!("{}", line.red()),
            LineKind::Output(line) | LineKind::Other(line) => println!("{}", line),
            LineKind::EntryEnd => println!("{}", codec::END_MARKER.dimmed()),
        }
    }
    Ok(())
}

fn inputs(store: &StoreManager, date: NaiveDate, i18n: &I18n) -> Result<()> {
    let Some(text) = read_day(store, date, i18n)? else { return Ok(()) };

    // Raw scan so a command cut off by a crash is still listed.
    let mut any = false;
    for kind in codec::scan_lines(&text) {
        if let LineKind::EntryOpen { timestamp, command } = kind {
            println!("{} {}", format!("[{}]", timestamp).dimmed(), command);
            any = true;
        }
    }
    if !any {
        println!("{}", i18n.t_format("no_inputs", &[&date.to_string()]).yellow());
    }
    Ok(())
}

fn print_hits(label: Option<&str>, hits: &[SearchHit]) {
    for hit in hits {
        let prefix = match label {
            Some(label) => format!("{} [{}]", label, hit.entry.timestamp),
            None => format!("[{}]", hit.entry.timestamp),
        };
        println!("{} {} {}", prefix.dimmed(), "$".green().bold(), hit.entry.command.bold());
        for line in &hit.matched_lines {
            println!("    {}", line.yellow());
        }
    }
}

fn search_day(store: &StoreManager, date: NaiveDate, pattern: &str, query: &SearchQuery, i18n: &I18n) -> Result<()> {
    let Some(text) = read_day(store, date, i18n)? else { return Ok(()) };

    let hits = search_entries(codec::decode(&text), query);
    if hits.is_empty() {
        println!("{}", i18n.t_format("search_no_match", &[pattern]).yellow());
        return Ok(());
    }
    print_hits(None, &hits);
    println!("{}", i18n.t_format("search_match_count", &[&hits.len().to_string()]).green());
    Ok(())
}

fn search_all(store: &StoreManager, pattern: &str, query: &SearchQuery, i18n: &I18n) -> Result<()> {
    let mut total = 0;
    for log in store.list_logs()? {
        let text = std::fs::read_to_string(&log.path)
            .with_context(|| format!("failed to read {}", log.path.display()))?;
        let hits = search_entries(codec::decode(&text), query);
        total += hits.len();
        print_hits(Some(log.date.to_string().as_str()), &hits);
    }

    if total == 0 {
        println!("{}", i18n.t_format("search_no_match", &[pattern]).yellow());
    } else {
        println!("{}", i18n.t_format("search_match_count", &[&total.to_string()]).green());
    }
    Ok(())
}

fn export(store: &StoreManager, date: Option<NaiveDate>, i18n: &I18n) -> Result<()> {
    let days: Vec<NaiveDate> = match date {
        Some(date) => vec![date],
        None => store.list_logs()?.into_iter().map(|log| log.date).collect(),
    };

    let mut exported = 0;
    for day in days {
        let Some(text) = read_day(store, day, i18n)? else { continue };
        let path = exporter::write_export(&store.exports_dir(), day, &text)?;
        println!("{}", i18n.t_format("exported", &[&path.display().to_string()]).green());
        exported += 1;
    }
    if exported == 0 && date.is_none() {
        println!("{}", i18n.t("export_nothing").yellow());
    }
    Ok(())
}

fn replay(store: &StoreManager, config: &Config, target: &str, fast: bool, i18n: &I18n) -> Result<()> {
    let Some(path) = store.resolve_replay_target(target) else {
        println!("{}", i18n.t_format("replay_not_found", &[target]).yellow());
        return Ok(());
    };
    let text = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let entries: Vec<CommandEntry> = codec::decode(&text).collect();

    let mode = if fast {
        ReplayMode::Fast
    } else {
        ReplayMode::Timed {
            delay: Duration::from_millis(config.replay.delay_ms),
            jitter: Duration::from_millis(config.replay.jitter_ms),
        }
    };

    println!(
        "{}",
        i18n.t_format("replay_title", &[&entries.len().to_string(), &display_name(&path)])
            .cyan()
            .bold()
    );
    let engine = ReplayEngine::new(mode, config.replay.highlight_errors);
    engine.run(entries, &mut io::stdout(), &mut ThreadPacer)?;
    println!("{}", i18n.t("replay_complete").green().bold());
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn summarize(store: &StoreManager, date: NaiveDate, i18n: &I18n) -> Result<()> {
    let Some(text) = read_day(store, date, i18n)? else { return Ok(()) };
    let entries: Vec<CommandEntry> = codec::decode(&masking::mask(&text)).collect();

    match summarizer::write_summary(&LocalSummarizer::default(), &store.summaries_dir(), date, &entries) {
        Ok(path) => {
            println!("{}", i18n.t_format("summary_written", &[&path.display().to_string()]).green());
            Ok(())
        }
        Err(err) if err.is_recoverable() => {
            eprintln!("{}", i18n.t_format("summary_failed", &[&err.to_string()]).red());
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
