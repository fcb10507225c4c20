//! Interactive recording loop.
//!
//! One thread of control owns the log file. The input reader, the two
//! output readers of the running command and the cancellation token all
//! post [`RecorderEvent`]s into a single channel, and the loop appends to
//! the log in the order events arrive. Only one command runs at a time;
//! lines typed while it runs are queued and handled afterwards.

use crate::codec;
use crate::error::SessionError;
use crate::executor::{trim_line_ending, CommandExecutor};
use crate::masking::mask;
use crate::state_store::SessionStateStore;
use crate::storage::{ActiveSession, CommandEntry, OutputStream, ERROR_PREFIX};
use anyhow::{Context, Result};
use chrono::Local;
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum RecorderEvent {
    Line(String),
    InputClosed,
    Output { stream: OutputStream, line: String },
    Exited(Option<i32>),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Prompting,
    Running,
    Closing,
}

/// Handle that asks a running recorder to finish its session.
#[derive(Clone)]
pub struct CancelToken {
    events: Sender<RecorderEvent>,
}

impl CancelToken {
    pub fn cancel(&self) {
        let _ = self.events.send(RecorderEvent::Cancelled);
    }
}

#[derive(Debug, Clone)]
pub struct RecorderSettings {
    pub shell: String,
    pub exit_keyword: String,
    pub prompt: String,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            exit_keyword: "exit".to_string(),
            prompt: "scribe> ".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSummary {
    pub log_file: PathBuf,
    pub commands: usize,
    pub cancelled: bool,
}

struct SessionLogWriter {
    file: File,
}

impl SessionLogWriter {
    fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        Ok(Self { file })
    }

    fn append(&mut self, text: &str) -> Result<()> {
        self.file.write_all(text.as_bytes()).context("failed to append to log file")?;
        self.file.flush().context("failed to flush log file")?;
        Ok(())
    }
}

enum Step {
    Continue,
    Close,
}

fn time_of_day() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

pub struct Recorder<'a> {
    store: &'a SessionStateStore,
    log_path: PathBuf,
    settings: RecorderSettings,
    events_tx: Sender<RecorderEvent>,
    events_rx: Receiver<RecorderEvent>,
    state: RecorderState,
    lease: Option<u32>,
    pending: VecDeque<(String, String)>,  // (accepted at, line)
    input_closed: bool,
    commands: usize,
    cancelled: bool,
}

impl<'a> Recorder<'a> {
    pub fn new(store: &'a SessionStateStore, log_path: impl Into<PathBuf>, settings: RecorderSettings) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            store,
            log_path: log_path.into(),
            settings,
            events_tx,
            events_rx,
            state: RecorderState::Idle,
            lease: None,
            pending: VecDeque::new(),
            input_closed: false,
            commands: 0,
            cancelled: false,
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        CancelToken { events: self.events_tx.clone() }
    }

    #[cfg(test)]
    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Take the session lease for this process. Calling it again while the
    /// lease is held is a no-op. On `Conflict` nothing is written anywhere.
    pub fn acquire(&mut self) -> Result<(), SessionError> {
        if self.lease.is_some() {
            return Ok(());
        }
        let session = ActiveSession {
            process_id: std::process::id(),
            log_file_path: self.log_path.clone(),
        };
        self.store.acquire(&session)?;
        self.lease = Some(session.process_id);
        Ok(())
    }

    /// Record one session: take the lease unless [`Recorder::acquire`] already
    /// did, loop until `exit`, end of input or cancellation, then seal the
    /// log and release the lease.
    ///
    /// `out` and `err` receive the unmasked terminal view; the log only ever
    /// sees masked text.
    pub fn run<R, O, E>(&mut self, input: R, out: &mut O, err: &mut E) -> Result<RecordingSummary>
    where
        R: BufRead + Send + 'static,
        O: Write,
        E: Write,
    {
        self.acquire()?;
        let pid = self.lease.unwrap_or_else(std::process::id);

        let mut log = match SessionLogWriter::open(&self.log_path) {
            Ok(log) => log,
            Err(open_err) => {
                let _ = self.store.release(pid);
                self.lease = None;
                return Err(open_err);
            }
        };

        let outcome = self.drive(&mut log, input, out, err);
        let teardown = self.close(&mut log, pid);
        outcome?;
        teardown?;

        Ok(RecordingSummary {
            log_file: self.log_path.clone(),
            commands: self.commands,
            cancelled: self.cancelled,
        })
    }

    fn drive<R, O, E>(&mut self, log: &mut SessionLogWriter, input: R, out: &mut O, err: &mut E) -> Result<()>
    where
        R: BufRead + Send + 'static,
        O: Write,
        E: Write,
    {
        log.append(&codec::session_started_line(&time_of_day()))?;
        info!(log = %self.log_path.display(), "recording started");
        spawn_input_reader(input, self.events_tx.clone());

        self.state = RecorderState::Prompting;
        self.prompt(out)?;

        loop {
            let event = match self.events_rx.recv() {
                Ok(event) => event,
                Err(_) => return Ok(()),
            };

            match event {
                RecorderEvent::Line(line) => {
                    let accepted_at = time_of_day();
                    if self.state == RecorderState::Running {
                        self.pending.push_back((accepted_at, line));
                        continue;
                    }
                    match self.handle_line(&accepted_at, &line, log, err)? {
                        Step::Close => return Ok(()),
                        Step::Continue if self.state == RecorderState::Prompting => self.prompt(out)?,
                        Step::Continue => {}
                    }
                }
                RecorderEvent::InputClosed => {
                    self.input_closed = true;
                    if self.state != RecorderState::Running {
                        writeln!(out)?;
                        return Ok(());
                    }
                }
                RecorderEvent::Output { stream, line } => {
                    if self.state != RecorderState::Running {
                        debug!(?stream, "dropping output that arrived outside a command");
                        continue;
                    }
                    match stream {
                        OutputStream::Stdout => {
                            writeln!(out, "{}", line)?;
                            out.flush()?;
                        }
                        OutputStream::Stderr => {
                            writeln!(err, "{}", line)?;
                            err.flush()?;
                        }
                    }
                    log.append(&codec::output_line(&mask(&line), stream))?;
                }
                RecorderEvent::Exited(code) => {
                    if self.state != RecorderState::Running {
                        continue;
                    }
                    debug!(?code, "command finished");
                    log.append(&codec::entry_close_lines())?;
                    self.commands += 1;
                    self.state = RecorderState::Prompting;

                    while self.state == RecorderState::Prompting {
                        let Some((accepted_at, line)) = self.pending.pop_front() else {
                            break;
                        };
                        if let Step::Close = self.handle_line(&accepted_at, &line, log, err)? {
                            return Ok(());
                        }
                    }
                    if self.state == RecorderState::Prompting {
                        if self.input_closed {
                            writeln!(out)?;
                            return Ok(());
                        }
                        self.prompt(out)?;
                    }
                }
                RecorderEvent::Cancelled => {
                    info!("recording cancelled");
                    self.cancelled = true;
                    return Ok(());
                }
            }
        }
    }

    fn handle_line<E: Write>(
        &mut self,
        timestamp: &str,
        line: &str,
        log: &mut SessionLogWriter,
        err: &mut E,
    ) -> Result<Step> {
        let command = line.trim();
        if command.is_empty() {
            return Ok(Step::Continue);
        }
        if command.eq_ignore_ascii_case(&self.settings.exit_keyword) {
            return Ok(Step::Close);
        }

        let masked = mask(command);

        // Output events queue behind this call, so the open line still
        // precedes them in the log.
        match CommandExecutor::spawn(&self.settings.shell, command, self.events_tx.clone()) {
            Ok(()) => {
                log.append(&codec::entry_open_line(timestamp, &masked))?;
                self.state = RecorderState::Running;
            }
            Err(spawn_err) => {
                warn!(%spawn_err, command, "command could not be started");
                let message = format!("{:#}", spawn_err);
                writeln!(err, "{}", message)?;
                let mut entry = CommandEntry::new(timestamp, masked);
                entry.output.push(format!("{}{}", ERROR_PREFIX, mask(&message)));
                log.append(&codec::encode_entry(&entry))?;
                self.commands += 1;
            }
        }
        Ok(Step::Continue)
    }

    fn prompt<O: Write>(&self, out: &mut O) -> Result<()> {
        write!(out, "{}", self.settings.prompt)?;
        out.flush()?;
        Ok(())
    }

    /// Single teardown path for `exit`, end of input and cancellation.
    fn close(&mut self, log: &mut SessionLogWriter, pid: u32) -> Result<()> {
        let was_running = self.state == RecorderState::Running;
        self.state = RecorderState::Closing;

        let mut sealed = Ok(());
        if was_running {
            // The child may still be alive; only the entry is sealed.
            sealed = log.append(&codec::entry_close_lines());
            self.commands += 1;
        }
        let ended = sealed.and_then(|()| log.append(&codec::session_ended_line(&time_of_day())));
        let released = self.store.release(pid).context("failed to clear session state");
        self.lease = None;
        info!(commands = self.commands, "recording finished");

        ended?;
        released?;
        Ok(())
    }
}

/// Forward typed lines. Bytes that are not UTF-8 are replaced, so a stray
/// byte never ends the session; only end of input or a read error does.
fn spawn_input_reader<R: BufRead + Send + 'static>(mut input: R, events: Sender<RecorderEvent>) {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match input.read_until(b'\n', &mut buffer) {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) => {
                    warn!(%err, "reading input failed");
                    break;
                }
            }
            let line = String::from_utf8_lossy(trim_line_ending(&buffer)).into_owned();
            if events.send(RecorderEvent::Line(line)).is_err() {
                return;
            }
        }
        let _ = events.send(RecorderEvent::InputClosed);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{search_entries, SearchQuery};
    use chrono::NaiveTime;
    use std::io::Cursor;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _dir: TempDir,
        store: SessionStateStore,
        log_path: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let store = SessionStateStore::new(dir.path().join("active-session.json"));
        let log_path = dir.path().join("sessions").join("session-2024-03-01.log");
        Fixture { _dir: dir, store, log_path }
    }

    fn record(fx: &Fixture, script: &str) -> (RecordingSummary, String, String) {
        let mut recorder = Recorder::new(&fx.store, &fx.log_path, RecorderSettings::default());
        let mut out = Vec::new();
        let mut err = Vec::new();
        let summary = recorder
            .run(Cursor::new(script.as_bytes().to_vec()), &mut out, &mut err)
            .unwrap();
        (summary, String::from_utf8(out).unwrap(), String::from_utf8(err).unwrap())
    }

    fn decoded(fx: &Fixture) -> Vec<CommandEntry> {
        let text = fs::read_to_string(&fx.log_path).unwrap();
        codec::decode(&text).collect()
    }

    #[test]
    fn records_plain_output_unchanged() {
        let fx = fixture();
        let (summary, out, _) = record(&fx, "echo hello\nexit\n");

        assert_eq!(summary.commands, 1);
        assert!(out.contains("hello"));
        let entries = decoded(&fx);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].command, "echo hello");
        assert_eq!(entries[0].output, vec!["hello".to_string()]);
    }

    #[test]
    fn secrets_reach_terminal_but_not_log() {
        let fx = fixture();
        let secret = "secret123456789012345678901234";
        let (_, out, _) = record(&fx, &format!("echo token={}\nexit\n", secret));

        assert!(out.contains(&format!("token={}", secret)));
        let log = fs::read_to_string(&fx.log_path).unwrap();
        assert!(!log.contains(secret));
        assert!(log.contains("COMMAND: echo token=[REDACTED] ==="));
        assert!(log.contains("\ntoken=[REDACTED]\n"));
    }

    #[test]
    fn stderr_lines_are_tagged() {
        let fx = fixture();
        let (_, _, err) = record(&fx, "echo broken 1>&2\nexit\n");

        assert!(err.contains("broken"));
        let entries = decoded(&fx);
        assert_eq!(entries[0].output, vec!["ERROR: broken".to_string()]);
        assert!(entries[0].had_error());
    }

    #[test]
    fn blank_lines_skip_and_exit_is_case_insensitive() {
        let fx = fixture();
        let (summary, _, _) = record(&fx, "\n   \necho one\nEXIT\necho never\n");

        assert_eq!(summary.commands, 1);
        let entries = decoded(&fx);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].command, "echo one");
    }

    #[test]
    fn commands_run_in_submission_order() {
        let fx = fixture();
        record(&fx, "echo first\necho second\necho third\n");

        let commands: Vec<String> = decoded(&fx).into_iter().map(|e| e.command).collect();
        assert_eq!(commands, vec!["echo first", "echo second", "echo third"]);
    }

    #[test]
    fn session_boundaries_and_lease_lifecycle() {
        let fx = fixture();
        record(&fx, "true\nexit\n");

        let log = fs::read_to_string(&fx.log_path).unwrap();
        assert!(log.starts_with("=== scribe session started at "));
        assert!(log.trim_end().ends_with("==="));
        assert!(log.contains("=== scribe session ended at "));
        assert_eq!(fx.store.load(), None);
    }

    #[test]
    fn second_session_on_same_day_appends() {
        let fx = fixture();
        record(&fx, "echo a\n");
        record(&fx, "echo b\n");

        let outputs: Vec<Vec<String>> = decoded(&fx).into_iter().map(|e| e.output).collect();
        assert_eq!(outputs, vec![vec!["a".to_string()], vec!["b".to_string()]]);
    }

    #[test]
    fn active_lease_blocks_start() {
        let fx = fixture();
        let other = ActiveSession {
            process_id: std::process::id(),
            log_file_path: PathBuf::from("/elsewhere/session.log"),
        };
        fx.store.save(&other).unwrap();

        let mut recorder = Recorder::new(&fx.store, &fx.log_path, RecorderSettings::default());
        let err = recorder
            .run(Cursor::new(b"echo hi\n".to_vec()), &mut Vec::new(), &mut Vec::new())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::error::SessionError>(),
            Some(crate::error::SessionError::Conflict { .. })
        ));
        assert!(!fx.log_path.exists());
        assert_eq!(fx.store.load(), Some(other));
    }

    #[test]
    fn cancellation_seals_running_entry() {
        let fx = fixture();
        let mut recorder = Recorder::new(&fx.store, &fx.log_path, RecorderSettings::default());
        let token = recorder.cancel_token();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(500));
            token.cancel();
        });

        let summary = recorder
            .run(Cursor::new(b"echo started; sleep 5\n".to_vec()), &mut Vec::new(), &mut Vec::new())
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(recorder.state(), RecorderState::Closing);
        let entries = decoded(&fx);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].output, vec!["started".to_string()]);
        let log = fs::read_to_string(&fx.log_path).unwrap();
        assert!(log.contains("=== scribe session ended at "));
        assert_eq!(fx.store.load(), None);
    }

    #[test]
    fn invalid_utf8_line_does_not_end_session() {
        let fx = fixture();
        let mut recorder = Recorder::new(&fx.store, &fx.log_path, RecorderSettings::default());
        let summary = recorder
            .run(
                Cursor::new(b"echo caf\xe9\necho after\nexit\n".to_vec()),
                &mut Vec::new(),
                &mut Vec::new(),
            )
            .unwrap();

        assert_eq!(summary.commands, 2);
        let commands: Vec<String> = decoded(&fx).into_iter().map(|e| e.command).collect();
        assert_eq!(commands, vec!["echo caf\u{FFFD}", "echo after"]);
    }

    #[test]
    fn queued_line_keeps_time_it_was_typed() {
        let fx = fixture();
        record(&fx, "sleep 3\necho queued\nexit\n");

        let entries = decoded(&fx);
        assert_eq!(entries.len(), 2);
        let first = NaiveTime::parse_from_str(&entries[0].timestamp, "%H:%M:%S").unwrap();
        let second = NaiveTime::parse_from_str(&entries[1].timestamp, "%H:%M:%S").unwrap();
        assert!((second - first).num_seconds() < 2, "{} then {}", first, second);
    }

    #[test]
    fn recorded_log_is_searchable() {
        let fx = fixture();
        // `true -c ...` accepts any command and prints nothing.
        let settings = RecorderSettings {
            shell: "true".to_string(),
            ..RecorderSettings::default()
        };
        let mut recorder = Recorder::new(&fx.store, &fx.log_path, settings);
        recorder
            .run(Cursor::new(b"git status\nnpm install\nexit\n".to_vec()), &mut Vec::new(), &mut Vec::new())
            .unwrap();

        let text = fs::read_to_string(&fx.log_path).unwrap();
        let hits = search_entries(codec::decode(&text), &SearchQuery::new("git", false).unwrap());
        let commands: Vec<&str> = hits.iter().map(|h| h.entry.command.as_str()).collect();
        assert_eq!(commands, vec!["git status"]);
    }

    #[test]
    fn conflicting_acquire_leaves_no_trace() {
        let fx = fixture();
        let other = ActiveSession {
            process_id: std::process::id(),
            log_file_path: PathBuf::from("/elsewhere/session.log"),
        };
        fx.store.save(&other).unwrap();

        let mut recorder = Recorder::new(&fx.store, &fx.log_path, RecorderSettings::default());
        assert!(matches!(recorder.acquire(), Err(SessionError::Conflict { .. })));
        assert!(!fx.log_path.exists());
        assert_eq!(fx.store.load(), Some(other));
    }

    #[test]
    fn acquire_before_run_holds_lease_until_close() {
        let fx = fixture();
        let mut recorder = Recorder::new(&fx.store, &fx.log_path, RecorderSettings::default());
        recorder.acquire().unwrap();
        assert_eq!(fx.store.load().map(|s| s.log_file_path), Some(fx.log_path.clone()));

        recorder
            .run(Cursor::new(b"exit\n".to_vec()), &mut Vec::new(), &mut Vec::new())
            .unwrap();
        assert_eq!(fx.store.load(), None);
    }

    #[test]
    fn unknown_shell_is_recorded_as_error() {
        let fx = fixture();
        let settings = RecorderSettings {
            shell: "/nonexistent/shell".to_string(),
            ..RecorderSettings::default()
        };
        let mut recorder = Recorder::new(&fx.store, &fx.log_path, settings);
        let mut err = Vec::new();
        recorder
            .run(Cursor::new(b"ls\n".to_vec()), &mut Vec::new(), &mut err)
            .unwrap();

        let entries = decoded(&fx);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].had_error());
        assert!(!err.is_empty());
    }
}
