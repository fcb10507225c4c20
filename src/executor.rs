use crate::recorder::RecorderEvent;
use crate::storage::OutputStream;
use anyhow::{anyhow, Context, Result};
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::mpsc::Sender;
use std::thread;
use tracing::{debug, warn};

pub(crate) fn trim_line_ending(mut bytes: &[u8]) -> &[u8] {
    if let Some(rest) = bytes.strip_suffix(b"\n") {
        bytes = rest;
    }
    if let Some(rest) = bytes.strip_suffix(b"\r") {
        bytes = rest;
    }
    bytes
}

/// Forward every line read from `reader` as an output event, in order.
fn pump_lines<R: Read>(reader: R, stream: OutputStream, events: Sender<RecorderEvent>) -> Result<()> {
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        let bytes_read = reader.read_until(b'\n', &mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        let line = String::from_utf8_lossy(trim_line_ending(&buffer)).into_owned();
        if events.send(RecorderEvent::Output { stream, line }).is_err() {
            // Recorder is gone; nobody is listening anymore.
            break;
        }
    }
    Ok(())
}

pub struct CommandExecutor;

impl CommandExecutor {
    /// Run `command` through `shell -c` and report its output and exit on `events`.
    ///
    /// Each stream is read by its own thread, so lines of one stream keep
    /// their order while the two streams interleave in arrival order. The
    /// exit event is sent only after both streams are drained.
    pub fn spawn(shell: &str, command: &str, events: Sender<RecorderEvent>) -> Result<()> {
        let mut child = Command::new(shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to execute `{}` with {}", command, shell))?;
        debug!(pid = child.id(), command, "spawned command");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("child stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("child stderr was not captured"))?;

        let stdout_events = events.clone();
        let stdout_handle = thread::spawn(move || pump_lines(stdout, OutputStream::Stdout, stdout_events));
        let stderr_events = events.clone();
        let stderr_handle = thread::spawn(move || pump_lines(stderr, OutputStream::Stderr, stderr_events));

        thread::spawn(move || {
            for (name, handle) in [("stdout", stdout_handle), ("stderr", stderr_handle)] {
                match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => warn!(stream = name, %err, "reading command output failed"),
                    Err(_) => warn!(stream = name, "output reader panicked"),
                }
            }
            let code = match child.wait() {
                Ok(status) => status.code(),
                Err(err) => {
                    warn!(%err, "waiting for command failed");
                    None
                }
            };
            let _ = events.send(RecorderEvent::Exited(code));
        });

        Ok(())
    }
}
