use crate::config::Config;
use crate::state_store::SessionStateStore;
use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const LOG_PREFIX: &str = "session-";
const LOG_SUFFIX: &str = ".log";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub date: NaiveDate,
    pub path: PathBuf,
    pub size: u64,
}

pub fn log_file_name(date: NaiveDate) -> String {
    format!("{}{}{}", LOG_PREFIX, date.format(DATE_FORMAT), LOG_SUFFIX)
}

fn date_from_file_name(name: &str) -> Option<NaiveDate> {
    let date = name.strip_prefix(LOG_PREFIX)?.strip_suffix(LOG_SUFFIX)?;
    parse_date(date)
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Locates session logs, the state file and generated artifacts.
pub struct StoreManager {
    home: PathBuf,
    session_dir: PathBuf,
    config: Config,
}

impl StoreManager {
    pub fn new_with_config(config: Config, home: PathBuf) -> Result<Self> {
        let session_dir = config
            .storage
            .session_dir
            .clone()
            .unwrap_or_else(|| home.join("sessions"));

        fs::create_dir_all(&session_dir)
            .with_context(|| format!("failed to create session directory {}", session_dir.display()))?;

        Ok(Self { home, session_dir, config })
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn state_store(&self) -> SessionStateStore {
        SessionStateStore::new(self.home.join("active-session.json"))
    }

    pub fn log_path(&self, date: NaiveDate) -> PathBuf {
        self.session_dir.join(log_file_name(date))
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.session_dir.join("exports")
    }

    pub fn summaries_dir(&self) -> PathBuf {
        self.session_dir.join("summaries")
    }

    /// All day logs, newest first.
    pub fn list_logs(&self) -> Result<Vec<LogFile>> {
        let mut logs = Vec::new();

        for entry in fs::read_dir(&self.session_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(date) = path.file_name().and_then(|n| n.to_str()).and_then(date_from_file_name) else {
                continue;
            };
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            logs.push(LogFile { date, path, size });
        }

        logs.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(logs)
    }

    /// Raw text of the log for `date`, or `None` when there is no such log.
    pub fn read_log(&self, date: NaiveDate) -> Result<Option<String>> {
        let path = self.log_path(date);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    /// A replay argument is either a path to a log or a `YYYY-MM-DD` date.
    pub fn resolve_replay_target(&self, target: &str) -> Option<PathBuf> {
        let as_path = PathBuf::from(target);
        if as_path.is_file() {
            return Some(as_path);
        }
        let in_session_dir = self.session_dir.join(target);
        if in_session_dir.is_file() {
            return Some(in_session_dir);
        }
        parse_date(target)
            .map(|date| self.log_path(date))
            .filter(|path| path.is_file())
    }

    /// Delete day logs older than the retention window. Returns how many went.
    pub fn prune(&self, today: NaiveDate) -> Result<usize> {
        let cutoff = today - Duration::days(self.config.storage.max_retention_days as i64);
        let mut removed = 0;

        for log in self.list_logs()? {
            if log.date < cutoff {
                fs::remove_file(&log.path)
                    .with_context(|| format!("failed to remove {}", log.path.display()))?;
                debug!(path = %log.path.display(), "pruned log");
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "pruned old session logs");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn manager(home: &Path) -> StoreManager {
        StoreManager::new_with_config(Config::default(), home.to_path_buf()).unwrap()
    }

    #[test]
    fn log_names_follow_the_date() {
        assert_eq!(log_file_name(date("2024-02-09")), "session-2024-02-09.log");
        assert_eq!(date_from_file_name("session-2024-02-09.log"), Some(date("2024-02-09")));
        assert_eq!(date_from_file_name("session-latest.log"), None);
        assert_eq!(date_from_file_name("notes.txt"), None);
    }

    #[test]
    fn lists_logs_newest_first_and_ignores_other_files() {
        let home = tempdir().unwrap();
        let store = manager(home.path());
        fs::write(store.log_path(date("2024-01-01")), "a").unwrap();
        fs::write(store.log_path(date("2024-03-01")), "abc").unwrap();
        fs::write(store.session_dir().join("README"), "x").unwrap();
        fs::create_dir_all(store.exports_dir()).unwrap();

        let logs = store.list_logs().unwrap();
        let dates: Vec<NaiveDate> = logs.iter().map(|l| l.date).collect();
        assert_eq!(dates, vec![date("2024-03-01"), date("2024-01-01")]);
        assert_eq!(logs[0].size, 3);
    }

    #[test]
    fn read_missing_log_is_none() {
        let home = tempdir().unwrap();
        let store = manager(home.path());
        assert_eq!(store.read_log(date("2020-01-01")).unwrap(), None);
    }

    #[test]
    fn replay_target_accepts_path_or_date() {
        let home = tempdir().unwrap();
        let store = manager(home.path());
        let path = store.log_path(date("2024-05-05"));
        fs::write(&path, "").unwrap();

        assert_eq!(store.resolve_replay_target("2024-05-05"), Some(path.clone()));
        assert_eq!(store.resolve_replay_target(path.to_str().unwrap()), Some(path.clone()));
        assert_eq!(store.resolve_replay_target("session-2024-05-05.log"), Some(path));
        assert_eq!(store.resolve_replay_target("2024-05-06"), None);
    }

    #[test]
    fn prune_removes_only_expired_logs() {
        let home = tempdir().unwrap();
        let mut config = Config::default();
        config.storage.max_retention_days = 30;
        let store = StoreManager::new_with_config(config, home.path().to_path_buf()).unwrap();
        fs::write(store.log_path(date("2024-01-01")), "").unwrap();
        fs::write(store.log_path(date("2024-05-20")), "").unwrap();

        assert_eq!(store.prune(date("2024-06-01")).unwrap(), 1);
        let remaining: Vec<NaiveDate> = store.list_logs().unwrap().iter().map(|l| l.date).collect();
        assert_eq!(remaining, vec![date("2024-05-20")]);
    }
}
