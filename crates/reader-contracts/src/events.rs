use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

const RESERVED_KEYS: [&str; 3] = ["type", "session_id", "ts"];

/// Everything a reading session records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted,
    SubmissionStarted,
    StateChanged,
    AnalysisCompleted,
    ImageRendered,
    SessionFailed,
    SessionReset,
}

impl SessionEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionEvent::SessionStarted => "session_started",
            SessionEvent::SubmissionStarted => "submission_started",
            SessionEvent::StateChanged => "state_changed",
            SessionEvent::AnalysisCompleted => "analysis_completed",
            SessionEvent::ImageRendered => "image_rendered",
            SessionEvent::SessionFailed => "session_failed",
            SessionEvent::SessionReset => "session_reset",
        }
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of a session log, read back.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedEvent {
    pub event: SessionEvent,
    pub session_id: String,
    pub ts: String,
    pub fields: EventPayload,
}

impl LoggedEvent {
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(Value::as_str)
    }

    fn from_line(line: &str) -> anyhow::Result<Self> {
        let mut fields: EventPayload = serde_json::from_str(line).context("invalid event line")?;
        let event = fields
            .remove("type")
            .ok_or_else(|| anyhow!("event line has no type"))?;
        let event: SessionEvent =
            serde_json::from_value(event).context("unknown session event type")?;
        let mut text = |key: &str| match fields.remove(key) {
            Some(Value::String(value)) => Ok(value),
            _ => Err(anyhow!("event line has no {key}")),
        };
        let session_id = text("session_id")?;
        let ts = text("ts")?;
        Ok(Self {
            event,
            session_id,
            ts,
            fields,
        })
    }
}

/// Append-only JSONL log of one session.
///
/// Every line carries `type`, `session_id` and `ts`, which the log owns; payload
/// keys with those names are dropped. Clones share one file lock, so the
/// controller and its worker thread append to the same file.
#[derive(Debug, Clone)]
pub struct EventLog {
    inner: Arc<EventLogInner>,
}

#[derive(Debug)]
struct EventLogInner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventLogInner {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(
        &self,
        event: SessionEvent,
        mut payload: EventPayload,
    ) -> anyhow::Result<LoggedEvent> {
        for key in RESERVED_KEYS {
            payload.remove(key);
        }
        let logged = LoggedEvent {
            event,
            session_id: self.inner.session_id.clone(),
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            fields: payload,
        };
        self.append(&logged)?;
        Ok(logged)
    }

    fn append(&self, logged: &LoggedEvent) -> anyhow::Result<()> {
        let mut line = Map::new();
        line.insert("type".to_string(), Value::from(logged.event.as_str()));
        line.insert("session_id".to_string(), Value::from(logged.session_id.as_str()));
        line.insert("ts".to_string(), Value::from(logged.ts.as_str()));
        line.extend(logged.fields.clone());
        let mut encoded = serde_json::to_string(&line)?;
        encoded.push('\n');

        let path = &self.inner.path;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(encoded.as_bytes()))
            .with_context(|| format!("failed to append to {}", path.display()))
    }
}

/// Reads back every event in a session log, skipping blank lines.
pub fn read_events(path: &Path) -> anyhow::Result<Vec<LoggedEvent>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(LoggedEvent::from_line)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;
    use serde_json::json;

    use super::*;

    #[test]
    fn emit_writes_one_line_that_reads_back() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("logs").join("session.jsonl");
        let log = EventLog::new(&path, "session-1");

        let mut payload = EventPayload::new();
        payload.insert("language".to_string(), json!("English"));
        let emitted = log.emit(SessionEvent::SubmissionStarted, payload)?;

        let raw = fs::read_to_string(&path)?;
        assert_eq!(raw.lines().count(), 1);
        assert!(raw.contains("\"type\":\"submission_started\""));

        let events = read_events(&path)?;
        assert_eq!(events, vec![emitted]);
        assert_eq!(events[0].event, SessionEvent::SubmissionStarted);
        assert_eq!(events[0].session_id, "session-1");
        assert_eq!(events[0].str_field("language"), Some("English"));
        DateTime::parse_from_rfc3339(&events[0].ts)?;
        Ok(())
    }

    #[test]
    fn clones_append_to_the_same_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("session.jsonl");
        let log = EventLog::new(&path, "session-2");
        let worker_log = log.clone();

        log.emit(SessionEvent::SessionStarted, EventPayload::new())?;
        worker_log.emit(SessionEvent::StateChanged, EventPayload::new())?;

        let kinds: Vec<SessionEvent> = read_events(&path)?
            .into_iter()
            .map(|logged| logged.event)
            .collect();
        assert_eq!(
            kinds,
            vec![SessionEvent::SessionStarted, SessionEvent::StateChanged]
        );
        Ok(())
    }

    #[test]
    fn payload_cannot_rewrite_the_envelope() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("session.jsonl");
        let log = EventLog::new(&path, "session-3");

        let mut payload = EventPayload::new();
        payload.insert("session_id".to_string(), json!("other"));
        payload.insert("type".to_string(), json!("image_rendered"));
        payload.insert("to".to_string(), json!("painting"));
        log.emit(SessionEvent::StateChanged, payload)?;

        let events = read_events(&path)?;
        assert_eq!(events[0].event, SessionEvent::StateChanged);
        assert_eq!(events[0].session_id, "session-3");
        assert_eq!(events[0].str_field("to"), Some("painting"));
        assert!(events[0].field("type").is_none());
        Ok(())
    }

    #[test]
    fn unknown_event_types_are_rejected_on_read() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("session.jsonl");
        fs::write(
            &path,
            "{\"type\":\"run_started\",\"session_id\":\"s\",\"ts\":\"2026-01-01T00:00:00Z\"}\n",
        )?;
        assert!(read_events(&path).is_err());
        Ok(())
    }
}
