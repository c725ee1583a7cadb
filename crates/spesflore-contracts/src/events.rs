use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::errors::ContractError;

pub type EventPayload = Map<String, Value>;

/// Append-only writer for `events.jsonl`, shared by every session and worker
/// thread of one app instance.
///
/// - default fields are `type`, `instance_id`, `ts`
/// - caller payload is merged last and can override defaults
/// - one compact JSON object per line
/// - a disabled writer builds the event but never touches disk
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: Option<PathBuf>,
    instance_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, instance_id: impl Into<String>) -> Self {
        Self::build(Some(path.into()), instance_id.into())
    }

    pub fn disabled(instance_id: impl Into<String>) -> Self {
        Self::build(None, instance_id.into())
    }

    fn build(path: Option<PathBuf>, instance_id: String) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path,
                instance_id,
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    pub fn instance_id(&self) -> &str {
        &self.inner.instance_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "instance_id".to_string(),
            Value::String(self.inner.instance_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.insert(key, value);
        }

        let Some(path) = self.inner.path.as_ref() else {
            return Ok(Value::Object(event));
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }

    /// Emits from a worker where a failed log write must not change the
    /// outcome of the request being logged.
    pub fn record(&self, event_type: &str, payload: EventPayload) {
        if let Err(err) = self.emit(event_type, payload) {
            eprintln!("spesflore: failed to write {event_type} event: {err:#}");
        }
    }

    pub fn record_error(&self, event_type: &str, err: &ContractError, mut payload: EventPayload) {
        payload.insert(
            "error_kind".to_string(),
            Value::String(err.kind().as_str().to_string()),
        );
        payload.insert(
            "error".to_string(),
            Value::String(err.message().to_string()),
        );
        self.record(event_type, payload);
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;

    use super::*;

    #[test]
    fn emit_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "app-123");

        let mut payload = EventPayload::new();
        payload.insert("modality".to_string(), Value::String("text".to_string()));
        let emitted = writer.emit("analysis_started", payload)?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], Value::String("analysis_started".to_string()));
        assert_eq!(parsed["instance_id"], Value::String("app-123".to_string()));
        assert_eq!(parsed["modality"], Value::String("text".to_string()));

        let ts = parsed["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn payload_can_override_default_keys() -> anyhow::Result<()> {
        let writer = EventWriter::disabled("app-123");

        let mut payload = EventPayload::new();
        payload.insert("type".to_string(), Value::String("override".to_string()));
        payload.insert(
            "instance_id".to_string(),
            Value::String("override-app".to_string()),
        );
        let emitted = writer.emit("analysis_started", payload)?;

        assert_eq!(emitted["type"], Value::String("override".to_string()));
        assert_eq!(
            emitted["instance_id"],
            Value::String("override-app".to_string())
        );
        Ok(())
    }

    #[test]
    fn disabled_writer_has_no_path() -> anyhow::Result<()> {
        let writer = EventWriter::disabled("app-123");
        assert!(writer.path().is_none());
        let emitted = writer.emit("gallery_batch_started", EventPayload::new())?;
        assert_eq!(emitted["type"], "gallery_batch_started");
        Ok(())
    }

    #[test]
    fn record_error_adds_kind_and_message() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("logs").join("events.jsonl");
        let writer = EventWriter::new(&path, "app-123");

        writer.record("one", EventPayload::new());
        writer.record_error(
            "analysis_failed",
            &ContractError::empty_response("no text"),
            EventPayload::new(),
        );

        let content = fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: Value = serde_json::from_str(lines[1])?;
        assert_eq!(second["type"], "analysis_failed");
        assert_eq!(second["error_kind"], "empty_response");
        assert_eq!(second["error"], "no text");
        Ok(())
    }
}
