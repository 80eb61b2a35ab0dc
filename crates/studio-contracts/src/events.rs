use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::pipeline::PipelineStage;

pub type EventPayload = Map<String, Value>;

/// The lines a studio session writes, in roughly the order they appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    RunStarted,
    StageStarted,
    ModelAttemptFailed,
    StorageUploaded,
    StageCompleted,
    StageSkipped,
    StageFailed,
    RunFinished,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::RunStarted => "run_started",
            EventKind::StageStarted => "stage_started",
            EventKind::ModelAttemptFailed => "model_attempt_failed",
            EventKind::StorageUploaded => "storage_uploaded",
            EventKind::StageCompleted => "stage_completed",
            EventKind::StageSkipped => "stage_skipped",
            EventKind::StageFailed => "stage_failed",
            EventKind::RunFinished => "run_finished",
        }
    }

    /// Run-level kinds are the only ones written without a stage.
    pub fn is_stage_event(self) -> bool {
        !matches!(self, EventKind::RunStarted | EventKind::RunFinished)
    }
}

/// Append-only `events.jsonl` for one studio session.
///
/// A line is `{type, session_id, ts}` plus, for stage events, `stage` (the
/// stage name) and `step` (its 1-based number), then the caller's fields.
/// Those envelope keys always win over payload keys of the same name.
/// Clones share the same file lock.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
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

    /// Writes a run-level line.
    pub fn emit(&self, kind: EventKind, payload: EventPayload) -> anyhow::Result<Value> {
        self.append(kind, None, payload)
    }

    pub fn emit_stage(
        &self,
        kind: EventKind,
        stage: PipelineStage,
        payload: EventPayload,
    ) -> anyhow::Result<Value> {
        self.append(kind, Some(stage), payload)
    }

    fn append(
        &self,
        kind: EventKind,
        stage: Option<PipelineStage>,
        payload: EventPayload,
    ) -> anyhow::Result<Value> {
        if kind.is_stage_event() != stage.is_some() {
            anyhow::bail!("event '{}' has the wrong stage tagging", kind.as_str());
        }
        let mut event = payload;
        event.insert("type".to_string(), Value::String(kind.as_str().to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        if let Some(stage) = stage {
            event.insert("stage".to_string(), Value::String(stage.as_str().to_string()));
            event.insert("step".to_string(), Value::Number(stage.number().into()));
        }

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
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
        let writer = EventWriter::new(&path, "session_1_abcd");

        let mut payload = EventPayload::new();
        payload.insert("out_dir".to_string(), Value::String("/tmp/run".to_string()));
        let emitted = writer.emit(EventKind::RunStarted, payload)?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], Value::String("run_started".to_string()));
        assert_eq!(
            parsed["session_id"],
            Value::String("session_1_abcd".to_string())
        );
        assert_eq!(parsed["out_dir"], Value::String("/tmp/run".to_string()));

        let ts = parsed["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn stage_events_carry_stage_name_and_step() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "s");

        let mut payload = EventPayload::new();
        payload.insert("stage".to_string(), Value::String("face".to_string()));
        payload.insert("type".to_string(), Value::String("bogus".to_string()));
        let emitted = writer.emit_stage(EventKind::StageStarted, PipelineStage::Upscale, payload)?;

        assert_eq!(emitted["type"], Value::String("stage_started".to_string()));
        assert_eq!(emitted["stage"], Value::String("upscale".to_string()));
        assert_eq!(emitted["step"], Value::Number(3.into()));
        Ok(())
    }

    #[test]
    fn stage_tagging_must_match_the_kind() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "s");

        assert!(writer.emit(EventKind::StageCompleted, EventPayload::new()).is_err());
        assert!(writer
            .emit_stage(EventKind::RunFinished, PipelineStage::Assembly, EventPayload::new())
            .is_err());
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn emit_appends_lines() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");
        let writer = EventWriter::new(&path, "s");

        writer.emit(EventKind::RunStarted, EventPayload::new())?;
        writer.clone().emit(EventKind::RunFinished, EventPayload::new())?;

        let content = fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: Value = serde_json::from_str(lines[1])?;
        assert_eq!(second["type"], Value::String("run_finished".to_string()));
        Ok(())
    }
}
