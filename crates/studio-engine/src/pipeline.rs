use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use studio_contracts::events::{EventKind, EventPayload, EventWriter};
use studio_contracts::pipeline::{
    AssemblyBundle, DatasetItem, MotionOutcome, MotionType, PipelineStage, PipelineState,
    VoiceTrack,
};
use studio_contracts::runs::summary::{write_summary, RunSummary};
use studio_contracts::session::SessionContext;

use crate::backends::{Backends, StageKit};
use crate::stages::{
    run_assembly, run_dataset, run_face, run_motion, run_upscale, run_voice, AssemblyInput,
    DatasetOutput, FaceOutput, MotionOutput, StageError, UpscaleOutput,
};
use crate::storage::{ObjectStore, StorageHandoff, StoredItem};
use crate::{map_object, sniff_image_extension};

/// Inputs for a whole run from the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub source: Vec<u8>,
    pub count: usize,
    pub face_model: Option<String>,
    pub script: String,
    pub audio: Option<Vec<u8>>,
    pub motion: MotionType,
    pub skip_motion: bool,
}

/// Drives the six stages in order over a [`PipelineState`], writing every
/// output under `out_dir` and an event line per step.
pub struct StudioRun {
    kit: StageKit,
    session: SessionContext,
    state: PipelineState,
    out_dir: PathBuf,
    events: EventWriter,
    store: Option<Box<dyn ObjectStore>>,
    started_at: String,
    stages_completed: Vec<String>,
    degraded_stages: Vec<String>,
    artifacts: Vec<Map<String, Value>>,
}

impl StudioRun {
    pub fn new(
        backends: &dyn Backends,
        session: SessionContext,
        out_dir: impl Into<PathBuf>,
        events_path: Option<PathBuf>,
    ) -> Result<Self> {
        let out_dir = out_dir.into();
        fs::create_dir_all(&out_dir)
            .with_context(|| format!("failed to create {}", out_dir.display()))?;
        let events_path = events_path.unwrap_or_else(|| out_dir.join("events.jsonl"));
        let events = EventWriter::new(events_path, session.session.as_str());
        let store = match session.credentials.storage.as_ref() {
            Some(credentials) => match backends.object_store(credentials) {
                Ok(store) => Some(store),
                Err(err) => {
                    tracing::warn!(error = %format!("{err:#}"), "storage disabled for this run");
                    None
                }
            },
            None => None,
        };
        Ok(Self {
            kit: StageKit::new(backends),
            session,
            state: PipelineState::new(),
            out_dir,
            events,
            store,
            started_at: now_utc_iso(),
            stages_completed: Vec::new(),
            degraded_stages: Vec::new(),
            artifacts: Vec::new(),
        })
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn load_source(&mut self, image: Vec<u8>) -> Result<()> {
        let path = self
            .out_dir
            .join(format!("source.{}", sniff_image_extension(&image)));
        fs::write(&path, &image).with_context(|| format!("failed to write {}", path.display()))?;
        self.state.set_source(image);
        self.events.emit(
            EventKind::RunStarted,
            map_object(json!({
                "out_dir": self.out_dir.to_string_lossy(),
                "storage": self.store.is_some(),
            })),
        )?;
        Ok(())
    }

    pub fn face(&mut self, requested_model: Option<&str>) -> Result<FaceOutput> {
        self.state.ensure_can_run(PipelineStage::Face)?;
        self.stage_started(PipelineStage::Face)?;
        let source = self.state.source().unwrap_or_default().to_vec();
        let output = run_face(
            &self.kit.context(&self.session, Some(&self.events)),
            &source,
            requested_model,
        )?;

        let mut item = DatasetItem::new(0, "face", output.image.clone());
        if let Some(store) = self.store.as_deref() {
            match StorageHandoff::new(store).upload(&self.session.session, "face", &item.image) {
                Ok(stored) => {
                    self.emit_upload(PipelineStage::Face, 1)?;
                    item.storage_url = Some(stored.url);
                }
                Err(err) => tracing::warn!(error = %format!("{err:#}"), "face upload failed"),
            }
        }
        let path = self.write_image("face", &item.image)?;
        self.state.record_face(item)?;
        self.stage_completed(
            PipelineStage::Face,
            output.degraded,
            output.model.as_deref(),
            &[path],
        )?;
        Ok(output)
    }

    pub fn dataset(&mut self, count: usize) -> Result<DatasetOutput> {
        self.state.ensure_can_run(PipelineStage::Dataset)?;
        self.stage_started(PipelineStage::Dataset)?;
        let face = self
            .state
            .face()
            .map(|item| item.image.clone())
            .unwrap_or_default();
        let mut output = run_dataset(
            &self.kit.context(&self.session, Some(&self.events)),
            &face,
            count,
        )?;

        self.upload_items(PipelineStage::Dataset, &mut output.items)?;
        let paths = self.write_items("dataset", &output.items)?;
        self.state.record_dataset(output.items.clone())?;
        self.stage_completed(
            PipelineStage::Dataset,
            output.degraded,
            output.model.as_deref(),
            &paths,
        )?;
        Ok(output)
    }

    pub fn upscale(&mut self) -> Result<UpscaleOutput> {
        self.state.ensure_can_run(PipelineStage::Upscale)?;
        self.stage_started(PipelineStage::Upscale)?;
        let items = self.state.dataset().to_vec();
        let mut output = run_upscale(
            &self.kit.context(&self.session, Some(&self.events)),
            items,
        )?;

        self.upload_items(PipelineStage::Upscale, &mut output.items)?;
        let paths = self.write_items("upscale", &output.items)?;
        self.state.record_upscaled(output.items.clone())?;
        self.stage_completed(
            PipelineStage::Upscale,
            output.degraded,
            output.model.as_deref(),
            &paths,
        )?;
        Ok(output)
    }

    pub fn voice(&mut self, script: &str, audio: Option<Vec<u8>>) -> Result<VoiceTrack> {
        self.state.ensure_can_run(PipelineStage::Voice)?;
        self.stage_started(PipelineStage::Voice)?;
        let track = run_voice(script, audio)?;

        let mut paths = vec![self.write_file("voice-script.txt", track.script.as_bytes())?];
        if let Some(audio) = track.audio.as_deref() {
            paths.push(self.write_file("voiceover.mp3", audio)?);
        }
        self.state.record_voice(track.clone())?;
        self.stage_completed(PipelineStage::Voice, false, None, &paths)?;
        Ok(track)
    }

    pub fn motion(&mut self, motion_type: MotionType, item: Option<u32>) -> Result<MotionOutput> {
        self.state.ensure_can_run(PipelineStage::Motion)?;
        let image = self.state.motion_input(item)?.image.clone();
        self.stage_started(PipelineStage::Motion)?;
        let output = run_motion(
            &self.kit.context(&self.session, Some(&self.events)),
            &image,
            motion_type,
        )?;

        let mut paths = Vec::new();
        if let Some(video) = output.outcome.video() {
            paths.push(self.write_file("motion.mp4", video)?);
        }
        let degraded = !matches!(output.outcome, MotionOutcome::Completed { .. });
        self.state.record_motion(output.outcome.clone())?;
        self.stage_completed(PipelineStage::Motion, degraded, Some(&output.model), &paths)?;
        Ok(output)
    }

    /// Records a motion step that was deliberately not run.
    pub fn skip_motion(&mut self) -> Result<()> {
        self.state.ensure_can_run(PipelineStage::Motion)?;
        self.state.record_motion(MotionOutcome::Empty {
            operation: "skipped".to_string(),
        })?;
        self.events.emit_stage(
            EventKind::StageSkipped,
            PipelineStage::Motion,
            EventPayload::new(),
        )?;
        Ok(())
    }

    /// Records a motion step whose provider refused the job, so assembly
    /// still packages the images and audio.
    fn motion_unavailable(&mut self, err: &StageError) -> Result<()> {
        tracing::warn!(error = %err, "motion unavailable; continuing without video");
        self.state.record_motion(MotionOutcome::Empty {
            operation: "unavailable".to_string(),
        })?;
        self.events.emit_stage(
            EventKind::StageFailed,
            PipelineStage::Motion,
            map_object(json!({
                "error": err.to_string(),
                "suggestion": err.suggestion(),
                "external_tools": err.external_tools(),
            })),
        )?;
        self.stage_completed(PipelineStage::Motion, true, None, &[])
    }

    pub fn assembly(&mut self) -> Result<AssemblyBundle> {
        self.state.ensure_can_run(PipelineStage::Assembly)?;
        self.stage_started(PipelineStage::Assembly)?;
        let output = run_assembly(AssemblyInput {
            images: self.state.assembly_images(),
            audio: self.state.voice().and_then(|track| track.audio.clone()),
            video: self
                .state
                .motion()
                .and_then(MotionOutcome::video)
                .map(<[u8]>::to_vec),
        });

        let manifest = json!({
            "message": output.message,
            "assets": output.bundle.assets,
            "instructions": output.bundle.instructions,
            "downloads": {
                "images": output.bundle.downloads.images.iter().map(|asset| asset.name.clone()).collect::<Vec<_>>(),
                "audio": output.bundle.downloads.audio.as_ref().map(|asset| asset.name.clone()),
                "video": output.bundle.downloads.video.as_ref().map(|asset| asset.name.clone()),
            }
        });
        let assembly_dir = self.out_dir.join("assembly");
        fs::create_dir_all(&assembly_dir)?;
        let mut paths = Vec::new();
        for asset in &output.bundle.downloads.images {
            let path = assembly_dir.join(&asset.name);
            fs::write(&path, &asset.data)?;
            paths.push(path);
        }
        let manifest_path = assembly_dir.join("assembly.json");
        fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;
        paths.push(manifest_path);

        self.state.record_assembly(output.bundle.clone())?;
        self.stage_completed(PipelineStage::Assembly, false, None, &paths)?;
        Ok(output.bundle)
    }

    /// All six stages in order, then [`StudioRun::finish`].
    pub fn run_all(&mut self, options: &RunOptions) -> Result<RunSummary> {
        self.load_source(options.source.clone())?;
        self.face(options.face_model.as_deref())?;
        self.dataset(options.count)?;
        if self.state.dataset().is_empty() {
            tracing::warn!("dataset is empty; stopping before upscale");
            return self.finish();
        }
        self.upscale()?;
        self.voice(&options.script, options.audio.clone())?;
        if options.skip_motion {
            self.skip_motion()?;
        } else if let Err(err) = self.motion(options.motion, None) {
            let err = err.downcast::<StageError>()?;
            self.motion_unavailable(&err)?;
        }
        self.assembly()?;
        self.finish()
    }

    pub fn finish(&mut self) -> Result<RunSummary> {
        let summary_path = self.out_dir.join("summary.json");
        let total_images = self
            .state
            .assembly()
            .map(|bundle| bundle.assets.image_count)
            .unwrap_or_else(|| self.state.assembly_images().len()) as u64;
        let summary = RunSummary {
            session_id: self.session.session.to_string(),
            started_at: self.started_at.clone(),
            finished_at: now_utc_iso(),
            stages_completed: self.stages_completed.clone(),
            degraded_stages: self.degraded_stages.clone(),
            total_images,
            has_video: self.state.motion().and_then(MotionOutcome::video).is_some(),
            artifacts: self.artifacts.clone(),
        };
        write_summary(&summary_path, &summary, None)?;
        self.events.emit(
            EventKind::RunFinished,
            map_object(json!({
                "summary_path": summary_path.to_string_lossy(),
            })),
        )?;
        Ok(summary)
    }

    fn upload_items(&self, stage: PipelineStage, items: &mut [DatasetItem]) -> Result<()> {
        let Some(store) = self.store.as_deref() else {
            return Ok(());
        };
        let renamed: Vec<DatasetItem> = items
            .iter()
            .map(|item| {
                DatasetItem::new(item.id, storage_name(stage, &item.label), item.image.clone())
            })
            .collect();
        let stored = StorageHandoff::new(store).upload_batch(&self.session.session, &renamed);
        attach_urls(items, &stored);
        self.emit_upload(stage, stored.len())
    }

    fn stage_started(&self, stage: PipelineStage) -> Result<()> {
        tracing::info!(%stage, step = stage.number(), "stage started");
        self.events
            .emit_stage(EventKind::StageStarted, stage, EventPayload::new())?;
        Ok(())
    }

    fn stage_completed(
        &mut self,
        stage: PipelineStage,
        degraded: bool,
        model: Option<&str>,
        paths: &[PathBuf],
    ) -> Result<()> {
        if degraded {
            tracing::warn!(%stage, "stage completed without enhancement");
            self.degraded_stages.push(stage.as_str().to_string());
        } else {
            tracing::info!(%stage, model = model.unwrap_or("-"), "stage completed");
        }
        self.stages_completed.push(stage.as_str().to_string());
        for path in paths {
            self.artifacts.push(map_object(json!({
                "stage": stage.as_str(),
                "path": path.to_string_lossy(),
            })));
        }
        self.events.emit_stage(
            EventKind::StageCompleted,
            stage,
            map_object(json!({
                "degraded": degraded,
                "model": model,
                "artifacts": paths.iter().map(|path| path.to_string_lossy().to_string()).collect::<Vec<_>>(),
            })),
        )?;
        Ok(())
    }

    fn emit_upload(&self, stage: PipelineStage, count: usize) -> Result<()> {
        self.events.emit_stage(
            EventKind::StorageUploaded,
            stage,
            map_object(json!({ "count": count })),
        )?;
        Ok(())
    }

    fn write_items(&self, dir: &str, items: &[DatasetItem]) -> Result<Vec<PathBuf>> {
        items
            .iter()
            .map(|item| {
                let stem = format!("{dir}/{:02}-{}", item.id, file_stem(&item.label));
                self.write_image(&stem, &item.image)
            })
            .collect()
    }

    fn write_image(&self, stem: &str, bytes: &[u8]) -> Result<PathBuf> {
        self.write_file(&format!("{stem}.{}", sniff_image_extension(bytes)), bytes)
    }

    fn write_file(&self, relative: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.out_dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

fn storage_name(stage: PipelineStage, label: &str) -> String {
    match stage {
        PipelineStage::Upscale => format!("upscaled_{label}"),
        _ => label.to_string(),
    }
}

fn attach_urls(items: &mut [DatasetItem], stored: &[StoredItem]) {
    for item in items.iter_mut() {
        item.storage_url = stored
            .iter()
            .find(|entry| entry.id == item.id)
            .map(|entry| entry.url.clone());
    }
}

fn file_stem(label: &str) -> String {
    label
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' { ch } else { '-' })
        .collect()
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
