use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;

use crate::config::RecordingConfig;
use crate::error::{ControllerError, PipelineError};
use crate::face_detection::FaceDetectionModel;
use crate::handoff::FrameSlot;
use crate::recorder::SessionRecorder;
use crate::webcam::FrameSource;
use crate::worker::{SpawnError, Worker, WorkerMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Preview,
    Record,
}

impl From<WorkerMode> for Mode {
    fn from(mode: WorkerMode) -> Self {
        match mode {
            WorkerMode::Preview => Mode::Preview,
            WorkerMode::Record => Mode::Record,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordingSettings {
    pub output_dir: PathBuf,
    pub sampling_period: Duration,
}

impl From<&RecordingConfig> for RecordingSettings {
    fn from(config: &RecordingConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            sampling_period: config.sampling_period(),
        }
    }
}

/// Owns the frame source and decides which worker, if any, may use it.
///
/// Every transition retires the running worker (stop, then join) before the
/// next one is spawned. Transitions take `&mut self`, so two can never overlap.
pub struct ModeController {
    // held here only while no worker is running
    source: Option<Box<dyn FrameSource>>,
    detector: Arc<dyn FaceDetectionModel>,
    slot: FrameSlot,
    settings: RecordingSettings,
    active: Option<Worker>,
    errors: VecDeque<PipelineError>,
}

impl ModeController {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Arc<dyn FaceDetectionModel>,
        slot: FrameSlot,
        settings: RecordingSettings,
    ) -> Self {
        Self {
            source: Some(source),
            detector,
            slot,
            settings,
            active: None,
            errors: VecDeque::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.active
            .as_ref()
            .map_or(Mode::Idle, |worker| worker.mode().into())
    }

    /// True while a camera is attached, whether idle or lent to a worker.
    ///
    /// A worker that already stopped is reaped first, so a camera lost to a
    /// device failure is reported as gone even before `poll`.
    pub fn has_frame_source(&mut self) -> bool {
        self.reap_finished();
        self.source.is_some() || self.active.is_some()
    }

    pub fn session_path(&self) -> Option<&Path> {
        self.active.as_ref().and_then(Worker::session_path)
    }

    pub fn start_preview(&mut self) -> Result<(), ControllerError> {
        self.switch_mode(Mode::Preview)
    }

    /// The operator's record button: Record goes back to Preview, anything else records.
    pub fn toggle_recording(&mut self) -> Result<Mode, ControllerError> {
        let target = if self.mode() == Mode::Record {
            Mode::Preview
        } else {
            Mode::Record
        };
        self.switch_mode(target)?;
        Ok(target)
    }

    pub fn switch_mode(&mut self, target: Mode) -> Result<(), ControllerError> {
        self.reap_finished();
        if self.mode() == target {
            return Ok(());
        }

        self.retire();
        log::info!("switching to {target:?}");

        match target {
            Mode::Idle => Ok(()),
            Mode::Preview => self.spawn_preview(),
            Mode::Record => self.spawn_record(),
        }
    }

    /// Reaps a worker that stopped on its own and returns the oldest
    /// unreported failure, if any.
    pub fn poll(&mut self) -> Option<PipelineError> {
        self.reap_finished();
        self.errors.pop_front()
    }

    /// Stops any worker and releases the camera. Nothing can be started afterwards.
    pub fn release(&mut self) -> Vec<PipelineError> {
        self.retire();
        if let Some(source) = self.source.take() {
            log::info!("releasing {}", source.name());
        }
        self.errors.drain(..).collect()
    }

    fn reap_finished(&mut self) {
        if self.active.as_ref().map_or(false, Worker::is_finished) {
            self.retire();
        }
    }

    fn retire(&mut self) {
        let Some(worker) = self.active.take() else {
            return;
        };

        let mode = worker.mode();
        worker.request_stop();
        let exit = worker.join();

        self.source = exit.source;
        match exit.result {
            Ok(()) => log::info!("{mode:?} worker stopped"),
            Err(err) => {
                log::error!("{mode:?} worker failed: {err}");
                self.errors.push_back(err);
            }
        }
    }

    fn take_source(&mut self) -> Result<Box<dyn FrameSource>, ControllerError> {
        self.source.take().ok_or(ControllerError::NoFrameSource)
    }

    fn spawn_preview(&mut self) -> Result<(), ControllerError> {
        let source = self.take_source()?;
        let spawned = Worker::spawn_preview(source, Arc::clone(&self.detector), self.slot.clone());
        self.install(spawned)
    }

    fn spawn_record(&mut self) -> Result<(), ControllerError> {
        if self.source.is_none() {
            return Err(ControllerError::NoFrameSource);
        }
        // open the session first so a bad output directory leaves the camera here
        let recorder = SessionRecorder::create(&self.settings.output_dir, Local::now())?;
        let source = self.take_source()?;

        let spawned = Worker::spawn_record(
            source,
            Arc::clone(&self.detector),
            recorder,
            self.settings.sampling_period,
        );
        self.install(spawned)
    }

    fn install(&mut self, spawned: Result<Worker, SpawnError>) -> Result<(), ControllerError> {
        match spawned {
            Ok(worker) => {
                self.active = Some(worker);
                Ok(())
            }
            Err(SpawnError { source, error }) => {
                self.source = Some(source);
                Err(ControllerError::Spawn(error))
            }
        }
    }
}

impl Drop for ModeController {
    fn drop(&mut self) {
        for err in self.release() {
            log::warn!("unreported failure at shutdown: {err}");
        }
    }
}
