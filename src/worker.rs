//! Background capture loops.
//!
//! A worker owns the frame source for as long as its thread runs and hands it
//! back through the join handle, so the camera can only ever be read by one
//! loop at a time.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Local;

use crate::classifier::classify;
use crate::error::PipelineError;
use crate::face_detection::{detect_or_empty, FaceDetectionModel};
use crate::frame::AnnotatedFrame;
use crate::handoff::FrameSlot;
use crate::recorder::{LogRow, SessionRecorder};
use crate::webcam::FrameSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    Preview,
    Record,
}

/// What a worker leaves behind when its thread ends.
pub struct WorkerExit {
    /// `None` after a device failure: a broken camera is not handed on.
    pub source: Option<Box<dyn FrameSource>>,
    pub result: Result<(), PipelineError>,
}

/// A worker thread the OS refused to start. The camera never left the caller.
pub struct SpawnError {
    pub source: Box<dyn FrameSource>,
    pub error: io::Error,
}

pub struct Worker {
    mode: WorkerMode,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<WorkerExit>,
    session_path: Option<PathBuf>,
}

impl Worker {
    pub fn spawn_preview(
        source: Box<dyn FrameSource>,
        detector: Arc<dyn FaceDetectionModel>,
        slot: FrameSlot,
    ) -> Result<Worker, SpawnError> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let builder = thread::Builder::new().name("preview-worker".into());
        let handle = launch(builder, source, (), move |mut source, ()| {
            log::info!("preview started on {}", source.name());
            let result = run_preview(source.as_mut(), detector.as_ref(), &slot, &stop_flag);
            hand_back(source, result)
        })
        .map_err(|unlaunched| SpawnError {
            source: unlaunched.source,
            error: unlaunched.error,
        })?;

        Ok(Worker {
            mode: WorkerMode::Preview,
            stop,
            handle,
            session_path: None,
        })
    }

    pub fn spawn_record(
        source: Box<dyn FrameSource>,
        detector: Arc<dyn FaceDetectionModel>,
        recorder: SessionRecorder,
        sampling_period: Duration,
    ) -> Result<Worker, SpawnError> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let session_path = recorder.path().to_path_buf();

        let builder = thread::Builder::new().name("record-worker".into());
        let handle = launch(builder, source, recorder, move |mut source, mut recorder| {
            log::info!(
                "recording started on {} every {:?}",
                source.name(),
                sampling_period
            );

            let outcome = run_record(
                source.as_mut(),
                detector.as_ref(),
                &mut recorder,
                sampling_period,
                &stop_flag,
            );

            // the session is closed before the camera leaves this thread
            let result = match (outcome, recorder.finish()) {
                (Ok(()), Ok(_)) => Ok(()),
                (Ok(()), Err(err)) => Err(err.into()),
                (Err(err), Ok(_)) => Err(err),
                (Err(err), Err(close_err)) => {
                    log::error!("closing session after failure: {close_err}");
                    Err(err)
                }
            };
            hand_back(source, result)
        })
        .map_err(|unlaunched| {
            if let Err(err) = unlaunched.payload.finish() {
                log::warn!("closing unused session: {err}");
            }
            SpawnError {
                source: unlaunched.source,
                error: unlaunched.error,
            }
        })?;

        Ok(Worker {
            mode: WorkerMode::Record,
            stop,
            handle,
            session_path: Some(session_path),
        })
    }

    pub fn mode(&self) -> WorkerMode {
        self.mode
    }

    pub fn session_path(&self) -> Option<&Path> {
        self.session_path.as_deref()
    }

    /// Asks the loop to end after its current iteration.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Blocks until the thread has exited.
    pub fn join(self) -> WorkerExit {
        match self.handle.join() {
            Ok(exit) => exit,
            Err(_) => {
                log::error!("{:?} worker panicked; camera lost", self.mode);
                WorkerExit {
                    source: None,
                    result: Err(PipelineError::WorkerPanicked),
                }
            }
        }
    }
}

struct Unlaunched<T> {
    error: io::Error,
    source: Box<dyn FrameSource>,
    payload: T,
}

// The camera is sent to the thread only once it exists, so a failed spawn
// leaves it with the caller.
fn launch<T, F>(
    builder: thread::Builder,
    source: Box<dyn FrameSource>,
    payload: T,
    body: F,
) -> Result<JoinHandle<WorkerExit>, Unlaunched<T>>
where
    T: Send + 'static,
    F: FnOnce(Box<dyn FrameSource>, T) -> WorkerExit + Send + 'static,
{
    let (sender, receiver) = mpsc::sync_channel::<(Box<dyn FrameSource>, T)>(1);

    let spawned = builder.spawn(move || match receiver.recv() {
        Ok((source, payload)) => body(source, payload),
        Err(_) => WorkerExit {
            source: None,
            result: Ok(()),
        },
    });
    let handle = match spawned {
        Ok(handle) => handle,
        Err(error) => {
            return Err(Unlaunched {
                error,
                source,
                payload,
            })
        }
    };

    match sender.send((source, payload)) {
        Ok(()) => Ok(handle),
        Err(mpsc::SendError((source, payload))) => Err(Unlaunched {
            error: io::Error::new(io::ErrorKind::Other, "worker exited before it started"),
            source,
            payload,
        }),
    }
}

fn hand_back(source: Box<dyn FrameSource>, result: Result<(), PipelineError>) -> WorkerExit {
    let source = match &result {
        Err(PipelineError::Camera(err)) => {
            log::error!("{}: {err}; releasing device", source.name());
            drop(source);
            None
        }
        _ => Some(source),
    };
    WorkerExit { source, result }
}

fn run_preview(
    source: &mut dyn FrameSource,
    detector: &dyn FaceDetectionModel,
    slot: &FrameSlot,
    stop: &AtomicBool,
) -> Result<(), PipelineError> {
    while !stop.load(Ordering::Acquire) {
        let started = Instant::now();

        let frame = source.read()?;
        let classification = classify(&detect_or_empty(detector, frame.image()));
        let fps = 1.0 / started.elapsed().as_secs_f32();

        slot.publish(AnnotatedFrame::new(frame, classification, fps));
    }
    Ok(())
}

fn run_record(
    source: &mut dyn FrameSource,
    detector: &dyn FaceDetectionModel,
    recorder: &mut SessionRecorder,
    sampling_period: Duration,
    stop: &AtomicBool,
) -> Result<(), PipelineError> {
    while !stop.load(Ordering::Acquire) {
        let started = Instant::now();

        let frame = source.read()?;
        let state = classify(&detect_or_empty(detector, frame.image())).state;
        recorder.append(&LogRow {
            timestamp: Local::now(),
            state,
        })?;

        // a slow detector just lowers the effective rate
        if let Some(remaining) = sampling_period.checked_sub(started.elapsed()) {
            thread::sleep(remaining);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CameraError;
    use crate::frame::Frame;
    use image::RgbImage;

    struct Still;

    impl FrameSource for Still {
        fn read(&mut self) -> Result<Frame, CameraError> {
            Ok(Frame::now(RgbImage::new(2, 2)))
        }

        fn name(&self) -> &str {
            "still"
        }
    }

    fn finish_at_once(source: Box<dyn FrameSource>, _: u8) -> WorkerExit {
        WorkerExit {
            source: Some(source),
            result: Ok(()),
        }
    }

    #[test]
    fn launched_thread_receives_camera_and_payload() {
        let handle = launch(thread::Builder::new(), Box::new(Still), 7u8, |source, payload| {
            assert_eq!(payload, 7);
            finish_at_once(source, payload)
        })
        .map_err(|unlaunched| unlaunched.error)
        .expect("spawn");

        let exit = handle.join().expect("worker thread");
        assert!(exit.result.is_ok());
        assert_eq!(exit.source.map(|s| s.name().to_string()), Some("still".into()));
    }

    #[test]
    fn refused_thread_leaves_camera_with_caller() {
        // no address space can hold this stack
        let builder = thread::Builder::new().stack_size(usize::MAX / 2);
        let Err(unlaunched) = launch(builder, Box::new(Still), 7u8, finish_at_once) else {
            panic!("thread with an impossible stack was spawned");
        };

        assert_eq!(unlaunched.payload, 7);
        assert_eq!(unlaunched.source.name(), "still");
    }
}
