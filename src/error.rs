use std::path::PathBuf;

use thiserror::Error;

/// Failures of the capture device. Fatal to the worker that owns the camera.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("no capture device at index {0}")]
    DeviceNotFound(u32),
    #[error("device {device} reports no usable capture format")]
    NoFormat { device: u32 },
    #[error("failed to open a stream on device {device}")]
    OpenFailed { device: u32 },
    #[error("camera stream is no longer open")]
    Disconnected,
    #[error("no frame delivered within {0} ms")]
    Timeout(u64),
    #[error("frame capture failed with code {0}")]
    CaptureFailed(u32),
    #[error("captured buffer does not match {width}x{height} RGB")]
    BadBuffer { width: u32, height: u32 },
}

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("onnxruntime: {0}")]
    Runtime(#[from] ort::Error),
    #[error("model returned {0} outputs, expected 9")]
    UnexpectedOutputs(usize),
    #[error("detector model not found at {0}")]
    ModelMissing(PathBuf),
}

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("cannot create session file {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("write to {path} failed: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a worker stopped before it was asked to.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("camera: {0}")]
    Camera(#[from] CameraError),
    #[error("recording: {0}")]
    Recorder(#[from] RecorderError),
    #[error("worker thread panicked")]
    WorkerPanicked,
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("no camera is attached; restart the application to reattach it")]
    NoFrameSource,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("recording: {0}")]
    Recorder(#[from] RecorderError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
