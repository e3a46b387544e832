use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::args::Args;
use crate::error::ConfigError;
use crate::webcam::CameraProperty;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub camera: CameraConfig,
    pub detector: DetectorConfig,
    pub recording: RecordingConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub frame_timeout_ms: u64,
    // manual property values, applied after the stream opens
    pub properties: BTreeMap<CameraProperty, i32>,
    pub auto_exposure: Option<bool>,
    pub auto_white_balance: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub input_width: u32,
    pub input_height: u32,
    pub allow_gpu: bool,
    pub intra_threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub output_dir: PathBuf,
    pub sampling_period_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub window_title: String,
    pub refresh_interval_ms: u64,
    pub font_path: Option<PathBuf>,
    pub font_size: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: 640,
            height: 480,
            fps: 30,
            frame_timeout_ms: 2000,
            properties: BTreeMap::new(),
            auto_exposure: None,
            auto_white_balance: None,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/det_500m.onnx"),
            score_threshold: 0.6,
            nms_threshold: 0.4,
            input_width: 640,
            input_height: 480,
            allow_gpu: true,
            intra_threads: 4,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            sampling_period_ms: 100,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            window_title: "Attention Classification".to_string(),
            refresh_interval_ms: 5,
            font_path: Some(PathBuf::from(
                "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            )),
            font_size: 18.0,
        }
    }
}

impl RecordingConfig {
    pub fn sampling_period(&self) -> Duration {
        Duration::from_millis(self.sampling_period_ms)
    }
}

impl UiConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

impl AppConfig {
    /// Loads `path`, falling back to defaults when the file does not exist.
    /// Sections and fields missing from the file keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!("no configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn apply_args(mut self, args: &Args) -> Self {
        if let Some(index) = args.camera {
            self.camera.device_index = index;
        }
        if let Some(model) = &args.model {
            self.detector.model_path = model.clone();
        }
        if let Some(dir) = &args.output_dir {
            self.recording.output_dir = dir.clone();
        }
        if args.cpu_only {
            self.detector.allow_gpu = false;
        }
        self
    }
}
