use chrono::{DateTime, Local};
use image::RgbImage;

use crate::classifier::{AttentionColor, Classification};
use crate::face::BoundingBox;

/// A captured image, channel order R, G, B.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbImage,
    captured_at: DateTime<Local>,
}

impl Frame {
    pub fn new(image: RgbImage, captured_at: DateTime<Local>) -> Self {
        Self { image, captured_at }
    }

    pub fn now(image: RgbImage) -> Self {
        Self::new(image, Local::now())
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaceOverlay {
    pub bbox: BoundingBox,
    pub label: String,
}

/// Drawing instructions for one frame. Rendering happens on the consumer side.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub face: Option<FaceOverlay>,
    pub color: AttentionColor,
    pub fps_text: String,
}

impl Overlay {
    pub fn new(classification: &Classification, fps: f32) -> Self {
        Self {
            face: classification.face.map(|bbox| FaceOverlay {
                bbox,
                label: classification.state.label().to_string(),
            }),
            color: classification.color,
            // whole frames per second, truncated
            fps_text: format!("{}", fps.max(0.0) as u32),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    pub frame: Frame,
    pub classification: Classification,
    pub overlay: Overlay,
}

impl AnnotatedFrame {
    pub fn new(frame: Frame, classification: Classification, fps: f32) -> Self {
        let overlay = Overlay::new(&classification, fps);
        Self {
            frame,
            classification,
            overlay,
        }
    }
}
