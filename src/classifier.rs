//! Geometric attention classification from the five facial keypoints.
//!
//! Thresholds are pixel offsets at the detector's working resolution and assume
//! a frontal capture of roughly 640x480.

use std::fmt;

use image::Rgb;
use nalgebra as na;

use crate::face::{BoundingBox, Detection, FaceKeypoints, Landmark};

const ATTENTIVE_DX: f32 = 10.0;
const ATTENTIVE_DY: f32 = 40.0;
const TURNED_DX: f32 = 15.0;
const LOOKING_UP_DY: f32 = -40.0;
const LOOKING_DOWN_DY: f32 = -15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttentionState {
    Attentive,
    LookingLeft,
    LookingRight,
    LookingUp,
    LookingDown,
    NotAttentive,
}

impl AttentionState {
    pub fn label(self) -> &'static str {
        match self {
            AttentionState::Attentive => "Attentive",
            AttentionState::LookingLeft => "Not Attentive: Looking Left",
            AttentionState::LookingRight => "Not Attentive: Looking Right",
            AttentionState::LookingUp => "Not Attentive: Looking Up",
            AttentionState::LookingDown => "Not Attentive: Looking Down",
            AttentionState::NotAttentive => "Not Attentive",
        }
    }

    pub fn color(self) -> AttentionColor {
        match self {
            AttentionState::Attentive => AttentionColor::Green,
            _ => AttentionColor::Red,
        }
    }
}

impl fmt::Display for AttentionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttentionColor {
    Green,
    Red,
}

impl AttentionColor {
    pub fn rgb(self) -> Rgb<u8> {
        match self {
            AttentionColor::Green => Rgb([0, 255, 0]),
            AttentionColor::Red => Rgb([255, 0, 0]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub state: AttentionState,
    pub face: Option<BoundingBox>,
    pub color: AttentionColor,
}

impl Classification {
    pub fn no_face() -> Self {
        Self {
            state: AttentionState::NotAttentive,
            face: None,
            color: AttentionColor::Red,
        }
    }
}

/// Offsets of the eye and mouth centers relative to the nose tip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceGeometry {
    pub dx: f32,
    pub dy_eye_nose: f32,
    // measured alongside the others but not part of the decision
    pub dy_mouth_nose: f32,
}

impl FaceGeometry {
    pub fn measure(keypoints: &FaceKeypoints) -> Self {
        let eye_center = na::center(
            &keypoints.get_point(Landmark::LeftEye),
            &keypoints.get_point(Landmark::RightEye),
        );
        let mouth_center = na::center(
            &keypoints.get_point(Landmark::LeftMouth),
            &keypoints.get_point(Landmark::RightMouth),
        );
        let nose = keypoints.get_point(Landmark::Nose);

        Self {
            dx: eye_center.x - nose.x,
            dy_eye_nose: eye_center.y - nose.y,
            dy_mouth_nose: mouth_center.y - nose.y,
        }
    }

    /// First matching rule wins. The bands overlap; order is the contract.
    pub fn attention_state(&self) -> AttentionState {
        if self.dx.abs() < ATTENTIVE_DX && self.dy_eye_nose.abs() < ATTENTIVE_DY {
            AttentionState::Attentive
        } else if self.dx > TURNED_DX {
            AttentionState::LookingLeft
        } else if self.dx < -TURNED_DX {
            AttentionState::LookingRight
        } else if self.dy_eye_nose > LOOKING_UP_DY {
            AttentionState::LookingUp
        } else if self.dy_eye_nose < LOOKING_DOWN_DY {
            AttentionState::LookingDown
        } else {
            AttentionState::NotAttentive
        }
    }
}

/// Classifies the first detection only; additional faces are ignored.
pub fn classify(detections: &[Detection]) -> Classification {
    let Some(face) = detections.first() else {
        return Classification::no_face();
    };

    let geometry = FaceGeometry::measure(&face.keypoints);
    log::trace!(
        "horizontal {:.1} vertical {:.1} mouth {:.1}",
        geometry.dx,
        geometry.dy_eye_nose,
        geometry.dy_mouth_nose
    );

    let state = geometry.attention_state();
    Classification {
        state,
        face: Some(face.bbox),
        color: state.color(),
    }
}
