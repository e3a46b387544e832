// SCRFD face detector (InsightFace `det_*` models) running on onnxruntime.
//
// The network predicts, for each of three feature strides, a score, four box
// distances and five keypoint offsets per anchor. Two anchors share each
// feature map cell.

use std::sync::{Mutex, PoisonError};

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use rayon::prelude::*;

use crate::config::DetectorConfig;
use crate::error::DetectionError;
use crate::face::{BoundingBox, Detection, FaceKeypoints};
use crate::face_detection::FaceDetectionModel;

const STRIDES: [u32; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 128.0;

pub struct ScrfdModel {
    // running a session needs exclusive access
    session: Mutex<Session>,
    input_width: u32,
    input_height: u32,
    score_threshold: f32,
    nms_threshold: f32,
}

impl ScrfdModel {
    pub fn new(config: &DetectorConfig) -> Result<Self, DetectionError> {
        if !config.model_path.is_file() {
            return Err(DetectionError::ModelMissing(config.model_path.clone()));
        }

        // providers that fail to register are skipped, so CPU is always last resort
        let mut providers = Vec::new();
        if config.allow_gpu {
            providers.push(CUDAExecutionProvider::default().build());
        }
        providers.push(CPUExecutionProvider::default().build());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads)?
            .with_execution_providers(providers)?
            .commit_from_file(&config.model_path)?;

        // feature maps must tile the input exactly at the coarsest stride
        let coarsest = STRIDES[STRIDES.len() - 1];
        let input_width = (config.input_width / coarsest).max(1) * coarsest;
        let input_height = (config.input_height / coarsest).max(1) * coarsest;

        log::info!(
            "loaded face detector {} ({}x{}, gpu allowed: {})",
            config.model_path.display(),
            input_width,
            input_height,
            config.allow_gpu
        );

        Ok(ScrfdModel {
            session: Mutex::new(session),
            input_width,
            input_height,
            score_threshold: config.score_threshold,
            nms_threshold: config.nms_threshold,
        })
    }

    fn preprocess(&self, image: &RgbImage) -> (Array4<f32>, Letterbox) {
        let letterbox = Letterbox::fit(
            image.width(),
            image.height(),
            self.input_width,
            self.input_height,
        );
        let resized =
            image::imageops::resize(image, letterbox.width, letterbox.height, FilterType::Triangle);

        // padding is black after normalization, same as the reference preprocessing
        let mut input = Array4::from_elem(
            (1, 3, self.input_height as usize, self.input_width as usize),
            -PIXEL_MEAN / PIXEL_STD,
        );
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - PIXEL_MEAN) / PIXEL_STD;
            }
        }

        (input, letterbox)
    }
}

impl FaceDetectionModel for ScrfdModel {
    fn run(&self, image: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
        let (input, letterbox) = self.preprocess(image);

        let shape = input.shape().to_vec();
        let input = Tensor::from_array((shape, input.into_raw_vec()))?;

        // outputs: scores for every stride, then box distances, then keypoints
        let tensors: Vec<Vec<f32>> = {
            let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            let outputs = session.run(ort::inputs![input])?;

            if outputs.len() != STRIDES.len() * 3 {
                return Err(DetectionError::UnexpectedOutputs(outputs.len()));
            }
            let mut tensors = Vec::with_capacity(outputs.len());
            for index in 0..outputs.len() {
                let (_, data) = outputs[index].try_extract_tensor::<f32>()?;
                tensors.push(data.to_vec());
            }
            tensors
        };

        let levels = STRIDES.len();
        let candidates: Vec<Detection> = (0..levels)
            .into_par_iter()
            .flat_map_iter(|level| {
                decode_level(
                    &tensors[level],
                    &tensors[level + levels],
                    &tensors[level + levels * 2],
                    STRIDES[level],
                    self.input_width,
                    self.score_threshold,
                )
            })
            .collect();

        let restore = 1.0 / letterbox.scale;
        Ok(non_max_suppression(candidates, self.nms_threshold)
            .into_iter()
            .map(|d| Detection {
                bbox: d.bbox.scale(restore),
                keypoints: d.keypoints.scale(restore),
                score: d.score,
            })
            .collect())
    }
}

/// Aspect-preserving resize of the frame into the top-left of the model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Letterbox {
    pub width: u32,
    pub height: u32,
    pub scale: f32,
}

impl Letterbox {
    pub fn fit(image_width: u32, image_height: u32, input_width: u32, input_height: u32) -> Self {
        let image_ratio = image_height as f32 / image_width as f32;
        let model_ratio = input_height as f32 / input_width as f32;

        let (width, height) = if image_ratio > model_ratio {
            (((input_height as f32) / image_ratio) as u32, input_height)
        } else {
            (input_width, ((input_width as f32) * image_ratio) as u32)
        };
        let (width, height) = (width.max(1), height.max(1));

        Letterbox {
            width,
            height,
            scale: height as f32 / image_height as f32,
        }
    }
}

pub(crate) fn decode_level(
    scores: &[f32],
    distances: &[f32],
    keypoints: &[f32],
    stride: u32,
    input_width: u32,
    threshold: f32,
) -> Vec<Detection> {
    let columns = (input_width / stride) as usize;
    let s = stride as f32;

    scores
        .iter()
        .enumerate()
        .filter(|(_, &score)| score >= threshold)
        .filter_map(|(i, &score)| {
            let cell = i / ANCHORS_PER_CELL;
            let cx = (cell % columns) as f32 * s;
            let cy = (cell / columns) as f32 * s;

            let d = distances.get(i * 4..i * 4 + 4)?;
            let k = keypoints.get(i * 10..i * 10 + 10)?;

            let bbox = BoundingBox::new(cx - d[0] * s, cy - d[1] * s, cx + d[2] * s, cy + d[3] * s);
            let mut flat = [0.0f32; 10];
            for p in 0..5 {
                flat[p * 2] = cx + k[p * 2] * s;
                flat[p * 2 + 1] = cy + k[p * 2 + 1] * s;
            }

            Some(Detection {
                bbox,
                keypoints: FaceKeypoints::from_flat(&flat),
                score,
            })
        })
        .collect()
}

/// Greedy NMS; the result is ordered by descending score.
pub(crate) fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        if kept
            .iter()
            .all(|k| k.bbox.intersection_over_union(&candidate.bbox) <= iou_threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::Landmark;

    fn boxed(x0: f32, score: f32) -> Detection {
        Detection {
            bbox: BoundingBox::new(x0, 0.0, x0 + 10.0, 10.0),
            keypoints: FaceKeypoints::from_flat(&[0.0; 10]),
            score,
        }
    }

    #[test]
    fn letterbox_keeps_aspect_of_wide_frames() {
        let lb = Letterbox::fit(1280, 720, 640, 480);
        assert_eq!((lb.width, lb.height), (640, 360));
        assert!((lb.scale - 0.5).abs() < 1e-6);
    }

    #[test]
    fn letterbox_keeps_aspect_of_tall_frames() {
        let lb = Letterbox::fit(480, 960, 640, 480);
        assert_eq!((lb.width, lb.height), (240, 480));
        assert!((lb.scale - 0.5).abs() < 1e-6);
    }

    #[test]
    fn decode_maps_anchor_index_to_cell_center() {
        // stride 8 on a 32 px wide input gives 4 columns; anchor 11 is cell 5 = (1, 1)
        let mut scores = vec![0.0; 32];
        scores[11] = 0.9;
        let mut distances = vec![0.0; 32 * 4];
        distances[44..48].copy_from_slice(&[1.0, 1.0, 2.0, 2.0]);
        let mut keypoints = vec![0.0; 32 * 10];
        keypoints[110..120].copy_from_slice(&[-1.0, -1.0, 1.0, -1.0, 0.0, 0.0, -1.0, 1.0, 1.0, 1.0]);

        let decoded = decode_level(&scores, &distances, &keypoints, 8, 32, 0.5);
        assert_eq!(decoded.len(), 1);
        let face = &decoded[0];
        assert_eq!(face.bbox, BoundingBox::new(0.0, 0.0, 24.0, 24.0));
        assert_eq!(face.keypoints.get_point(Landmark::Nose).coords.as_slice(), &[8.0, 8.0]);
        assert_eq!(face.keypoints.get_point(Landmark::LeftEye).coords.as_slice(), &[0.0, 0.0]);
        assert_eq!(face.score, 0.9);
    }

    #[test]
    fn decode_skips_low_scores() {
        let decoded = decode_level(&[0.1, 0.59], &[0.0; 8], &[0.0; 20], 8, 16, 0.6);
        assert!(decoded.is_empty());
    }

    #[test]
    fn nms_keeps_best_of_overlapping_boxes() {
        let kept = non_max_suppression(vec![boxed(0.0, 0.7), boxed(1.0, 0.9), boxed(50.0, 0.8)], 0.4);
        let scores: Vec<f32> = kept.iter().map(|d| d.score).collect();
        assert_eq!(scores, vec![0.9, 0.8]);
    }
}
