pub mod model_scrfd;

use std::panic::{self, AssertUnwindSafe};

use image::RgbImage;

use crate::error::DetectionError;
use crate::face::Detection;

/// A face detector producing boxes and five keypoints per face.
///
/// Implementations return detections ordered by confidence, best first.
pub trait FaceDetectionModel: Send + Sync {
    fn run(&self, image: &RgbImage) -> Result<Vec<Detection>, DetectionError>;
}

/// Runs `model`, treating any failure as "no face in this frame".
///
/// A panic inside the model is contained here as well, so one bad frame
/// never unwinds the capture loop that owns the camera.
pub fn detect_or_empty(model: &dyn FaceDetectionModel, image: &RgbImage) -> Vec<Detection> {
    match panic::catch_unwind(AssertUnwindSafe(|| model.run(image))) {
        Ok(Ok(detections)) => detections,
        Ok(Err(err)) => {
            log::debug!("detector failed on frame, treating as no detection: {err}");
            Vec::new()
        }
        Err(_) => {
            log::debug!("detector panicked on frame, treating as no detection");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::{BoundingBox, FaceKeypoints};

    struct Failing;

    impl FaceDetectionModel for Failing {
        fn run(&self, _image: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
            Err(DetectionError::UnexpectedOutputs(0))
        }
    }

    struct Panicking;

    impl FaceDetectionModel for Panicking {
        fn run(&self, _image: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
            panic!("corrupt frame");
        }
    }

    struct Fixed(Detection);

    impl FaceDetectionModel for Fixed {
        fn run(&self, _image: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
            Ok(vec![self.0.clone()])
        }
    }

    #[test]
    fn failures_become_empty_detections() {
        let image = RgbImage::new(4, 4);
        assert!(detect_or_empty(&Failing, &image).is_empty());
    }

    #[test]
    fn panics_become_empty_detections() {
        let image = RgbImage::new(4, 4);
        assert!(detect_or_empty(&Panicking, &image).is_empty());
    }

    #[test]
    fn successes_pass_through() {
        let detection = Detection {
            bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            keypoints: FaceKeypoints::from_flat(&[0.0; 10]),
            score: 0.7,
        };
        let image = RgbImage::new(4, 4);
        assert_eq!(detect_or_empty(&Fixed(detection.clone()), &image), vec![detection]);
    }
}
