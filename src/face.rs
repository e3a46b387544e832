use nalgebra::Point2;

pub type Point = Point2<f32>;

// the five landmarks the detector emits, in output order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Landmark {
    LeftEye,
    RightEye,
    Nose,
    LeftMouth,
    RightMouth,
}

impl Landmark {
    fn index(self) -> usize {
        self as usize
    }
}

/// Five facial keypoints in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceKeypoints {
    points: [Point; 5],
}

impl FaceKeypoints {
    pub fn new(
        left_eye: Point,
        right_eye: Point,
        nose: Point,
        left_mouth: Point,
        right_mouth: Point,
    ) -> Self {
        Self {
            points: [left_eye, right_eye, nose, left_mouth, right_mouth],
        }
    }

    // construct from 10 interleaved coordinates (x0, y0, x1, y1, ...)
    pub fn from_flat(coords: &[f32; 10]) -> Self {
        let mut points = [Point::origin(); 5];
        for (i, point) in points.iter_mut().enumerate() {
            *point = Point::new(coords[i * 2], coords[i * 2 + 1]);
        }
        Self { points }
    }

    pub fn get_point(&self, landmark: Landmark) -> Point {
        self.points[landmark.index()]
    }

    pub fn scale(&self, factor: f32) -> Self {
        Self {
            points: self.points.map(|p| Point::new(p.x * factor, p.y * factor)),
        }
    }
}

/// Axis-aligned face box, `(x0, y0)` top-left and `(x1, y1)` bottom-right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn intersection_over_union(&self, other: &BoundingBox) -> f32 {
        let overlap = BoundingBox::new(
            self.x0.max(other.x0),
            self.y0.max(other.y0),
            self.x1.min(other.x1),
            self.y1.min(other.y1),
        )
        .area();
        let union = self.area() + other.area() - overlap;
        if union <= 0.0 {
            0.0
        } else {
            overlap / union
        }
    }

    pub fn scale(&self, factor: f32) -> Self {
        Self::new(
            self.x0 * factor,
            self.y0 * factor,
            self.x1 * factor,
            self.y1 * factor,
        )
    }

    /// Integer pixel corners, truncated like the detector's `astype(int)` convention.
    pub fn to_pixels(&self) -> (i32, i32, i32, i32) {
        (self.x0 as i32, self.y0 as i32, self.x1 as i32, self.y1 as i32)
    }
}

/// One detected face.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub keypoints: FaceKeypoints,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_coordinates_follow_landmark_order() {
        let kps = FaceKeypoints::from_flat(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
        assert_eq!(kps.get_point(Landmark::LeftEye), Point::new(1.0, 2.0));
        assert_eq!(kps.get_point(Landmark::Nose), Point::new(5.0, 6.0));
        assert_eq!(kps.get_point(Landmark::RightMouth), Point::new(9.0, 10.0));
    }

    #[test]
    fn iou_of_disjoint_and_identical_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.intersection_over_union(&b), 0.0);
        assert!((a.intersection_over_union(&a) - 1.0).abs() < 1e-6);

        let half = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        assert!((a.intersection_over_union(&half) - 50.0 / 150.0).abs() < 1e-6);
    }
}
