use std::fs;
use std::path::Path;

use image::RgbImage;
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};

use crate::frame::AnnotatedFrame;

const BOX_THICKNESS: i32 = 6;
const LABEL_OFFSET: i32 = 10;

/// Loads a TrueType font for overlay text. Without one, only boxes are drawn.
pub fn load_font(path: Option<&Path>) -> Option<Font<'static>> {
    let path = path?;
    match fs::read(path) {
        Ok(bytes) => {
            let font = Font::try_from_vec(bytes);
            if font.is_none() {
                log::warn!("{} is not a usable font", path.display());
            }
            font
        }
        Err(err) => {
            log::warn!("cannot read font {}: {err}", path.display());
            None
        }
    }
}

// top-left corner of the label text, just above the box
fn label_origin(x0: i32, y0: i32) -> (i32, i32) {
    (x0, y0 - LABEL_OFFSET)
}

pub struct OverlayRenderer {
    font: Option<Font<'static>>,
    scale: Scale,
}

impl OverlayRenderer {
    pub fn new(font: Option<Font<'static>>, size: f32) -> Self {
        Self {
            font,
            scale: Scale::uniform(size),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draws face box, state label and frame rate onto a copy of the frame.
    pub fn render(&self, annotated: &AnnotatedFrame) -> RgbImage {
        let mut image = annotated.frame.image().clone();
        let overlay = &annotated.overlay;
        let color = overlay.color.rgb();

        if let Some(face) = &overlay.face {
            let (x0, y0, x1, y1) = face.bbox.to_pixels();
            for inset in 0..BOX_THICKNESS {
                let width = x1 - x0 - 2 * inset;
                let height = y1 - y0 - 2 * inset;
                if width <= 0 || height <= 0 {
                    break;
                }
                let rect = Rect::at(x0 + inset, y0 + inset).of_size(width as u32, height as u32);
                draw_hollow_rect_mut(&mut image, rect, color);
            }

            if let Some(font) = &self.font {
                let (x, y) = label_origin(x0, y0);
                draw_text_mut(&mut image, color, x, y, self.scale, font, &face.label);
            }
        }

        if let Some(font) = &self.font {
            draw_text_mut(&mut image, color, 0, 0, self.scale, font, &overlay.fps_text);
        }

        image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{AttentionColor, AttentionState, Classification};
    use crate::face::BoundingBox;
    use crate::frame::Frame;
    use image::Rgb;

    fn annotated(face: Option<BoundingBox>, state: AttentionState) -> AnnotatedFrame {
        let classification = Classification {
            state,
            face,
            color: state.color(),
        };
        AnnotatedFrame::new(Frame::now(RgbImage::new(64, 48)), classification, 30.0)
    }

    #[test]
    fn box_is_drawn_in_state_color() {
        let renderer = OverlayRenderer::new(None, 12.0);
        let image = renderer.render(&annotated(
            Some(BoundingBox::new(10.0, 10.0, 40.0, 40.0)),
            AttentionState::Attentive,
        ));

        assert_eq!(*image.get_pixel(10, 10), AttentionColor::Green.rgb());
        assert_eq!(*image.get_pixel(15, 15), AttentionColor::Green.rgb());
        // inside the six pixel border stays untouched
        assert_eq!(*image.get_pixel(25, 25), Rgb([0, 0, 0]));
    }

    #[test]
    fn degenerate_and_offscreen_boxes_do_not_panic() {
        let renderer = OverlayRenderer::new(None, 12.0);
        renderer.render(&annotated(
            Some(BoundingBox::new(30.0, 30.0, 31.0, 30.5)),
            AttentionState::LookingUp,
        ));
        renderer.render(&annotated(
            Some(BoundingBox::new(-20.0, -20.0, 200.0, 200.0)),
            AttentionState::LookingDown,
        ));
    }

    #[test]
    fn no_face_leaves_pixels_without_font() {
        let renderer = OverlayRenderer::new(None, 12.0);
        let image = renderer.render(&annotated(None, AttentionState::NotAttentive));
        assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn label_sits_ten_pixels_above_box() {
        assert_eq!(label_origin(40, 60), (40, 50));
        assert_eq!(label_origin(0, 4), (0, -6));
    }

    #[test]
    fn missing_font_file_is_tolerated() {
        assert!(load_font(Some(Path::new("/nonexistent/font.ttf"))).is_none());
        assert!(load_font(None).is_none());
    }
}
