use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::frame::AnnotatedFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotStats {
    pub published: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Shared {
    latest: Mutex<Option<AnnotatedFrame>>,
    published: AtomicU64,
    dropped: AtomicU64,
}

/// Single-slot hand-off between the worker and the viewer.
///
/// The newest frame always wins: publishing over an unread frame discards it,
/// and the producer never waits for the consumer.
#[derive(Clone, Default)]
pub struct FrameSlot {
    shared: Arc<Shared>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<AnnotatedFrame>> {
        // a panicking holder cannot leave a half-written Option behind
        self.shared
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `frame`, returning `true` if an unread frame was displaced.
    pub fn publish(&self, frame: AnnotatedFrame) -> bool {
        let displaced = self.lock().replace(frame).is_some();
        self.shared.published.fetch_add(1, Ordering::Relaxed);
        if displaced {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
        displaced
    }

    pub fn try_consume(&self) -> Option<AnnotatedFrame> {
        self.lock().take()
    }

    pub fn is_pending(&self) -> bool {
        self.lock().is_some()
    }

    pub fn clear(&self) {
        self.lock().take();
    }

    pub fn stats(&self) -> SlotStats {
        SlotStats {
            published: self.shared.published.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classification;
    use crate::frame::Frame;
    use image::{Rgb, RgbImage};
    use std::thread;

    fn frame(value: u8, size: u32) -> AnnotatedFrame {
        let image = RgbImage::from_pixel(size, size, Rgb([value, value, value]));
        AnnotatedFrame::new(Frame::now(image), Classification::no_face(), value as f32)
    }

    #[test]
    fn empty_slot_yields_nothing() {
        let slot = FrameSlot::new();
        assert!(slot.try_consume().is_none());
        assert!(!slot.is_pending());
    }

    #[test]
    fn latest_frame_wins() {
        let slot = FrameSlot::new();
        assert!(!slot.publish(frame(1, 4)));
        assert!(slot.publish(frame(2, 4)));
        assert!(slot.publish(frame(3, 4)));

        let got = slot.try_consume().expect("pending frame");
        assert_eq!(got.overlay.fps_text, "3");
        assert!(slot.try_consume().is_none());
        assert_eq!(slot.stats(), SlotStats { published: 3, dropped: 2 });
    }

    #[test]
    fn concurrent_consumer_never_sees_a_torn_frame() {
        let slot = FrameSlot::new();
        let producer_slot = slot.clone();

        let producer = thread::spawn(move || {
            for i in 0..2000u32 {
                let value = (i % 251) as u8;
                producer_slot.publish(frame(value, 8 + (value as u32 % 5)));
            }
        });

        let mut seen = 0;
        while !producer.is_finished() || slot.is_pending() {
            if let Some(got) = slot.try_consume() {
                let image = got.frame.image();
                let value = image.get_pixel(0, 0)[0];
                assert_eq!(image.width(), 8 + (value as u32 % 5));
                assert!(image.pixels().all(|p| p.0 == [value; 3]));
                assert_eq!(got.overlay.fps_text, value.to_string());
                seen += 1;
            }
        }
        producer.join().expect("producer thread");
        assert!(seen > 0);
    }
}
