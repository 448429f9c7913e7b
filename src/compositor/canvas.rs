//! RGBA drawing surface used by the compositor

use super::overlay::{OverlayShape, Rect};
use crate::capture::source::VideoFrame;

/// Corner radius of the rounded shape, relative to the shorter side
const ROUNDED_RADIUS_FRACTION: f64 = 0.12;

/// Region a draw is clipped to, inside its destination rectangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClipPath {
    None,
    RoundedRect { radius: f64 },
    Circle,
}

impl ClipPath {
    /// Clip path for an overlay shape drawn into `rect`
    pub fn for_shape(shape: OverlayShape, rect: &Rect) -> Self {
        match shape {
            OverlayShape::Rectangle => ClipPath::None,
            OverlayShape::Rounded => ClipPath::RoundedRect {
                radius: rect.width.min(rect.height) as f64 * ROUNDED_RADIUS_FRACTION,
            },
            OverlayShape::Circle => ClipPath::Circle,
        }
    }

    /// Whether the pixel `(px, py)` of `rect` is inside the path
    pub fn contains(&self, rect: &Rect, px: u32, py: u32) -> bool {
        if !rect.contains(px, py) {
            return false;
        }
        // Sample at pixel centres
        let x = px as f64 + 0.5;
        let y = py as f64 + 0.5;
        let (left, top) = (rect.x as f64, rect.y as f64);
        let (w, h) = (rect.width as f64, rect.height as f64);

        match *self {
            ClipPath::None => true,
            ClipPath::Circle => {
                let radius = w.min(h) / 2.0;
                let dx = x - (left + w / 2.0);
                let dy = y - (top + h / 2.0);
                dx * dx + dy * dy <= radius * radius
            }
            ClipPath::RoundedRect { radius } => {
                let r = radius.min(w / 2.0).min(h / 2.0);
                let cx = x.clamp(left + r, left + w - r);
                let cy = y.clamp(top + r, top + h - r);
                let (dx, dy) = (x - cx, y - cy);
                dx * dx + dy * dy <= r * r
            }
        }
    }
}

/// Fixed-size RGBA canvas
#[derive(Debug, Clone)]
pub struct Canvas {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Canvas {
    /// Opaque black canvas
    pub fn new(width: u32, height: u32) -> Self {
        let mut data = vec![0u8; width as usize * height as usize * 4];
        for alpha in data.iter_mut().skip(3).step_by(4) {
            *alpha = 255;
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Scale the whole frame to fill the canvas
    pub fn draw_fill(&mut self, frame: &VideoFrame) {
        let rect = Rect::new(0, 0, self.width, self.height);
        self.draw_scaled(frame, rect, ClipPath::None);
    }

    /// Nearest-neighbour scale `frame` into `rect`, skipping pixels outside `clip`
    pub fn draw_scaled(&mut self, frame: &VideoFrame, rect: Rect, clip: ClipPath) {
        if rect.width == 0 || rect.height == 0 || frame.width() == 0 || frame.height() == 0 {
            return;
        }
        let src = frame.data();
        let (src_w, src_h) = (frame.width() as u64, frame.height() as u64);
        let x_end = (rect.x + rect.width).min(self.width);
        let y_end = (rect.y + rect.height).min(self.height);

        for py in rect.y..y_end {
            let sy = ((py - rect.y) as u64 * src_h / rect.height as u64).min(src_h - 1);
            for px in rect.x..x_end {
                if !clip.contains(&rect, px, py) {
                    continue;
                }
                let sx = ((px - rect.x) as u64 * src_w / rect.width as u64).min(src_w - 1);
                let s = ((sy * src_w + sx) * 4) as usize;
                let d = (py as usize * self.width as usize + px as usize) * 4;
                self.data[d..d + 4].copy_from_slice(&src[s..s + 4]);
            }
        }
    }

    /// Snapshot the canvas as a frame
    pub fn to_frame(&self) -> VideoFrame {
        // Dimensions and buffer length always agree
        VideoFrame::from_rgba(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| VideoFrame::solid(self.width.max(1), self.height.max(1), [0, 0, 0, 255]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    #[test]
    fn test_empty_frame_draws_nothing() {
        let mut canvas = Canvas::new(4, 4);
        canvas.draw_fill(&VideoFrame::solid(4, 4, BLUE));
        canvas.draw_fill(&VideoFrame::solid(0, 3, RED));
        canvas.draw_scaled(&VideoFrame::solid(3, 0, RED), Rect::new(0, 0, 2, 2), ClipPath::None);

        assert_eq!(canvas.to_frame().pixel(0, 0), Some(BLUE));
    }

    #[test]
    fn test_fill_scales_small_frame() {
        let mut canvas = Canvas::new(8, 4);
        canvas.draw_fill(&VideoFrame::solid(2, 1, RED));

        let frame = canvas.to_frame();
        assert_eq!(frame.pixel(0, 0), Some(RED));
        assert_eq!(frame.pixel(7, 3), Some(RED));
    }

    #[test]
    fn test_rectangle_draw_covers_corners() {
        let mut canvas = Canvas::new(20, 20);
        canvas.draw_fill(&VideoFrame::solid(4, 4, BLUE));
        let rect = Rect::new(10, 10, 8, 8);
        canvas.draw_scaled(&VideoFrame::solid(4, 4, RED), rect, ClipPath::None);

        let frame = canvas.to_frame();
        assert_eq!(frame.pixel(10, 10), Some(RED));
        assert_eq!(frame.pixel(17, 17), Some(RED));
        assert_eq!(frame.pixel(9, 9), Some(BLUE));
        assert_eq!(frame.pixel(18, 18), Some(BLUE));
    }

    #[test]
    fn test_circle_clip_leaves_corners() {
        let mut canvas = Canvas::new(20, 20);
        canvas.draw_fill(&VideoFrame::solid(1, 1, BLUE));
        let rect = Rect::new(0, 0, 20, 20);
        canvas.draw_scaled(&VideoFrame::solid(1, 1, RED), rect, ClipPath::Circle);

        let frame = canvas.to_frame();
        assert_eq!(frame.pixel(10, 10), Some(RED));
        assert_eq!(frame.pixel(0, 0), Some(BLUE));
        assert_eq!(frame.pixel(19, 19), Some(BLUE));
    }

    #[test]
    fn test_rounded_clip_trims_only_the_corner() {
        let rect = Rect::new(0, 0, 100, 50);
        let clip = ClipPath::for_shape(OverlayShape::Rounded, &rect);

        assert!(!clip.contains(&rect, 0, 0));
        assert!(clip.contains(&rect, 50, 0));
        assert!(clip.contains(&rect, 0, 25));
        assert!(!clip.contains(&rect, 99, 49));
    }

    #[test]
    fn test_draw_is_clipped_to_canvas() {
        let mut canvas = Canvas::new(10, 10);
        canvas.draw_scaled(&VideoFrame::solid(2, 2, RED), Rect::new(8, 8, 6, 6), ClipPath::None);

        let frame = canvas.to_frame();
        assert_eq!(frame.pixel(9, 9), Some(RED));
        assert_eq!(frame.pixel(7, 7), Some([0, 0, 0, 255]));
    }
}
