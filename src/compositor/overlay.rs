//! Camera overlay settings and placement

use serde::{Deserialize, Serialize};

/// Corner the overlay is anchored to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Discrete overlay scale tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlaySize {
    Small,
    Medium,
    Large,
}

impl OverlaySize {
    /// Overlay width as a fraction of the canvas width
    pub fn width_fraction(&self) -> f64 {
        match self {
            OverlaySize::Small => 0.15,
            OverlaySize::Medium => 0.20,
            OverlaySize::Large => 0.25,
        }
    }
}

/// Clip shape applied to the overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayShape {
    Rectangle,
    Rounded,
    Circle,
}

/// Camera overlay configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlaySettings {
    pub position: OverlayPosition,
    pub size: OverlaySize,
    pub shape: OverlayShape,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            position: OverlayPosition::BottomRight,
            size: OverlaySize::Medium,
            shape: OverlayShape::Circle,
        }
    }
}

impl OverlaySettings {
    /// Merge a partial update
    pub fn apply(&mut self, patch: &OverlaySettingsPatch) {
        if let Some(position) = patch.position {
            self.position = position;
        }
        if let Some(size) = patch.size {
            self.size = size;
        }
        if let Some(shape) = patch.shape {
            self.shape = shape;
        }
    }
}

/// Partial update for [`OverlaySettings`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlaySettingsPatch {
    pub position: Option<OverlayPosition>,
    pub size: Option<OverlaySize>,
    pub shape: Option<OverlayShape>,
}

impl OverlaySettingsPatch {
    pub fn position(position: OverlayPosition) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }
}

/// Axis-aligned destination rectangle in canvas pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x && py >= self.y && px < self.x + self.width && py < self.y + self.height
    }
}

/// Where the overlay lands on a `canvas_width` x `canvas_height` canvas.
///
/// Width comes from the size tier and height keeps the source aspect ratio.
/// The rectangle sits `margin` pixels in from the anchored corner.
pub fn overlay_rect(
    canvas_width: u32,
    canvas_height: u32,
    source_width: u32,
    source_height: u32,
    settings: &OverlaySettings,
    margin: u32,
) -> Rect {
    let width = ((canvas_width as f64 * settings.size.width_fraction()).round() as u32).max(1);
    let height = if source_width == 0 {
        width
    } else {
        ((width as f64 * source_height as f64 / source_width as f64).round() as u32).max(1)
    };

    let left = margin;
    let right = canvas_width.saturating_sub(margin + width);
    let top = margin;
    let bottom = canvas_height.saturating_sub(margin + height);

    let (x, y) = match settings.position {
        OverlayPosition::TopLeft => (left, top),
        OverlayPosition::TopRight => (right, top),
        OverlayPosition::BottomLeft => (left, bottom),
        OverlayPosition::BottomRight => (right, bottom),
    };

    Rect::new(x, y, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bottom_right_placement() {
        let settings = OverlaySettings {
            position: OverlayPosition::BottomRight,
            size: OverlaySize::Medium,
            shape: OverlayShape::Rectangle,
        };
        let rect = overlay_rect(1920, 1080, 1280, 720, &settings, 16);

        assert_eq!(rect.width, 384);
        assert_eq!(rect.height, 216);
        assert_eq!(rect.x, 1920 - 16 - 384);
        assert_eq!(rect.y, 1080 - 16 - 216);
    }

    #[test]
    fn test_top_left_uses_margin() {
        let settings = OverlaySettings {
            position: OverlayPosition::TopLeft,
            size: OverlaySize::Small,
            shape: OverlayShape::Circle,
        };
        let rect = overlay_rect(1000, 1000, 640, 480, &settings, 16);

        assert_eq!((rect.x, rect.y), (16, 16));
        assert_eq!(rect.width, 150);
        assert_eq!(rect.height, 113);
    }

    #[test]
    fn test_size_tiers_grow() {
        let mut settings = OverlaySettings::default();
        let mut widths = Vec::new();
        for size in [OverlaySize::Small, OverlaySize::Medium, OverlaySize::Large] {
            settings.size = size;
            widths.push(overlay_rect(1920, 1080, 4, 3, &settings, 16).width);
        }
        assert!(widths[0] < widths[1] && widths[1] < widths[2]);
    }

    #[test]
    fn test_patch_merges_only_given_fields() {
        let mut settings = OverlaySettings::default();
        settings.apply(&OverlaySettingsPatch::position(OverlayPosition::TopLeft));

        assert_eq!(settings.position, OverlayPosition::TopLeft);
        assert_eq!(settings.size, OverlaySize::Medium);
        assert_eq!(settings.shape, OverlayShape::Circle);
    }

    #[test]
    fn test_patch_deserializes_from_camel_case() {
        let patch: OverlaySettingsPatch =
            serde_json::from_str(r#"{ "position": "top-left", "shape": "rounded" }"#).unwrap();
        assert_eq!(patch.position, Some(OverlayPosition::TopLeft));
        assert_eq!(patch.shape, Some(OverlayShape::Rounded));
        assert_eq!(patch.size, None);
    }
}
