//! Pan/zoom viewport and the screen ↔ logical transform.
//!
//! The viewport maps logical image coordinates onto the stage:
//! `screen = logical * scale + position`. Every input handler goes through
//! [`to_logical`] so persisted points stay valid across zoom and pan.

use serde::{Deserialize, Serialize};

use crate::config::EditorConfig;
use crate::constants;
use crate::geometry::{LogicalRect, Point};

/// Convert a screen point to logical space.
pub fn to_logical(screen: Point, scale: f32, position: Point) -> Point {
    (screen - position) / scale
}

/// Convert a logical point to screen space; inverse of [`to_logical`].
pub fn to_screen(logical: Point, scale: f32, position: Point) -> Point {
    logical * scale + position
}

/// Direction of a stepped zoom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoomDirection {
    In,
    Out,
}

/// Which point stays fixed on screen while zooming.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoomOrigin {
    /// Keep the logical point under this screen position fixed (wheel zoom).
    Pointer(Point),
    /// Keep the logical point at the middle of the stage fixed (buttons, shortcuts).
    CanvasCenter,
}

/// Limits applied to every zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomLimits {
    pub min_scale: f32,
    pub max_scale: f32,
    pub factor: f32,
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self {
            min_scale: constants::MIN_SCALE,
            max_scale: constants::MAX_SCALE,
            factor: constants::ZOOM_FACTOR,
        }
    }
}

impl From<&EditorConfig> for ZoomLimits {
    fn from(config: &EditorConfig) -> Self {
        Self {
            min_scale: config.min_scale,
            max_scale: config.max_scale,
            factor: config.zoom_factor,
        }
    }
}

/// Pan/zoom state of the stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Stage scale, always > 0
    pub scale: f32,
    /// Stage offset in screen pixels
    pub position: Point,
    /// Visible stage size in screen pixels
    pub stage_size: (f32, f32),
    limits: ZoomLimits,
}

impl Viewport {
    /// Create an identity viewport for a stage of the given size.
    pub fn new(stage_width: f32, stage_height: f32, limits: ZoomLimits) -> Self {
        Self {
            scale: 1.0,
            position: Point::ZERO,
            stage_size: (stage_width, stage_height),
            limits,
        }
    }

    pub fn limits(&self) -> ZoomLimits {
        self.limits
    }

    pub fn to_logical(&self, screen: Point) -> Point {
        to_logical(screen, self.scale, self.position)
    }

    pub fn to_screen(&self, logical: Point) -> Point {
        to_screen(logical, self.scale, self.position)
    }

    /// Current scale as an integer percentage for display.
    pub fn zoom_percent(&self) -> u32 {
        (self.scale * 100.0).round() as u32
    }

    /// Screen position of the stage center.
    pub fn stage_center(&self) -> Point {
        Point::new(self.stage_size.0 / 2.0, self.stage_size.1 / 2.0)
    }

    pub fn set_stage_size(&mut self, width: f32, height: f32) {
        self.stage_size = (width.max(1.0), height.max(1.0));
    }

    /// Zoom one step or to an explicit percentage.
    ///
    /// An explicit percentage wins over `direction`. The result is clamped to
    /// the configured range, except that a scale already below the minimum
    /// (after fitting a large image) is never pushed further down.
    pub fn zoom(
        &mut self,
        direction: ZoomDirection,
        origin: ZoomOrigin,
        explicit_percent: Option<f32>,
    ) {
        let new_scale = match explicit_percent {
            Some(percent) => {
                (percent / 100.0).clamp(self.limits.min_scale, self.limits.max_scale)
            }
            None => match direction {
                ZoomDirection::In => (self.scale * self.limits.factor)
                    .min(self.limits.max_scale.max(self.scale)),
                ZoomDirection::Out => {
                    (self.scale / self.limits.factor).max(self.limits.min_scale.min(self.scale))
                }
            },
        };
        self.zoom_to(new_scale, origin);
    }

    /// Set the scale, keeping the logical point under `origin` fixed.
    pub fn zoom_to(&mut self, new_scale: f32, origin: ZoomOrigin) {
        if !(new_scale > 0.0) || !new_scale.is_finite() {
            return;
        }
        let anchor = match origin {
            ZoomOrigin::Pointer(p) => p,
            ZoomOrigin::CanvasCenter => self.stage_center(),
        };
        let logical = self.to_logical(anchor);
        self.position = anchor - logical * new_scale;
        self.scale = new_scale;
    }

    /// Apply a pan delta in screen pixels.
    pub fn pan_by(&mut self, delta: Point) {
        self.position = self.position + delta;
    }

    /// Reset to 100% with no pan.
    pub fn reset(&mut self) {
        self.scale = 1.0;
        self.position = Point::ZERO;
    }

    /// Fit a logical rectangle inside the stage, centered.
    ///
    /// May produce a scale below the stepped-zoom minimum for very large images.
    pub fn fit(&mut self, rect: &LogicalRect) {
        if rect.is_empty() {
            return;
        }
        let width = rect.max_x - rect.min_x;
        let height = rect.max_y - rect.min_y;
        let scale = (self.stage_size.0 / width)
            .min(self.stage_size.1 / height)
            .min(self.limits.max_scale);
        if !(scale > 0.0) {
            return;
        }
        let center = Point::new(rect.min_x + width / 2.0, rect.min_y + height / 2.0);
        self.scale = scale;
        self.position = self.stage_center() - center * scale;
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1024.0, 768.0, ZoomLimits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 0.001;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    fn approx_point(a: Point, b: Point) -> bool {
        approx_eq(a.x, b.x) && approx_eq(a.y, b.y)
    }

    #[test]
    fn test_to_logical_inverts_to_screen() {
        let cases = [
            (Point::new(0.0, 0.0), 1.0, Point::new(0.0, 0.0)),
            (Point::new(317.0, 45.5), 2.5, Point::new(-120.0, 33.0)),
            (Point::new(-40.0, 900.0), 0.1, Point::new(12.25, -7.0)),
            (Point::new(1.0, 1.0), 10.0, Point::new(500.0, 500.0)),
        ];
        for (screen, scale, position) in cases {
            let logical = to_logical(screen, scale, position);
            assert!(approx_point(to_screen(logical, scale, position), screen));
        }
    }

    #[test]
    fn test_zoom_to_pointer_preserves_point_under_cursor() {
        let mut vp = Viewport::default();
        vp.position = Point::new(50.0, 30.0);
        let cursor = Point::new(150.0, 120.0);
        let before = vp.to_logical(cursor);

        vp.zoom(ZoomDirection::In, ZoomOrigin::Pointer(cursor), None);

        assert!(approx_eq(vp.scale, 1.1));
        assert!(approx_point(vp.to_logical(cursor), before));
    }

    #[test]
    fn test_zoom_to_center_preserves_center() {
        let mut vp = Viewport::new(800.0, 600.0, ZoomLimits::default());
        vp.position = Point::new(-20.0, 10.0);
        let before = vp.to_logical(vp.stage_center());

        vp.zoom(ZoomDirection::Out, ZoomOrigin::CanvasCenter, None);

        assert!(approx_point(vp.to_logical(vp.stage_center()), before));
    }

    #[test]
    fn test_zoom_round_trip() {
        let mut vp = Viewport::default();
        vp.scale = 1.7;
        vp.position = Point::new(-33.0, 71.0);
        let original = vp;
        let cursor = Point::new(412.0, 250.0);

        vp.zoom(ZoomDirection::In, ZoomOrigin::Pointer(cursor), None);
        vp.zoom(ZoomDirection::Out, ZoomOrigin::Pointer(cursor), None);

        assert!(approx_eq(vp.scale, original.scale));
        assert!(approx_point(vp.position, original.position));
    }

    #[test]
    fn test_zoom_clamped_to_limits() {
        let mut vp = Viewport::default();
        vp.scale = 9.5;
        vp.zoom(ZoomDirection::In, ZoomOrigin::CanvasCenter, None);
        assert_eq!(vp.scale, constants::MAX_SCALE);

        vp.scale = 0.105;
        vp.zoom(ZoomDirection::Out, ZoomOrigin::CanvasCenter, None);
        assert_eq!(vp.scale, constants::MIN_SCALE);
    }

    #[test]
    fn test_explicit_percent() {
        let mut vp = Viewport::default();
        vp.zoom(ZoomDirection::In, ZoomOrigin::CanvasCenter, Some(250.0));
        assert!(approx_eq(vp.scale, 2.5));
        assert_eq!(vp.zoom_percent(), 250);

        vp.zoom(ZoomDirection::In, ZoomOrigin::CanvasCenter, Some(5000.0));
        assert_eq!(vp.scale, constants::MAX_SCALE);
    }

    #[test]
    fn test_zoom_out_below_minimum_does_not_shrink_further() {
        let mut vp = Viewport::new(100.0, 100.0, ZoomLimits::default());
        vp.fit(&LogicalRect::from_xywh(0.0, 0.0, 4000.0, 2000.0));
        assert!(approx_eq(vp.scale, 0.025));

        vp.zoom(ZoomDirection::Out, ZoomOrigin::CanvasCenter, None);
        assert!(approx_eq(vp.scale, 0.025));

        vp.zoom(ZoomDirection::In, ZoomOrigin::CanvasCenter, None);
        assert!(vp.scale > 0.025);
    }

    #[test]
    fn test_fit_centers_rect() {
        let mut vp = Viewport::new(800.0, 600.0, ZoomLimits::default());
        vp.fit(&LogicalRect::from_xywh(0.0, 0.0, 400.0, 400.0));
        assert!(approx_eq(vp.scale, 1.5));
        assert!(approx_point(vp.to_screen(Point::new(200.0, 200.0)), vp.stage_center()));
    }

    #[test]
    fn test_pan_preserves_zoom() {
        let mut vp = Viewport::default();
        vp.scale = 2.5;
        vp.pan_by(Point::new(100.0, 200.0));
        assert_eq!(vp.scale, 2.5);
        assert_eq!(vp.position, Point::new(100.0, 200.0));
    }
}
