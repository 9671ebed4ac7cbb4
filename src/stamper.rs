//! Brush-engine stamping for sketch layers.
//!
//! Sketch strokes are not polylines: the pointer path is resampled into
//! circular stamps placed every `spacing` logical pixels. The cursor only
//! advances by whole spacings, so the remainder of each move carries into the
//! next one and spacing never drifts.

use crate::constants::STAMP_SPACING;
use crate::geometry::{LogicalRect, Point};
use crate::stroke::{BrushStyle, BrushTool, Rgba};

/// A single circular mark.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stamp {
    pub center: Point,
    pub radius: f32,
    pub color: Rgba,
    /// Fraction of the radius painted fully opaque
    pub hardness: f32,
    pub tool: BrushTool,
}

/// Stamps of one sketch stroke plus the resampling cursor.
#[derive(Debug, Clone)]
pub struct StampSession {
    style: BrushStyle,
    spacing: f32,
    last: Point,
    stamps: Vec<Stamp>,
}

impl StampSession {
    /// Start a session with one stamp under the pointer.
    ///
    /// A spacing that is not a positive finite number falls back to
    /// [`STAMP_SPACING`].
    pub fn begin(point: Point, style: BrushStyle, spacing: f32) -> Self {
        let spacing = if spacing > 0.0 && spacing.is_finite() {
            spacing
        } else {
            log::warn!("Invalid stamp spacing {}, using {}", spacing, STAMP_SPACING);
            STAMP_SPACING
        };
        let mut session = Self {
            style,
            spacing,
            last: point,
            stamps: Vec::new(),
        };
        session.place(point);
        session
    }

    /// Advance towards `point`, stamping at every whole spacing.
    ///
    /// Returns the number of stamps placed.
    pub fn move_to(&mut self, point: Point) -> usize {
        let delta = point - self.last;
        let dist = delta.length();
        if dist == 0.0 {
            return 0;
        }
        let steps = (dist / self.spacing).floor() as usize;
        if steps == 0 {
            return 0;
        }
        let dir = delta / dist;
        let origin = self.last;
        for i in 1..=steps {
            self.place(origin + dir * (self.spacing * i as f32));
        }
        self.last = origin + dir * (self.spacing * steps as f32);
        steps
    }

    fn place(&mut self, center: Point) {
        self.stamps.push(Stamp {
            center,
            radius: self.style.radius(),
            color: self.style.color,
            hardness: self.style.hardness.clamp(0.0, 1.0),
            tool: self.style.tool,
        });
    }

    pub fn stamps(&self) -> &[Stamp] {
        &self.stamps
    }

    pub fn style(&self) -> &BrushStyle {
        &self.style
    }

    /// Where the next move is measured from.
    pub fn cursor(&self) -> Point {
        self.last
    }

    /// Bounds covered by painting stamps. Eraser stamps cover nothing new.
    pub fn paint_bounds(&self) -> LogicalRect {
        let mut rect = LogicalRect::empty();
        for stamp in self.stamps.iter().filter(|s| s.tool == BrushTool::Brush) {
            rect.expand_circle(stamp.center, stamp.radius);
        }
        rect
    }
}
