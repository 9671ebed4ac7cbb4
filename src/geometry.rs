//! Core geometry types in logical image space.
//!
//! Every persisted coordinate (stroke points, raster placement, the selection
//! box) lives in logical space: unscaled image pixels, invariant under pan and
//! zoom.

use std::ops::{Add, Div, Mul, Sub};

use serde::{Deserialize, Serialize};

/// A 2D point. Used for logical, stage and screen coordinates alike; the frame
/// is implied by where the value came from.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Calculate distance to another point.
    pub fn distance_to(&self, other: &Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Length of the vector from the origin to this point.
    pub fn length(&self) -> f32 {
        self.x.hypot(self.y)
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Point {
    type Output = Point;

    fn mul(self, rhs: f32) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f32> for Point {
    type Output = Point;

    fn div(self, rhs: f32) -> Point {
        Point::new(self.x / rhs, self.y / rhs)
    }
}

/// Axis-aligned bounds accumulated from stamps, strokes and placed images.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogicalRect {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl LogicalRect {
    /// An empty rectangle that any expansion replaces.
    pub fn empty() -> Self {
        Self {
            min_x: f32::INFINITY,
            min_y: f32::INFINITY,
            max_x: f32::NEG_INFINITY,
            max_y: f32::NEG_INFINITY,
        }
    }

    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x + width,
            max_y: y + height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min_x >= self.max_x || self.min_y >= self.max_y
    }

    /// Grow to cover a circle.
    pub fn expand_circle(&mut self, center: Point, radius: f32) {
        self.min_x = self.min_x.min(center.x - radius);
        self.min_y = self.min_y.min(center.y - radius);
        self.max_x = self.max_x.max(center.x + radius);
        self.max_y = self.max_y.max(center.y + radius);
    }

    pub fn union(&mut self, other: &LogicalRect) {
        if other.is_empty() {
            return;
        }
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }

    /// Snap outwards to whole pixels: `(x, y, width, height)`.
    pub fn to_pixel_bounds(&self) -> Option<(i32, i32, u32, u32)> {
        if self.is_empty() {
            return None;
        }
        let x = self.min_x.floor() as i32;
        let y = self.min_y.floor() as i32;
        let right = self.max_x.ceil() as i32;
        let bottom = self.max_y.ceil() as i32;
        Some((x, y, (right - x) as u32, (bottom - y) as u32))
    }
}

/// Round a dimension to the nearest multiple of `grid`, never below `grid`.
pub fn snap_dimension(value: f32, grid: u32) -> u32 {
    let grid = grid.max(1);
    let snapped = (value.max(0.0) / grid as f32).round() as u32 * grid;
    snapped.max(grid)
}

/// The generation/export region.
///
/// The position is in whole logical pixels; the size is a multiple of the
/// grid and at least one grid cell in each direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl SelectionBox {
    /// Build a box from arbitrary logical values, snapping its size to `grid`.
    pub fn snapped(x: f32, y: f32, width: f32, height: f32, grid: u32) -> Self {
        Self {
            x: x.round() as i32,
            y: y.round() as i32,
            width: snap_dimension(width, grid),
            height: snap_dimension(height, grid),
        }
    }

    /// Re-snap an existing box, e.g. one received over the broadcast channel.
    pub fn resnapped(&self, grid: u32) -> Self {
        Self::snapped(
            self.x as f32,
            self.y as f32,
            self.width as f32,
            self.height as f32,
            grid,
        )
    }

    pub fn to_rect(&self) -> LogicalRect {
        LogicalRect::from_xywh(
            self.x as f32,
            self.y as f32,
            self.width as f32,
            self.height as f32,
        )
    }

    pub fn top_left(&self) -> Point {
        Point::new(self.x as f32, self.y as f32)
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }

    /// Check if a logical point is inside the box.
    pub fn contains(&self, point: &Point) -> bool {
        let r = self.to_rect();
        point.x >= r.min_x && point.x <= r.max_x && point.y >= r.min_y && point.y <= r.max_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance() {
        let p1 = Point::new(0.0, 0.0);
        let p2 = Point::new(3.0, 4.0);
        assert!((p1.distance_to(&p2) - 5.0).abs() < 0.001);
    }

    #[test]
    fn test_point_arithmetic() {
        let a = Point::new(10.0, 20.0);
        let b = Point::new(4.0, 5.0);
        assert_eq!(a - b, Point::new(6.0, 15.0));
        assert_eq!(a + b, Point::new(14.0, 25.0));
        assert_eq!(b * 2.0, Point::new(8.0, 10.0));
        assert_eq!(a / 10.0, Point::new(1.0, 2.0));
    }

    #[test]
    fn test_snap_to_grid_rounds_to_nearest() {
        assert_eq!(snap_to_grid(3.0, 8), 0);
        assert_eq!(snap_to_grid(4.0, 8), 8);
        assert_eq!(snap_to_grid(101.0, 8), 104);
        assert_eq!(snap_to_grid(-5.0, 8), -8);
    }

    #[test]
    fn test_snap_dimension_minimum() {
        assert_eq!(snap_dimension(0.0, 8), 8);
        assert_eq!(snap_dimension(2.0, 8), 8);
        assert_eq!(snap_dimension(509.0, 8), 512);
        assert_eq!(snap_dimension(-30.0, 8), 8);
    }

    #[test]
    fn test_selection_box_snapped() {
        let sel = SelectionBox::snapped(100.6, 49.2, 510.0, 515.0, 8);
        assert_eq!(sel, SelectionBox { x: 101, y: 49, width: 512, height: 512 });

        let exact = SelectionBox::snapped(100.0, 50.0, 512.0, 512.0, 8);
        assert_eq!(exact, SelectionBox { x: 100, y: 50, width: 512, height: 512 });
        assert!(sel.contains(&Point::new(200.0, 200.0)));
        assert!(!sel.contains(&Point::new(50.0, 200.0)));
    }

    #[test]
    fn test_rect_pixel_bounds() {
        let mut rect = LogicalRect::empty();
        assert!(rect.to_pixel_bounds().is_none());
        rect.expand_circle(Point::new(10.5, 10.5), 5.0);
        assert_eq!(rect.to_pixel_bounds(), Some((5, 5, 11, 11)));

        let mut other = LogicalRect::from_xywh(0.0, 0.0, 4.0, 4.0);
        other.union(&rect);
        assert_eq!(other.to_pixel_bounds(), Some((0, 0, 16, 16)));
    }
}
