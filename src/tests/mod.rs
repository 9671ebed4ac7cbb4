//! End-to-end scenarios driving the editor the way a front end would.
//!
//! These tests cover behavior that spans several modules: pointer input
//! through history into the compositor, and viewport changes around exports.

mod viewport_tests;

use tiny_skia::Color;

use crate::config::EditorConfig;
use crate::editor::{Editor, PointerButton};
use crate::geometry::Point;
use crate::raster::{encode_data_url, new_pixmap};

pub(crate) fn new_editor() -> Editor {
    Editor::new(EditorConfig::default())
}

/// Press, drag through `points` and release the primary button.
pub(crate) fn drag(editor: &mut Editor, points: &[(f32, f32)]) {
    editor
        .pointer_down(Point::new(points[0].0, points[0].1), PointerButton::Primary)
        .expect("pointer down");
    for (x, y) in &points[1..] {
        editor.pointer_move(Point::new(*x, *y));
    }
    editor.pointer_up().expect("pointer up");
}

/// An opaque PNG data URL of the given size and color.
pub(crate) fn solid_png(width: u32, height: u32, rgb: (u8, u8, u8)) -> String {
    let mut pixmap = new_pixmap(width, height).expect("pixmap");
    pixmap.fill(Color::from_rgba8(rgb.0, rgb.1, rgb.2, 255));
    encode_data_url(&pixmap).expect("encode")
}
