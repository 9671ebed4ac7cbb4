//! Pan/zoom scenarios.

use super::{drag, new_editor};
use crate::config::EditorConfig;
use crate::editor::{Editor, PointerButton};
use crate::geometry::Point;
use crate::layer::LayerId;
use crate::viewport::{ZoomDirection, ZoomOrigin};

fn assert_close(a: Point, b: Point) {
    assert!(a.distance_to(&b) < 1e-3, "{:?} != {:?}", a, b);
}

#[test]
fn test_wheel_zoom_keeps_point_under_pointer() {
    let mut editor = new_editor();
    let pointer = Point::new(317.0, 211.0);
    let logical = editor.viewport().to_logical(pointer);

    editor.wheel(pointer, -1.0);
    editor.wheel(pointer, -1.0);
    assert!(editor.viewport().scale > 1.0);
    assert_close(editor.viewport().to_logical(pointer), logical);

    editor.wheel(pointer, 1.0);
    editor.wheel(pointer, 1.0);
    assert!((editor.viewport().scale - 1.0).abs() < 1e-4);
    assert_close(editor.viewport().to_logical(pointer), logical);
    assert_eq!(editor.zoom_percent(), 100);
}

#[test]
fn test_strokes_land_in_logical_space_after_zoom_and_pan() {
    let mut editor = new_editor();
    editor.zoom(ZoomDirection::In, ZoomOrigin::CanvasCenter, Some(200.0));
    editor.pan_by(Point::new(40.0, -20.0));
    let vp = *editor.viewport();

    drag(&mut editor, &[(100.0, 100.0), (300.0, 100.0)]);
    let lines = editor.store().get_lines(LayerId::Mask).expect("lines");
    assert_close(lines[0].points[0], vp.to_logical(Point::new(100.0, 100.0)));
    assert_close(*lines[0].points.last().expect("last"), vp.to_logical(Point::new(300.0, 100.0)));
}

#[test]
fn test_middle_button_pans_without_drawing() {
    let mut editor = new_editor();
    editor
        .pointer_down(Point::new(50.0, 50.0), PointerButton::Middle)
        .expect("down");
    editor.pointer_move(Point::new(80.0, 70.0));
    editor.pointer_up().expect("up");
    assert_eq!(editor.viewport().position, Point::new(30.0, 20.0));
    assert!(!editor.can_undo());
}

#[test]
fn test_stepped_zoom_respects_configured_limits() {
    let config = EditorConfig {
        min_scale: 0.5,
        max_scale: 2.0,
        ..EditorConfig::default()
    };
    let mut editor = Editor::new(config);
    for _ in 0..20 {
        editor.zoom(ZoomDirection::In, ZoomOrigin::CanvasCenter, None);
    }
    assert!((editor.viewport().scale - 2.0).abs() < 1e-4);
    for _ in 0..40 {
        editor.zoom(ZoomDirection::Out, ZoomOrigin::CanvasCenter, None);
    }
    assert!((editor.viewport().scale - 0.5).abs() < 1e-4);
    editor.reset_view();
    assert_eq!(editor.zoom_percent(), 100);
}
