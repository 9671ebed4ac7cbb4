//! The selection box and its broadcast side channel.
//!
//! The box defines the generation/export region. Local edits are snapped to
//! the grid and broadcast to other viewers; boxes received from the channel
//! are applied without being sent back out.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_SELECTION_SIZE, GRID};
use crate::geometry::{Point, SelectionBox};

/// Corner handle used when resizing the box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Transport for selection-box geometry shared between viewers.
pub trait SelectionChannel {
    /// Send a locally edited box.
    fn broadcast(&mut self, selection: &SelectionBox);

    /// Next box received from another viewer, if any.
    fn poll(&mut self) -> Option<SelectionBox>;
}

/// In-process channel: records what was sent and serves what was delivered.
#[derive(Debug, Clone, Default)]
pub struct LocalChannel {
    sent: Vec<SelectionBox>,
    inbox: VecDeque<SelectionBox>,
}

impl LocalChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a box as if it came from another viewer.
    pub fn deliver(&mut self, selection: SelectionBox) {
        self.inbox.push_back(selection);
    }

    pub fn sent(&self) -> &[SelectionBox] {
        &self.sent
    }
}

impl SelectionChannel for LocalChannel {
    fn broadcast(&mut self, selection: &SelectionBox) {
        self.sent.push(*selection);
    }

    fn poll(&mut self) -> Option<SelectionBox> {
        self.inbox.pop_front()
    }
}

/// Current selection box plus the grid it snaps to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionState {
    selection: SelectionBox,
    grid: u32,
}

impl Default for SelectionState {
    fn default() -> Self {
        Self::new(GRID)
    }
}

impl SelectionState {
    /// A default-sized box at the origin.
    pub fn new(grid: u32) -> Self {
        let size = DEFAULT_SELECTION_SIZE as f32;
        Self {
            selection: SelectionBox::snapped(0.0, 0.0, size, size, grid),
            grid,
        }
    }

    pub fn get(&self) -> SelectionBox {
        self.selection
    }

    pub fn grid(&self) -> u32 {
        self.grid
    }

    fn replace(&mut self, selection: SelectionBox) -> bool {
        if selection == self.selection {
            return false;
        }
        self.selection = selection;
        true
    }

    /// Set the box from logical values. Returns whether it changed.
    pub fn set(&mut self, x: f32, y: f32, width: f32, height: f32) -> bool {
        let snapped = SelectionBox::snapped(x, y, width, height, self.grid);
        self.replace(snapped)
    }

    /// Translate the box by a logical delta, keeping its size.
    pub fn move_by(&mut self, delta: Point) -> bool {
        let origin = self.selection.top_left() + delta;
        let (w, h) = (self.selection.width as f32, self.selection.height as f32);
        self.set(origin.x, origin.y, w, h)
    }

    /// Drag one corner to `to`; the opposite corner stays put.
    ///
    /// Dragging past the opposite corner flips the box instead of collapsing it.
    pub fn resize(&mut self, corner: Corner, to: Point) -> bool {
        let rect = self.selection.to_rect();
        let (fixed_x, fixed_y) = match corner {
            Corner::TopLeft => (rect.max_x, rect.max_y),
            Corner::TopRight => (rect.min_x, rect.max_y),
            Corner::BottomLeft => (rect.max_x, rect.min_y),
            Corner::BottomRight => (rect.min_x, rect.min_y),
        };
        let x = fixed_x.min(to.x);
        let y = fixed_y.min(to.y);
        self.set(x, y, (fixed_x - to.x).abs(), (fixed_y - to.y).abs())
    }

    /// Apply a box received from another viewer.
    pub fn apply_remote(&mut self, selection: SelectionBox) -> bool {
        let snapped = selection.resnapped(self.grid);
        self.replace(snapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_selection() {
        let state = SelectionState::default();
        assert_eq!(
            state.get(),
            SelectionBox {
                x: 0,
                y: 0,
                width: 512,
                height: 512
            }
        );
    }

    #[test]
    fn test_set_snaps_size_only() {
        let mut state = SelectionState::new(8);
        assert!(state.set(101.0, 50.0, 509.0, 3.0));
        assert_eq!(
            state.get(),
            SelectionBox {
                x: 101,
                y: 50,
                width: 512,
                height: 8
            }
        );
        assert!(!state.set(101.0, 50.0, 509.0, 3.0));
    }

    #[test]
    fn test_move_keeps_size() {
        let mut state = SelectionState::new(8);
        state.set(0.0, 0.0, 64.0, 32.0);
        state.move_by(Point::new(13.0, -9.0));
        let sel = state.get();
        assert_eq!((sel.x, sel.y, sel.width, sel.height), (13, -9, 64, 32));
    }

    #[test]
    fn test_resize_from_corner() {
        let mut state = SelectionState::new(8);
        state.set(0.0, 0.0, 64.0, 64.0);

        state.resize(Corner::BottomRight, Point::new(130.0, 97.0));
        let sel = state.get();
        assert_eq!((sel.x, sel.y, sel.width, sel.height), (0, 0, 128, 96));

        // Dragging the top-left corner past the fixed corner flips the box
        state.resize(Corner::TopLeft, Point::new(200.0, 200.0));
        let sel = state.get();
        assert_eq!((sel.x, sel.y, sel.width, sel.height), (128, 96, 72, 104));
    }

    #[test]
    fn test_local_channel() {
        let mut channel = LocalChannel::new();
        let remote = SelectionBox {
            x: 3,
            y: 5,
            width: 30,
            height: 30,
        };
        channel.deliver(remote);
        channel.broadcast(&SelectionBox {
            x: 0,
            y: 0,
            width: 8,
            height: 8,
        });
        assert_eq!(channel.sent().len(), 1);

        let mut state = SelectionState::new(8);
        let received = channel.poll().expect("delivered box");
        assert!(state.apply_remote(received));
        assert_eq!(
            state.get(),
            SelectionBox {
                x: 3,
                y: 5,
                width: 32,
                height: 32
            }
        );
        assert!(channel.poll().is_none());
    }
}
