//! Change notifications for the presentation layer.
//!
//! The core never re-renders anything itself. Every mutation queues an
//! [`EditorEvent`]; whoever draws the editor drains the queue once per frame
//! and refreshes what changed.

use serde::Serialize;

use crate::geometry::SelectionBox;
use crate::layer::LayerId;

/// Something observable changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum EditorEvent {
    /// Strokes or raster of a layer changed
    LayerContentChanged(LayerId),
    LayerAdded(LayerId),
    LayerRemoved(LayerId),
    /// Visibility, enabled flag, opacity, name or parameters changed
    LayerFlagsChanged(LayerId),
    /// Sketch layers were reordered
    LayerOrderChanged,
    ActiveLayerChanged(LayerId),
    /// A snapshot was committed under `topic`
    HistoryRecorded { topic: String, label: String },
    /// Undo/redo availability may have changed
    HistoryChanged { can_undo: bool, can_redo: bool },
    /// Scale or position changed; carries the integer zoom percent
    ViewportChanged { zoom_percent: u32 },
    SelectionChanged(SelectionBox),
    /// An image was placed on a layer, with any generation metadata found in it
    ImagePasted {
        layer: LayerId,
        metadata: Option<String>,
    },
}

/// FIFO of pending events.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    events: Vec<EditorEvent>,
}

impl EventQueue {
    pub fn push(&mut self, event: EditorEvent) {
        log::trace!("Event: {:?}", event);
        self.events.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Take every queued event, oldest first.
    pub fn drain(&mut self) -> Vec<EditorEvent> {
        std::mem::take(&mut self.events)
    }
}
