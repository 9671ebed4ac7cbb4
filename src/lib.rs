//! Inpaint Canvas - layered drawing and compositing engine
//!
//! The engine behind an image-generation canvas: a stack of logical layers
//! (base image, inpainting mask, sketches, controlnet guides and regional
//! prompt masks) edited with pointer strokes, pasted images and keyboard
//! shortcuts, with per-layer undo/redo and a pan/zoom viewport. The
//! compositor flattens the content under the selection box into the PNG data
//! URLs a generation backend consumes.
//!
//! [`Editor`] is the entry point; [`replay`] drives it from a recorded
//! session script.

pub mod compositor;
pub mod config;
pub mod constants;
pub mod editor;
pub mod error;
pub mod events;
pub mod geometry;
pub mod history;
pub mod keybindings;
pub mod layer;
pub mod raster;
pub mod replay;
pub mod selection;
pub mod stamper;
pub mod store;
pub mod stroke;
pub mod targets;
pub mod viewport;

#[cfg(test)]
mod tests;

pub use compositor::{CompositeOutput, CompositeRequest, ExportSet};
pub use config::EditorConfig;
pub use editor::{Editor, PointerButton};
pub use error::{CanvasError, Result};
pub use events::EditorEvent;
pub use geometry::{Point, SelectionBox};
pub use layer::{ControlnetParams, LayerId, LayerParams, RegionParams};
pub use selection::{LocalChannel, SelectionChannel};
pub use stroke::{BrushStyle, BrushTool, Rgba};
