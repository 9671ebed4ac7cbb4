//! Global constants for the canvas engine

/// Distance in logical pixels between consecutive brush stamps on sketch layers
pub const STAMP_SPACING: f32 = 10.0;

/// Smallest scale reachable by stepped zooming
pub const MIN_SCALE: f32 = 0.1;

/// Largest scale reachable by any zoom
pub const MAX_SCALE: f32 = 10.0;

/// Multiplier applied per zoom step
pub const ZOOM_FACTOR: f32 = 1.1;

/// Backend dimension constraint: selection boxes and exports are multiples of this
pub const GRID: u32 = 8;

/// Default maximum number of snapshots kept per history topic
pub const MAX_HISTORY: usize = 100;

/// Default brush diameter in logical pixels
pub const DEFAULT_BRUSH_SIZE: f32 = 40.0;

/// Default brush hardness (fraction of the radius that is fully opaque)
pub const DEFAULT_BRUSH_HARDNESS: f32 = 1.0;

/// Smallest brush diameter reachable through the size shortcuts
pub const MIN_BRUSH_SIZE: f32 = 1.0;

/// Largest brush diameter reachable through the size shortcuts
pub const MAX_BRUSH_SIZE: f32 = 500.0;

/// Brush size change applied by one press of the size shortcuts
pub const BRUSH_SIZE_STEP: f32 = 5.0;

/// Default selection box edge length
pub const DEFAULT_SELECTION_SIZE: u32 = 512;

/// Topic prefix shared by every canvas history topic
pub const TOPIC_PREFIX: &str = "canvas/";

/// Name of the cross-topic chronological history channel
pub const LINE_TOPIC: &str = "canvas/line";
