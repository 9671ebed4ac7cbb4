//! Brush strokes and the stroke accumulator.
//!
//! A drag is captured as `begin → extend* → end`. Vector layers keep the raw
//! point list; sketch layers additionally run a [`StampSession`] that turns the
//! motion into evenly spaced stamps. All session state lives in the
//! accumulator instance.

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::geometry::{LogicalRect, Point};
use crate::layer::{LayerId, LayerKind};
use crate::stamper::StampSession;

/// An 8-bit straight-alpha color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(default = "opaque")]
    pub a: u8,
}

fn opaque() -> u8 {
    255
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::new(255, 255, 255, 255);
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            6 => Some(Self::new(channel(0)?, channel(2)?, channel(4)?, 255)),
            8 => Some(Self::new(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => None,
        }
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Self::WHITE
    }
}

/// Whether a stroke paints or removes pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrushTool {
    #[default]
    Brush,
    Eraser,
}

/// Brush settings applied to new strokes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrushStyle {
    #[serde(default)]
    pub tool: BrushTool,
    #[serde(default)]
    pub color: Rgba,
    /// Diameter in logical pixels
    #[serde(default = "default_size")]
    pub size: f32,
    /// Fraction of the radius painted fully opaque (sketch layers only)
    #[serde(default = "default_hardness")]
    pub hardness: f32,
}

fn default_size() -> f32 {
    constants::DEFAULT_BRUSH_SIZE
}

fn default_hardness() -> f32 {
    constants::DEFAULT_BRUSH_HARDNESS
}

impl Default for BrushStyle {
    fn default() -> Self {
        Self {
            tool: BrushTool::Brush,
            color: Rgba::WHITE,
            size: default_size(),
            hardness: default_hardness(),
        }
    }
}

impl BrushStyle {
    pub fn radius(&self) -> f32 {
        self.size / 2.0
    }
}

/// A polyline stroke in logical space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrushStroke {
    /// At least two points once finalized
    pub points: Vec<Point>,
    pub tool: BrushTool,
    pub color: Rgba,
    pub size: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardness: Option<f32>,
}

impl BrushStroke {
    pub fn new(point: Point, style: &BrushStyle) -> Self {
        Self {
            points: vec![point],
            tool: style.tool,
            color: style.color,
            size: style.size,
            hardness: Some(style.hardness),
        }
    }

    /// Make the stroke drawable by line primitives: a lone point is duplicated.
    pub fn finalize(&mut self) {
        if let [only] = self.points.as_slice() {
            let only = *only;
            self.points.push(only);
        }
    }

    /// Bounds of the stroke including its width.
    pub fn bounds(&self) -> LogicalRect {
        let mut rect = LogicalRect::empty();
        for p in &self.points {
            rect.expand_circle(*p, self.size / 2.0);
        }
        rect
    }
}

/// A stroke that has been closed by [`StrokeAccumulator::end`].
#[derive(Debug, Clone)]
pub enum FinishedStroke {
    /// Append to the layer's stroke list
    Vector { layer: LayerId, stroke: BrushStroke },
    /// Flatten the stamps into the layer's raster
    Stamped { layer: LayerId, session: StampSession },
}

impl FinishedStroke {
    pub fn layer(&self) -> LayerId {
        match self {
            FinishedStroke::Vector { layer, .. } | FinishedStroke::Stamped { layer, .. } => *layer,
        }
    }
}

#[derive(Debug, Clone)]
struct OpenStroke {
    layer: LayerId,
    stroke: BrushStroke,
    stamps: Option<StampSession>,
}

/// Captures one pointer drag at a time.
#[derive(Debug, Clone)]
pub struct StrokeAccumulator {
    open: Option<OpenStroke>,
    stamp_spacing: f32,
}

impl Default for StrokeAccumulator {
    fn default() -> Self {
        Self::new(constants::STAMP_SPACING)
    }
}

impl StrokeAccumulator {
    pub fn new(stamp_spacing: f32) -> Self {
        Self {
            open: None,
            stamp_spacing,
        }
    }

    /// Whether a stroke is open.
    pub fn is_drawing(&self) -> bool {
        self.open.is_some()
    }

    /// Layer of the open stroke.
    pub fn active_layer(&self) -> Option<LayerId> {
        self.open.as_ref().map(|o| o.layer)
    }

    /// Open a stroke. Returns false (no-op) on layers that take no drawing.
    ///
    /// A stroke still open from a lost pointer-up is discarded.
    pub fn begin(&mut self, layer: LayerId, point: Point, style: &BrushStyle) -> bool {
        if !layer.is_drawable() {
            return false;
        }
        if self.open.is_some() {
            log::warn!("Discarding unfinished stroke before starting a new one");
        }
        let stamps = match layer.kind() {
            LayerKind::Raster => Some(StampSession::begin(point, *style, self.stamp_spacing)),
            LayerKind::Vector => None,
        };
        self.open = Some(OpenStroke {
            layer,
            stroke: BrushStroke::new(point, style),
            stamps,
        });
        true
    }

    /// Append a point to the open stroke. No-op when not drawing.
    pub fn extend(&mut self, point: Point) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        open.stroke.points.push(point);
        if let Some(stamps) = open.stamps.as_mut() {
            stamps.move_to(point);
        }
    }

    /// The stroke being drawn, for live rendering.
    pub fn preview(&self) -> Option<(LayerId, &BrushStroke)> {
        self.open.as_ref().map(|o| (o.layer, &o.stroke))
    }

    /// The stamp session being drawn, for live rendering of sketch layers.
    pub fn preview_stamps(&self) -> Option<&StampSession> {
        self.open.as_ref().and_then(|o| o.stamps.as_ref())
    }

    /// Close the open stroke.
    pub fn end(&mut self) -> Option<FinishedStroke> {
        let OpenStroke {
            layer,
            mut stroke,
            stamps,
        } = self.open.take()?;
        Some(match stamps {
            Some(session) => FinishedStroke::Stamped { layer, session },
            None => {
                stroke.finalize();
                FinishedStroke::Vector { layer, stroke }
            }
        })
    }

    /// Drop the open stroke without committing it.
    pub fn cancel(&mut self) {
        self.open = None;
    }
}
