//! Layer storage and management.
//!
//! The store owns every layer's committed content, its flags and its place in
//! the stack. It knows nothing about history: content mutators hand back the
//! previous [`LayerSnapshot`] so the caller can record it. Every mutation
//! queues an [`EditorEvent`] for the presentation layer.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CanvasError, Result};
use crate::events::{EditorEvent, EventQueue};
use crate::layer::{ControlnetParams, LayerId, LayerKind, LayerParams, RegionParams};
use crate::raster::RasterImage;
use crate::stroke::BrushStroke;

/// The content of one layer at one point in time; the history payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LayerSnapshot {
    #[serde(default)]
    pub strokes: Vec<BrushStroke>,
    #[serde(default)]
    pub raster: Option<RasterImage>,
}

impl LayerSnapshot {
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.raster.is_none()
    }
}

/// A single layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    /// Display name
    pub name: String,
    /// Vector content (mask, controlnet, controlnet mask, region mask)
    pub strokes: Vec<BrushStroke>,
    /// Raster content (base, sketch) or placed guide image (controlnet)
    pub raster: Option<RasterImage>,
    pub visible: bool,
    /// Whether the layer takes part in generation (controlnet units, regions)
    pub enabled: bool,
    /// Compositing opacity for raster content
    pub opacity: f32,
    pub params: LayerParams,
}

impl Layer {
    fn new(id: LayerId, name: impl Into<String>, params: LayerParams) -> Self {
        Self {
            id,
            name: name.into(),
            strokes: Vec::new(),
            raster: None,
            visible: true,
            enabled: true,
            opacity: 1.0,
            params,
        }
    }

    pub fn snapshot(&self) -> LayerSnapshot {
        LayerSnapshot {
            strokes: self.strokes.clone(),
            raster: self.raster.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.raster.is_none()
    }

    pub fn controlnet_params(&self) -> Option<&ControlnetParams> {
        match &self.params {
            LayerParams::Controlnet(params) => Some(params),
            _ => None,
        }
    }

    pub fn region_params(&self) -> Option<&RegionParams> {
        match &self.params {
            LayerParams::Region(params) => Some(params),
            _ => None,
        }
    }
}

/// Direction for reordering sketch layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerMove {
    Up,
    Down,
}

/// Storage for every layer of one canvas.
#[derive(Debug, Clone)]
pub struct LayerStore {
    layers: HashMap<LayerId, Layer>,
    /// Sketch layers bottom to top; the rest of the stack order is fixed
    sketch_order: Vec<LayerId>,
    /// Counter for generating unique layer IDs
    next_id: u32,
    events: EventQueue,
}

impl Default for LayerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerStore {
    /// Create a store holding the fixed base and mask layers.
    pub fn new() -> Self {
        let mut layers = HashMap::new();
        layers.insert(LayerId::Base, Layer::new(LayerId::Base, "Base", LayerParams::None));
        layers.insert(LayerId::Mask, Layer::new(LayerId::Mask, "Mask", LayerParams::None));
        Self {
            layers,
            sketch_order: Vec::new(),
            next_id: 0,
            events: EventQueue::default(),
        }
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn insert(&mut self, layer: Layer) {
        let id = layer.id;
        log::info!("Added layer {}", id);
        self.layers.insert(id, layer);
        self.events.push(EditorEvent::LayerAdded(id));
    }

    /// Add a sketch layer on top of the other sketch layers.
    pub fn add_sketch(&mut self, name: impl Into<String>) -> LayerId {
        let id = LayerId::Sketch(self.allocate_id());
        self.insert(Layer::new(id, name, LayerParams::None));
        self.sketch_order.push(id);
        id
    }

    /// Add a controlnet layer and its mask companion. Returns the guide layer.
    pub fn add_controlnet(&mut self, name: impl Into<String>, params: ControlnetParams) -> LayerId {
        let n = self.allocate_id();
        let name = name.into();
        let mask_name = format!("{} mask", name);
        self.insert(Layer::new(
            LayerId::Controlnet(n),
            name,
            LayerParams::Controlnet(params),
        ));
        self.insert(Layer::new(
            LayerId::ControlnetMask(n),
            mask_name,
            LayerParams::None,
        ));
        LayerId::Controlnet(n)
    }

    /// Add a regional prompt mask.
    pub fn add_region(&mut self, name: impl Into<String>, params: RegionParams) -> LayerId {
        let id = LayerId::RegionMask(self.allocate_id());
        self.insert(Layer::new(id, name, LayerParams::Region(params)));
        id
    }

    /// Remove a layer. Removing a controlnet also removes its mask companion.
    ///
    /// Returns the ids that were removed so their history can be discarded.
    pub fn remove(&mut self, id: LayerId) -> Result<Vec<LayerId>> {
        let ids = match id {
            LayerId::Base | LayerId::Mask => {
                return Err(CanvasError::unsupported(id, "removal"));
            }
            LayerId::Controlnet(n) | LayerId::ControlnetMask(n) => {
                vec![LayerId::Controlnet(n), LayerId::ControlnetMask(n)]
            }
            other => vec![other],
        };
        if !self.layers.contains_key(&id) {
            return Err(CanvasError::UnknownLayer(id));
        }
        for removed in &ids {
            if self.layers.remove(removed).is_some() {
                log::info!("Removed layer {}", removed);
                self.events.push(EditorEvent::LayerRemoved(*removed));
            }
        }
        self.sketch_order.retain(|s| !ids.contains(s));
        Ok(ids)
    }

    pub fn contains(&self, id: LayerId) -> bool {
        self.layers.contains_key(&id)
    }

    pub fn get(&self, id: LayerId) -> Result<&Layer> {
        self.layers.get(&id).ok_or(CanvasError::UnknownLayer(id))
    }

    fn get_mut(&mut self, id: LayerId) -> Result<&mut Layer> {
        self.layers.get_mut(&id).ok_or(CanvasError::UnknownLayer(id))
    }

    /// All layers bottom to top: base, sketches, controlnets, regions, mask.
    pub fn ordered(&self) -> Vec<&Layer> {
        let mut rest: Vec<&Layer> = self
            .layers
            .values()
            .filter(|l| l.id != LayerId::Base && l.id != LayerId::Mask)
            .filter(|l| !matches!(l.id, LayerId::Sketch(_)))
            .collect();
        rest.sort_by_key(|l| l.id);

        let mut ordered = Vec::with_capacity(self.layers.len());
        ordered.extend(self.layers.get(&LayerId::Base));
        ordered.extend(self.sketch_order.iter().filter_map(|id| self.layers.get(id)));
        ordered.extend(rest);
        ordered.extend(self.layers.get(&LayerId::Mask));
        ordered
    }

    /// Sketch layers bottom to top.
    pub fn sketch_layers(&self) -> &[LayerId] {
        &self.sketch_order
    }

    /// Controlnet guide layers in creation order.
    pub fn controlnet_layers(&self) -> Vec<LayerId> {
        let mut ids: Vec<LayerId> = self
            .layers
            .keys()
            .copied()
            .filter(|id| matches!(id, LayerId::Controlnet(_)))
            .collect();
        ids.sort();
        ids
    }

    /// Region mask layers in creation order.
    pub fn region_layers(&self) -> Vec<LayerId> {
        let mut ids: Vec<LayerId> = self
            .layers
            .keys()
            .copied()
            .filter(|id| matches!(id, LayerId::RegionMask(_)))
            .collect();
        ids.sort();
        ids
    }

    /// Move a sketch layer one step up or down the stack.
    pub fn move_layer(&mut self, id: LayerId, direction: LayerMove) -> Result<bool> {
        if !matches!(id, LayerId::Sketch(_)) {
            return Err(CanvasError::unsupported(id, "reordering"));
        }
        let index = self
            .sketch_order
            .iter()
            .position(|s| *s == id)
            .ok_or(CanvasError::UnknownLayer(id))?;
        let target = match direction {
            LayerMove::Up if index + 1 < self.sketch_order.len() => index + 1,
            LayerMove::Down if index > 0 => index - 1,
            _ => return Ok(false),
        };
        self.sketch_order.swap(index, target);
        self.events.push(EditorEvent::LayerOrderChanged);
        Ok(true)
    }

    // ========================================================================
    // Content
    // ========================================================================

    /// Strokes of a vector layer.
    pub fn get_lines(&self, id: LayerId) -> Result<&[BrushStroke]> {
        if id.kind() != LayerKind::Vector {
            return Err(CanvasError::unsupported(id, "strokes"));
        }
        Ok(&self.get(id)?.strokes)
    }

    /// Replace the strokes of a vector layer, returning the previous content.
    pub fn set_lines(&mut self, id: LayerId, strokes: Vec<BrushStroke>) -> Result<LayerSnapshot> {
        if id.kind() != LayerKind::Vector {
            return Err(CanvasError::unsupported(id, "strokes"));
        }
        let layer = self.get_mut(id)?;
        let before = layer.snapshot();
        layer.strokes = strokes;
        self.events.push(EditorEvent::LayerContentChanged(id));
        Ok(before)
    }

    /// Append one finalized stroke, returning the previous content.
    pub fn push_line(&mut self, id: LayerId, stroke: BrushStroke) -> Result<LayerSnapshot> {
        if id.kind() != LayerKind::Vector {
            return Err(CanvasError::unsupported(id, "strokes"));
        }
        let layer = self.get_mut(id)?;
        let before = layer.snapshot();
        layer.strokes.push(stroke);
        self.events.push(EditorEvent::LayerContentChanged(id));
        Ok(before)
    }

    /// Raster of a layer that holds one (base, sketch, controlnet guide image).
    pub fn get_raster(&self, id: LayerId) -> Result<Option<&RasterImage>> {
        if !id.accepts_images() {
            return Err(CanvasError::unsupported(id, "raster content"));
        }
        Ok(self.get(id)?.raster.as_ref())
    }

    /// Replace a layer's raster, returning the previous content.
    pub fn set_raster(&mut self, id: LayerId, raster: Option<RasterImage>) -> Result<LayerSnapshot> {
        if !id.accepts_images() {
            return Err(CanvasError::unsupported(id, "raster content"));
        }
        let layer = self.get_mut(id)?;
        let before = layer.snapshot();
        layer.raster = raster;
        self.events.push(EditorEvent::LayerContentChanged(id));
        Ok(before)
    }

    pub fn snapshot(&self, id: LayerId) -> Result<LayerSnapshot> {
        Ok(self.get(id)?.snapshot())
    }

    /// Put a snapshot back as the layer's content (undo/redo).
    pub fn restore(&mut self, id: LayerId, snapshot: LayerSnapshot) -> Result<()> {
        let layer = self.get_mut(id)?;
        layer.strokes = snapshot.strokes;
        layer.raster = snapshot.raster;
        self.events.push(EditorEvent::LayerContentChanged(id));
        Ok(())
    }

    /// Empty a layer. Returns the previous content, or None if it was already empty.
    pub fn clear(&mut self, id: LayerId) -> Result<Option<LayerSnapshot>> {
        let layer = self.get_mut(id)?;
        if layer.is_empty() {
            return Ok(None);
        }
        let before = layer.snapshot();
        layer.strokes.clear();
        layer.raster = None;
        self.events.push(EditorEvent::LayerContentChanged(id));
        Ok(Some(before))
    }

    // ========================================================================
    // Flags and attributes
    // ========================================================================

    pub fn set_visible(&mut self, id: LayerId, visible: bool) -> Result<()> {
        let layer = self.get_mut(id)?;
        if layer.visible != visible {
            layer.visible = visible;
            self.events.push(EditorEvent::LayerFlagsChanged(id));
        }
        Ok(())
    }

    /// Toggle visibility without notifying; used by the compositor's scoped overrides.
    pub(crate) fn set_visible_silent(&mut self, id: LayerId, visible: bool) {
        if let Some(layer) = self.layers.get_mut(&id) {
            layer.visible = visible;
        }
    }

    pub fn set_enabled(&mut self, id: LayerId, enabled: bool) -> Result<()> {
        let layer = self.get_mut(id)?;
        if layer.enabled != enabled {
            layer.enabled = enabled;
            self.events.push(EditorEvent::LayerFlagsChanged(id));
        }
        Ok(())
    }

    pub fn set_opacity(&mut self, id: LayerId, opacity: f32) -> Result<()> {
        let layer = self.get_mut(id)?;
        layer.opacity = opacity.clamp(0.0, 1.0);
        self.events.push(EditorEvent::LayerFlagsChanged(id));
        Ok(())
    }

    pub fn rename(&mut self, id: LayerId, name: impl Into<String>) -> Result<()> {
        self.get_mut(id)?.name = name.into();
        self.events.push(EditorEvent::LayerFlagsChanged(id));
        Ok(())
    }

    /// Replace kind-specific attributes; the variant must match the layer kind.
    pub fn set_params(&mut self, id: LayerId, params: LayerParams) -> Result<()> {
        let matches_kind = matches!(
            (id, &params),
            (LayerId::Controlnet(_), LayerParams::Controlnet(_))
                | (LayerId::RegionMask(_), LayerParams::Region(_))
        );
        if !matches_kind {
            return Err(CanvasError::unsupported(id, "these parameters"));
        }
        self.get_mut(id)?.params = params;
        self.events.push(EditorEvent::LayerFlagsChanged(id));
        Ok(())
    }

    /// `(layer, visible)` for every layer, in stack order.
    pub fn visibility_flags(&self) -> Vec<(LayerId, bool)> {
        self.ordered().iter().map(|l| (l.id, l.visible)).collect()
    }

    pub(crate) fn events_mut(&mut self) -> &mut EventQueue {
        &mut self.events
    }
}
