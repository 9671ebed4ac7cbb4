//! The editor facade: one canvas session.
//!
//! Ties the layer store, history, viewport, stroke accumulator, render
//! targets and selection together behind pointer/keyboard handlers and layer
//! commands. Everything runs on the caller's event loop.
//!
//! Image decode and encode are deferred: they are queued as pending work and
//! resolved by [`Editor::process_pending`], the stand-in for the asynchronous
//! completion of those jobs. While a flatten (or image placement) for a layer
//! is pending, the layer is busy and new strokes on it are rejected. Undo,
//! redo and compositing are rejected while anything is queued, including the
//! remount of a restored raster.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tiny_skia::{Pixmap, Transform};

use crate::compositor::{self, CompositeOutput, CompositeRequest, StagePreview};
use crate::config::EditorConfig;
use crate::constants::{BRUSH_SIZE_STEP, LINE_TOPIC, MAX_BRUSH_SIZE, MIN_BRUSH_SIZE, TOPIC_PREFIX};
use crate::error::{CanvasError, Result};
use crate::events::EditorEvent;
use crate::geometry::{LogicalRect, Point, SelectionBox};
use crate::history::HistoryManager;
use crate::keybindings::{KeyAction, KeyBindings, KeyCode, Modifiers};
use crate::layer::{ControlnetParams, LayerId, LayerKind, LayerParams, RegionParams};
use crate::raster::{self, RasterImage};
use crate::selection::{Corner, LocalChannel, SelectionChannel, SelectionState};
use crate::stamper::StampSession;
use crate::store::{Layer, LayerMove, LayerSnapshot, LayerStore};
use crate::stroke::{BrushStroke, BrushStyle, BrushTool, FinishedStroke, StrokeAccumulator};
use crate::targets::RenderTargets;
use crate::viewport::{Viewport, ZoomDirection, ZoomLimits, ZoomOrigin};

/// Pointer button of a pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerButton {
    #[default]
    Primary,
    Middle,
    Secondary,
}

/// Deferred decode/encode work.
#[derive(Debug, Clone)]
enum PendingWork {
    /// Merge a finished stamp session into a sketch layer's raster
    Flatten { layer: LayerId, session: StampSession },
    /// Decode a pasted image and place it on a layer
    Place {
        layer: LayerId,
        data_url: String,
        at: Point,
        metadata: Option<String>,
    },
    /// Decode committed raster content into a render target
    Mount { layer: LayerId, raster: RasterImage },
}

impl PendingWork {
    fn layer(&self) -> LayerId {
        match self {
            PendingWork::Flatten { layer, .. }
            | PendingWork::Place { layer, .. }
            | PendingWork::Mount { layer, .. } => *layer,
        }
    }
}

/// One canvas editing session.
pub struct Editor<C = LocalChannel> {
    config: EditorConfig,
    store: LayerStore,
    history: HistoryManager<LayerSnapshot>,
    viewport: Viewport,
    targets: RenderTargets,
    accumulator: StrokeAccumulator,
    selection: SelectionState,
    channel: C,
    bindings: KeyBindings,
    brush: BrushStyle,
    active: LayerId,
    pending: VecDeque<PendingWork>,
    /// Layers with a flatten or placement in flight
    busy: HashSet<LayerId>,
    /// Last screen position while a pan drag is in progress
    pan_anchor: Option<Point>,
    pan_key_held: bool,
    last_paste_metadata: Option<String>,
}

impl Editor<LocalChannel> {
    pub fn new(config: EditorConfig) -> Self {
        Self::with_channel(config, LocalChannel::new())
    }
}

impl Default for Editor<LocalChannel> {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl<C: SelectionChannel> Editor<C> {
    /// Start a session that shares its selection box over `channel`.
    pub fn with_channel(config: EditorConfig, channel: C) -> Self {
        let config = config.sanitized();
        let limits = ZoomLimits::from(&config);
        Self {
            store: LayerStore::new(),
            history: HistoryManager::new(config.max_history),
            viewport: Viewport::new(1024.0, 768.0, limits),
            targets: RenderTargets::new(),
            accumulator: StrokeAccumulator::new(config.stamp_spacing),
            selection: SelectionState::new(config.grid),
            channel,
            bindings: KeyBindings::default(),
            brush: config.brush,
            active: LayerId::Mask,
            pending: VecDeque::new(),
            busy: HashSet::new(),
            pan_anchor: None,
            pan_key_held: false,
            last_paste_metadata: None,
            config,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn store(&self) -> &LayerStore {
        &self.store
    }

    pub fn layer(&self, id: LayerId) -> Result<&Layer> {
        self.store.get(id)
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn selection(&self) -> SelectionBox {
        self.selection.get()
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn bindings(&self) -> &KeyBindings {
        &self.bindings
    }

    pub fn set_bindings(&mut self, bindings: KeyBindings) {
        self.bindings = bindings;
    }

    pub fn brush(&self) -> &BrushStyle {
        &self.brush
    }

    pub fn set_brush(&mut self, brush: BrushStyle) {
        self.brush = BrushStyle {
            size: brush.size.clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE),
            hardness: brush.hardness.clamp(0.0, 1.0),
            ..brush
        };
    }

    pub fn active_layer(&self) -> LayerId {
        self.active
    }

    pub fn is_drawing(&self) -> bool {
        self.accumulator.is_drawing()
    }

    pub fn is_panning(&self) -> bool {
        self.pan_anchor.is_some()
    }

    /// Whether a flatten or placement on `layer` is still pending.
    pub fn is_busy(&self, layer: LayerId) -> bool {
        self.busy.contains(&layer)
    }

    pub fn has_pending_work(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn last_paste_metadata(&self) -> Option<&str> {
        self.last_paste_metadata.as_deref()
    }

    /// Queued change notifications, oldest first.
    pub fn drain_events(&mut self) -> Vec<EditorEvent> {
        self.store.events_mut().drain()
    }

    fn emit(&mut self, event: EditorEvent) {
        self.store.events_mut().push(event);
    }

    fn emit_history_changed(&mut self) {
        let event = EditorEvent::HistoryChanged {
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
        };
        self.emit(event);
    }

    fn emit_viewport_changed(&mut self) {
        let zoom_percent = self.viewport.zoom_percent();
        self.emit(EditorEvent::ViewportChanged { zoom_percent });
    }

    /// Fails while any decode/encode work is queued, including the remount
    /// an undo or redo leaves behind.
    fn ensure_idle(&self) -> Result<()> {
        let pending = self
            .busy
            .iter()
            .next()
            .copied()
            .or_else(|| self.pending.front().map(PendingWork::layer));
        match pending {
            Some(layer) => {
                log::warn!("Rejected action while {} has pending work", layer);
                Err(CanvasError::Busy(layer))
            }
            None => Ok(()),
        }
    }

    // ========================================================================
    // Pointer input
    // ========================================================================

    /// Pointer pressed at a screen position.
    ///
    /// Starts a pan drag (middle button or pan key held) or a stroke on the
    /// active layer. Drawing on the base layer is a no-op.
    pub fn pointer_down(&mut self, screen: Point, button: PointerButton) -> Result<()> {
        if button == PointerButton::Middle || self.pan_key_held {
            self.pan_anchor = Some(screen);
            return Ok(());
        }
        if button != PointerButton::Primary || !self.active.is_drawable() {
            return Ok(());
        }
        if self.busy.contains(&self.active) {
            log::warn!("Stroke on {} rejected: flatten pending", self.active);
            return Err(CanvasError::Busy(self.active));
        }
        let logical = self.viewport.to_logical(screen);
        self.accumulator.begin(self.active, logical, &self.brush);
        Ok(())
    }

    /// Pointer moved: pans the stage or extends the open stroke.
    pub fn pointer_move(&mut self, screen: Point) {
        if let Some(anchor) = self.pan_anchor {
            self.viewport.pan_by(screen - anchor);
            self.pan_anchor = Some(screen);
            self.emit_viewport_changed();
            return;
        }
        if self.accumulator.is_drawing() {
            let logical = self.viewport.to_logical(screen);
            self.accumulator.extend(logical);
        }
    }

    /// Pointer released: ends a pan drag or finalizes the open stroke.
    pub fn pointer_up(&mut self) -> Result<()> {
        if self.pan_anchor.take().is_some() {
            return Ok(());
        }
        let Some(finished) = self.accumulator.end() else {
            return Ok(());
        };
        match finished {
            FinishedStroke::Vector { layer, stroke } => {
                let label = match stroke.tool {
                    BrushTool::Brush => "Brush stroke",
                    BrushTool::Eraser => "Eraser stroke",
                };
                let before = self.store.push_line(layer, stroke)?;
                self.record(layer, label, before);
            }
            FinishedStroke::Stamped { layer, session } => {
                self.busy.insert(layer);
                self.pending.push_back(PendingWork::Flatten { layer, session });
            }
        }
        Ok(())
    }

    /// Wheel zoom around the pointer. Negative `delta_y` zooms in.
    pub fn wheel(&mut self, screen: Point, delta_y: f32) {
        if delta_y == 0.0 {
            return;
        }
        let direction = if delta_y < 0.0 {
            ZoomDirection::In
        } else {
            ZoomDirection::Out
        };
        self.zoom(direction, ZoomOrigin::Pointer(screen), None);
    }

    // ========================================================================
    // Keyboard input
    // ========================================================================

    /// Key pressed. Returns whether the key was handled.
    pub fn key_down(&mut self, key: KeyCode, modifiers: Modifiers) -> Result<bool> {
        if key == self.bindings.pan && modifiers == Modifiers::NONE {
            self.pan_key_held = true;
            return Ok(true);
        }
        let Some(action) = self.bindings.action_for(key, modifiers) else {
            return Ok(false);
        };
        log::debug!("Key action: {}", action.description());
        match action {
            KeyAction::Undo => {
                self.undo()?;
            }
            KeyAction::Redo => {
                self.redo()?;
            }
            KeyAction::BrushSmaller => self.resize_brush(-BRUSH_SIZE_STEP),
            KeyAction::BrushLarger => self.resize_brush(BRUSH_SIZE_STEP),
            KeyAction::ToggleEraser => {
                self.brush.tool = match self.brush.tool {
                    BrushTool::Brush => BrushTool::Eraser,
                    BrushTool::Eraser => BrushTool::Brush,
                };
            }
            KeyAction::ZoomIn => self.zoom(ZoomDirection::In, ZoomOrigin::CanvasCenter, None),
            KeyAction::ZoomOut => self.zoom(ZoomDirection::Out, ZoomOrigin::CanvasCenter, None),
            KeyAction::ZoomReset => self.reset_view(),
            KeyAction::CancelStroke => self.accumulator.cancel(),
        }
        Ok(true)
    }

    /// Key released.
    pub fn key_up(&mut self, key: KeyCode) {
        if key == self.bindings.pan {
            self.pan_key_held = false;
            self.pan_anchor = None;
        }
    }

    fn resize_brush(&mut self, delta: f32) {
        self.brush.size = (self.brush.size + delta).clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE);
    }

    // ========================================================================
    // Viewport
    // ========================================================================

    pub fn zoom(&mut self, direction: ZoomDirection, origin: ZoomOrigin, explicit_percent: Option<f32>) {
        self.viewport.zoom(direction, origin, explicit_percent);
        self.emit_viewport_changed();
    }

    pub fn zoom_percent(&self) -> u32 {
        self.viewport.zoom_percent()
    }

    pub fn pan_by(&mut self, delta: Point) {
        self.viewport.pan_by(delta);
        self.emit_viewport_changed();
    }

    pub fn reset_view(&mut self) {
        self.viewport.reset();
        self.emit_viewport_changed();
    }

    pub fn set_stage_size(&mut self, width: f32, height: f32) {
        self.viewport.set_stage_size(width, height);
        self.emit_viewport_changed();
    }

    /// Fit the base image (or the selection when there is none) into the stage.
    pub fn fit_to_view(&mut self) {
        let rect = match self.store.get(LayerId::Base).ok().and_then(|l| l.raster.as_ref()) {
            Some(raster) => raster.bounds(),
            None => self.selection.get().to_rect(),
        };
        self.viewport.fit(&rect);
        self.emit_viewport_changed();
    }

    // ========================================================================
    // Layers
    // ========================================================================

    pub fn add_sketch_layer(&mut self, name: impl Into<String>) -> LayerId {
        self.store.add_sketch(name)
    }

    pub fn add_controlnet_layer(&mut self, name: impl Into<String>, params: ControlnetParams) -> LayerId {
        self.store.add_controlnet(name, params)
    }

    pub fn add_region_layer(&mut self, name: impl Into<String>, params: RegionParams) -> LayerId {
        self.store.add_region(name, params)
    }

    /// Remove a layer together with its history, render target and pending work.
    pub fn remove_layer(&mut self, id: LayerId) -> Result<()> {
        let removed = self.store.remove(id)?;
        for layer in &removed {
            self.history.remove_topic(&layer.topic());
            self.targets.unmount(*layer);
            self.busy.remove(layer);
            if self.accumulator.active_layer() == Some(*layer) {
                self.accumulator.cancel();
            }
        }
        self.pending.retain(|work| !removed.contains(&work.layer()));
        if removed.contains(&self.active) {
            self.active = LayerId::Mask;
            self.emit(EditorEvent::ActiveLayerChanged(self.active));
        }
        self.emit_history_changed();
        Ok(())
    }

    /// Route drawing input to another layer. An open stroke is dropped.
    pub fn set_active_layer(&mut self, id: LayerId) -> Result<()> {
        if !self.store.contains(id) {
            return Err(CanvasError::UnknownLayer(id));
        }
        if self.active == id {
            return Ok(());
        }
        if self.accumulator.is_drawing() {
            log::warn!("Active layer changed mid-stroke, dropping stroke");
            self.accumulator.cancel();
        }
        self.active = id;
        self.emit(EditorEvent::ActiveLayerChanged(id));
        Ok(())
    }

    pub fn set_layer_visible(&mut self, id: LayerId, visible: bool) -> Result<()> {
        self.store.set_visible(id, visible)
    }

    pub fn set_layer_enabled(&mut self, id: LayerId, enabled: bool) -> Result<()> {
        self.store.set_enabled(id, enabled)
    }

    pub fn set_layer_opacity(&mut self, id: LayerId, opacity: f32) -> Result<()> {
        self.store.set_opacity(id, opacity)
    }

    pub fn set_layer_params(&mut self, id: LayerId, params: LayerParams) -> Result<()> {
        self.store.set_params(id, params)
    }

    pub fn rename_layer(&mut self, id: LayerId, name: impl Into<String>) -> Result<()> {
        self.store.rename(id, name)
    }

    pub fn move_layer(&mut self, id: LayerId, direction: LayerMove) -> Result<bool> {
        self.store.move_layer(id, direction)
    }

    /// Empty a layer. Records one history step if it had content.
    pub fn clear_layer(&mut self, id: LayerId) -> Result<()> {
        if self.busy.contains(&id) {
            return Err(CanvasError::Busy(id));
        }
        if let Some(before) = self.store.clear(id)? {
            self.targets.unmount(id);
            self.record(id, "Clear layer", before);
        }
        Ok(())
    }

    /// Replace a vector layer's strokes as one undoable step.
    pub fn set_lines(&mut self, id: LayerId, strokes: Vec<BrushStroke>) -> Result<()> {
        let before = self.store.set_lines(id, strokes)?;
        self.record(id, "Edit strokes", before);
        Ok(())
    }

    fn record(&mut self, layer: LayerId, label: &str, before: LayerSnapshot) {
        if !layer.has_history() {
            return;
        }
        let record = self.history.commit(&layer.topic(), label, before);
        self.emit(EditorEvent::HistoryRecorded {
            topic: record.topic,
            label: record.label,
        });
        self.emit_history_changed();
    }

    // ========================================================================
    // History
    // ========================================================================

    /// Undo the most recent step across all layers.
    pub fn undo(&mut self) -> Result<bool> {
        self.undo_topic(LINE_TOPIC)
    }

    /// Redo the most recently undone step across all layers.
    pub fn redo(&mut self) -> Result<bool> {
        self.redo_topic(LINE_TOPIC)
    }

    /// Undo the latest step of one layer.
    pub fn undo_layer(&mut self, id: LayerId) -> Result<bool> {
        self.undo_topic(&id.topic())
    }

    pub fn redo_layer(&mut self, id: LayerId) -> Result<bool> {
        self.redo_topic(&id.topic())
    }

    /// Undo on a topic; `canvas/line` follows the chronological log.
    ///
    /// Returns false when there was nothing to undo.
    pub fn undo_topic(&mut self, topic: &str) -> Result<bool> {
        self.ensure_idle()?;
        let Some(topic) = self.history.undo_target(topic).map(str::to_owned) else {
            return Ok(false);
        };
        let layer = layer_for_topic(&topic)?;
        let current = self.store.snapshot(layer)?;
        match self.history.undo(&topic, current) {
            Some(state) => self.apply_snapshot(layer, state)?,
            None => return Ok(false),
        }
        self.emit_history_changed();
        Ok(true)
    }

    pub fn redo_topic(&mut self, topic: &str) -> Result<bool> {
        self.ensure_idle()?;
        let Some(topic) = self.history.redo_target(topic).map(str::to_owned) else {
            return Ok(false);
        };
        let layer = layer_for_topic(&topic)?;
        let current = self.store.snapshot(layer)?;
        match self.history.redo(&topic, current) {
            Some(state) => self.apply_snapshot(layer, state)?,
            None => return Ok(false),
        }
        self.emit_history_changed();
        Ok(true)
    }

    fn apply_snapshot(&mut self, layer: LayerId, state: LayerSnapshot) -> Result<()> {
        let raster = state.raster.clone();
        self.store.restore(layer, state)?;
        match raster {
            Some(raster) if !self.targets.is_mounted(layer, &raster) => {
                self.pending.push_back(PendingWork::Mount { layer, raster });
            }
            Some(_) => {}
            None => self.targets.unmount(layer),
        }
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn can_undo_layer(&self, id: LayerId) -> bool {
        self.history.can_undo_topic(&id.topic())
    }

    pub fn can_redo_layer(&self, id: LayerId) -> bool {
        self.history.can_redo_topic(&id.topic())
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.history.undo_label()
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.history.redo_label()
    }

    pub fn history(&self) -> &HistoryManager<LayerSnapshot> {
        &self.history
    }

    // ========================================================================
    // Images
    // ========================================================================

    /// Paste an image onto the active layer with its top-left at `at` (logical).
    pub fn paste_image(&mut self, data_url: impl Into<String>, at: Point, metadata: Option<String>) -> Result<()> {
        let layer = self.active;
        if !layer.accepts_images() {
            return Err(CanvasError::unsupported(layer, "image paste"));
        }
        if self.busy.contains(&layer) {
            return Err(CanvasError::Busy(layer));
        }
        self.busy.insert(layer);
        self.pending.push_back(PendingWork::Place {
            layer,
            data_url: data_url.into(),
            at,
            metadata,
        });
        Ok(())
    }

    /// Drop an image at a screen position onto the active layer.
    pub fn drop_image(&mut self, data_url: impl Into<String>, screen: Point, metadata: Option<String>) -> Result<()> {
        let at = self.viewport.to_logical(screen);
        self.paste_image(data_url, at, metadata)
    }

    /// Load a new base image at the origin. Not recorded in history.
    pub fn set_base_image(&mut self, data_url: impl Into<String>) -> Result<()> {
        if self.busy.contains(&LayerId::Base) {
            return Err(CanvasError::Busy(LayerId::Base));
        }
        self.busy.insert(LayerId::Base);
        self.pending.push_back(PendingWork::Place {
            layer: LayerId::Base,
            data_url: data_url.into(),
            at: Point::ZERO,
            metadata: None,
        });
        Ok(())
    }

    // ========================================================================
    // Pending work
    // ========================================================================

    /// Resolve queued decode/encode work in order.
    ///
    /// Returns how many jobs completed. A failing job releases its layer and
    /// is reported; jobs after it stay queued.
    pub fn process_pending(&mut self) -> Result<usize> {
        let mut done = 0;
        while let Some(work) = self.pending.pop_front() {
            let layer = work.layer();
            let releases = !matches!(work, PendingWork::Mount { .. });
            let result = match work {
                PendingWork::Flatten { layer, session } => self.flatten(layer, &session),
                PendingWork::Place {
                    layer,
                    data_url,
                    at,
                    metadata,
                } => self.place(layer, data_url, at, metadata),
                PendingWork::Mount { layer, raster } => self.mount(layer, raster),
            };
            if releases {
                self.busy.remove(&layer);
            }
            if let Err(err) = result {
                log::warn!("Pending work on {} failed: {}", layer, err);
                return Err(err);
            }
            done += 1;
        }
        Ok(done)
    }

    fn mount(&mut self, layer: LayerId, raster: RasterImage) -> Result<()> {
        // Content may have moved on since the job was queued
        let current = self.store.get(layer)?.raster.as_ref();
        if current != Some(&raster) {
            return Ok(());
        }
        let pixmap = raster::decode_data_url(&raster.data_url)?;
        self.targets.mount(layer, raster, pixmap);
        Ok(())
    }

    /// Decoded pixels of a layer's current raster, from its render target or
    /// straight from the data URL when the target is not mounted yet.
    fn current_pixels(&self, layer: LayerId) -> Result<Option<(RasterImage, Pixmap)>> {
        let Some(raster) = self.store.get(layer)?.raster.clone() else {
            return Ok(None);
        };
        let pixmap = match self.targets.get(layer, &raster) {
            Some(target) => target.pixmap.clone(),
            None => raster::decode_data_url(&raster.data_url)?,
        };
        Ok(Some((raster, pixmap)))
    }

    /// Merge `existing` and whatever `paint` draws into one bitmap covering
    /// `bounds`, then commit it as the layer's raster.
    fn merge_into_layer(
        &mut self,
        layer: LayerId,
        mut bounds: LogicalRect,
        label: &str,
        paint: impl FnOnce(&mut Pixmap, Transform),
    ) -> Result<()> {
        let existing = self.current_pixels(layer)?;
        if let Some((raster, _)) = &existing {
            bounds.union(&raster.bounds());
        }
        let Some((x, y, width, height)) = bounds.to_pixel_bounds() else {
            return Ok(());
        };
        let mut pixmap = raster::new_pixmap(width, height)?;
        let transform = Transform::from_translate(-x as f32, -y as f32);
        if let Some((raster, source)) = &existing {
            raster::draw_raster(&mut pixmap, source, raster, 1.0, transform);
        }
        paint(&mut pixmap, transform);

        let merged = if raster::is_blank(&pixmap) {
            None
        } else {
            Some(RasterImage::from_pixmap(&pixmap, x, y)?)
        };
        if merged.is_none() && existing.is_none() {
            return Ok(());
        }
        let before = self.store.set_raster(layer, merged.clone())?;
        match merged {
            Some(raster) => self.targets.mount(layer, raster, pixmap),
            None => self.targets.unmount(layer),
        }
        self.record(layer, label, before);
        Ok(())
    }

    /// Flatten a finished stamp session into the sketch layer's raster.
    fn flatten(&mut self, layer: LayerId, session: &StampSession) -> Result<()> {
        if !self.store.contains(layer) {
            log::debug!("Flatten target {} is gone, skipping", layer);
            return Ok(());
        }
        let label = match session.style().tool {
            BrushTool::Brush => "Sketch stroke",
            BrushTool::Eraser => "Sketch erase",
        };
        self.merge_into_layer(layer, session.paint_bounds(), label, |pixmap, transform| {
            for stamp in session.stamps() {
                raster::paint_stamp(pixmap, stamp, transform);
            }
        })?;
        log::debug!("Flattened {} stamps into {}", session.stamps().len(), layer);
        Ok(())
    }

    /// Decode a pasted image and put it on `layer` at `at`.
    fn place(&mut self, layer: LayerId, data_url: String, at: Point, metadata: Option<String>) -> Result<()> {
        let source = raster::decode_data_url(&data_url)?;
        let placed = RasterImage {
            data_url,
            x: at.x.round() as i32,
            y: at.y.round() as i32,
            width: source.width(),
            height: source.height(),
        };
        match layer.kind() {
            LayerKind::Raster if layer == LayerId::Base => {
                self.store.set_raster(layer, Some(placed.clone()))?;
                self.targets.mount(layer, placed, source);
            }
            LayerKind::Raster => {
                let bounds = placed.bounds();
                self.merge_into_layer(layer, bounds, "Paste image", |pixmap, transform| {
                    raster::draw_raster(pixmap, &source, &placed, 1.0, transform);
                })?;
            }
            LayerKind::Vector => {
                // Controlnet guide image, kept alongside the layer's strokes
                let before = self.store.set_raster(layer, Some(placed.clone()))?;
                self.targets.mount(layer, placed, source);
                self.record(layer, "Paste image", before);
            }
        }
        log::info!("Placed image on {}", layer);
        self.last_paste_metadata = metadata.clone();
        self.emit(EditorEvent::ImagePasted { layer, metadata });
        Ok(())
    }

    // ========================================================================
    // Selection
    // ========================================================================

    fn selection_changed(&mut self) {
        let selection = self.selection.get();
        self.channel.broadcast(&selection);
        self.emit(EditorEvent::SelectionChanged(selection));
    }

    pub fn set_selection(&mut self, x: f32, y: f32, width: f32, height: f32) {
        if self.selection.set(x, y, width, height) {
            self.selection_changed();
        }
    }

    pub fn move_selection(&mut self, delta: Point) {
        if self.selection.move_by(delta) {
            self.selection_changed();
        }
    }

    pub fn resize_selection(&mut self, corner: Corner, to: Point) {
        if self.selection.resize(corner, to) {
            self.selection_changed();
        }
    }

    /// Apply selection boxes received from other viewers. Not re-broadcast.
    pub fn poll_selection(&mut self) -> usize {
        let mut applied = 0;
        while let Some(remote) = self.channel.poll() {
            if self.selection.apply_remote(remote) {
                applied += 1;
                let selection = self.selection.get();
                self.emit(EditorEvent::SelectionChanged(selection));
            }
        }
        applied
    }

    // ========================================================================
    // Rendering and export
    // ========================================================================

    /// A composite request for the current selection and mask setting.
    pub fn generate_request(&self) -> CompositeRequest {
        CompositeRequest {
            invert_mask: self.config.invert_mask,
            ..CompositeRequest::new(self.selection.get())
        }
    }

    /// Flatten the selection into generation inputs. Rejected while work is pending.
    pub fn composite(&mut self, request: &CompositeRequest) -> Result<CompositeOutput> {
        self.ensure_idle()?;
        compositor::composite(&mut self.store, &mut self.viewport, &self.targets, request)
    }

    /// Render the stage at the current viewport, including the live stroke.
    pub fn render_stage(&self) -> Result<Pixmap> {
        let preview = StagePreview {
            stroke: self.accumulator.preview().map(|(_, stroke)| stroke),
            stamps: self.accumulator.preview_stamps(),
        };
        compositor::render_stage(&self.store, &self.targets, &self.viewport, preview)
    }
}

/// Layer addressed by a `canvas/<layer>` topic.
fn layer_for_topic(topic: &str) -> Result<LayerId> {
    topic
        .strip_prefix(TOPIC_PREFIX)
        .ok_or_else(|| CanvasError::InvalidLayerId(topic.to_string()))?
        .parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{alpha_at, encode_data_url, new_pixmap};
    use tiny_skia::Color;

    fn solid_png(width: u32, height: u32) -> String {
        let mut pixmap = new_pixmap(width, height).expect("pixmap");
        pixmap.fill(Color::from_rgba8(0, 0, 255, 255));
        encode_data_url(&pixmap).expect("encode")
    }

    fn new_editor() -> Editor {
        Editor::new(EditorConfig::default())
    }

    fn drag(editor: &mut Editor, points: &[(f32, f32)]) {
        editor
            .pointer_down(Point::new(points[0].0, points[0].1), PointerButton::Primary)
            .expect("down");
        for (x, y) in &points[1..] {
            editor.pointer_move(Point::new(*x, *y));
        }
        editor.pointer_up().expect("up");
    }

    #[test]
    fn test_layer_for_topic() {
        assert_eq!(layer_for_topic("canvas/sketch:2").expect("topic"), LayerId::Sketch(2));
        assert!(layer_for_topic("other/mask").is_err());
    }

    #[test]
    fn test_mask_stroke_commit_undo_redo() {
        let mut editor = new_editor();
        drag(&mut editor, &[(10.0, 10.0), (50.0, 10.0)]);
        assert_eq!(editor.store().get_lines(LayerId::Mask).expect("lines").len(), 1);
        assert_eq!(editor.undo_label(), Some("Brush stroke"));

        assert!(editor.undo().expect("undo"));
        assert!(editor.store().get_lines(LayerId::Mask).expect("lines").is_empty());
        assert!(editor.can_redo());

        assert!(editor.redo().expect("redo"));
        assert_eq!(editor.store().get_lines(LayerId::Mask).expect("lines").len(), 1);
        assert!(!editor.undo_topic("canvas/regionMask:9").expect("stale topic"));
    }

    #[test]
    fn test_points_are_logical() {
        let mut editor = new_editor();
        editor.zoom(ZoomDirection::In, ZoomOrigin::CanvasCenter, Some(200.0));
        let screen = Point::new(300.0, 200.0);
        let expected = editor.viewport().to_logical(screen);
        drag(&mut editor, &[(300.0, 200.0)]);
        let lines = editor.store().get_lines(LayerId::Mask).expect("lines");
        assert_eq!(lines[0].points, vec![expected, expected]);
    }

    #[test]
    fn test_base_layer_ignores_drawing() {
        let mut editor = new_editor();
        editor.set_active_layer(LayerId::Base).expect("activate");
        drag(&mut editor, &[(1.0, 1.0), (30.0, 30.0)]);
        assert!(!editor.can_undo());
        assert!(!editor.has_pending_work());
    }

    #[test]
    fn test_sketch_flatten_is_deferred_and_blocks() {
        let mut editor = new_editor();
        let sketch = editor.add_sketch_layer("Sketch");
        editor.set_active_layer(sketch).expect("activate");
        drag(&mut editor, &[(20.0, 20.0), (60.0, 20.0)]);

        assert!(editor.is_busy(sketch));
        assert!(matches!(
            editor.pointer_down(Point::new(5.0, 5.0), PointerButton::Primary),
            Err(CanvasError::Busy(_))
        ));
        assert!(matches!(editor.undo(), Err(CanvasError::Busy(_))));

        assert_eq!(editor.process_pending().expect("flatten"), 1);
        assert!(!editor.is_busy(sketch));
        let raster = editor.store().get_raster(sketch).expect("raster").expect("content").clone();
        assert_eq!((raster.x, raster.y), (0, 0));
        assert_eq!((raster.width, raster.height), (80, 40));
        assert!(editor.can_undo_layer(sketch));

        assert!(editor.undo().expect("undo"));
        assert!(editor.store().get_raster(sketch).expect("raster").is_none());
        assert!(editor.redo().expect("redo"));
        assert_eq!(editor.process_pending().expect("mount"), 1);
        assert_eq!(editor.store().get_raster(sketch).expect("raster"), Some(&raster));
    }

    #[test]
    fn test_clear_records_only_when_not_empty() {
        let mut editor = new_editor();
        editor.clear_layer(LayerId::Mask).expect("clear");
        assert!(!editor.can_undo());

        drag(&mut editor, &[(10.0, 10.0)]);
        editor.clear_layer(LayerId::Mask).expect("clear");
        assert_eq!(editor.history().undo_depth("canvas/mask"), 2);
        assert_eq!(editor.undo_label(), Some("Clear layer"));
    }

    #[test]
    fn test_remove_layer_discards_history() {
        let mut editor = new_editor();
        let region = editor.add_region_layer("Sky", RegionParams::default());
        editor.set_active_layer(region).expect("activate");
        drag(&mut editor, &[(10.0, 10.0)]);
        assert!(editor.can_undo());

        editor.remove_layer(region).expect("remove");
        assert!(!editor.can_undo());
        assert_eq!(editor.active_layer(), LayerId::Mask);
    }

    #[test]
    fn test_paste_onto_sketch_merges_and_records() {
        let mut editor = new_editor();
        let sketch = editor.add_sketch_layer("Sketch");
        editor.set_active_layer(sketch).expect("activate");
        editor
            .paste_image(solid_png(16, 16), Point::new(100.0, 40.0), Some("steps: 20".to_string()))
            .expect("paste");
        editor.process_pending().expect("place");

        let raster = editor.store().get_raster(sketch).expect("raster").expect("content");
        assert_eq!((raster.x, raster.y, raster.width, raster.height), (100, 40, 16, 16));
        assert_eq!(editor.last_paste_metadata(), Some("steps: 20"));
        assert_eq!(editor.undo_label(), Some("Paste image"));
        assert!(editor
            .drain_events()
            .iter()
            .any(|e| matches!(e, EditorEvent::ImagePasted { layer, .. } if *layer == sketch)));
    }

    #[test]
    fn test_paste_rejected_on_mask() {
        let mut editor = new_editor();
        assert!(matches!(
            editor.paste_image(solid_png(8, 8), Point::ZERO, None),
            Err(CanvasError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_malformed_paste_is_reported_and_releases_layer() {
        let mut editor = new_editor();
        let sketch = editor.add_sketch_layer("Sketch");
        editor.set_active_layer(sketch).expect("activate");
        editor
            .paste_image("data:image/png;base64,AAAA", Point::ZERO, None)
            .expect("queued");
        assert!(matches!(editor.process_pending(), Err(CanvasError::Decode(_))));
        assert!(!editor.is_busy(sketch));
        assert!(!editor.can_undo());
    }

    #[test]
    fn test_base_image_has_no_history() {
        let mut editor = new_editor();
        editor.set_base_image(solid_png(64, 32)).expect("queued");
        editor.process_pending().expect("place");
        assert!(!editor.can_undo());
        let stage = editor.render_stage().expect("render");
        assert_eq!(alpha_at(&stage, 10, 10), 255);
    }

    #[test]
    fn test_keyboard_shortcuts() {
        let mut editor = new_editor();
        let size = editor.brush().size;
        editor.key_down(KeyCode::BracketRight, Modifiers::NONE).expect("key");
        assert_eq!(editor.brush().size, size + BRUSH_SIZE_STEP);
        editor.key_down(KeyCode::E, Modifiers::NONE).expect("key");
        assert_eq!(editor.brush().tool, BrushTool::Eraser);

        drag(&mut editor, &[(10.0, 10.0)]);
        assert!(editor.key_down(KeyCode::Z, Modifiers::CTRL).expect("undo"));
        assert!(!editor.can_undo());
        editor.key_down(KeyCode::Z, Modifiers::CTRL_SHIFT).expect("redo");
        assert!(editor.can_undo());
        assert!(!editor.key_down(KeyCode::R, Modifiers::NONE).expect("unbound"));
    }

    #[test]
    fn test_space_pan_does_not_draw() {
        let mut editor = new_editor();
        editor.key_down(KeyCode::Space, Modifiers::NONE).expect("key");
        drag(&mut editor, &[(100.0, 100.0), (130.0, 90.0)]);
        editor.key_up(KeyCode::Space);

        assert_eq!(editor.viewport().position, Point::new(30.0, -10.0));
        assert!(!editor.can_undo());
    }

    #[test]
    fn test_selection_broadcast_and_remote() {
        let mut editor = new_editor();
        editor.set_selection(100.0, 50.0, 512.0, 512.0);
        assert_eq!(editor.channel().sent().len(), 1);

        editor.channel_mut().deliver(SelectionBox {
            x: 8,
            y: 8,
            width: 64,
            height: 64,
        });
        assert_eq!(editor.poll_selection(), 1);
        assert_eq!(editor.selection().x, 8);
        assert_eq!(editor.channel().sent().len(), 1);
    }
}
