//! Compositing and export of generation inputs.
//!
//! [`composite`] flattens the relevant layer subset over the selection box
//! into PNG data URLs: the init image, the inpainting mask, one guide image
//! (and mask) per enabled controlnet that overrides the base layer, and one
//! mask per enabled region.
//!
//! Exports are taken at 1:1 scale regardless of zoom. Layer visibility is
//! toggled while isolating each output and put back by a drop guard, so the
//! editor never stays in a hidden-layer state, even when an encode fails
//! halfway through. Compositing never touches history.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tiny_skia::{Pixmap, Transform};

use crate::error::Result;
use crate::geometry::{Point, SelectionBox};
use crate::layer::{LayerId, LayerKind};
use crate::raster::{
    decode_data_url, draw_raster, encode_data_url, invert_coverage, new_pixmap, paint_stamp,
    paint_stroke, tint,
};
use crate::stamper::StampSession;
use crate::store::{Layer, LayerStore};
use crate::stroke::{BrushStroke, Rgba};
use crate::targets::RenderTargets;
use crate::viewport::Viewport;

/// Which outputs to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSet {
    #[serde(default = "yes")]
    pub init: bool,
    #[serde(default = "yes")]
    pub mask: bool,
    #[serde(default = "yes")]
    pub controlnets: bool,
    #[serde(default = "yes")]
    pub region_masks: bool,
}

fn yes() -> bool {
    true
}

impl Default for ExportSet {
    fn default() -> Self {
        Self {
            init: true,
            mask: true,
            controlnets: true,
            region_masks: true,
        }
    }
}

/// Parameters of one export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeRequest {
    pub selection: SelectionBox,
    /// Visibility overrides applied for the duration of the export only
    #[serde(default)]
    pub visibility: HashMap<LayerId, bool>,
    #[serde(default)]
    pub include: ExportSet,
    #[serde(default)]
    pub invert_mask: bool,
}

impl CompositeRequest {
    pub fn new(selection: SelectionBox) -> Self {
        Self {
            selection,
            visibility: HashMap::new(),
            include: ExportSet::default(),
            invert_mask: false,
        }
    }
}

/// Output slot of one enabled controlnet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlnetExport {
    pub layer: LayerId,
    /// Guide image; only when the unit overrides the base layer
    pub image: Option<String>,
    /// Painted controlnet mask, if any strokes exist
    pub mask: Option<String>,
}

/// Output slot of one enabled region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionExport {
    pub layer: LayerId,
    pub mask: Option<String>,
}

/// Everything produced by one [`composite`] call, as PNG data URLs.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CompositeOutput {
    pub init: Option<String>,
    /// Absent when the mask is empty and not inverted
    pub mask: Option<String>,
    pub controlnets: Vec<ControlnetExport>,
    pub regions: Vec<RegionExport>,
}

/// Restores viewport and visibility flags when dropped.
struct CompositeGuard<'a> {
    store: &'a mut LayerStore,
    viewport: &'a mut Viewport,
    saved_flags: Vec<(LayerId, bool)>,
    saved_scale: f32,
    saved_position: Point,
}

impl<'a> CompositeGuard<'a> {
    fn new(store: &'a mut LayerStore, viewport: &'a mut Viewport) -> Self {
        let saved_flags = store.visibility_flags();
        let saved_scale = viewport.scale;
        let saved_position = viewport.position;
        viewport.scale = 1.0;
        viewport.position = Point::ZERO;
        Self {
            store,
            viewport,
            saved_flags,
            saved_scale,
            saved_position,
        }
    }

    /// Run `f` with visibility decided by `visible`, then put the flags back.
    ///
    /// The toggle, render and restore happen as one synchronous unit.
    fn isolated<T>(
        &mut self,
        visible: impl Fn(&Layer) -> bool,
        f: impl FnOnce(&LayerStore) -> T,
    ) -> T {
        let before = self.store.visibility_flags();
        for (id, _) in &before {
            let show = self.store.get(*id).map(&visible).unwrap_or(false);
            self.store.set_visible_silent(*id, show);
        }
        let result = f(&*self.store);
        for (id, flag) in before {
            self.store.set_visible_silent(id, flag);
        }
        result
    }
}

impl Drop for CompositeGuard<'_> {
    fn drop(&mut self) {
        for (id, flag) in &self.saved_flags {
            self.store.set_visible_silent(*id, *flag);
        }
        self.viewport.scale = self.saved_scale;
        self.viewport.position = self.saved_position;
    }
}

/// Transform from logical space into an export of `selection` at the
/// viewport's (forced) scale.
fn export_transform(viewport: &Viewport, selection: &SelectionBox) -> Transform {
    let s = viewport.scale;
    Transform::from_row(
        s,
        0.0,
        0.0,
        s,
        viewport.position.x - selection.x as f32 * s,
        viewport.position.y - selection.y as f32 * s,
    )
}

/// Draw one layer's content. Undecoded rasters are skipped.
fn draw_layer(pixmap: &mut Pixmap, layer: &Layer, targets: &RenderTargets, transform: Transform) {
    if let Some(raster) = &layer.raster {
        match targets.get(layer.id, raster) {
            Some(target) => draw_raster(pixmap, &target.pixmap, raster, layer.opacity, transform),
            None => log::debug!("No render target for {}, skipping", layer.id),
        }
    }
    if layer.id.kind() == LayerKind::Vector {
        for stroke in &layer.strokes {
            paint_stroke(pixmap, stroke, transform);
        }
    }
}

/// Render every visible layer bottom to top.
fn render_visible(
    store: &LayerStore,
    targets: &RenderTargets,
    pixmap: &mut Pixmap,
    transform: Transform,
) {
    for layer in store.ordered().into_iter().filter(|l| l.visible) {
        draw_layer(pixmap, layer, targets, transform);
    }
}

/// Render strokes as a white coverage mask.
fn render_mask(
    strokes: &[BrushStroke],
    selection: &SelectionBox,
    transform: Transform,
    invert: bool,
) -> Result<Option<Pixmap>> {
    if strokes.is_empty() && !invert {
        return Ok(None);
    }
    let mut pixmap = new_pixmap(selection.width, selection.height)?;
    for stroke in strokes {
        paint_stroke(&mut pixmap, stroke, transform);
    }
    // Only coverage matters; stroke colors do not leak into the mask.
    tint(&mut pixmap, Rgba::WHITE);
    if invert {
        invert_coverage(&mut pixmap, Rgba::WHITE);
    }
    Ok(Some(pixmap))
}

fn encode_mask(
    strokes: &[BrushStroke],
    selection: &SelectionBox,
    transform: Transform,
    invert: bool,
) -> Result<Option<String>> {
    render_mask(strokes, selection, transform, invert)?
        .map(|pixmap| encode_data_url(&pixmap))
        .transpose()
}

/// Flatten the selection into generation inputs.
///
/// Read-only with respect to layer content and history. Viewport and
/// visibility flags are bit-identical before and after the call, whatever
/// the outcome.
pub fn composite(
    store: &mut LayerStore,
    viewport: &mut Viewport,
    targets: &RenderTargets,
    request: &CompositeRequest,
) -> Result<CompositeOutput> {
    let selection = request.selection;
    let mut guard = CompositeGuard::new(store, viewport);
    for (id, visible) in &request.visibility {
        guard.store.set_visible_silent(*id, *visible);
    }
    let transform = export_transform(guard.viewport, &selection);
    let mut output = CompositeOutput::default();

    if request.include.mask {
        let strokes = guard.store.get_lines(LayerId::Mask)?;
        output.mask = encode_mask(strokes, &selection, transform, request.invert_mask)?;
    }

    if request.include.init {
        let pixmap = guard.isolated(
            |layer| layer.visible && !layer.id.is_decoration(),
            |store| -> Result<Pixmap> {
                let mut pixmap = new_pixmap(selection.width, selection.height)?;
                render_visible(store, targets, &mut pixmap, transform);
                Ok(pixmap)
            },
        )?;
        output.init = Some(encode_data_url(&pixmap)?);
    }

    if request.include.controlnets {
        for id in guard.store.controlnet_layers() {
            let layer = guard.store.get(id)?;
            if !layer.enabled {
                continue;
            }
            let overrides = layer
                .controlnet_params()
                .is_some_and(|params| params.override_base_layer);

            let image = if overrides {
                let pixmap = guard.isolated(
                    |l| l.id == id,
                    |store| -> Result<Pixmap> {
                        let mut pixmap = new_pixmap(selection.width, selection.height)?;
                        render_visible(store, targets, &mut pixmap, transform);
                        Ok(pixmap)
                    },
                )?;
                Some(encode_data_url(&pixmap)?)
            } else {
                None
            };

            let mask = match id.controlnet_group() {
                Some(n) => {
                    let strokes = guard.store.get_lines(LayerId::ControlnetMask(n))?;
                    encode_mask(strokes, &selection, transform, false)?
                }
                None => None,
            };
            output.controlnets.push(ControlnetExport {
                layer: id,
                image,
                mask,
            });
        }
    }

    if request.include.region_masks {
        for id in guard.store.region_layers() {
            let layer = guard.store.get(id)?;
            if !layer.enabled {
                continue;
            }
            let mask = encode_mask(&layer.strokes, &selection, transform, false)?;
            output.regions.push(RegionExport { layer: id, mask });
        }
    }

    drop(guard);
    log::info!(
        "Composited {}x{} at ({}, {}): {} controlnet slot(s), {} region(s)",
        selection.width,
        selection.height,
        selection.x,
        selection.y,
        output.controlnets.len(),
        output.regions.len()
    );
    Ok(output)
}

/// Live-drawing state shown on top of the committed layers.
#[derive(Debug, Clone, Copy, Default)]
pub struct StagePreview<'a> {
    pub stroke: Option<&'a BrushStroke>,
    pub stamps: Option<&'a StampSession>,
}

/// Render the stage as the user sees it: visible layers at the current
/// viewport transform, with the stroke being drawn on top.
pub fn render_stage(
    store: &LayerStore,
    targets: &RenderTargets,
    viewport: &Viewport,
    preview: StagePreview<'_>,
) -> Result<Pixmap> {
    let (width, height) = viewport.stage_size;
    let mut pixmap = new_pixmap(width.ceil() as u32, height.ceil() as u32)?;
    let transform = Transform::from_row(
        viewport.scale,
        0.0,
        0.0,
        viewport.scale,
        viewport.position.x,
        viewport.position.y,
    );
    render_visible(store, targets, &mut pixmap, transform);

    if let Some(session) = preview.stamps {
        for stamp in session.stamps() {
            paint_stamp(&mut pixmap, stamp, transform);
        }
    } else if let Some(stroke) = preview.stroke {
        paint_stroke(&mut pixmap, stroke, transform);
    }
    Ok(pixmap)
}

/// Decode a composite output slot back into pixels.
pub fn decode_output(data_url: &str) -> Result<Pixmap> {
    decode_data_url(data_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{ControlnetParams, LayerParams};
    use crate::raster::{alpha_at, is_blank, RasterImage};
    use crate::stroke::BrushStyle;
    use tiny_skia::Color;

    fn stroke(points: &[(f32, f32)], size: f32) -> BrushStroke {
        let style = BrushStyle {
            size,
            ..BrushStyle::default()
        };
        let mut s = BrushStroke::new(Point::new(points[0].0, points[0].1), &style);
        s.points
            .extend(points[1..].iter().map(|(x, y)| Point::new(*x, *y)));
        s.finalize();
        s
    }

    fn selection(x: i32, y: i32, size: u32) -> SelectionBox {
        SelectionBox {
            x,
            y,
            width: size,
            height: size,
        }
    }

    fn mount_solid(store: &mut LayerStore, targets: &mut RenderTargets, id: LayerId, rect: (i32, i32, u32, u32)) {
        let mut pixmap = new_pixmap(rect.2, rect.3).expect("pixmap");
        pixmap.fill(Color::from_rgba8(200, 10, 10, 255));
        let raster = RasterImage::from_pixmap(&pixmap, rect.0, rect.1).expect("encode");
        store.set_raster(id, Some(raster.clone())).expect("set raster");
        targets.mount(id, raster, pixmap);
    }

    #[test]
    fn test_empty_mask_is_absent_unless_inverted() {
        let mut store = LayerStore::new();
        let mut viewport = Viewport::default();
        let targets = RenderTargets::new();
        let mut request = CompositeRequest::new(selection(0, 0, 64));

        let out = composite(&mut store, &mut viewport, &targets, &request).expect("composite");
        assert!(out.mask.is_none());

        request.invert_mask = true;
        let out = composite(&mut store, &mut viewport, &targets, &request).expect("composite");
        let mask = decode_output(out.mask.as_deref().expect("mask")).expect("decode");
        assert_eq!(alpha_at(&mask, 10, 10), 255);
    }

    #[test]
    fn test_mask_is_anchored_at_selection() {
        let mut store = LayerStore::new();
        store
            .push_line(LayerId::Mask, stroke(&[(40.0, 40.0), (60.0, 40.0)], 8.0))
            .expect("push");
        let mut viewport = Viewport::default();
        let targets = RenderTargets::new();
        let request = CompositeRequest::new(selection(32, 32, 64));

        let out = composite(&mut store, &mut viewport, &targets, &request).expect("composite");
        let mask = decode_output(out.mask.as_deref().expect("mask")).expect("decode");
        assert_eq!(mask.width(), 64);
        assert_eq!(alpha_at(&mask, 18, 8), 255);
        assert_eq!(alpha_at(&mask, 18, 30), 0);
        let px = mask.pixel(18, 8).expect("pixel").demultiply();
        assert_eq!((px.red(), px.green(), px.blue()), (255, 255, 255));
    }

    #[test]
    fn test_init_excludes_decorations_and_restores_state() {
        let mut store = LayerStore::new();
        let mut targets = RenderTargets::new();
        mount_solid(&mut store, &mut targets, LayerId::Base, (0, 0, 32, 32));
        store
            .push_line(LayerId::Mask, stroke(&[(40.0, 40.0), (60.0, 40.0)], 8.0))
            .expect("push");
        let cn = store.add_controlnet("Canny", ControlnetParams::default());
        store
            .push_line(cn, stroke(&[(40.0, 50.0), (60.0, 50.0)], 8.0))
            .expect("push");

        let mut viewport = Viewport::default();
        viewport.scale = 2.5;
        viewport.position = Point::new(-13.0, 7.0);
        store.set_visible(LayerId::Mask, false).expect("flags");
        let flags = store.visibility_flags();

        let request = CompositeRequest::new(selection(0, 0, 64));
        let out = composite(&mut store, &mut viewport, &targets, &request).expect("composite");
        let init = decode_output(out.init.as_deref().expect("init")).expect("decode");
        assert_eq!(alpha_at(&init, 10, 10), 255);
        assert_eq!(alpha_at(&init, 50, 40), 0);
        assert_eq!(alpha_at(&init, 50, 50), 0);

        assert_eq!(viewport.scale, 2.5);
        assert_eq!(viewport.position, Point::new(-13.0, 7.0));
        assert_eq!(store.visibility_flags(), flags);
    }

    #[test]
    fn test_missing_render_target_is_skipped() {
        let mut store = LayerStore::new();
        let sketch = store.add_sketch("Sketch");
        store
            .set_raster(
                sketch,
                Some(RasterImage {
                    data_url: "data:image/png;base64,".to_string(),
                    x: 0,
                    y: 0,
                    width: 16,
                    height: 16,
                }),
            )
            .expect("set raster");
        let mut viewport = Viewport::default();
        let targets = RenderTargets::new();
        let out = composite(
            &mut store,
            &mut viewport,
            &targets,
            &CompositeRequest::new(selection(0, 0, 16)),
        )
        .expect("composite");
        let init = decode_output(out.init.as_deref().expect("init")).expect("decode");
        assert!(is_blank(&init));
    }

    #[test]
    fn test_disabled_region_is_not_exported() {
        let mut store = LayerStore::new();
        let a = store.add_region("A", Default::default());
        let b = store.add_region("B", Default::default());
        store
            .push_line(a, stroke(&[(4.0, 4.0)], 4.0))
            .expect("push");
        store.set_enabled(b, false).expect("flags");

        let mut viewport = Viewport::default();
        let out = composite(
            &mut store,
            &mut viewport,
            &RenderTargets::new(),
            &CompositeRequest::new(selection(0, 0, 16)),
        )
        .expect("composite");
        assert_eq!(out.regions.len(), 1);
        assert_eq!(out.regions[0].layer, a);
        assert!(out.regions[0].mask.is_some());
    }

    #[test]
    fn test_visibility_override_is_scoped() {
        let mut store = LayerStore::new();
        let mut targets = RenderTargets::new();
        let sketch = store.add_sketch("Sketch");
        mount_solid(&mut store, &mut targets, sketch, (0, 0, 16, 16));

        let mut request = CompositeRequest::new(selection(0, 0, 16));
        request.visibility.insert(sketch, false);
        let mut viewport = Viewport::default();
        let out = composite(&mut store, &mut viewport, &targets, &request).expect("composite");
        let init = decode_output(out.init.as_deref().expect("init")).expect("decode");
        assert!(is_blank(&init));
        assert!(store.get(sketch).expect("layer").visible);
    }

    #[test]
    fn test_controlnet_slot_only_with_override() {
        let mut store = LayerStore::new();
        let a = store.add_controlnet("A", ControlnetParams::default());
        store
            .set_params(
                a,
                LayerParams::Controlnet(ControlnetParams {
                    override_base_layer: true,
                    ..ControlnetParams::default()
                }),
            )
            .expect("params");
        let b = store.add_controlnet("B", ControlnetParams::default());
        store.push_line(a, stroke(&[(2.0, 2.0), (10.0, 2.0)], 4.0)).expect("push");
        store.push_line(b, stroke(&[(2.0, 8.0), (10.0, 8.0)], 4.0)).expect("push");

        let mut viewport = Viewport::default();
        let out = composite(
            &mut store,
            &mut viewport,
            &RenderTargets::new(),
            &CompositeRequest::new(selection(0, 0, 16)),
        )
        .expect("composite");
        assert_eq!(out.controlnets.len(), 2);
        let guide = decode_output(out.controlnets[0].image.as_deref().expect("guide")).expect("decode");
        assert_eq!(alpha_at(&guide, 6, 2), 255);
        // B's strokes do not leak into A's guide
        assert_eq!(alpha_at(&guide, 6, 8), 0);
        assert!(out.controlnets[1].image.is_none());
    }
}
