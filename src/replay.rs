//! Headless session replay.
//!
//! A session script is a JSON document describing a canvas session: an
//! optional configuration and base image, then a list of user actions
//! (pointer strokes in screen coordinates, keys, zoom, layer commands,
//! selection edits). [`run_script`] plays it against an [`Editor`] and writes
//! every composite and stage snapshot as PNG files.
//!
//! Pending decode/encode work is resolved after every action, the way the
//! event loop would complete it between two input events.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compositor::CompositeOutput;
use crate::config::{ConfigError, EditorConfig};
use crate::editor::{Editor, PointerButton};
use crate::error::CanvasError;
use crate::geometry::Point;
use crate::keybindings::{KeyCode, Modifiers};
use crate::layer::{ControlnetParams, LayerId, LayerParams, RegionParams};
use crate::raster;
use crate::selection::Corner;
use crate::store::LayerMove;
use crate::stroke::BrushStyle;
use crate::viewport::{ZoomDirection, ZoomOrigin};

/// Errors that can occur while replaying a session.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Failed to read session script: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse session script: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// An action failed; carries its position in the script
    #[error("Action {index} failed: {source}")]
    Action {
        index: usize,
        #[source]
        source: CanvasError,
    },

    #[error(transparent)]
    Canvas(#[from] CanvasError),
}

/// One user action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    AddSketch {
        name: String,
    },
    AddControlnet {
        name: String,
        #[serde(default)]
        params: ControlnetParams,
    },
    AddRegion {
        name: String,
        #[serde(default)]
        params: RegionParams,
    },
    RemoveLayer {
        layer: LayerId,
    },
    SelectLayer {
        layer: LayerId,
    },
    MoveLayer {
        layer: LayerId,
        direction: LayerMove,
    },
    Visibility {
        layer: LayerId,
        visible: bool,
    },
    Enabled {
        layer: LayerId,
        enabled: bool,
    },
    Opacity {
        layer: LayerId,
        opacity: f32,
    },
    Params {
        layer: LayerId,
        params: LayerParams,
    },
    Brush {
        style: BrushStyle,
    },
    /// Pointer drag through screen points
    Stroke {
        points: Vec<Point>,
        #[serde(default)]
        button: PointerButton,
    },
    Key {
        key: KeyCode,
        #[serde(default)]
        modifiers: Modifiers,
    },
    Zoom {
        direction: ZoomDirection,
        #[serde(default = "canvas_center")]
        origin: ZoomOrigin,
        #[serde(default)]
        percent: Option<f32>,
    },
    Wheel {
        at: Point,
        delta_y: f32,
    },
    Pan {
        dx: f32,
        dy: f32,
    },
    ResetView,
    FitView,
    Selection {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    MoveSelection {
        dx: f32,
        dy: f32,
    },
    ResizeSelection {
        corner: Corner,
        to: Point,
    },
    /// Place an image file on the active layer at a logical position
    Paste {
        path: PathBuf,
        #[serde(default)]
        x: f32,
        #[serde(default)]
        y: f32,
        #[serde(default)]
        metadata: Option<String>,
    },
    Clear {
        layer: LayerId,
    },
    Undo,
    Redo,
    /// Export the current selection; files are prefixed with `name`
    Composite {
        name: String,
        #[serde(default)]
        invert_mask: Option<bool>,
    },
    /// Render the stage as displayed
    Snapshot {
        name: String,
    },
}

fn canvas_center() -> ZoomOrigin {
    ZoomOrigin::CanvasCenter
}

/// A complete session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionScript {
    #[serde(default)]
    pub config: Option<EditorConfig>,
    /// Stage size in screen pixels
    #[serde(default)]
    pub stage: Option<(f32, f32)>,
    /// Image file loaded as the base layer
    #[serde(default)]
    pub base_image: Option<PathBuf>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl SessionScript {
    pub fn from_json(json: &str) -> Result<Self, ReplayError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// What a replay produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaySummary {
    pub actions: usize,
    pub events: usize,
    pub files: Vec<PathBuf>,
}

/// Read an image file into a data URL.
fn load_image(path: &Path) -> Result<String, ReplayError> {
    let bytes = std::fs::read(path)?;
    Ok(raster::bytes_to_data_url(&bytes)?)
}

fn write_data_url(path: PathBuf, data_url: &str, files: &mut Vec<PathBuf>) -> Result<(), ReplayError> {
    std::fs::write(&path, raster::data_url_bytes(data_url)?)?;
    log::info!("Wrote {:?}", path);
    files.push(path);
    Ok(())
}

fn write_composite(
    output: &CompositeOutput,
    out_dir: &Path,
    name: &str,
    files: &mut Vec<PathBuf>,
) -> Result<(), ReplayError> {
    if let Some(init) = &output.init {
        write_data_url(out_dir.join(format!("{}_init.png", name)), init, files)?;
    }
    if let Some(mask) = &output.mask {
        write_data_url(out_dir.join(format!("{}_mask.png", name)), mask, files)?;
    }
    for (slot, cn) in output.controlnets.iter().enumerate() {
        if let Some(image) = &cn.image {
            write_data_url(out_dir.join(format!("{}_controlnet{}.png", name, slot)), image, files)?;
        }
        if let Some(mask) = &cn.mask {
            write_data_url(out_dir.join(format!("{}_controlnet{}_mask.png", name, slot)), mask, files)?;
        }
    }
    for (slot, region) in output.regions.iter().enumerate() {
        if let Some(mask) = &region.mask {
            write_data_url(out_dir.join(format!("{}_region{}.png", name, slot)), mask, files)?;
        }
    }
    Ok(())
}

/// Play one action against the editor.
fn apply(
    editor: &mut Editor,
    action: &Action,
    base_dir: &Path,
    out_dir: &Path,
    files: &mut Vec<PathBuf>,
) -> Result<(), ReplayError> {
    match action {
        Action::AddSketch { name } => {
            let id = editor.add_sketch_layer(name.clone());
            editor.set_active_layer(id)?;
        }
        Action::AddControlnet { name, params } => {
            let id = editor.add_controlnet_layer(name.clone(), params.clone());
            editor.set_active_layer(id)?;
        }
        Action::AddRegion { name, params } => {
            let id = editor.add_region_layer(name.clone(), params.clone());
            editor.set_active_layer(id)?;
        }
        Action::RemoveLayer { layer } => editor.remove_layer(*layer)?,
        Action::SelectLayer { layer } => editor.set_active_layer(*layer)?,
        Action::MoveLayer { layer, direction } => {
            editor.move_layer(*layer, *direction)?;
        }
        Action::Visibility { layer, visible } => editor.set_layer_visible(*layer, *visible)?,
        Action::Enabled { layer, enabled } => editor.set_layer_enabled(*layer, *enabled)?,
        Action::Opacity { layer, opacity } => editor.set_layer_opacity(*layer, *opacity)?,
        Action::Params { layer, params } => editor.set_layer_params(*layer, params.clone())?,
        Action::Brush { style } => editor.set_brush(*style),
        Action::Stroke { points, button } => {
            let Some((first, rest)) = points.split_first() else {
                return Ok(());
            };
            editor.pointer_down(*first, *button)?;
            for point in rest {
                editor.pointer_move(*point);
            }
            editor.pointer_up()?;
        }
        Action::Key { key, modifiers } => {
            editor.key_down(*key, *modifiers)?;
            editor.key_up(*key);
        }
        Action::Zoom {
            direction,
            origin,
            percent,
        } => editor.zoom(*direction, *origin, *percent),
        Action::Wheel { at, delta_y } => editor.wheel(*at, *delta_y),
        Action::Pan { dx, dy } => editor.pan_by(Point::new(*dx, *dy)),
        Action::ResetView => editor.reset_view(),
        Action::FitView => editor.fit_to_view(),
        Action::Selection {
            x,
            y,
            width,
            height,
        } => editor.set_selection(*x, *y, *width, *height),
        Action::MoveSelection { dx, dy } => editor.move_selection(Point::new(*dx, *dy)),
        Action::ResizeSelection { corner, to } => editor.resize_selection(*corner, *to),
        Action::Paste {
            path,
            x,
            y,
            metadata,
        } => {
            let data_url = load_image(&base_dir.join(path))?;
            editor.paste_image(data_url, Point::new(*x, *y), metadata.clone())?;
        }
        Action::Clear { layer } => editor.clear_layer(*layer)?,
        Action::Undo => {
            editor.undo()?;
        }
        Action::Redo => {
            editor.redo()?;
        }
        Action::Composite { name, invert_mask } => {
            let mut request = editor.generate_request();
            if let Some(invert) = invert_mask {
                request.invert_mask = *invert;
            }
            let output = editor.composite(&request)?;
            write_composite(&output, out_dir, name, files)?;
        }
        Action::Snapshot { name } => {
            let pixmap = editor.render_stage()?;
            let data_url = raster::encode_data_url(&pixmap)?;
            write_data_url(out_dir.join(format!("{}.png", name)), &data_url, files)?;
        }
    }
    Ok(())
}

/// Replay a session script. Image paths resolve against `base_dir`; outputs
/// go to `out_dir`, which is created if missing.
pub fn run_script(
    script: &SessionScript,
    config: EditorConfig,
    base_dir: &Path,
    out_dir: &Path,
) -> Result<ReplaySummary, ReplayError> {
    std::fs::create_dir_all(out_dir)?;
    let mut editor = Editor::new(script.config.clone().unwrap_or(config));
    if let Some((width, height)) = script.stage {
        editor.set_stage_size(width, height);
    }
    let mut summary = ReplaySummary::default();

    if let Some(path) = &script.base_image {
        editor.set_base_image(load_image(&base_dir.join(path))?)?;
        editor.process_pending()?;
        editor.fit_to_view();
    }

    for (index, action) in script.actions.iter().enumerate() {
        log::debug!("Replaying action {}: {:?}", index, action);
        let result = apply(&mut editor, action, base_dir, out_dir, &mut summary.files).and_then(|()| {
            editor.process_pending()?;
            Ok(())
        });
        match result {
            Ok(()) => {}
            Err(ReplayError::Canvas(source)) => return Err(ReplayError::Action { index, source }),
            Err(other) => return Err(other),
        }
        summary.actions += 1;
        summary.events += editor.drain_events().len();
    }
    log::info!(
        "Replayed {} action(s), {} event(s), wrote {} file(s)",
        summary.actions,
        summary.events,
        summary.files.len()
    );
    Ok(summary)
}
