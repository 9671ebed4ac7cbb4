//! Raster content: data-URL codec and the tiny-skia painting primitives.
//!
//! Raster layer content is persisted as a base64 PNG data URL plus its logical
//! placement. Decoding produces a premultiplied [`Pixmap`]; encoding goes the
//! other way through the `image` crate.

use std::io::Cursor;

use base64::{Engine as _, engine::general_purpose};
use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use tiny_skia::{
    BlendMode, Color, ColorU8, FillRule, FilterQuality, GradientStop, LineCap, LineJoin, Paint,
    PathBuilder, Pixmap, PixmapPaint, RadialGradient, SpreadMode, Stroke, Transform,
};

use crate::error::{CanvasError, Result};
use crate::geometry::{LogicalRect, Point};
use crate::stamper::Stamp;
use crate::stroke::{BrushStroke, BrushTool, Rgba};

const DATA_URL_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// A flattened bitmap placed in logical space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterImage {
    /// `data:image/png;base64,...`
    pub data_url: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl RasterImage {
    pub fn bounds(&self) -> LogicalRect {
        LogicalRect::from_xywh(
            self.x as f32,
            self.y as f32,
            self.width as f32,
            self.height as f32,
        )
    }

    /// Encode a pixmap and place it at `(x, y)`.
    pub fn from_pixmap(pixmap: &Pixmap, x: i32, y: i32) -> Result<Self> {
        Ok(Self {
            data_url: encode_data_url(pixmap)?,
            x,
            y,
            width: pixmap.width(),
            height: pixmap.height(),
        })
    }
}

/// Allocate a transparent pixmap.
pub fn new_pixmap(width: u32, height: u32) -> Result<Pixmap> {
    Pixmap::new(width, height).ok_or(CanvasError::Allocation { width, height })
}

/// Extract the raw bytes of a base64 data URL.
pub fn data_url_bytes(data_url: &str) -> Result<Vec<u8>> {
    let rest = data_url
        .strip_prefix(DATA_URL_PREFIX)
        .ok_or_else(|| CanvasError::malformed("missing 'data:' prefix"))?;
    let marker = rest
        .find(BASE64_MARKER)
        .ok_or_else(|| CanvasError::malformed("payload is not base64"))?;
    let mime = &rest[..marker];
    if !mime.starts_with("image/") {
        return Err(CanvasError::malformed(format!("unsupported media type '{}'", mime)));
    }
    let payload = rest[marker + BASE64_MARKER.len()..].trim();
    Ok(general_purpose::STANDARD.decode(payload)?)
}

/// Wrap encoded image bytes (PNG, JPEG, ...) in a data URL of the sniffed type.
pub fn bytes_to_data_url(bytes: &[u8]) -> Result<String> {
    let format = image::guess_format(bytes).map_err(CanvasError::Decode)?;
    Ok(format!(
        "data:{};base64,{}",
        format.to_mime_type(),
        general_purpose::STANDARD.encode(bytes)
    ))
}

/// Decode image bytes (PNG, JPEG, ...) into a premultiplied pixmap.
pub fn decode_image(bytes: &[u8]) -> Result<Pixmap> {
    let img = image::load_from_memory(bytes)
        .map_err(CanvasError::Decode)?
        .to_rgba8();
    rgba_to_pixmap(&img)
}

/// Decode a data URL into a premultiplied pixmap.
pub fn decode_data_url(data_url: &str) -> Result<Pixmap> {
    decode_image(&data_url_bytes(data_url)?)
}

/// Encode a pixmap as a PNG data URL.
pub fn encode_data_url(pixmap: &Pixmap) -> Result<String> {
    let img = pixmap_to_rgba(pixmap);
    let mut bytes: Vec<u8> = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(CanvasError::Encode)?;
    Ok(format!(
        "data:image/png;base64,{}",
        general_purpose::STANDARD.encode(&bytes)
    ))
}

/// Straight-alpha copy of a pixmap.
pub fn pixmap_to_rgba(pixmap: &Pixmap) -> RgbaImage {
    let mut img = RgbaImage::new(pixmap.width(), pixmap.height());
    for (dst, src) in img.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        *dst = image::Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    img
}

/// Premultiplied copy of a straight-alpha image.
pub fn rgba_to_pixmap(img: &RgbaImage) -> Result<Pixmap> {
    let mut pixmap = new_pixmap(img.width(), img.height())?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(img.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Ok(pixmap)
}

/// True when every pixel is fully transparent.
pub fn is_blank(pixmap: &Pixmap) -> bool {
    pixmap.pixels().iter().all(|p| p.alpha() == 0)
}

/// Alpha of the pixel at `(x, y)`, 0 outside the pixmap.
pub fn alpha_at(pixmap: &Pixmap, x: u32, y: u32) -> u8 {
    pixmap.pixel(x, y).map(|p| p.alpha()).unwrap_or(0)
}

fn solid_paint(color: Rgba, tool: BrushTool) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, color.a);
    paint.anti_alias = true;
    if tool == BrushTool::Eraser {
        paint.blend_mode = BlendMode::DestinationOut;
    }
    paint
}

fn fill_circle(pixmap: &mut Pixmap, center: Point, radius: f32, paint: &Paint<'_>, transform: Transform) {
    if let Some(path) = PathBuilder::from_circle(center.x, center.y, radius) {
        pixmap.fill_path(&path, paint, FillRule::Winding, transform, None);
    }
}

/// Render a vector stroke as a round-capped polyline.
pub fn paint_stroke(pixmap: &mut Pixmap, stroke: &BrushStroke, transform: Transform) {
    let Some(first) = stroke.points.first() else {
        return;
    };
    let paint = solid_paint(stroke.color, stroke.tool);
    let radius = stroke.size / 2.0;

    // A tap has no length to stroke; its round caps form a dot.
    if stroke.points.iter().all(|p| p.distance_to(first) < f32::EPSILON) {
        fill_circle(pixmap, *first, radius, &paint, transform);
        return;
    }

    let mut pb = PathBuilder::new();
    pb.move_to(first.x, first.y);
    for p in &stroke.points[1..] {
        pb.line_to(p.x, p.y);
    }
    let Some(path) = pb.finish() else {
        return;
    };
    let style = Stroke {
        width: stroke.size,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Stroke::default()
    };
    pixmap.stroke_path(&path, &paint, &style, transform, None);
}

/// Render one stamp: opaque to `hardness * radius`, fading out at `radius`.
pub fn paint_stamp(pixmap: &mut Pixmap, stamp: &Stamp, transform: Transform) {
    let mut paint = solid_paint(stamp.color, stamp.tool);
    if stamp.hardness < 1.0 {
        let Rgba { r, g, b, a } = stamp.color;
        let center = tiny_skia::Point::from_xy(stamp.center.x, stamp.center.y);
        let stops = vec![
            GradientStop::new(0.0, Color::from_rgba8(r, g, b, a)),
            GradientStop::new(stamp.hardness, Color::from_rgba8(r, g, b, a)),
            GradientStop::new(1.0, Color::from_rgba8(r, g, b, 0)),
        ];
        if let Some(shader) = RadialGradient::new(
            center,
            center,
            stamp.radius,
            stops,
            SpreadMode::Pad,
            Transform::identity(),
        ) {
            paint.shader = shader;
        }
    }
    fill_circle(pixmap, stamp.center, stamp.radius, &paint, transform);
}

/// Draw a decoded raster at its logical placement, without smoothing.
pub fn draw_raster(
    pixmap: &mut Pixmap,
    source: &Pixmap,
    placement: &RasterImage,
    opacity: f32,
    transform: Transform,
) {
    if source.width() == 0 || source.height() == 0 {
        return;
    }
    let sx = placement.width as f32 / source.width() as f32;
    let sy = placement.height as f32 / source.height() as f32;
    let transform = transform
        .pre_translate(placement.x as f32, placement.y as f32)
        .pre_scale(sx, sy);
    let paint = PixmapPaint {
        opacity: opacity.clamp(0.0, 1.0),
        blend_mode: BlendMode::SourceOver,
        quality: FilterQuality::Nearest,
    };
    pixmap.draw_pixmap(0, 0, source.as_ref(), &paint, transform, None);
}

/// Replace every painted pixel with `color`, keeping coverage as alpha.
pub fn tint(pixmap: &mut Pixmap, color: Rgba) {
    for px in pixmap.pixels_mut() {
        let coverage = px.alpha() as u16 * color.a as u16 / 255;
        *px = ColorU8::from_rgba(color.r, color.g, color.b, coverage as u8).premultiply();
    }
}

/// Swap painted and unpainted areas: coverage becomes `255 - coverage`.
pub fn invert_coverage(pixmap: &mut Pixmap, color: Rgba) {
    for px in pixmap.pixels_mut() {
        let coverage = 255 - px.alpha();
        *px = ColorU8::from_rgba(color.r, color.g, color.b, coverage).premultiply();
    }
}
