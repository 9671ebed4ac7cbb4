//! Layer identity and per-layer attributes.
//!
//! A layer is identified by a tagged value whose canonical string form is
//! `base`, `mask`, `sketch:<id>`, `controlnet:<id>`, `controlnet:<id>:mask` or
//! `regionMask:<id>`. The string form doubles as the suffix of the layer's
//! history topic (`canvas/<layer>`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::TOPIC_PREFIX;
use crate::error::CanvasError;

/// Identity of a logical layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayerId {
    /// The base image; never drawn on directly
    Base,
    /// The inpainting mask
    Mask,
    /// A free-hand sketch layer
    Sketch(u32),
    /// A controlnet guide layer
    Controlnet(u32),
    /// The mask companion of a controlnet layer
    ControlnetMask(u32),
    /// A regional-prompt mask
    RegionMask(u32),
}

/// How a layer stores and renders its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// Strokes re-rendered every frame
    Vector,
    /// One flattened bitmap
    Raster,
}

impl LayerId {
    pub fn kind(&self) -> LayerKind {
        match self {
            LayerId::Base | LayerId::Sketch(_) => LayerKind::Raster,
            LayerId::Mask
            | LayerId::Controlnet(_)
            | LayerId::ControlnetMask(_)
            | LayerId::RegionMask(_) => LayerKind::Vector,
        }
    }

    /// Whether pointer input draws on this layer.
    pub fn is_drawable(&self) -> bool {
        !matches!(self, LayerId::Base)
    }

    /// Whether pasted/dropped images can be placed on this layer.
    pub fn accepts_images(&self) -> bool {
        matches!(
            self,
            LayerId::Base | LayerId::Sketch(_) | LayerId::Controlnet(_)
        )
    }

    /// Whether content changes on this layer are recorded in history.
    pub fn has_history(&self) -> bool {
        !matches!(self, LayerId::Base)
    }

    /// Layers that are hidden when rendering the init image.
    pub fn is_decoration(&self) -> bool {
        !matches!(self, LayerId::Base | LayerId::Sketch(_))
    }

    /// The controlnet this layer belongs to, if any.
    pub fn controlnet_group(&self) -> Option<u32> {
        match self {
            LayerId::Controlnet(id) | LayerId::ControlnetMask(id) => Some(*id),
            _ => None,
        }
    }

    /// History topic for this layer's content.
    pub fn topic(&self) -> String {
        format!("{}{}", TOPIC_PREFIX, self)
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerId::Base => write!(f, "base"),
            LayerId::Mask => write!(f, "mask"),
            LayerId::Sketch(id) => write!(f, "sketch:{}", id),
            LayerId::Controlnet(id) => write!(f, "controlnet:{}", id),
            LayerId::ControlnetMask(id) => write!(f, "controlnet:{}:mask", id),
            LayerId::RegionMask(id) => write!(f, "regionMask:{}", id),
        }
    }
}

impl FromStr for LayerId {
    type Err = CanvasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CanvasError::InvalidLayerId(s.to_string());
        let parse_id = |raw: &str| raw.parse::<u32>().map_err(|_| invalid());

        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            ["base"] => Ok(LayerId::Base),
            ["mask"] => Ok(LayerId::Mask),
            ["sketch", id] => Ok(LayerId::Sketch(parse_id(id)?)),
            ["controlnet", id] => Ok(LayerId::Controlnet(parse_id(id)?)),
            ["controlnet", id, "mask"] => Ok(LayerId::ControlnetMask(parse_id(id)?)),
            ["regionMask", id] => Ok(LayerId::RegionMask(parse_id(id)?)),
            _ => Err(invalid()),
        }
    }
}

impl Serialize for LayerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LayerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Controlnet unit settings carried alongside the layer content.
///
/// Only `enabled` and `override_base_layer` influence compositing; the rest is
/// preserved for the generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlnetParams {
    /// Model name selected for this unit
    #[serde(default)]
    pub model: String,
    /// Preprocessor (detection module) name
    #[serde(default = "default_module")]
    pub module: String,
    /// Conditioning weight
    #[serde(default = "default_weight")]
    pub weight: f32,
    /// Fraction of the schedule where guidance starts
    #[serde(default)]
    pub guidance_start: f32,
    /// Fraction of the schedule where guidance ends
    #[serde(default = "default_guidance_end")]
    pub guidance_end: f32,
    /// Preprocessor resolution
    #[serde(default = "default_processor_res")]
    pub processor_res: u32,
    /// First preprocessor threshold
    #[serde(default)]
    pub threshold_a: f32,
    /// Second preprocessor threshold
    #[serde(default)]
    pub threshold_b: f32,
    /// Use this layer's own image instead of the init image as guide
    #[serde(default)]
    pub override_base_layer: bool,
}

fn default_module() -> String {
    "none".to_string()
}

fn default_weight() -> f32 {
    1.0
}

fn default_guidance_end() -> f32 {
    1.0
}

fn default_processor_res() -> u32 {
    512
}

impl Default for ControlnetParams {
    fn default() -> Self {
        Self {
            model: String::new(),
            module: default_module(),
            weight: default_weight(),
            guidance_start: 0.0,
            guidance_end: default_guidance_end(),
            processor_res: default_processor_res(),
            threshold_a: 0.0,
            threshold_b: 0.0,
            override_base_layer: false,
        }
    }
}

/// Regional prompt settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionParams {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

impl Default for RegionParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            weight: default_weight(),
        }
    }
}

/// Kind-specific attributes of a layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerParams {
    #[default]
    None,
    Controlnet(ControlnetParams),
    Region(RegionParams),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_id_string_roundtrip() {
        let ids = [
            LayerId::Base,
            LayerId::Mask,
            LayerId::Sketch(3),
            LayerId::Controlnet(0),
            LayerId::ControlnetMask(12),
            LayerId::RegionMask(7),
        ];
        for id in ids {
            let parsed: LayerId = id.to_string().parse().expect("parse");
            assert_eq!(parsed, id);
        }
        assert_eq!(LayerId::ControlnetMask(2).to_string(), "controlnet:2:mask");
        assert_eq!(LayerId::RegionMask(1).to_string(), "regionMask:1");
    }

    #[test]
    fn test_invalid_layer_ids() {
        for raw in ["", "sketch", "sketch:x", "controlnet:1:guide", "region:1", "mask:1"] {
            assert!(raw.parse::<LayerId>().is_err(), "{raw} should not parse");
        }
    }

    #[test]
    fn test_topics() {
        assert_eq!(LayerId::Mask.topic(), "canvas/mask");
        assert_eq!(LayerId::Sketch(4).topic(), "canvas/sketch:4");
    }

    #[test]
    fn test_layer_capabilities() {
        assert!(!LayerId::Base.is_drawable());
        assert!(LayerId::Sketch(0).accepts_images());
        assert!(!LayerId::Mask.accepts_images());
        assert_eq!(LayerId::Sketch(0).kind(), LayerKind::Raster);
        assert_eq!(LayerId::RegionMask(0).kind(), LayerKind::Vector);
        assert_eq!(LayerId::ControlnetMask(5).controlnet_group(), Some(5));
        assert!(LayerId::Controlnet(1).is_decoration());
        assert!(!LayerId::Sketch(1).is_decoration());
    }

    #[test]
    fn test_layer_id_serde() {
        let json = serde_json::to_string(&LayerId::ControlnetMask(1)).expect("serialize");
        assert_eq!(json, "\"controlnet:1:mask\"");
        let back: LayerId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, LayerId::ControlnetMask(1));
    }
}
