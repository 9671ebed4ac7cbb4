//! Decoded render targets, keyed directly by layer identity.
//!
//! Raster content is stored encoded; drawing it requires a decoded pixmap. A
//! layer whose pixmap has not been decoded yet (or whose content changed since)
//! is "not mounted" and is skipped by every renderer.

use std::collections::HashMap;

use tiny_skia::Pixmap;

use crate::layer::LayerId;
use crate::raster::RasterImage;

/// A decoded raster together with the content it was decoded from.
#[derive(Debug, Clone)]
pub struct RenderTarget {
    pub source: RasterImage,
    pub pixmap: Pixmap,
}

/// Map from layer identity to its decoded raster.
#[derive(Debug, Clone, Default)]
pub struct RenderTargets {
    targets: HashMap<LayerId, RenderTarget>,
}

impl RenderTargets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a decoded raster for a layer, replacing any previous one.
    pub fn mount(&mut self, layer: LayerId, source: RasterImage, pixmap: Pixmap) {
        log::trace!("Mounted render target for {}", layer);
        self.targets.insert(layer, RenderTarget { source, pixmap });
    }

    pub fn unmount(&mut self, layer: LayerId) {
        self.targets.remove(&layer);
    }

    /// The target for `layer`, only if it matches the layer's current content.
    pub fn get(&self, layer: LayerId, content: &RasterImage) -> Option<&RenderTarget> {
        let target = self.targets.get(&layer)?;
        if target.source == *content {
            Some(target)
        } else {
            log::debug!("Render target for {} is stale, skipping", layer);
            None
        }
    }

    pub fn is_mounted(&self, layer: LayerId, content: &RasterImage) -> bool {
        self.get(layer, content).is_some()
    }

    pub fn clear(&mut self) {
        self.targets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::new_pixmap;

    fn raster(url: &str) -> RasterImage {
        RasterImage {
            data_url: url.to_string(),
            x: 0,
            y: 0,
            width: 2,
            height: 2,
        }
    }

    #[test]
    fn test_stale_target_is_not_returned() {
        let mut targets = RenderTargets::new();
        let layer = LayerId::Sketch(1);
        targets.mount(layer, raster("a"), new_pixmap(2, 2).expect("pixmap"));

        assert!(targets.is_mounted(layer, &raster("a")));
        assert!(!targets.is_mounted(layer, &raster("b")));
        assert!(!targets.is_mounted(LayerId::Sketch(2), &raster("a")));

        targets.unmount(layer);
        assert!(!targets.is_mounted(layer, &raster("a")));
    }
}
