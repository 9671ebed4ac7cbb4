//! Error types for canvas operations.

use thiserror::Error;

use crate::layer::LayerId;

/// Errors that can occur while editing or exporting the canvas.
///
/// Degenerate geometry (zero-length drags, single-point strokes, empty
/// selection boxes) and stale history topics are not errors; they are clamped
/// or ignored where they occur.
#[derive(Error, Debug)]
pub enum CanvasError {
    /// I/O error while reading or writing image files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image bytes could not be decoded
    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    /// Image could not be encoded to PNG
    #[error("Failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    /// Data URL has no base64 payload or an unsupported header
    #[error("Malformed data URL: {message}")]
    MalformedDataUrl {
        /// Description of what is wrong with the URL
        message: String,
    },

    /// Base64 payload of a data URL is invalid
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Layer string could not be parsed
    #[error("Invalid layer id '{0}'")]
    InvalidLayerId(String),

    /// Layer does not exist in the store
    #[error("Unknown layer: {0}")]
    UnknownLayer(LayerId),

    /// Operation is not valid for this kind of layer
    #[error("Layer {layer} does not support {operation}")]
    UnsupportedOperation {
        /// The layer the operation targeted
        layer: LayerId,
        /// The rejected operation
        operation: &'static str,
    },

    /// Decode/encode work on the layer has not resolved yet
    #[error("Layer {0} has pending decode/encode work")]
    Busy(LayerId),

    /// Pixmap could not be allocated for the requested size
    #[error("Cannot allocate a {width}x{height} raster")]
    Allocation {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },
}

impl CanvasError {
    /// Create a malformed data URL error with a message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedDataUrl {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(layer: LayerId, operation: &'static str) -> Self {
        Self::UnsupportedOperation { layer, operation }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, CanvasError>;
