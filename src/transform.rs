//! # Transform Descriptor Module
//!
//! Descrittore chiuso delle trasformazioni applicabili prima dell'encode.
//!
//! ## Operazioni supportate:
//! - `rotate`: rotazione di un multiplo di 90 gradi (normalizzata mod 360)
//! - `flip`: specchiatura lungo l'asse `horizontal` o `vertical`
//! - `grayscale`: conversione in scala di grigi
//! - `tint`: moltiplica i canali RGB per il colore dato, alpha invariato
//! - `composite`: sovrappone un layer (bytes immagine) alle coordinate date
//!
//! Le operazioni sono un tagged union (`"op"`): un tag sconosciuto o un
//! parametro non valido è un errore di configurazione, rilevato prima che
//! inizi qualsiasi lavoro sui pixel. L'ordine della lista è l'ordine di
//! applicazione.
//!
//! ## Esempio JSON:
//! ```json
//! [
//!   { "op": "rotate", "degrees": 90 },
//!   { "op": "flip", "axis": "horizontal" },
//!   { "op": "tint", "r": 255, "g": 200, "b": 160 }
//! ]
//! ```

use crate::error::ProcessError;
use crate::fingerprint::hash_bytes;
use image::{imageops, DynamicImage};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlipAxis {
    Horizontal,
    Vertical,
}

/// One transform operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformOp {
    Rotate {
        degrees: i32,
    },
    Flip {
        axis: FlipAxis,
    },
    Grayscale,
    Tint {
        r: u8,
        g: u8,
        b: u8,
    },
    Composite {
        /// Encoded layer image, hex in JSON
        #[serde(with = "hex::serde")]
        layer: Vec<u8>,
        #[serde(default)]
        left: i64,
        #[serde(default)]
        top: i64,
    },
}

impl TransformOp {
    /// Parse a JSON list of operations
    pub fn parse_list(value: Value) -> Result<Vec<TransformOp>, ProcessError> {
        let ops: Vec<TransformOp> = serde_json::from_value(value)
            .map_err(|e| ProcessError::config(format!("Invalid transformations: {}", e)))?;
        for op in &ops {
            op.validate()?;
        }
        Ok(ops)
    }

    /// Check parameters that serde cannot express
    pub fn validate(&self) -> Result<(), ProcessError> {
        match self {
            TransformOp::Rotate { degrees } => {
                if degrees.rem_euclid(90) != 0 {
                    return Err(ProcessError::config(format!(
                        "Rotation must be a multiple of 90 degrees, got {}",
                        degrees
                    )));
                }
            }
            TransformOp::Composite { layer, .. } => {
                if layer.is_empty() {
                    return Err(ProcessError::config("Composite layer is empty"));
                }
                image::guess_format(layer).map_err(|_| {
                    ProcessError::config("Composite layer is not a recognized image")
                })?;
            }
            TransformOp::Flip { .. } | TransformOp::Grayscale | TransformOp::Tint { .. } => {}
        }
        Ok(())
    }

    /// Order-independent encoding used by the fingerprint.
    ///
    /// Composite layers are represented by their digest, rotations by their
    /// normalized angle.
    pub fn canonical_value(&self) -> Value {
        match self {
            TransformOp::Rotate { degrees } => {
                json!({ "op": "rotate", "degrees": degrees.rem_euclid(360) })
            }
            TransformOp::Flip { axis } => json!({ "op": "flip", "axis": axis }),
            TransformOp::Grayscale => json!({ "op": "grayscale" }),
            TransformOp::Tint { r, g, b } => json!({ "op": "tint", "r": r, "g": g, "b": b }),
            TransformOp::Composite { layer, left, top } => json!({
                "op": "composite",
                "layer_sha256": hash_bytes(layer),
                "left": left,
                "top": top,
            }),
        }
    }
}

/// Apply a single operation
pub fn apply(image: DynamicImage, op: &TransformOp) -> Result<DynamicImage, ProcessError> {
    let result = match op {
        TransformOp::Rotate { degrees } => match degrees.rem_euclid(360) {
            0 => image,
            90 => image.rotate90(),
            180 => image.rotate180(),
            270 => image.rotate270(),
            other => {
                return Err(ProcessError::config(format!(
                    "Rotation must be a multiple of 90 degrees, got {}",
                    other
                )))
            }
        },
        TransformOp::Flip { axis } => match axis {
            FlipAxis::Horizontal => image.fliph(),
            FlipAxis::Vertical => image.flipv(),
        },
        TransformOp::Grayscale => image.grayscale(),
        TransformOp::Tint { r, g, b } => tint(image, [*r, *g, *b]),
        TransformOp::Composite { layer, left, top } => {
            let overlay = image::load_from_memory(layer).map_err(|e| {
                ProcessError::image(format!("Failed to decode composite layer: {}", e))
            })?;
            let mut base = image.to_rgba8();
            imageops::overlay(&mut base, &overlay.to_rgba8(), *left, *top);
            DynamicImage::ImageRgba8(base)
        }
    };
    Ok(result)
}

fn tint(image: DynamicImage, color: [u8; 3]) -> DynamicImage {
    let keep_alpha = image.color().has_alpha();
    let mut rgba = image.to_rgba8();
    for pixel in rgba.pixels_mut() {
        for channel in 0..3 {
            pixel[channel] = ((pixel[channel] as u16 * color[channel] as u16) / 255) as u8;
        }
    }

    let tinted = DynamicImage::ImageRgba8(rgba);
    if keep_alpha {
        tinted
    } else {
        DynamicImage::ImageRgb8(tinted.to_rgb8())
    }
}
