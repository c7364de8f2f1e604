//! # Codec Engine Module
//!
//! Questo modulo isola tutte le primitive di pixel (decode, resize,
//! transform, encode, lettura metadata) dietro il trait `CodecEngine`.
//!
//! ## Responsabilità:
//! - Definisce `OutputFormat`, l'insieme chiuso dei formati di output
//! - Definisce `ImageInfo`, i metadata letti dall'header della sorgente
//! - Definisce il trait `CodecEngine` usato dalla pipeline
//! - Fornisce `ImageCodec`, implementazione in puro Rust sul crate `image`
//!
//! ## Mappatura operazioni:
//!
//! | Operazione | Implementazione |
//! |---|---|
//! | decode | `image::ImageReader` con formato rilevato dai magic bytes |
//! | read_metadata | `ImageReader::into_decoder` (solo header, nessun decode) |
//! | resize | `DynamicImage::resize_exact` con filtro `Lanczos3` |
//! | apply_transform | `transform::apply` |
//! | encode | `JpegEncoder` / `PngEncoder` / `WebPEncoder` (lossless) |
//!
//! ## Formati di output:
//! - **JPEG**: lossy, quality 1-100 (0 viene portato a 1), niente alpha
//! - **PNG**: lossless, quality ignorata
//! - **WebP**: lossless, preserva la trasparenza
//!
//! Le operazioni sono sincrone e CPU-bound: la pipeline le esegue dentro
//! `tokio::task::spawn_blocking`.

use crate::error::ProcessError;
use crate::transform::{self, TransformOp};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;

/// Output formats the pipeline can encode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Jpeg, OutputFormat::Png, OutputFormat::WebP];

    /// Parse a user supplied format name (case-insensitive, `jpg` accepted)
    pub fn parse(s: &str) -> Result<Self, ProcessError> {
        match s.trim().to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::WebP),
            other => Err(ProcessError::config(format!(
                "Unsupported output format: '{}'. Supported formats: jpeg, png, webp",
                other
            ))),
        }
    }

    /// Canonical name, as reported in metadata
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
        }
    }

    /// File extension (three-letter form for the JPEG family)
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
        }
    }

    /// Map a decoded source format to an output format, if it is one
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(OutputFormat::Jpeg),
            ImageFormat::Png => Some(OutputFormat::Png),
            ImageFormat::WebP => Some(OutputFormat::WebP),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header-level information about a source image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub has_alpha: bool,
    pub format: Option<ImageFormat>,
}

/// The pixel engine the pipeline drives.
///
/// Every implementation must support all five operations so the pipeline
/// stays engine-agnostic (and testable with an instrumented engine).
pub trait CodecEngine: Send + Sync {
    /// Read dimensions, alpha presence and container format without a full decode.
    fn read_metadata(&self, data: &[u8]) -> Result<ImageInfo, ProcessError>;

    /// Decode the complete payload.
    fn decode(&self, data: &[u8]) -> Result<DynamicImage, ProcessError>;

    /// Resize to exact dimensions.
    fn resize(&self, image: &DynamicImage, width: u32, height: u32)
        -> Result<DynamicImage, ProcessError>;

    /// Apply one transform operation.
    fn apply_transform(
        &self,
        image: DynamicImage,
        op: &TransformOp,
    ) -> Result<DynamicImage, ProcessError>;

    /// Encode to the given format and quality.
    fn encode(
        &self,
        image: &DynamicImage,
        format: OutputFormat,
        quality: u8,
    ) -> Result<Vec<u8>, ProcessError>;
}

/// Pure Rust engine on top of the `image` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCodec;

impl ImageCodec {
    pub fn new() -> Self {
        Self
    }
}

fn reader(data: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, ProcessError> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ProcessError::image(format!("Failed to read image header: {}", e)))
}

impl CodecEngine for ImageCodec {
    fn read_metadata(&self, data: &[u8]) -> Result<ImageInfo, ProcessError> {
        let reader = reader(data)?;
        let format = reader.format();
        let decoder = reader.into_decoder()?;
        let (width, height) = decoder.dimensions();

        Ok(ImageInfo {
            width,
            height,
            has_alpha: decoder.color_type().has_alpha(),
            format,
        })
    }

    fn decode(&self, data: &[u8]) -> Result<DynamicImage, ProcessError> {
        let reader = reader(data)?;
        if reader.format().is_none() {
            return Err(ProcessError::image("Unrecognized image format"));
        }
        Ok(reader.decode()?)
    }

    fn resize(
        &self,
        image: &DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<DynamicImage, ProcessError> {
        if width == 0 || height == 0 {
            return Err(ProcessError::image(format!(
                "Invalid resize target {}x{}",
                width, height
            )));
        }
        Ok(image.resize_exact(width, height, FilterType::Lanczos3))
    }

    fn apply_transform(
        &self,
        image: DynamicImage,
        op: &TransformOp,
    ) -> Result<DynamicImage, ProcessError> {
        transform::apply(image, op)
    }

    fn encode(
        &self,
        image: &DynamicImage,
        format: OutputFormat,
        quality: u8,
    ) -> Result<Vec<u8>, ProcessError> {
        let mut buffer = Vec::new();

        match format {
            OutputFormat::Jpeg => {
                // JPEG non ha canale alpha
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
                rgb.write_with_encoder(encoder)?;
            }
            OutputFormat::Png => {
                let normalized = normalize_8bit(image);
                normalized.write_with_encoder(PngEncoder::new(&mut buffer))?;
            }
            OutputFormat::WebP => {
                let normalized = normalize_8bit(image);
                normalized.write_with_encoder(WebPEncoder::new_lossless(&mut buffer))?;
            }
        }

        Ok(buffer)
    }
}

/// RGB8 or RGBA8, the layouts every encoder accepts
fn normalize_8bit(image: &DynamicImage) -> DynamicImage {
    if image.color().has_alpha() {
        DynamicImage::ImageRgba8(image.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    }
}
