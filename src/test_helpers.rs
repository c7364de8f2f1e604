//! Shared test utilities: synthetic images, an instrumented codec and
//! storage test doubles.

use crate::codec::{CodecEngine, ImageCodec, ImageInfo, OutputFormat};
use crate::error::ProcessError;
use crate::storage::{StorageBackend, StorageError, StorageResult};
use crate::transform::TransformOp;
use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Gradient JPEG of the given size.
pub fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buffer = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, 90))
        .unwrap();
    buffer
}

/// PNG with a real alpha channel (left half fully transparent).
pub fn sample_png_rgba(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, _| {
        let alpha = if x < width / 2 { 0 } else { 255 };
        Rgba([200, 40, 40, alpha])
    });
    let mut buffer = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_with_encoder(PngEncoder::new(&mut buffer))
        .unwrap();
    buffer
}

/// Wraps `ImageCodec` and counts every engine invocation.
#[derive(Default)]
pub struct CountingCodec {
    inner: ImageCodec,
    calls: AtomicUsize,
    decodes: AtomicUsize,
    /// Artificial latency on decode, to keep a computation in flight
    decode_delay: Option<Duration>,
    /// Fail every encode with this message
    fail_encode: Option<String>,
}

impl CountingCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decode_delay(delay: Duration) -> Self {
        Self {
            decode_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn failing_encode(message: &str) -> Self {
        Self {
            fail_encode: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn decodes(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl CodecEngine for CountingCodec {
    fn read_metadata(&self, data: &[u8]) -> Result<ImageInfo, ProcessError> {
        self.record();
        self.inner.read_metadata(data)
    }

    fn decode(&self, data: &[u8]) -> Result<DynamicImage, ProcessError> {
        self.record();
        self.decodes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.decode_delay {
            std::thread::sleep(delay);
        }
        self.inner.decode(data)
    }

    fn resize(
        &self,
        image: &DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<DynamicImage, ProcessError> {
        self.record();
        self.inner.resize(image, width, height)
    }

    fn apply_transform(
        &self,
        image: DynamicImage,
        op: &TransformOp,
    ) -> Result<DynamicImage, ProcessError> {
        self.record();
        self.inner.apply_transform(image, op)
    }

    fn encode(
        &self,
        image: &DynamicImage,
        format: OutputFormat,
        quality: u8,
    ) -> Result<Vec<u8>, ProcessError> {
        self.record();
        if let Some(ref message) = self.fail_encode {
            return Err(ProcessError::image(message.clone()));
        }
        self.inner.encode(image, format, quality)
    }
}

/// Backend that keeps payloads in memory and records every call.
pub struct RecordingBackend {
    name: String,
    pub persisted: Mutex<Vec<(String, Bytes)>>,
}

impl RecordingBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            persisted: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.persisted.lock().unwrap().len()
    }

    pub fn filenames(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .persisted
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl StorageBackend for RecordingBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn persist(&self, filename: &str, payload: Bytes) -> StorageResult<String> {
        self.persisted
            .lock()
            .unwrap()
            .push((filename.to_string(), payload));
        Ok(format!("mem://{}/{}", self.name, filename))
    }
}

/// Backend that always fails, like a directory without write permission.
pub struct FailingBackend {
    name: String,
    pub attempts: AtomicUsize,
}

impl FailingBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl StorageBackend for FailingBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn persist(&self, filename: &str, _payload: Bytes) -> StorageResult<String> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::UploadFailed(format!(
            "permission denied writing {}",
            filename
        )))
    }
}
