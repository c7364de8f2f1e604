//! # Image Source Module
//!
//! Payload binario completo di una richiesta più il media type rilevato.
//!
//! ## Responsabilità:
//! - Rileva il formato dai magic bytes (`image::guess_format`)
//! - Rifiuta payload vuoti o non-immagine con `ImageProcessing`
//! - Legge sorgenti in streaming (`AsyncRead`) fino a un payload completo
//!
//! L'`ImageSource` non viene mai mutato: vive per la durata della richiesta.

use crate::error::ProcessError;
use bytes::Bytes;
use image::ImageFormat;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Raw image payload with its detected media type
#[derive(Debug, Clone)]
pub struct ImageSource {
    bytes: Bytes,
    format: ImageFormat,
}

impl ImageSource {
    /// Wrap a complete payload, detecting its media type
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Result<Self, ProcessError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(ProcessError::image("Empty image payload"));
        }

        let format = image::guess_format(&bytes)
            .map_err(|_| ProcessError::image("Unsupported media type: payload is not an image"))?;

        if !format.reading_enabled() {
            return Err(ProcessError::image(format!(
                "Unsupported media type: {}",
                format.to_mime_type()
            )));
        }

        debug!(
            "Detected {} source ({} bytes)",
            format.to_mime_type(),
            bytes.len()
        );

        Ok(Self { bytes, format })
    }

    /// Read a streaming source to the end
    pub async fn from_reader<R>(mut reader: R) -> Result<Self, ProcessError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buffer = Vec::new();
        reader
            .read_to_end(&mut buffer)
            .await
            .map_err(|e| ProcessError::image(format!("Failed to read image stream: {}", e)))?;
        Self::from_bytes(buffer)
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
