//! # Variant Pipeline
//!
//! Pilota il `CodecEngine` per produrre l'originale ri-codificato e una
//! variante per ogni size richiesta.
//!
//! ## Flusso:
//! 1. Lettura metadata (dimensioni, alpha, formato nativo)
//! 2. Decode completo + trasformazioni, una sola volta, su un'istanza condivisa
//! 3. Risoluzione del formato di output e piano delle `VariantSpec`
//! 4. Resize + encode di ogni spec in parallelo (`spawn_blocking` per spec)
//!
//! ## Risoluzione del formato:
//! 1. formato esplicito della richiesta
//! 2. `optimizeOutputFormat`: alpha → WebP, altrimenti JPEG
//! 3. formato nativo della sorgente, se è un formato di output
//! 4. `default_output_format` della configurazione
//!
//! ## Resize:
//! - Larghezza target della size, aspect ratio preservato
//! - Solo downscale: una sorgente più stretta del target mantiene la sua larghezza
//!
//! ## Qualità:
//! - override della richiesta, altrimenti quella della size
//! - per l'originale: override della richiesta, altrimenti `original_quality`
//!
//! Il primo errore di una spec è terminale per l'intera richiesta: nessun set
//! parziale viene restituito. I task già avviati non vengono cancellati,
//! completano e il loro risultato viene scartato.

use crate::codec::{CodecEngine, ImageInfo, OutputFormat};
use crate::error::ProcessError;
use crate::options::NormalizedOptions;
use crate::source::ImageSource;
use crate::variant::{ProcessedVariant, VariantSpec, ORIGINAL_KEY};
use bytes::Bytes;
use futures::future::try_join_all;
use image::{DynamicImage, GenericImageView};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{spawn_blocking, JoinError};
use tracing::{debug, info};

pub struct VariantPipeline {
    codec: Arc<dyn CodecEngine>,
}

fn join_error(e: JoinError) -> ProcessError {
    ProcessError::image(format!("Codec task failed: {}", e))
}

impl VariantPipeline {
    pub fn new(codec: Arc<dyn CodecEngine>) -> Self {
        Self { codec }
    }

    /// Pick the output format for every variant of the request
    pub fn resolve_format(options: &NormalizedOptions, info: &ImageInfo) -> OutputFormat {
        if let Some(format) = options.output_format {
            return format;
        }

        if options.optimize_output_format {
            return if info.has_alpha {
                OutputFormat::WebP
            } else {
                OutputFormat::Jpeg
            };
        }

        info.format
            .and_then(OutputFormat::from_image_format)
            .unwrap_or(options.default_format)
    }

    /// Resolve one `VariantSpec` for the original and one per requested size
    pub fn plan(options: &NormalizedOptions, info: &ImageInfo) -> Vec<VariantSpec> {
        let format = Self::resolve_format(options, info);

        let original = VariantSpec {
            size_key: ORIGINAL_KEY.to_string(),
            output_format: format,
            quality: options.quality.unwrap_or(options.original_quality),
            target_width: None,
        };

        std::iter::once(original)
            .chain(options.sizes.iter().map(|profile| VariantSpec {
                size_key: profile.key.clone(),
                output_format: format,
                quality: options.quality.unwrap_or(profile.quality),
                target_width: Some(profile.width),
            }))
            .collect()
    }

    /// Produce the complete variant set for `source`
    pub async fn run(
        &self,
        source: &ImageSource,
        options: &NormalizedOptions,
    ) -> Result<Vec<ProcessedVariant>, ProcessError> {
        let start = Instant::now();
        let codec = self.codec.clone();
        let data = source.bytes().clone();
        let transformations = options.transformations.clone();

        let (info, image) = spawn_blocking(move || -> Result<_, ProcessError> {
            let info = codec.read_metadata(&data)?;
            let mut image = codec.decode(&data)?;
            for op in &transformations {
                image = codec.apply_transform(image, op)?;
            }
            Ok((info, image))
        })
        .await
        .map_err(join_error)??;

        let specs = Self::plan(options, &info);
        debug!(
            "Decoded {}x{} source (alpha: {}), rendering {} variants as {}",
            info.width,
            info.height,
            info.has_alpha,
            specs.len(),
            specs[0].output_format
        );

        let image = Arc::new(image);
        let renders = specs.into_iter().map(|spec| {
            let codec = self.codec.clone();
            let image = image.clone();
            async move {
                spawn_blocking(move || render(codec.as_ref(), &image, &spec))
                    .await
                    .map_err(join_error)?
            }
        });

        let variants = try_join_all(renders).await?;

        info!(
            "Rendered {} variants in {:?}",
            variants.len(),
            start.elapsed()
        );
        Ok(variants)
    }
}

/// Height preserving the aspect ratio at `target_width`, at least 1
fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    let scaled = (height as u64 * target_width as u64 + width as u64 / 2) / width.max(1) as u64;
    scaled.max(1) as u32
}

fn render(
    codec: &dyn CodecEngine,
    image: &DynamicImage,
    spec: &VariantSpec,
) -> Result<ProcessedVariant, ProcessError> {
    let (width, height) = image.dimensions();

    let target: Cow<'_, DynamicImage> = match spec.target_width {
        Some(target_width) if target_width < width => {
            let target_height = scaled_height(width, height, target_width);
            Cow::Owned(codec.resize(image, target_width, target_height)?)
        }
        _ => Cow::Borrowed(image),
    };

    let payload = codec.encode(&target, spec.output_format, spec.quality)?;
    debug!(
        "Encoded '{}' {}x{} {} q{} ({} bytes)",
        spec.size_key,
        target.width(),
        target.height(),
        spec.output_format,
        spec.quality,
        payload.len()
    );

    Ok(ProcessedVariant::new(
        spec.size_key.clone(),
        Bytes::from(payload),
        target.width(),
        target.height(),
        spec.output_format,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ImageCodec;
    use crate::config::{Config, SizeProfile};
    use crate::options::ProcessOptions;
    use crate::pipeline::filename_resolver::FilenameResolver;
    use crate::test_helpers::{sample_jpeg, sample_png_rgba, CountingCodec};
    use crate::transform::TransformOp;
    use image::ImageFormat;

    fn config_with(sizes: Vec<SizeProfile>) -> Config {
        Config {
            sizes,
            ..Default::default()
        }
    }

    fn normalize(config: &Config, options: ProcessOptions) -> NormalizedOptions {
        options.normalize(config, &FilenameResolver::new()).unwrap()
    }

    fn pipeline() -> VariantPipeline {
        VariantPipeline::new(Arc::new(ImageCodec::new()))
    }

    fn info(has_alpha: bool, format: Option<ImageFormat>) -> ImageInfo {
        ImageInfo {
            width: 10,
            height: 10,
            has_alpha,
            format,
        }
    }

    #[test]
    fn test_resolve_format_order() {
        let config = Config::default();

        let explicit = normalize(
            &config,
            ProcessOptions {
                output_format: Some("png".to_string()),
                optimize_output_format: true,
                ..Default::default()
            },
        );
        assert_eq!(
            VariantPipeline::resolve_format(&explicit, &info(true, Some(ImageFormat::Jpeg))),
            OutputFormat::Png
        );

        let optimize = normalize(
            &config,
            ProcessOptions {
                optimize_output_format: true,
                ..Default::default()
            },
        );
        assert_eq!(
            VariantPipeline::resolve_format(&optimize, &info(true, Some(ImageFormat::Png))),
            OutputFormat::WebP
        );
        assert_eq!(
            VariantPipeline::resolve_format(&optimize, &info(false, Some(ImageFormat::Png))),
            OutputFormat::Jpeg
        );

        let plain = normalize(&config, ProcessOptions::default());
        assert_eq!(
            VariantPipeline::resolve_format(&plain, &info(true, Some(ImageFormat::Png))),
            OutputFormat::Png
        );
        assert_eq!(
            VariantPipeline::resolve_format(&plain, &info(false, Some(ImageFormat::Gif))),
            OutputFormat::Jpeg
        );
    }

    #[test]
    fn test_plan_qualities() {
        let config = config_with(vec![SizeProfile::new("small", 320, 80)]);

        let specs = VariantPipeline::plan(
            &normalize(&config, ProcessOptions::default()),
            &info(false, Some(ImageFormat::Jpeg)),
        );
        assert_eq!(specs.len(), 2);
        assert!(specs[0].is_original());
        assert_eq!(specs[0].quality, 100);
        assert_eq!(specs[0].target_width, None);
        assert_eq!(specs[1].quality, 80);
        assert_eq!(specs[1].target_width, Some(320));

        let overridden = VariantPipeline::plan(
            &normalize(
                &config,
                ProcessOptions {
                    quality: Some(55),
                    ..Default::default()
                },
            ),
            &info(false, Some(ImageFormat::Jpeg)),
        );
        assert!(overridden.iter().all(|spec| spec.quality == 55));
    }

    #[test]
    fn test_scaled_height() {
        assert_eq!(scaled_height(800, 600, 320), 240);
        assert_eq!(scaled_height(1000, 1, 10), 1);
        assert_eq!(scaled_height(3, 2, 2), 1);
    }

    #[tokio::test]
    async fn test_jpeg_source_small_profile() {
        let config = config_with(vec![SizeProfile::new("small", 320, 80)]);
        let source = ImageSource::from_bytes(sample_jpeg(800, 600)).unwrap();

        let variants = pipeline()
            .run(&source, &normalize(&config, ProcessOptions::default()))
            .await
            .unwrap();

        assert_eq!(variants.len(), 2);
        let original = &variants[0];
        assert!(original.is_original());
        assert_eq!((original.width, original.height), (800, 600));

        let small = &variants[1];
        assert_eq!(small.size_key, "small");
        assert_eq!((small.width, small.height), (320, 240));
        assert_eq!(small.format, OutputFormat::Jpeg);
        assert_eq!(small.byte_length, small.payload.len() as u64);

        let decoded = image::load_from_memory(&small.payload).unwrap();
        assert_eq!(decoded.dimensions(), (320, 240));
    }

    #[tokio::test]
    async fn test_never_upscales() {
        let config = config_with(vec![SizeProfile::new("large", 1024, 85)]);
        let source = ImageSource::from_bytes(sample_jpeg(800, 600)).unwrap();

        let variants = pipeline()
            .run(&source, &normalize(&config, ProcessOptions::default()))
            .await
            .unwrap();

        let large = variants.iter().find(|v| v.size_key == "large").unwrap();
        assert_eq!((large.width, large.height), (800, 600));
    }

    #[tokio::test]
    async fn test_alpha_source_optimized_to_webp() {
        let config = config_with(vec![SizeProfile::new("small", 16, 80)]);
        let source = ImageSource::from_bytes(sample_png_rgba(64, 32)).unwrap();
        let options = normalize(
            &config,
            ProcessOptions {
                optimize_output_format: true,
                ..Default::default()
            },
        );

        let variants = pipeline().run(&source, &options).await.unwrap();

        assert!(variants.iter().all(|v| v.format == OutputFormat::WebP));
        let small = &variants[1];
        assert_eq!((small.width, small.height), (16, 8));
    }

    #[tokio::test]
    async fn test_transforms_apply_before_resize() {
        let config = config_with(vec![SizeProfile::new("small", 30, 80)]);
        let source = ImageSource::from_bytes(sample_jpeg(80, 40)).unwrap();
        let options = normalize(
            &config,
            ProcessOptions {
                transformations: vec![TransformOp::Rotate { degrees: 90 }],
                ..Default::default()
            },
        );

        let variants = pipeline().run(&source, &options).await.unwrap();

        assert_eq!((variants[0].width, variants[0].height), (40, 80));
        assert_eq!((variants[1].width, variants[1].height), (30, 60));
    }

    #[tokio::test]
    async fn test_encode_failure_fails_whole_set() {
        let config = config_with(vec![SizeProfile::new("small", 32, 80)]);
        let source = ImageSource::from_bytes(sample_jpeg(64, 64)).unwrap();
        let pipeline = VariantPipeline::new(Arc::new(CountingCodec::failing_encode("disk full")));

        let err = pipeline
            .run(&source, &normalize(&config, ProcessOptions::default()))
            .await
            .unwrap_err();

        assert!(err.is_image_processing());
        assert!(err.to_string().contains("disk full"));
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_image_error() {
        let mut data = sample_jpeg(64, 64);
        data.truncate(40);
        let source = ImageSource::from_bytes(data).unwrap();

        let err = pipeline()
            .run(&source, &normalize(&Config::default(), ProcessOptions::default()))
            .await
            .unwrap_err();
        assert!(err.is_image_processing());
    }
}
