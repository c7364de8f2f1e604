//! # Variant Pipeline - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento della configurazione e avvio del servizio
//!
//! ## Comandi:
//! - `process <file>`: genera le varianti e stampa il risultato in JSON
//! - `clear-cache`: svuota la cache delle varianti
//! - `cache-stats`: numero di entry e byte in cache
//! - `init-config <path>`: scrive la configurazione di default
//!
//! ## Esempio di utilizzo:
//! ```bash
//! variant-pipeline process photo.jpg --sizes small,large --optimize-format --rotate 90
//! variant-pipeline process logo.png --ops '[{"op":"tint","r":255,"g":200,"b":200}]'
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use variant_pipeline::utils::format_size;
use variant_pipeline::{
    Config, FlipAxis, ProcessOptions, TransformOp, VariantCacheStore, VariantService,
};

#[derive(Parser)]
#[command(name = "variant-pipeline")]
#[command(about = "Generate cached image variants and store them on every configured backend")]
struct Args {
    /// Configuration file (JSON); defaults are used when missing
    #[arg(short, long, global = true, default_value = "variant-pipeline.json")]
    config: PathBuf,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process one image and print the result as JSON
    Process {
        /// Image file to process
        file: PathBuf,

        /// Output format (jpeg, png, webp)
        #[arg(short, long)]
        format: Option<String>,

        /// Quality override (0-100) for every variant
        #[arg(short, long)]
        quality: Option<u32>,

        /// Pick WebP for sources with alpha, JPEG otherwise
        #[arg(long)]
        optimize_format: bool,

        /// Comma separated subset of configured size keys
        #[arg(short, long, value_delimiter = ',')]
        sizes: Option<Vec<String>>,

        /// Rotate by degrees (multiple of 90)
        #[arg(long)]
        rotate: Option<i32>,

        /// Flip along an axis (horizontal, vertical)
        #[arg(long)]
        flip: Option<String>,

        /// Convert to grayscale
        #[arg(long)]
        grayscale: bool,

        /// Tint color as r,g,b
        #[arg(long, value_delimiter = ',')]
        tint: Option<Vec<u8>>,

        /// Extra transformations as a JSON list, applied after the flags above
        #[arg(long)]
        ops: Option<String>,

        /// Filename strategy (default, flat)
        #[arg(long)]
        strategy: Option<String>,
    },

    /// Remove every cached variant set
    ClearCache,

    /// Show cache entry count and size
    CacheStats,

    /// Write the default configuration to a file
    InitConfig {
        /// Destination path
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Process {
            file,
            format,
            quality,
            optimize_format,
            sizes,
            rotate,
            flip,
            grayscale,
            tint,
            ops,
            strategy,
        } => {
            let mut transformations = Vec::new();
            if let Some(degrees) = rotate {
                transformations.push(TransformOp::Rotate { degrees });
            }
            if let Some(axis) = flip {
                transformations.push(TransformOp::Flip {
                    axis: parse_axis(&axis)?,
                });
            }
            if grayscale {
                transformations.push(TransformOp::Grayscale);
            }
            if let Some(color) = tint {
                let [r, g, b] = color[..] else {
                    return Err(anyhow::anyhow!("--tint expects exactly three values: r,g,b"));
                };
                transformations.push(TransformOp::Tint { r, g, b });
            }
            if let Some(json) = ops {
                transformations.extend(TransformOp::parse_list(serde_json::from_str(&json)?)?);
            }

            let options = ProcessOptions {
                output_format: format,
                quality,
                optimize_output_format: optimize_format,
                process_sizes: sizes,
                transformations,
                filename_strategy: strategy,
            };

            process_file(&args.config, &file, &options).await?;
        }
        Command::ClearCache => {
            let cache = open_cache(&args.config).await?;
            cache.clear().await?;
            info!("Cache cleared: {}", cache.root().display());
        }
        Command::CacheStats => {
            let cache = open_cache(&args.config).await?;
            let stats = cache.stats().await?;
            println!(
                "{} entries, {} in {}",
                stats.entries,
                format_size(stats.total_bytes),
                cache.root().display()
            );
            if stats.corrupted > 0 {
                println!("{} corrupted entries skipped", stats.corrupted);
            }
        }
        Command::InitConfig { path } => {
            if path.exists() {
                return Err(anyhow::anyhow!(
                    "Refusing to overwrite existing file: {}",
                    path.display()
                ));
            }
            Config::default().save_to_file(&path).await?;
            info!("Wrote default configuration to {}", path.display());
        }
    }

    Ok(())
}

async fn process_file(config_path: &Path, file: &Path, options: &ProcessOptions) -> Result<()> {
    if !file.is_file() {
        return Err(anyhow::anyhow!("Input file does not exist: {}", file.display()));
    }

    let config = Config::from_file(config_path).await?;
    let service = VariantService::new(config).await?;

    let original_filename = file
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let data = tokio::fs::read(file).await?;

    let result = service.process(data, &original_filename, options).await?;
    println!("{}", result.to_json()?);
    Ok(())
}

async fn open_cache(config_path: &Path) -> Result<VariantCacheStore> {
    let config = Config::from_file(config_path).await?;
    Ok(VariantCacheStore::new(config.cache.directory))
}

fn parse_axis(axis: &str) -> Result<FlipAxis> {
    match axis.to_lowercase().as_str() {
        "horizontal" | "h" => Ok(FlipAxis::Horizontal),
        "vertical" | "v" => Ok(FlipAxis::Vertical),
        other => Err(anyhow::anyhow!(
            "Invalid flip axis '{}': expected horizontal or vertical",
            other
        )),
    }
}
