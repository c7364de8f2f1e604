//! # Utility Functions Module
//!
//! Piccole funzioni di supporto condivise fra cache, servizio e CLI.

use std::path::Path;

/// Human-readable byte size, for logs and CLI output.
///
/// # Example
/// ```rust
/// use variant_pipeline::utils::format_size;
///
/// assert_eq!(format_size(512), "512 B");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
pub fn format_size(size: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", size as u64, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

/// File stem of a caller supplied filename, `"image"` when there is none
pub fn base_name(original_filename: &str) -> String {
    Path::new(original_filename)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "image".to_string())
}
