//! # Fingerprint Generator
//!
//! Deriva la chiave content-addressable di una richiesta.
//!
//! ## Algoritmo:
//! ```text
//! fingerprint = hex(sha256(content)) ++ hex(sha256(canonical_json(options)))
//! ```
//!
//! - Lunghezza fissa: 128 caratteri esadecimali
//! - Il JSON canonico emette le chiavi degli oggetti in ordine lessicografico,
//!   indipendentemente dall'ordine di inserimento dei campi
//! - La session id della richiesta non entra mai nel fingerprint
//! - Funzione pura: nessun errore possibile

use crate::options::NormalizedOptions;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Content-addressable cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Length of a fingerprint in hex characters
    pub const LEN: usize = 128;

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accepts only well-formed keys, so a fingerprint is always safe as a path segment
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == Self::LEN && s.bytes().all(|b| b.is_ascii_hexdigit());
        valid.then(|| Self(s.to_ascii_lowercase()))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the fingerprint of `content` processed with `options`
pub fn compute(content: &[u8], options: &NormalizedOptions) -> Fingerprint {
    let options_json = canonical_json(&options.canonical_value());
    Fingerprint(format!(
        "{}{}",
        hash_bytes(content),
        hash_bytes(options_json.as_bytes())
    ))
}

/// SHA-256 of arbitrary bytes, as lowercase hex
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Serialize a JSON value with object keys sorted at every level
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::OutputFormat;
    use crate::config::SizeProfile;
    use crate::transform::TransformOp;
    use serde_json::json;

    fn options() -> NormalizedOptions {
        NormalizedOptions {
            output_format: None,
            quality: None,
            optimize_output_format: false,
            sizes: vec![SizeProfile::new("small", 320, 80)],
            transformations: Vec::new(),
            filename_strategy: "default".to_string(),
            default_format: OutputFormat::Jpeg,
            original_quality: 100,
        }
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = compute(b"payload", &options());
        let b = compute(b"payload", &options());
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), Fingerprint::LEN);
        assert_eq!(&a.as_str()[..64], hash_bytes(b"payload"));
    }

    #[test]
    fn test_fingerprint_known_content_half() {
        // sha256("") is a well known constant, stable across runs and platforms
        let fp = compute(b"", &options());
        assert_eq!(
            &fp.as_str()[..64],
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_fingerprint_golden_value() {
        assert_eq!(
            canonical_json(&options().canonical_value()),
            r#"{"defaultFormat":"jpeg","filenameStrategy":"default","optimizeOutputFormat":false,"originalQuality":100,"outputFormat":null,"quality":null,"sizes":[{"key":"small","quality":80,"width":320}],"transformations":[]}"#
        );
        assert_eq!(
            compute(b"payload", &options()).as_str(),
            concat!(
                "239f59ed55e737c77147cf55ad0c1b030b6d7ee748a7426952f9b852d5a935e5",
                "aa3aab34d8017e3fc160b07150b6a1b6363390b7f807010b83222d0bad529bd2"
            )
        );
    }

    #[test]
    fn test_fingerprint_sensitive_to_format_and_quality() {
        let base = compute(b"payload", &options());

        let mut with_format = options();
        with_format.output_format = Some(OutputFormat::WebP);
        assert_ne!(base, compute(b"payload", &with_format));

        let mut with_quality = options();
        with_quality.quality = Some(70);
        let q70 = compute(b"payload", &with_quality);
        assert_ne!(base, q70);

        with_quality.quality = Some(71);
        assert_ne!(q70, compute(b"payload", &with_quality));
    }

    #[test]
    fn test_fingerprint_sensitive_to_content_and_transforms() {
        let base = compute(b"payload", &options());
        assert_ne!(base, compute(b"payload2", &options()));

        let mut rotated = options();
        rotated.transformations = vec![TransformOp::Rotate { degrees: 90 }];
        assert_ne!(base, compute(b"payload", &rotated));

        let mut other_strategy = options();
        other_strategy.filename_strategy = "flat".to_string();
        assert_ne!(base, compute(b"payload", &other_strategy));
    }

    #[test]
    fn test_canonical_json_ignores_insertion_order() {
        let mut first = serde_json::Map::new();
        first.insert("quality".to_string(), json!(80));
        first.insert("format".to_string(), json!("jpeg"));
        first.insert("nested".to_string(), json!({ "z": 1, "a": [ { "y": 2, "b": 3 } ] }));

        let mut second = serde_json::Map::new();
        second.insert("nested".to_string(), json!({ "a": [ { "b": 3, "y": 2 } ], "z": 1 }));
        second.insert("format".to_string(), json!("jpeg"));
        second.insert("quality".to_string(), json!(80));

        let a = canonical_json(&Value::Object(first));
        let b = canonical_json(&Value::Object(second));
        assert_eq!(a, b);
        assert_eq!(a, r#"{"format":"jpeg","nested":{"a":[{"b":3,"y":2}],"z":1},"quality":80}"#);
    }

    #[test]
    fn test_canonical_json_keeps_array_order() {
        assert_ne!(canonical_json(&json!([1, 2])), canonical_json(&json!([2, 1])));
    }

    #[test]
    fn test_parse_rejects_malformed_keys() {
        let fp = compute(b"x", &options());
        assert_eq!(Fingerprint::parse(fp.as_str()), Some(fp));
        assert!(Fingerprint::parse("../etc").is_none());
        assert!(Fingerprint::parse(&"g".repeat(128)).is_none());
    }
}
