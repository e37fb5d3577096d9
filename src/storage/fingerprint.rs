//! Content-derived filenames
//!
//! The filename is the only dedup key: same bytes and MIME type, same name.

use sha2::{Digest, Sha256};

const FINGERPRINT_LEN: usize = 12;

/// Subtypes used verbatim as the extension
const PASSTHROUGH_SUBTYPES: &[&str] = &["pdf", "png", "jpg", "jpeg", "txt", "md"];

fn mapped_extension(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        "application/pdf" => Some("pdf"),
        "application/msword" => Some("doc"),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => Some("docx"),
        "text/plain" => Some("txt"),
        "text/markdown" => Some("md"),
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        _ => None,
    }
}

/// Extension for a declared MIME type
pub fn extension_for(mime_type: &str) -> String {
    match mime_type.rsplit_once('/') {
        Some((_, subtype)) if PASSTHROUGH_SUBTYPES.contains(&subtype) => subtype.to_string(),
        Some((_, subtype)) => mapped_extension(mime_type)
            .map(str::to_string)
            .unwrap_or_else(|| subtype.to_string()),
        None => mapped_extension(mime_type).unwrap_or("bin").to_string(),
    }
}

/// First 12 hex characters of the SHA-256 of `data`
pub fn fingerprint(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut hex = hex::encode(digest);
    hex.truncate(FINGERPRINT_LEN);
    hex
}

/// Deterministic `doc_<fingerprint>.<ext>` name for an uploaded payload
pub fn content_filename(data: &[u8], mime_type: &str) -> String {
    format!("doc_{}.{}", fingerprint(data), extension_for(mime_type))
}
