use base64::Engine as _;

use crate::formats::ImageAsset;
use crate::package::{ImageItem, extension};

/// Used when neither the manifest nor the file extension names a known type.
pub const FALLBACK_CONTENT_TYPE: &str = "image/jpeg";

const RECOGNIZED_CONTENT_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/svg+xml",
    "image/webp",
    "image/avif",
    "image/bmp",
    "image/tiff",
];

pub fn normalize_images(items: Vec<ImageItem>) -> Vec<ImageAsset> {
    items.into_iter().map(normalize_image).collect()
}

/// Never inspects pixel data; the payload is carried through byte-for-byte.
pub fn normalize_image(item: ImageItem) -> ImageAsset {
    let content_type = content_type_for(&item.path, item.media_type.as_deref());
    ImageAsset {
        id: uuid::Uuid::new_v4().to_string(),
        size: item.bytes.len(),
        data: base64::engine::general_purpose::STANDARD.encode(&item.bytes),
        original_path: item.path,
        content_type: content_type.to_owned(),
    }
}

pub fn content_type_for(path: &str, declared: Option<&str>) -> &'static str {
    let declared = declared.map(|d| d.trim().to_ascii_lowercase());
    let declared = match declared.as_deref() {
        Some("image/jpg") => Some("image/jpeg"),
        other => other,
    };
    if let Some(known) = declared.and_then(|d| {
        RECOGNIZED_CONTENT_TYPES
            .iter()
            .copied()
            .find(|t| *t == d)
    }) {
        return known;
    }
    content_type_for_extension(path).unwrap_or(FALLBACK_CONTENT_TYPE)
}

fn content_type_for_extension(path: &str) -> Option<&'static str> {
    match extension(path).as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "svg" => Some("image/svg+xml"),
        "webp" => Some("image/webp"),
        "avif" => Some("image/avif"),
        "bmp" => Some("image/bmp"),
        "tif" | "tiff" => Some("image/tiff"),
        _ => None,
    }
}
