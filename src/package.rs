//! Opens an uploaded EPUB container and lays out its reading order.
//!
//! The container is a ZIP archive. `META-INF/container.xml` names the OPF
//! package document, whose `manifest` lists every item and whose `spine`
//! gives the linear reading order.

use std::collections::HashMap;
use std::io::{Cursor, Read as _};
use std::path::Path;

use percent_encoding::percent_decode_str;

use crate::ingest::{IngestError, IngestOptions};

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_AUTHOR: &str = "Unknown Author";

const CONTAINER_PATH: &str = "META-INF/container.xml";

const FRONT_MATTER_MARKERS: &[&str] = &["cover", "toc", "nav", "copyright", "titlepage"];

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "webp", "avif", "bmp", "tif", "tiff",
];

#[derive(Debug, Clone)]
pub struct Package {
    pub title: String,
    pub author: String,
    pub units: Vec<StructuralUnit>,
    pub images: Vec<ImageItem>,
}

/// One spine document.
#[derive(Debug, Clone)]
pub struct StructuralUnit {
    /// Archive path, used to resolve relative references in the markup.
    pub path: String,
    pub position: usize,
    pub markup: String,
}

#[derive(Debug, Clone)]
pub struct ImageItem {
    pub path: String,
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
struct ManifestItem {
    path: String,
    media_type: Option<String>,
    properties: String,
}

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

pub fn open_package(bytes: &[u8], options: &IngestOptions) -> Result<Package, IngestError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| malformed(format!("not a zip archive: {err}")))?;

    let container = read_text_entry(&mut archive, CONTAINER_PATH)?;
    let opf_path = rootfile_path(&container)?;
    let opf = read_text_entry(&mut archive, &opf_path)?;
    let doc = parse_xml(&opf, &opf_path)?;
    let opf_dir = parent_dir(&opf_path);

    let manifest_node = doc
        .descendants()
        .find(|n| n.has_tag_name("manifest"))
        .ok_or_else(|| malformed(format!("{opf_path}: missing <manifest>")))?;
    let spine_node = doc
        .descendants()
        .find(|n| n.has_tag_name("spine"))
        .ok_or_else(|| malformed(format!("{opf_path}: missing <spine>")))?;

    let mut manifest = HashMap::new();
    let mut manifest_order = Vec::new();
    for item in manifest_node.children().filter(|n| n.has_tag_name("item")) {
        let (Some(id), Some(href)) = (item.attribute("id"), item.attribute("href")) else {
            tracing::debug!(opf = %opf_path, "manifest item without id/href; skipping");
            continue;
        };
        let entry = ManifestItem {
            path: resolve_href(opf_dir, href),
            media_type: item
                .attribute("media-type")
                .map(|m| m.trim().to_ascii_lowercase())
                .filter(|m| !m.is_empty()),
            properties: item.attribute("properties").unwrap_or_default().to_owned(),
        };
        manifest_order.push(id.to_owned());
        manifest.insert(id.to_owned(), entry);
    }

    let mut units = Vec::new();
    for idref in spine_node
        .children()
        .filter(|n| n.has_tag_name("itemref"))
        .filter_map(|n| n.attribute("idref"))
    {
        let Some(item) = manifest.get(idref) else {
            tracing::warn!(idref, "spine item is not in the manifest; skipping");
            continue;
        };
        if !is_document(item) {
            tracing::debug!(path = %item.path, "spine item is not a markup document; skipping");
            continue;
        }
        if options.skip_front_matter && is_front_matter(item) {
            tracing::debug!(path = %item.path, "skipping front matter");
            continue;
        }
        let raw = read_entry(&mut archive, &item.path)?;
        units.push(StructuralUnit {
            path: item.path.clone(),
            position: units.len(),
            markup: String::from_utf8_lossy(&raw).into_owned(),
        });
    }

    let mut images = Vec::new();
    for id in &manifest_order {
        let Some(item) = manifest.get(id) else {
            continue;
        };
        if !is_image(item) {
            continue;
        }
        match read_entry(&mut archive, &item.path) {
            Ok(bytes) => images.push(ImageItem {
                path: item.path.clone(),
                media_type: item.media_type.clone(),
                bytes,
            }),
            Err(err) => tracing::warn!(path = %item.path, %err, "image listed but unreadable; skipping"),
        }
    }

    let (title, author) = read_metadata(&doc);

    Ok(Package {
        title: title.unwrap_or_else(|| UNKNOWN_TITLE.to_owned()),
        author: author.unwrap_or_else(|| UNKNOWN_AUTHOR.to_owned()),
        units,
        images,
    })
}

fn malformed(message: impl Into<String>) -> IngestError {
    IngestError::MalformedPackage(message.into())
}

fn read_entry(archive: &mut Archive<'_>, path: &str) -> Result<Vec<u8>, IngestError> {
    let mut file = archive
        .by_name(path)
        .map_err(|err| malformed(format!("{path}: {err}")))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .map_err(|err| malformed(format!("read {path}: {err}")))?;
    Ok(buf)
}

fn read_text_entry(archive: &mut Archive<'_>, path: &str) -> Result<String, IngestError> {
    let raw = read_entry(archive, path)?;
    String::from_utf8(raw).map_err(|err| malformed(format!("{path} is not utf-8: {err}")))
}

fn parse_xml<'a>(text: &'a str, path: &str) -> Result<roxmltree::Document<'a>, IngestError> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    };
    roxmltree::Document::parse_with_options(text, options)
        .map_err(|err| malformed(format!("{path}: {err}")))
}

fn rootfile_path(container: &str) -> Result<String, IngestError> {
    let doc = parse_xml(container, CONTAINER_PATH)?;
    let full_path = doc
        .descendants()
        .find(|n| n.has_tag_name("rootfile"))
        .and_then(|n| n.attribute("full-path"))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| malformed(format!("{CONTAINER_PATH}: no rootfile full-path")))?;
    Ok(resolve_href("", full_path))
}

fn read_metadata(doc: &roxmltree::Document<'_>) -> (Option<String>, Option<String>) {
    let Some(metadata) = doc.descendants().find(|n| n.has_tag_name("metadata")) else {
        return (None, None);
    };
    let first_text = |tag: &str| {
        metadata
            .descendants()
            .filter(|n| n.has_tag_name(tag))
            .filter_map(|n| n.text())
            .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
            .find(|t| !t.is_empty())
    };
    (first_text("title"), first_text("creator"))
}

fn is_document(item: &ManifestItem) -> bool {
    match item.media_type.as_deref() {
        Some("application/xhtml+xml" | "text/html") => true,
        Some(_) => false,
        None => matches!(extension(&item.path).as_str(), "xhtml" | "html" | "htm"),
    }
}

fn is_image(item: &ManifestItem) -> bool {
    if item
        .media_type
        .as_deref()
        .is_some_and(|m| m.starts_with("image/"))
    {
        return true;
    }
    IMAGE_EXTENSIONS.contains(&extension(&item.path).as_str())
}

fn is_front_matter(item: &ManifestItem) -> bool {
    if item.properties.split_whitespace().any(|p| p == "nav") {
        return true;
    }
    let file_name = item
        .path
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    FRONT_MATTER_MARKERS.iter().any(|m| file_name.contains(m))
}

pub(crate) fn extension(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Directory part of an archive path, without trailing slash.
pub(crate) fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Resolves `href` against the archive directory `base_dir` into a normalized
/// archive path. Fragments and queries are dropped, `%XX` escapes decoded,
/// `.`/`..` segments folded. `..` never climbs above the archive root.
pub(crate) fn resolve_href(base_dir: &str, href: &str) -> String {
    let href = href.split(['#', '?']).next().unwrap_or_default();
    let href = percent_decode_str(href.trim()).decode_utf8_lossy();

    let mut segments: Vec<&str> = Vec::new();
    let start = if href.starts_with('/') { "" } else { base_dir };
    for segment in start.split('/').chain(href.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
