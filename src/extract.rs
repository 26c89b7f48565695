use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use scraper::{ElementRef, Html, Node};

use crate::formats::{ContentEntry, ImageAsset};
use crate::package::{parent_dir, resolve_href};

const MAX_TITLE_CHARS: usize = 200;

const SKIPPED_TAGS: &[&str] = &[
    "head", "script", "style", "nav", "header", "footer", "template", "noscript",
];

// HTML void elements, plus svg `image`, which the HTML parser already
// treats as self-contained.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "image", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

static SELF_CLOSING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([A-Za-z][A-Za-z0-9:_-]*)(\s[^<>]*?)?\s*/>").expect("valid self-closing tag regex")
});

const BLOCK_TAGS: &[&str] = &[
    "html",
    "body",
    "main",
    "p",
    "div",
    "section",
    "article",
    "aside",
    "blockquote",
    "li",
    "ul",
    "ol",
    "dl",
    "dd",
    "dt",
    "pre",
    "figure",
    "figcaption",
    "table",
    "tr",
    "td",
    "th",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
];

/// Paragraphs and image references of one structural unit, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedUnit {
    /// First non-empty `h1`-`h6` text, if any.
    pub heading: Option<String>,
    pub entries: Vec<ContentEntry>,
}

/// Maps archive paths of normalized images to their generated ids.
#[derive(Debug, Clone, Default)]
pub struct ImageLookup {
    by_path: HashMap<String, String>,
    ordered: Vec<(String, String)>,
}

impl ImageLookup {
    pub fn new(images: &[ImageAsset]) -> Self {
        let ordered = images
            .iter()
            .map(|image| (image.original_path.clone(), image.id.clone()))
            .collect::<Vec<_>>();
        let by_path = ordered.iter().cloned().collect();
        Self { by_path, ordered }
    }

    /// Resolves an `src`/`href` found in the unit at `unit_path`.
    ///
    /// The exact archive path wins; otherwise the first image whose path ends
    /// with the reference's own trailing path.
    pub fn resolve(&self, unit_path: &str, reference: &str) -> Option<&str> {
        let reference = reference.trim();
        if reference.is_empty() || reference.starts_with("data:") || reference.contains("://") {
            return None;
        }

        let full = resolve_href(parent_dir(unit_path), reference);
        if let Some(id) = self.by_path.get(&full) {
            return Some(id);
        }

        let tail = resolve_href("", reference);
        if tail.is_empty() {
            return None;
        }
        let suffix = format!("/{tail}");
        self.ordered
            .iter()
            .find(|(path, _)| *path == tail || path.ends_with(&suffix))
            .map(|(_, id)| id.as_str())
    }
}

pub fn extract_unit(unit_path: &str, markup: &str, images: &ImageLookup) -> ExtractedUnit {
    let document = Html::parse_document(&expand_self_closing(markup));
    let mut walker = Walker {
        unit_path,
        images,
        buffer: String::new(),
        out: ExtractedUnit::default(),
    };
    walker.visit(document.root_element());
    walker.flush();
    walker.out
}

struct Walker<'a> {
    unit_path: &'a str,
    images: &'a ImageLookup,
    buffer: String,
    out: ExtractedUnit,
}

impl Walker<'_> {
    fn visit(&mut self, element: ElementRef<'_>) {
        let name = element.value().name();
        match name {
            _ if SKIPPED_TAGS.contains(&name) => {}
            "br" | "hr" => self.flush(),
            "img" => self.image(element, element.value().attr("src")),
            "image" => {
                // svg `xlink:href` arrives namespaced; match on the local name.
                let href = element
                    .value()
                    .attrs()
                    .find(|(name, _)| matches!(*name, "href" | "xlink:href"))
                    .map(|(_, value)| value);
                self.image(element, href);
            }
            _ if BLOCK_TAGS.contains(&name) => {
                self.flush();
                if is_heading(name) && self.out.heading.is_none() {
                    let text = collapse_whitespace(&element.text().collect::<String>());
                    if !text.is_empty() {
                        self.out.heading = Some(text.chars().take(MAX_TITLE_CHARS).collect());
                    }
                }
                self.children(element);
                self.flush();
            }
            _ => self.children(element),
        }
    }

    fn children(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.buffer.push_str(text),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.visit(child);
                    }
                }
                _ => {}
            }
        }
    }

    fn image(&mut self, element: ElementRef<'_>, reference: Option<&str>) {
        self.flush();
        let Some(reference) = reference else {
            return;
        };
        let Some(id) = self.images.resolve(self.unit_path, reference) else {
            tracing::debug!(unit = self.unit_path, reference, "unresolved image reference; dropping");
            return;
        };
        let alt = element
            .value()
            .attr("alt")
            .map(collapse_whitespace)
            .unwrap_or_default();
        self.out.entries.push(ContentEntry::Image {
            id: id.to_owned(),
            alt,
        });
    }

    fn flush(&mut self) {
        let text = collapse_whitespace(&self.buffer);
        self.buffer.clear();
        if !text.is_empty() {
            self.out.entries.push(ContentEntry::Paragraph(text));
        }
    }
}

/// Rewrites XHTML `<title/>`-style tags as open/close pairs. The HTML parser
/// ignores the trailing slash on non-void elements, so an empty `<title/>` or
/// `<script src=".."/>` would otherwise swallow the rest of the document.
fn expand_self_closing(markup: &str) -> Cow<'_, str> {
    SELF_CLOSING.replace_all(markup, |caps: &Captures<'_>| {
        let name = &caps[1];
        if VOID_TAGS.contains(&name.to_ascii_lowercase().as_str()) {
            return caps[0].to_owned();
        }
        let attrs = caps.get(2).map_or("", |m| m.as_str());
        format!("<{name}{attrs}></{name}>")
    })
}

fn is_heading(name: &str) -> bool {
    matches!(name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
