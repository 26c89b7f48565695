use base64::Engine as _;
use serde::{Deserialize, Serialize};

const PLACEHOLDER_PREFIX: &str = "[IMAGE: ";
const PLACEHOLDER_SEPARATOR: &str = " - ID: ";
const PLACEHOLDER_SUFFIX: &str = "]";
const PLACEHOLDER_DEFAULT_LABEL: &str = "Image";

/// One paragraph or inline image inside a chapter.
///
/// Serialized as a single string: paragraphs as their text and images as the
/// `[IMAGE: {alt} - ID: {id}]` placeholder that stored chapters and HTTP
/// clients rely on.
///
/// The string form is lossy at the edges. An image whose alt text is
/// literally `Image` reads back with an empty alt (both render the same), and
/// a paragraph shaped exactly like a placeholder with a UUID id reads back as
/// an image. Only canonical UUIDs are accepted as ids, which is what ingestion
/// assigns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ContentEntry {
    Paragraph(String),
    Image { id: String, alt: String },
}

impl ContentEntry {
    pub fn image_id(&self) -> Option<&str> {
        match self {
            Self::Image { id, .. } => Some(id),
            Self::Paragraph(_) => None,
        }
    }

    pub fn to_wire(&self) -> String {
        match self {
            Self::Paragraph(text) => text.clone(),
            Self::Image { id, alt } => {
                let label = if alt.is_empty() {
                    PLACEHOLDER_DEFAULT_LABEL
                } else {
                    alt.as_str()
                };
                format!("{PLACEHOLDER_PREFIX}{label}{PLACEHOLDER_SEPARATOR}{id}{PLACEHOLDER_SUFFIX}")
            }
        }
    }
}

fn parse_placeholder(raw: &str) -> Option<ContentEntry> {
    let inner = raw
        .strip_prefix(PLACEHOLDER_PREFIX)?
        .strip_suffix(PLACEHOLDER_SUFFIX)?;
    let (label, id) = inner.rsplit_once(PLACEHOLDER_SEPARATOR)?;
    if uuid::Uuid::try_parse(id).ok()?.hyphenated().to_string() != id {
        return None;
    }
    let alt = if label == PLACEHOLDER_DEFAULT_LABEL {
        String::new()
    } else {
        label.to_owned()
    };
    Some(ContentEntry::Image {
        id: id.to_owned(),
        alt,
    })
}

impl From<ContentEntry> for String {
    fn from(entry: ContentEntry) -> Self {
        match entry {
            ContentEntry::Paragraph(text) => text,
            image => image.to_wire(),
        }
    }
}

impl From<String> for ContentEntry {
    fn from(raw: String) -> Self {
        match parse_placeholder(&raw) {
            Some(image) => image,
            None => Self::Paragraph(raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    #[serde(rename = "chapterNumber")]
    pub number: u32,
    #[serde(rename = "chapterTitle")]
    pub title: String,
    pub content: Vec<ContentEntry>,
    /// Referenced image ids, deduplicated in first-occurrence order.
    pub images: Vec<String>,
}

impl Chapter {
    pub fn summary(&self) -> ChapterSummary {
        ChapterSummary {
            chapter_number: self.number,
            chapter_title: self.title.clone(),
            link: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAsset {
    pub id: String,
    pub original_path: String,
    pub content_type: String,
    pub size: usize,
    /// Standard base64 of the original bytes.
    pub data: String,
}

impl ImageAsset {
    pub fn decode_payload(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(&self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NovelRecord {
    pub title: String,
    pub author: String,
    pub chapter_count: usize,
    pub has_images: bool,
    pub image_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterSummary {
    pub chapter_number: u32,
    pub chapter_title: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterPage {
    pub chapters: Vec<ChapterSummary>,
    pub total_pages: u32,
    pub current_page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterContent {
    pub chapter_number: u32,
    pub chapter_title: String,
    pub content: Vec<ContentEntry>,
    pub images: Vec<String>,
}

impl From<Chapter> for ChapterContent {
    fn from(chapter: Chapter) -> Self {
        Self {
            chapter_number: chapter.number,
            chapter_title: chapter.title,
            content: chapter.content,
            images: chapter.images,
        }
    }
}
