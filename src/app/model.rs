use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::formats::NovelRecord;

pub const MESSAGE_STORED: &str = "Novel successfully uploaded and stored";
pub const MESSAGE_DUPLICATE: &str = "Novel already exists in the database";

/// `novel.json` of a stored novel: the ingestion record plus store metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredNovel {
    pub id: String,
    pub slug: String,
    #[serde(flatten)]
    pub record: NovelRecord,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub novel_id: String,
    pub title: String,
    pub author: String,
    pub chapter_count: usize,
    pub image_count: usize,
    pub message: String,
}

impl UploadResponse {
    pub fn new(novel: &StoredNovel, message: &str) -> Self {
        Self {
            novel_id: novel.id.clone(),
            title: novel.record.title.clone(),
            author: novel.record.author.clone(),
            chapter_count: novel.record.chapter_count,
            image_count: novel.record.image_count,
            message: message.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    #[serde(default)]
    pub voice: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub username: String,
    pub novel_name: String,
    pub last_chapter_read: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NovelProgress {
    pub novel_name: String,
    pub last_chapter_read: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressList {
    pub progress: Vec<NovelProgress>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusMessage {
    pub status: &'static str,
    pub message: String,
}

impl StatusMessage {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: message.into(),
        }
    }
}

/// Lowercase ASCII words joined by `-`; used as a stable, URL-safe novel name.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
