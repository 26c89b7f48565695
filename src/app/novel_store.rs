use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

use crate::app::model::{StoredNovel, slugify};
use crate::formats::{Chapter, ChapterSummary, ImageAsset};
use crate::ingest::IngestedNovel;

#[derive(Debug, Clone)]
pub enum PutOutcome {
    Stored(StoredNovel),
    /// A novel with the same title and author was already stored; nothing was written.
    Existing(StoredNovel),
}

#[async_trait]
pub trait NovelStore: Send + Sync {
    /// Persists all three ingestion outputs, or returns the existing novel with
    /// the same title and author.
    async fn put_novel(&self, ingested: &IngestedNovel) -> anyhow::Result<PutOutcome>;
    async fn find_by_title_author(
        &self,
        title: &str,
        author: &str,
    ) -> anyhow::Result<Option<StoredNovel>>;
    /// Oldest first.
    async fn list(&self) -> anyhow::Result<Vec<StoredNovel>>;
    async fn get(&self, novel_id: &str) -> anyhow::Result<Option<StoredNovel>>;
    /// Looks a novel up by id, slug or title.
    async fn resolve(&self, name: &str) -> anyhow::Result<Option<StoredNovel>>;
    async fn list_chapters(&self, novel_id: &str) -> anyhow::Result<Vec<ChapterSummary>>;
    async fn get_chapter(&self, novel_id: &str, number: u32) -> anyhow::Result<Option<Chapter>>;
    async fn get_image(&self, novel_id: &str, image_id: &str)
    -> anyhow::Result<Option<ImageAsset>>;
}

/// ```text
/// {base}/novels/{id}/novel.json
///                   /chapters.json        chapter summaries
///                   /chapters/{n}.json
///                   /images/{image_id}.json
/// ```
#[derive(Debug)]
pub struct LocalFsNovelStore {
    base_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalFsNovelStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn novels_dir(&self) -> PathBuf {
        self.base_dir.join("novels")
    }

    fn novel_dir(&self, novel_id: &str) -> PathBuf {
        self.novels_dir().join(novel_id)
    }

    fn staging_dir(&self, novel_id: &str) -> PathBuf {
        self.novels_dir().join(format!(".staging-{novel_id}"))
    }

    async fn write_novel_tree(
        &self,
        dir: &Path,
        novel: &StoredNovel,
        ingested: &IngestedNovel,
    ) -> anyhow::Result<()> {
        fs::create_dir_all(dir.join("chapters"))
            .await
            .with_context(|| format!("create chapters dir: {}", dir.display()))?;
        fs::create_dir_all(dir.join("images"))
            .await
            .with_context(|| format!("create images dir: {}", dir.display()))?;

        for chapter in &ingested.chapters {
            write_json(&dir.join("chapters").join(format!("{}.json", chapter.number)), chapter)
                .await?;
        }
        for image in &ingested.images {
            write_json(&dir.join("images").join(format!("{}.json", image.id)), image).await?;
        }
        let summaries = ingested
            .chapters
            .iter()
            .map(Chapter::summary)
            .collect::<Vec<_>>();
        write_json(&dir.join("chapters.json"), &summaries).await?;
        // Written last: a directory without novel.json is never listed.
        write_json(&dir.join("novel.json"), novel).await?;
        Ok(())
    }
}

#[async_trait]
impl NovelStore for LocalFsNovelStore {
    async fn put_novel(&self, ingested: &IngestedNovel) -> anyhow::Result<PutOutcome> {
        let _guard = self.write_lock.lock().await;

        if let Some(existing) = self
            .find_by_title_author(&ingested.novel.title, &ingested.novel.author)
            .await?
        {
            return Ok(PutOutcome::Existing(existing));
        }

        let novel = StoredNovel {
            id: uuid::Uuid::new_v4().to_string(),
            slug: slugify(&ingested.novel.title),
            record: ingested.novel.clone(),
            created_at: chrono::Utc::now(),
        };

        let staging = self.staging_dir(&novel.id);
        if let Err(err) = self.write_novel_tree(&staging, &novel, ingested).await {
            if let Err(cleanup) = fs::remove_dir_all(&staging).await {
                tracing::warn!(path = %staging.display(), %cleanup, "failed to remove staging dir");
            }
            return Err(err.context("write novel"));
        }

        let final_dir = self.novel_dir(&novel.id);
        fs::rename(&staging, &final_dir)
            .await
            .with_context(|| format!("rename staging to final: {}", final_dir.display()))?;

        tracing::info!(
            novel_id = %novel.id,
            title = %novel.record.title,
            chapters = novel.record.chapter_count,
            images = novel.record.image_count,
            "stored novel"
        );
        Ok(PutOutcome::Stored(novel))
    }

    async fn find_by_title_author(
        &self,
        title: &str,
        author: &str,
    ) -> anyhow::Result<Option<StoredNovel>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|n| n.record.title == title && n.record.author == author))
    }

    async fn list(&self) -> anyhow::Result<Vec<StoredNovel>> {
        let dir = self.novels_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("read dir: {}", dir.display()));
            }
        };

        let mut novels = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("read dir entry: {}", dir.display()))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !is_store_id(name) {
                continue;
            }
            let path = entry.path().join("novel.json");
            if let Some(novel) = read_json::<StoredNovel>(&path)
                .await
                .with_context(|| format!("read: {}", path.display()))?
            {
                novels.push(novel);
            }
        }
        novels.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(novels)
    }

    async fn get(&self, novel_id: &str) -> anyhow::Result<Option<StoredNovel>> {
        if !is_store_id(novel_id) {
            return Ok(None);
        }
        let path = self.novel_dir(novel_id).join("novel.json");
        read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))
    }

    async fn resolve(&self, name: &str) -> anyhow::Result<Option<StoredNovel>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }
        if let Some(novel) = self.get(name).await? {
            return Ok(Some(novel));
        }
        let novels = self.list().await?;
        let found = novels
            .iter()
            .find(|n| n.slug == name || n.record.title == name)
            .or_else(|| {
                novels
                    .iter()
                    .find(|n| n.record.title.eq_ignore_ascii_case(name))
            })
            .cloned();
        Ok(found)
    }

    async fn list_chapters(&self, novel_id: &str) -> anyhow::Result<Vec<ChapterSummary>> {
        if !is_store_id(novel_id) {
            return Ok(Vec::new());
        }
        let path = self.novel_dir(novel_id).join("chapters.json");
        let chapters = read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))?;
        Ok(chapters.unwrap_or_default())
    }

    async fn get_chapter(&self, novel_id: &str, number: u32) -> anyhow::Result<Option<Chapter>> {
        if !is_store_id(novel_id) {
            return Ok(None);
        }
        let path = self
            .novel_dir(novel_id)
            .join("chapters")
            .join(format!("{number}.json"));
        read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))
    }

    async fn get_image(
        &self,
        novel_id: &str,
        image_id: &str,
    ) -> anyhow::Result<Option<ImageAsset>> {
        if !is_store_id(novel_id) || !is_store_id(image_id) {
            return Ok(None);
        }
        let path = self
            .novel_dir(novel_id)
            .join("images")
            .join(format!("{image_id}.json"));
        read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))
    }
}

/// Ids become path components, so only canonical UUIDs are accepted.
fn is_store_id(raw: &str) -> bool {
    uuid::Uuid::parse_str(raw).is_ok_and(|id| id.to_string() == raw)
}

pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_slice(&bytes).context("parse json")?;
    Ok(Some(value))
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let data = serde_json::to_vec(value).context("serialize json")?;
    fs::write(path, &data)
        .await
        .with_context(|| format!("write: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{ContentEntry, NovelRecord};
    use crate::ingest::build_novel_record;

    fn sample(title: &str, author: &str) -> IngestedNovel {
        let image = ImageAsset {
            id: uuid::Uuid::new_v4().to_string(),
            original_path: "OEBPS/a.png".to_owned(),
            content_type: "image/png".to_owned(),
            size: 3,
            data: "AQID".to_owned(),
        };
        let chapters = vec![
            Chapter {
                number: 1,
                title: "Opening".to_owned(),
                content: vec![
                    ContentEntry::Paragraph("Hello.".to_owned()),
                    ContentEntry::Image {
                        id: image.id.clone(),
                        alt: "Map".to_owned(),
                    },
                ],
                images: vec![image.id.clone()],
            },
            Chapter {
                number: 2,
                title: "Chapter 2".to_owned(),
                content: Vec::new(),
                images: Vec::new(),
            },
        ];
        build_novel_record(title.to_owned(), author.to_owned(), chapters, vec![image])
    }

    fn stored(outcome: PutOutcome) -> StoredNovel {
        match outcome {
            PutOutcome::Stored(novel) => novel,
            PutOutcome::Existing(novel) => panic!("unexpected duplicate: {novel:?}"),
        }
    }

    #[tokio::test]
    async fn put_then_read_back_every_part() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = LocalFsNovelStore::new(dir.path());
        let ingested = sample("The Long Road", "A. Writer");

        let novel = stored(store.put_novel(&ingested).await?);
        assert_eq!(novel.slug, "the-long-road");
        assert_eq!(
            novel.record,
            NovelRecord {
                title: "The Long Road".to_owned(),
                author: "A. Writer".to_owned(),
                chapter_count: 2,
                has_images: true,
                image_count: 1,
            }
        );

        assert_eq!(store.get(&novel.id).await?, Some(novel.clone()));
        let summaries = store.list_chapters(&novel.id).await?;
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[1].chapter_title, "Chapter 2");

        let chapter = store.get_chapter(&novel.id, 1).await?.expect("chapter 1");
        assert_eq!(chapter, ingested.chapters[0]);
        assert!(store.get_chapter(&novel.id, 3).await?.is_none());

        let image = store
            .get_image(&novel.id, &ingested.images[0].id)
            .await?
            .expect("image");
        assert_eq!(image.decode_payload()?, vec![1, 2, 3]);

        let staging = std::fs::read_dir(dir.path().join("novels"))?
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".staging"))
            .count();
        assert_eq!(staging, 0);
        Ok(())
    }

    #[tokio::test]
    async fn same_title_and_author_is_not_stored_twice() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = LocalFsNovelStore::new(dir.path());

        let first = stored(store.put_novel(&sample("T", "A")).await?);
        let PutOutcome::Existing(again) = store.put_novel(&sample("T", "A")).await? else {
            panic!("expected duplicate");
        };
        assert_eq!(again.id, first.id);

        stored(store.put_novel(&sample("T", "B")).await?);
        assert_eq!(store.list().await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn resolve_accepts_id_slug_and_title() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = LocalFsNovelStore::new(dir.path());
        let novel = stored(store.put_novel(&sample("The Long Road", "A")).await?);

        for name in [novel.id.as_str(), "the-long-road", "The Long Road", "the long road"] {
            let found = store.resolve(name).await?.map(|n| n.id);
            assert_eq!(found.as_deref(), Some(novel.id.as_str()), "{name}");
        }
        assert!(store.resolve("shadow-slave").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn path_like_ids_are_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = LocalFsNovelStore::new(dir.path());
        assert!(store.get("../etc").await?.is_none());
        assert!(store.get_image("..", "x").await?.is_none());
        assert!(store.list_chapters("novels").await?.is_empty());
        assert!(store.list().await?.is_empty());
        Ok(())
    }
}
