use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use url::Url;

use crate::app::model::StoredNovel;
use crate::app::novel_store::NovelStore;
use crate::formats::{ChapterContent, ChapterPage, ChapterSummary, ContentEntry};
use crate::scrape;

pub const CHAPTERS_PER_PAGE: usize = 50;

const LIST_FETCH_ATTEMPTS: u32 = 3;
const LIST_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Where a novel's chapters come from. Callers never branch on the kind.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// `page` is 1-based.
    async fn chapter_page(&self, page: u32) -> anyhow::Result<ChapterPage>;
    async fn chapter(&self, number: u32) -> anyhow::Result<Option<ChapterContent>>;
    /// Failures come from a remote site rather than local storage.
    fn is_remote(&self) -> bool;
}

pub struct EpubSource {
    store: Arc<dyn NovelStore>,
    novel: StoredNovel,
}

impl EpubSource {
    pub fn new(store: Arc<dyn NovelStore>, novel: StoredNovel) -> Self {
        Self { store, novel }
    }
}

#[async_trait]
impl ContentSource for EpubSource {
    async fn chapter_page(&self, page: u32) -> anyhow::Result<ChapterPage> {
        let summaries = self
            .store
            .list_chapters(&self.novel.id)
            .await
            .context("list stored chapters")?;
        Ok(paginate(summaries, page))
    }

    async fn chapter(&self, number: u32) -> anyhow::Result<Option<ChapterContent>> {
        let chapter = self
            .store
            .get_chapter(&self.novel.id, number)
            .await
            .context("read stored chapter")?;
        Ok(chapter.map(ChapterContent::from))
    }

    fn is_remote(&self) -> bool {
        false
    }
}

/// Slices an ordered chapter list into fixed-size pages. Out-of-range pages are
/// empty but still report the real page count.
pub fn paginate(summaries: Vec<ChapterSummary>, page: u32) -> ChapterPage {
    let total_pages = summaries.len().div_ceil(CHAPTERS_PER_PAGE).max(1);
    let start = (page.max(1) as usize - 1).saturating_mul(CHAPTERS_PER_PAGE);
    let chapters = summaries
        .into_iter()
        .skip(start)
        .take(CHAPTERS_PER_PAGE)
        .collect();
    ChapterPage {
        chapters,
        total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
        current_page: page,
    }
}

pub struct ScrapedSource {
    client: reqwest::Client,
    base: Url,
    novel: String,
}

impl ScrapedSource {
    pub fn new(client: reqwest::Client, base: Url, novel: impl Into<String>) -> Self {
        Self {
            client,
            base,
            novel: novel.into(),
        }
    }

    async fn fetch_chapter_page_once(&self, url: &Url, page: u32) -> anyhow::Result<ChapterPage> {
        let html = fetch_text(&self.client, url).await?;
        let parsed = scrape::parse_chapter_list(&html, &self.base, page);
        if parsed.chapters.is_empty() {
            anyhow::bail!("no chapter links found at {url}");
        }
        Ok(parsed)
    }
}

#[async_trait]
impl ContentSource for ScrapedSource {
    async fn chapter_page(&self, page: u32) -> anyhow::Result<ChapterPage> {
        let url = scrape::chapter_list_url(&self.base, &self.novel, page)?;
        let mut last_err = None;
        for attempt in 1..=LIST_FETCH_ATTEMPTS {
            match self.fetch_chapter_page_once(&url, page).await {
                Ok(parsed) => return Ok(parsed),
                Err(err) => {
                    tracing::warn!(%url, attempt, err = %format!("{err:#}"), "chapter list fetch failed");
                    last_err = Some(err);
                }
            }
            if attempt < LIST_FETCH_ATTEMPTS {
                tokio::time::sleep(LIST_RETRY_DELAY).await;
            }
        }
        let err = last_err.unwrap_or_else(|| anyhow::anyhow!("no attempts made"));
        Err(err.context(format!(
            "fetch chapter list after {LIST_FETCH_ATTEMPTS} attempts"
        )))
    }

    async fn chapter(&self, number: u32) -> anyhow::Result<Option<ChapterContent>> {
        let url = scrape::chapter_url(&self.base, &self.novel, number)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .with_context(|| format!("GET {url}"))?;
        let html = response.text().await.context("read chapter body")?;

        let paragraphs = scrape::parse_chapter_paragraphs(&html);
        if paragraphs.is_empty() {
            anyhow::bail!("could not find chapter content at {url}");
        }
        Ok(Some(ChapterContent {
            chapter_number: number,
            chapter_title: format!("Chapter {number}"),
            content: paragraphs.into_iter().map(ContentEntry::Paragraph).collect(),
            images: Vec::new(),
        }))
    }

    fn is_remote(&self) -> bool {
        true
    }
}

/// Scraped names are interpolated into URL paths.
fn is_site_slug(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

async fn fetch_text(client: &reqwest::Client, url: &Url) -> anyhow::Result<String> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("GET {url}"))?
        .error_for_status()
        .with_context(|| format!("GET {url}"))?;
    response
        .text()
        .await
        .with_context(|| format!("read body: {url}"))
}

/// Picks the source for a novel name: stored EPUBs first, then the scraped
/// site when one is configured.
pub struct SourceResolver {
    store: Arc<dyn NovelStore>,
    client: reqwest::Client,
    scrape_base: Option<Url>,
    novel_list_url: Option<Url>,
}

impl SourceResolver {
    pub fn new(
        store: Arc<dyn NovelStore>,
        client: reqwest::Client,
        scrape_base: Option<Url>,
        novel_list_url: Option<Url>,
    ) -> Self {
        Self {
            store,
            client,
            scrape_base,
            novel_list_url,
        }
    }

    pub async fn resolve(&self, novel: &str) -> anyhow::Result<Option<Box<dyn ContentSource>>> {
        if let Some(stored) = self.store.resolve(novel).await? {
            return Ok(Some(Box::new(EpubSource::new(
                Arc::clone(&self.store),
                stored,
            ))));
        }
        let Some(base) = &self.scrape_base else {
            return Ok(None);
        };
        let novel = novel.trim();
        if !is_site_slug(novel) {
            return Ok(None);
        }
        Ok(Some(Box::new(ScrapedSource::new(
            self.client.clone(),
            base.clone(),
            novel,
        ))))
    }

    /// The configured list (when reachable) followed by stored EPUB titles.
    pub async fn novel_names(&self) -> anyhow::Result<Vec<String>> {
        let mut names = Vec::new();
        if let Some(url) = &self.novel_list_url {
            match fetch_text(&self.client, url).await {
                Ok(text) => names.extend(scrape::parse_novel_list(&text)),
                Err(err) => {
                    tracing::warn!(%url, err = %format!("{err:#}"), "novel list fetch failed; listing stored novels only");
                }
            }
        }
        let stored = self.store.list().await.context("list stored novels")?;
        names.extend(stored.into_iter().map(|n| n.record.title));
        Ok(names)
    }
}
