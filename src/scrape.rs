//! HTML parsing for the scraped chapter source.
//!
//! Only parsing lives here; fetching, retries and pagination of stored novels
//! are in `app::source`.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::extract::collapse_whitespace;
use crate::formats::{ChapterPage, ChapterSummary};

const BOILERPLATE_PREFIXES: &[&str] = &["If you find any errors", "Search the NovelFire.net"];

static CHAPTER_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"chapter-(\d+)").expect("valid chapter href regex"));
static PAGE_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"page=(\d+)").expect("valid page href regex"));

static ANCHORS: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static PARAGRAPHS: LazyLock<Selector> = LazyLock::new(|| selector("p"));
// Tried in order; the first selector with a match wins, not the first
// element in document order.
static CONTENT_CONTAINERS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        "div.chapter-content",
        "div#chapter-content",
        "div.text-left",
        "div.chapter-content-inner",
        "div.elementor-widget-container",
    ])
});
static FALLBACK_CONTAINERS: LazyLock<Vec<Selector>> =
    LazyLock::new(|| selectors(&["main", "article", "body"]));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid css selector")
}

fn selectors(css: &[&str]) -> Vec<Selector> {
    css.iter().map(|css| selector(css)).collect()
}

fn first_match<'a>(document: &'a Html, candidates: &[Selector]) -> Option<ElementRef<'a>> {
    candidates
        .iter()
        .find_map(|candidate| document.select(candidate).next())
}

/// `{base}/book/{novel}/chapters`, with `?page=N` past the first page.
pub fn chapter_list_url(base: &Url, novel: &str, page: u32) -> anyhow::Result<Url> {
    let mut url = base.join(&format!("book/{novel}/chapters"))?;
    if page > 1 {
        url.query_pairs_mut().append_pair("page", &page.to_string());
    }
    Ok(url)
}

pub fn chapter_url(base: &Url, novel: &str, number: u32) -> anyhow::Result<Url> {
    Ok(base.join(&format!("book/{novel}/chapter-{number}"))?)
}

pub fn parse_chapter_list(html: &str, base: &Url, requested_page: u32) -> ChapterPage {
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut chapters = Vec::new();
    let mut total_pages = 1u32;
    for anchor in document.select(&ANCHORS) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if let Some(page) = capture_number(&PAGE_HREF, href) {
            total_pages = total_pages.max(page);
        }
        let Some(number) = capture_number(&CHAPTER_HREF, href) else {
            continue;
        };
        if !seen.insert(number) {
            continue;
        }
        let title = collapse_whitespace(&anchor.text().collect::<String>());
        chapters.push(ChapterSummary {
            chapter_number: number,
            chapter_title: if title.is_empty() {
                format!("Chapter {number}")
            } else {
                title
            },
            link: base.join(href).ok().map(String::from),
        });
    }

    ChapterPage {
        chapters,
        total_pages: total_pages.max(requested_page),
        current_page: requested_page,
    }
}

/// Non-empty paragraph texts of a chapter page.
pub fn parse_chapter_paragraphs(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);

    if let Some(container) = first_match(&document, &CONTENT_CONTAINERS) {
        let paragraphs = paragraph_texts(container);
        if !paragraphs.is_empty() {
            return paragraphs;
        }
        let loose = container
            .text()
            .map(collapse_whitespace)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>();
        if !loose.is_empty() {
            return loose;
        }
    }

    let Some(fallback) = first_match(&document, &FALLBACK_CONTAINERS) else {
        return Vec::new();
    };
    paragraph_texts(fallback)
        .into_iter()
        .filter(|p| !BOILERPLATE_PREFIXES.iter().any(|b| p.starts_with(b)))
        .collect()
}

/// One novel name per non-blank line.
pub fn parse_novel_list(text: &str) -> Vec<String> {
    text.trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

fn paragraph_texts(container: ElementRef<'_>) -> Vec<String> {
    container
        .select(&PARAGRAPHS)
        .map(|p| collapse_whitespace(&p.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .collect()
}

fn capture_number(re: &Regex, haystack: &str) -> Option<u32> {
    re.captures(haystack)?.get(1)?.as_str().parse().ok()
}
