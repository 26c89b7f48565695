use std::fs::OpenOptions;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::assemble::assemble_chapters;
use crate::cli::IngestArgs;
use crate::extract::{ImageLookup, extract_unit};
use crate::formats::{Chapter, ImageAsset, NovelRecord};
use crate::images::normalize_images;
use crate::package::{Package, open_package};

/// Fatal ingestion failures. Both are client input errors.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("malformed package: {0}")]
    MalformedPackage(String),
    #[error("package contains no readable chapters")]
    EmptyPackage,
}

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Drop cover/toc/nav/copyright documents from the reading order before
    /// chapters are numbered.
    pub skip_front_matter: bool,
}

/// The three co-equal outputs handed to storage.
#[derive(Debug, Clone)]
pub struct IngestedNovel {
    pub novel: NovelRecord,
    pub chapters: Vec<Chapter>,
    pub images: Vec<ImageAsset>,
}

pub fn ingest_epub(bytes: &[u8], options: &IngestOptions) -> Result<IngestedNovel, IngestError> {
    let Package {
        title,
        author,
        units,
        images,
    } = open_package(bytes, options)?;

    let images = normalize_images(images);
    let lookup = ImageLookup::new(&images);
    let extracted = units
        .iter()
        .map(|unit| extract_unit(&unit.path, &unit.markup, &lookup))
        .collect::<Vec<_>>();
    let chapters = assemble_chapters(extracted, &images)?;

    let ingested = build_novel_record(title, author, chapters, images);
    tracing::info!(
        title = %ingested.novel.title,
        author = %ingested.novel.author,
        chapters = ingested.novel.chapter_count,
        images = ingested.novel.image_count,
        "ingested package"
    );
    Ok(ingested)
}

pub fn build_novel_record(
    title: String,
    author: String,
    chapters: Vec<Chapter>,
    images: Vec<ImageAsset>,
) -> IngestedNovel {
    let novel = NovelRecord {
        title,
        author,
        chapter_count: chapters.len(),
        has_images: !images.is_empty(),
        image_count: images.len(),
    };
    IngestedNovel {
        novel,
        chapters,
        images,
    }
}

pub fn run(args: IngestArgs) -> anyhow::Result<()> {
    let epub_path = PathBuf::from(&args.epub);
    let out_dir = PathBuf::from(&args.out);

    if out_dir.exists() {
        anyhow::bail!("ingest output directory already exists: {}", out_dir.display());
    }

    let bytes = std::fs::read(&epub_path)
        .with_context(|| format!("read epub: {}", epub_path.display()))?;
    let options = IngestOptions {
        skip_front_matter: args.skip_front_matter,
    };
    let ingested = ingest_epub(&bytes, &options)
        .with_context(|| format!("ingest epub: {}", epub_path.display()))?;

    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("create ingest output dir: {}", out_dir.display()))?;

    let novel_path = out_dir.join("novel.json");
    let novel_json =
        serde_json::to_vec_pretty(&ingested.novel).context("serialize novel record")?;
    std::fs::write(&novel_path, novel_json)
        .with_context(|| format!("write novel record: {}", novel_path.display()))?;

    write_jsonl(&out_dir.join("chapters.jsonl"), &ingested.chapters)?;
    write_jsonl(&out_dir.join("images.jsonl"), &ingested.images)?;

    println!(
        "{} by {}: {} chapters, {} images",
        ingested.novel.title,
        ingested.novel.author,
        ingested.novel.chapter_count,
        ingested.novel.image_count
    );
    Ok(())
}

fn write_jsonl<T: serde::Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(path)
        .with_context(|| format!("create: {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut out, record)
            .with_context(|| format!("serialize record: {}", path.display()))?;
        out.write_all(b"\n").context("write jsonl newline")?;
    }
    out.flush()
        .with_context(|| format!("flush: {}", path.display()))?;
    Ok(())
}
