use std::path::PathBuf;

use anyhow::Context as _;

use crate::app::novel_store::{LocalFsNovelStore, NovelStore as _, PutOutcome};
use crate::cli::ImportArgs;
use crate::ingest::{IngestOptions, ingest_epub};

/// Ingests one EPUB into the local store and prints the stored novel id.
pub async fn run(args: ImportArgs) -> anyhow::Result<()> {
    let epub_path = PathBuf::from(&args.epub);
    let bytes = tokio::fs::read(&epub_path)
        .await
        .with_context(|| format!("read epub: {}", epub_path.display()))?;

    let options = IngestOptions {
        skip_front_matter: args.skip_front_matter,
    };
    let ingested = tokio::task::spawn_blocking(move || ingest_epub(&bytes, &options))
        .await
        .context("join ingestion task")?
        .with_context(|| format!("ingest epub: {}", epub_path.display()))?;

    let store = LocalFsNovelStore::new(&args.data_dir);
    let novel = match store.put_novel(&ingested).await.context("store novel")? {
        PutOutcome::Stored(novel) => novel,
        PutOutcome::Existing(novel) => {
            tracing::info!(novel_id = %novel.id, "novel already stored");
            novel
        }
    };

    println!("{}", novel.id);
    Ok(())
}
