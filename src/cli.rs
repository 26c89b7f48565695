use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert an EPUB into novel.json / chapters.jsonl / images.jsonl.
    Ingest(IngestArgs),
    /// Ingest an EPUB straight into the data directory served by the app.
    Import(ImportArgs),
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Path to the `.epub` file.
    #[arg(long)]
    pub epub: String,

    /// Output directory (must not exist).
    #[arg(long)]
    pub out: String,

    /// Drop cover/toc/nav/copyright documents before numbering chapters.
    #[arg(long, default_value_t = false)]
    pub skip_front_matter: bool,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Path to the `.epub` file.
    #[arg(long)]
    pub epub: String,

    /// Data directory of `novel-reader-app`.
    #[arg(long, default_value = "data")]
    pub data_dir: String,

    #[arg(long, default_value_t = false)]
    pub skip_front_matter: bool,
}
