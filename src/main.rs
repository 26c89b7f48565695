use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    novel_reader::logging::init().context("init logging")?;

    let cli = novel_reader::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        novel_reader::cli::Command::Ingest(args) => {
            tokio::task::block_in_place(|| novel_reader::ingest::run(args)).context("ingest")?;
        }
        novel_reader::cli::Command::Import(args) => {
            novel_reader::import::run(args).await.context("import")?;
        }
    }

    Ok(())
}
