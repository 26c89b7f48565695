use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;

use novel_reader::app::config::AppConfig;
use novel_reader::app::novel_store::{LocalFsNovelStore, NovelStore};
use novel_reader::app::routes::{AppState, router};
use novel_reader::app::source::SourceResolver;
use novel_reader::app::user_store::{LocalFsUserStore, UserStore};
use novel_reader::tts::SpeechSynthesizer;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Novels and user accounts live under this directory.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Largest accepted upload, in MiB.
    #[arg(long, default_value_t = 64)]
    max_upload_mb: usize,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    novel_reader::logging::init_with_default("info,tower_http=info")?;

    let args = AppArgs::parse();
    let config = AppConfig::from_env().context("load config")?;
    tracing::info!(?args, ?config, "starting novel-reader-app");

    let client = config.http_client()?;
    let novels: Arc<dyn NovelStore> = Arc::new(LocalFsNovelStore::new(&args.data_dir));
    let users: Arc<dyn UserStore> = Arc::new(LocalFsUserStore::new(&args.data_dir));
    let speech: Arc<dyn SpeechSynthesizer> = Arc::new(config.speech(client.clone()));
    if config.tts.api_key.is_none() {
        tracing::warn!("no speech API key configured; /tts will return 502");
    }
    if config.scrape_base_url.is_none() {
        tracing::info!("scraped source disabled; only stored EPUB novels are served");
    }
    let sources = Arc::new(SourceResolver::new(
        Arc::clone(&novels),
        client,
        config.scrape_base_url.clone(),
        config.novel_list_url.clone(),
    ));

    let state = AppState {
        novels,
        users,
        sources,
        speech,
    };
    let app = router(state, args.max_upload_mb.saturating_mul(1024 * 1024));

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(%err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
