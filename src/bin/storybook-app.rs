use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;

use storybook::app::server::{AppState, router};
use storybook::favorites::FavoritesStore;
use storybook::probe::FfprobeProbe;
use storybook::render::RenderOptions;
use storybook::slideshow::DiscoveryMode;
use storybook::story_store::StoryStore;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:1976")]
    addr: SocketAddr,

    /// Directory holding one folder per story.
    #[arg(long, default_value = "stories")]
    stories_dir: PathBuf,

    /// Favorites file (defaults to `<stories-dir>/favorites.json`).
    #[arg(long)]
    favorites: Option<PathBuf>,
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
    storybook::logging::init()?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting storybook-app");

    let favorites = args
        .favorites
        .clone()
        .unwrap_or_else(|| args.stories_dir.join("favorites.json"));
    let discovery = DiscoveryMode::from_env().context("read frame discovery mode")?;
    let render = RenderOptions::now();
    tracing::info!(
        stories_dir = %args.stories_dir.display(),
        favorites = %favorites.display(),
        ?discovery,
        asset_version = %render.asset_version,
        "serving stories"
    );

    let state = AppState {
        stories: StoryStore::new(&args.stories_dir),
        favorites: FavoritesStore::new(favorites),
        probe: Arc::new(FfprobeProbe::from_env()),
        discovery,
        render,
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
