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
    storybook::logging::init().context("init logging")?;

    let cli = storybook::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        storybook::cli::Command::Render(args) => {
            storybook::render::run(args).context("render")?;
        }
        storybook::cli::Command::Rebuild(args) => {
            storybook::rebuild::run(args).await.context("rebuild")?;
        }
        storybook::cli::Command::Timing(args) => {
            storybook::timing::run(args).await.context("timing")?;
        }
        storybook::cli::Command::Extract(args) => {
            storybook::extract::run(args).await.context("extract")?;
        }
        storybook::cli::Command::Frames(args) => {
            storybook::slideshow::run(args).context("frames")?;
        }
    }

    Ok(())
}
