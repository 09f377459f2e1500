use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Render one page document to HTML.
    Render(RenderArgs),
    /// Regenerate story pages from `json/pages.json`.
    Rebuild(RebuildArgs),
    /// Derive auto-advance durations from narration audio.
    Timing(TimingArgs),
    /// Recover `json/pages.json` from previously generated pages.
    Extract(ExtractArgs),
    /// List the slideshow frames of an animation folder.
    Frames(FramesArgs),
}

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// A page document, or a `pages.json` map (with `--page`).
    #[arg(long)]
    pub input: String,

    /// Page to pick from a `pages.json` map.
    #[arg(long)]
    pub page: Option<u32>,

    /// Output HTML file (stdout when omitted).
    #[arg(long)]
    pub out: Option<String>,

    /// Leave out title, narration, conversation and buttons.
    #[arg(long, default_value_t = false)]
    pub no_subtitles: bool,

    /// Cache-busting version for asset URLs (defaults to the current time).
    #[arg(long)]
    pub asset_version: Option<String>,
}

#[derive(Debug, Args)]
pub struct RebuildArgs {
    #[arg(long, default_value = "stories")]
    pub stories_dir: String,

    /// Story folder to rebuild.
    #[arg(long, conflicts_with = "all")]
    pub story: Option<String>,

    /// Rebuild every story that has a `json/pages.json`.
    #[arg(long, default_value_t = false)]
    pub all: bool,
}

#[derive(Debug, Args)]
pub struct TimingArgs {
    #[arg(long, default_value = "stories")]
    pub stories_dir: String,

    #[arg(long)]
    pub story: String,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    #[arg(long, default_value = "stories")]
    pub stories_dir: String,

    #[arg(long)]
    pub story: String,

    /// Overwrite an existing `json/pages.json`.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FrameDiscovery {
    Manifest,
    Probe,
}

#[derive(Debug, Args)]
pub struct FramesArgs {
    #[arg(long, default_value = "stories")]
    pub stories_dir: String,

    #[arg(long)]
    pub story: String,

    /// Animation folder, relative to the story.
    #[arg(long)]
    pub folder: String,

    /// Discovery strategy (defaults to `STORYBOOK_FRAME_DISCOVERY`, then manifest).
    #[arg(long, value_enum)]
    pub mode: Option<FrameDiscovery>,
}
