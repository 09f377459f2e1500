//! Auto-advance durations derived from each page's narration audio.
//!
//! The table is only rebuilt on request, so it goes stale when audio files
//! change in between.

use anyhow::Context as _;

use crate::cli::TimingArgs;
use crate::formats::PageTimingEntry;
use crate::player::DEFAULT_PAGE_DURATION_SECS;
use crate::probe::{DurationProbe, FfprobeProbe};
use crate::story_store::{StoryName, StoryStore};

/// `ceil(seconds) + 1`, or the default for unusable probe output.
pub fn duration_from_seconds(seconds: f64) -> u32 {
    if !seconds.is_finite() || seconds < 0.0 {
        return DEFAULT_PAGE_DURATION_SECS;
    }
    let whole = seconds.ceil();
    if whole >= f64::from(u32::MAX - 1) {
        return u32::MAX;
    }
    whole as u32 + 1
}

/// Probes `media/{page}.mp3` for every generated page, in page order.
/// Per-page failures fall back to the default duration.
pub async fn derive_story_timing(
    store: &StoryStore,
    story: &StoryName,
    probe: &dyn DurationProbe,
) -> anyhow::Result<Vec<PageTimingEntry>> {
    let pages = store
        .page_numbers(story)
        .await
        .with_context(|| format!("list pages of {story}"))?;
    let media_dir = store.story_dir(story).join("media");

    let mut entries = Vec::with_capacity(pages.len());
    for page in pages {
        let audio = media_dir.join(format!("{page}.mp3"));
        let duration_seconds = if tokio::fs::try_exists(&audio).await.unwrap_or(false) {
            match probe.probe_seconds(&audio).await {
                Ok(seconds) => duration_from_seconds(seconds),
                Err(err) => {
                    tracing::warn!(
                        story = %story,
                        page,
                        path = %audio.display(),
                        error = %format!("{err:#}"),
                        "duration probe failed; using default"
                    );
                    DEFAULT_PAGE_DURATION_SECS
                }
            }
        } else {
            tracing::debug!(story = %story, page, "no narration audio; using default");
            DEFAULT_PAGE_DURATION_SECS
        };
        entries.push(PageTimingEntry {
            page,
            duration_seconds,
        });
    }
    entries.sort_by_key(|e| e.page);
    Ok(entries)
}

/// Derives the table and persists it to `json/page-timing.json`.
pub async fn generate(
    store: &StoryStore,
    story: &StoryName,
    probe: &dyn DurationProbe,
) -> anyhow::Result<Vec<PageTimingEntry>> {
    let entries = derive_story_timing(store, story, probe).await?;
    store.save_timing(story, &entries).await?;
    tracing::info!(story = %story, pages = entries.len(), "page timing generated");
    Ok(entries)
}

pub async fn run(args: TimingArgs) -> anyhow::Result<()> {
    let store = StoryStore::new(&args.stories_dir);
    let story = StoryName::parse(&args.story)?;
    if !store.story_exists(&story).await {
        anyhow::bail!("story not found: {}", store.story_dir(&story).display());
    }
    let probe = FfprobeProbe::from_env();
    let entries = generate(&store, &story, &probe).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&entries).context("serialize timing")?
    );
    Ok(())
}
