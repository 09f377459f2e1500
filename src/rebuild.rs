use anyhow::Context as _;
use serde::Serialize;

use crate::cli::RebuildArgs;
use crate::render::RenderOptions;
use crate::story_store::{StoryName, StoryStore};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildReport {
    pub updated_pages: Vec<u32>,
    pub failed_pages: Vec<u32>,
}

/// Regenerates every `pageN.html` of a story from `json/pages.json`.
///
/// Documents saved before `showPageNumber` existed render with the page
/// number shown. A page that fails to render or write is logged and left
/// out of `updated_pages`.
pub async fn rebuild_story(
    store: &StoryStore,
    story: &StoryName,
    options: &RenderOptions,
) -> anyhow::Result<RebuildReport> {
    let pages_json = store.pages_json_path(story);
    if !tokio::fs::try_exists(&pages_json).await.unwrap_or(false) {
        anyhow::bail!("no json/pages.json found for {story}; save pages from the builder first");
    }
    let _guard = store.lock_story(story).await;
    let pages = store.load_pages(story).await.context("load pages.json")?;

    let mut report = RebuildReport::default();
    for (page, mut doc) in pages {
        doc.show_page_number.get_or_insert(true);
        match store.write_page_html(story, page, &doc, options).await {
            Ok(path) => {
                tracing::debug!(story = %story, page, path = %path.display(), "page regenerated");
                report.updated_pages.push(page);
            }
            Err(err) => {
                tracing::warn!(
                    story = %story,
                    page,
                    error = %format!("{err:#}"),
                    "page not regenerated"
                );
                report.failed_pages.push(page);
            }
        }
    }

    tracing::info!(
        story = %story,
        updated = report.updated_pages.len(),
        failed = report.failed_pages.len(),
        "rebuild finished"
    );
    Ok(report)
}

pub async fn run(args: RebuildArgs) -> anyhow::Result<()> {
    let store = StoryStore::new(&args.stories_dir);
    let stories = if args.all {
        store.list_stories().await?
    } else {
        vec![
            args.story
                .clone()
                .ok_or_else(|| anyhow::anyhow!("either --story or --all is required"))?,
        ]
    };

    let options = RenderOptions::now();
    for name in stories {
        let story = StoryName::parse(&name)?;
        let has_pages = tokio::fs::try_exists(store.pages_json_path(&story))
            .await
            .unwrap_or(false);
        if args.all && !has_pages {
            tracing::info!(story = %story, "no pages.json; skipping");
            continue;
        }
        rebuild_story(&store, &story, &options)
            .await
            .with_context(|| format!("rebuild {story}"))?;
    }
    Ok(())
}
