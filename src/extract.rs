//! Recovering the PageDocument embedded in a generated page.

use std::sync::LazyLock;

use anyhow::Context as _;
use regex::Regex;

use crate::cli::ExtractArgs;
use crate::formats::PageDocument;
use crate::story_store::{PageMap, StoryName, StoryStore};

static PAGE_DATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<script id="pageData" type="application/json">(.*?)</script>"#)
        .expect("valid page data regex")
});

/// Pages written before the data/runtime split assigned a script variable.
static LEGACY_PAGE_DATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"var pageData\s*=\s*(\{[\s\S]*?\});\s*(?:</script>|var\b|function\b|document\b)")
        .expect("valid legacy page data regex")
});

pub fn extract_document(html: &str) -> anyhow::Result<PageDocument> {
    if let Some(caps) = PAGE_DATA_RE.captures(html) {
        let json = caps.get(1).map_or("", |m| m.as_str());
        return serde_json::from_str(json).context("parse embedded page data");
    }
    if let Some(caps) = LEGACY_PAGE_DATA_RE.captures(html) {
        let json = caps.get(1).map_or("", |m| m.as_str());
        return serde_json::from_str(json).context("parse legacy page data");
    }
    anyhow::bail!("no embedded page data found")
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub extracted: Vec<u32>,
    pub skipped: Vec<u32>,
}

/// Rebuilds `json/pages.json` from the story's generated pages.
pub async fn migrate_story(
    store: &StoryStore,
    story: &StoryName,
    force: bool,
) -> anyhow::Result<MigrationReport> {
    let pages_json = store.pages_json_path(story);
    if !force && tokio::fs::try_exists(&pages_json).await.unwrap_or(false) {
        anyhow::bail!(
            "pages.json already exists (pass --force to overwrite): {}",
            pages_json.display()
        );
    }

    let mut report = MigrationReport::default();
    let mut pages = PageMap::new();
    for page in store.page_numbers(story).await? {
        let Some(html) = store.read_page_html(story, page).await? else {
            report.skipped.push(page);
            continue;
        };
        match extract_document(&html) {
            Ok(doc) => {
                pages.insert(page, doc);
                report.extracted.push(page);
            }
            Err(err) => {
                tracing::warn!(story = %story, page, error = %format!("{err:#}"), "skipping page");
                report.skipped.push(page);
            }
        }
    }

    if pages.is_empty() {
        anyhow::bail!("no page data found in any page of {story}");
    }
    store.save_pages(story, &pages).await?;
    Ok(report)
}

pub async fn run(args: ExtractArgs) -> anyhow::Result<()> {
    let store = StoryStore::new(&args.stories_dir);
    let story = StoryName::parse(&args.story)?;
    let report = migrate_story(&store, &story, args.force)
        .await
        .with_context(|| format!("migrate {story}"))?;
    tracing::info!(
        story = %story,
        extracted = report.extracted.len(),
        skipped = ?report.skipped,
        "wrote json/pages.json"
    );
    Ok(())
}
