//! Filesystem layout of the stories directory.
//!
//! ```text
//! <root>/<story>/page{N}.html          generated pages
//! <root>/<story>/json/pages.json       page number -> PageDocument
//! <root>/<story>/json/page-timing.json [{page, duration}]
//! <root>/<story>/json/player.json      PlayerSettings
//! <root>/<story>/media/                story assets
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use anyhow::Context as _;
use regex::Regex;
use serde::{Serialize, Serializer};
use tokio::fs;
use tokio::sync::OwnedMutexGuard;

use crate::formats::{PageDocument, PageTimingEntry, PlayerSettings, Scalar};
use crate::player::page_file_name;
use crate::render::{RenderOptions, render_page};

static PAGE_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^page(\d+)\.html$").expect("valid page file regex"));

pub const MEDIA_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "mp4", "webm", "ogg", "mov",
];

pub type PageMap = BTreeMap<u32, PageDocument>;

/// `pages.json` as stored, keys untouched.
type RawPages = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid story name: {0:?}")]
pub struct InvalidStoryName(pub String);

/// A story folder name that is safe to join onto the stories root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoryName(String);

impl StoryName {
    pub fn parse(raw: &str) -> Result<Self, InvalidStoryName> {
        let ok = !raw.is_empty()
            && !raw.starts_with('.')
            && !raw.contains(['/', '\\', '\0']);
        if ok {
            Ok(Self(raw.to_owned()))
        } else {
            Err(InvalidStoryName(raw.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn page_key(key: &str) -> Option<u32> {
    key.trim().parse().ok().filter(|page| *page >= 1)
}

/// Writes page keys in numeric order, anything else after them.
struct PageKeyOrder<'a>(&'a RawPages);

impl Serialize for PageKeyOrder<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        fn rank(key: &str) -> (u32, &str) {
            (page_key(key).unwrap_or(u32::MAX), key)
        }
        let mut entries: Vec<_> = self.0.iter().collect();
        entries.sort_by(|a, b| rank(a.0).cmp(&rank(b.0)));
        serializer.collect_map(entries)
    }
}

/// Page number from a `pageN.html` file name (case-insensitive).
pub fn page_number_from_file_name(name: &str) -> Option<u32> {
    PAGE_FILE_RE
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

type StoryLocks = HashMap<StoryName, Arc<tokio::sync::Mutex<()>>>;

#[derive(Debug, Clone)]
pub struct StoryStore {
    root: PathBuf,
    /// Serializes read-modify-write cycles on a story. Clones share it.
    locks: Arc<Mutex<StoryLocks>>,
}

impl StoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Arc::default(),
        }
    }

    /// Held while `json/pages.json` or the generated pages of `story` are
    /// being rewritten. Not reentrant.
    pub(crate) async fn lock_story(&self, story: &StoryName) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(story.clone()).or_default())
        };
        lock.lock_owned().await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn story_dir(&self, story: &StoryName) -> PathBuf {
        self.root.join(story.as_str())
    }

    fn json_dir(&self, story: &StoryName) -> PathBuf {
        self.story_dir(story).join("json")
    }

    pub fn pages_json_path(&self, story: &StoryName) -> PathBuf {
        self.json_dir(story).join("pages.json")
    }

    pub fn timing_json_path(&self, story: &StoryName) -> PathBuf {
        self.json_dir(story).join("page-timing.json")
    }

    pub fn player_json_path(&self, story: &StoryName) -> PathBuf {
        self.json_dir(story).join("player.json")
    }

    pub fn page_html_path(&self, story: &StoryName, page: u32) -> PathBuf {
        self.story_dir(story).join(page_file_name(page))
    }

    pub async fn story_exists(&self, story: &StoryName) -> bool {
        fs::metadata(self.story_dir(story))
            .await
            .is_ok_and(|m| m.is_dir())
    }

    /// Story folder names, sorted.
    pub async fn list_stories(&self) -> anyhow::Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .with_context(|| format!("read stories dir: {}", self.root.display()))?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("read stories dir entry: {}", self.root.display()))?
        {
            let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_dir && !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Numbers of the generated `pageN.html` files, ascending.
    pub async fn page_numbers(&self, story: &StoryName) -> anyhow::Result<Vec<u32>> {
        let dir = self.story_dir(story);
        let mut entries = fs::read_dir(&dir)
            .await
            .with_context(|| format!("read story dir: {}", dir.display()))?;
        let mut pages = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("read story dir entry: {}", dir.display()))?
        {
            if let Some(page) = page_number_from_file_name(&entry.file_name().to_string_lossy()) {
                pages.push(page);
            }
        }
        pages.sort_unstable();
        pages.dedup();
        Ok(pages)
    }

    pub async fn page_count(&self, story: &StoryName) -> anyhow::Result<usize> {
        Ok(self.page_numbers(story).await?.len())
    }

    async fn load_raw_pages(&self, story: &StoryName) -> anyhow::Result<RawPages> {
        let path = self.pages_json_path(story);
        Ok(read_json(&path)
            .await
            .with_context(|| format!("load {}", path.display()))?
            .unwrap_or_default())
    }

    /// `json/pages.json`; an absent file is an empty map. Keys that are not
    /// page numbers and entries that are not page objects are skipped here
    /// but stay in the file.
    pub async fn load_pages(&self, story: &StoryName) -> anyhow::Result<PageMap> {
        let mut pages = PageMap::new();
        for (key, value) in self.load_raw_pages(story).await? {
            let Some(page) = page_key(&key) else {
                tracing::warn!(story = %story, key = %key, "skipping non-numeric page key");
                continue;
            };
            match serde_json::from_value::<PageDocument>(value) {
                Ok(doc) => {
                    pages.insert(page, doc);
                }
                Err(err) => {
                    tracing::warn!(story = %story, page, error = %err, "skipping unreadable page");
                }
            }
        }
        Ok(pages)
    }

    pub async fn load_page(
        &self,
        story: &StoryName,
        page: u32,
    ) -> anyhow::Result<Option<PageDocument>> {
        Ok(self.load_pages(story).await?.remove(&page))
    }

    /// Replaces `json/pages.json` with exactly `pages`.
    pub async fn save_pages(&self, story: &StoryName, pages: &PageMap) -> anyhow::Result<()> {
        let _guard = self.lock_story(story).await;
        write_json_atomic(&self.pages_json_path(story), pages)
            .await
            .context("write pages.json")
    }

    /// Stores `doc` under `page` and regenerates `pageN.html` from it.
    /// `pageNum` is forced to match the key. Other entries of `pages.json`,
    /// including ones this crate cannot read, are written back unchanged.
    pub async fn save_page(
        &self,
        story: &StoryName,
        page: u32,
        mut doc: PageDocument,
        options: &RenderOptions,
    ) -> anyhow::Result<PathBuf> {
        doc.page_num = Some(Scalar::from(page));
        let value = serde_json::to_value(&doc).context("serialize page document")?;

        let _guard = self.lock_story(story).await;
        let mut raw = self.load_raw_pages(story).await?;
        raw.retain(|key, _| page_key(key) != Some(page));
        raw.insert(page.to_string(), value);
        write_json_atomic(&self.pages_json_path(story), &PageKeyOrder(&raw))
            .await
            .context("write pages.json")?;

        let path = self.write_page_html(story, page, &doc, options).await?;
        tracing::info!(story = %story, page, path = %path.display(), "saved page");
        Ok(path)
    }

    pub async fn write_page_html(
        &self,
        story: &StoryName,
        page: u32,
        doc: &PageDocument,
        options: &RenderOptions,
    ) -> anyhow::Result<PathBuf> {
        let html = render_page(doc, options).with_context(|| format!("render page {page}"))?;
        let path = self.page_html_path(story, page);
        write_atomic(&path, html.as_bytes()).await?;
        Ok(path)
    }

    pub async fn read_page_html(
        &self,
        story: &StoryName,
        page: u32,
    ) -> anyhow::Result<Option<String>> {
        let path = self.page_html_path(story, page);
        match fs::read_to_string(&path).await {
            Ok(html) => Ok(Some(html)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
        }
    }

    pub async fn load_timing(&self, story: &StoryName) -> anyhow::Result<Vec<PageTimingEntry>> {
        let path = self.timing_json_path(story);
        Ok(read_json(&path)
            .await
            .with_context(|| format!("load {}", path.display()))?
            .unwrap_or_default())
    }

    pub async fn save_timing(
        &self,
        story: &StoryName,
        entries: &[PageTimingEntry],
    ) -> anyhow::Result<()> {
        write_json_atomic(&self.timing_json_path(story), entries)
            .await
            .context("write page-timing.json")
    }

    pub async fn load_player_settings(&self, story: &StoryName) -> anyhow::Result<PlayerSettings> {
        let path = self.player_json_path(story);
        Ok(read_json(&path)
            .await
            .with_context(|| format!("load {}", path.display()))?
            .unwrap_or_default())
    }

    pub async fn save_player_settings(
        &self,
        story: &StoryName,
        settings: &PlayerSettings,
    ) -> anyhow::Result<()> {
        write_json_atomic(&self.player_json_path(story), settings)
            .await
            .context("write player.json")
    }

    /// Every media file under the story, as `/`-separated relative paths.
    pub async fn list_media(&self, story: &StoryName) -> anyhow::Result<Vec<String>> {
        let base = self.story_dir(story);
        let mut found = Vec::new();
        let mut pending = vec![(base.clone(), String::new())];
        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!(
                        dir = %dir.display(),
                        error = %err,
                        "skipping unreadable media dir"
                    );
                    continue;
                }
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .with_context(|| format!("read media dir entry: {}", dir.display()))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                let rel = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}/{name}")
                };
                let Ok(file_type) = entry.file_type().await else {
                    continue;
                };
                if file_type.is_dir() {
                    pending.push((entry.path(), rel));
                } else if file_type.is_file() && is_media_file(&name) {
                    found.push(rel);
                }
            }
        }
        found.sort();
        Ok(found)
    }
}

fn is_media_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| MEDIA_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_slice(&bytes).context("parse json")?;
    Ok(Some(value))
}

pub(crate) async fn write_json_atomic<T: serde::Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> anyhow::Result<()> {
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    write_atomic(path, &data).await
}

/// Writes to a sibling temp file, then renames over `path`.
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    fs::write(&tmp_path, data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
