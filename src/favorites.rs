use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::formats::Favorites;
use crate::story_store::{read_json, write_json_atomic};

/// `favorites.json`: list name -> named list of story folders.
#[derive(Debug, Clone)]
pub struct FavoritesStore {
    path: PathBuf,
}

impl FavoritesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// An absent file is an empty map.
    pub async fn load(&self) -> anyhow::Result<Favorites> {
        Ok(read_json(&self.path)
            .await
            .with_context(|| format!("load favorites: {}", self.path.display()))?
            .unwrap_or_default())
    }

    pub async fn save(&self, favorites: &Favorites) -> anyhow::Result<()> {
        for (key, list) in favorites {
            if key.trim().is_empty() {
                anyhow::bail!("favorite list names must not be blank");
            }
            if list.stories.iter().any(|s| s.trim().is_empty()) {
                anyhow::bail!("favorite list {key:?} contains a blank story name");
            }
        }
        write_json_atomic(&self.path, favorites)
            .await
            .with_context(|| format!("write favorites: {}", self.path.display()))?;
        tracing::info!(lists = favorites.len(), "favorites saved");
        Ok(())
    }
}
