use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A loosely typed scalar from the builder form.
///
/// The builder posts numbers and strings interchangeably (`80` or `"80"`).
/// Values are kept exactly as received so that a page round-trips through
/// `pages.json` and the generated HTML without drifting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(serde_json::Number),
    Text(String),
}

impl Scalar {
    /// Numeric coercion with the same leniency as the browser: blank text is
    /// zero, anything unparsable is NaN.
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Number(n) => n.as_f64().unwrap_or(f64::NAN),
            Self::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    0.0
                } else {
                    s.parse().unwrap_or(f64::NAN)
                }
            }
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Text(s) if s.trim().is_empty())
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => match n.as_f64() {
                Some(v) if n.is_f64() => f.write_str(&format_number(v)),
                _ => write!(f, "{n}"),
            },
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<u32> for Scalar {
    fn from(value: u32) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// Formats a number the way it reads in CSS: integral values drop the
/// fractional part (`10`, not `10.0`).
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Field parsers for builder documents. A value of the wrong JSON kind is
/// coerced when there is an obvious reading and treated as absent otherwise,
/// so one odd field never rejects the whole page.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::{Scalar, TeleportButton};

    pub fn text<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(de)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    pub fn flag<'de, D: Deserializer<'de>>(de: D) -> Result<Option<bool>, D::Error> {
        Ok(match Value::deserialize(de)? {
            Value::Bool(b) => Some(b),
            Value::Number(n) => n.as_f64().map(|v| v != 0.0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" | "" => Some(false),
                _ => None,
            },
            _ => None,
        })
    }

    pub fn scalar<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Scalar>, D::Error> {
        Ok(match Value::deserialize(de)? {
            Value::Number(n) => Some(Scalar::Number(n)),
            Value::String(s) => Some(Scalar::Text(s)),
            Value::Bool(b) => Some(Scalar::Text(b.to_string())),
            _ => None,
        })
    }

    /// Entries that are not button objects are dropped.
    pub fn buttons<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<Option<Vec<TeleportButton>>, D::Error> {
        let Value::Array(items) = Value::deserialize(de)? else {
            return Ok(None);
        };
        let buttons = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(button) => Some(button),
                Err(err) => {
                    tracing::warn!(error = %err, "dropping malformed teleport button");
                    None
                }
            })
            .collect();
        Ok(Some(buttons))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageDocument {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::scalar")]
    pub page_num: Option<Scalar>,

    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub bg_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::scalar")]
    pub bg_scale: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::scalar")]
    pub bg_wid: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::scalar")]
    pub bg_pos: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::scalar")]
    pub bg_start: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::scalar")]
    pub bg_end: Option<Scalar>,

    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub fg_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::scalar")]
    pub fg_scale: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::scalar")]
    pub fg_wid: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::scalar")]
    pub fg_pos: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::scalar")]
    pub fg_start: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::scalar")]
    pub fg_end: Option<Scalar>,

    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub audio_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub title_pos: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::flag")]
    pub show_page_number: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub descript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub descript_pos: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub conv1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::scalar")]
    pub conv1_pos_l: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::scalar")]
    pub conv1_pos_t: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub conv2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::scalar")]
    pub conv2_pos_l: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::scalar")]
    pub conv2_pos_t: Option<Scalar>,

    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::buttons")]
    pub teleport_buttons: Option<Vec<TeleportButton>>,

    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub animation_folder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::scalar")]
    pub animation_interval: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::scalar")]
    pub animation_scale: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::scalar")]
    pub animation_position: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub animation_audio: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub scene_bg_color: Option<String>,

    /// Builder fields this crate does not interpret (kept for round-trips).
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl PageDocument {
    /// The page number carried inside the document, if it parses.
    pub fn page_number(&self) -> Option<u32> {
        let value = self.page_num.as_ref()?.as_f64();
        (value.is_finite() && value >= 1.0 && value.fract() == 0.0).then_some(value as u32)
    }

    pub fn has_animation(&self) -> bool {
        self.animation_folder
            .as_deref()
            .is_some_and(|f| !f.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TeleportButton {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::flag")]
    pub new_window: Option<bool>,
    #[serde(rename = "loop", skip_serializing_if = "Option::is_none")]
    #[serde(deserialize_with = "lenient::flag")]
    pub loop_flag: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTimingEntry {
    pub page: u32,
    #[serde(rename = "duration")]
    pub duration_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerSettings {
    pub story_title: String,
    pub player_bg_audio: String,
    pub scene_bg_color: String,
    pub controls_bg_color: String,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            story_title: String::new(),
            player_bg_audio: "media/music.m4a".to_owned(),
            scene_bg_color: "#ffffff".to_owned(),
            controls_bg_color: "#000000".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteList {
    pub name: String,
    pub stories: Vec<String>,
    pub created_at: i64,
}

pub type Favorites = BTreeMap<String, FavoriteList>;
