//! Messages exchanged between the player and the page hosted in its iframe.
//!
//! Child to parent traffic is [`HostMessage`], parent to child is
//! [`FrameCommand`]. Both travel as JSON objects tagged by `type`; anything
//! that does not decode is dropped by the receiver.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static PAGE_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"page(\d+)\.html").expect("valid page link regex"));
static URL_SCHEME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*):").expect("valid url scheme regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostMessage {
    /// Top-level navigation requested by a teleport button inside the frame.
    Teleport { url: String },
    /// Silence the player's background track before the frame leaves.
    MuteBackground,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FrameCommand {
    NextFrame,
    PreviousFrame,
    TogglePause,
    StartSlideshow,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame message: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl HostMessage {
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl FrameCommand {
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// The story folder in a `/stories/<story>/...` path.
pub fn story_name_from_path(path: &str) -> Option<&str> {
    let mut segments = path.split('/');
    segments.by_ref().find(|s| *s == "stories")?;
    segments.next().filter(|s| !s.is_empty())
}

pub fn player_url(story: &str, page: u32) -> String {
    format!("/stories/{story}/player.html?page={page}")
}

/// Page number of a `pageN.html` link, if the URL is one.
pub fn page_link_target(url: &str) -> Option<u32> {
    PAGE_LINK_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Whether a URL received from the frame may be loaded into the top window:
/// relative references and `http(s)` only.
///
/// Browsers drop tabs and newlines anywhere in a URL and ignore leading
/// control characters and spaces, so the scheme is read after doing the same.
pub fn is_navigable_url(url: &str) -> bool {
    let cleaned: String = url
        .trim_start_matches(|c: char| c <= ' ')
        .chars()
        .filter(|c| !matches!(c, '\t' | '\n' | '\r'))
        .collect();
    match URL_SCHEME_RE.captures(&cleaned).and_then(|caps| caps.get(1)) {
        Some(scheme) => {
            let scheme = scheme.as_str();
            scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
        }
        None => true,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeleportEffect {
    PostToHost(HostMessage),
    OpenWindow { url: String },
    NavigateSelf { url: String },
}

/// Where the teleport button was clicked.
#[derive(Debug, Clone, Copy)]
pub struct TeleportOrigin<'a> {
    /// `location.pathname` of the page.
    pub path: &'a str,
    /// True when the page runs inside the player's iframe.
    pub embedded: bool,
}

/// Decides what a teleport click does.
///
/// Links to another page of the story are always routed through the player
/// so that timing and auto-advance keep working; when embedded the request
/// is posted to the host, which navigates the top-level window. Other URLs
/// are opened directly, muting the host's background track first when the
/// page is embedded.
pub fn resolve_teleport(
    url: &str,
    new_window: bool,
    origin: TeleportOrigin<'_>,
) -> Vec<TeleportEffect> {
    if let Some(page) = page_link_target(url) {
        let target = player_url(story_name_from_path(origin.path).unwrap_or_default(), page);
        return if origin.embedded {
            vec![TeleportEffect::PostToHost(HostMessage::Teleport { url: target })]
        } else if new_window {
            vec![TeleportEffect::OpenWindow { url: target }]
        } else {
            vec![TeleportEffect::NavigateSelf { url: target }]
        };
    }

    if new_window {
        return vec![TeleportEffect::OpenWindow { url: url.to_owned() }];
    }
    let mut effects = Vec::with_capacity(2);
    if origin.embedded {
        effects.push(TeleportEffect::PostToHost(HostMessage::MuteBackground));
    }
    effects.push(TeleportEffect::NavigateSelf { url: url.to_owned() });
    effects
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMBEDDED: TeleportOrigin<'static> = TeleportOrigin {
        path: "/stories/forest/page2.html",
        embedded: true,
    };

    #[test]
    fn embedded_page_link_posts_player_url_to_host() -> anyhow::Result<()> {
        let effects = resolve_teleport("page3.html", false, EMBEDDED);
        let [TeleportEffect::PostToHost(msg)] = effects.as_slice() else {
            panic!("unexpected effects: {effects:?}");
        };
        assert_eq!(
            serde_json::to_value(msg)?,
            serde_json::json!({"type": "teleport", "url": "/stories/forest/player.html?page=3"})
        );
        Ok(())
    }

    #[test]
    fn standalone_page_link_respects_new_window() {
        let origin = TeleportOrigin {
            embedded: false,
            ..EMBEDDED
        };
        assert_eq!(
            resolve_teleport("./page12.html", true, origin),
            vec![TeleportEffect::OpenWindow {
                url: "/stories/forest/player.html?page=12".into()
            }]
        );
        assert_eq!(
            resolve_teleport("page1.html", false, origin),
            vec![TeleportEffect::NavigateSelf {
                url: "/stories/forest/player.html?page=1".into()
            }]
        );
    }

    #[test]
    fn external_link_mutes_host_before_leaving() {
        assert_eq!(
            resolve_teleport("https://example.com/", false, EMBEDDED),
            vec![
                TeleportEffect::PostToHost(HostMessage::MuteBackground),
                TeleportEffect::NavigateSelf {
                    url: "https://example.com/".into()
                },
            ]
        );
        assert_eq!(
            resolve_teleport("https://example.com/", true, EMBEDDED),
            vec![TeleportEffect::OpenWindow {
                url: "https://example.com/".into()
            }]
        );
    }

    #[test]
    fn only_relative_and_http_urls_are_navigable() {
        for ok in [
            "/stories/forest/player.html?page=2",
            "page2.html",
            "//cdn.example.com/x",
            "https://example.com/",
            "HTTP://example.com/",
            "search?q=a:b",
        ] {
            assert!(is_navigable_url(ok), "{ok}");
        }
        for bad in [
            "javascript:alert(1)",
            " JavaScript:alert(1)",
            "java\tscript:alert(1)",
            "\u{1}javascript:alert(1)",
            "data:text/html,<script>alert(1)</script>",
            "vbscript:msgbox",
        ] {
            assert!(!is_navigable_url(bad), "{bad:?}");
        }
    }

    #[test]
    fn story_name_is_segment_after_stories() {
        assert_eq!(story_name_from_path("/stories/a b/page1.html"), Some("a b"));
        assert_eq!(story_name_from_path("/stories/"), None);
        assert_eq!(story_name_from_path("/other/page1.html"), None);
    }

    #[test]
    fn malformed_messages_are_rejected() {
        assert!(HostMessage::decode(r#"{"type":"teleport"}"#).is_err());
        assert!(FrameCommand::decode(r#"{"type":"explode"}"#).is_err());
        assert_eq!(
            FrameCommand::decode(r#"{"type":"togglePause"}"#).ok(),
            Some(FrameCommand::TogglePause)
        );
        assert_eq!(
            HostMessage::decode(r#"{"type":"muteBackground"}"#).ok(),
            Some(HostMessage::MuteBackground)
        );
    }
}
