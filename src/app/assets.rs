//! Browser runtime shipped inside the binary and served under `/assets/`.

use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Asset {
    pub content_type: &'static str,
    pub body: &'static str,
}

const PAGE_RUNTIME_JS: &str = include_str!("../../assets/page-runtime.js");
const PLAYER_RUNTIME_JS: &str = include_str!("../../assets/player-runtime.js");
const PAGE_CSS: &str = include_str!("../../assets/page.css");
const PLAYER_CSS: &str = include_str!("../../assets/player.css");

const JS: &str = "text/javascript; charset=utf-8";
const CSS: &str = "text/css; charset=utf-8";

pub fn lookup(name: &str) -> Option<Asset> {
    let (content_type, body) = match name {
        "page-runtime.js" => (JS, PAGE_RUNTIME_JS),
        "player-runtime.js" => (JS, PLAYER_RUNTIME_JS),
        "page.css" => (CSS, PAGE_CSS),
        "player.css" => (CSS, PLAYER_CSS),
        _ => return None,
    };
    Some(Asset { content_type, body })
}

impl IntoResponse for Asset {
    fn into_response(self) -> Response {
        let mut resp = self.body.into_response();
        resp.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(self.content_type),
        );
        // URLs carry a `?v=` version, so clients may keep a copy.
        resp.headers_mut().insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=86400"),
        );
        resp
    }
}
