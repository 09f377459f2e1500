use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt as _;
use tower::ServiceExt as _;

use storybook::app::server::{AppState, router};
use storybook::favorites::FavoritesStore;
use storybook::probe::DurationProbe;
use storybook::render::RenderOptions;
use storybook::slideshow::DiscoveryMode;
use storybook::story_store::StoryStore;

/// Every narration track is 4.5 seconds long.
struct FixedProbe;

#[async_trait]
impl DurationProbe for FixedProbe {
    async fn probe_seconds(&self, _path: &Path) -> anyhow::Result<f64> {
        Ok(4.5)
    }
}

fn state(root: &Path) -> AppState {
    AppState {
        stories: StoryStore::new(root),
        favorites: FavoritesStore::new(root.join("favorites.json")),
        probe: Arc::new(FixedProbe),
        discovery: DiscoveryMode::Manifest,
        render: RenderOptions::new("test"),
    }
}

fn seed_story(root: &Path) {
    let story = root.join("forest");
    fs::create_dir_all(story.join("media/walk")).expect("create media dirs");
    fs::write(story.join("media/1.mp3"), b"id3").expect("write audio");
    for frame in ["1.png", "2.png"] {
        fs::write(story.join("media/walk").join(frame), b"png").expect("write frame");
    }
}

async fn send(root: &Path, req: Request<Body>) -> (StatusCode, String) {
    let resp = router(state(root)).oneshot(req).await.expect("route request");
    let status = resp.status();
    let bytes = resp
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request")
}

fn json(body: &str) -> serde_json::Value {
    serde_json::from_str(body).expect("json body")
}

#[tokio::test]
async fn healthz_responds_ok() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (status, body) = send(dir.path(), get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok\n");
}

#[tokio::test]
async fn saving_a_page_regenerates_its_html_and_counts_it() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed_story(dir.path());

    let doc = serde_json::json!({
        "pageNum": 7,
        "bgUrl": "media/1.mp4",
        "bgScale": 80,
        "bgPos": 50,
        "titlePos": "top",
        "title": "Intro",
        "showPageNumber": true
    });
    let (status, body) = send(
        dir.path(),
        post_json("/api/stories/forest/page-data/1", doc),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(json(&body)["success"], true);

    let (_, body) = send(dir.path(), get("/api/stories/forest/page-data/1")).await;
    assert_eq!(json(&body)["pageNum"], 1);

    let (_, body) = send(dir.path(), get("/api/stories/forest/pages")).await;
    assert_eq!(json(&body), serde_json::json!({"pageCount": 1}));

    let (status, html) = send(dir.path(), get("/stories/forest/page1.html")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains(r#"<video id="bgVideo""#));
    assert!(html.contains("Intro&nbsp;1"));

    let (_, stripped) = send(
        dir.path(),
        get("/stories/forest/page1.html?noSubtitles=1"),
    )
    .await;
    assert!(stripped.contains(r#"<video id="bgVideo""#));
    assert!(!stripped.contains(r#"class="title""#));
}

#[tokio::test]
async fn malformed_page_payloads_are_bad_requests() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed_story(dir.path());

    let req = Request::builder()
        .method("POST")
        .uri("/api/stories/forest/page-data/1")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .expect("build request");
    let (status, body) = send(dir.path(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["success"], false);

    let (status, _) = send(
        dir.path(),
        post_json("/api/stories/forest/page-data/0", serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn mistyped_page_fields_are_saved_not_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed_story(dir.path());

    let doc = serde_json::json!({"title": 5, "showPageNumber": "true", "titlePos": "top"});
    let (status, body) = send(
        dir.path(),
        post_json("/api/stories/forest/page-data/2", doc),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (_, html) = send(dir.path(), get("/stories/forest/page2.html")).await;
    assert!(html.contains("5&nbsp;2"), "{html}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_page_saves_all_land_in_pages_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed_story(dir.path());
    let app = router(state(dir.path()));

    let saves: Vec<_> = (1..=6)
        .map(|page| {
            let app = app.clone();
            tokio::spawn(async move {
                let uri = format!("/api/stories/forest/page-data/{page}");
                let doc = serde_json::json!({"title": format!("Page {page}")});
                app.oneshot(post_json(&uri, doc)).await.expect("route request").status()
            })
        })
        .collect();
    for save in saves {
        assert_eq!(save.await.expect("join save"), StatusCode::OK);
    }

    let (_, body) = send(dir.path(), get("/api/stories/forest/pages")).await;
    assert_eq!(json(&body), serde_json::json!({"pageCount": 6}));
    let stored: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(dir.path().join("forest/json/pages.json")).expect("read pages.json"),
    )
    .expect("parse pages.json");
    for page in 1..=6 {
        assert_eq!(stored[page.to_string()]["title"], format!("Page {page}"));
    }
}

#[tokio::test]
async fn unknown_stories_are_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (status, body) = send(dir.path(), get("/api/stories/nowhere/pages")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["success"], false);

    let (status, _) = send(dir.path(), get("/stories/nowhere/player.html")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn timing_route_probes_and_persists() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed_story(dir.path());
    for page in [1, 2] {
        fs::write(
            dir.path().join(format!("forest/page{page}.html")),
            "<html></html>",
        )
        .expect("write page");
    }

    let (status, body) = send(
        dir.path(),
        Request::builder()
            .method("POST")
            .uri("/api/stories/forest/timing")
            .body(Body::empty())
            .expect("build request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(
        json(&body)["data"],
        serde_json::json!([{"page": 1, "duration": 6}, {"page": 2, "duration": 10}])
    );
    assert!(dir.path().join("forest/json/page-timing.json").is_file());
}

#[tokio::test]
async fn player_page_embeds_boot_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed_story(dir.path());
    for page in 1..=3 {
        fs::write(
            dir.path().join(format!("forest/page{page}.html")),
            "<html></html>",
        )
        .expect("write page");
    }

    let (status, html) = send(dir.path(), get("/stories/forest/player.html?page=3")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains(r#"src="page3.html""#));
    assert!(html.contains(r#""totalPages":3"#));
    assert!(html.contains("/assets/player-runtime.js?v=test"));

    let (_, html) = send(dir.path(), get("/stories/forest/player.html?page=99")).await;
    assert!(html.contains(r#"src="page1.html""#));
}

#[tokio::test]
async fn frames_route_lists_the_animation_folder() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed_story(dir.path());

    let (status, body) = send(
        dir.path(),
        get("/api/stories/forest/frames?folder=media/walk"),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let body = json(&body);
    assert_eq!(body["count"], 2);
    let mut images: Vec<String> =
        serde_json::from_value(body["images"].clone()).expect("image list");
    images.sort();
    assert_eq!(images, vec!["media/walk/1.png", "media/walk/2.png"]);

    let (status, _) = send(
        dir.path(),
        get("/api/stories/forest/frames?folder=../../etc"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn static_story_files_and_assets_are_served() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed_story(dir.path());

    let (status, body) = send(dir.path(), get("/stories/forest/media/walk/1.png")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "png");

    let resp = router(state(dir.path()))
        .oneshot(get("/assets/page-runtime.js?v=1"))
        .await
        .expect("route request");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_TYPE],
        "text/javascript; charset=utf-8"
    );

    let (status, _) = send(dir.path(), get("/assets/secret.txt")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn folders_and_media_are_listed() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed_story(dir.path());
    fs::create_dir_all(dir.path().join("meadow")).expect("create second story");

    let (_, body) = send(dir.path(), get("/api/folders")).await;
    assert_eq!(json(&body)["folders"], serde_json::json!(["forest", "meadow"]));

    let (_, body) = send(dir.path(), get("/api/story-media/forest")).await;
    let media: Vec<String> = serde_json::from_str(&body).expect("media list");
    assert_eq!(media, vec!["media/walk/1.png", "media/walk/2.png"]);
}

#[tokio::test]
async fn favorites_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");

    let (_, body) = send(dir.path(), get("/api/favorites")).await;
    assert_eq!(json(&body)["favorites"], serde_json::json!({}));

    let favorites = serde_json::json!({
        "Bedtime": {"name": "Bedtime", "stories": ["forest"], "createdAt": 1700000000000_i64}
    });
    let (status, _) = send(
        dir.path(),
        post_json(
            "/api/favorites",
            serde_json::json!({ "favorites": favorites.clone() }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(dir.path(), get("/api/favorites")).await;
    assert_eq!(json(&body)["favorites"], favorites);
}

#[tokio::test]
async fn player_settings_default_then_persist() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed_story(dir.path());

    let (_, body) = send(dir.path(), get("/api/stories/forest/player-settings")).await;
    assert_eq!(json(&body)["settings"]["playerBgAudio"], "media/music.m4a");

    let (status, _) = send(
        dir.path(),
        post_json(
            "/api/stories/forest/player-settings",
            serde_json::json!({"storyTitle": "The Forest", "sceneBgColor": "#102030"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, html) = send(dir.path(), get("/stories/forest/player.html")).await;
    assert!(html.contains("<title>The Forest</title>"));
    assert!(html.contains("--scene-bg:#102030"));
}
