use std::sync::Arc;

use anyhow::Context as _;
use axum::Router;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, Request, State};
use axum::http::Uri;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use tower::ServiceExt as _;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::app::assets;
use crate::app::model::{
    Ack, ApiError, FavoritesResponse, FoldersResponse, FramesQuery, FramesResponse,
    PageCountResponse, PlayerSettingsResponse, RebuildResponse, SaveFavoritesRequest,
    StoryFileQuery, TimingResponse,
};
use crate::extract::extract_document;
use crate::favorites::FavoritesStore;
use crate::formats::{PageDocument, PlayerSettings};
use crate::player::{PlayerBoot, TimingTable};
use crate::probe::DurationProbe;
use crate::render::{RenderOptions, render_page, render_player};
use crate::slideshow::{DiscoveryMode, discover_frames, story_relative};
use crate::story_store::{StoryName, StoryStore, page_number_from_file_name};
use crate::{rebuild, timing};

#[derive(Clone)]
pub struct AppState {
    pub stories: StoryStore,
    pub favorites: FavoritesStore,
    pub probe: Arc<dyn DurationProbe>,
    pub discovery: DiscoveryMode,
    /// Asset version stamped into pages rendered by this process.
    pub render: RenderOptions,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/api/folders", get(list_folders))
        .route("/api/story-media/:story", get(story_media))
        .route("/api/stories/:story/pages", get(page_count))
        .route("/api/stories/:story/frames", get(list_frames))
        .route(
            "/api/stories/:story/page-data/:page",
            get(get_page_data).post(save_page_data),
        )
        .route("/api/stories/:story/rebuild", post(rebuild_pages))
        .route("/api/stories/:story/timing", post(generate_timing))
        .route(
            "/api/stories/:story/player-settings",
            get(get_player_settings).post(save_player_settings),
        )
        .route("/api/preview", post(preview_page))
        .route("/api/favorites", get(get_favorites).post(save_favorites))
        .route("/assets/:name", get(asset))
        .route("/stories/*path", get(story_file))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn story_name(raw: &str) -> Result<StoryName, ApiError> {
    StoryName::parse(raw).map_err(|err| ApiError::bad_request(err.to_string()))
}

fn page_param(raw: &str) -> Result<u32, ApiError> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|page| *page >= 1)
        .ok_or_else(|| ApiError::bad_request(format!("invalid page number: {raw:?}")))
}

async fn existing_story(state: &AppState, raw: &str) -> Result<StoryName, ApiError> {
    let story = story_name(raw)?;
    if !state.stories.story_exists(&story).await {
        return Err(ApiError::not_found(format!("story not found: {story}")));
    }
    Ok(story)
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

async fn list_folders(State(state): State<AppState>) -> Result<Json<FoldersResponse>, ApiError> {
    let folders = state.stories.list_stories().await?;
    Ok(Json(FoldersResponse {
        success: true,
        folders,
    }))
}

async fn story_media(
    State(state): State<AppState>,
    Path(story): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    let story = existing_story(&state, &story).await?;
    Ok(Json(state.stories.list_media(&story).await?))
}

async fn page_count(
    State(state): State<AppState>,
    Path(story): Path<String>,
) -> Result<Json<PageCountResponse>, ApiError> {
    let story = existing_story(&state, &story).await?;
    let page_count = state.stories.page_count(&story).await?;
    Ok(Json(PageCountResponse { page_count }))
}

async fn list_frames(
    State(state): State<AppState>,
    Path(story): Path<String>,
    Query(query): Query<FramesQuery>,
) -> Result<Json<FramesResponse>, ApiError> {
    let story = existing_story(&state, &story).await?;
    let folder = query.folder.trim().to_owned();
    if folder.is_empty() {
        return Err(ApiError::bad_request("folder is required"));
    }
    story_relative(&folder).map_err(|err| ApiError::bad_request(err.to_string()))?;

    let story_dir = state.stories.story_dir(&story);
    let mode = state.discovery;
    let images = tokio::task::spawn_blocking(move || discover_frames(&story_dir, &folder, mode))
        .await
        .context("join frame discovery")??;
    tracing::debug!(story = %story, count = images.len(), ?mode, "frames discovered");
    Ok(Json(FramesResponse {
        success: true,
        count: images.len(),
        images,
    }))
}

async fn get_page_data(
    State(state): State<AppState>,
    Path((story, page)): Path<(String, String)>,
) -> Result<Json<PageDocument>, ApiError> {
    let story = existing_story(&state, &story).await?;
    let page = page_param(&page)?;
    state
        .stories
        .load_page(&story, page)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no stored data for page {page}")))
}

async fn save_page_data(
    State(state): State<AppState>,
    Path((story, page)): Path<(String, String)>,
    payload: Result<Json<PageDocument>, JsonRejection>,
) -> Result<Json<Ack>, ApiError> {
    let story = story_name(&story)?;
    let page = page_param(&page)?;
    let doc = json_body(payload)?;
    state
        .stories
        .save_page(&story, page, doc, &state.render)
        .await?;
    Ok(Json(Ack::ok(format!("page {page} saved"))))
}

async fn rebuild_pages(
    State(state): State<AppState>,
    Path(story): Path<String>,
) -> Result<Json<RebuildResponse>, ApiError> {
    let story = existing_story(&state, &story).await?;
    if !tokio::fs::try_exists(state.stories.pages_json_path(&story))
        .await
        .unwrap_or(false)
    {
        return Err(ApiError::not_found(format!("no json/pages.json for {story}")));
    }
    let report = rebuild::rebuild_story(&state.stories, &story, &state.render).await?;
    Ok(Json(RebuildResponse {
        success: true,
        message: format!("{} pages regenerated", report.updated_pages.len()),
        report,
    }))
}

async fn generate_timing(
    State(state): State<AppState>,
    Path(story): Path<String>,
) -> Result<Json<TimingResponse>, ApiError> {
    let story = existing_story(&state, &story).await?;
    let data = timing::generate(&state.stories, &story, state.probe.as_ref()).await?;
    Ok(Json(TimingResponse {
        success: true,
        data,
    }))
}

async fn get_player_settings(
    State(state): State<AppState>,
    Path(story): Path<String>,
) -> Result<Json<PlayerSettingsResponse>, ApiError> {
    let story = existing_story(&state, &story).await?;
    let settings = state.stories.load_player_settings(&story).await?;
    Ok(Json(PlayerSettingsResponse {
        success: true,
        settings,
    }))
}

async fn save_player_settings(
    State(state): State<AppState>,
    Path(story): Path<String>,
    payload: Result<Json<PlayerSettings>, JsonRejection>,
) -> Result<Json<Ack>, ApiError> {
    let story = existing_story(&state, &story).await?;
    let settings = json_body(payload)?;
    state
        .stories
        .save_player_settings(&story, &settings)
        .await?;
    Ok(Json(Ack::ok("player settings saved")))
}

async fn preview_page(
    State(state): State<AppState>,
    payload: Result<Json<PageDocument>, JsonRejection>,
) -> Result<Html<String>, ApiError> {
    let doc = json_body(payload)?;
    Ok(Html(render_page(&doc, &state.render)?))
}

async fn get_favorites(
    State(state): State<AppState>,
) -> Result<Json<FavoritesResponse>, ApiError> {
    let favorites = state.favorites.load().await?;
    Ok(Json(FavoritesResponse {
        success: true,
        favorites,
    }))
}

async fn save_favorites(
    State(state): State<AppState>,
    payload: Result<Json<SaveFavoritesRequest>, JsonRejection>,
) -> Result<Json<Ack>, ApiError> {
    let request = json_body(payload)?;
    if let Some(blank) = request.favorites.keys().find(|k| k.trim().is_empty()) {
        return Err(ApiError::bad_request(format!(
            "invalid favorite list name: {blank:?}"
        )));
    }
    state.favorites.save(&request.favorites).await?;
    Ok(Json(Ack::ok("favorites saved")))
}

async fn asset(Path(name): Path<String>) -> Result<assets::Asset, ApiError> {
    assets::lookup(&name).ok_or_else(|| ApiError::not_found(format!("no such asset: {name}")))
}

/// `player.html` and `pageN.html` are produced here; every other story file
/// comes straight from disk.
async fn story_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
    req: Request,
) -> Result<Response, ApiError> {
    let path = path.trim_start_matches('/').to_owned();
    let query = Query::<StoryFileQuery>::try_from_uri(req.uri())
        .map(|Query(q)| q)
        .unwrap_or_default();

    if let Some((story, file)) = path.split_once('/') {
        if file == "player.html" {
            return player_page(&state, story, &query).await;
        }
        if let Some(page) = page_number_from_file_name(file) {
            return story_page(&state, story, page, &query).await;
        }
    }
    serve_static(&state, &path, req).await
}

async fn player_page(
    state: &AppState,
    story: &str,
    query: &StoryFileQuery,
) -> Result<Response, ApiError> {
    let story = existing_story(state, story).await?;
    let page_count = state.stories.page_count(&story).await?;
    let timing = state.stories.load_timing(&story).await?;
    let settings = state.stories.load_player_settings(&story).await?;
    let boot = PlayerBoot::new(
        story.as_str(),
        page_count,
        query.page.as_deref(),
        TimingTable::from_entries(&timing),
    );
    let html = render_player(&settings, &boot, &state.render)?;
    Ok(Html(html).into_response())
}

async fn story_page(
    state: &AppState,
    story: &str,
    page: u32,
    query: &StoryFileQuery,
) -> Result<Response, ApiError> {
    let story = story_name(story)?;
    let Some(html) = state.stories.read_page_html(&story, page).await? else {
        return Err(ApiError::not_found(format!("page {page} of {story} not found")));
    };
    if query.subtitles() {
        return Ok(Html(html).into_response());
    }

    let stripped = extract_document(&html)
        .and_then(|doc| render_page(&doc, &state.render.clone().without_subtitles()));
    match stripped {
        Ok(stripped) => Ok(Html(stripped).into_response()),
        Err(err) => {
            tracing::warn!(
                story = %story,
                page,
                error = %format!("{err:#}"),
                "cannot strip subtitles; serving page as-is"
            );
            Ok(Html(html).into_response())
        }
    }
}

async fn serve_static(state: &AppState, path: &str, req: Request) -> Result<Response, ApiError> {
    let (mut parts, body) = req.into_parts();
    let target = match parts.uri.query() {
        Some(q) => format!("/{path}?{q}"),
        None => format!("/{path}"),
    };
    parts.uri = target
        .parse::<Uri>()
        .map_err(|err| ApiError::bad_request(format!("invalid path: {err}")))?;
    let req = Request::from_parts(parts, body);

    match ServeDir::new(state.stories.root()).oneshot(req).await {
        Ok(resp) => Ok(resp.map(Body::new)),
        Err(never) => match never {},
    }
}
