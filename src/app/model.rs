use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::formats::{Favorites, PageTimingEntry, PlayerSettings};
use crate::rebuild::RebuildReport;

/// Failures reported to API callers as `{success: false, message}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub success: bool,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(err) => {
                tracing::error!(error = %format!("{err:#}"), "request failed");
                format!("{err:#}")
            }
            other => other.to_string(),
        };
        (
            status,
            Json(Failure {
                success: false,
                message,
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    pub message: String,
}

impl Ack {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldersResponse {
    pub success: bool,
    pub folders: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCountResponse {
    pub page_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramesResponse {
    pub success: bool,
    pub images: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingResponse {
    pub success: bool,
    pub data: Vec<PageTimingEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RebuildResponse {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub report: RebuildReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSettingsResponse {
    pub success: bool,
    pub settings: PlayerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavoritesResponse {
    pub success: bool,
    pub favorites: Favorites,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveFavoritesRequest {
    pub favorites: Favorites,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FramesQuery {
    #[serde(default)]
    pub folder: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryFileQuery {
    pub page: Option<String>,
    pub no_subtitles: Option<String>,
}

impl StoryFileQuery {
    pub fn subtitles(&self) -> bool {
        self.no_subtitles.as_deref() != Some("1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_status_codes() {
        assert_eq!(ApiError::bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        let internal: ApiError = anyhow::anyhow!("disk full").into();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            internal.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn no_subtitles_only_when_flag_is_one() {
        let query = StoryFileQuery {
            page: None,
            no_subtitles: Some("1".into()),
        };
        assert!(!query.subtitles());
        assert!(StoryFileQuery::default().subtitles());
    }
}
