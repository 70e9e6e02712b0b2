use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{error::ApiError, state::AppState};
use crate::application::UploadSummary;
use crate::domain::{ports::UploadedFile, SearchResult};

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct SearchHit {
    pub source: String,
    pub page: usize,
    pub page_label: String,
    pub chunk_index: usize,
    pub content: String,
    pub score: f32,
}

impl From<SearchResult> for SearchHit {
    fn from(result: SearchResult) -> Self {
        let chunk = result.chunk;
        Self {
            source: chunk.metadata.source,
            page: chunk.metadata.page,
            page_label: chunk.metadata.page_label,
            chunk_index: chunk.chunk_index,
            content: chunk.content,
            score: result.score,
        }
    }
}

/// Multipart upload; every part carrying a file name is one file. The batch
/// replaces the session index as a whole.
pub async fn upload_documents(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<UploadSummary>, ApiError> {
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(ApiError::bad_request)? {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field.bytes().await.map_err(ApiError::bad_request)?;
        files.push(UploadedFile::new(name, bytes.to_vec()));
    }

    Ok(Json(state.verifier.upload(id, &files).await?))
}

pub async fn search_documents(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Vec<SearchHit>>, ApiError> {
    let results = state.verifier.search(id, &request.query).await?;
    Ok(Json(results.into_iter().map(SearchHit::from).collect()))
}
