//! Projects and saved keywords API routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, patch},
    Json, Router,
};
use serde::Deserialize;

use kiwi_core::{CreateKeyword, CreateProject, Keyword, Project};

use super::extract::{ApiJson, AuthUser};
use crate::{error::ApiResult, AppState};

/// Project routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route("/:id", get(get_project))
        .route("/:id/archive", patch(archive_project))
        .route("/:id/keywords", get(list_keywords).post(add_keyword))
}

/// Keyword routes
pub fn keyword_routes() -> Router<AppState> {
    Router::new().route("/:id", delete(delete_keyword))
}

#[derive(Debug, Deserialize)]
pub struct ListProjectsQuery {
    #[serde(default)]
    pub include_archived: bool,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveRequest {
    #[serde(default = "default_archived")]
    pub archived: bool,
}

fn default_archived() -> bool {
    true
}

async fn list_projects(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListProjectsQuery>,
) -> ApiResult<Json<Vec<Project>>> {
    let projects = state
        .projects
        .list_projects(&auth.0.sub, query.include_archived)
        .await?;
    Ok(Json(projects))
}

async fn create_project(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<CreateProject>,
) -> ApiResult<impl IntoResponse> {
    let project = state.projects.create_project(&auth.0.sub, req).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn get_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Project>> {
    Ok(Json(state.projects.get_project(&auth.0.sub, &id).await?))
}

/// Archive (or restore, with `{"archived": false}`) a project
async fn archive_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<ArchiveRequest>,
) -> ApiResult<Json<Project>> {
    let project = state
        .projects
        .set_archived(&auth.0.sub, &id, req.archived)
        .await?;
    Ok(Json(project))
}

async fn list_keywords(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Keyword>>> {
    Ok(Json(state.projects.list_keywords(&auth.0.sub, &id).await?))
}

async fn add_keyword(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<CreateKeyword>,
) -> ApiResult<impl IntoResponse> {
    let keyword = state.projects.add_keyword(&auth.0.sub, &id, req).await?;
    Ok((StatusCode::CREATED, Json(keyword)))
}

async fn delete_keyword(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.projects.delete_keyword(&auth.0.sub, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
