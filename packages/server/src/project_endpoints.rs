//! Project Endpoints
//!
//! # Endpoints
//!
//! - `GET /api/health` - Health check
//! - `POST /api/projects` - Create a project
//! - `GET /api/projects` - List projects
//! - `GET /api/projects/:id` - Get a project
//! - `DELETE /api/projects/:id` - Delete a project and all of its nodes
//! - `GET /api/projects/:id/nodes` - Flat list of the project's nodes
//! - `POST /api/projects/:id/layout` - Recompute and persist node positions

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;

use crate::{AppState, HttpError};
use arbor_core::models::{CreateProjectParams, Node, Project};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutResponse {
    pub updated_count: usize,
}

/// Health check endpoint
///
/// # Example
///
/// ```bash
/// curl http://localhost:3001/api/health
/// ```
async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Create a new project
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:3001/api/projects \
///   -H "Content-Type: application/json" \
///   -d '{"name": "Research", "description": "Branching notes"}'
/// ```
async fn create_project(
    State(state): State<AppState>,
    payload: Result<Json<CreateProjectParams>, JsonRejection>,
) -> Result<(StatusCode, Json<Project>), HttpError> {
    let Json(params) = payload?;
    let project = state.nodes.create_project(params).await?;

    tracing::debug!("✅ Created project: {}", project.id);
    Ok((StatusCode::CREATED, Json(project)))
}

async fn list_projects(State(state): State<AppState>) -> Result<Json<Vec<Project>>, HttpError> {
    Ok(Json(state.nodes.list_projects().await?))
}

async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Project>, HttpError> {
    Ok(Json(state.nodes.get_project(&id).await?))
}

/// Delete a project; its nodes go with it
///
/// # Example
///
/// ```bash
/// curl -X DELETE http://localhost:3001/api/projects/<project-id>
/// ```
async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, HttpError> {
    state.nodes.delete_project(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_project_nodes(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Node>>, HttpError> {
    Ok(Json(state.nodes.list_nodes_for_project(&id).await?))
}

/// Apply auto-layout to every node of a project
///
/// Responds with the number of nodes whose positions were written; an empty
/// project yields `{"updatedCount": 0}`.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:3001/api/projects/<project-id>/layout
/// ```
async fn apply_layout(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LayoutResponse>, HttpError> {
    let updated_count = state.nodes.apply_auto_layout(&id, &state.layout).await?;
    Ok(Json(LayoutResponse { updated_count }))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/projects", post(create_project).get(list_projects))
        .route("/api/projects/:id", get(get_project).delete(delete_project))
        .route("/api/projects/:id/nodes", get(list_project_nodes))
        .route("/api/projects/:id/layout", post(apply_layout))
        .with_state(state)
}
