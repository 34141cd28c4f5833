//! Route handlers.

use std::path::PathBuf;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::error::Error;
use crate::files::{self, ListOptions};
use crate::postmortem::{Postmortem, PostmortemDraft};
use crate::projects::{self, ProjectPath};
use crate::rules::{self, RuleSet, RuleSpec};

const DEFAULT_POSTMORTEM_PAGE: usize = 100;

fn success() -> Json<Value> {
    Json(json!({ "success": true }))
}

async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::internal(format!("blocking task failed: {e}")))?
        .map_err(ApiError::from)
}

pub(crate) async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

// === Global rules ===

#[derive(Debug, Deserialize)]
pub(crate) struct ContentBody {
    content: String,
}

pub(crate) async fn get_global_rules(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let content = state.workspace().global_rules()?;
    Ok(Json(json!({ "content": content })))
}

pub(crate) async fn save_global_rules(
    State(state): State<AppState>,
    payload: Result<Json<ContentBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = payload?;
    state.workspace().save_global_rules(&body.content)?;
    Ok(success())
}

// === Scan paths and projects ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScanPathsBody {
    scan_paths: Vec<PathBuf>,
}

pub(crate) async fn get_scan_paths(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let scan_paths = state.workspace().scan_paths()?;
    Ok(Json(json!({ "scanPaths": scan_paths })))
}

pub(crate) async fn save_scan_paths(
    State(state): State<AppState>,
    payload: Result<Json<ScanPathsBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = payload?;
    state.workspace().set_scan_paths(&body.scan_paths)?;
    info!(count = body.scan_paths.len(), "Updated scan paths");
    Ok(success())
}

pub(crate) async fn list_projects(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let scan_paths = state.workspace().scan_paths()?;
    let scan = state.config().scan.clone();
    let found = blocking(move || {
        Ok(projects::scan(
            &scan_paths,
            &scan.project_markers,
            &scan.rules_dir,
        ))
    })
    .await?;
    Ok(Json(json!({ "projects": found })))
}

// === Rules ===

fn rule_set(state: &AppState, project: &ProjectPath) -> RuleSet {
    let scan = &state.config().scan;
    RuleSet::new(project.as_path(), &scan.rules_dir, &scan.rule_extensions)
}

#[derive(Debug, Deserialize)]
pub(crate) struct SaveRuleBody {
    filename: String,
    content: String,
}

pub(crate) async fn list_rules(
    State(state): State<AppState>,
    project: Result<Path<String>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let Path(segment) = project?;
    let project = ProjectPath::decode(&segment)?;
    let rules = rule_set(&state, &project).list()?;
    Ok(Json(json!({ "rules": rules })))
}

pub(crate) async fn save_rule(
    State(state): State<AppState>,
    project: Result<Path<String>, PathRejection>,
    payload: Result<Json<SaveRuleBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Path(segment) = project?;
    let project = ProjectPath::decode(&segment)?;
    let Json(body) = payload?;
    rule_set(&state, &project).save(&body.filename, &body.content)?;
    Ok(success())
}

pub(crate) async fn delete_rule(
    State(state): State<AppState>,
    params: Result<Path<(String, String)>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let Path((segment, filename)) = params?;
    let project = ProjectPath::decode(&segment)?;
    rule_set(&state, &project).delete(&filename)?;
    Ok(success())
}

pub(crate) async fn list_files(
    State(state): State<AppState>,
    project: Result<Path<String>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let Path(segment) = project?;
    let project = ProjectPath::decode(&segment)?;
    let scan = state.config().scan.clone();

    let listed = blocking(move || {
        files::list(
            project.as_path(),
            &ListOptions {
                max_depth: scan.file_list_max_depth,
                limit: scan.file_list_limit,
                ignored_dirs: &scan.file_list_ignored,
            },
        )
    })
    .await;

    let files = listed.unwrap_or_else(|e| {
        warn!(error = %e.0, "File listing failed");
        Vec::new()
    });
    Ok(Json(json!({ "files": files })))
}

pub(crate) async fn generate_rule(
    payload: Result<Json<RuleSpec>, JsonRejection>,
) -> ApiResult<Json<rules::GeneratedRule>> {
    let Json(spec) = payload?;
    Ok(Json(rules::generate(&spec)))
}

// === API key ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiKeyBody {
    api_key: String,
}

pub(crate) async fn key_status(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.credentials().status()?))
}

pub(crate) async fn store_key(
    State(state): State<AppState>,
    payload: Result<Json<ApiKeyBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = payload?;
    state.credentials().store(&body.api_key)?;
    Ok(success())
}

pub(crate) async fn clear_key(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.credentials().clear()?;
    Ok(success())
}

// === Sanity check ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SanityBody {
    content: String,
    project_path: Option<PathBuf>,
}

pub(crate) async fn sanity_check(
    State(state): State<AppState>,
    payload: Result<Json<SanityBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = payload?;
    let report = state
        .analyzer()
        .sanity_check(&body.content, body.project_path.as_deref())
        .await?;
    Ok(Json(report))
}

// === Postmortems ===

#[derive(Debug, Deserialize)]
pub(crate) struct ListParams {
    limit: Option<usize>,
}

pub(crate) async fn list_postmortems(
    State(state): State<AppState>,
    project: Result<Path<String>, PathRejection>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Path(segment) = project?;
    let project = ProjectPath::decode(&segment)?;
    let Query(params) = params?;
    let limit = params.limit.unwrap_or(DEFAULT_POSTMORTEM_PAGE);

    let postmortems = state
        .postmortems()
        .with(|s| s.list_for_project(project.as_path(), limit))?;
    Ok(Json(json!({ "postmortems": postmortems })))
}

pub(crate) async fn create_postmortem(
    State(state): State<AppState>,
    project: Result<Path<String>, PathRejection>,
    payload: Result<Json<PostmortemDraft>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(segment) = project?;
    let project = ProjectPath::decode(&segment)?;
    let Json(draft) = payload?;

    let mut postmortem = Postmortem::new(project.as_path(), draft)?;
    let id = state.postmortems().with(|s| s.insert(&postmortem))?;
    postmortem.id = Some(id);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "postmortem": postmortem })),
    ))
}

pub(crate) async fn analyze_project(
    State(state): State<AppState>,
    project: Result<Path<String>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let Path(segment) = project?;
    let project = ProjectPath::decode(&segment)?;
    let suggestions = state.analyzer().analyze_project(project.as_path()).await?;
    Ok(Json(json!({ "suggestions": suggestions })))
}

pub(crate) async fn get_postmortem(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let Path(id) = id?;
    let postmortem = state.postmortems().with(|s| s.get(id))?;
    Ok(Json(json!({ "postmortem": postmortem })))
}

pub(crate) async fn delete_postmortem(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let Path(id) = id?;
    state.postmortems().with(|s| s.delete(id))?;
    Ok(success())
}

pub(crate) async fn analyze_postmortem(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let Path(id) = id?;
    let suggestions = state.analyzer().analyze_postmortem(id).await?;
    Ok(Json(json!({ "suggestions": suggestions })))
}
