// crates/server/src/routes/liveattrs.rs
//! API routes for attribute extraction and attribute value queries.
//!
//! All routes live under /liveAttributes/{corpusId}:
//! - POST   /data                 - Start an extraction job (201)
//! - DELETE /data                 - Not implemented (501)
//! - GET    /conf                 - Stored extraction configuration
//! - POST   /query                - Cached attribute value query
//! - POST   /attrValAutocomplete  - Uncached autocomplete query
//! - POST   /selectionSubcSize    - Size of an ad-hoc subcorpus
//! - POST   /getBibliography      - All attributes of one bibliography item
//! - POST   /findBibTitles        - Labels of bibliography items
//! - POST   /fillAttrs            - Complete attributes from a known value
//! - GET    /stats                - Attribute usage counters
//! - POST   /updateIndexes        - Start an index update job (201)

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use corpadm_core::{import_key, ConfError, ConfRequest, ExtractionConf, QueryPayload, SubcSize};
use corpadm_db::{BibliographyEntry, FilledAttrs, UsageEntry};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiQuery};
use crate::jobs::types::ExtractionJob;
use crate::jobs::{CompactJobView, JobInfo};
use crate::liveattrs::service;
use crate::state::AppState;

/// Query parameters of POST /data.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataParams {
    pub no_cache: Option<String>,
    pub append: Option<String>,
    pub atom_structure: Option<String>,
    pub bib_id_attr: Option<String>,
    /// Comma-separated `struct.attr` list.
    pub merge_attr: Option<String>,
    pub merge_fn: Option<String>,
}

/// Optional JSON body of POST /data.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataBody {
    #[serde(default)]
    pub vertical_files: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BibliographyRequest {
    pub item_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BibTitlesRequest {
    pub item_ids: Vec<String>,
}

/// Body of POST /fillAttrs. Attribute names use dot notation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillAttrsRequest {
    pub search: String,
    pub values: Vec<String>,
    #[serde(default)]
    pub fill: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub corpus_id: String,
    pub usage: Vec<UsageEntry>,
}

fn is_set(flag: &Option<String>) -> bool {
    matches!(flag.as_deref(), Some("1") | Some("true"))
}

fn parse_json<T: serde::de::DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))
}

/// POST /api/liveAttributes/{corpusId}/data
async fn create_data(
    State(state): State<Arc<AppState>>,
    Path(corpus_id): Path<String>,
    ApiQuery(params): ApiQuery<DataParams>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ExtractionJob>)> {
    let body: DataBody = parse_json(&body)?;
    let corpus = service::corpus_info(&state, &corpus_id).await?;
    let liveattrs = &state.config.liveattrs;
    let req = ConfRequest {
        atom_structure: params.atom_structure.clone(),
        bib_id_attr: params.bib_id_attr.clone(),
        merge_attrs: params
            .merge_attr
            .as_deref()
            .map(|m| {
                m.split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        merge_fn: params.merge_fn.clone(),
        db_kind: liveattrs.extraction_db_kind,
        sqlite_output_dir: Some(liveattrs.text_types_db_dir_path.clone()),
    };
    let mut conf = service::resolve_conf(&state, &corpus, &req, is_set(&params.no_cache)).await?;
    if !body.vertical_files.is_empty() {
        conf.vertical_files = body.vertical_files;
    }
    let job = state.extraction.create(conf, is_set(&params.append)).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// DELETE /api/liveAttributes/{corpusId}/data
async fn delete_data(Path(corpus_id): Path<String>) -> ApiResult<StatusCode> {
    Err(ApiError::NotImplemented(format!(
        "removing attribute data of {corpus_id}"
    )))
}

/// GET /api/liveAttributes/{corpusId}/conf
async fn view_conf(
    State(state): State<Arc<AppState>>,
    Path(corpus_id): Path<String>,
) -> ApiResult<Json<ExtractionConf>> {
    let conf = state
        .conf_loader
        .get(&corpus_id)
        .await?
        .ok_or(ConfError::NotFound { corpus: corpus_id })?;
    Ok(Json(conf))
}

/// POST /api/liveAttributes/{corpusId}/query
async fn query(
    State(state): State<Arc<AppState>>,
    Path(corpus_id): Path<String>,
    ApiJson(query): ApiJson<QueryPayload>,
) -> ApiResult<Response> {
    let corpus = service::corpus_info(&state, &corpus_id).await?;
    let ans = service::query_attr_values(&state, &corpus, &query).await?;
    Ok(Json(ans.as_ref()).into_response())
}

/// POST /api/liveAttributes/{corpusId}/attrValAutocomplete
async fn autocomplete(
    State(state): State<Arc<AppState>>,
    Path(corpus_id): Path<String>,
    ApiJson(query): ApiJson<QueryPayload>,
) -> ApiResult<Response> {
    if query.autocomplete().is_none() {
        return Err(ApiError::BadRequest("missing autocompleteAttr".to_string()));
    }
    let corpus = service::corpus_info(&state, &corpus_id).await?;
    let ans = service::compute_attr_values(&state, &corpus, &query).await?;
    Ok(Json(ans).into_response())
}

/// POST /api/liveAttributes/{corpusId}/selectionSubcSize
async fn selection_subc_size(
    State(state): State<Arc<AppState>>,
    Path(corpus_id): Path<String>,
    ApiJson(query): ApiJson<QueryPayload>,
) -> ApiResult<Json<SubcSize>> {
    let corpus = service::corpus_info(&state, &corpus_id).await?;
    let filters: BTreeMap<_, _> = query
        .attrs
        .iter()
        .map(|(k, v)| (import_key(k), v.clone()))
        .collect();
    let total = state
        .db
        .subc_size(&corpus.name, &filters, &query.aligned)
        .await?;
    Ok(Json(SubcSize { total }))
}

/// POST /api/liveAttributes/{corpusId}/getBibliography
async fn get_bibliography(
    State(state): State<Arc<AppState>>,
    Path(corpus_id): Path<String>,
    ApiJson(req): ApiJson<BibliographyRequest>,
) -> ApiResult<Json<Vec<BibliographyEntry>>> {
    let corpus = service::corpus_info(&state, &corpus_id).await?;
    let bib_view = state
        .conf_loader
        .get(&corpus.name)
        .await?
        .and_then(|conf| conf.bib_view)
        .ok_or_else(|| ApiError::NotFound(format!("no bibliography configured for {corpus_id}")))?;
    let entries = state
        .db
        .get_bibliography(&corpus.name, &bib_view, &req.item_id)
        .await?;
    Ok(Json(entries))
}

/// POST /api/liveAttributes/{corpusId}/findBibTitles
async fn find_bib_titles(
    State(state): State<Arc<AppState>>,
    Path(corpus_id): Path<String>,
    ApiJson(req): ApiJson<BibTitlesRequest>,
) -> ApiResult<Json<BTreeMap<String, String>>> {
    let corpus = service::corpus_info(&state, &corpus_id).await?;
    let (Some(id_attr), Some(label_attr)) = (&corpus.bib_id_attr, &corpus.bib_label_attr) else {
        return Err(ApiError::BadRequest(format!(
            "corpus {corpus_id} has no bibliography attributes"
        )));
    };
    let titles = state
        .db
        .find_bib_titles(
            &corpus.name,
            &import_key(id_attr),
            &import_key(label_attr),
            &req.item_ids,
        )
        .await?;
    Ok(Json(titles))
}

/// POST /api/liveAttributes/{corpusId}/fillAttrs
async fn fill_attrs(
    State(state): State<Arc<AppState>>,
    Path(corpus_id): Path<String>,
    ApiJson(req): ApiJson<FillAttrsRequest>,
) -> ApiResult<Json<FilledAttrs>> {
    let corpus = service::corpus_info(&state, &corpus_id).await?;
    let fill: Vec<String> = req.fill.iter().map(|a| import_key(a)).collect();
    let filled = state
        .db
        .fill_attrs(&corpus.name, &import_key(&req.search), &req.values, &fill)
        .await?;
    Ok(Json(filled))
}

/// GET /api/liveAttributes/{corpusId}/stats
async fn stats(
    State(state): State<Arc<AppState>>,
    Path(corpus_id): Path<String>,
) -> ApiResult<Json<StatsResponse>> {
    let usage = state.db.load_usage(&corpus_id).await?;
    Ok(Json(StatsResponse { corpus_id, usage }))
}

/// POST /api/liveAttributes/{corpusId}/updateIndexes?maxColumns=N
async fn update_indexes(
    State(state): State<Arc<AppState>>,
    Path(corpus_id): Path<String>,
    ApiQuery(params): ApiQuery<HashMap<String, String>>,
) -> ApiResult<(StatusCode, Json<CompactJobView>)> {
    let raw = params
        .get("maxColumns")
        .ok_or_else(|| ApiError::BadRequest("missing maxColumns parameter".to_string()))?;
    let max_columns: usize = raw
        .parse()
        .map_err(|_| ApiError::Unprocessable(format!("invalid maxColumns value: {raw}")))?;
    let job = state.maintenance.start_index_update(&corpus_id, max_columns)?;
    Ok((StatusCode::CREATED, Json(job.compact())))
}

/// Build the liveAttributes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/liveAttributes/{corpus_id}/data",
            post(create_data).delete(delete_data),
        )
        .route("/liveAttributes/{corpus_id}/conf", get(view_conf))
        .route("/liveAttributes/{corpus_id}/query", post(query))
        .route(
            "/liveAttributes/{corpus_id}/attrValAutocomplete",
            post(autocomplete),
        )
        .route(
            "/liveAttributes/{corpus_id}/selectionSubcSize",
            post(selection_subc_size),
        )
        .route(
            "/liveAttributes/{corpus_id}/getBibliography",
            post(get_bibliography),
        )
        .route(
            "/liveAttributes/{corpus_id}/findBibTitles",
            post(find_bib_titles),
        )
        .route("/liveAttributes/{corpus_id}/fillAttrs", post(fill_attrs))
        .route("/liveAttributes/{corpus_id}/stats", get(stats))
        .route(
            "/liveAttributes/{corpus_id}/updateIndexes",
            post(update_indexes),
        )
}
