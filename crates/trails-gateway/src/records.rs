//! Read-only record endpoints.
//!
//! Access follows each collection's rules: an absent rule is admin only and
//! answers 403, an empty rule is public, and any other rule is a filter the
//! record has to satisfy.

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error};
use trails_db::query::Filter;
use trails_db::{CollectionDef, RecordQuery, SchemaStore};

use crate::error::ApiError;
use crate::state::SharedState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
    pub sort: Option<String>,
    pub filter: Option<String>,
}

/// `GET /api/collections/{name}/records`
pub async fn list_records(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(params) = params?;
    let collection = state.store.get_collection(&name)?;
    let rule = access_filter(&collection, collection.rules.list_rule.as_deref())?;

    let mut query = RecordQuery::parse(
        &collection,
        params.filter.as_deref(),
        params.sort.as_deref(),
        params.page,
        params.per_page,
    )?;
    if let Some(rule) = rule {
        query.filter = Some(match query.filter.take() {
            Some(requested) => requested.and(rule),
            None => rule,
        });
    }

    let page = query.run(state.store.list_records(&name)?);
    debug!(
        "listed {} of {} records from {name}",
        page.items.len(),
        page.total_items
    );

    Ok(Json(json!({
        "page": page.page,
        "perPage": page.per_page,
        "totalItems": page.total_items,
        "totalPages": page.total_pages,
        "items": page.items.iter().map(|r| r.to_json()).collect::<Vec<_>>(),
    })))
}

/// `GET /api/collections/{name}/records/{id}`
pub async fn view_record(
    State(state): State<SharedState>,
    Path((name, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let collection = state.store.get_collection(&name)?;
    let rule = access_filter(&collection, collection.rules.view_rule.as_deref())?;

    let record = state
        .store
        .get_record(&name, &id)?
        .filter(|r| rule.as_ref().is_none_or(|f| f.matches(r)))
        .ok_or_else(ApiError::not_found)?;

    Ok(Json(record.to_json()))
}

/// Resolve a rule into the extra filter it imposes.
fn access_filter(
    collection: &CollectionDef,
    rule: Option<&str>,
) -> Result<Option<Filter>, ApiError> {
    match rule.map(str::trim) {
        None => Err(ApiError::forbidden()),
        Some("") => Ok(None),
        Some(expr) => Filter::parse(expr, collection).map(Some).map_err(|e| {
            error!("invalid access rule on {}: {e}", collection.name);
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "the collection's access rule is invalid",
            )
        }),
    }
}
