//! Route handlers for the HTTP API
//!
//! Handlers translate query strings into [`RawQuery`] values, call into the
//! shared [`YieldService`] and map [`ApyError`] onto HTTP statuses.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use http::{HeaderMap, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::batch::{
    parse_batch, select_subnets, select_validators, BatchResponseAssembler, PageDefaults,
    QueryParams, RawQuery,
};
use crate::errors::{ApyError, ApyResult, ValidationError};
use crate::service::YieldService;
use crate::types::{NetUid, ValidatorIdentity};

/// Header carrying the admin key
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<YieldService>,
}

impl AppState {
    pub fn new(service: Arc<YieldService>) -> Self {
        Self { service }
    }

    fn defaults(&self) -> PageDefaults {
        PageDefaults::from(&self.service.config().server)
    }
}

impl IntoResponse for ApyError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(error = %self, code = self.code(), "Request failed");
        }
        let body = json!({
            "error": {
                "message": self.message(),
                "code": self.code(),
            }
        });
        (status, Json(body)).into_response()
    }
}

/// Build a [`RawQuery`] from flat query string pairs
pub fn raw_query(params: &HashMap<String, String>) -> RawQuery {
    let map: Map<String, Value> = params
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    RawQuery::default().overlay(&map)
}

fn admin_key<'a>(headers: &'a HeaderMap, params: &'a HashMap<String, String>) -> Option<&'a str> {
    headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| params.get("admin_key").map(String::as_str))
}

fn parse_netuid(value: &str, parameter: &str) -> ApyResult<NetUid> {
    value.trim().parse::<NetUid>().map_err(|_| {
        ValidationError::with_parameter(format!("invalid {}: {}", parameter, value), parameter)
            .into()
    })
}

fn required<'a>(params: &'a HashMap<String, String>, name: &str) -> ApyResult<&'a str> {
    params
        .get(name)
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| {
            ValidationError::with_parameter(format!("missing parameter: {}", name), name).into()
        })
}

async fn run_batch(
    state: &AppState,
    procedures: &str,
    params: &HashMap<String, String>,
    input: Option<&str>,
) -> Response {
    let requests = match parse_batch(procedures, &raw_query(params), input) {
        Ok(requests) => requests,
        Err(e) => return e.into_response(),
    };
    let envelope = BatchResponseAssembler::new(&state.service)
        .assemble(&requests)
        .await;
    Json(envelope).into_response()
}

/// `GET /api/trpc/:procedures`
pub async fn trpc_get(
    State(state): State<AppState>,
    Path(procedures): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let input = params.get("input").cloned();
    run_batch(&state, &procedures, &params, input.as_deref()).await
}

/// `POST /api/trpc/:procedures`; the body, when present, is the batch input
pub async fn trpc_post(
    State(state): State<AppState>,
    Path(procedures): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let input = match std::str::from_utf8(&body) {
        Ok(text) if !text.trim().is_empty() => Some(text.to_string()),
        Ok(_) => params.get("input").cloned(),
        Err(_) => {
            return ApyError::from(ValidationError::with_parameter(
                "request body is not UTF-8",
                "input",
            ))
            .into_response()
        }
    };
    run_batch(&state, &procedures, &params, input.as_deref()).await
}

/// `GET /api/validators`
pub async fn list_validators(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApyResult<Response> {
    let query = QueryParams::parse(&raw_query(&params), state.defaults())?;
    let entry = state.service.validators().await?;
    Ok(Json(select_validators(&entry.value, &query)).into_response())
}

/// `GET /api/validators/subnet/:subnet_id`
pub async fn list_subnet_validators(
    State(state): State<AppState>,
    Path(subnet_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApyResult<Response> {
    let netuid = parse_netuid(&subnet_id, "subnet_id")?;
    let mut raw = raw_query(&params);
    raw.subnet_id = Some(netuid.to_string());
    let query = QueryParams::parse(&raw, state.defaults())?;
    let entry = state.service.validators().await?;
    Ok(Json(select_validators(&entry.value, &query)).into_response())
}

/// `GET /api/validators/:hotkey`
pub async fn get_validator(
    State(state): State<AppState>,
    Path(hotkey): Path<String>,
) -> ApyResult<Response> {
    let validator = state.service.validator(&hotkey).await?;
    Ok(Json(validator).into_response())
}

/// `GET /api/subnets`
pub async fn list_subnets(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApyResult<Response> {
    let query = QueryParams::parse(&raw_query(&params), state.defaults())?;
    let entry = state.service.subnets().await?;
    Ok(Json(select_subnets(&entry.value, &query)).into_response())
}

/// `POST /api/admin/update-subnet?netuid=&name=&symbol=`
pub async fn update_subnet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> ApyResult<Response> {
    state.service.authorize_admin(admin_key(&headers, &params))?;

    let netuid = parse_netuid(required(&params, "netuid")?, "netuid")?;
    let name = required(&params, "name")?;
    let symbol = required(&params, "symbol")?;
    state
        .service
        .update_subnet_metadata(netuid, name, symbol)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Updated metadata for subnet {}", netuid),
    }))
    .into_response())
}

/// Body of `POST /api/admin/validator-identity`
#[derive(Debug, Deserialize)]
pub struct IdentityUpdate {
    pub hotkey: String,
    #[serde(flatten)]
    pub identity: ValidatorIdentity,
}

/// `POST /api/admin/validator-identity`
pub async fn update_validator_identity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> ApyResult<Response> {
    state.service.authorize_admin(admin_key(&headers, &params))?;

    let update: IdentityUpdate = serde_json::from_slice(&body).map_err(|e| {
        ValidationError::with_parameter(format!("invalid identity body: {}", e), "body")
    })?;
    if update.hotkey.trim().is_empty() {
        return Err(ValidationError::with_parameter("hotkey must not be empty", "hotkey").into());
    }
    state
        .service
        .set_validator_identity(&update.hotkey, update.identity)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Updated identity for validator {}", update.hotkey),
    }))
    .into_response())
}

/// `GET /api/health`
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// `GET /api/status`
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let service = &state.service;
    let uptime = (Utc::now() - service.started_at()).num_seconds().max(0);
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "network": service.config().chain.network,
        "endpoint": service.endpoint(),
        "startedAt": service.started_at().to_rfc3339(),
        "uptimeSecs": uptime,
        "caches": service.cache_status(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{NotFoundError, UnauthorizedError, UpstreamFetchError};

    #[test]
    fn test_error_statuses() {
        let cases: Vec<(ApyError, u16)> = vec![
            (UpstreamFetchError::new("down").into(), 503),
            (NotFoundError::entity("validator", "5F").into(), 404),
            (ValidationError::new("bad").into(), 400),
            (UnauthorizedError::new("nope").into(), 401),
            (ApyError::internal("boom"), 500),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status().as_u16(), expected);
        }
    }

    #[test]
    fn test_raw_query_from_pairs() {
        let mut params = HashMap::new();
        params.insert("batchSize".to_string(), "10".to_string());
        params.insert("subnet_id".to_string(), "5".to_string());
        params.insert("admin_key".to_string(), "secret".to_string());

        let raw = raw_query(&params);
        assert_eq!(raw.batch_size.as_deref(), Some("10"));
        assert_eq!(raw.subnet_id.as_deref(), Some("5"));
        assert_eq!(raw.batch, None);
    }

    #[test]
    fn test_admin_key_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(ADMIN_KEY_HEADER, "from-header".parse().unwrap());
        let mut params = HashMap::new();
        params.insert("admin_key".to_string(), "from-query".to_string());

        assert_eq!(admin_key(&headers, &params), Some("from-header"));
        assert_eq!(admin_key(&HeaderMap::new(), &params), Some("from-query"));
    }

    #[test]
    fn test_parse_netuid() {
        assert_eq!(parse_netuid(" 5 ", "netuid").unwrap(), 5);
        assert!(parse_netuid("-1", "netuid").unwrap_err().is_validation());
    }
}
