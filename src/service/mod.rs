//! The `/v0` HTTP surface.
//!
//! A thin translation layer between HTTP and the replication
//! coordinator; everything interesting happens below it.
//!
//! | Route | Methods | Behavior |
//! |---|---|---|
//! | `/v0/status` | GET | liveness probe, always `200` |
//! | `/v0/entity?id=k[&replicas=a/f][&expires=ts]` | GET/PUT/DELETE | single-key operations |
//! | `/v0/entities?start=k[&end=k]` | GET | chunked range stream |
//!
//! Requests carrying the proxy header are replica-level: they touch local
//! storage only and answer with the cell's logical timestamp in the
//! `Timestamp` header, so the coordinating node can rank replies.

pub mod chunks;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tracing::{debug, error};

use crate::cluster::peer::parse_expires;
use crate::cluster::replicas::FactorError;
use crate::cluster::{
    ClusterError, Coordinator, ReplicasFactor, EXPIRES_HEADER, PROXY_HEADER, TIMESTAMP_HEADER,
};
use crate::engine::KeyState;

/// Reason phrase carried in `504` bodies.
pub const NOT_ENOUGH_REPLICAS: &str = "Not Enough Replicas";

#[derive(Clone)]
struct AppState {
    coordinator: Arc<Coordinator>,
}

/// Builds the `/v0` router over a coordinator.
pub fn router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/v0/status", get(status))
        .route(
            "/v0/entity",
            get(entity_get).put(entity_put).delete(entity_delete),
        )
        .route("/v0/entities", get(entities))
        .with_state(AppState { coordinator })
}

#[derive(Debug, Deserialize)]
struct EntityParams {
    id: Option<String>,
    replicas: Option<String>,
    expires: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RangeParams {
    start: Option<String>,
    end: Option<String>,
}

async fn status() -> StatusCode {
    StatusCode::OK
}

async fn entity_get(
    State(state): State<AppState>,
    Query(params): Query<EntityParams>,
    headers: HeaderMap,
) -> Response {
    let Some(id) = params.id.filter(|id| !id.is_empty()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    if headers.contains_key(PROXY_HEADER) {
        return match state.coordinator.local_state(&id).await {
            Ok(KeyState::Present { timestamp, value }) => {
                with_timestamp(StatusCode::OK, timestamp, value)
            }
            Ok(KeyState::Removed { timestamp }) => {
                with_timestamp(StatusCode::NOT_FOUND, timestamp, Vec::new())
            }
            Ok(KeyState::Absent) => StatusCode::NOT_FOUND.into_response(),
            Err(err) => internal(&err),
        };
    }

    let factor = match requested_factor(
        params.replicas.as_deref(),
        state.coordinator.quorum(),
        state.coordinator.cluster_size(),
    ) {
        Ok(factor) => factor,
        Err(err) => {
            debug!(%err, "bad replicas factor");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match state.coordinator.get(&id, factor).await {
        Ok(value) => (StatusCode::OK, value).into_response(),
        Err(ClusterError::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(ClusterError::QuorumFailed) => not_enough_replicas(),
        Err(err) => internal(&err),
    }
}

async fn entity_put(
    State(state): State<AppState>,
    Query(params): Query<EntityParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(id) = params.id.filter(|id| !id.is_empty()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let proxied = headers.contains_key(PROXY_HEADER);

    // The query parameter wins; a proxied request without one falls back
    // to the absolute instant forwarded by its coordinator.
    let expire = match &params.expires {
        Some(raw) => match parse_expires(raw) {
            Some(expire) => Some(expire),
            None => return StatusCode::BAD_REQUEST.into_response(),
        },
        None if proxied => match proxied_expire(&headers) {
            Ok(expire) => expire,
            Err(response) => return response,
        },
        None => None,
    };

    if proxied {
        return match state
            .coordinator
            .local_upsert(&id, body.to_vec(), expire)
            .await
        {
            Ok(()) => StatusCode::CREATED.into_response(),
            Err(err) => internal(&err),
        };
    }

    let factor = match requested_factor(
        params.replicas.as_deref(),
        state.coordinator.quorum(),
        state.coordinator.cluster_size(),
    ) {
        Ok(factor) => factor,
        Err(err) => {
            debug!(%err, "bad replicas factor");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match state
        .coordinator
        .upsert(&id, body.to_vec(), expire, factor)
        .await
    {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(ClusterError::QuorumFailed) => not_enough_replicas(),
        Err(err) => internal(&err),
    }
}

async fn entity_delete(
    State(state): State<AppState>,
    Query(params): Query<EntityParams>,
    headers: HeaderMap,
) -> Response {
    let Some(id) = params.id.filter(|id| !id.is_empty()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    if headers.contains_key(PROXY_HEADER) {
        return match state.coordinator.local_remove(&id).await {
            Ok(()) => StatusCode::ACCEPTED.into_response(),
            Err(err) => internal(&err),
        };
    }

    let factor = match requested_factor(
        params.replicas.as_deref(),
        state.coordinator.quorum(),
        state.coordinator.cluster_size(),
    ) {
        Ok(factor) => factor,
        Err(err) => {
            debug!(%err, "bad replicas factor");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match state.coordinator.remove(&id, factor).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(ClusterError::QuorumFailed) => not_enough_replicas(),
        Err(err) => internal(&err),
    }
}

/// Range scans stream local state only; the quorum is not consulted.
async fn entities(State(state): State<AppState>, Query(params): Query<RangeParams>) -> Response {
    let Some(start) = params.start.filter(|start| !start.is_empty()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let end = params
        .end
        .filter(|end| !end.is_empty())
        .map(String::into_bytes);

    let engine = state.coordinator.engine().clone();
    chunks::range_body(engine, start.into_bytes(), end).into_response()
}

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

/// Resolves the effective `ack/from` factor for a client request:
/// the `replicas` parameter if given, the engine-configured quorum
/// otherwise. The factor must fit the cluster.
fn requested_factor(
    replicas: Option<&str>,
    quorum: ReplicasFactor,
    nodes: usize,
) -> Result<ReplicasFactor, FactorError> {
    let factor = match replicas {
        Some(raw) => ReplicasFactor::parse(raw)?,
        None => quorum,
    };
    if !factor.fits(nodes) {
        return Err(FactorError::OutOfRange {
            ack: factor.ack(),
            from: factor.from(),
        });
    }
    Ok(factor)
}

/// Extracts the forwarded expiration instant of a proxied write.
fn proxied_expire(headers: &HeaderMap) -> Result<Option<i64>, Response> {
    let Some(raw) = headers.get(EXPIRES_HEADER) else {
        return Ok(None);
    };
    let parsed = raw.to_str().ok().and_then(parse_expires);
    match parsed {
        Some(expire) => Ok(Some(expire)),
        None => Err(StatusCode::BAD_REQUEST.into_response()),
    }
}

fn with_timestamp(status: StatusCode, timestamp: i64, body: Vec<u8>) -> Response {
    (status, [(TIMESTAMP_HEADER, timestamp.to_string())], body).into_response()
}

fn not_enough_replicas() -> Response {
    (StatusCode::GATEWAY_TIMEOUT, NOT_ENOUGH_REPLICAS).into_response()
}

fn internal(err: &ClusterError) -> Response {
    error!(%err, "request failed");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}
