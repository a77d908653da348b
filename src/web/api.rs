use crate::aggregator::Aggregator;
use crate::error::Error;
use crate::metrics::Metrics;
use crate::web::validation::{parse_query_options, search_query};
use log::{error, info};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::reply::{self, Response};
use warp::Reply;

fn json_reply<T: Serialize>(value: &T, status: StatusCode) -> Response {
    reply::with_status(reply::json(value), status).into_response()
}

/// Maps a failure to its HTTP status; unexpected errors get a generic body.
pub fn error_reply(err: &Error) -> Response {
    let (status, code, message) = match err {
        Error::ValidationError(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
        other => {
            error!("Request failed: {}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            )
        }
    };
    json_reply(&json!({ "error": code, "message": message }), status)
}

pub async fn list_tokens(
    query: HashMap<String, String>,
    aggregator: Arc<Aggregator>,
) -> Result<Response, Infallible> {
    Ok(match parse_query_options(&query) {
        Ok(options) => json_reply(&aggregator.aggregate(&options).await, StatusCode::OK),
        Err(e) => error_reply(&e),
    })
}

pub async fn search_tokens(
    query: HashMap<String, String>,
    aggregator: Arc<Aggregator>,
) -> Result<Response, Infallible> {
    let parsed = search_query(&query).and_then(|q| Ok((q, parse_query_options(&query)?)));
    let result = match parsed {
        Ok((q, options)) => aggregator.search(&q, &options).await,
        Err(e) => Err(e),
    };
    Ok(match result {
        Ok(page) => json_reply(&page, StatusCode::OK),
        Err(e) => error_reply(&e),
    })
}

pub async fn get_token(address: String, aggregator: Arc<Aggregator>) -> Result<Response, Infallible> {
    Ok(match aggregator.get_by_address(&address).await {
        Ok(Some(token)) => json_reply(&token, StatusCode::OK),
        Ok(None) => error_reply(&Error::NotFound(format!("token {}", address))),
        Err(e) => error_reply(&e),
    })
}

pub async fn refresh(aggregator: Arc<Aggregator>) -> Result<Response, Infallible> {
    let invalidated = aggregator.invalidate().await;
    info!("Manual refresh invalidated {} cache entries", invalidated);
    Ok(json_reply(
        &json!({ "status": "ok", "invalidated": invalidated }),
        StatusCode::OK,
    ))
}

pub async fn health(aggregator: Arc<Aggregator>) -> Result<Response, Infallible> {
    Ok(json_reply(
        &json!({
            "status": "ok",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "sources": aggregator.source_names(),
        }),
        StatusCode::OK,
    ))
}

pub async fn metrics(metrics: Arc<Metrics>) -> Result<Response, Infallible> {
    Ok(match metrics.encode() {
        Ok(text) => reply::with_header(text, "content-type", "text/plain; version=0.0.4").into_response(),
        Err(e) => error_reply(&e),
    })
}
