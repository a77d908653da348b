use crate::aggregator::Aggregator;
use crate::metrics::Metrics;
use crate::realtime::RealtimeService;
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

pub mod api;
pub mod validation;
pub mod ws;

pub use validation::InboundRateLimiter;

/// Everything the HTTP and WebSocket routes need.
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub realtime: RealtimeService,
    pub metrics: Arc<Metrics>,
    pub limiter: Arc<InboundRateLimiter>,
}

#[derive(Debug)]
struct Throttled;

impl warp::reject::Reject for Throttled {}

fn with<T: Clone + Send>(value: T) -> impl Filter<Extract = (T,), Error = Infallible> + Clone {
    warp::any().map(move || value.clone())
}

fn throttle(
    limiter: Arc<InboundRateLimiter>,
) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::addr::remote()
        .and(with(limiter))
        .and_then(|addr: Option<SocketAddr>, limiter: Arc<InboundRateLimiter>| async move {
            let client = addr
                .map(|a| a.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            if limiter.check(&client).await {
                Ok(())
            } else {
                Err(warp::reject::custom(Throttled))
            }
        })
        .untuple_one()
}

/// The full route tree: `/api/tokens*` (throttled per client), `/health`,
/// `/metrics` and the `/ws` upgrade.
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let aggregator = with(state.aggregator.clone());

    let list = warp::path!("tokens")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(aggregator.clone())
        .and_then(api::list_tokens);
    let search = warp::path!("tokens" / "search")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(aggregator.clone())
        .and_then(api::search_tokens);
    let refresh = warp::path!("tokens" / "refresh")
        .and(warp::post())
        .and(aggregator.clone())
        .and_then(api::refresh);
    let by_address = warp::path!("tokens" / String)
        .and(warp::get())
        .and(aggregator.clone())
        .and_then(api::get_token);

    let tokens_api = warp::path("api")
        .and(throttle(state.limiter.clone()))
        .and(list.or(search).or(refresh).or(by_address));

    let health = warp::path!("health")
        .and(warp::get())
        .and(aggregator)
        .and_then(api::health);
    let metrics = warp::path!("metrics")
        .and(warp::get())
        .and(with(state.metrics.clone()))
        .and_then(api::metrics);
    let socket = warp::path!("ws")
        .and(warp::ws())
        .and(with(state.realtime.clone()))
        .map(|upgrade: warp::ws::Ws, service: RealtimeService| {
            upgrade.on_upgrade(move |socket| ws::handle_socket(socket, service))
        });

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST"])
        .allow_headers(vec!["content-type"]);

    tokens_api
        .or(health)
        .or(metrics)
        .or(socket)
        .recover(handle_rejection)
        .with(cors)
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "NOT_FOUND", "Route not found")
    } else if err.find::<Throttled>().is_some() {
        (
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMIT_EXCEEDED",
            "Too many requests",
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "METHOD_NOT_ALLOWED",
            "Method not allowed",
        )
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        (StatusCode::BAD_REQUEST, "BAD_REQUEST", "Invalid query string")
    } else {
        log::error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "Internal server error",
        )
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "error": code, "message": message })),
        status,
    ))
}
