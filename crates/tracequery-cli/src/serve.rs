//! HTTP front end for natural-language trace search.
//!
//! Routes:
//! - `GET /healthz` → `ok`
//! - `POST /api/ai/parse-query` with `{"query": "..."}` →
//!   `{"params": <SearchParams>, "query": <query map>}`
//!
//! Failures are `{"error", "code", "retryable"}` with a status derived from the
//! error kind. A server started with the feature disabled answers every parse
//! request with 503.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use tracequery_nlq::{ErrorProjection, NlqError, QueryParser, RequestContext};

pub const PARSE_QUERY_PATH: &str = "/api/ai/parse-query";

#[derive(Clone)]
pub struct ServeConfig {
    pub listen: SocketAddr,
    pub projection: ErrorProjection,
}

pub struct ServerState {
    /// `None` when natural-language query is disabled.
    parser: Option<QueryParser>,
    projection: ErrorProjection,
}

impl ServerState {
    pub fn new(parser: Option<QueryParser>, projection: ErrorProjection) -> Self {
        Self { parser, projection }
    }
}

#[derive(Debug, Deserialize)]
struct ParseQueryRequest {
    query: String,
}

pub fn serve(config: ServeConfig, parser: Option<QueryParser>) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;

    let state = Arc::new(ServerState::new(parser, config.projection));
    rt.block_on(async move { serve_async(config.listen, state).await })
}

async fn serve_async(listen: SocketAddr, state: Arc<ServerState>) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .map_err(|e| anyhow!("serve: failed to bind {listen}: {e}"))?;
    let bound = listener
        .local_addr()
        .map_err(|e| anyhow!("serve: failed to read bound addr: {e}"))?;

    info!(
        addr = %bound,
        enabled = state.parser.is_some(),
        "listening on http://{bound}"
    );

    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|e| anyhow!("serve: accept failed: {e}"))?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, state.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                warn!(%peer, error = %e, "connection error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<ServerState>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let body = req.into_body().collect().await?.to_bytes();
    Ok(route(&method, &path, &body, &state).await)
}

/// Dispatch a fully-read request.
pub async fn route(
    method: &Method,
    path: &str,
    body: &[u8],
    state: &ServerState,
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/healthz") => text_response(StatusCode::OK, "ok\n"),
        (&Method::POST, PARSE_QUERY_PATH) => handle_parse_query(state, body).await,
        (_, PARSE_QUERY_PATH) | (_, "/healthz") => json_error(
            StatusCode::METHOD_NOT_ALLOWED,
            "METHOD_NOT_ALLOWED",
            &format!("{method} is not allowed on {path}"),
            false,
        ),
        _ => json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "not found", false),
    }
}

async fn handle_parse_query(state: &ServerState, body: &[u8]) -> Response<Full<Bytes>> {
    let Some(parser) = state.parser.as_ref() else {
        return json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "natural language query is disabled",
            false,
        );
    };

    let req: ParseQueryRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            return json_error(
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                &format!("failed to parse request JSON: {e}"),
                false,
            )
        }
    };

    match parser.parse_with(&RequestContext::background(), &req.query).await {
        Ok(params) => {
            debug!(fields = params.to_query_map().len(), "parsed query");
            let payload = serde_json::json!({
                "params": params,
                "query": params.to_query_map_with(state.projection),
            });
            json_response(StatusCode::OK, &payload)
        }
        Err(err) => nlq_error_response(&err),
    }
}

fn status_for(err: &NlqError) -> StatusCode {
    match err.code() {
        "EMPTY_QUERY" => StatusCode::BAD_REQUEST,
        "TIMEOUT" => StatusCode::GATEWAY_TIMEOUT,
        "GENERATION_FAILED" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn nlq_error_response(err: &NlqError) -> Response<Full<Bytes>> {
    json_error(status_for(err), err.code(), &err.to_string(), err.is_retryable())
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(body.as_bytes()))))
}

fn json_response<T: serde::Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{\"error\":\"serialize\"}".to_vec());
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"{\"error\":\"internal\"}"))))
}

/// `error` and `message` carry the same text; clients read either.
fn json_error(status: StatusCode, code: &str, msg: &str, retryable: bool) -> Response<Full<Bytes>> {
    let v = serde_json::json!({
        "error": msg,
        "message": msg,
        "code": code,
        "retryable": retryable,
    });
    json_response(status, &v)
}
