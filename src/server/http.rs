//! HTTP server implementation using hyper

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::AccessPolicy;
use crate::cache::spawn_cleanup_task;
use crate::config::Args;
use crate::engine::ReportQueryEngine;
use crate::reports::ReportCatalog;
use crate::routes::{self, ReportRoute, QueryParams, API_PREFIX};
use crate::settings::AdminSettings;
use crate::types::StatsError;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub engine: Arc<ReportQueryEngine>,
    pub catalog: ReportCatalog,
    pub access: AccessPolicy,
    pub settings: Arc<AdminSettings>,
}

impl AppState {
    pub fn new(args: Args, engine: Arc<ReportQueryEngine>, access: AccessPolicy) -> Self {
        let settings = Arc::clone(engine.settings());
        let catalog = ReportCatalog::new(Arc::clone(&engine));
        Self {
            args,
            engine,
            catalog,
            access,
            settings,
        }
    }
}

/// Protected endpoints under the namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Report(ReportRoute),
    ClearCache,
    GetSettings,
    UpdateSettings,
}

impl Endpoint {
    fn resolve(method: &Method, path: &str) -> Option<Self> {
        match (method, path.trim_end_matches('/')) {
            (&Method::POST, "/cache/clear") => Some(Self::ClearCache),
            (&Method::GET, "/settings") => Some(Self::GetSettings),
            (&Method::POST, "/settings") => Some(Self::UpdateSettings),
            (&Method::GET, p) => ReportRoute::from_path(p).map(Self::Report),
            _ => None,
        }
    }
}

/// Run the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), StatsError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("tally listening on {}{}", state.args.listen, API_PREFIX);

    if state.access.is_open() {
        warn!("Authentication disabled - every caller can read reports");
    }

    let cache_config = state.args.cache_config();
    spawn_cleanup_task(
        Arc::clone(state.engine.cache().host_store()),
        cache_config.cleanup_interval,
    );
    info!(
        "Report cache enabled (namespace {}, duration {}s)",
        state.engine.cache().namespace(),
        state.settings.cache_duration()
    );

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Collect the request and route it
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();

    debug!("[{}] {} {}", addr, parts.method, path);

    let auth_header = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());
    let body = body.collect().await?.to_bytes();

    Ok(route(&state, &parts.method, &path, parts.uri.query(), auth_header, body).await)
}

/// Route a request
pub async fn route(
    state: &AppState,
    method: &Method,
    path: &str,
    query: Option<&str>,
    auth_header: Option<&str>,
    body: Bytes,
) -> Response<Full<Bytes>> {
    if method == Method::OPTIONS {
        return preflight_response();
    }

    let Some(sub_path) = path.strip_prefix(API_PREFIX) else {
        return not_found_response(path);
    };

    if method == Method::GET && sub_path.trim_end_matches('/') == "/health" {
        let primary = Arc::clone(state.engine.selector().primary());
        let prefix = state.engine.selector().primary_prefix().to_string();
        return routes::health_check(primary, prefix).await;
    }

    let Some(endpoint) = Endpoint::resolve(method, sub_path) else {
        return not_found_response(path);
    };

    if let Err(e) = state.access.authorize(auth_header) {
        return routes::error_response(&e);
    }

    match endpoint {
        Endpoint::Report(report) => match QueryParams::parse(query) {
            Ok(params) => routes::handle_report(state.catalog.clone(), report, params).await,
            Err(e) => routes::error_response(&e),
        },
        Endpoint::ClearCache => routes::clear_cache(&state.engine),
        Endpoint::GetSettings => routes::get_settings(&state.settings),
        Endpoint::UpdateSettings => routes::update_settings(&state.settings, &body),
    }
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    response
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    routes::error_response(&StatsError::NotFound(format!("No route for {}", path)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_resolution() {
        assert_eq!(
            Endpoint::resolve(&Method::GET, "/mrr/current"),
            Some(Endpoint::Report(ReportRoute::MrrCurrent))
        );
        assert_eq!(
            Endpoint::resolve(&Method::POST, "/cache/clear"),
            Some(Endpoint::ClearCache)
        );
        assert_eq!(Endpoint::resolve(&Method::GET, "/cache/clear"), None);
        assert_eq!(Endpoint::resolve(&Method::POST, "/revenue/by-month"), None);
        assert_eq!(
            Endpoint::resolve(&Method::POST, "/settings/"),
            Some(Endpoint::UpdateSettings)
        );
    }

    #[test]
    fn test_preflight_headers() {
        let response = preflight_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
            "GET, POST, OPTIONS"
        );
    }
}
