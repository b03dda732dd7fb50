use axum::{
    extract::{DefaultBodyLimit, Request, State as AxumState},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::Arena;

mod http;

pub struct Api {
    arena: Arc<Arena>,
}

impl Api {
    pub fn new(arena: Arc<Arena>) -> Self {
        Self { arena }
    }

    pub fn router(&self) -> Router {
        // Browsers from any origin unless ALLOWED_HTTP_ORIGINS narrows it down.
        let allowed_origins = parse_allowed_origins("ALLOWED_HTTP_ORIGINS");
        let allow_origin = if allowed_origins.is_empty() || allowed_origins.contains("*") {
            AllowOrigin::any()
        } else {
            AllowOrigin::list(allowed_origins.iter().filter_map(|origin| {
                match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!("Invalid origin in ALLOWED_HTTP_ORIGINS: {}", origin);
                        None
                    }
                }
            }))
        };
        let cors = CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([
                header::CONTENT_TYPE,
                header::HeaderName::from_static("x-request-id"),
            ])
            .expose_headers([header::HeaderName::from_static("x-request-id")]);

        let router = Router::new()
            .route("/healthz", get(http::healthz))
            .route("/config", get(http::config))
            .route("/metrics/http", get(http::http_metrics))
            .route("/user", post(http::register_user))
            .route("/user/:id", get(http::get_user).delete(http::delete_user))
            .route("/user/:id/take", post(http::take))
            .route("/user/:id/fund", post(http::fund))
            .route("/tournament", post(http::create_tournament))
            .route(
                "/tournament/:id",
                get(http::get_tournament).delete(http::delete_tournament),
            )
            .route("/tournament/:id/join", post(http::join))
            .route("/tournament/:id/finish", post(http::finish))
            .fallback(http::not_found);

        let router = router.layer(cors);
        let router = match self.arena.config().http_body_limit_bytes {
            Some(limit) if limit > 0 => router.layer(DefaultBodyLimit::max(limit)),
            _ => router.layer(DefaultBodyLimit::disable()),
        };
        let router = router.layer(middleware::from_fn_with_state(
            self.arena.clone(),
            request_id_middleware,
        ));
        let router = router.layer(TraceLayer::new_for_http());

        router.with_state(self.arena.clone())
    }
}

fn parse_allowed_origins(var: &str) -> HashSet<String> {
    std::env::var(var)
        .unwrap_or_default()
        .split(',')
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

async fn request_id_middleware(
    AxumState(arena): AxumState<Arc<Arena>>,
    req: Request,
    next: Next,
) -> Response {
    let request_id = req
        .headers()
        .get(header::HeaderName::from_static("x-request-id"))
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let mut response = next.run(req).await;
    if response.status() == StatusCode::PAYLOAD_TOO_LARGE {
        arena.http_metrics().inc_reject_body_limit();
    }
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(
            header::HeaderName::from_static("x-request-id"),
            header_value,
        );
    }
    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "http.request"
    );
    response
}
