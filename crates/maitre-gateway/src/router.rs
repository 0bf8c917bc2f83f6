use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{chat_handler, health_handler};
use crate::server::AppState;

const RATE_WINDOW: Duration = Duration::from_secs(60);
const MAX_TRACKED_CLIENTS: usize = 10_000;

#[derive(Clone)]
struct AuthConfig {
    token: Option<String>,
}

#[derive(Clone)]
struct RateLimiter {
    limit: u32,
    windows: Arc<Mutex<HashMap<IpAddr, (u32, Instant)>>>,
}

pub(crate) fn build_router(
    state: AppState,
    auth_token: Option<String>,
    rate_limit: u32,
    max_body_size: usize,
) -> Router {
    let auth = AuthConfig { token: auth_token };
    let limiter = RateLimiter {
        limit: rate_limit,
        windows: Arc::new(Mutex::new(HashMap::new())),
    };

    let protected = Router::new().route("/chat", post(chat_handler));
    #[cfg(feature = "speech")]
    let protected = protected.route("/voice", post(crate::voice::voice_handler));
    let protected = protected
        .layer(middleware::from_fn_with_state(limiter, rate_limit_layer))
        .layer(middleware::from_fn_with_state(auth, auth_layer))
        .layer(RequestBodyLimitLayer::new(max_body_size));

    // The browser frontend is served from a different origin.
    Router::new()
        .route("/health", get(health_handler))
        .merge(protected)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn auth_layer(
    axum::extract::State(cfg): axum::extract::State<AuthConfig>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(ref expected) = cfg.token {
        let presented = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or("");

        // Fixed-length digests avoid leaking the token length.
        let presented_hash = blake3::hash(presented.as_bytes());
        let expected_hash = blake3::hash(expected.as_bytes());
        if !bool::from(presented_hash.as_bytes().ct_eq(expected_hash.as_bytes())) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    next.run(req).await
}

async fn rate_limit_layer(
    axum::extract::State(limiter): axum::extract::State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if limiter.limit == 0 {
        return next.run(req).await;
    }

    let ip = req
        .extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
        .map_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), |ci| ci.0.ip());

    let now = Instant::now();
    let mut windows = limiter.windows.lock().await;

    if windows.len() >= MAX_TRACKED_CLIENTS && !windows.contains_key(&ip) {
        windows.retain(|_, (_, started)| now.duration_since(*started) < RATE_WINDOW);
    }

    let entry = windows.entry(ip).or_insert((0, now));
    if now.duration_since(entry.1) >= RATE_WINDOW {
        *entry = (1, now);
    } else {
        entry.0 += 1;
        if entry.0 > limiter.limit {
            return StatusCode::TOO_MANY_REQUESTS.into_response();
        }
    }
    drop(windows);

    next.run(req).await
}
