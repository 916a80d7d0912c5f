// Serves the in-memory platform over HTTP so tests drive the real reqwest client.
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{Method as HttpMethod, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use warden::config::WardenConfig;
use warden_api::{ApiError, ApiRequest, Method, PlatformApi, Service};
use warden_reconcile::test_support::FakePlatform;

pub const ORG_PREFIX: &str = "/acme/";

pub async fn serve(platform: FakePlatform) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new().fallback(dispatch).with_state(platform);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app.into_make_service()).await;
    });
    addr
}

pub fn config_for(addr: SocketAddr) -> WardenConfig {
    let base = format!("http://{addr}{ORG_PREFIX}");
    WardenConfig {
        organization_url: base.clone(),
        graph_url: Some(base),
        token: Some("test-pat".to_string()),
        retry_attempts: 3,
        retry_delay_ms: 10,
        think_time_min_ms: 0,
        think_time_max_ms: 0,
        http_timeout_ms: Duration::from_secs(5).as_millis() as u64,
    }
}

async fn dispatch(
    State(platform): State<FakePlatform>,
    method: HttpMethod,
    uri: Uri,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Response {
    let method = match method {
        HttpMethod::GET => Method::Get,
        HttpMethod::POST => Method::Post,
        HttpMethod::PUT => Method::Put,
        HttpMethod::PATCH => Method::Patch,
        HttpMethod::DELETE => Method::Delete,
        _ => return StatusCode::METHOD_NOT_ALLOWED.into_response(),
    };
    let Some(path) = uri.path().strip_prefix(ORG_PREFIX) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let mut request = ApiRequest::new(method, Service::Core, path);
    for (key, value) in query {
        if key == "api-version" {
            request = request.api_version(value);
        } else {
            request = request.query(key, value);
        }
    }
    if !body.is_empty() {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => request = request.json(value),
            Err(_) => return StatusCode::BAD_REQUEST.into_response(),
        }
    }
    match platform.send(&request).await {
        Ok(value) => axum::Json(value).into_response(),
        Err(ApiError::Status { status, body }) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}
