// HTTP client for the platform API.
// Every call is one request/response; retries live in the reconciler so the
// client stays a plain pass-through.
use crate::errors::{ApiError, ApiResult};
use crate::request::{ApiRequest, Method, Service};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// The only seam between the reconciler and the remote platform.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> ApiResult<Value>;
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub core_url: String,
    pub graph_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct HttpPlatformClient {
    client: reqwest::Client,
    core_url: String,
    graph_url: String,
    token: Option<String>,
}

impl HttpPlatformClient {
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        if config.core_url.trim().is_empty() {
            return Err(ApiError::InvalidConfig(
                "organization url must not be empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            core_url: config.core_url.trim_end_matches('/').to_string(),
            graph_url: config.graph_url.trim_end_matches('/').to_string(),
            token: config.token,
        })
    }

    fn base_url(&self, service: Service) -> &str {
        match service {
            Service::Core => &self.core_url,
            Service::Graph => &self.graph_url,
        }
    }

    pub fn url_for(&self, request: &ApiRequest) -> String {
        format!(
            "{}/{}",
            self.base_url(request.service),
            request.path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl PlatformApi for HttpPlatformClient {
    async fn send(&self, request: &ApiRequest) -> ApiResult<Value> {
        let url = self.url_for(request);
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };
        let mut builder = self.client.request(method, &url).query(&request.query);
        if let Some(version) = &request.api_version {
            builder = builder.query(&[("api-version", version.as_str())]);
        }
        if let Some(token) = &self.token {
            builder = builder.basic_auth("", Some(token));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(method = %request.method, %url, "platform request");
        let response = builder.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::{Path, Query};
    use axum::http::StatusCode;
    use axum::routing::{delete, get};
    use serde_json::json;
    use std::collections::HashMap;
    use std::net::SocketAddr;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app.into_make_service()).await;
        });
        addr
    }

    fn client_for(addr: SocketAddr) -> HttpPlatformClient {
        let base = format!("http://{addr}/org/");
        HttpPlatformClient::new(ClientConfig {
            core_url: base.clone(),
            graph_url: base,
            token: Some("pat".to_string()),
            timeout: Duration::from_secs(2),
        })
        .expect("client")
    }

    #[tokio::test]
    async fn send_appends_api_version_and_decodes_json() {
        let app = Router::new().route(
            "/org/_apis/projects/:id",
            get(
                |Path(id): Path<String>, Query(query): Query<HashMap<String, String>>| async move {
                    axum::Json(json!({
                        "id": id,
                        "version": query.get("api-version").cloned().unwrap_or_default()
                    }))
                },
            ),
        );
        let client = client_for(serve(app).await);
        let request = ApiRequest::get(Service::Core, "_apis/projects/p1").api_version("7.1");
        let value = client.send(&request).await.expect("send");
        assert_eq!(value["id"], json!("p1"));
        assert_eq!(value["version"], json!("7.1"));
    }

    #[tokio::test]
    async fn send_maps_error_status() {
        let app = Router::new().route(
            "/org/_apis/missing",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "try later") }),
        );
        let client = client_for(serve(app).await);
        let err = client
            .send(&ApiRequest::get(Service::Core, "_apis/missing"))
            .await
            .expect_err("status error");
        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().contains("try later"));
    }

    #[tokio::test]
    async fn send_treats_empty_body_as_null() {
        let app = Router::new().route(
            "/org/_apis/graph/memberships/:member/:container",
            delete(|| async { StatusCode::OK }),
        );
        let client = client_for(serve(app).await);
        let value = client
            .send(&ApiRequest::delete(
                Service::Graph,
                "_apis/graph/memberships/m/c",
            ))
            .await
            .expect("send");
        assert!(value.is_null());
    }

    #[test]
    fn new_rejects_empty_organization_url() {
        let err = HttpPlatformClient::new(ClientConfig {
            core_url: " ".to_string(),
            graph_url: String::new(),
            token: None,
            timeout: Duration::from_secs(1),
        })
        .err()
        .expect("invalid config");
        assert!(matches!(err, ApiError::InvalidConfig(_)));
    }

    #[test]
    fn url_for_joins_service_base_and_path() {
        let client = HttpPlatformClient::new(ClientConfig {
            core_url: "https://dev.example.com/org/".to_string(),
            graph_url: "https://graph.example.com/org".to_string(),
            token: None,
            timeout: Duration::from_secs(1),
        })
        .expect("client");
        let request = ApiRequest::get(Service::Graph, "/_apis/graph/groups");
        assert_eq!(
            client.url_for(&request),
            "https://graph.example.com/org/_apis/graph/groups"
        );
    }
}
