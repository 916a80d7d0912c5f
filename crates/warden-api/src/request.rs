use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which platform host a request is addressed to.
///
/// The platform splits its API between an organization host and an identity
/// graph host; each is configured separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Core,
    Graph,
}

/// One outbound call, described as data so it can be logged and re-sent.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub service: Service,
    pub path: String,
    pub api_version: Option<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, service: Service, path: impl Into<String>) -> Self {
        Self {
            method,
            service,
            path: path.into(),
            api_version: None,
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(service: Service, path: impl Into<String>) -> Self {
        Self::new(Method::Get, service, path)
    }

    pub fn post(service: Service, path: impl Into<String>) -> Self {
        Self::new(Method::Post, service, path)
    }

    pub fn put(service: Service, path: impl Into<String>) -> Self {
        Self::new(Method::Put, service, path)
    }

    pub fn patch(service: Service, path: impl Into<String>) -> Self {
        Self::new(Method::Patch, service, path)
    }

    pub fn delete(service: Service, path: impl Into<String>) -> Self {
        Self::new(Method::Delete, service, path)
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Value of the first query parameter named `key`.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}
