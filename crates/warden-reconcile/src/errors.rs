use thiserror::Error;
use warden_api::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Project,
    Policy,
    Namespace,
    Permission,
    Identity,
    Group,
    ClassificationNode,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Project => "project",
            EntityKind::Policy => "policy",
            EntityKind::Namespace => "namespace",
            EntityKind::Permission => "permission",
            EntityKind::Identity => "identity",
            EntityKind::Group => "group",
            EntityKind::ClassificationNode => "classification node",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: EntityKind, name: String },
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: ApiError,
    },
    #[error("{operation} failed: {source}")]
    Remote {
        operation: String,
        #[source]
        source: ApiError,
    },
    #[error("{operation} returned an unexpected shape: {source}")]
    Decode {
        operation: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{operation} could not be encoded: {source}")]
    Encode {
        operation: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("reconciliation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ReconcileError {
    pub fn not_found(kind: EntityKind, name: impl Into<String>) -> Self {
        ReconcileError::NotFound {
            kind,
            name: name.into(),
        }
    }
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
