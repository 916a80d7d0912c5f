//! Remote platform boundary for warden.
//!
//! # Purpose
//! Describes every call the reconciler makes as a plain `ApiRequest`
//! (method, host, path, api-version, query, body) and decodes the answers into
//! explicit DTOs. The `PlatformApi` trait is the only seam the engine depends on;
//! `HttpPlatformClient` is the reqwest-backed implementation used in production.
//!
//! # Key invariants
//! - Requests are values: they can be re-sent verbatim by retry wrappers.
//! - DTOs decode defensively; optional fields default instead of failing.
//!
//! # Examples
//! ```rust
//! use warden_api::{Method, Service, endpoints};
//!
//! let request = endpoints::security_namespaces();
//! assert_eq!(request.method, Method::Get);
//! assert_eq!(request.service, Service::Core);
//! ```

mod client;
pub mod endpoints;
mod errors;
mod request;
mod types;

pub use client::{ClientConfig, HttpPlatformClient, PlatformApi};
pub use errors::{ApiError, ApiResult};
pub use request::{ApiRequest, Method, Service};
pub use types::{
    AccessControlEntriesRequest, AccessControlEntry, AceExtendedInfo, ClassificationNode,
    DataProviderResult, DisplayPermission, GraphDescriptor, GraphGroup, GraphMembership,
    GraphSubject, GroupPermissionsProvider, Identity, IdentityKind, IdentityPermissions,
    IdentityPickerResponse, IdentityPickerResult, ListResponse, NamespaceAction,
    SecurityNamespace, SubjectPermission, TeamProject,
};
