//! Reconciliation engine converging platform authorization toward declared policy.
//!
//! # Purpose
//! Reads a policy document (projects plus named, reusable group policies) and
//! makes the live platform match it: projects exist and carry the declared
//! description, declared groups exist, their members equal the declared set, and
//! their explicit permissions equal the declared allow/deny/not-set values.
//!
//! # How it fits
//! `warden-api` owns the wire boundary (`PlatformApi`, requests, response
//! shapes). This crate owns every decision: what to read, what differs, and
//! what to change. The `warden` service wires configuration, logging and the
//! HTTP client around [`Orchestrator`].
//!
//! # Key invariants
//! - Every remote call goes through [`RetryableCaller`]; only the lazy
//!   capability probes use the non-retrying path.
//! - Reconciliation is idempotent: a second run over converged state issues no
//!   mutations.
//! - There is no rollback. Partial progress is left in place and converged by
//!   the next run.
//!
//! # Common pitfalls
//! - Two runs against the same project at once race on membership and
//!   permission writes. Operators must serialize runs.
//! - Identity matching is a heuristic over display and account names; names
//!   that overlap can resolve to the wrong principal.
//!
//! # Examples
//! ```rust
//! use warden_reconcile::{PermissionMutation, PermissionSetScope, PermissionType};
//!
//! let scope = PermissionSetScope::new("ns-git", "repoV2/project-id/");
//! let mutation = PermissionMutation::plan(PermissionType::NotSet, "descriptor", &scope, 4);
//! assert!(matches!(mutation, PermissionMutation::Remove { bit: 4, .. }));
//! ```

mod context;
mod errors;
mod groups;
mod identity;
mod membership;
mod namespace;
mod orchestrator;
mod pacing;
mod permission;
mod policy;
mod retry;
pub mod updaters;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use context::ReconcileContext;
pub use errors::{EntityKind, ReconcileError, ReconcileResult};
pub use groups::{GroupDirectory, display_name_of};
pub use identity::{IdentityResolver, candidate_matches, is_email_like, search_types};
pub use membership::{MembershipOutcome, MembershipReconciler};
pub use namespace::{NamespaceCatalog, action};
pub use orchestrator::{DEFAULT_PROCESS_TEMPLATE_ID, DEFAULT_VISIBILITY, Orchestrator};
pub use pacing::{DEFAULT_THINK_TIME_MAX, DEFAULT_THINK_TIME_MIN, Pacing};
pub use permission::{
    PermissionMutation, PermissionOutcome, PermissionReconciler, PermissionSetScope,
    explicit_state,
};
pub use policy::{
    FeatureFlags, GroupPolicy, PermissionEntry, PermissionType, Policy, PolicyDocument,
    PolicyLibrary, PolicyReferences, ProjectDefinition, ResourceCategory,
};
pub use retry::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY, RetryPolicy, RetryableCaller, retry};
pub use updaters::{PermissionTarget, ResourceUpdater, updater_for};
