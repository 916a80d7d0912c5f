//! Declared policy model.
//!
//! # Purpose
//! The shapes operators author: named, reusable group policies per resource
//! category, and the project list that references them. These are read-only
//! inputs; the engine never mutates them.
//!
//! # Key invariants
//! - `PermissionType` is closed. Anything other than `Allow`, `Deny` or
//!   `NotSet` is rejected when the document is decoded.
//! - Unknown keys are rejected so typos surface before any remote call.
use crate::errors::{EntityKind, ReconcileError, ReconcileResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionType {
    Allow,
    Deny,
    NotSet,
}

impl std::fmt::Display for PermissionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PermissionType::Allow => "Allow",
            PermissionType::Deny => "Deny",
            PermissionType::NotSet => "NotSet",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PermissionType,
}

/// One group definition inside a policy.
///
/// `members: None` leaves membership untouched; `Some(vec![])` empties the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupPolicy {
    pub name: String,
    #[serde(default)]
    pub members: Option<Vec<String>>,
    #[serde(default)]
    pub permissions: Vec<PermissionEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub name: String,
    pub category: ResourceCategory,
    pub groups: Vec<GroupPolicy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    Project,
    Build,
    Release,
    Repository,
    Work,
}

impl ResourceCategory {
    /// Application order used by the orchestrator.
    pub const ALL: [ResourceCategory; 5] = [
        ResourceCategory::Project,
        ResourceCategory::Build,
        ResourceCategory::Release,
        ResourceCategory::Repository,
        ResourceCategory::Work,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceCategory::Project => "project",
            ResourceCategory::Build => "build",
            ResourceCategory::Release => "release",
            ResourceCategory::Repository => "repository",
            ResourceCategory::Work => "work",
        }
    }
}

impl std::fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy names a project references, one optional slot per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyReferences {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub build: Option<String>,
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub work: Option<String>,
}

impl PolicyReferences {
    pub fn get(&self, category: ResourceCategory) -> Option<&str> {
        match category {
            ResourceCategory::Project => self.project.as_deref(),
            ResourceCategory::Build => self.build.as_deref(),
            ResourceCategory::Release => self.release.as_deref(),
            ResourceCategory::Repository => self.repository.as_deref(),
            ResourceCategory::Work => self.work.as_deref(),
        }
    }
}

/// Named policies per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyLibrary {
    #[serde(default)]
    pub project: BTreeMap<String, Vec<GroupPolicy>>,
    #[serde(default)]
    pub build: BTreeMap<String, Vec<GroupPolicy>>,
    #[serde(default)]
    pub release: BTreeMap<String, Vec<GroupPolicy>>,
    #[serde(default)]
    pub repository: BTreeMap<String, Vec<GroupPolicy>>,
    #[serde(default)]
    pub work: BTreeMap<String, Vec<GroupPolicy>>,
}

impl PolicyLibrary {
    pub fn category(&self, category: ResourceCategory) -> &BTreeMap<String, Vec<GroupPolicy>> {
        match category {
            ResourceCategory::Project => &self.project,
            ResourceCategory::Build => &self.build,
            ResourceCategory::Release => &self.release,
            ResourceCategory::Repository => &self.repository,
            ResourceCategory::Work => &self.work,
        }
    }

    pub fn policy(&self, category: ResourceCategory, name: &str) -> ReconcileResult<Policy> {
        let groups = self.category(category).get(name).ok_or_else(|| {
            ReconcileError::not_found(EntityKind::Policy, format!("{category}/{name}"))
        })?;
        Ok(Policy {
            name: name.to_string(),
            category,
            groups: groups.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub process_template: Option<String>,
    #[serde(default)]
    pub policies: PolicyReferences,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyDocument {
    #[serde(default)]
    pub projects: Vec<ProjectDefinition>,
    #[serde(default)]
    pub policies: PolicyLibrary,
}

/// Which parts of the run are enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    pub project_setup: bool,
    pub access_permissions: bool,
    pub branch_policies: bool,
    pub service_connections: bool,
}
