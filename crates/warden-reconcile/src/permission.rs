//! Explicit permission convergence for one subject within one scope.
//!
//! # Purpose
//! Compares the declared `(permission name, type)` list against the live
//! explicit state of a group and issues one mutation per difference.
//!
//! # Key invariants
//! - Live explicit values: `0` not set, `1` allow, `2` deny. Inherited values
//!   (`3`, `4`) carry no explicit grant and count as not set.
//! - `Allow` and `Deny` are merged ACE writes; `NotSet` deletes the single bit.
//! - An entry already in the declared state is skipped without a remote call,
//!   so a second run over unchanged state issues no mutations.
//! - A declared name the platform does not display is `NotFound(permission)`.
//! - A page that does not name the subject's descriptor is `NotFound(identity)`;
//!   nothing is written against a placeholder.
use crate::context::ReconcileContext;
use crate::errors::{EntityKind, ReconcileError, ReconcileResult};
use crate::policy::{PermissionEntry, PermissionType};
use crate::retry::decode;
use warden_api::{
    AccessControlEntriesRequest, AccessControlEntry, AceExtendedInfo, ApiRequest,
    DataProviderResult, GraphGroup, GroupPermissionsProvider, IdentityPermissions, endpoints,
};

/// A namespace plus the opaque token naming one securable within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermissionSetScope {
    pub namespace_id: String,
    pub token: String,
}

impl PermissionSetScope {
    pub fn new(namespace_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            namespace_id: namespace_id.into(),
            token: token.into(),
        }
    }
}

/// Map a live explicit value onto the declared vocabulary.
pub fn explicit_state(value: u32) -> PermissionType {
    match value {
        1 => PermissionType::Allow,
        2 => PermissionType::Deny,
        _ => PermissionType::NotSet,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionMutation {
    Set {
        descriptor: String,
        scope: PermissionSetScope,
        entry: AccessControlEntry,
    },
    Remove {
        descriptor: String,
        scope: PermissionSetScope,
        bit: u32,
    },
}

impl PermissionMutation {
    pub fn plan(kind: PermissionType, descriptor: &str, scope: &PermissionSetScope, bit: u32) -> Self {
        let (allow, deny, extended_info) = match kind {
            PermissionType::Allow => (
                bit,
                0,
                AceExtendedInfo {
                    effective_allow: bit,
                    inherited_allow: bit,
                    ..AceExtendedInfo::default()
                },
            ),
            PermissionType::Deny => (
                0,
                bit,
                AceExtendedInfo {
                    effective_deny: bit,
                    inherited_deny: bit,
                    ..AceExtendedInfo::default()
                },
            ),
            PermissionType::NotSet => {
                return PermissionMutation::Remove {
                    descriptor: descriptor.to_string(),
                    scope: scope.clone(),
                    bit,
                };
            }
        };
        PermissionMutation::Set {
            descriptor: descriptor.to_string(),
            scope: scope.clone(),
            entry: AccessControlEntry {
                descriptor: descriptor.to_string(),
                allow,
                deny,
                extended_info,
            },
        }
    }

    pub fn to_request(&self) -> ReconcileResult<ApiRequest> {
        match self {
            PermissionMutation::Set { scope, entry, .. } => {
                let body = serde_json::to_value(AccessControlEntriesRequest {
                    token: scope.token.clone(),
                    merge: true,
                    access_control_entries: vec![entry.clone()],
                })
                .map_err(|source| ReconcileError::Encode {
                    operation: "access control entries".to_string(),
                    source,
                })?;
                Ok(endpoints::set_access_control_entries(&scope.namespace_id, body))
            }
            PermissionMutation::Remove {
                descriptor,
                scope,
                bit,
            } => Ok(endpoints::remove_permission(
                &scope.namespace_id,
                *bit,
                descriptor,
                &scope.token,
            )),
        }
    }
}

/// Names applied and skipped by one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionOutcome {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
}

/// Live permission as either page reports it.
#[derive(Debug, Clone)]
struct LivePermission {
    display_name: String,
    bit: u32,
    explicit: u32,
    scope: PermissionSetScope,
}

#[derive(Clone)]
pub struct PermissionReconciler {
    ctx: ReconcileContext,
}

impl PermissionReconciler {
    pub fn new(ctx: ReconcileContext) -> Self {
        Self { ctx }
    }

    /// Reconcile project-level permissions shown on the group's provider document.
    pub async fn reconcile_group(
        &self,
        project_id: &str,
        group: &GraphGroup,
        declared: &[PermissionEntry],
    ) -> ReconcileResult<PermissionOutcome> {
        const OPERATION: &str = "read group permissions";
        let mut result: DataProviderResult = self
            .ctx
            .caller
            .call(
                OPERATION,
                endpoints::group_permissions(project_id, &group.descriptor),
            )
            .await?;
        let document = result
            .data_providers
            .remove(endpoints::GROUP_PERMISSIONS_PROVIDER)
            .unwrap_or_default();
        let provider: GroupPermissionsProvider = decode(OPERATION, document)?;
        let live = provider
            .subject_permissions
            .into_iter()
            .map(|permission| LivePermission {
                display_name: permission.display_name,
                bit: permission.bit,
                explicit: permission.explicit_permission_value,
                scope: PermissionSetScope::new(permission.namespace_id, permission.token),
            })
            .collect();
        let descriptor = require_descriptor(group, Some(provider.identity_descriptor))?;
        self.converge(group, &descriptor, live, declared).await
    }

    /// Reconcile explicit permissions of `group` on one securable.
    pub async fn reconcile_identity(
        &self,
        project_id: &str,
        scope: &PermissionSetScope,
        group: &GraphGroup,
        declared: &[PermissionEntry],
    ) -> ReconcileResult<PermissionOutcome> {
        let page: IdentityPermissions = self
            .ctx
            .caller
            .call(
                "read display permissions",
                endpoints::display_permissions(
                    project_id,
                    &group.origin_id,
                    &scope.namespace_id,
                    &scope.token,
                ),
            )
            .await?;
        let descriptor = require_descriptor(group, page.descriptor())?;
        let live = page
            .permissions
            .into_iter()
            .map(|permission| LivePermission {
                display_name: permission.display_name,
                bit: permission.permission_bit,
                explicit: permission.explicit_permission_id,
                scope: scope.clone(),
            })
            .collect();
        self.converge(group, &descriptor, live, declared).await
    }

    async fn converge(
        &self,
        group: &GraphGroup,
        descriptor: &str,
        live: Vec<LivePermission>,
        declared: &[PermissionEntry],
    ) -> ReconcileResult<PermissionOutcome> {
        let mut outcome = PermissionOutcome::default();
        for entry in declared {
            let name = entry.name.trim();
            let current = live
                .iter()
                .find(|permission| permission.display_name.trim() == name)
                .ok_or_else(|| ReconcileError::not_found(EntityKind::Permission, name))?;
            if explicit_state(current.explicit) == entry.kind {
                tracing::info!(
                    component = "permission",
                    group = %group.principal_name,
                    permission = name,
                    state = %entry.kind,
                    "permission already in declared state"
                );
                outcome.skipped.push(name.to_string());
                continue;
            }
            tracing::info!(
                component = "permission",
                group = %group.principal_name,
                permission = name,
                from = %explicit_state(current.explicit),
                to = %entry.kind,
                "applying permission"
            );
            let mutation = PermissionMutation::plan(entry.kind, descriptor, &current.scope, current.bit);
            self.ctx
                .caller
                .execute("apply permission", mutation.to_request()?)
                .await?;
            outcome.applied.push(name.to_string());
        }
        Ok(outcome)
    }
}

fn require_descriptor(group: &GraphGroup, descriptor: Option<String>) -> ReconcileResult<String> {
    descriptor
        .filter(|descriptor| !descriptor.trim().is_empty())
        .ok_or_else(|| {
            ReconcileError::not_found(
                EntityKind::Identity,
                format!("permission descriptor of {}", group.principal_name),
            )
        })
}
