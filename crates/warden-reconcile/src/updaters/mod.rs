//! Per-category policy application.
//!
//! # Purpose
//! Each resource category differs only in where its permissions live: the
//! project-level provider document, or an explicit `(namespace, token)` scope.
//! An updater resolves that target once per project and then drives the group,
//! membership and permission reconcilers for every group in the policy.
//!
//! # Concurrency
//! Groups within one policy are independent and run as separate tasks. The
//! join is all-must-succeed: the first failure is returned, and siblings that
//! are still running are detached rather than cancelled. Work inside one group
//! is strictly sequential.
mod build;
mod project;
mod release;
mod repository;
mod work;

pub use build::BuildUpdater;
pub use project::ProjectUpdater;
pub use release::ReleaseUpdater;
pub use repository::RepositoryUpdater;
pub use work::WorkUpdater;

use crate::context::ReconcileContext;
use crate::errors::ReconcileResult;
use crate::groups::GroupDirectory;
use crate::membership::MembershipReconciler;
use crate::permission::{PermissionReconciler, PermissionSetScope};
use crate::policy::{GroupPolicy, Policy, ResourceCategory};
use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::Arc;
use warden_api::TeamProject;

/// Where a category's permissions are read and written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionTarget {
    /// The group's project-level provider document.
    GroupScoped,
    /// Explicit ACEs on one securable.
    Explicit(PermissionSetScope),
}

#[async_trait]
pub trait ResourceUpdater: Send + Sync {
    fn category(&self) -> ResourceCategory;

    fn context(&self) -> &ReconcileContext;

    async fn target(&self, project: &TeamProject) -> ReconcileResult<PermissionTarget>;

    async fn apply(&self, project: &TeamProject, policy: &Policy) -> ReconcileResult<()> {
        let target = self.target(project).await?;
        tracing::info!(
            component = "updater",
            category = %self.category(),
            project = %project.name,
            policy = %policy.name,
            groups = policy.groups.len(),
            "applying policy"
        );
        apply_groups(self.context(), project, target, &policy.groups).await
    }
}

/// The updater for `category`.
pub fn updater_for(category: ResourceCategory, ctx: ReconcileContext) -> Arc<dyn ResourceUpdater> {
    match category {
        ResourceCategory::Project => Arc::new(ProjectUpdater::new(ctx)),
        ResourceCategory::Build => Arc::new(BuildUpdater::new(ctx)),
        ResourceCategory::Release => Arc::new(ReleaseUpdater::new(ctx)),
        ResourceCategory::Repository => Arc::new(RepositoryUpdater::new(ctx)),
        ResourceCategory::Work => Arc::new(WorkUpdater::new(ctx)),
    }
}

/// Reconcile every group concurrently; fails with the first group error.
pub async fn apply_groups(
    ctx: &ReconcileContext,
    project: &TeamProject,
    target: PermissionTarget,
    groups: &[GroupPolicy],
) -> ReconcileResult<()> {
    let worker = Arc::new(GroupWorker::new(ctx.clone(), project.clone(), target));
    let handles = groups.iter().cloned().map(|group| {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move { worker.apply(group).await })
    });
    try_join_all(handles.map(|handle| async move { handle.await? })).await?;
    Ok(())
}

struct GroupWorker {
    project: TeamProject,
    target: PermissionTarget,
    groups: GroupDirectory,
    memberships: MembershipReconciler,
    permissions: PermissionReconciler,
}

impl GroupWorker {
    fn new(ctx: ReconcileContext, project: TeamProject, target: PermissionTarget) -> Self {
        Self {
            project,
            target,
            groups: GroupDirectory::new(ctx.clone()),
            memberships: MembershipReconciler::new(ctx.clone()),
            permissions: PermissionReconciler::new(ctx),
        }
    }

    async fn apply(&self, policy: GroupPolicy) -> ReconcileResult<()> {
        let group = self.groups.ensure_group(&self.project, &policy.name).await?;
        if let Some(members) = &policy.members {
            let outcome = self.memberships.reconcile(&group, members).await?;
            tracing::info!(
                component = "updater",
                group = %group.principal_name,
                added = outcome.added.len(),
                kept = outcome.kept.len(),
                removed = outcome.removed.len(),
                "membership reconciled"
            );
        }
        if !policy.permissions.is_empty() {
            let outcome = match &self.target {
                PermissionTarget::GroupScoped => {
                    self.permissions
                        .reconcile_group(&self.project.id, &group, &policy.permissions)
                        .await?
                }
                PermissionTarget::Explicit(scope) => {
                    self.permissions
                        .reconcile_identity(&self.project.id, scope, &group, &policy.permissions)
                        .await?
                }
            };
            tracing::info!(
                component = "updater",
                group = %group.principal_name,
                applied = outcome.applied.len(),
                skipped = outcome.skipped.len(),
                "permissions reconciled"
            );
        }
        Ok(())
    }
}
