//! Project group directory.
//!
//! Declared group names are matched against a project's groups by display
//! name or principal name (`[Project]\Name`), case-insensitively. Missing
//! groups are created in the project scope.
use crate::context::ReconcileContext;
use crate::errors::ReconcileResult;
use warden_api::{GraphDescriptor, GraphGroup, ListResponse, TeamProject, endpoints};

#[derive(Clone)]
pub struct GroupDirectory {
    ctx: ReconcileContext,
}

impl GroupDirectory {
    pub fn new(ctx: ReconcileContext) -> Self {
        Self { ctx }
    }

    pub async fn scope_descriptor(&self, project: &TeamProject) -> ReconcileResult<String> {
        let descriptor: GraphDescriptor = self
            .ctx
            .caller
            .call(
                "resolve project scope descriptor",
                endpoints::graph_descriptor(&project.id),
            )
            .await?;
        Ok(descriptor.value)
    }

    pub async fn list_groups(&self, project: &TeamProject) -> ReconcileResult<Vec<GraphGroup>> {
        let scope = self.scope_descriptor(project).await?;
        let groups: ListResponse<GraphGroup> = self
            .ctx
            .caller
            .call("list project groups", endpoints::list_groups(&scope))
            .await?;
        Ok(groups.value)
    }

    pub async fn find_group(
        &self,
        project: &TeamProject,
        name: &str,
    ) -> ReconcileResult<Option<GraphGroup>> {
        let groups = self.list_groups(project).await?;
        Ok(groups
            .into_iter()
            .find(|group| group_matches(group, project, name)))
    }

    /// Return the declared group, creating it when the project lacks it.
    pub async fn ensure_group(
        &self,
        project: &TeamProject,
        name: &str,
    ) -> ReconcileResult<GraphGroup> {
        if let Some(group) = self.find_group(project, name).await? {
            return Ok(group);
        }
        let display_name = display_name_of(name);
        tracing::info!(
            component = "groups",
            project = %project.name,
            group = display_name,
            "creating group"
        );
        let scope = self.scope_descriptor(project).await?;
        self.ctx
            .caller
            .call("create group", endpoints::create_group(&scope, display_name))
            .await
    }
}

/// Strip a `[Scope]\` prefix from a declared group name.
pub fn display_name_of(name: &str) -> &str {
    match name.rsplit_once('\\') {
        Some((scope, display)) if scope.starts_with('[') && scope.ends_with(']') => display,
        _ => name,
    }
}

fn group_matches(group: &GraphGroup, project: &TeamProject, name: &str) -> bool {
    let qualified = format!("[{}]\\{}", project.name, display_name_of(name));
    group.display_name.eq_ignore_ascii_case(name)
        || group.principal_name.eq_ignore_ascii_case(name)
        || group.principal_name.eq_ignore_ascii_case(&qualified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pacing::Pacing;
    use crate::retry::RetryPolicy;
    use crate::test_support::FakePlatform;
    use std::sync::Arc;
    use std::time::Duration;

    fn directory(platform: &FakePlatform) -> GroupDirectory {
        GroupDirectory::new(ReconcileContext::new(
            Arc::new(platform.clone()),
            RetryPolicy {
                attempts: 1,
                delay: Duration::ZERO,
            },
            Pacing::none(),
        ))
    }

    #[test]
    fn display_name_strips_scope_prefix() {
        assert_eq!(display_name_of("[Alpha]\\Contributors"), "Contributors");
        assert_eq!(display_name_of("Contributors"), "Contributors");
        assert_eq!(display_name_of("DOMAIN\\ops"), "DOMAIN\\ops");
    }

    #[tokio::test]
    async fn finds_existing_group_by_principal_or_display_name() {
        let platform = FakePlatform::new();
        let project = platform.add_project("Alpha", "");
        let existing = platform.add_group(&project, "Contributors");
        let directory = directory(&platform);

        let by_display = directory
            .find_group(&project, "contributors")
            .await
            .expect("lookup");
        assert_eq!(by_display, Some(existing.clone()));

        let by_principal = directory
            .find_group(&project, "[Alpha]\\Contributors")
            .await
            .expect("lookup");
        assert_eq!(by_principal, Some(existing));
    }

    #[tokio::test]
    async fn ensure_group_creates_missing_group_once() {
        let platform = FakePlatform::new();
        let project = platform.add_project("Alpha", "");
        let directory = directory(&platform);

        let created = directory
            .ensure_group(&project, "[Alpha]\\Auditors")
            .await
            .expect("created");
        assert_eq!(created.display_name, "Auditors");
        assert_eq!(platform.groups_of(&project).len(), 1);

        platform.clear_requests();
        let again = directory
            .ensure_group(&project, "Auditors")
            .await
            .expect("found");
        assert_eq!(again, created);
        assert!(platform.mutations().is_empty());
    }
}
