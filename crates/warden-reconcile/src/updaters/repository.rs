use super::{PermissionTarget, ResourceUpdater};
use crate::context::ReconcileContext;
use crate::errors::ReconcileResult;
use crate::namespace::NamespaceCatalog;
use crate::permission::PermissionSetScope;
use crate::policy::ResourceCategory;
use async_trait::async_trait;
use warden_api::TeamProject;

const GIT_NAMESPACE: &str = "Git Repositories";

/// Token covering every repository in the project.
pub fn repositories_token(project_id: &str) -> String {
    format!("repoV2/{project_id}/")
}

pub struct RepositoryUpdater {
    ctx: ReconcileContext,
    namespaces: NamespaceCatalog,
}

impl RepositoryUpdater {
    pub fn new(ctx: ReconcileContext) -> Self {
        let namespaces = NamespaceCatalog::new(ctx.clone());
        Self { ctx, namespaces }
    }
}

#[async_trait]
impl ResourceUpdater for RepositoryUpdater {
    fn category(&self) -> ResourceCategory {
        ResourceCategory::Repository
    }

    fn context(&self) -> &ReconcileContext {
        &self.ctx
    }

    async fn target(&self, project: &TeamProject) -> ReconcileResult<PermissionTarget> {
        let namespace = self.namespaces.get_namespace(GIT_NAMESPACE, None).await?;
        Ok(PermissionTarget::Explicit(PermissionSetScope::new(
            namespace.namespace_id,
            repositories_token(&project.id),
        )))
    }
}
