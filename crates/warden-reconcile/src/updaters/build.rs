use super::{PermissionTarget, ResourceUpdater};
use crate::context::ReconcileContext;
use crate::errors::ReconcileResult;
use crate::namespace::NamespaceCatalog;
use crate::permission::PermissionSetScope;
use crate::policy::ResourceCategory;
use async_trait::async_trait;
use warden_api::TeamProject;

const BUILD_NAMESPACE: &str = "Build";

/// Pipeline permissions for the whole project; the token is the project id.
pub struct BuildUpdater {
    ctx: ReconcileContext,
    namespaces: NamespaceCatalog,
}

impl BuildUpdater {
    pub fn new(ctx: ReconcileContext) -> Self {
        let namespaces = NamespaceCatalog::new(ctx.clone());
        Self { ctx, namespaces }
    }
}

#[async_trait]
impl ResourceUpdater for BuildUpdater {
    fn category(&self) -> ResourceCategory {
        ResourceCategory::Build
    }

    fn context(&self) -> &ReconcileContext {
        &self.ctx
    }

    async fn target(&self, project: &TeamProject) -> ReconcileResult<PermissionTarget> {
        let namespace = self.namespaces.get_namespace(BUILD_NAMESPACE, None).await?;
        Ok(PermissionTarget::Explicit(PermissionSetScope::new(
            namespace.namespace_id,
            project.id.clone(),
        )))
    }
}
