use super::{PermissionTarget, ResourceUpdater};
use crate::context::ReconcileContext;
use crate::errors::ReconcileResult;
use crate::namespace::NamespaceCatalog;
use crate::permission::PermissionSetScope;
use crate::policy::ResourceCategory;
use async_trait::async_trait;
use warden_api::TeamProject;

const RELEASE_NAMESPACE: &str = "ReleaseManagement";
// More than one namespace carries this name; only the current one exposes it.
const RELEASE_ACTION: &str = "View release pipeline";

pub struct ReleaseUpdater {
    ctx: ReconcileContext,
    namespaces: NamespaceCatalog,
}

impl ReleaseUpdater {
    pub fn new(ctx: ReconcileContext) -> Self {
        let namespaces = NamespaceCatalog::new(ctx.clone());
        Self { ctx, namespaces }
    }
}

#[async_trait]
impl ResourceUpdater for ReleaseUpdater {
    fn category(&self) -> ResourceCategory {
        ResourceCategory::Release
    }

    fn context(&self) -> &ReconcileContext {
        &self.ctx
    }

    async fn target(&self, project: &TeamProject) -> ReconcileResult<PermissionTarget> {
        let namespace = self
            .namespaces
            .get_namespace(RELEASE_NAMESPACE, Some(RELEASE_ACTION))
            .await?;
        Ok(PermissionTarget::Explicit(PermissionSetScope::new(
            namespace.namespace_id,
            project.id.clone(),
        )))
    }
}
