use super::{PermissionTarget, ResourceUpdater};
use crate::context::ReconcileContext;
use crate::errors::{EntityKind, ReconcileError, ReconcileResult};
use crate::namespace::NamespaceCatalog;
use crate::permission::PermissionSetScope;
use crate::policy::ResourceCategory;
use async_trait::async_trait;
use warden_api::{ClassificationNode, TeamProject, endpoints};

const AREA_NAMESPACE: &str = "CSS";

/// Token of a classification node, e.g. the project's root area.
pub fn area_token(node_identifier: &str) -> String {
    format!("vstfs:///Classification/Node/{node_identifier}")
}

/// Work-item permissions are granted on the project's root area node.
pub struct WorkUpdater {
    ctx: ReconcileContext,
    namespaces: NamespaceCatalog,
}

impl WorkUpdater {
    pub fn new(ctx: ReconcileContext) -> Self {
        let namespaces = NamespaceCatalog::new(ctx.clone());
        Self { ctx, namespaces }
    }
}

#[async_trait]
impl ResourceUpdater for WorkUpdater {
    fn category(&self) -> ResourceCategory {
        ResourceCategory::Work
    }

    fn context(&self) -> &ReconcileContext {
        &self.ctx
    }

    async fn target(&self, project: &TeamProject) -> ReconcileResult<PermissionTarget> {
        let namespace = self.namespaces.get_namespace(AREA_NAMESPACE, None).await?;
        let root: ClassificationNode = self
            .ctx
            .caller
            .call("read root area", endpoints::area_root(&project.id))
            .await?;
        let identifier = root.identifier.trim();
        if identifier.is_empty() {
            return Err(ReconcileError::not_found(
                EntityKind::ClassificationNode,
                format!("root area of {}", project.name),
            ));
        }
        Ok(PermissionTarget::Explicit(PermissionSetScope::new(
            namespace.namespace_id,
            area_token(identifier),
        )))
    }
}
