use super::{PermissionTarget, ResourceUpdater};
use crate::context::ReconcileContext;
use crate::errors::ReconcileResult;
use crate::policy::ResourceCategory;
use async_trait::async_trait;
use warden_api::TeamProject;

/// Project-level permissions live on each group's provider document, so
/// there is no namespace or token to resolve.
pub struct ProjectUpdater {
    ctx: ReconcileContext,
}

impl ProjectUpdater {
    pub fn new(ctx: ReconcileContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ResourceUpdater for ProjectUpdater {
    fn category(&self) -> ResourceCategory {
        ResourceCategory::Project
    }

    fn context(&self) -> &ReconcileContext {
        &self.ctx
    }

    async fn target(&self, _project: &TeamProject) -> ReconcileResult<PermissionTarget> {
        Ok(PermissionTarget::GroupScoped)
    }
}
