//! Top-level driver for one policy document.
//!
//! Per declared project: look it up, then update its description or create it
//! (when project setup is enabled), initialize the lazily provisioned release
//! and service-endpoint security, and apply the referenced policies in
//! category order. Projects are handled one after another; the first error
//! ends the run.
use crate::context::ReconcileContext;
use crate::errors::{EntityKind, ReconcileError, ReconcileResult};
use crate::policy::{FeatureFlags, PolicyDocument, PolicyLibrary, ProjectDefinition, ResourceCategory};
use crate::updaters::updater_for;
use serde_json::json;
use warden_api::{ListResponse, TeamProject, endpoints};

/// Process template used when a project declares none (Agile).
pub const DEFAULT_PROCESS_TEMPLATE_ID: &str = "adcc42ab-9882-485e-a3ed-7678f01f66bc";
pub const DEFAULT_VISIBILITY: &str = "private";

#[derive(Clone)]
pub struct Orchestrator {
    ctx: ReconcileContext,
    flags: FeatureFlags,
}

impl Orchestrator {
    pub fn new(ctx: ReconcileContext, flags: FeatureFlags) -> Self {
        Self { ctx, flags }
    }

    pub async fn run(&self, document: &PolicyDocument) -> ReconcileResult<()> {
        for definition in &document.projects {
            self.run_project(definition, &document.policies).await?;
        }
        Ok(())
    }

    pub async fn run_project(
        &self,
        definition: &ProjectDefinition,
        library: &PolicyLibrary,
    ) -> ReconcileResult<()> {
        let project = match self.find_project(&definition.name).await? {
            Some(project) => {
                self.update_project(&project, definition).await?;
                project
            }
            None if self.flags.project_setup => self.create_project(definition).await?,
            None => {
                return Err(ReconcileError::not_found(
                    EntityKind::Project,
                    definition.name.as_str(),
                ));
            }
        };

        self.initialize(&project).await?;

        if self.flags.access_permissions {
            for category in ResourceCategory::ALL {
                let Some(name) = definition.policies.get(category) else {
                    continue;
                };
                let policy = library.policy(category, name)?;
                updater_for(category, self.ctx.clone())
                    .apply(&project, &policy)
                    .await?;
            }
        }

        if self.flags.branch_policies {
            return Err(ReconcileError::Unsupported(
                "branch policies not implemented".to_string(),
            ));
        }
        if self.flags.service_connections {
            return Err(ReconcileError::Unsupported(
                "service connections not implemented".to_string(),
            ));
        }

        tracing::info!(component = "orchestrator", project = %project.name, "project reconciled");
        Ok(())
    }

    pub async fn find_project(&self, name: &str) -> ReconcileResult<Option<TeamProject>> {
        let projects: ListResponse<TeamProject> = self
            .ctx
            .caller
            .call("list projects", endpoints::list_projects())
            .await?;
        Ok(projects
            .value
            .into_iter()
            .find(|project| project.name.eq_ignore_ascii_case(name)))
    }

    async fn update_project(
        &self,
        project: &TeamProject,
        definition: &ProjectDefinition,
    ) -> ReconcileResult<()> {
        let Some(description) = definition.description.as_deref() else {
            return Ok(());
        };
        if project.description.as_deref().unwrap_or_default() == description {
            return Ok(());
        }
        tracing::info!(
            component = "orchestrator",
            project = %project.name,
            "updating project description"
        );
        self.ctx
            .caller
            .execute(
                "update project",
                endpoints::update_project(&project.id, description),
            )
            .await
    }

    async fn create_project(&self, definition: &ProjectDefinition) -> ReconcileResult<TeamProject> {
        tracing::info!(component = "orchestrator", project = %definition.name, "creating project");
        self.ctx
            .caller
            .execute(
                "create project",
                endpoints::create_project(
                    &definition.name,
                    definition.description.as_deref().unwrap_or_default(),
                    definition.visibility.as_deref().unwrap_or(DEFAULT_VISIBILITY),
                    definition
                        .process_template
                        .as_deref()
                        .unwrap_or(DEFAULT_PROCESS_TEMPLATE_ID),
                ),
            )
            .await?;

        // Creation is queued server side; wait until the project is listed.
        let policy = self.ctx.caller.policy();
        let attempts = policy.attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(project) = self.find_project(&definition.name).await? {
                return Ok(project);
            }
            tracing::debug!(
                component = "orchestrator",
                project = %definition.name,
                attempt,
                "project not visible yet"
            );
            if attempt < attempts {
                tokio::time::sleep(policy.delay).await;
            }
        }
        Err(ReconcileError::not_found(
            EntityKind::Project,
            definition.name.as_str(),
        ))
    }

    /// Touch the release and service-endpoint views once so the platform
    /// provisions their security namespaces for the project.
    async fn initialize(&self, project: &TeamProject) -> ReconcileResult<()> {
        let properties = json!({
            "sourcePage": { "routeValues": { "project": project.name } }
        });
        for (operation, provider) in [
            ("initialize release pipelines", endpoints::RELEASE_DEFINITIONS_PROVIDER),
            ("initialize service endpoints", endpoints::SERVICE_ENDPOINTS_PROVIDER),
        ] {
            self.ctx
                .caller
                .call_once(
                    operation,
                    endpoints::hierarchy_query(&project.id, &[provider], properties.clone()),
                )
                .await?;
        }
        Ok(())
    }
}
