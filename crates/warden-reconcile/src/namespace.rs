//! Security namespace lookup.
//!
//! Permission bits are server-assigned, so every scope starts by finding the
//! namespace for a resource category at runtime. Some platforms expose several
//! namespaces with the same name across API generations; an action display
//! name disambiguates them.
use crate::context::ReconcileContext;
use crate::errors::{EntityKind, ReconcileError, ReconcileResult};
use warden_api::{ListResponse, SecurityNamespace, endpoints};

#[derive(Clone)]
pub struct NamespaceCatalog {
    ctx: ReconcileContext,
}

impl NamespaceCatalog {
    pub fn new(ctx: ReconcileContext) -> Self {
        Self { ctx }
    }

    pub async fn get_namespace(
        &self,
        name: &str,
        action_filter: Option<&str>,
    ) -> ReconcileResult<SecurityNamespace> {
        let namespaces: ListResponse<SecurityNamespace> = self
            .ctx
            .caller
            .call("list security namespaces", endpoints::security_namespaces())
            .await?;
        let namespace = select_namespace(namespaces.value, name, action_filter).ok_or_else(|| {
            let label = match action_filter {
                Some(action) => format!("{name} (action {action})"),
                None => name.to_string(),
            };
            ReconcileError::not_found(EntityKind::Namespace, label)
        })?;
        tracing::debug!(
            component = "namespace",
            name,
            namespace_id = %namespace.namespace_id,
            "namespace resolved"
        );
        Ok(namespace)
    }
}

/// Bit of the action `display_name` within `namespace`.
pub fn action(namespace: &SecurityNamespace, display_name: &str) -> ReconcileResult<u32> {
    namespace
        .action_by_display_name(display_name)
        .map(|action| action.bit)
        .ok_or_else(|| {
            ReconcileError::not_found(
                EntityKind::Permission,
                format!("{} in namespace {}", display_name, namespace.name),
            )
        })
}

fn select_namespace(
    namespaces: Vec<SecurityNamespace>,
    name: &str,
    action_filter: Option<&str>,
) -> Option<SecurityNamespace> {
    namespaces
        .into_iter()
        .filter(|namespace| namespace.name == name)
        .find(|namespace| match action_filter {
            Some(action) => namespace.action_by_display_name(action).is_some(),
            None => true,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pacing::Pacing;
    use crate::retry::RetryPolicy;
    use crate::test_support::FakePlatform;
    use std::sync::Arc;
    use std::time::Duration;

    fn catalog(platform: &FakePlatform) -> NamespaceCatalog {
        NamespaceCatalog::new(ReconcileContext::new(
            Arc::new(platform.clone()),
            RetryPolicy {
                attempts: 1,
                delay: Duration::ZERO,
            },
            Pacing::none(),
        ))
    }

    #[tokio::test]
    async fn finds_namespace_by_name() {
        let platform = FakePlatform::new();
        platform.add_namespace("Build", "ns-build", &[(1, "View builds")]);
        platform.add_namespace("Git Repositories", "ns-git", &[(2, "Read")]);

        let namespace = catalog(&platform)
            .get_namespace("Git Repositories", None)
            .await
            .expect("namespace");
        assert_eq!(namespace.namespace_id, "ns-git");
    }

    #[tokio::test]
    async fn action_filter_disambiguates_same_named_namespaces() {
        let platform = FakePlatform::new();
        platform.add_namespace("ReleaseManagement", "ns-rm-legacy", &[(1, "View release definition")]);
        platform.add_namespace("ReleaseManagement", "ns-rm", &[(1, "View release pipeline")]);

        let catalog = catalog(&platform);
        let filtered = catalog
            .get_namespace("ReleaseManagement", Some("View release pipeline"))
            .await
            .expect("namespace");
        assert_eq!(filtered.namespace_id, "ns-rm");

        let unfiltered = catalog
            .get_namespace("ReleaseManagement", None)
            .await
            .expect("namespace");
        assert_eq!(unfiltered.namespace_id, "ns-rm-legacy");
    }

    #[tokio::test]
    async fn action_bits_come_from_the_namespace() {
        let platform = FakePlatform::new();
        platform.add_namespace("Build", "ns-build", &[(1, "View builds"), (4, "Queue builds")]);

        let namespace = catalog(&platform)
            .get_namespace("Build", None)
            .await
            .expect("namespace");
        assert_eq!(action(&namespace, "Queue builds").expect("bit"), 4);
        assert!(action(&namespace, "Delete builds").is_err());
    }

    #[tokio::test]
    async fn missing_namespace_is_not_found() {
        let platform = FakePlatform::new();
        platform.add_namespace("Build", "ns-build", &[(1, "View builds")]);

        let err = catalog(&platform)
            .get_namespace("Build", Some("Destroy builds"))
            .await
            .expect_err("missing");
        assert!(matches!(
            err,
            ReconcileError::NotFound {
                kind: EntityKind::Namespace,
                ..
            }
        ));
        assert!(err.to_string().contains("Destroy builds"));
    }
}
