//! Group membership convergence.
//!
//! # Purpose
//! Makes the live member set of one group equal to the declared member set:
//! declared principals that are missing get added, live members that are not
//! declared get removed.
//!
//! # Key invariants
//! - Every declared name is resolved before the first mutation. One miss fails
//!   the group with nothing changed.
//! - Names resolving to the same principal are added once.
//! - Obsolete members are computed from a fresh read taken after additions.
//! - Additions are paced step by step; removals share a single pause and then
//!   fire concurrently.
//! - There is no rollback. A failure part way through leaves earlier additions
//!   in place; the next run converges them.
use crate::context::ReconcileContext;
use crate::errors::{ReconcileError, ReconcileResult};
use crate::identity::IdentityResolver;
use futures::future::try_join_all;
use std::collections::BTreeSet;
use warden_api::{
    GraphGroup, GraphMembership, GraphSubject, Identity, IdentityKind, ListResponse, endpoints,
};

/// Descriptors touched by one membership pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipOutcome {
    pub added: Vec<String>,
    pub kept: Vec<String>,
    pub removed: Vec<String>,
}

impl MembershipOutcome {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Clone)]
pub struct MembershipReconciler {
    ctx: ReconcileContext,
    identities: IdentityResolver,
}

impl MembershipReconciler {
    pub fn new(ctx: ReconcileContext) -> Self {
        let identities = IdentityResolver::new(ctx.clone());
        Self { ctx, identities }
    }

    pub async fn reconcile(
        &self,
        group: &GraphGroup,
        declared: &[String],
    ) -> ReconcileResult<MembershipOutcome> {
        let mut names: Vec<&str> = Vec::with_capacity(declared.len());
        for name in declared.iter().map(|name| name.trim()) {
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }

        // Two spellings of one principal resolve to the same origin id.
        let mut resolved: Vec<Identity> = Vec::with_capacity(names.len());
        for name in names {
            let identity = self.identities.require(name).await?;
            if resolved
                .iter()
                .any(|seen| seen.origin_id == identity.origin_id)
            {
                tracing::debug!(
                    component = "membership",
                    group = %group.principal_name,
                    member = %name,
                    "duplicate declaration of one principal"
                );
                continue;
            }
            resolved.push(identity);
        }

        let mut live = self.live_members(group).await?;
        let mut outcome = MembershipOutcome::default();
        let mut valid = BTreeSet::new();

        for identity in &resolved {
            if let Some(descriptor) = identity
                .subject_descriptor
                .as_deref()
                .filter(|descriptor| live.contains(*descriptor))
            {
                tracing::debug!(
                    component = "membership",
                    group = %group.principal_name,
                    member = %identity.display_name,
                    "member already present"
                );
                valid.insert(descriptor.to_string());
                outcome.kept.push(descriptor.to_string());
                continue;
            }
            tracing::info!(
                component = "membership",
                group = %group.principal_name,
                member = %identity.display_name,
                origin = %identity.origin_directory,
                "adding member"
            );
            let descriptor = self.add_member(group, identity).await?;
            live.insert(descriptor.clone());
            valid.insert(descriptor.clone());
            outcome.added.push(descriptor);
        }

        let current = self.live_members(group).await?;
        let obsolete: Vec<String> = current.difference(&valid).cloned().collect();
        if !obsolete.is_empty() {
            tracing::info!(
                component = "membership",
                group = %group.principal_name,
                count = obsolete.len(),
                "removing obsolete members"
            );
            self.ctx.pacing.think().await;
            try_join_all(obsolete.iter().map(|member| {
                self.ctx.caller.execute(
                    "remove group membership",
                    endpoints::remove_membership(member, &group.descriptor),
                )
            }))
            .await?;
            outcome.removed = obsolete;
        }

        Ok(outcome)
    }

    async fn live_members(&self, group: &GraphGroup) -> ReconcileResult<BTreeSet<String>> {
        let memberships: ListResponse<GraphMembership> = self
            .ctx
            .caller
            .call(
                "list group memberships",
                endpoints::list_memberships(&group.descriptor),
            )
            .await?;
        Ok(memberships
            .value
            .into_iter()
            .map(|membership| membership.member_descriptor)
            .collect())
    }

    /// Add `identity` to `group`, returning the member descriptor now in the group.
    async fn add_member(&self, group: &GraphGroup, identity: &Identity) -> ReconcileResult<String> {
        match identity.kind() {
            Some(IdentityKind::User) => {
                self.ctx.pacing.think().await;
                let subject: GraphSubject = self
                    .ctx
                    .caller
                    .call(
                        "materialize user",
                        endpoints::materialize_user(&identity.origin_id, &group.descriptor),
                    )
                    .await?;
                Ok(subject.descriptor)
            }
            Some(IdentityKind::Group) => match identity.origin_directory.as_str() {
                "vsd" => {
                    let descriptor = identity.subject_descriptor.clone().ok_or_else(|| {
                        ReconcileError::Unsupported(format!(
                            "group {} has no subject descriptor",
                            identity.display_name
                        ))
                    })?;
                    self.ctx.pacing.think().await;
                    self.put_membership(&descriptor, group).await?;
                    Ok(descriptor)
                }
                "aad" => {
                    self.ctx.pacing.think().await;
                    let subject: GraphSubject = self
                        .ctx
                        .caller
                        .call(
                            "materialize directory group",
                            endpoints::materialize_group(&identity.origin_id, &group.descriptor),
                        )
                        .await?;
                    self.ctx.pacing.think().await;
                    self.put_membership(&subject.descriptor, group).await?;
                    Ok(subject.descriptor)
                }
                other => Err(ReconcileError::Unsupported(format!(
                    "origin directory {other:?} for group {}",
                    identity.display_name
                ))),
            },
            None => Err(ReconcileError::Unsupported(format!(
                "entity type {:?} for {}",
                identity.entity_type, identity.display_name
            ))),
        }
    }

    async fn put_membership(&self, member: &str, group: &GraphGroup) -> ReconcileResult<()> {
        self.ctx
            .caller
            .execute(
                "add group membership",
                endpoints::add_membership(member, &group.descriptor),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EntityKind;
    use crate::pacing::Pacing;
    use crate::retry::RetryPolicy;
    use crate::test_support::FakePlatform;
    use std::sync::Arc;
    use std::time::Duration;
    use warden_api::{ApiRequest, ApiResult, Method, PlatformApi, TeamProject};

    struct Fixture {
        platform: FakePlatform,
        group: GraphGroup,
        reconciler: MembershipReconciler,
    }

    fn fixture() -> Fixture {
        let platform = FakePlatform::new();
        let project: TeamProject = platform.add_project("Alpha", "");
        let group = platform.add_group(&project, "Contributors");
        let ctx = ReconcileContext::new(
            Arc::new(platform.clone()),
            RetryPolicy {
                attempts: 1,
                delay: Duration::ZERO,
            },
            Pacing::none(),
        );
        Fixture {
            platform,
            group,
            reconciler: MembershipReconciler::new(ctx),
        }
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn descriptors(identities: &[&Identity]) -> BTreeSet<String> {
        identities
            .iter()
            .filter_map(|identity| identity.subject_descriptor.clone())
            .collect()
    }

    #[tokio::test]
    async fn swaps_one_member_for_another() {
        let f = fixture();
        let a = f.platform.add_user("Alice Example", "alice@example.com");
        let b = f.platform.add_user("Bob Example", "bob@example.com");
        let c = f.platform.add_user("Carol Example", "carol@example.com");
        f.platform.add_member(&f.group, b.subject_descriptor.as_deref().unwrap());
        f.platform.add_member(&f.group, c.subject_descriptor.as_deref().unwrap());

        let outcome = f
            .reconciler
            .reconcile(&f.group, &names(&["alice@example.com", "bob@example.com"]))
            .await
            .expect("reconciled");

        assert_eq!(outcome.added, vec![a.subject_descriptor.clone().unwrap()]);
        assert_eq!(outcome.kept, vec![b.subject_descriptor.clone().unwrap()]);
        assert_eq!(outcome.removed, vec![c.subject_descriptor.clone().unwrap()]);
        assert_eq!(f.platform.members_of(&f.group), descriptors(&[&a, &b]));

        let mutations = f.platform.mutations();
        assert_eq!(mutations.len(), 2);
        assert_eq!(mutations[0].path, "_apis/graph/users");
        assert_eq!(mutations[1].method, Method::Delete);
    }

    #[tokio::test]
    async fn converges_for_every_overlap_shape() {
        // (declared, live) over the same three users.
        let cases: [(&[usize], &[usize]); 4] = [
            (&[0], &[0, 1]),
            (&[0, 1], &[0]),
            (&[0], &[1, 2]),
            (&[0, 1], &[0, 1]),
        ];
        for (declared, live) in cases {
            let f = fixture();
            let users = [
                f.platform.add_user("Alice Example", "alice@example.com"),
                f.platform.add_user("Bob Example", "bob@example.com"),
                f.platform.add_user("Carol Example", "carol@example.com"),
            ];
            for index in live {
                f.platform
                    .add_member(&f.group, users[*index].subject_descriptor.as_deref().unwrap());
            }
            let declared_names: Vec<String> = declared
                .iter()
                .map(|index| users[*index].sam_account_name.clone().unwrap())
                .collect();

            f.reconciler
                .reconcile(&f.group, &declared_names)
                .await
                .expect("reconciled");

            let expected: Vec<&Identity> = declared.iter().map(|index| &users[*index]).collect();
            assert_eq!(f.platform.members_of(&f.group), descriptors(&expected));

            f.platform.clear_requests();
            let second = f
                .reconciler
                .reconcile(&f.group, &declared_names)
                .await
                .expect("reconciled");
            assert!(second.is_noop());
            assert!(f.platform.mutations().is_empty());
        }
    }

    #[tokio::test]
    async fn empty_declaration_removes_everyone() {
        let f = fixture();
        let a = f.platform.add_user("Alice Example", "alice@example.com");
        f.platform.add_member(&f.group, a.subject_descriptor.as_deref().unwrap());

        let outcome = f.reconciler.reconcile(&f.group, &[]).await.expect("reconciled");
        assert_eq!(outcome.removed.len(), 1);
        assert!(f.platform.members_of(&f.group).is_empty());
    }

    #[tokio::test]
    async fn unresolvable_member_fails_before_any_mutation() {
        let f = fixture();
        f.platform.add_user("Alice Example", "alice@example.com");
        let c = f.platform.add_user("Carol Example", "carol@example.com");
        f.platform.add_member(&f.group, c.subject_descriptor.as_deref().unwrap());

        let err = f
            .reconciler
            .reconcile(&f.group, &names(&["alice@example.com", "ghost@example.com"]))
            .await
            .expect_err("unresolvable");

        assert!(matches!(
            err,
            ReconcileError::NotFound {
                kind: EntityKind::Identity,
                ..
            }
        ));
        assert!(f.platform.mutations().is_empty());
        assert_eq!(f.platform.members_of(&f.group), descriptors(&[&c]));
    }

    #[tokio::test]
    async fn directory_groups_are_materialized_then_added() {
        let f = fixture();
        f.platform.add_directory_group("Release Managers", "aad");
        let vsd = f.platform.add_directory_group("Project Valid Users", "vsd");

        let outcome = f
            .reconciler
            .reconcile(&f.group, &names(&["Release Managers", "Project Valid Users"]))
            .await
            .expect("reconciled");

        assert_eq!(outcome.added.len(), 2);
        let members = f.platform.members_of(&f.group);
        assert!(members.contains("aadgp.release-managers"));
        assert!(members.contains(vsd.subject_descriptor.as_deref().unwrap()));

        let paths: Vec<(Method, String)> = f
            .platform
            .mutations()
            .into_iter()
            .map(|request| (request.method, request.path))
            .collect();
        assert_eq!(paths[0], (Method::Post, "_apis/graph/groups".to_string()));
        assert_eq!(paths[1].0, Method::Put);
        assert_eq!(paths[2].0, Method::Put);
    }

    #[tokio::test]
    async fn unmaterialized_user_is_added_through_the_graph() {
        let f = fixture();
        f.platform.add_unmaterialized_user("Dave Example", "dave@example.com");

        let outcome = f
            .reconciler
            .reconcile(&f.group, &names(&["dave@example.com"]))
            .await
            .expect("reconciled");
        assert_eq!(outcome.added, vec!["aad.dave-example".to_string()]);
        assert!(f.platform.members_of(&f.group).contains("aad.dave-example"));
    }

    #[tokio::test]
    async fn two_spellings_of_one_user_materialize_once() {
        let f = fixture();
        f.platform.add_unmaterialized_user("Dave Example", "dave@example.com");

        let outcome = f
            .reconciler
            .reconcile(&f.group, &names(&["Dave Example", "dave@example.com"]))
            .await
            .expect("reconciled");

        assert_eq!(outcome.added, vec!["aad.dave-example".to_string()]);
        let posts = f
            .platform
            .mutations()
            .into_iter()
            .filter(|request| request.path == "_apis/graph/users")
            .count();
        assert_eq!(posts, 1);
    }

    fn paced(platform: Arc<dyn PlatformApi>, pause: Duration) -> MembershipReconciler {
        MembershipReconciler::new(ReconcileContext::new(
            platform,
            RetryPolicy {
                attempts: 1,
                delay: Duration::ZERO,
            },
            Pacing {
                min: pause,
                max: pause,
            },
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn additions_pause_per_step_and_removals_pause_once() {
        let f = fixture();
        let carol = f.platform.add_user("Carol Example", "carol@example.com");
        let dave = f.platform.add_user("Dave Example", "dave@example.com");
        f.platform.add_user("Alice Example", "alice@example.com");
        f.platform.add_directory_group("Release Managers", "aad");
        f.platform.add_member(&f.group, carol.subject_descriptor.as_deref().unwrap());
        f.platform.add_member(&f.group, dave.subject_descriptor.as_deref().unwrap());
        let reconciler = paced(Arc::new(f.platform.clone()), Duration::from_secs(1));

        let started = tokio::time::Instant::now();
        let outcome = reconciler
            .reconcile(&f.group, &names(&["alice@example.com", "Release Managers"]))
            .await
            .expect("reconciled");

        // One pause for the user, two for the directory group, one before removals.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(4), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
        assert_eq!(outcome.added.len(), 2);
        assert_eq!(outcome.removed.len(), 2);
    }

    /// Holds every DELETE for a fixed time before forwarding it.
    struct SlowDeletes {
        inner: FakePlatform,
        hold: Duration,
    }

    #[async_trait::async_trait]
    impl PlatformApi for SlowDeletes {
        async fn send(&self, request: &ApiRequest) -> ApiResult<serde_json::Value> {
            if request.method == Method::Delete {
                tokio::time::sleep(self.hold).await;
            }
            self.inner.send(request).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn removals_run_concurrently_after_a_single_pause() {
        let f = fixture();
        for (name, mail) in [
            ("Carol Example", "carol@example.com"),
            ("Dave Example", "dave@example.com"),
            ("Erin Example", "erin@example.com"),
        ] {
            let user = f.platform.add_user(name, mail);
            f.platform.add_member(&f.group, user.subject_descriptor.as_deref().unwrap());
        }
        let reconciler = paced(
            Arc::new(SlowDeletes {
                inner: f.platform.clone(),
                hold: Duration::from_secs(1),
            }),
            Duration::from_secs(1),
        );

        let started = tokio::time::Instant::now();
        let outcome = reconciler.reconcile(&f.group, &[]).await.expect("reconciled");

        assert_eq!(outcome.removed.len(), 3);
        // Sequential deletes would take four seconds.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");
        assert!(f.platform.members_of(&f.group).is_empty());
    }

    #[tokio::test]
    async fn unknown_origin_directory_is_unsupported() {
        let f = fixture();
        f.platform.add_directory_group("Legacy Admins", "ldap");

        let err = f
            .reconciler
            .reconcile(&f.group, &names(&["Legacy Admins"]))
            .await
            .expect_err("unsupported");
        assert!(matches!(err, ReconcileError::Unsupported(_)));
    }
}
