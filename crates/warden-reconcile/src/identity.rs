//! Free-text principal resolution.
//!
//! # Purpose
//! Turns a name from a policy document (display name, account name or email)
//! into a directory identity by asking the platform's fuzzy identity search.
//!
//! # Key invariants
//! - Email-like queries search users only; anything else searches users and groups.
//! - At most ten candidates are requested.
//! - The first candidate whose display name or account name matches the query
//!   (case-insensitive, unanchored) wins. This is a heuristic: overlapping names
//!   can select the wrong candidate.
use crate::context::ReconcileContext;
use crate::errors::{EntityKind, ReconcileError, ReconcileResult};
use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;
use warden_api::{Identity, IdentityPickerResponse, endpoints};

const EMAIL_LIKE_PATTERN: &str = r"[\w-]+@[\w.-]+";

static EMAIL_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    // Constant pattern; compiling it is covered by the unit tests.
    Regex::new(EMAIL_LIKE_PATTERN).expect("email pattern compiles")
});

pub fn is_email_like(query: &str) -> bool {
    EMAIL_LIKE.is_match(query)
}

/// Identity types to search for `query`.
pub fn search_types(query: &str) -> &'static [&'static str] {
    if is_email_like(query) {
        &["user"]
    } else {
        &["user", "group"]
    }
}

/// Whether `candidate` plausibly names `query`.
pub fn candidate_matches(candidate: &Identity, query: &str) -> bool {
    let alternatives: Vec<String> = [
        Some(candidate.display_name.as_str()),
        candidate.sam_account_name.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|value| !value.is_empty())
    .map(regex::escape)
    .collect();
    if alternatives.is_empty() {
        return false;
    }
    RegexBuilder::new(&alternatives.join("|"))
        .case_insensitive(true)
        .build()
        .is_ok_and(|pattern| pattern.is_match(query))
}

#[derive(Clone)]
pub struct IdentityResolver {
    ctx: ReconcileContext,
}

impl IdentityResolver {
    pub fn new(ctx: ReconcileContext) -> Self {
        Self { ctx }
    }

    pub async fn resolve(&self, query: &str) -> ReconcileResult<Option<Identity>> {
        let types = search_types(query);
        let response: IdentityPickerResponse = self
            .ctx
            .caller
            .call("search identities", endpoints::identity_search(query, types))
            .await?;
        let found = response
            .results
            .into_iter()
            .flat_map(|result| result.identities)
            .find(|candidate| candidate_matches(candidate, query));
        match &found {
            Some(identity) => tracing::debug!(
                component = "identity",
                query,
                display_name = %identity.display_name,
                origin = %identity.origin_directory,
                "identity resolved"
            ),
            None => tracing::debug!(component = "identity", query, "identity not found"),
        }
        Ok(found)
    }

    /// Like `resolve`, but a miss is a `NotFound` error.
    pub async fn require(&self, query: &str) -> ReconcileResult<Identity> {
        self.resolve(query)
            .await?
            .ok_or_else(|| ReconcileError::not_found(EntityKind::Identity, query))
    }
}
