//! Warden reconciler service library crate.
//!
//! # Purpose
//! Wires configuration, the policy document and the HTTP platform client
//! around the reconciliation engine so the binary and integration tests share
//! one entry point.
//!
//! # Notes
//! Runs against the same project must be serialized by the operator; nothing
//! here takes a lock on the remote side.
pub mod cli;
pub mod config;
pub mod observability;
pub mod policy_loader;

use anyhow::{Context, Result};
use std::sync::Arc;
use warden_api::{HttpPlatformClient, PlatformApi};
use warden_reconcile::{FeatureFlags, Orchestrator, PolicyDocument, ReconcileContext};

/// Load, validate and optionally narrow the policy document named by `args`.
pub fn load_document(args: &cli::Args) -> Result<PolicyDocument> {
    let document = policy_loader::load_policy(&args.policy)?;
    match &args.project {
        Some(name) => Ok(policy_loader::select_project(document, name)?),
        None => Ok(document),
    }
}

pub fn build_client(config: &config::WardenConfig) -> Result<Arc<dyn PlatformApi>> {
    let client = HttpPlatformClient::new(config.client_config()?)
        .context("build platform client")?;
    Ok(Arc::new(client))
}

/// Reconcile `document` through `api`.
pub async fn reconcile(
    api: Arc<dyn PlatformApi>,
    config: &config::WardenConfig,
    flags: FeatureFlags,
    document: &PolicyDocument,
) -> Result<()> {
    let ctx = ReconcileContext::new(api, config.retry_policy(), config.pacing());
    tracing::info!(
        projects = document.projects.len(),
        project_setup = flags.project_setup,
        access_permissions = flags.access_permissions,
        "reconciliation started"
    );
    Orchestrator::new(ctx, flags).run(document).await?;
    tracing::info!("reconciliation finished");
    Ok(())
}

pub async fn run(args: &cli::Args, config: &config::WardenConfig) -> Result<()> {
    let document = load_document(args)?;
    let api = build_client(config)?;
    reconcile(api, config, args.feature_flags(), &document).await
}
