// Command-line surface of the reconciler.
use clap::Parser;
use std::path::PathBuf;
use warden_reconcile::FeatureFlags;

#[derive(Parser, Debug, Clone)]
#[command(name = "warden")]
#[command(about = "Converge platform projects, groups and permissions toward a policy document")]
#[command(
    after_help = "Runs against the same project must not overlap: membership and permission \
                  writes from concurrent runs race. Serialize runs per organization."
)]
pub struct Args {
    /// Policy document (YAML or JSON)
    #[arg(long)]
    pub policy: PathBuf,

    /// Create declared projects that do not exist yet
    #[arg(long)]
    pub project_setup: bool,

    /// Reconcile groups, memberships and permissions
    #[arg(long)]
    pub access_permissions: bool,

    /// Reconcile branch policies (not implemented)
    #[arg(long)]
    pub branch_policies: bool,

    /// Reconcile service connections (not implemented)
    #[arg(long)]
    pub service_connections: bool,

    /// Only reconcile the declared project with this name
    #[arg(long)]
    pub project: Option<String>,
}

impl Args {
    pub fn feature_flags(&self) -> FeatureFlags {
        FeatureFlags {
            project_setup: self.project_setup,
            access_permissions: self.access_permissions,
            branch_policies: self.branch_policies,
            service_connections: self.service_connections,
        }
    }
}
