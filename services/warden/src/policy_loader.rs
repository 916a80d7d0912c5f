//! Policy document loading and validation.
//!
//! # Purpose
//! Reads the operator's policy document from disk and rejects it before any
//! remote call when it cannot possibly reconcile: empty names, duplicates,
//! references to policies that do not exist.
//!
//! # Notes
//! - The format follows the file extension: `.json` is JSON, `.yaml`/`.yml`
//!   is YAML.
//! - Every validation problem is reported at once, not just the first.
//! - Unknown permission types and unknown keys fail while decoding.
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use warden_reconcile::{PolicyDocument, ResourceCategory};

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("read policy {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported policy format for {0} (expected .yaml, .yml or .json)")]
    UnsupportedFormat(PathBuf),
    #[error("parse policy {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid policy document: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("project {0} is not declared in the policy document")]
    UnknownProject(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyFormat {
    Yaml,
    Json,
}

impl PolicyFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "yaml" | "yml" => Some(PolicyFormat::Yaml),
            "json" => Some(PolicyFormat::Json),
            _ => None,
        }
    }
}

pub fn load_policy(path: &Path) -> Result<PolicyDocument, PolicyError> {
    let format =
        PolicyFormat::from_path(path).ok_or_else(|| PolicyError::UnsupportedFormat(path.into()))?;
    let contents = std::fs::read_to_string(path).map_err(|source| PolicyError::Read {
        path: path.into(),
        source,
    })?;
    let document = parse_policy(&contents, format).map_err(|message| PolicyError::Parse {
        path: path.into(),
        message,
    })?;
    validate(&document)?;
    tracing::info!(
        path = %path.display(),
        projects = document.projects.len(),
        "policy document loaded"
    );
    Ok(document)
}

pub fn parse_policy(contents: &str, format: PolicyFormat) -> Result<PolicyDocument, String> {
    match format {
        PolicyFormat::Yaml => serde_yaml::from_str(contents).map_err(|err| err.to_string()),
        PolicyFormat::Json => serde_json::from_str(contents).map_err(|err| err.to_string()),
    }
}

pub fn validate(document: &PolicyDocument) -> Result<(), PolicyError> {
    let mut problems = Vec::new();

    let mut project_names = HashSet::new();
    for project in &document.projects {
        let name = project.name.trim();
        if name.is_empty() {
            problems.push("project with an empty name".to_string());
            continue;
        }
        if !project_names.insert(name.to_ascii_lowercase()) {
            problems.push(format!("project {name} is declared more than once"));
        }
        for category in ResourceCategory::ALL {
            if let Some(policy) = project.policies.get(category)
                && !document.policies.category(category).contains_key(policy)
            {
                problems.push(format!(
                    "project {name} references undefined {category} policy {policy}"
                ));
            }
        }
    }

    for category in ResourceCategory::ALL {
        for (policy, groups) in document.policies.category(category) {
            if policy.trim().is_empty() {
                problems.push(format!("{category} policy with an empty name"));
            }
            let mut group_names = HashSet::new();
            for group in groups {
                let group_name = group.name.trim();
                if group_name.is_empty() {
                    problems.push(format!("{category} policy {policy} has a group with an empty name"));
                    continue;
                }
                if !group_names.insert(group_name.to_ascii_lowercase()) {
                    problems.push(format!(
                        "{category} policy {policy} declares group {group_name} more than once"
                    ));
                }
                if group
                    .members
                    .iter()
                    .flatten()
                    .any(|member| member.trim().is_empty())
                {
                    problems.push(format!(
                        "{category} policy {policy} group {group_name} has an empty member"
                    ));
                }
                if group
                    .permissions
                    .iter()
                    .any(|permission| permission.name.trim().is_empty())
                {
                    problems.push(format!(
                        "{category} policy {policy} group {group_name} has a permission with an empty name"
                    ));
                }
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(PolicyError::Validation(problems))
    }
}

/// Restrict `document` to the project named `name`.
pub fn select_project(document: PolicyDocument, name: &str) -> Result<PolicyDocument, PolicyError> {
    let PolicyDocument { projects, policies } = document;
    let projects: Vec<_> = projects
        .into_iter()
        .filter(|project| project.name.trim().eq_ignore_ascii_case(name.trim()))
        .collect();
    if projects.is_empty() {
        return Err(PolicyError::UnknownProject(name.to_string()));
    }
    Ok(PolicyDocument { projects, policies })
}
