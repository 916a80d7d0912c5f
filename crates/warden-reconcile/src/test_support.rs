//! In-memory platform used by unit and integration tests.
//!
//! # Purpose
//! Implements `PlatformApi` entirely in memory so reconciliation can be
//! exercised end to end without a network. It understands exactly the calls in
//! `warden_api::endpoints` and keeps enough state (directory, projects, groups,
//! memberships, explicit permission bits) for those calls to observe each
//! other's effects.
//!
//! # Notes
//! - Every request is recorded; `mutations()` filters the ones that change
//!   state so tests can assert idempotence.
//! - `fail_next` injects transient failures for paths containing a fragment.
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use warden_api::{
    ApiError, ApiRequest, ApiResult, ClassificationNode, DisplayPermission, GraphGroup,
    GraphMembership, Identity, Method, NamespaceAction, PlatformApi, SecurityNamespace,
    SubjectPermission, TeamProject, endpoints,
};

pub const IDENTITY_DESCRIPTOR_TYPE: &str = "Microsoft.TeamFoundation.Identity";

/// A permission the platform displays for some scope.
#[derive(Debug, Clone)]
struct PermissionDefinition {
    display_name: String,
    namespace_id: String,
    token: String,
    bit: u32,
    group_scoped: bool,
}

#[derive(Default)]
struct State {
    directory: Vec<Identity>,
    namespaces: Vec<SecurityNamespace>,
    projects: Vec<TeamProject>,
    groups: Vec<(String, GraphGroup)>,
    memberships: BTreeSet<(String, String)>,
    definitions: Vec<PermissionDefinition>,
    explicit: HashMap<(String, String, String, u32), u32>,
    areas: HashMap<String, ClassificationNode>,
    failures: Vec<(String, u32)>,
    requests: Vec<ApiRequest>,
    next_id: u64,
}

#[derive(Clone, Default)]
pub struct FakePlatform {
    state: Arc<Mutex<State>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Directory user with an already-materialised subject descriptor.
    pub fn add_user(&self, display_name: &str, mail: &str) -> Identity {
        let identity = self.build_user(display_name, mail);
        self.lock().directory.push(identity.clone());
        identity
    }

    /// Directory user not yet known to the identity graph.
    pub fn add_unmaterialized_user(&self, display_name: &str, mail: &str) -> Identity {
        let identity = Identity {
            subject_descriptor: None,
            ..self.build_user(display_name, mail)
        };
        self.lock().directory.push(identity.clone());
        identity
    }

    fn build_user(&self, display_name: &str, mail: &str) -> Identity {
        Identity {
            entity_type: "User".to_string(),
            origin_directory: "aad".to_string(),
            origin_id: format!("oid-{}", slug(display_name)),
            local_id: Some(format!("lid-{}", slug(display_name))),
            display_name: display_name.to_string(),
            sam_account_name: Some(mail.to_string()),
            subject_descriptor: Some(format!("aad.{}", slug(display_name))),
        }
    }

    /// Directory group; `origin_directory` is `vsd` or `aad` in practice.
    pub fn add_directory_group(&self, display_name: &str, origin_directory: &str) -> Identity {
        let descriptor = match origin_directory {
            "vsd" => Some(format!("vssgp.{}", slug(display_name))),
            _ => None,
        };
        let identity = Identity {
            entity_type: "Group".to_string(),
            origin_directory: origin_directory.to_string(),
            origin_id: format!("oid-{}", slug(display_name)),
            local_id: None,
            display_name: display_name.to_string(),
            sam_account_name: None,
            subject_descriptor: descriptor,
        };
        self.lock().directory.push(identity.clone());
        identity
    }

    pub fn add_namespace(&self, name: &str, namespace_id: &str, actions: &[(u32, &str)]) {
        self.lock().namespaces.push(SecurityNamespace {
            namespace_id: namespace_id.to_string(),
            name: name.to_string(),
            display_name: name.to_string(),
            actions: actions
                .iter()
                .map(|(bit, display_name)| NamespaceAction {
                    bit: *bit,
                    name: slug(display_name),
                    display_name: display_name.to_string(),
                    namespace_id: namespace_id.to_string(),
                })
                .collect(),
        });
    }

    pub fn add_project(&self, name: &str, description: &str) -> TeamProject {
        let mut state = self.lock();
        state.next_id += 1;
        let project = TeamProject {
            id: format!("proj-{}", state.next_id),
            name: name.to_string(),
            description: Some(description.to_string()),
            state: Some("wellFormed".to_string()),
            visibility: Some("private".to_string()),
        };
        state.projects.push(project.clone());
        state.areas.insert(
            project.id.clone(),
            ClassificationNode {
                id: 1,
                identifier: format!("area-{}", project.id),
                name: name.to_string(),
                structure_type: Some("area".to_string()),
            },
        );
        project
    }

    pub fn set_root_area_identifier(&self, project: &TeamProject, identifier: &str) {
        if let Some(node) = self.lock().areas.get_mut(&project.id) {
            node.identifier = identifier.to_string();
        }
    }

    pub fn add_group(&self, project: &TeamProject, display_name: &str) -> GraphGroup {
        let mut state = self.lock();
        insert_group(&mut state, project, display_name)
    }

    pub fn add_member(&self, group: &GraphGroup, member_descriptor: &str) {
        self.lock()
            .memberships
            .insert((group.descriptor.clone(), member_descriptor.to_string()));
    }

    /// Permission shown on the group-scoped provider document.
    pub fn define_group_permission(&self, display_name: &str, namespace_id: &str, token: &str, bit: u32) {
        self.lock().definitions.push(PermissionDefinition {
            display_name: display_name.to_string(),
            namespace_id: namespace_id.to_string(),
            token: token.to_string(),
            bit,
            group_scoped: true,
        });
    }

    /// Permission shown on the explicit display-permissions page.
    pub fn define_permission(&self, display_name: &str, namespace_id: &str, token: &str, bit: u32) {
        self.lock().definitions.push(PermissionDefinition {
            display_name: display_name.to_string(),
            namespace_id: namespace_id.to_string(),
            token: token.to_string(),
            bit,
            group_scoped: false,
        });
    }

    /// Seed an explicit value (1 allow, 2 deny) for `identifier`.
    pub fn set_explicit(&self, identifier: &str, namespace_id: &str, token: &str, bit: u32, value: u32) {
        self.lock().explicit.insert(
            (
                identifier.to_string(),
                namespace_id.to_string(),
                token.to_string(),
                bit,
            ),
            value,
        );
    }

    pub fn explicit(&self, identifier: &str, namespace_id: &str, token: &str, bit: u32) -> u32 {
        self.lock()
            .explicit
            .get(&(
                identifier.to_string(),
                namespace_id.to_string(),
                token.to_string(),
                bit,
            ))
            .copied()
            .unwrap_or(0)
    }

    pub fn fail_next(&self, path_fragment: &str, times: u32) {
        self.lock()
            .failures
            .push((path_fragment.to_string(), times));
    }

    pub fn members_of(&self, group: &GraphGroup) -> BTreeSet<String> {
        self.lock()
            .memberships
            .iter()
            .filter(|(container, _)| *container == group.descriptor)
            .map(|(_, member)| member.clone())
            .collect()
    }

    pub fn groups_of(&self, project: &TeamProject) -> Vec<GraphGroup> {
        self.lock()
            .groups
            .iter()
            .filter(|(project_id, _)| *project_id == project.id)
            .map(|(_, group)| group.clone())
            .collect()
    }

    pub fn project(&self, name: &str) -> Option<TeamProject> {
        self.lock()
            .projects
            .iter()
            .find(|project| project.name == name)
            .cloned()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.lock().requests.clone()
    }

    /// Requests that change platform state.
    pub fn mutations(&self) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(is_mutation)
            .collect()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    fn take_failure(state: &mut State, path: &str) -> bool {
        for (fragment, remaining) in state.failures.iter_mut() {
            if *remaining > 0 && path.contains(fragment.as_str()) {
                *remaining -= 1;
                return true;
            }
        }
        false
    }

    fn handle(state: &mut State, request: &ApiRequest) -> ApiResult<Value> {
        let segments: Vec<&str> = request.path.trim_matches('/').split('/').collect();
        match (request.method, segments.as_slice()) {
            (Method::Post, ["_apis", "IdentityPicker", "Identities"]) => {
                Ok(search_directory(state, request))
            }
            (Method::Get, ["_apis", "securitynamespaces"]) => {
                Ok(json!({ "count": state.namespaces.len(), "value": state.namespaces }))
            }
            (Method::Get, ["_apis", "projects"]) => {
                Ok(json!({ "count": state.projects.len(), "value": state.projects }))
            }
            (Method::Post, ["_apis", "projects"]) => create_project(state, request),
            (Method::Patch, ["_apis", "projects", project_id]) => {
                let description = body_str(request, "description");
                let project = state
                    .projects
                    .iter_mut()
                    .find(|project| project.id == *project_id)
                    .ok_or_else(|| not_found(&request.path))?;
                project.description = Some(description);
                Ok(json!({ "id": "op-update", "status": "queued" }))
            }
            (Method::Get, ["_apis", "graph", "descriptors", storage_key]) => {
                Ok(json!({ "value": format!("scp.{storage_key}") }))
            }
            (Method::Get, ["_apis", "graph", "groups"]) => {
                let scope = request.query_value("scopeDescriptor").unwrap_or_default();
                let project_id = scope.trim_start_matches("scp.");
                let groups: Vec<&GraphGroup> = state
                    .groups
                    .iter()
                    .filter(|(owner, _)| owner == project_id)
                    .map(|(_, group)| group)
                    .collect();
                Ok(json!({ "count": groups.len(), "value": groups }))
            }
            (Method::Post, ["_apis", "graph", "groups"]) => {
                if let Some(container) = request.query_value("groupDescriptors") {
                    let origin_id = body_str(request, "originId");
                    materialize(state, &origin_id, container, &request.path)
                } else {
                    let scope = request.query_value("scopeDescriptor").unwrap_or_default();
                    let project_id = scope.trim_start_matches("scp.").to_string();
                    let project = state
                        .projects
                        .iter()
                        .find(|project| project.id == project_id)
                        .cloned()
                        .ok_or_else(|| not_found(&request.path))?;
                    let display_name = body_str(request, "displayName");
                    let group = insert_group(state, &project, &display_name);
                    Ok(serde_json::to_value(group)?)
                }
            }
            (Method::Post, ["_apis", "graph", "users"]) => {
                let container = request
                    .query_value("groupDescriptors")
                    .unwrap_or_default()
                    .to_string();
                let origin_id = body_str(request, "originId");
                materialize(state, &origin_id, &container, &request.path)
            }
            (Method::Get, ["_apis", "graph", "Memberships", container]) => {
                let value: Vec<GraphMembership> = state
                    .memberships
                    .iter()
                    .filter(|(owner, _)| owner == container)
                    .map(|(owner, member)| GraphMembership {
                        container_descriptor: owner.clone(),
                        member_descriptor: member.clone(),
                    })
                    .collect();
                Ok(json!({ "count": value.len(), "value": value }))
            }
            (Method::Put, ["_apis", "graph", "memberships", member, container]) => {
                state
                    .memberships
                    .insert((container.to_string(), member.to_string()));
                Ok(json!({ "containerDescriptor": container, "memberDescriptor": member }))
            }
            (Method::Delete, ["_apis", "graph", "memberships", member, container]) => {
                state
                    .memberships
                    .remove(&(container.to_string(), member.to_string()));
                Ok(Value::Null)
            }
            (Method::Post, ["_apis", "Contribution", "HierarchyQuery", "project", _project_id]) => {
                Ok(hierarchy_query(state, request))
            }
            (Method::Get, [_project_id, "_api", "_security", "DisplayPermissions"]) => {
                Ok(display_permissions(state, request))
            }
            (Method::Post, ["_apis", "AccessControlEntries", namespace_id]) => {
                set_entries(state, namespace_id, request)
            }
            (Method::Delete, ["_apis", "permissions", namespace_id, bit]) => {
                let bit: u32 = bit.parse().map_err(|_| not_found(&request.path))?;
                let descriptor = request.query_value("descriptor").unwrap_or_default();
                let token = request.query_value("token").unwrap_or_default().to_string();
                let identifier = identifier_of(descriptor);
                state
                    .explicit
                    .remove(&(identifier, namespace_id.to_string(), token, bit));
                Ok(json!({ "value": [true] }))
            }
            (Method::Get, [project_id, "_apis", "wit", "classificationnodes", "Areas"]) => state
                .areas
                .get(*project_id)
                .map(|node| {
                    json!({
                        "id": node.id,
                        "identifier": node.identifier,
                        "name": node.name,
                        "structureType": node.structure_type
                    })
                })
                .ok_or_else(|| not_found(&request.path)),
            _ => Err(not_found(&request.path)),
        }
    }
}

#[async_trait]
impl PlatformApi for FakePlatform {
    async fn send(&self, request: &ApiRequest) -> ApiResult<Value> {
        let mut state = self.lock();
        state.requests.push(request.clone());
        if Self::take_failure(&mut state, &request.path) {
            return Err(ApiError::Status {
                status: 503,
                body: "injected failure".to_string(),
            });
        }
        Self::handle(&mut state, request)
    }
}

pub fn is_mutation(request: &ApiRequest) -> bool {
    match request.method {
        Method::Get => false,
        Method::Post => {
            !request.path.contains("IdentityPicker") && !request.path.contains("HierarchyQuery")
        }
        Method::Put | Method::Patch | Method::Delete => true,
    }
}

fn slug(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

fn not_found(path: &str) -> ApiError {
    ApiError::Status {
        status: 404,
        body: format!("no route for {path}"),
    }
}

fn body_str(request: &ApiRequest, key: &str) -> String {
    request
        .body
        .as_ref()
        .and_then(|body| body.get(key))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn identifier_of(descriptor: &str) -> String {
    descriptor
        .rsplit_once(';')
        .map(|(_, identifier)| identifier)
        .unwrap_or(descriptor)
        .to_string()
}

fn insert_group(state: &mut State, project: &TeamProject, display_name: &str) -> GraphGroup {
    state.next_id += 1;
    let group = GraphGroup {
        descriptor: format!("vssgp.{}.{}", project.id, slug(display_name)),
        display_name: display_name.to_string(),
        principal_name: format!("[{}]\\{}", project.name, display_name),
        origin: "vsts".to_string(),
        origin_id: format!("tf-{}", state.next_id),
        description: None,
    };
    state.groups.push((project.id.clone(), group.clone()));
    group
}

fn search_directory(state: &State, request: &ApiRequest) -> Value {
    let body = request.body.clone().unwrap_or(Value::Null);
    let query = body["query"].as_str().unwrap_or_default().to_lowercase();
    let types: Vec<String> = body["identityTypes"]
        .as_array()
        .map(|types| {
            types
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let max = body["options"]["MaxResults"].as_u64().unwrap_or(10) as usize;
    let identities: Vec<&Identity> = state
        .directory
        .iter()
        .filter(|identity| types.contains(&identity.entity_type.to_lowercase()))
        .filter(|identity| {
            let display = identity.display_name.to_lowercase();
            let sam = identity
                .sam_account_name
                .clone()
                .unwrap_or_default()
                .to_lowercase();
            display.contains(&query) || query.contains(&display) || (!sam.is_empty() && sam == query)
        })
        .take(max)
        .collect();
    json!({ "results": [ { "identities": identities } ] })
}

fn create_project(state: &mut State, request: &ApiRequest) -> ApiResult<Value> {
    let name = body_str(request, "name");
    if state.projects.iter().any(|project| project.name == name) {
        return Err(ApiError::Status {
            status: 409,
            body: format!("project {name} exists"),
        });
    }
    state.next_id += 1;
    let project = TeamProject {
        id: format!("proj-{}", state.next_id),
        name: name.clone(),
        description: Some(body_str(request, "description")),
        state: Some("wellFormed".to_string()),
        visibility: Some(body_str(request, "visibility")),
    };
    state.areas.insert(
        project.id.clone(),
        ClassificationNode {
            id: 1,
            identifier: format!("area-{}", project.id),
            name,
            structure_type: Some("area".to_string()),
        },
    );
    state.projects.push(project);
    Ok(json!({ "id": "op-create", "status": "queued" }))
}

fn materialize(state: &mut State, origin_id: &str, container: &str, path: &str) -> ApiResult<Value> {
    let identity = state
        .directory
        .iter_mut()
        .find(|identity| identity.origin_id == origin_id)
        .ok_or_else(|| not_found(path))?;
    let descriptor = identity
        .subject_descriptor
        .get_or_insert_with(|| {
            let prefix = if identity.entity_type == "Group" {
                "aadgp"
            } else {
                "aad"
            };
            format!("{prefix}.{}", slug(&identity.display_name))
        })
        .clone();
    let display_name = identity.display_name.clone();
    let entity_type = identity.entity_type.clone();
    if entity_type == "User" {
        state
            .memberships
            .insert((container.to_string(), descriptor.clone()));
    }
    Ok(json!({
        "descriptor": descriptor,
        "displayName": display_name,
        "origin": "aad",
        "originId": origin_id
    }))
}

fn hierarchy_query(state: &State, request: &ApiRequest) -> Value {
    let body = request.body.clone().unwrap_or(Value::Null);
    let contribution = body["contributionIds"][0].as_str().unwrap_or_default();
    if contribution != endpoints::GROUP_PERMISSIONS_PROVIDER {
        return json!({ "dataProviders": { contribution: {} } });
    }
    let subject = body["dataProviderContext"]["properties"]["subjectDescriptor"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let permissions: Vec<SubjectPermission> = state
        .definitions
        .iter()
        .filter(|definition| definition.group_scoped)
        .map(|definition| {
            let value = state
                .explicit
                .get(&(
                    subject.clone(),
                    definition.namespace_id.clone(),
                    definition.token.clone(),
                    definition.bit,
                ))
                .copied()
                .unwrap_or(0);
            SubjectPermission {
                display_name: definition.display_name.clone(),
                namespace_id: definition.namespace_id.clone(),
                token: definition.token.clone(),
                bit: definition.bit,
                explicit_permission_value: value,
                effective_permission_value: value,
            }
        })
        .collect();
    json!({
        "dataProviders": {
            (endpoints::GROUP_PERMISSIONS_PROVIDER): {
                "identityDescriptor": format!("{IDENTITY_DESCRIPTOR_TYPE};{subject}"),
                "subjectDescriptor": subject,
                "subjectPermissions": permissions
            }
        }
    })
}

fn display_permissions(state: &State, request: &ApiRequest) -> Value {
    let tfid = request.query_value("tfid").unwrap_or_default().to_string();
    let namespace_id = request.query_value("permissionSetId").unwrap_or_default();
    let token = request.query_value("permissionSetToken").unwrap_or_default();
    let permissions: Vec<DisplayPermission> = state
        .definitions
        .iter()
        .filter(|definition| {
            !definition.group_scoped
                && definition.namespace_id == namespace_id
                && definition.token == token
        })
        .map(|definition| {
            let value = state
                .explicit
                .get(&(
                    tfid.clone(),
                    definition.namespace_id.clone(),
                    definition.token.clone(),
                    definition.bit,
                ))
                .copied()
                .unwrap_or(0);
            DisplayPermission {
                display_name: definition.display_name.clone(),
                permission_id: value,
                explicit_permission_id: value,
                namespace_id: definition.namespace_id.clone(),
                permission_bit: definition.bit,
                permission_token: definition.token.clone(),
            }
        })
        .collect();
    json!({
        "descriptorIdentityType": IDENTITY_DESCRIPTOR_TYPE,
        "descriptorIdentifier": tfid,
        "teamFoundationId": tfid,
        "permissions": permissions
    })
}

fn set_entries(state: &mut State, namespace_id: &str, request: &ApiRequest) -> ApiResult<Value> {
    let body = request.body.clone().unwrap_or(Value::Null);
    let token = body["token"].as_str().unwrap_or_default().to_string();
    let entries = body["accessControlEntries"].as_array().cloned().unwrap_or_default();
    for entry in &entries {
        let identifier = identifier_of(entry["descriptor"].as_str().unwrap_or_default());
        let allow = entry["allow"].as_u64().unwrap_or(0) as u32;
        let deny = entry["deny"].as_u64().unwrap_or(0) as u32;
        if allow != 0 {
            state.explicit.insert(
                (identifier.clone(), namespace_id.to_string(), token.clone(), allow),
                1,
            );
        }
        if deny != 0 {
            state
                .explicit
                .insert((identifier, namespace_id.to_string(), token.clone(), deny), 2);
        }
    }
    Ok(json!({ "count": entries.len(), "value": entries }))
}
