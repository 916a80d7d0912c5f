//! Request builders for every platform call the reconciler makes.
//!
//! These only describe the verb, host, path and body; they carry no decision
//! logic and never talk to the network.
use crate::request::{ApiRequest, Service};
use serde_json::{Value, json};

const CORE_API_VERSION: &str = "7.1";
const GRAPH_API_VERSION: &str = "7.1-preview.1";
const IDENTITY_PICKER_API_VERSION: &str = "5.1-preview.1";
const HIERARCHY_QUERY_API_VERSION: &str = "5.0-preview.1";
const LEGACY_PAGE_VERSION: &str = "5";

/// Contribution id of the provider that renders group permissions.
pub const GROUP_PERMISSIONS_PROVIDER: &str =
    "ms.vss-admin-web.org-admin-groups-permissions-pivot-data-provider";
/// Provider whose first read provisions release-pipeline security for a project.
pub const RELEASE_DEFINITIONS_PROVIDER: &str =
    "ms.vss-releaseManagement-web.releases-landing-data-provider";
/// Provider whose first read provisions service-endpoint security for a project.
pub const SERVICE_ENDPOINTS_PROVIDER: &str =
    "ms.vss-serviceEndpoints-web.service-endpoints-details-data-provider";

const MAX_IDENTITY_RESULTS: u32 = 10;

pub fn identity_search(query: &str, identity_types: &[&str]) -> ApiRequest {
    ApiRequest::post(Service::Core, "_apis/IdentityPicker/Identities")
        .api_version(IDENTITY_PICKER_API_VERSION)
        .json(json!({
            "query": query,
            "identityTypes": identity_types,
            "operationScopes": ["ims", "source"],
            "options": { "MinResults": 1, "MaxResults": MAX_IDENTITY_RESULTS },
            "properties": [
                "DisplayName",
                "SamAccountName",
                "SubjectDescriptor",
                "LocalId",
                "Mail"
            ]
        }))
}

pub fn security_namespaces() -> ApiRequest {
    ApiRequest::get(Service::Core, "_apis/securitynamespaces").api_version(CORE_API_VERSION)
}

pub fn list_projects() -> ApiRequest {
    ApiRequest::get(Service::Core, "_apis/projects")
        .api_version(CORE_API_VERSION)
        .query("$top", "1000")
}

pub fn create_project(
    name: &str,
    description: &str,
    visibility: &str,
    process_template_id: &str,
) -> ApiRequest {
    ApiRequest::post(Service::Core, "_apis/projects")
        .api_version(CORE_API_VERSION)
        .json(json!({
            "name": name,
            "description": description,
            "visibility": visibility,
            "capabilities": {
                "versioncontrol": { "sourceControlType": "Git" },
                "processTemplate": { "templateTypeId": process_template_id }
            }
        }))
}

pub fn update_project(project_id: &str, description: &str) -> ApiRequest {
    ApiRequest::patch(Service::Core, format!("_apis/projects/{project_id}"))
        .api_version(CORE_API_VERSION)
        .json(json!({ "description": description }))
}

pub fn graph_descriptor(storage_key: &str) -> ApiRequest {
    ApiRequest::get(Service::Graph, format!("_apis/graph/descriptors/{storage_key}"))
        .api_version(GRAPH_API_VERSION)
}

pub fn list_groups(scope_descriptor: &str) -> ApiRequest {
    ApiRequest::get(Service::Graph, "_apis/graph/groups")
        .api_version(GRAPH_API_VERSION)
        .query("scopeDescriptor", scope_descriptor)
}

pub fn create_group(scope_descriptor: &str, display_name: &str) -> ApiRequest {
    ApiRequest::post(Service::Graph, "_apis/graph/groups")
        .api_version(GRAPH_API_VERSION)
        .query("scopeDescriptor", scope_descriptor)
        .json(json!({
            "displayName": display_name,
            "description": format!("Managed by warden: {display_name}")
        }))
}

/// Materialise an external directory group as a member of `group_descriptor`.
pub fn materialize_group(origin_id: &str, group_descriptor: &str) -> ApiRequest {
    ApiRequest::post(Service::Graph, "_apis/graph/groups")
        .api_version(GRAPH_API_VERSION)
        .query("groupDescriptors", group_descriptor)
        .json(json!({ "originId": origin_id }))
}

/// Materialise a directory user directly into `group_descriptor`.
pub fn materialize_user(origin_id: &str, group_descriptor: &str) -> ApiRequest {
    ApiRequest::post(Service::Graph, "_apis/graph/users")
        .api_version(GRAPH_API_VERSION)
        .query("groupDescriptors", group_descriptor)
        .json(json!({ "originId": origin_id }))
}

pub fn list_memberships(container_descriptor: &str) -> ApiRequest {
    ApiRequest::get(
        Service::Graph,
        format!("_apis/graph/Memberships/{container_descriptor}"),
    )
    .api_version(GRAPH_API_VERSION)
    .query("direction", "Down")
}

pub fn add_membership(member_descriptor: &str, container_descriptor: &str) -> ApiRequest {
    ApiRequest::put(
        Service::Graph,
        format!("_apis/graph/memberships/{member_descriptor}/{container_descriptor}"),
    )
    .api_version(GRAPH_API_VERSION)
}

pub fn remove_membership(member_descriptor: &str, container_descriptor: &str) -> ApiRequest {
    ApiRequest::delete(
        Service::Graph,
        format!("_apis/graph/memberships/{member_descriptor}/{container_descriptor}"),
    )
    .api_version(GRAPH_API_VERSION)
}

pub fn hierarchy_query(project_id: &str, contribution_ids: &[&str], properties: Value) -> ApiRequest {
    ApiRequest::post(
        Service::Core,
        format!("_apis/Contribution/HierarchyQuery/project/{project_id}"),
    )
    .api_version(HIERARCHY_QUERY_API_VERSION)
    .json(json!({
        "contributionIds": contribution_ids,
        "dataProviderContext": { "properties": properties }
    }))
}

pub fn group_permissions(project_id: &str, subject_descriptor: &str) -> ApiRequest {
    hierarchy_query(
        project_id,
        &[GROUP_PERMISSIONS_PROVIDER],
        json!({
            "subjectDescriptor": subject_descriptor,
            "sourcePage": {
                "routeId": "ms.vss-admin-web.project-admin-hub-route",
                "routeValues": { "project": project_id, "adminPivot": "permissions" }
            }
        }),
    )
}

pub fn display_permissions(
    project_id: &str,
    team_foundation_id: &str,
    namespace_id: &str,
    token: &str,
) -> ApiRequest {
    ApiRequest::get(
        Service::Core,
        format!("{project_id}/_api/_security/DisplayPermissions"),
    )
    .query("__v", LEGACY_PAGE_VERSION)
    .query("tfid", team_foundation_id)
    .query("permissionSetId", namespace_id)
    .query("permissionSetToken", token)
}

pub fn set_access_control_entries(namespace_id: &str, body: Value) -> ApiRequest {
    ApiRequest::post(
        Service::Core,
        format!("_apis/AccessControlEntries/{namespace_id}"),
    )
    .api_version(CORE_API_VERSION)
    .json(body)
}

/// Clear one permission bit of `descriptor` on `token`.
pub fn remove_permission(namespace_id: &str, bit: u32, descriptor: &str, token: &str) -> ApiRequest {
    ApiRequest::delete(
        Service::Core,
        format!("_apis/permissions/{namespace_id}/{bit}"),
    )
    .api_version(CORE_API_VERSION)
    .query("descriptor", descriptor)
    .query("token", token)
}

pub fn area_root(project_id: &str) -> ApiRequest {
    ApiRequest::get(
        Service::Core,
        format!("{project_id}/_apis/wit/classificationnodes/Areas"),
    )
    .api_version(CORE_API_VERSION)
    .query("$depth", "0")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Method;

    #[test]
    fn identity_search_caps_candidates() {
        let request = identity_search("alice", &["user", "group"]);
        let body = request.body.expect("body");
        assert_eq!(body["options"]["MaxResults"], json!(10));
        assert_eq!(body["identityTypes"], json!(["user", "group"]));
    }

    #[test]
    fn membership_paths_put_member_before_container() {
        let add = add_membership("aad.member", "vssgp.group");
        assert_eq!(add.method, Method::Put);
        assert_eq!(add.path, "_apis/graph/memberships/aad.member/vssgp.group");
        let remove = remove_membership("aad.member", "vssgp.group");
        assert_eq!(remove.method, Method::Delete);
        assert_eq!(remove.path, add.path);
    }

    #[test]
    fn remove_permission_addresses_one_bit() {
        let request = remove_permission("ns-1", 8, "desc", "repoV2/p1/");
        assert_eq!(request.path, "_apis/permissions/ns-1/8");
        assert_eq!(request.query_value("token"), Some("repoV2/p1/"));
        assert_eq!(request.query_value("descriptor"), Some("desc"));
    }

    #[test]
    fn display_permissions_carries_scope() {
        let request = display_permissions("p1", "tf-1", "ns-1", "p1");
        assert_eq!(request.path, "p1/_api/_security/DisplayPermissions");
        assert_eq!(request.query_value("tfid"), Some("tf-1"));
        assert_eq!(request.query_value("permissionSetId"), Some("ns-1"));
        assert_eq!(request.query_value("permissionSetToken"), Some("p1"));
    }
}
