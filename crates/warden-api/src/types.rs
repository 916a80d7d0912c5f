//! Response and request shapes for the platform API.
//!
//! The remote shapes are a versioned external contract, so every optional
//! field carries `#[serde(default)]` and unknown fields are ignored.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Envelope used by list endpoints: `{ "count": n, "value": [...] }`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(default)]
    pub count: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    User,
    Group,
}

/// Directory principal returned by identity search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(default)]
    pub entity_type: String,
    #[serde(default)]
    pub origin_directory: String,
    #[serde(default)]
    pub origin_id: String,
    #[serde(default)]
    pub local_id: Option<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub sam_account_name: Option<String>,
    #[serde(default)]
    pub subject_descriptor: Option<String>,
}

impl Identity {
    /// `None` for entity types the platform may return that we cannot act on.
    pub fn kind(&self) -> Option<IdentityKind> {
        match self.entity_type.to_ascii_lowercase().as_str() {
            "user" => Some(IdentityKind::User),
            "group" => Some(IdentityKind::Group),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityPickerResponse {
    #[serde(default)]
    pub results: Vec<IdentityPickerResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityPickerResult {
    #[serde(default)]
    pub identities: Vec<Identity>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceAction {
    pub bit: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub namespace_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityNamespace {
    pub namespace_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub actions: Vec<NamespaceAction>,
}

impl SecurityNamespace {
    pub fn action_by_display_name(&self, display_name: &str) -> Option<&NamespaceAction> {
        self.actions
            .iter()
            .find(|action| action.display_name == display_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamProject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphDescriptor {
    pub value: String,
}

/// Group as listed by the identity graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphGroup {
    pub descriptor: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub principal_name: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub origin_id: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// User or group materialised in the identity graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSubject {
    pub descriptor: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub principal_name: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub origin_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMembership {
    pub container_descriptor: String,
    pub member_descriptor: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataProviderResult {
    #[serde(default)]
    pub data_providers: HashMap<String, Value>,
}

/// Group-scoped permission document served by the admin permissions provider.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPermissionsProvider {
    #[serde(default)]
    pub identity_descriptor: String,
    #[serde(default)]
    pub subject_descriptor: String,
    #[serde(default)]
    pub subject_permissions: Vec<SubjectPermission>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectPermission {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub namespace_id: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub bit: u32,
    #[serde(default)]
    pub explicit_permission_value: u32,
    #[serde(default)]
    pub effective_permission_value: u32,
}

/// Explicit permissions of one identity within one permission set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityPermissions {
    #[serde(default)]
    pub descriptor_identity_type: String,
    #[serde(default)]
    pub descriptor_identifier: String,
    #[serde(default)]
    pub team_foundation_id: Option<String>,
    #[serde(default)]
    pub permissions: Vec<DisplayPermission>,
}

impl IdentityPermissions {
    /// Legacy identity descriptor in `type;identifier` form, absent when the
    /// page omits either half.
    pub fn descriptor(&self) -> Option<String> {
        let identity_type = self.descriptor_identity_type.trim();
        let identifier = self.descriptor_identifier.trim();
        if identity_type.is_empty() || identifier.is_empty() {
            return None;
        }
        Some(format!("{identity_type};{identifier}"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayPermission {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub permission_id: u32,
    #[serde(default)]
    pub explicit_permission_id: u32,
    #[serde(default)]
    pub namespace_id: String,
    #[serde(default)]
    pub permission_bit: u32,
    #[serde(default)]
    pub permission_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AceExtendedInfo {
    pub effective_allow: u32,
    pub effective_deny: u32,
    pub inherited_allow: u32,
    pub inherited_deny: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlEntry {
    pub descriptor: String,
    pub allow: u32,
    pub deny: u32,
    pub extended_info: AceExtendedInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlEntriesRequest {
    pub token: String,
    pub merge: bool,
    pub access_control_entries: Vec<AccessControlEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationNode {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub structure_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_decodes_with_missing_optional_fields() {
        let identity: Identity = serde_json::from_value(json!({
            "entityType": "User",
            "originDirectory": "aad",
            "originId": "o-1",
            "displayName": "Alice"
        }))
        .expect("decode");
        assert_eq!(identity.kind(), Some(IdentityKind::User));
        assert!(identity.subject_descriptor.is_none());
        assert!(identity.sam_account_name.is_none());
    }

    #[test]
    fn identity_kind_rejects_unknown_entity_types() {
        let identity = Identity {
            entity_type: "ServicePrincipal".to_string(),
            ..Identity::default()
        };
        assert_eq!(identity.kind(), None);
    }

    #[test]
    fn list_response_defaults_to_empty() {
        let list: ListResponse<GraphMembership> =
            serde_json::from_value(json!({})).expect("decode");
        assert!(list.value.is_empty());
        assert!(list.count.is_none());
    }

    #[test]
    fn access_control_entries_serialize_in_platform_casing() {
        let request = AccessControlEntriesRequest {
            token: "repoV2/p1/".to_string(),
            merge: true,
            access_control_entries: vec![AccessControlEntry {
                descriptor: "Microsoft.TeamFoundation.Identity;S-1".to_string(),
                allow: 4,
                deny: 0,
                extended_info: AceExtendedInfo {
                    effective_allow: 4,
                    inherited_allow: 4,
                    ..AceExtendedInfo::default()
                },
            }],
        };
        let value = serde_json::to_value(&request).expect("encode");
        assert_eq!(value["merge"], json!(true));
        assert_eq!(value["accessControlEntries"][0]["allow"], json!(4));
        assert_eq!(
            value["accessControlEntries"][0]["extendedInfo"]["inheritedAllow"],
            json!(4)
        );
    }

    #[test]
    fn identity_permissions_descriptor_joins_type_and_identifier() {
        let permissions = IdentityPermissions {
            descriptor_identity_type: "Microsoft.TeamFoundation.Identity".to_string(),
            descriptor_identifier: "S-1-9-1".to_string(),
            ..IdentityPermissions::default()
        };
        assert_eq!(
            permissions.descriptor().as_deref(),
            Some("Microsoft.TeamFoundation.Identity;S-1-9-1")
        );
        let anonymous = IdentityPermissions {
            descriptor_identifier: String::new(),
            ..permissions
        };
        assert_eq!(anonymous.descriptor(), None);
    }
}
