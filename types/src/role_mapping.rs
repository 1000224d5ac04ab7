use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ObjectRef, ResourcePhase, SelectorError};

/// The user or group receiving the role.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ref: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_ref: Option<ObjectRef>,
}

pub enum SubjectTarget<'a> {
    User(&'a ObjectRef),
    Group(&'a ObjectRef),
}

impl Subject {
    pub fn target(&self) -> Result<SubjectTarget<'_>, SelectorError> {
        match (&self.user_ref, &self.group_ref) {
            (Some(_), Some(_)) => Err(SelectorError::Ambiguous("userRef and groupRef")),
            (Some(u), None) => Ok(SubjectTarget::User(u)),
            (None, Some(g)) => Ok(SubjectTarget::Group(g)),
            (None, None) => Err(SelectorError::Missing("userRef or groupRef")),
        }
    }
}

/// Inline designation of a role by name, optionally scoped to a client
/// either through a Client resource or a literal clientId.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InlineRole {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// Grants one role to one subject. The mapping is removed from Keycloak when
/// the resource is deleted, and re-targeted when the role designation
/// changes.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "keycloak.kopper.io",
    version = "v1beta1",
    kind = "RoleMapping",
    plural = "rolemappings",
    derive = "PartialEq",
    status = "RoleMappingStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(printcolumn = "{\"jsonPath\": \".status.ready\", \"name\": \"READY\", \"type\": \"boolean\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".status.status\", \"name\": \"STATUS\", \"type\": \"string\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".spec.role.name\", \"name\": \"ROLE\", \"type\": \"string\" }")]
#[kube(
    printcolumn = "{\"jsonPath\": \".metadata.creationTimestamp\", \"name\": \"AGE\", \"type\": \"date\" }"
)]
#[serde(rename_all = "camelCase")]
pub struct RoleMappingSpec {
    pub subject: Subject,
    /// Inline role designation. Mutually exclusive with `roleRef`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<InlineRole>,
    /// Reference to a Role resource. Mutually exclusive with `role`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_ref: Option<ObjectRef>,
}

pub enum RoleDesignation<'a> {
    Inline(&'a InlineRole),
    Ref(&'a ObjectRef),
}

impl RoleMappingSpec {
    pub fn role_designation(&self) -> Result<RoleDesignation<'_>, SelectorError> {
        match (&self.role, &self.role_ref) {
            (Some(_), Some(_)) => Err(SelectorError::Ambiguous("role and roleRef")),
            (Some(r), None) => {
                if r.client_ref.is_some() && r.client_id.is_some() {
                    return Err(SelectorError::Ambiguous("role.clientRef and role.clientId"));
                }
                Ok(RoleDesignation::Inline(r))
            }
            (None, Some(r)) => Ok(RoleDesignation::Ref(r)),
            (None, None) => Err(SelectorError::Missing("role or roleRef")),
        }
    }
}

/// The role a previous reconcile bound, kept so a re-targeted mapping can
/// remove its predecessor.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignedRole {
    pub role_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_uuid: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleMappingStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub status: ResourcePhase,
    pub message: Option<String>,
    pub assigned: Option<AssignedRole>,
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub last_updated: Option<Time>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_requires_exactly_one_ref() {
        let both = Subject {
            user_ref: Some(ObjectRef::new("u")),
            group_ref: Some(ObjectRef::new("g")),
        };
        assert!(matches!(both.target(), Err(SelectorError::Ambiguous(_))));
        assert!(matches!(Subject::default().target(), Err(SelectorError::Missing(_))));
    }

    #[test]
    fn inline_role_rejects_client_ref_and_client_id() {
        let spec = RoleMappingSpec {
            subject: Subject {
                user_ref: Some(ObjectRef::new("u")),
                group_ref: None,
            },
            role: Some(InlineRole {
                name: "editor".into(),
                client_ref: Some(ObjectRef::new("app1")),
                client_id: Some("app1".into()),
            }),
            role_ref: None,
        };
        assert!(matches!(
            spec.role_designation(),
            Err(SelectorError::Ambiguous(_))
        ));
    }

    #[test]
    fn role_and_role_ref_are_mutually_exclusive() {
        let spec = RoleMappingSpec {
            subject: Subject::default(),
            role: Some(InlineRole {
                name: "editor".into(),
                ..InlineRole::default()
            }),
            role_ref: Some(ObjectRef::new("editor")),
        };
        assert!(matches!(
            spec.role_designation(),
            Err(SelectorError::Ambiguous(_))
        ));
    }
}
