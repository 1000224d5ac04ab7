use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ObjectRef, RealmSelector, ResourcePhase, schema::preserve_unknown};

/// A realm-level role, or a client-level role when `clientRef` is set.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "keycloak.kopper.io",
    version = "v1beta1",
    kind = "Role",
    plural = "roles",
    derive = "PartialEq",
    status = "RoleStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(printcolumn = "{\"jsonPath\": \".status.ready\", \"name\": \"READY\", \"type\": \"boolean\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".status.status\", \"name\": \"STATUS\", \"type\": \"string\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".status.roleId\", \"name\": \"ROLE-ID\", \"type\": \"string\" }")]
#[kube(
    printcolumn = "{\"jsonPath\": \".metadata.creationTimestamp\", \"name\": \"AGE\", \"type\": \"date\" }"
)]
#[serde(rename_all = "camelCase")]
pub struct RoleSpec {
    #[serde(flatten)]
    pub realm: RealmSelector,
    /// Scopes the role to a client instead of the realm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<ObjectRef>,
    /// Role name inside Keycloak. Defaults to the object name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown")]
    pub definition: Value,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub status: ResourcePhase,
    pub message: Option<String>,
    pub role_id: Option<String>,
    pub resource_path: Option<String>,
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub last_updated: Option<Time>,
}
