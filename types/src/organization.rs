use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{RealmSelector, ResourcePhase, schema::preserve_unknown};

/// An organization inside a realm. Requires Keycloak 26 or newer; creation
/// requires at least one domain in the definition.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "keycloak.kopper.io",
    version = "v1beta1",
    kind = "Organization",
    plural = "organizations",
    derive = "PartialEq",
    status = "OrganizationStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(printcolumn = "{\"jsonPath\": \".status.ready\", \"name\": \"READY\", \"type\": \"boolean\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".status.status\", \"name\": \"STATUS\", \"type\": \"string\" }")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.organizationID\", \"name\": \"ORG-ID\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".metadata.creationTimestamp\", \"name\": \"AGE\", \"type\": \"date\" }"
)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationSpec {
    #[serde(flatten)]
    pub realm: RealmSelector,
    /// Organization name inside Keycloak. Defaults to the object name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown")]
    pub definition: Value,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub status: ResourcePhase,
    pub message: Option<String>,
    #[serde(rename = "organizationID")]
    pub organization_id: Option<String>,
    pub resource_path: Option<String>,
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub last_updated: Option<Time>,
}
