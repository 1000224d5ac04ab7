use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ObjectRef, RealmSelector, ResourcePhase, schema::preserve_unknown};

/// A realm component: key providers, user federation and similar plugins.
/// The parent defaults to the realm itself; `parentRef` nests the component
/// under another Component resource.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "keycloak.kopper.io",
    version = "v1beta1",
    kind = "Component",
    plural = "components",
    derive = "PartialEq",
    status = "ComponentStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(printcolumn = "{\"jsonPath\": \".status.ready\", \"name\": \"READY\", \"type\": \"boolean\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".status.status\", \"name\": \"STATUS\", \"type\": \"string\" }")]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.providerType\", \"name\": \"PROVIDER-TYPE\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".metadata.creationTimestamp\", \"name\": \"AGE\", \"type\": \"date\" }"
)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    #[serde(flatten)]
    pub realm: RealmSelector,
    /// Component name inside Keycloak. Defaults to the object name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Fully qualified provider interface, e.g.
    /// `org.keycloak.keys.KeyProvider`.
    pub provider_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_ref: Option<ObjectRef>,
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown")]
    pub definition: Value,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub status: ResourcePhase,
    pub message: Option<String>,
    #[serde(rename = "componentID")]
    pub component_id: Option<String>,
    pub resource_path: Option<String>,
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub last_updated: Option<Time>,
}
