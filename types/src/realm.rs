use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{InstanceSelector, ResourcePhase, schema::preserve_unknown};

/// A Keycloak realm declared on one Instance. The `definition` is an opaque
/// RealmRepresentation; the operator only interprets the handful of fields it
/// needs for naming and drift detection.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "keycloak.kopper.io",
    version = "v1beta1",
    kind = "Realm",
    plural = "realms",
    derive = "PartialEq",
    status = "RealmStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(printcolumn = "{\"jsonPath\": \".status.ready\", \"name\": \"READY\", \"type\": \"boolean\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".status.status\", \"name\": \"STATUS\", \"type\": \"string\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".status.realm\", \"name\": \"REALM\", \"type\": \"string\" }")]
#[kube(
    printcolumn = "{\"jsonPath\": \".metadata.creationTimestamp\", \"name\": \"AGE\", \"type\": \"date\" }"
)]
#[serde(rename_all = "camelCase")]
pub struct RealmSpec {
    #[serde(flatten)]
    pub instance: InstanceSelector,
    /// Realm name inside Keycloak. Defaults to the object name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_name: Option<String>,
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown")]
    pub definition: Value,
}

#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "keycloak.kopper.io",
    version = "v1beta1",
    kind = "ClusterRealm",
    plural = "clusterrealms",
    derive = "PartialEq",
    status = "RealmStatus"
)]
#[kube(derive = "Default")]
#[kube(printcolumn = "{\"jsonPath\": \".status.ready\", \"name\": \"READY\", \"type\": \"boolean\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".status.status\", \"name\": \"STATUS\", \"type\": \"string\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".status.realm\", \"name\": \"REALM\", \"type\": \"string\" }")]
#[kube(
    printcolumn = "{\"jsonPath\": \".metadata.creationTimestamp\", \"name\": \"AGE\", \"type\": \"date\" }"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRealmSpec {
    #[serde(flatten)]
    pub instance: InstanceSelector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_name: Option<String>,
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown")]
    pub definition: Value,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RealmStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub status: ResourcePhase,
    pub message: Option<String>,
    /// The realm name acting as the Keycloak-side handle.
    pub realm: Option<String>,
    pub resource_path: Option<String>,
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub last_updated: Option<Time>,
}
