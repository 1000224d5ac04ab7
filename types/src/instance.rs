use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ResourcePhase, SecretRef};

/// Admin credential source for a Keycloak server.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceCredentials {
    pub secret_ref: SecretRef,
}

pub fn default_admin_realm() -> String {
    "master".to_string()
}

/// Identity of a Keycloak server reachable inside the cluster (or anywhere
/// the operator can route to). All other kinds hang off an Instance.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "keycloak.kopper.io",
    version = "v1beta1",
    kind = "Instance",
    plural = "instances",
    derive = "PartialEq",
    status = "InstanceStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(printcolumn = "{\"jsonPath\": \".status.ready\", \"name\": \"READY\", \"type\": \"boolean\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".status.status\", \"name\": \"STATUS\", \"type\": \"string\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".spec.baseUrl\", \"name\": \"URL\", \"type\": \"string\" }")]
#[kube(
    printcolumn = "{\"jsonPath\": \".metadata.creationTimestamp\", \"name\": \"AGE\", \"type\": \"date\" }"
)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    /// Root URL of the Keycloak server, e.g. `https://keycloak.example.com`.
    pub base_url: String,
    pub credentials: InstanceCredentials,
    /// Realm the admin user authenticates against.
    #[serde(default = "default_admin_realm")]
    pub realm: String,
}

/// Cluster-scoped variant of [`Instance`]. Namespaced refs inside its
/// credentials must carry an explicit namespace.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "keycloak.kopper.io",
    version = "v1beta1",
    kind = "ClusterInstance",
    plural = "clusterinstances",
    derive = "PartialEq",
    status = "InstanceStatus"
)]
#[kube(derive = "Default")]
#[kube(printcolumn = "{\"jsonPath\": \".status.ready\", \"name\": \"READY\", \"type\": \"boolean\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".status.status\", \"name\": \"STATUS\", \"type\": \"string\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".spec.baseUrl\", \"name\": \"URL\", \"type\": \"string\" }")]
#[kube(
    printcolumn = "{\"jsonPath\": \".metadata.creationTimestamp\", \"name\": \"AGE\", \"type\": \"date\" }"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInstanceSpec {
    pub base_url: String,
    pub credentials: InstanceCredentials,
    #[serde(default = "default_admin_realm")]
    pub realm: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub status: ResourcePhase,
    pub message: Option<String>,
    /// Keycloak server version as reported by `/admin/serverinfo`.
    pub version: Option<String>,
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub last_updated: Option<Time>,
}
