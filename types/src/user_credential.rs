use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ObjectRef, ResourcePhase};

/// Where the credential's password lives. With `create` set the operator
/// generates the password and materializes the Secret itself.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSecret {
    pub name: String,
    #[serde(default = "crate::default_password_key")]
    pub password_key: String,
    #[serde(default)]
    pub create: bool,
}

/// A password credential for a User, sourced from (or materialized into) a
/// cluster Secret and pushed to Keycloak as a credential reset whenever the
/// secret value changes.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "keycloak.kopper.io",
    version = "v1beta1",
    kind = "UserCredential",
    plural = "usercredentials",
    derive = "PartialEq",
    status = "UserCredentialStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(printcolumn = "{\"jsonPath\": \".status.ready\", \"name\": \"READY\", \"type\": \"boolean\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".status.status\", \"name\": \"STATUS\", \"type\": \"string\" }")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.lastUpdated\", \"name\": \"LAST-UPDATE\", \"type\": \"date\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".metadata.creationTimestamp\", \"name\": \"AGE\", \"type\": \"date\" }"
)]
#[serde(rename_all = "camelCase")]
pub struct UserCredentialSpec {
    pub user_ref: ObjectRef,
    pub secret: CredentialSecret,
    #[serde(default)]
    pub temporary: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserCredentialStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub status: ResourcePhase,
    pub message: Option<String>,
    /// SHA-256 of the password last pushed to Keycloak. Guards against
    /// issuing a credential reset when the secret has not changed.
    pub password_hash: Option<String>,
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub last_updated: Option<Time>,
}
