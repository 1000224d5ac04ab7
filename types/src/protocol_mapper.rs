use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ObjectRef, ResourcePhase, SelectorError, schema::preserve_unknown};

/// A protocol mapper attached to a Client or to a ClientScope.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "keycloak.kopper.io",
    version = "v1beta1",
    kind = "ProtocolMapper",
    plural = "protocolmappers",
    derive = "PartialEq",
    status = "ProtocolMapperStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(printcolumn = "{\"jsonPath\": \".status.ready\", \"name\": \"READY\", \"type\": \"boolean\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".status.status\", \"name\": \"STATUS\", \"type\": \"string\" }")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.mapperID\", \"name\": \"MAPPER-ID\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".metadata.creationTimestamp\", \"name\": \"AGE\", \"type\": \"date\" }"
)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMapperSpec {
    /// Parent client. Mutually exclusive with `clientScopeRef`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<ObjectRef>,
    /// Parent client scope. Mutually exclusive with `clientRef`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_scope_ref: Option<ObjectRef>,
    /// Mapper name inside Keycloak. Defaults to the object name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown")]
    pub definition: Value,
}

pub enum MapperParent<'a> {
    Client(&'a ObjectRef),
    ClientScope(&'a ObjectRef),
}

impl ProtocolMapperSpec {
    pub fn parent(&self) -> Result<MapperParent<'_>, SelectorError> {
        match (&self.client_ref, &self.client_scope_ref) {
            (Some(_), Some(_)) => Err(SelectorError::Ambiguous("clientRef and clientScopeRef")),
            (Some(c), None) => Ok(MapperParent::Client(c)),
            (None, Some(s)) => Ok(MapperParent::ClientScope(s)),
            (None, None) => Err(SelectorError::Missing("clientRef or clientScopeRef")),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMapperStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub status: ResourcePhase,
    pub message: Option<String>,
    #[serde(rename = "mapperID")]
    pub mapper_id: Option<String>,
    pub resource_path: Option<String>,
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub last_updated: Option<Time>,
}
