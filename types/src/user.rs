use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ObjectRef, RealmSelector, ResourcePhase, SelectorError, schema::preserve_unknown};

/// One-shot password applied when the user is first created.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitialPassword {
    pub value: String,
    #[serde(default)]
    pub temporary: bool,
}

/// Materializes the user's login into a cluster Secret, optionally
/// generating the password.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSecret {
    pub secret_name: String,
    #[serde(default = "crate::default_username_key")]
    pub username_key: String,
    #[serde(default = "crate::default_password_key")]
    pub password_key: String,
    #[serde(default)]
    pub generate_password: bool,
}

/// A realm user, or the service-account user of a client when `clientRef`
/// is set instead of a realm reference.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "keycloak.kopper.io",
    version = "v1beta1",
    kind = "User",
    plural = "users",
    derive = "PartialEq",
    status = "UserStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(printcolumn = "{\"jsonPath\": \".status.ready\", \"name\": \"READY\", \"type\": \"boolean\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".status.status\", \"name\": \"STATUS\", \"type\": \"string\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".status.userID\", \"name\": \"USER-ID\", \"type\": \"string\" }")]
#[kube(
    printcolumn = "{\"jsonPath\": \".metadata.creationTimestamp\", \"name\": \"AGE\", \"type\": \"date\" }"
)]
#[serde(rename_all = "camelCase")]
pub struct UserSpec {
    #[serde(flatten)]
    pub realm: RealmSelector,
    /// Binds this object to a client's service-account user instead of a
    /// regular realm user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<ObjectRef>,
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown")]
    pub definition: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_password: Option<InitialPassword>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_secret: Option<UserSecret>,
}

/// How a User resource is anchored in Keycloak.
pub enum UserOwner<'a> {
    Realm(&'a RealmSelector),
    ServiceAccount(&'a ObjectRef),
}

impl UserSpec {
    pub fn owner(&self) -> Result<UserOwner<'_>, SelectorError> {
        match (&self.client_ref, self.realm.is_empty()) {
            (Some(_), false) => Err(SelectorError::Ambiguous(
                "realmRef/clusterRealmRef and clientRef",
            )),
            (Some(client), true) => Ok(UserOwner::ServiceAccount(client)),
            (None, _) => {
                self.realm.target()?;
                Ok(UserOwner::Realm(&self.realm))
            }
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub status: ResourcePhase,
    pub message: Option<String>,
    #[serde(rename = "userID")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub is_service_account: bool,
    pub resource_path: Option<String>,
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub last_updated: Option<Time>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClusterObjectRef;

    #[test]
    fn user_owner_rejects_realm_and_client_ref() {
        let spec = UserSpec {
            realm: RealmSelector {
                realm_ref: Some(ObjectRef::new("r1")),
                cluster_realm_ref: None,
            },
            client_ref: Some(ObjectRef::new("app1")),
            ..UserSpec::default()
        };
        assert!(matches!(spec.owner(), Err(SelectorError::Ambiguous(_))));
    }

    #[test]
    fn user_owner_rejects_both_realm_refs() {
        let spec = UserSpec {
            realm: RealmSelector {
                realm_ref: Some(ObjectRef::new("r1")),
                cluster_realm_ref: Some(ClusterObjectRef { name: "cr1".into() }),
            },
            ..UserSpec::default()
        };
        assert!(matches!(spec.owner(), Err(SelectorError::Ambiguous(_))));
    }

    #[test]
    fn user_owner_accepts_service_account_binding() {
        let spec = UserSpec {
            client_ref: Some(ObjectRef::new("app1")),
            ..UserSpec::default()
        };
        assert!(matches!(spec.owner(), Ok(UserOwner::ServiceAccount(r)) if r.name == "app1"));
    }
}
