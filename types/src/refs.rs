use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to a namespaced custom resource. Without an explicit namespace
/// the reference targets the referring object's own namespace; cluster-scoped
/// referrers must spell the namespace out.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ObjectRef {
    pub fn new(name: impl Into<String>) -> Self {
        ObjectRef {
            name: name.into(),
            namespace: None,
        }
    }
}

/// Reference to a cluster-scoped custom resource.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterObjectRef {
    pub name: String,
}

/// Reference to a key pair inside a Secret holding admin credentials.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default = "default_username_key")]
    pub username_key: String,
    #[serde(default = "default_password_key")]
    pub password_key: String,
}

pub fn default_username_key() -> String {
    "username".to_string()
}

pub fn default_password_key() -> String {
    "password".to_string()
}

/// Instructions for materializing a client's secret into a cluster Secret.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientSecretRef {
    pub name: String,
    #[serde(default = "default_client_id_key")]
    pub client_id_key: String,
    #[serde(default = "default_client_secret_key")]
    pub client_secret_key: String,
    #[serde(default)]
    pub create: bool,
}

fn default_client_id_key() -> String {
    "client-id".to_string()
}

fn default_client_secret_key() -> String {
    "client-secret".to_string()
}

/// A reference shape that violated its mutual-exclusion contract. The caller
/// reports these as `InvalidSpec` without touching Keycloak.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// More than one of the mutually exclusive references is populated.
    Ambiguous(&'static str),
    /// None of the mutually exclusive references is populated.
    Missing(&'static str),
}

impl fmt::Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorError::Ambiguous(what) => {
                write!(f, "exactly one of {} may be set, found both", what)
            }
            SelectorError::Missing(what) => write!(f, "exactly one of {} must be set", what),
        }
    }
}

impl std::error::Error for SelectorError {}

/// Discriminated reference to the governing Instance.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_ref: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_instance_ref: Option<ClusterObjectRef>,
}

pub enum InstanceTarget<'a> {
    Namespaced(&'a ObjectRef),
    Cluster(&'a ClusterObjectRef),
}

impl InstanceSelector {
    pub fn target(&self) -> Result<InstanceTarget<'_>, SelectorError> {
        match (&self.instance_ref, &self.cluster_instance_ref) {
            (Some(_), Some(_)) => {
                Err(SelectorError::Ambiguous("instanceRef and clusterInstanceRef"))
            }
            (Some(r), None) => Ok(InstanceTarget::Namespaced(r)),
            (None, Some(r)) => Ok(InstanceTarget::Cluster(r)),
            (None, None) => Err(SelectorError::Missing("instanceRef or clusterInstanceRef")),
        }
    }
}

/// Discriminated reference to the governing Realm.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RealmSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_ref: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_realm_ref: Option<ClusterObjectRef>,
}

pub enum RealmTarget<'a> {
    Namespaced(&'a ObjectRef),
    Cluster(&'a ClusterObjectRef),
}

impl RealmSelector {
    pub fn target(&self) -> Result<RealmTarget<'_>, SelectorError> {
        match (&self.realm_ref, &self.cluster_realm_ref) {
            (Some(_), Some(_)) => Err(SelectorError::Ambiguous("realmRef and clusterRealmRef")),
            (Some(r), None) => Ok(RealmTarget::Namespaced(r)),
            (None, Some(r)) => Ok(RealmTarget::Cluster(r)),
            (None, None) => Err(SelectorError::Missing("realmRef or clusterRealmRef")),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.realm_ref.is_none() && self.cluster_realm_ref.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realm_selector_rejects_both_refs() {
        let sel = RealmSelector {
            realm_ref: Some(ObjectRef::new("a")),
            cluster_realm_ref: Some(ClusterObjectRef { name: "b".into() }),
        };
        assert_eq!(
            sel.target().err(),
            Some(SelectorError::Ambiguous("realmRef and clusterRealmRef"))
        );
    }

    #[test]
    fn realm_selector_rejects_no_refs() {
        let sel = RealmSelector::default();
        assert!(matches!(sel.target(), Err(SelectorError::Missing(_))));
    }

    #[test]
    fn instance_selector_accepts_exactly_one() {
        let sel = InstanceSelector {
            instance_ref: Some(ObjectRef::new("ki")),
            cluster_instance_ref: None,
        };
        assert!(matches!(sel.target(), Ok(InstanceTarget::Namespaced(r)) if r.name == "ki"));
    }

    #[test]
    fn secret_ref_key_defaults() {
        let parsed: SecretRef = serde_json::from_value(serde_json::json!({
            "name": "kc-admin",
        }))
        .unwrap();
        assert_eq!(parsed.username_key, "username");
        assert_eq!(parsed.password_key, "password");
    }

    #[test]
    fn client_secret_ref_key_defaults() {
        let parsed: ClientSecretRef = serde_json::from_value(serde_json::json!({
            "name": "app1-sec",
            "create": true,
        }))
        .unwrap();
        assert_eq!(parsed.client_id_key, "client-id");
        assert_eq!(parsed.client_secret_key, "client-secret");
        assert!(parsed.create);
    }
}
