use std::collections::BTreeMap;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{
    Api, Client, ResourceExt,
    api::{ObjectMeta, Patch, PatchParams, PostParams},
};
use rand::Rng;

use crate::keycloak::InstanceIdentity;
use crate::util::{Error, MANAGER_NAME};

pub struct AdminCredentials {
    pub username: String,
    pub password: String,
    pub resource_version: String,
}

/// Decoded value of one Secret key.
pub fn secret_string(secret: &Secret, key: &str) -> Option<String> {
    if let Some(data) = &secret.data
        && let Some(bytes) = data.get(key)
    {
        return String::from_utf8(bytes.0.clone()).ok();
    }
    secret
        .string_data
        .as_ref()
        .and_then(|m| m.get(key))
        .cloned()
}

/// Loads the admin username/password behind an Instance. The Secret's
/// resourceVersion rides along so the session pool can key on it.
pub async fn read_admin_credentials(
    client: &Client,
    identity: &InstanceIdentity,
) -> Result<AdminCredentials, Error> {
    let api: Api<Secret> = Api::namespaced(client.clone(), &identity.secret_namespace);
    let secret = match api.get(&identity.secret_name).await {
        Ok(s) => s,
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            return Err(Error::Secret(format!(
                "credentials secret '{}/{}' not found",
                identity.secret_namespace, identity.secret_name
            )));
        }
        Err(e) => return Err(e.into()),
    };
    let read_key = |key: &str| {
        secret_string(&secret, key).ok_or_else(|| {
            Error::Secret(format!(
                "credentials secret '{}/{}' has no key '{}'",
                identity.secret_namespace, identity.secret_name, key
            ))
        })
    };
    Ok(AdminCredentials {
        username: read_key(&identity.username_key)?,
        password: read_key(&identity.password_key)?,
        resource_version: secret.resource_version().unwrap_or_default(),
    })
}

/// Reads one key of a Secret. `Ok(None)` when the Secret itself is absent;
/// a present Secret lacking the key is a user error.
pub async fn read_secret_key(
    client: &Client,
    namespace: &str,
    name: &str,
    key: &str,
) -> Result<Option<String>, Error> {
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let secret = match api.get(name).await {
        Ok(s) => s,
        Err(kube::Error::Api(ae)) if ae.code == 404 => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    secret_string(&secret, key)
        .map(Some)
        .ok_or_else(|| Error::Secret(format!("secret '{namespace}/{name}' has no key '{key}'")))
}

/// Creates or updates a Secret materialized by the operator. The Secret is
/// labeled as managed and owned by the governing custom resource, so it is
/// garbage-collected together with it.
pub async fn ensure_owned_secret(
    client: &Client,
    namespace: &str,
    name: &str,
    owner: OwnerReference,
    data: BTreeMap<String, String>,
) -> Result<(), Error> {
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    match api.get(name).await {
        Ok(existing) => {
            let up_to_date = data
                .iter()
                .all(|(k, v)| secret_string(&existing, k).as_deref() == Some(v));
            if !up_to_date {
                let patch = serde_json::json!({ "stringData": data });
                api.patch(
                    name,
                    &PatchParams::apply(MANAGER_NAME),
                    &Patch::Merge(&patch),
                )
                .await?;
            }
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            let secret = Secret {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    namespace: Some(namespace.to_string()),
                    labels: Some(BTreeMap::from([(
                        kopper_common::labels::MANAGED.to_string(),
                        "true".to_string(),
                    )])),
                    owner_references: Some(vec![owner]),
                    ..ObjectMeta::default()
                },
                string_data: Some(data),
                ..Secret::default()
            };
            api.create(&PostParams::default(), &secret).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// 24 bytes from the thread-local CSPRNG, URL-safe base64 without padding.
pub fn generate_password() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_passwords_are_url_safe_and_long_enough() {
        let password = generate_password();
        assert_eq!(password.len(), 32);
        assert!(
            password
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_ne!(password, generate_password());
    }

    #[test]
    fn secret_string_reads_data_and_string_data() {
        let secret: Secret = serde_json::from_value(serde_json::json!({
            "metadata": { "name": "kc-admin" },
            "data": { "username": "YWRtaW4=" },
            "stringData": { "password": "hunter2" },
        }))
        .unwrap();
        assert_eq!(secret_string(&secret, "username").as_deref(), Some("admin"));
        assert_eq!(secret_string(&secret, "password").as_deref(), Some("hunter2"));
        assert_eq!(secret_string(&secret, "missing"), None);
    }
}
