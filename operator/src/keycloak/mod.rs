use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use kube::Client;
use tokio::sync::Mutex;

use crate::util::Error;

mod session;

pub use session::{Session, admin_path};

const SEGMENT: &percent_encoding::AsciiSet = &percent_encoding::CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'?')
    .add(b'#')
    .add(b'/')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'=');

/// Percent-encodes a name for use as a path segment or query value. Role and
/// group names may carry spaces and slashes.
pub fn encode(value: &str) -> String {
    percent_encoding::utf8_percent_encode(value, SEGMENT).to_string()
}

/// Connection identity of one Keycloak server, extracted from an Instance or
/// ClusterInstance spec. The owning resource's coordinates ride along so the
/// pool can map credential-Secret edits back to their Instances.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstanceIdentity {
    pub name: String,
    /// None for ClusterInstance.
    pub namespace: Option<String>,
    pub base_url: String,
    pub admin_realm: String,
    pub secret_name: String,
    pub secret_namespace: String,
    pub username_key: String,
    pub password_key: String,
}

/// Sessions are keyed on the credential Secret's resourceVersion: rotating
/// admin credentials evicts the stale session on the next acquire.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct SessionKey {
    base_url: String,
    admin_realm: String,
    secret_namespace: String,
    secret_name: String,
    resource_version: String,
}

impl SessionKey {
    fn same_source(&self, other: &SessionKey) -> bool {
        self.base_url == other.base_url
            && self.admin_realm == other.admin_realm
            && self.secret_namespace == other.secret_namespace
            && self.secret_name == other.secret_name
    }
}

/// Process-wide pool of authenticated admin sessions. One mutex guards the
/// map, so token exchanges for the same identity are serialized and N
/// concurrent reconciles against one Instance perform at most one exchange
/// per token lifetime.
#[derive(Default)]
pub struct SessionPool {
    sessions: Mutex<HashMap<SessionKey, Arc<Session>>>,
    dependents: std::sync::Mutex<HashMap<(String, String), HashSet<(Option<String>, String)>>>,
}

impl SessionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(
        &self,
        client: &Client,
        identity: &InstanceIdentity,
    ) -> Result<Arc<Session>, Error> {
        let credentials = crate::secrets::read_admin_credentials(client, identity).await?;
        self.record_dependent(identity);
        let key = SessionKey {
            base_url: identity.base_url.trim_end_matches('/').to_string(),
            admin_realm: identity.admin_realm.clone(),
            secret_namespace: identity.secret_namespace.clone(),
            secret_name: identity.secret_name.clone(),
            resource_version: credentials.resource_version,
        };
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|k, _| !(k.same_source(&key) && k.resource_version != key.resource_version));
        if let Some(session) = sessions.get(&key) {
            return Ok(session.clone());
        }
        let session = Arc::new(
            Session::connect(
                &key.base_url,
                &key.admin_realm,
                &credentials.username,
                &credentials.password,
            )
            .await?,
        );
        sessions.insert(key, session.clone());
        Ok(session)
    }

    /// Drops every session backed by the given base URL. Called when an
    /// Instance is deleted or its spec changes endpoint.
    pub async fn evict(&self, base_url: &str) {
        let base_url = base_url.trim_end_matches('/');
        self.sessions
            .lock()
            .await
            .retain(|k, _| k.base_url != base_url);
    }

    fn record_dependent(&self, identity: &InstanceIdentity) {
        self.dependents
            .lock()
            .unwrap()
            .entry((
                identity.secret_namespace.clone(),
                identity.secret_name.clone(),
            ))
            .or_default()
            .insert((identity.namespace.clone(), identity.name.clone()));
    }

    /// Instances whose admin credentials live in the given Secret. Feeds the
    /// Secret watch so credential rotation re-reconciles them promptly.
    pub fn dependents_of(&self, namespace: &str, name: &str) -> Vec<(Option<String>, String)> {
        self.dependents
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str, secret: &str) -> InstanceIdentity {
        InstanceIdentity {
            name: name.to_string(),
            namespace: Some("default".to_string()),
            base_url: "http://keycloak:8080".to_string(),
            admin_realm: "master".to_string(),
            secret_name: secret.to_string(),
            secret_namespace: "default".to_string(),
            username_key: "username".to_string(),
            password_key: "password".to_string(),
        }
    }

    #[test]
    fn dependents_are_indexed_by_secret() {
        let pool = SessionPool::new();
        pool.record_dependent(&identity("ki", "kc-admin"));
        pool.record_dependent(&identity("ki2", "kc-admin"));
        pool.record_dependent(&identity("other", "other-admin"));

        let mut deps = pool.dependents_of("default", "kc-admin");
        deps.sort();
        assert_eq!(
            deps,
            vec![
                (Some("default".to_string()), "ki".to_string()),
                (Some("default".to_string()), "ki2".to_string()),
            ]
        );
        assert!(pool.dependents_of("default", "unknown").is_empty());
    }

    #[test]
    fn names_are_escaped_for_paths() {
        assert_eq!(encode("plain-name"), "plain-name");
        assert_eq!(encode("ops / admins"), "ops%20%2F%20admins");
        assert_eq!(encode("a+b=c"), "a%2Bb%3Dc");
    }

    #[test]
    fn session_keys_distinguish_resource_versions() {
        let a = SessionKey {
            base_url: "http://kc".into(),
            admin_realm: "master".into(),
            secret_namespace: "default".into(),
            secret_name: "kc-admin".into(),
            resource_version: "1".into(),
        };
        let b = SessionKey {
            resource_version: "2".into(),
            ..a.clone()
        };
        assert!(a.same_source(&b));
        assert_ne!(a, b);
    }
}
