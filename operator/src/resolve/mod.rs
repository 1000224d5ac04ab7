use kube::{Api, Client, ResourceExt};

use kopper_types::*;

use crate::keycloak::InstanceIdentity;
use crate::util::Error;

/// Where a child resource lives: the governing Keycloak server plus the
/// realm it belongs to. Built fresh on every reconcile; the watch cache is
/// the source of truth.
#[derive(Clone, Debug)]
pub struct Routing {
    pub instance: InstanceIdentity,
    /// Keycloak version recorded on the Instance, for feature gates.
    pub version: Option<String>,
    pub realm: String,
}

fn selector_error(e: SelectorError) -> Error {
    Error::InvalidSpec(e.to_string())
}

/// Namespace for a namespaced ref: explicit wins, then the referrer's own
/// namespace. Cluster-scoped referrers have no default to fall back to.
fn ref_namespace(explicit: Option<&str>, default_ns: Option<&str>) -> Result<String, Error> {
    explicit
        .or(default_ns)
        .map(str::to_string)
        .ok_or_else(|| {
            Error::InvalidSpec(
                "cross-namespace reference requires an explicit namespace".to_string(),
            )
        })
}

async fn fetch<K>(api: Api<K>, kind: &'static str, name: &str) -> Result<K, Error>
where
    K: Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    match api.get(name).await {
        Ok(cr) => Ok(cr),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Err(Error::RefNotFound {
            kind,
            name: name.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

fn not_ready(kind: &'static str, name: &str) -> Error {
    Error::RefNotReady {
        kind,
        name: name.to_string(),
    }
}

pub fn identity_from_instance(cr: &Instance) -> Result<InstanceIdentity, Error> {
    let namespace = cr
        .namespace()
        .ok_or_else(|| Error::InvalidSpec("Instance is missing metadata.namespace".to_string()))?;
    let secret_ref = &cr.spec.credentials.secret_ref;
    Ok(InstanceIdentity {
        name: cr.name_any(),
        namespace: Some(namespace.clone()),
        base_url: cr.spec.base_url.trim_end_matches('/').to_string(),
        admin_realm: cr.spec.realm.clone(),
        secret_name: secret_ref.name.clone(),
        secret_namespace: secret_ref.namespace.clone().unwrap_or(namespace),
        username_key: secret_ref.username_key.clone(),
        password_key: secret_ref.password_key.clone(),
    })
}

pub fn identity_from_cluster_instance(cr: &ClusterInstance) -> Result<InstanceIdentity, Error> {
    let secret_ref = &cr.spec.credentials.secret_ref;
    let secret_namespace = secret_ref.namespace.clone().ok_or_else(|| {
        Error::InvalidSpec(
            "ClusterInstance credentials secretRef requires an explicit namespace".to_string(),
        )
    })?;
    Ok(InstanceIdentity {
        name: cr.name_any(),
        namespace: None,
        base_url: cr.spec.base_url.trim_end_matches('/').to_string(),
        admin_realm: cr.spec.realm.clone(),
        secret_name: secret_ref.name.clone(),
        secret_namespace,
        username_key: secret_ref.username_key.clone(),
        password_key: secret_ref.password_key.clone(),
    })
}

/// Resolves the Instance behind a selector, requiring it to be Ready.
pub async fn resolve_instance(
    client: &Client,
    selector: &InstanceSelector,
    default_ns: Option<&str>,
) -> Result<(InstanceIdentity, Option<String>), Error> {
    match selector.target().map_err(selector_error)? {
        InstanceTarget::Namespaced(r) => {
            let ns = ref_namespace(r.namespace.as_deref(), default_ns)?;
            let api: Api<Instance> = Api::namespaced(client.clone(), &ns);
            let cr = fetch(api, "Instance", &r.name).await?;
            let status = cr.status.as_ref().filter(|s| s.ready);
            let status = status.ok_or_else(|| not_ready("Instance", &r.name))?;
            Ok((identity_from_instance(&cr)?, status.version.clone()))
        }
        InstanceTarget::Cluster(r) => {
            let api: Api<ClusterInstance> = Api::all(client.clone());
            let cr = fetch(api, "ClusterInstance", &r.name).await?;
            let status = cr.status.as_ref().filter(|s| s.ready);
            let status = status.ok_or_else(|| not_ready("ClusterInstance", &r.name))?;
            Ok((identity_from_cluster_instance(&cr)?, status.version.clone()))
        }
    }
}

/// The realm name a Realm resource governs: recorded handle first, then the
/// spec override, then the object name.
pub fn effective_realm_name(
    status_realm: Option<&str>,
    spec_realm_name: Option<&str>,
    meta_name: &str,
) -> String {
    status_realm
        .or(spec_realm_name)
        .unwrap_or(meta_name)
        .to_string()
}

/// Resolves the Realm (and transitively the Instance) behind a selector.
pub async fn resolve_realm(
    client: &Client,
    selector: &RealmSelector,
    default_ns: Option<&str>,
) -> Result<Routing, Error> {
    match selector.target().map_err(selector_error)? {
        RealmTarget::Namespaced(r) => {
            let ns = ref_namespace(r.namespace.as_deref(), default_ns)?;
            let api: Api<Realm> = Api::namespaced(client.clone(), &ns);
            let cr = fetch(api, "Realm", &r.name).await?;
            if !cr.status.as_ref().is_some_and(|s| s.ready) {
                return Err(not_ready("Realm", &r.name));
            }
            let realm = effective_realm_name(
                cr.status.as_ref().and_then(|s| s.realm.as_deref()),
                cr.spec.realm_name.as_deref(),
                &cr.name_any(),
            );
            let (instance, version) =
                resolve_instance(client, &cr.spec.instance, Some(&ns)).await?;
            Ok(Routing {
                instance,
                version,
                realm,
            })
        }
        RealmTarget::Cluster(r) => {
            let api: Api<ClusterRealm> = Api::all(client.clone());
            let cr = fetch(api, "ClusterRealm", &r.name).await?;
            if !cr.status.as_ref().is_some_and(|s| s.ready) {
                return Err(not_ready("ClusterRealm", &r.name));
            }
            let realm = effective_realm_name(
                cr.status.as_ref().and_then(|s| s.realm.as_deref()),
                cr.spec.realm_name.as_deref(),
                &cr.name_any(),
            );
            let (instance, version) = resolve_instance(client, &cr.spec.instance, None).await?;
            Ok(Routing {
                instance,
                version,
                realm,
            })
        }
    }
}

/// A resolved Client resource: its routing plus the Keycloak-side handles.
pub struct ResolvedClient {
    pub routing: Routing,
    pub uuid: String,
    pub client_id: String,
}

pub async fn resolve_client(
    client: &Client,
    r: &ObjectRef,
    default_ns: Option<&str>,
) -> Result<ResolvedClient, Error> {
    let ns = ref_namespace(r.namespace.as_deref(), default_ns)?;
    let api: Api<kopper_types::Client> = Api::namespaced(client.clone(), &ns);
    let cr = fetch(api, "Client", &r.name).await?;
    let status = cr.status.as_ref().filter(|s| s.ready);
    let uuid = status
        .and_then(|s| s.client_uuid.clone())
        .ok_or_else(|| not_ready("Client", &r.name))?;
    let client_id = cr.spec.client_id.clone().unwrap_or_else(|| cr.name_any());
    let routing = resolve_realm(client, &cr.spec.realm, Some(&ns)).await?;
    Ok(ResolvedClient {
        routing,
        uuid,
        client_id,
    })
}

pub async fn resolve_user(
    client: &Client,
    r: &ObjectRef,
    default_ns: Option<&str>,
) -> Result<(Routing, String), Error> {
    let ns = ref_namespace(r.namespace.as_deref(), default_ns)?;
    let api: Api<User> = Api::namespaced(client.clone(), &ns);
    let cr = fetch(api, "User", &r.name).await?;
    let user_id = cr
        .status
        .as_ref()
        .filter(|s| s.ready)
        .and_then(|s| s.user_id.clone())
        .ok_or_else(|| not_ready("User", &r.name))?;
    let routing = match cr.spec.owner().map_err(selector_error)? {
        UserOwner::Realm(selector) => resolve_realm(client, selector, Some(&ns)).await?,
        UserOwner::ServiceAccount(client_ref) => {
            resolve_client(client, client_ref, Some(&ns)).await?.routing
        }
    };
    Ok((routing, user_id))
}

pub async fn resolve_group(
    client: &Client,
    r: &ObjectRef,
    default_ns: Option<&str>,
) -> Result<(Routing, String), Error> {
    let ns = ref_namespace(r.namespace.as_deref(), default_ns)?;
    let api: Api<Group> = Api::namespaced(client.clone(), &ns);
    let cr = fetch(api, "Group", &r.name).await?;
    let group_id = cr
        .status
        .as_ref()
        .filter(|s| s.ready)
        .and_then(|s| s.group_id.clone())
        .ok_or_else(|| not_ready("Group", &r.name))?;
    let routing = resolve_realm(client, &cr.spec.realm, Some(&ns)).await?;
    Ok((routing, group_id))
}

pub async fn resolve_client_scope(
    client: &Client,
    r: &ObjectRef,
    default_ns: Option<&str>,
) -> Result<(Routing, String), Error> {
    let ns = ref_namespace(r.namespace.as_deref(), default_ns)?;
    let api: Api<ClientScope> = Api::namespaced(client.clone(), &ns);
    let cr = fetch(api, "ClientScope", &r.name).await?;
    let scope_id = cr
        .status
        .as_ref()
        .filter(|s| s.ready)
        .and_then(|s| s.scope_id.clone())
        .ok_or_else(|| not_ready("ClientScope", &r.name))?;
    let routing = resolve_realm(client, &cr.spec.realm, Some(&ns)).await?;
    Ok((routing, scope_id))
}

/// A Role resource resolved for mapping purposes: its name plus the client
/// scope, when it is a client-level role.
pub struct ResolvedRole {
    pub name: String,
    pub client_uuid: Option<String>,
}

pub async fn resolve_role(
    client: &Client,
    r: &ObjectRef,
    default_ns: Option<&str>,
) -> Result<ResolvedRole, Error> {
    let ns = ref_namespace(r.namespace.as_deref(), default_ns)?;
    let api: Api<Role> = Api::namespaced(client.clone(), &ns);
    let cr = fetch(api, "Role", &r.name).await?;
    if !cr.status.as_ref().is_some_and(|s| s.ready) {
        return Err(not_ready("Role", &r.name));
    }
    let name = cr.spec.name.clone().unwrap_or_else(|| cr.name_any());
    let client_uuid = match &cr.spec.client_ref {
        Some(client_ref) => Some(resolve_client(client, client_ref, Some(&ns)).await?.uuid),
        None => None,
    };
    Ok(ResolvedRole { name, client_uuid })
}

pub async fn resolve_component(
    client: &Client,
    r: &ObjectRef,
    default_ns: Option<&str>,
) -> Result<String, Error> {
    let ns = ref_namespace(r.namespace.as_deref(), default_ns)?;
    let api: Api<Component> = Api::namespaced(client.clone(), &ns);
    let cr = fetch(api, "Component", &r.name).await?;
    cr.status
        .as_ref()
        .filter(|s| s.ready)
        .and_then(|s| s.component_id.clone())
        .ok_or_else(|| not_ready("Component", &r.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_namespace_prefers_explicit_over_default() {
        assert_eq!(ref_namespace(Some("a"), Some("b")).unwrap(), "a");
        assert_eq!(ref_namespace(None, Some("b")).unwrap(), "b");
        assert!(matches!(
            ref_namespace(None, None),
            Err(Error::InvalidSpec(_))
        ));
    }

    #[test]
    fn effective_realm_name_prefers_recorded_handle() {
        assert_eq!(
            effective_realm_name(Some("live"), Some("declared"), "meta"),
            "live"
        );
        assert_eq!(effective_realm_name(None, Some("declared"), "meta"), "declared");
        assert_eq!(effective_realm_name(None, None, "meta"), "meta");
    }

    #[test]
    fn cluster_instance_identity_requires_secret_namespace() {
        let cr: ClusterInstance = serde_json::from_value(serde_json::json!({
            "apiVersion": "keycloak.kopper.io/v1beta1",
            "kind": "ClusterInstance",
            "metadata": { "name": "kc" },
            "spec": {
                "baseUrl": "http://keycloak:8080/",
                "credentials": { "secretRef": { "name": "kc-admin" } },
            },
        }))
        .unwrap();
        assert!(matches!(
            identity_from_cluster_instance(&cr),
            Err(Error::InvalidSpec(_))
        ));
    }

    #[test]
    fn instance_identity_defaults_and_trims() {
        let cr: Instance = serde_json::from_value(serde_json::json!({
            "apiVersion": "keycloak.kopper.io/v1beta1",
            "kind": "Instance",
            "metadata": { "name": "ki", "namespace": "team-a" },
            "spec": {
                "baseUrl": "http://keycloak:8080/",
                "credentials": { "secretRef": { "name": "kc-admin" } },
            },
        }))
        .unwrap();
        let identity = identity_from_instance(&cr).unwrap();
        assert_eq!(identity.base_url, "http://keycloak:8080");
        assert_eq!(identity.admin_realm, "master");
        assert_eq!(identity.secret_namespace, "team-a");
        assert_eq!(identity.username_key, "username");
        assert_eq!(identity.password_key, "password");
    }
}
