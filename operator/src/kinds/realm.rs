use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::{Map, Value, json};

use kopper_types::{ClusterRealm, Realm};

use crate::kernel::{Context, ObjectAdapter};
use crate::keycloak::Session;
use crate::resolve::{self, Routing};
use crate::util::Error;

/// Fields Keycloak derives on the realm representation; the declared
/// definition never controls them.
const REALM_SERVER_KEYS: &[&str] = &["defaultRole", "defaultRoles", "keycloakVersion"];

fn desired_realm(realm_name: &str, definition: &Value) -> Result<Map<String, Value>, Error> {
    let mut desired = crate::diff::definition_object(definition)?;
    desired.insert("realm".to_string(), json!(realm_name));
    desired.entry("enabled").or_insert(json!(true));
    Ok(desired)
}

fn realm_handle(observed: &Value) -> Option<String> {
    observed
        .get("realm")
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub struct RealmAdapter;

#[async_trait]
impl ObjectAdapter for RealmAdapter {
    type Cr = Realm;
    type Resolved = Routing;

    async fn resolve(ctx: &Context, cr: &Realm) -> Result<Routing, Error> {
        let namespace = cr.namespace();
        let (instance, version) =
            resolve::resolve_instance(&ctx.client, &cr.spec.instance, namespace.as_deref())
                .await?;
        let realm = resolve::effective_realm_name(
            cr.status.as_ref().and_then(|s| s.realm.as_deref()),
            cr.spec.realm_name.as_deref(),
            &cr.name_any(),
        );
        Ok(Routing {
            instance,
            version,
            realm,
        })
    }

    fn routing(resolved: &Routing) -> &Routing {
        resolved
    }

    fn desired(resolved: &Routing, cr: &Realm) -> Result<Map<String, Value>, Error> {
        desired_realm(&resolved.realm, &cr.spec.definition)
    }

    async fn find_by_handle(
        session: &Session,
        _resolved: &Routing,
        handle: &str,
    ) -> Result<Option<Value>, Error> {
        session.get_opt(&format!("/admin/realms/{handle}")).await
    }

    async fn find_by_key(
        session: &Session,
        resolved: &Routing,
        _cr: &Realm,
    ) -> Result<Option<Value>, Error> {
        session
            .get_opt(&format!("/admin/realms/{}", resolved.realm))
            .await
    }

    async fn create(
        session: &Session,
        _resolved: &Routing,
        desired: &Value,
        _cr: &Realm,
    ) -> Result<(), Error> {
        session.post("/admin/realms", desired).await
    }

    async fn update(
        session: &Session,
        _resolved: &Routing,
        handle: &str,
        body: &Value,
    ) -> Result<(), Error> {
        session.put(&format!("/admin/realms/{handle}"), body).await
    }

    async fn delete(session: &Session, _resolved: &Routing, handle: &str) -> Result<(), Error> {
        session.delete(&format!("/admin/realms/{handle}")).await
    }

    fn handle_of(observed: &Value) -> Option<String> {
        realm_handle(observed)
    }

    fn server_keys() -> &'static [&'static str] {
        REALM_SERVER_KEYS
    }

    fn resource_path(_resolved: &Routing, handle: &str) -> Option<String> {
        Some(format!("/realms/{handle}"))
    }
}

pub struct ClusterRealmAdapter;

#[async_trait]
impl ObjectAdapter for ClusterRealmAdapter {
    type Cr = ClusterRealm;
    type Resolved = Routing;

    async fn resolve(ctx: &Context, cr: &ClusterRealm) -> Result<Routing, Error> {
        let (instance, version) =
            resolve::resolve_instance(&ctx.client, &cr.spec.instance, None).await?;
        let realm = resolve::effective_realm_name(
            cr.status.as_ref().and_then(|s| s.realm.as_deref()),
            cr.spec.realm_name.as_deref(),
            &cr.name_any(),
        );
        Ok(Routing {
            instance,
            version,
            realm,
        })
    }

    fn routing(resolved: &Routing) -> &Routing {
        resolved
    }

    fn desired(resolved: &Routing, cr: &ClusterRealm) -> Result<Map<String, Value>, Error> {
        desired_realm(&resolved.realm, &cr.spec.definition)
    }

    async fn find_by_handle(
        session: &Session,
        _resolved: &Routing,
        handle: &str,
    ) -> Result<Option<Value>, Error> {
        session.get_opt(&format!("/admin/realms/{handle}")).await
    }

    async fn find_by_key(
        session: &Session,
        resolved: &Routing,
        _cr: &ClusterRealm,
    ) -> Result<Option<Value>, Error> {
        session
            .get_opt(&format!("/admin/realms/{}", resolved.realm))
            .await
    }

    async fn create(
        session: &Session,
        _resolved: &Routing,
        desired: &Value,
        _cr: &ClusterRealm,
    ) -> Result<(), Error> {
        session.post("/admin/realms", desired).await
    }

    async fn update(
        session: &Session,
        _resolved: &Routing,
        handle: &str,
        body: &Value,
    ) -> Result<(), Error> {
        session.put(&format!("/admin/realms/{handle}"), body).await
    }

    async fn delete(session: &Session, _resolved: &Routing, handle: &str) -> Result<(), Error> {
        session.delete(&format!("/admin/realms/{handle}")).await
    }

    fn handle_of(observed: &Value) -> Option<String> {
        realm_handle(observed)
    }

    fn server_keys() -> &'static [&'static str] {
        REALM_SERVER_KEYS
    }

    fn resource_path(_resolved: &Routing, handle: &str) -> Option<String> {
        Some(format!("/realms/{handle}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desired_realm_injects_name_and_defaults_enabled() {
        let desired = desired_realm("e2e", &json!({"displayName": "E2E"})).unwrap();
        assert_eq!(desired["realm"], "e2e");
        assert_eq!(desired["enabled"], true);
        assert_eq!(desired["displayName"], "E2E");
    }

    #[test]
    fn desired_realm_keeps_explicit_enabled() {
        let desired = desired_realm("e2e", &json!({"enabled": false})).unwrap();
        assert_eq!(desired["enabled"], false);
    }

    #[test]
    fn realm_handle_is_the_realm_name() {
        assert_eq!(
            realm_handle(&json!({"id": "uuid", "realm": "e2e"})).as_deref(),
            Some("e2e")
        );
        assert_eq!(realm_handle(&json!({"id": "uuid"})), None);
    }
}

crate::kernel::delegate_object_adapter!(RealmAdapter);
crate::kernel::delegate_object_adapter!(ClusterRealmAdapter);
