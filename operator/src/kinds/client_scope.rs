use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::{Map, Value, json};

use kopper_types::ClientScope;

use crate::kernel::{Context, ObjectAdapter};
use crate::keycloak::{Session, admin_path};
use crate::resolve::{self, Routing};
use crate::util::Error;

pub fn effective_scope_name(cr: &ClientScope) -> String {
    cr.spec.name.clone().unwrap_or_else(|| cr.name_any())
}

fn desired_scope(
    name: &str,
    protocol: Option<&str>,
    definition: &Value,
) -> Result<Map<String, Value>, Error> {
    let mut desired = crate::diff::definition_object(definition)?;
    desired.insert("name".to_string(), json!(name));
    if let Some(protocol) = protocol {
        desired.insert("protocol".to_string(), json!(protocol));
    } else {
        desired.entry("protocol").or_insert(json!("openid-connect"));
    }
    Ok(desired)
}

/// Client scopes have no filtered list endpoint; adoption scans the full
/// listing for the name.
pub async fn find_scope_by_name(
    session: &Session,
    realm: &str,
    name: &str,
) -> Result<Option<Value>, Error> {
    let scopes = session.get(&admin_path(realm, "/client-scopes")).await?;
    Ok(scopes
        .as_array()
        .and_then(|list| {
            list.iter()
                .find(|s| s.get("name").and_then(Value::as_str) == Some(name))
        })
        .cloned())
}

pub struct ClientScopeAdapter;

#[async_trait]
impl ObjectAdapter for ClientScopeAdapter {
    type Cr = ClientScope;
    type Resolved = Routing;

    async fn resolve(ctx: &Context, cr: &ClientScope) -> Result<Routing, Error> {
        let namespace = cr.namespace();
        resolve::resolve_realm(&ctx.client, &cr.spec.realm, namespace.as_deref()).await
    }

    fn routing(resolved: &Routing) -> &Routing {
        resolved
    }

    fn desired(_resolved: &Routing, cr: &ClientScope) -> Result<Map<String, Value>, Error> {
        desired_scope(
            &effective_scope_name(cr),
            cr.spec.protocol.as_deref(),
            &cr.spec.definition,
        )
    }

    async fn find_by_handle(
        session: &Session,
        resolved: &Routing,
        handle: &str,
    ) -> Result<Option<Value>, Error> {
        session
            .get_opt(&admin_path(&resolved.realm, &format!("/client-scopes/{handle}")))
            .await
    }

    async fn find_by_key(
        session: &Session,
        resolved: &Routing,
        cr: &ClientScope,
    ) -> Result<Option<Value>, Error> {
        find_scope_by_name(session, &resolved.realm, &effective_scope_name(cr)).await
    }

    async fn create(
        session: &Session,
        resolved: &Routing,
        desired: &Value,
        _cr: &ClientScope,
    ) -> Result<(), Error> {
        session
            .post(&admin_path(&resolved.realm, "/client-scopes"), desired)
            .await
    }

    async fn update(
        session: &Session,
        resolved: &Routing,
        handle: &str,
        body: &Value,
    ) -> Result<(), Error> {
        session
            .put(
                &admin_path(&resolved.realm, &format!("/client-scopes/{handle}")),
                body,
            )
            .await
    }

    async fn delete(session: &Session, resolved: &Routing, handle: &str) -> Result<(), Error> {
        session
            .delete(&admin_path(&resolved.realm, &format!("/client-scopes/{handle}")))
            .await
    }

    fn resource_path(resolved: &Routing, handle: &str) -> Option<String> {
        Some(format!("/realms/{}/client-scopes/{}", resolved.realm, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kopper_types::ClientScopeSpec;

    #[test]
    fn protocol_defaults_to_openid_connect() {
        let desired = desired_scope("email", None, &json!({})).unwrap();
        assert_eq!(desired["protocol"], "openid-connect");
    }

    #[test]
    fn explicit_protocol_wins_over_definition() {
        let desired = desired_scope("saml-attrs", Some("saml"), &json!({"protocol": "openid-connect"}))
            .unwrap();
        assert_eq!(desired["protocol"], "saml");
    }

    #[test]
    fn scope_name_defaults_to_object_name() {
        let cr = ClientScope::new("email", ClientScopeSpec::default());
        assert_eq!(effective_scope_name(&cr), "email");
    }
}

crate::kernel::delegate_object_adapter!(ClientScopeAdapter);
