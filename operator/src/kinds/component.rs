use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::{Map, Value, json};

use kopper_types::Component;

use crate::kernel::{Context, ObjectAdapter};
use crate::keycloak::{Session, admin_path, encode};
use crate::resolve::{self, Routing};
use crate::util::Error;

pub struct ComponentResolved {
    pub routing: Routing,
    /// Component id of the parent component, when nested. Without it the
    /// parent defaults to the realm itself (Keycloak fills in the realm id).
    pub parent_id: Option<String>,
}

pub fn effective_component_name(cr: &Component) -> String {
    cr.spec.name.clone().unwrap_or_else(|| cr.name_any())
}

fn desired_component(
    name: &str,
    provider_type: &str,
    parent_id: Option<&str>,
    definition: &Value,
) -> Result<Map<String, Value>, Error> {
    let mut desired = crate::diff::definition_object(definition)?;
    desired.insert("name".to_string(), json!(name));
    desired.insert("providerType".to_string(), json!(provider_type));
    if let Some(parent_id) = parent_id {
        desired.insert("parentId".to_string(), json!(parent_id));
    }
    Ok(desired)
}

pub struct ComponentAdapter;

#[async_trait]
impl ObjectAdapter for ComponentAdapter {
    type Cr = Component;
    type Resolved = ComponentResolved;

    async fn resolve(ctx: &Context, cr: &Component) -> Result<ComponentResolved, Error> {
        let namespace = cr.namespace();
        let routing =
            resolve::resolve_realm(&ctx.client, &cr.spec.realm, namespace.as_deref()).await?;
        let parent_id = match &cr.spec.parent_ref {
            Some(parent_ref) => Some(
                resolve::resolve_component(&ctx.client, parent_ref, namespace.as_deref()).await?,
            ),
            None => None,
        };
        Ok(ComponentResolved { routing, parent_id })
    }

    fn routing(resolved: &ComponentResolved) -> &Routing {
        &resolved.routing
    }

    fn desired(resolved: &ComponentResolved, cr: &Component) -> Result<Map<String, Value>, Error> {
        desired_component(
            &effective_component_name(cr),
            &cr.spec.provider_type,
            resolved.parent_id.as_deref(),
            &cr.spec.definition,
        )
    }

    async fn find_by_handle(
        session: &Session,
        resolved: &ComponentResolved,
        handle: &str,
    ) -> Result<Option<Value>, Error> {
        session
            .get_opt(&admin_path(
                &resolved.routing.realm,
                &format!("/components/{handle}"),
            ))
            .await
    }

    /// Adoption key: `(name, providerType)` within the parent.
    async fn find_by_key(
        session: &Session,
        resolved: &ComponentResolved,
        cr: &Component,
    ) -> Result<Option<Value>, Error> {
        let name = effective_component_name(cr);
        let mut query = format!(
            "/components?name={}&type={}",
            encode(&name),
            encode(&cr.spec.provider_type)
        );
        if let Some(parent_id) = &resolved.parent_id {
            query.push_str(&format!("&parent={parent_id}"));
        }
        let found = session
            .get(&admin_path(&resolved.routing.realm, &query))
            .await?;
        Ok(found
            .as_array()
            .and_then(|components| {
                components.iter().find(|c| {
                    c.get("name").and_then(Value::as_str) == Some(name.as_str())
                        && c.get("providerType").and_then(Value::as_str)
                            == Some(cr.spec.provider_type.as_str())
                })
            })
            .cloned())
    }

    async fn create(
        session: &Session,
        resolved: &ComponentResolved,
        desired: &Value,
        _cr: &Component,
    ) -> Result<(), Error> {
        session
            .post(&admin_path(&resolved.routing.realm, "/components"), desired)
            .await
    }

    async fn update(
        session: &Session,
        resolved: &ComponentResolved,
        handle: &str,
        body: &Value,
    ) -> Result<(), Error> {
        session
            .put(
                &admin_path(&resolved.routing.realm, &format!("/components/{handle}")),
                body,
            )
            .await
    }

    async fn delete(
        session: &Session,
        resolved: &ComponentResolved,
        handle: &str,
    ) -> Result<(), Error> {
        session
            .delete(&admin_path(
                &resolved.routing.realm,
                &format!("/components/{handle}"),
            ))
            .await
    }

    fn resource_path(resolved: &ComponentResolved, handle: &str) -> Option<String> {
        Some(format!(
            "/realms/{}/components/{}",
            resolved.routing.realm, handle
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desired_component_injects_identity_fields() {
        let desired = desired_component(
            "rsa-key",
            "org.keycloak.keys.KeyProvider",
            None,
            &json!({"providerId": "rsa-generated", "config": {"priority": ["100"]}}),
        )
        .unwrap();
        assert_eq!(desired["name"], "rsa-key");
        assert_eq!(desired["providerType"], "org.keycloak.keys.KeyProvider");
        assert!(!desired.contains_key("parentId"));
    }

    #[test]
    fn nested_components_carry_their_parent() {
        let desired =
            desired_component("ldap-mapper", "org.keycloak.storage.ldap.mappers.LDAPStorageMapper",
                Some("c0ffee"), &json!({}))
            .unwrap();
        assert_eq!(desired["parentId"], "c0ffee");
    }
}

crate::kernel::delegate_object_adapter!(ComponentAdapter);
