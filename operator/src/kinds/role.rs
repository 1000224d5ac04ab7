use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::{Map, Value, json};

use kopper_types::Role;

use crate::kernel::{Context, ObjectAdapter};
use crate::keycloak::{Session, admin_path, encode};
use crate::resolve::{self, Routing};
use crate::util::Error;

pub struct RoleResolved {
    pub routing: Routing,
    /// UUID of the owning client for client-level roles.
    pub client_uuid: Option<String>,
}

pub fn effective_role_name(cr: &Role) -> String {
    cr.spec.name.clone().unwrap_or_else(|| cr.name_any())
}

fn desired_role(name: &str, definition: &Value) -> Result<Map<String, Value>, Error> {
    let mut desired = crate::diff::definition_object(definition)?;
    desired.insert("name".to_string(), json!(name));
    Ok(desired)
}

/// Fetches a role by name within its realm or client scope.
pub async fn find_role_by_name(
    session: &Session,
    realm: &str,
    client_uuid: Option<&str>,
    name: &str,
) -> Result<Option<Value>, Error> {
    let path = match client_uuid {
        Some(uuid) => admin_path(realm, &format!("/clients/{uuid}/roles/{}", encode(name))),
        None => admin_path(realm, &format!("/roles/{}", encode(name))),
    };
    session.get_opt(&path).await
}

pub struct RoleAdapter;

#[async_trait]
impl ObjectAdapter for RoleAdapter {
    type Cr = Role;
    type Resolved = RoleResolved;

    async fn resolve(ctx: &Context, cr: &Role) -> Result<RoleResolved, Error> {
        let namespace = cr.namespace();
        match &cr.spec.client_ref {
            Some(client_ref) => {
                let resolved =
                    resolve::resolve_client(&ctx.client, client_ref, namespace.as_deref()).await?;
                Ok(RoleResolved {
                    routing: resolved.routing,
                    client_uuid: Some(resolved.uuid),
                })
            }
            None => {
                let routing =
                    resolve::resolve_realm(&ctx.client, &cr.spec.realm, namespace.as_deref())
                        .await?;
                Ok(RoleResolved {
                    routing,
                    client_uuid: None,
                })
            }
        }
    }

    fn routing(resolved: &RoleResolved) -> &Routing {
        &resolved.routing
    }

    fn desired(_resolved: &RoleResolved, cr: &Role) -> Result<Map<String, Value>, Error> {
        desired_role(&effective_role_name(cr), &cr.spec.definition)
    }

    async fn find_by_handle(
        session: &Session,
        resolved: &RoleResolved,
        handle: &str,
    ) -> Result<Option<Value>, Error> {
        session
            .get_opt(&admin_path(&resolved.routing.realm, &format!("/roles-by-id/{handle}")))
            .await
    }

    async fn find_by_key(
        session: &Session,
        resolved: &RoleResolved,
        cr: &Role,
    ) -> Result<Option<Value>, Error> {
        find_role_by_name(
            session,
            &resolved.routing.realm,
            resolved.client_uuid.as_deref(),
            &effective_role_name(cr),
        )
        .await
    }

    async fn create(
        session: &Session,
        resolved: &RoleResolved,
        desired: &Value,
        _cr: &Role,
    ) -> Result<(), Error> {
        let path = match &resolved.client_uuid {
            Some(uuid) => admin_path(&resolved.routing.realm, &format!("/clients/{uuid}/roles")),
            None => admin_path(&resolved.routing.realm, "/roles"),
        };
        session.post(&path, desired).await
    }

    async fn update(
        session: &Session,
        resolved: &RoleResolved,
        handle: &str,
        body: &Value,
    ) -> Result<(), Error> {
        session
            .put(
                &admin_path(&resolved.routing.realm, &format!("/roles-by-id/{handle}")),
                body,
            )
            .await
    }

    async fn delete(
        session: &Session,
        resolved: &RoleResolved,
        handle: &str,
    ) -> Result<(), Error> {
        session
            .delete(&admin_path(&resolved.routing.realm, &format!("/roles-by-id/{handle}")))
            .await
    }

    fn resource_path(resolved: &RoleResolved, handle: &str) -> Option<String> {
        Some(format!(
            "/realms/{}/roles-by-id/{}",
            resolved.routing.realm, handle
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kopper_types::RoleSpec;

    #[test]
    fn role_name_defaults_to_object_name() {
        let cr = Role::new("editor", RoleSpec::default());
        assert_eq!(effective_role_name(&cr), "editor");
        let explicit = Role::new(
            "editor",
            RoleSpec {
                name: Some("content-editor".to_string()),
                ..RoleSpec::default()
            },
        );
        assert_eq!(effective_role_name(&explicit), "content-editor");
    }

    #[test]
    fn desired_role_carries_definition_extras() {
        let desired = desired_role("editor", &json!({"description": "can edit"})).unwrap();
        assert_eq!(desired["name"], "editor");
        assert_eq!(desired["description"], "can edit");
    }
}

crate::kernel::delegate_object_adapter!(RoleAdapter);
