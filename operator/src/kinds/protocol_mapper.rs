use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::{Map, Value, json};

use kopper_types::{MapperParent, ProtocolMapper};

use crate::kernel::{Context, ObjectAdapter};
use crate::keycloak::{Session, admin_path};
use crate::resolve::{self, Routing};
use crate::util::Error;

pub struct MapperResolved {
    pub routing: Routing,
    /// Realm-relative prefix of the parent, `/clients/{uuid}` or
    /// `/client-scopes/{id}`.
    pub parent_base: String,
}

pub fn effective_mapper_name(cr: &ProtocolMapper) -> String {
    cr.spec.name.clone().unwrap_or_else(|| cr.name_any())
}

fn desired_mapper(name: &str, definition: &Value) -> Result<Map<String, Value>, Error> {
    let mut desired = crate::diff::definition_object(definition)?;
    desired.insert("name".to_string(), json!(name));
    desired.entry("protocol").or_insert(json!("openid-connect"));
    Ok(desired)
}

async fn find_mapper_by_name(
    session: &Session,
    realm: &str,
    parent_base: &str,
    name: &str,
) -> Result<Option<Value>, Error> {
    let models = session
        .get(&admin_path(realm, &format!("{parent_base}/protocol-mappers/models")))
        .await?;
    Ok(models
        .as_array()
        .and_then(|list| {
            list.iter()
                .find(|m| m.get("name").and_then(Value::as_str) == Some(name))
        })
        .cloned())
}

pub struct ProtocolMapperAdapter;

#[async_trait]
impl ObjectAdapter for ProtocolMapperAdapter {
    type Cr = ProtocolMapper;
    type Resolved = MapperResolved;

    async fn resolve(ctx: &Context, cr: &ProtocolMapper) -> Result<MapperResolved, Error> {
        let namespace = cr.namespace();
        match cr
            .spec
            .parent()
            .map_err(|e| Error::InvalidSpec(e.to_string()))?
        {
            MapperParent::Client(client_ref) => {
                let resolved =
                    resolve::resolve_client(&ctx.client, client_ref, namespace.as_deref()).await?;
                Ok(MapperResolved {
                    routing: resolved.routing,
                    parent_base: format!("/clients/{}", resolved.uuid),
                })
            }
            MapperParent::ClientScope(scope_ref) => {
                let (routing, scope_id) =
                    resolve::resolve_client_scope(&ctx.client, scope_ref, namespace.as_deref())
                        .await?;
                Ok(MapperResolved {
                    routing,
                    parent_base: format!("/client-scopes/{scope_id}"),
                })
            }
        }
    }

    fn routing(resolved: &MapperResolved) -> &Routing {
        &resolved.routing
    }

    fn desired(_resolved: &MapperResolved, cr: &ProtocolMapper) -> Result<Map<String, Value>, Error> {
        desired_mapper(&effective_mapper_name(cr), &cr.spec.definition)
    }

    async fn find_by_handle(
        session: &Session,
        resolved: &MapperResolved,
        handle: &str,
    ) -> Result<Option<Value>, Error> {
        session
            .get_opt(&admin_path(
                &resolved.routing.realm,
                &format!("{}/protocol-mappers/models/{handle}", resolved.parent_base),
            ))
            .await
    }

    async fn find_by_key(
        session: &Session,
        resolved: &MapperResolved,
        cr: &ProtocolMapper,
    ) -> Result<Option<Value>, Error> {
        find_mapper_by_name(
            session,
            &resolved.routing.realm,
            &resolved.parent_base,
            &effective_mapper_name(cr),
        )
        .await
    }

    async fn create(
        session: &Session,
        resolved: &MapperResolved,
        desired: &Value,
        _cr: &ProtocolMapper,
    ) -> Result<(), Error> {
        session
            .post(
                &admin_path(
                    &resolved.routing.realm,
                    &format!("{}/protocol-mappers/models", resolved.parent_base),
                ),
                desired,
            )
            .await
    }

    async fn update(
        session: &Session,
        resolved: &MapperResolved,
        handle: &str,
        body: &Value,
    ) -> Result<(), Error> {
        session
            .put(
                &admin_path(
                    &resolved.routing.realm,
                    &format!("{}/protocol-mappers/models/{handle}", resolved.parent_base),
                ),
                body,
            )
            .await
    }

    async fn delete(
        session: &Session,
        resolved: &MapperResolved,
        handle: &str,
    ) -> Result<(), Error> {
        session
            .delete(&admin_path(
                &resolved.routing.realm,
                &format!("{}/protocol-mappers/models/{handle}", resolved.parent_base),
            ))
            .await
    }

    fn resource_path(resolved: &MapperResolved, handle: &str) -> Option<String> {
        Some(format!(
            "/realms/{}{}/protocol-mappers/models/{}",
            resolved.routing.realm, resolved.parent_base, handle
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kopper_types::ProtocolMapperSpec;

    #[test]
    fn mapper_name_defaults_to_object_name() {
        let cr = ProtocolMapper::new("audience", ProtocolMapperSpec::default());
        assert_eq!(effective_mapper_name(&cr), "audience");
    }

    #[test]
    fn desired_mapper_defaults_protocol() {
        let desired = desired_mapper(
            "audience",
            &json!({
                "protocolMapper": "oidc-audience-mapper",
                "config": {"included.client.audience": "app1"},
            }),
        )
        .unwrap();
        assert_eq!(desired["name"], "audience");
        assert_eq!(desired["protocol"], "openid-connect");
        assert_eq!(desired["protocolMapper"], "oidc-audience-mapper");
    }
}

crate::kernel::delegate_object_adapter!(ProtocolMapperAdapter);
