use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::{Map, Value, json};

use kopper_types::IdentityProvider;

use crate::kernel::{Context, ObjectAdapter};
use crate::keycloak::{Session, admin_path, encode};
use crate::resolve::{self, Routing};
use crate::util::Error;

const IDP_SERVER_KEYS: &[&str] = &["internalId"];

pub fn effective_alias(cr: &IdentityProvider) -> String {
    cr.spec
        .alias
        .clone()
        .or_else(|| {
            cr.spec
                .definition
                .get("alias")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| cr.name_any())
}

fn desired_provider(alias: &str, definition: &Value) -> Result<Map<String, Value>, Error> {
    let mut desired = crate::diff::definition_object(definition)?;
    desired.insert("alias".to_string(), json!(alias));
    desired.entry("enabled").or_insert(json!(true));
    Ok(desired)
}

pub struct IdentityProviderAdapter;

#[async_trait]
impl ObjectAdapter for IdentityProviderAdapter {
    type Cr = IdentityProvider;
    type Resolved = Routing;

    async fn resolve(ctx: &Context, cr: &IdentityProvider) -> Result<Routing, Error> {
        let namespace = cr.namespace();
        resolve::resolve_realm(&ctx.client, &cr.spec.realm, namespace.as_deref()).await
    }

    fn routing(resolved: &Routing) -> &Routing {
        resolved
    }

    fn desired(_resolved: &Routing, cr: &IdentityProvider) -> Result<Map<String, Value>, Error> {
        desired_provider(&effective_alias(cr), &cr.spec.definition)
    }

    async fn find_by_handle(
        session: &Session,
        resolved: &Routing,
        handle: &str,
    ) -> Result<Option<Value>, Error> {
        session
            .get_opt(&admin_path(
                &resolved.realm,
                &format!("/identity-provider/instances/{}", encode(handle)),
            ))
            .await
    }

    async fn find_by_key(
        session: &Session,
        resolved: &Routing,
        cr: &IdentityProvider,
    ) -> Result<Option<Value>, Error> {
        session
            .get_opt(&admin_path(
                &resolved.realm,
                &format!("/identity-provider/instances/{}", encode(&effective_alias(cr))),
            ))
            .await
    }

    async fn create(
        session: &Session,
        resolved: &Routing,
        desired: &Value,
        _cr: &IdentityProvider,
    ) -> Result<(), Error> {
        session
            .post(
                &admin_path(&resolved.realm, "/identity-provider/instances"),
                desired,
            )
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
                &admin_path(
                    &resolved.realm,
                    &format!("/identity-provider/instances/{}", encode(handle)),
                ),
                body,
            )
            .await
    }

    async fn delete(session: &Session, resolved: &Routing, handle: &str) -> Result<(), Error> {
        session
            .delete(&admin_path(
                &resolved.realm,
                &format!("/identity-provider/instances/{}", encode(handle)),
            ))
            .await
    }

    /// Identity providers are addressed by alias, not by internal id.
    fn handle_of(observed: &Value) -> Option<String> {
        observed
            .get("alias")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn server_keys() -> &'static [&'static str] {
        IDP_SERVER_KEYS
    }

    fn resource_path(resolved: &Routing, handle: &str) -> Option<String> {
        Some(format!(
            "/realms/{}/identity-provider/instances/{}",
            resolved.realm, handle
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kopper_types::IdentityProviderSpec;

    #[test]
    fn alias_prefers_spec_then_definition_then_name() {
        let by_name = IdentityProvider::new("corp-oidc", IdentityProviderSpec::default());
        assert_eq!(effective_alias(&by_name), "corp-oidc");

        let by_definition = IdentityProvider::new(
            "corp-oidc",
            IdentityProviderSpec {
                definition: json!({"alias": "corp"}),
                ..IdentityProviderSpec::default()
            },
        );
        assert_eq!(effective_alias(&by_definition), "corp");

        let explicit = IdentityProvider::new(
            "corp-oidc",
            IdentityProviderSpec {
                alias: Some("upstream".to_string()),
                definition: json!({"alias": "corp"}),
                ..IdentityProviderSpec::default()
            },
        );
        assert_eq!(effective_alias(&explicit), "upstream");
    }

    #[test]
    fn internal_id_never_drifts() {
        let desired = desired_provider("corp", &json!({"providerId": "oidc"})).unwrap();
        let observed = json!({
            "alias": "corp", "providerId": "oidc", "enabled": true,
            "internalId": "4cc2",
        });
        assert_eq!(
            crate::diff::plan_update(&desired, &observed, IDP_SERVER_KEYS),
            None
        );
    }
}

crate::kernel::delegate_object_adapter!(IdentityProviderAdapter);
