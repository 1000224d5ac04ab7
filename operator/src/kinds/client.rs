use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    Api, Resource, ResourceExt,
    runtime::{Controller, controller, watcher},
};
use reqwest::Method;
use serde_json::{Map, Value, json};

use kopper_types::{Client, ClientSecretRef, ClientStatus};

use crate::kernel::{self, Context, ObjectAdapter, SyncAction};
use crate::keycloak::{Session, admin_path, encode};
use crate::resolve::{self, Routing};
use crate::secrets;
use crate::util::Error;

/// Values Keycloak manages on the client representation. The secret is
/// synchronized through the dedicated endpoint, never through the diff.
const CLIENT_SERVER_KEYS: &[&str] = &["secret", "registrationAccessToken"];

pub fn effective_client_id(cr: &Client) -> String {
    cr.spec.client_id.clone().unwrap_or_else(|| cr.name_any())
}

fn desired_client(client_id: &str, definition: &Value) -> Result<Map<String, Value>, Error> {
    let mut desired = crate::diff::definition_object(definition)?;
    desired.insert("clientId".to_string(), json!(client_id));
    desired.entry("enabled").or_insert(json!(true));
    Ok(desired)
}

/// Finds a client by its clientId. The query is an exact filter.
pub async fn find_client_by_client_id(
    session: &Session,
    realm: &str,
    client_id: &str,
) -> Result<Option<Value>, Error> {
    let path = admin_path(realm, &format!("/clients?clientId={}", encode(client_id)));
    let found = session.get(&path).await?;
    Ok(found
        .as_array()
        .and_then(|clients| {
            clients
                .iter()
                .find(|c| c.get("clientId").and_then(Value::as_str) == Some(client_id))
        })
        .cloned())
}

/// The client secret Keycloak currently holds, regenerating when the client
/// has none yet.
async fn effective_keycloak_secret(
    session: &Session,
    realm: &str,
    uuid: &str,
) -> Result<String, Error> {
    let path = admin_path(realm, &format!("/clients/{uuid}/client-secret"));
    let current = session.get(&path).await?;
    if let Some(value) = current.get("value").and_then(Value::as_str) {
        return Ok(value.to_string());
    }
    let regenerated = session.request(Method::POST, &path, None).await?;
    regenerated
        .as_ref()
        .and_then(|v| v.get("value"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Keycloak {
            status: 200,
            text: "client-secret endpoint returned no value".to_string(),
        })
}

/// Synchronizes the client secret with the referenced cluster Secret.
///
/// With `create` set and the Secret absent, the effective Keycloak secret is
/// materialized into a new owned Secret. With the Secret present, its value
/// is authoritative and pushed to Keycloak on mismatch.
async fn sync_client_secret(
    ctx: &Context,
    session: &Session,
    routing: &Routing,
    cr: &Client,
    observed: &Value,
    secret_ref: &ClientSecretRef,
) -> Result<(), Error> {
    let namespace = cr
        .namespace()
        .ok_or_else(|| Error::InvalidSpec("Client is missing metadata.namespace".to_string()))?;
    let uuid = observed
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Keycloak {
            status: 200,
            text: "client representation carries no id".to_string(),
        })?;
    let client_id = effective_client_id(cr);
    let keycloak_secret = effective_keycloak_secret(session, &routing.realm, uuid).await?;

    let cluster_value = secrets::read_secret_key(
        &ctx.client,
        &namespace,
        &secret_ref.name,
        &secret_ref.client_secret_key,
    )
    .await?;
    match cluster_value {
        Some(value) => {
            if value != keycloak_secret {
                let mut body = observed.clone();
                body["secret"] = json!(value);
                session
                    .put(&admin_path(&routing.realm, &format!("/clients/{uuid}")), &body)
                    .await?;
            }
            Ok(())
        }
        None if secret_ref.create => {
            let owner = cr.controller_owner_ref(&()).ok_or_else(|| {
                Error::InvalidSpec("Client is missing metadata for ownership".to_string())
            })?;
            secrets::ensure_owned_secret(
                &ctx.client,
                &namespace,
                &secret_ref.name,
                owner,
                BTreeMap::from([
                    (secret_ref.client_id_key.clone(), client_id),
                    (secret_ref.client_secret_key.clone(), keycloak_secret),
                ]),
            )
            .await
        }
        None => Err(Error::Secret(format!(
            "client secret '{}/{}' not found and create=false",
            namespace, secret_ref.name
        ))),
    }
}

pub struct ClientAdapter;

#[async_trait]
impl ObjectAdapter for ClientAdapter {
    type Cr = Client;
    type Resolved = Routing;

    async fn resolve(ctx: &Context, cr: &Client) -> Result<Routing, Error> {
        let namespace = cr.namespace();
        resolve::resolve_realm(&ctx.client, &cr.spec.realm, namespace.as_deref()).await
    }

    fn routing(resolved: &Routing) -> &Routing {
        resolved
    }

    fn desired(_resolved: &Routing, cr: &Client) -> Result<Map<String, Value>, Error> {
        desired_client(&effective_client_id(cr), &cr.spec.definition)
    }

    async fn find_by_handle(
        session: &Session,
        resolved: &Routing,
        handle: &str,
    ) -> Result<Option<Value>, Error> {
        session
            .get_opt(&admin_path(&resolved.realm, &format!("/clients/{handle}")))
            .await
    }

    async fn find_by_key(
        session: &Session,
        resolved: &Routing,
        cr: &Client,
    ) -> Result<Option<Value>, Error> {
        find_client_by_client_id(session, &resolved.realm, &effective_client_id(cr)).await
    }

    async fn create(
        session: &Session,
        resolved: &Routing,
        desired: &Value,
        _cr: &Client,
    ) -> Result<(), Error> {
        session
            .post(&admin_path(&resolved.realm, "/clients"), desired)
            .await
    }

    async fn update(
        session: &Session,
        resolved: &Routing,
        handle: &str,
        body: &Value,
    ) -> Result<(), Error> {
        session
            .put(&admin_path(&resolved.realm, &format!("/clients/{handle}")), body)
            .await
    }

    async fn delete(session: &Session, resolved: &Routing, handle: &str) -> Result<(), Error> {
        session
            .delete(&admin_path(&resolved.realm, &format!("/clients/{handle}")))
            .await
    }

    fn server_keys() -> &'static [&'static str] {
        CLIENT_SERVER_KEYS
    }

    fn resource_path(resolved: &Routing, handle: &str) -> Option<String> {
        Some(format!("/realms/{}/clients/{}", resolved.realm, handle))
    }

    async fn post_sync(
        ctx: &Context,
        session: &Session,
        resolved: &Routing,
        cr: &Client,
        observed: &Value,
        _action: SyncAction,
    ) -> Result<Option<Box<dyn FnOnce(&mut ClientStatus) + Send>>, Error> {
        if let Some(secret_ref) = &cr.spec.client_secret_ref {
            sync_client_secret(ctx, session, resolved, cr, observed, secret_ref).await?;
        }
        Ok(None)
    }
}

/// Client controller; owns the Secrets it materializes, so external edits to
/// a client-secret Secret re-reconcile the owning Client.
pub async fn run(ctx: Arc<Context>) {
    let api: Api<Client> = match ctx.watch_namespace.as_deref() {
        Some(ns) => Api::namespaced(ctx.client.clone(), ns),
        None => Api::all(ctx.client.clone()),
    };
    let secrets: Api<Secret> = match ctx.watch_namespace.as_deref() {
        Some(ns) => Api::namespaced(ctx.client.clone(), ns),
        None => Api::all(ctx.client.clone()),
    };
    Controller::new(api, watcher::Config::default())
        .owns(secrets, watcher::Config::default())
        .with_config(controller::Config::default().concurrency(ctx.concurrency))
        .run(
            kernel::reconcile::<ClientAdapter>,
            kernel::on_error::<ClientAdapter>,
            ctx,
        )
        .for_each(|_| async {})
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use kopper_types::ClientSpec;

    #[test]
    fn client_id_defaults_to_object_name() {
        let cr = Client::new("app1", ClientSpec::default());
        assert_eq!(effective_client_id(&cr), "app1");
        let explicit = Client::new(
            "app1",
            ClientSpec {
                client_id: Some("frontend".to_string()),
                ..ClientSpec::default()
            },
        );
        assert_eq!(effective_client_id(&explicit), "frontend");
    }

    #[test]
    fn desired_client_injects_client_id() {
        let desired = desired_client("app1", &json!({"publicClient": false})).unwrap();
        assert_eq!(desired["clientId"], "app1");
        assert_eq!(desired["enabled"], true);
        assert_eq!(desired["publicClient"], false);
    }

    #[test]
    fn secret_and_registration_token_never_drift() {
        let desired = desired_client("app1", &json!({"secret": "declared"})).unwrap();
        let observed = json!({"id": "u", "clientId": "app1", "enabled": true, "secret": "live"});
        assert_eq!(
            crate::diff::plan_update(&desired, &observed, CLIENT_SERVER_KEYS),
            None
        );
    }
}

crate::kernel::delegate_object_adapter!(ClientAdapter);
