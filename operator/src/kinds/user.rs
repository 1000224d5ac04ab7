use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    Api, Resource, ResourceExt,
    runtime::{Controller, controller, watcher},
};
use serde_json::{Map, Value, json};

use kopper_types::{User, UserOwner, UserStatus};

use crate::kernel::{self, Context, ObjectAdapter, SyncAction};
use crate::keycloak::{Session, admin_path, encode};
use crate::resolve::{self, Routing};
use crate::secrets;
use crate::util::Error;

const USER_SERVER_KEYS: &[&str] = &["userProfileMetadata", "totp", "federationLink"];

pub struct UserResolved {
    pub routing: Routing,
    /// UUID of the owning client when this resource manages a
    /// service-account user.
    pub service_account_client: Option<String>,
}

pub fn effective_username(cr: &User) -> String {
    cr.spec
        .definition
        .get("username")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| cr.name_any())
}

fn desired_user(username: &str, definition: &Value) -> Result<Map<String, Value>, Error> {
    let mut desired = crate::diff::definition_object(definition)?;
    desired.insert("username".to_string(), json!(username));
    desired.entry("enabled").or_insert(json!(true));
    Ok(desired)
}

/// Finds a realm user by exact username. Keycloak lowercases usernames on
/// ingest, so the match is case-insensitive.
pub async fn find_user_by_username(
    session: &Session,
    realm: &str,
    username: &str,
) -> Result<Option<Value>, Error> {
    let path = admin_path(
        realm,
        &format!("/users?username={}&exact=true", encode(username)),
    );
    let found = session.get(&path).await?;
    Ok(found
        .as_array()
        .and_then(|users| {
            users.iter().find(|u| {
                u.get("username")
                    .and_then(Value::as_str)
                    .is_some_and(|candidate| candidate.eq_ignore_ascii_case(username))
            })
        })
        .cloned())
}

/// Issues a credential reset for the user.
pub async fn reset_password(
    session: &Session,
    realm: &str,
    user_id: &str,
    value: &str,
    temporary: bool,
) -> Result<(), Error> {
    session
        .put(
            &admin_path(realm, &format!("/users/{user_id}/reset-password")),
            &json!({"type": "password", "value": value, "temporary": temporary}),
        )
        .await
}

/// First-create credential flows: the one-shot initial password, and the
/// user-secret materialization with an optional generated password. Neither
/// is re-pushed on later reconciles.
async fn sync_user_credentials(
    ctx: &Context,
    session: &Session,
    resolved: &UserResolved,
    cr: &User,
    observed: &Value,
    action: SyncAction,
) -> Result<(), Error> {
    let user_id = observed
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Keycloak {
            status: 200,
            text: "user representation carries no id".to_string(),
        })?;

    if action == SyncAction::Created
        && let Some(initial) = &cr.spec.initial_password
    {
        reset_password(
            session,
            &resolved.routing.realm,
            user_id,
            &initial.value,
            initial.temporary,
        )
        .await?;
    }

    let Some(user_secret) = &cr.spec.user_secret else {
        return Ok(());
    };
    let namespace = cr
        .namespace()
        .ok_or_else(|| Error::InvalidSpec("User is missing metadata.namespace".to_string()))?;
    let existing = secrets::read_secret_key(
        &ctx.client,
        &namespace,
        &user_secret.secret_name,
        &user_secret.password_key,
    )
    .await?;
    match existing {
        // The secret already carries a credential; it was pushed when it was
        // materialized.
        Some(_) => Ok(()),
        None if user_secret.generate_password => {
            let password = secrets::generate_password();
            let owner = cr.controller_owner_ref(&()).ok_or_else(|| {
                Error::InvalidSpec("User is missing metadata for ownership".to_string())
            })?;
            secrets::ensure_owned_secret(
                &ctx.client,
                &namespace,
                &user_secret.secret_name,
                owner,
                BTreeMap::from([
                    (user_secret.username_key.clone(), effective_username(cr)),
                    (user_secret.password_key.clone(), password.clone()),
                ]),
            )
            .await?;
            reset_password(session, &resolved.routing.realm, user_id, &password, false).await
        }
        None => Err(Error::Secret(format!(
            "user secret '{}/{}' not found and generatePassword=false",
            namespace, user_secret.secret_name
        ))),
    }
}

pub struct UserAdapter;

#[async_trait]
impl ObjectAdapter for UserAdapter {
    type Cr = User;
    type Resolved = UserResolved;

    async fn resolve(ctx: &Context, cr: &User) -> Result<UserResolved, Error> {
        let namespace = cr.namespace();
        match cr
            .spec
            .owner()
            .map_err(|e| Error::InvalidSpec(e.to_string()))?
        {
            UserOwner::Realm(selector) => {
                let routing =
                    resolve::resolve_realm(&ctx.client, selector, namespace.as_deref()).await?;
                Ok(UserResolved {
                    routing,
                    service_account_client: None,
                })
            }
            UserOwner::ServiceAccount(client_ref) => {
                let resolved =
                    resolve::resolve_client(&ctx.client, client_ref, namespace.as_deref()).await?;
                Ok(UserResolved {
                    routing: resolved.routing,
                    service_account_client: Some(resolved.uuid),
                })
            }
        }
    }

    fn routing(resolved: &UserResolved) -> &Routing {
        &resolved.routing
    }

    fn desired(resolved: &UserResolved, cr: &User) -> Result<Map<String, Value>, Error> {
        let mut desired = desired_user(&effective_username(cr), &cr.spec.definition)?;
        // The hidden service-account user keeps its Keycloak-assigned
        // username; only the declared extras apply.
        if resolved.service_account_client.is_some() {
            desired.remove("username");
        }
        Ok(desired)
    }

    async fn find_by_handle(
        session: &Session,
        resolved: &UserResolved,
        handle: &str,
    ) -> Result<Option<Value>, Error> {
        session
            .get_opt(&admin_path(&resolved.routing.realm, &format!("/users/{handle}")))
            .await
    }

    async fn find_by_key(
        session: &Session,
        resolved: &UserResolved,
        cr: &User,
    ) -> Result<Option<Value>, Error> {
        match &resolved.service_account_client {
            Some(client_uuid) => {
                session
                    .get_opt(&admin_path(
                        &resolved.routing.realm,
                        &format!("/clients/{client_uuid}/service-account-user"),
                    ))
                    .await
            }
            None => {
                find_user_by_username(session, &resolved.routing.realm, &effective_username(cr))
                    .await
            }
        }
    }

    async fn create(
        session: &Session,
        resolved: &UserResolved,
        desired: &Value,
        _cr: &User,
    ) -> Result<(), Error> {
        if resolved.service_account_client.is_some() {
            // The service-account user is created by Keycloak with the
            // client; reaching this point means the client does not expose
            // one.
            return Err(Error::InvalidSpec(
                "referenced client has no service-account user (serviceAccountsEnabled=false?)"
                    .to_string(),
            ));
        }
        session
            .post(&admin_path(&resolved.routing.realm, "/users"), desired)
            .await
    }

    async fn update(
        session: &Session,
        resolved: &UserResolved,
        handle: &str,
        body: &Value,
    ) -> Result<(), Error> {
        session
            .put(
                &admin_path(&resolved.routing.realm, &format!("/users/{handle}")),
                body,
            )
            .await
    }

    async fn delete(
        session: &Session,
        resolved: &UserResolved,
        handle: &str,
    ) -> Result<(), Error> {
        // The hidden user belongs to the client; deleting the resource must
        // not break the client's service account.
        if resolved.service_account_client.is_some() {
            return Ok(());
        }
        session
            .delete(&admin_path(&resolved.routing.realm, &format!("/users/{handle}")))
            .await
    }

    fn server_keys() -> &'static [&'static str] {
        USER_SERVER_KEYS
    }

    fn resource_path(resolved: &UserResolved, handle: &str) -> Option<String> {
        Some(format!("/realms/{}/users/{}", resolved.routing.realm, handle))
    }

    async fn post_sync(
        ctx: &Context,
        session: &Session,
        resolved: &UserResolved,
        cr: &User,
        observed: &Value,
        action: SyncAction,
    ) -> Result<Option<Box<dyn FnOnce(&mut UserStatus) + Send>>, Error> {
        sync_user_credentials(ctx, session, resolved, cr, observed, action).await?;
        let is_service_account = resolved.service_account_client.is_some();
        Ok(Some(Box::new(move |status: &mut UserStatus| {
            status.is_service_account = is_service_account;
        })))
    }
}

/// User controller; owns materialized user Secrets.
pub async fn run(ctx: Arc<Context>) {
    let api: Api<User> = match ctx.watch_namespace.as_deref() {
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
            kernel::reconcile::<UserAdapter>,
            kernel::on_error::<UserAdapter>,
            ctx,
        )
        .for_each(|_| async {})
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use kopper_types::UserSpec;

    #[test]
    fn username_comes_from_definition_then_name() {
        let from_name = User::new("jdoe", UserSpec::default());
        assert_eq!(effective_username(&from_name), "jdoe");
        let from_definition = User::new(
            "jdoe",
            UserSpec {
                definition: json!({"username": "john.doe"}),
                ..UserSpec::default()
            },
        );
        assert_eq!(effective_username(&from_definition), "john.doe");
    }

    #[test]
    fn desired_user_defaults_enabled() {
        let desired = desired_user("jdoe", &json!({"email": "j@example.com"})).unwrap();
        assert_eq!(desired["username"], "jdoe");
        assert_eq!(desired["enabled"], true);
        assert_eq!(desired["email"], "j@example.com");
    }
}

crate::kernel::delegate_object_adapter!(UserAdapter);
