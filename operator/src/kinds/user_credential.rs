use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    Api, Resource, ResourceExt,
    runtime::{Controller, controller, watcher},
};

use kopper_types::{UserCredential, UserCredentialStatus};

use crate::kernel::{self, Adapter, Context, SyncAction, SyncOutcome};
use crate::kinds::user::reset_password;
use crate::resolve;
use crate::secrets;
use crate::util::{self, Error};

pub struct UserCredentialAdapter;

#[async_trait]
impl Adapter for UserCredentialAdapter {
    type Cr = UserCredential;

    /// Reads the password from the referenced Secret (materializing it when
    /// `create` is set) and pushes a credential reset whenever the value
    /// hash moved. The hash guard keeps reconciles from resetting sessions
    /// on every pass.
    async fn sync(
        ctx: &Context,
        cr: &UserCredential,
    ) -> Result<SyncOutcome<UserCredentialStatus>, Error> {
        let namespace = cr.namespace().ok_or_else(|| {
            Error::InvalidSpec("UserCredential is missing metadata.namespace".to_string())
        })?;
        let (routing, user_id) =
            resolve::resolve_user(&ctx.client, &cr.spec.user_ref, Some(&namespace)).await?;
        let session = ctx.pool.acquire(&ctx.client, &routing.instance).await?;

        let secret_spec = &cr.spec.secret;
        let existing = secrets::read_secret_key(
            &ctx.client,
            &namespace,
            &secret_spec.name,
            &secret_spec.password_key,
        )
        .await?;
        let password = match existing {
            Some(password) => password,
            None if secret_spec.create => {
                let password = secrets::generate_password();
                let owner = cr.controller_owner_ref(&()).ok_or_else(|| {
                    Error::InvalidSpec("UserCredential is missing metadata for ownership".to_string())
                })?;
                secrets::ensure_owned_secret(
                    &ctx.client,
                    &namespace,
                    &secret_spec.name,
                    owner,
                    BTreeMap::from([(secret_spec.password_key.clone(), password.clone())]),
                )
                .await?;
                password
            }
            None => {
                return Err(Error::Secret(format!(
                    "credential secret '{}/{}' not found and create=false",
                    namespace, secret_spec.name
                )));
            }
        };

        let hash = util::hash_secret_value(&password);
        let already_pushed = cr
            .status
            .as_ref()
            .and_then(|s| s.password_hash.as_deref())
            .is_some_and(|recorded| recorded == hash);
        let action = if already_pushed {
            SyncAction::Unchanged
        } else {
            reset_password(
                &session,
                &routing.realm,
                &user_id,
                &password,
                cr.spec.temporary,
            )
            .await?;
            if cr.status.as_ref().and_then(|s| s.password_hash.as_ref()).is_none() {
                SyncAction::Created
            } else {
                SyncAction::Updated
            }
        };

        let mut outcome = SyncOutcome::new(action);
        outcome.decorate = Some(Box::new(move |status: &mut UserCredentialStatus| {
            status.password_hash = Some(hash);
        }));
        Ok(outcome)
    }

    /// Passwords cannot be unset through a credential reset; deleting the
    /// resource only stops managing them. Materialized Secrets are garbage
    /// collected through their ownerReference.
    async fn finalize(_ctx: &Context, _cr: &UserCredential) -> Result<(), Error> {
        Ok(())
    }
}

/// UserCredential controller; owns materialized credential Secrets so an
/// out-of-band Secret edit triggers a fresh push.
pub async fn run(ctx: Arc<Context>) {
    let api: Api<UserCredential> = match ctx.watch_namespace.as_deref() {
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
            kernel::reconcile::<UserCredentialAdapter>,
            kernel::on_error::<UserCredentialAdapter>,
            ctx,
        )
        .for_each(|_| async {})
        .await;
}
