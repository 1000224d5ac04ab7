use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    Api, ResourceExt,
    runtime::{Controller, controller, reflector::ObjectRef, watcher},
};

use kopper_types::{ClusterInstance, Instance, InstanceStatus};

use crate::kernel::{self, Adapter, Context, SyncAction, SyncOutcome};
use crate::resolve;
use crate::util::Error;

/// Instances have no Keycloak object of their own; a reconcile proves that
/// the admin credentials work and records the server version from the
/// health probe.
pub struct InstanceAdapter;

#[async_trait]
impl Adapter for InstanceAdapter {
    type Cr = Instance;

    async fn sync(ctx: &Context, cr: &Instance) -> Result<SyncOutcome<InstanceStatus>, Error> {
        let identity = resolve::identity_from_instance(cr)?;
        let session = ctx.pool.acquire(&ctx.client, &identity).await?;
        let version = session.server_info().await?;
        let mut outcome = SyncOutcome::new(SyncAction::Unchanged);
        outcome.decorate = Some(Box::new(move |status: &mut InstanceStatus| {
            status.version = Some(version);
        }));
        Ok(outcome)
    }

    async fn finalize(ctx: &Context, cr: &Instance) -> Result<(), Error> {
        if let Ok(identity) = resolve::identity_from_instance(cr) {
            ctx.pool.evict(&identity.base_url).await;
        }
        Ok(())
    }
}

pub struct ClusterInstanceAdapter;

#[async_trait]
impl Adapter for ClusterInstanceAdapter {
    type Cr = ClusterInstance;

    async fn sync(
        ctx: &Context,
        cr: &ClusterInstance,
    ) -> Result<SyncOutcome<InstanceStatus>, Error> {
        let identity = resolve::identity_from_cluster_instance(cr)?;
        let session = ctx.pool.acquire(&ctx.client, &identity).await?;
        let version = session.server_info().await?;
        let mut outcome = SyncOutcome::new(SyncAction::Unchanged);
        outcome.decorate = Some(Box::new(move |status: &mut InstanceStatus| {
            status.version = Some(version);
        }));
        Ok(outcome)
    }

    async fn finalize(ctx: &Context, cr: &ClusterInstance) -> Result<(), Error> {
        if let Ok(identity) = resolve::identity_from_cluster_instance(cr) {
            ctx.pool.evict(&identity.base_url).await;
        }
        Ok(())
    }
}

fn secrets_api(ctx: &Context) -> Api<Secret> {
    match ctx.watch_namespace.as_deref() {
        Some(ns) => Api::namespaced(ctx.client.clone(), ns),
        None => Api::all(ctx.client.clone()),
    }
}

/// Instance controller. Besides the primary watch it follows Secrets, so
/// rotating admin credentials re-reconciles the Instances depending on them
/// (the session pool keys sessions on the Secret's resourceVersion).
pub async fn run(ctx: Arc<Context>) {
    let api: Api<Instance> = match ctx.watch_namespace.as_deref() {
        Some(ns) => Api::namespaced(ctx.client.clone(), ns),
        None => Api::all(ctx.client.clone()),
    };
    let pool = ctx.pool.clone();
    Controller::new(api, watcher::Config::default())
        .with_config(controller::Config::default().concurrency(ctx.concurrency))
        .watches(
            secrets_api(&ctx),
            watcher::Config::default(),
            move |secret: Secret| {
                let namespace = secret.namespace().unwrap_or_default();
                let name = secret.name_any();
                pool.dependents_of(&namespace, &name)
                    .into_iter()
                    .filter_map(|(cr_ns, cr_name)| {
                        cr_ns.map(|ns| ObjectRef::<Instance>::new(&cr_name).within(&ns))
                    })
            },
        )
        .run(
            kernel::reconcile::<InstanceAdapter>,
            kernel::on_error::<InstanceAdapter>,
            ctx,
        )
        .for_each(|_| async {})
        .await;
}

pub async fn run_cluster(ctx: Arc<Context>) {
    let api: Api<ClusterInstance> = Api::all(ctx.client.clone());
    let pool = ctx.pool.clone();
    Controller::new(api, watcher::Config::default())
        .with_config(controller::Config::default().concurrency(ctx.concurrency))
        .watches(
            secrets_api(&ctx),
            watcher::Config::default(),
            move |secret: Secret| {
                let namespace = secret.namespace().unwrap_or_default();
                let name = secret.name_any();
                pool.dependents_of(&namespace, &name)
                    .into_iter()
                    .filter(|(cr_ns, _)| cr_ns.is_none())
                    .map(|(_, cr_name)| ObjectRef::<ClusterInstance>::new(&cr_name))
                    .collect::<Vec<_>>()
            },
        )
        .run(
            kernel::reconcile::<ClusterInstanceAdapter>,
            kernel::on_error::<ClusterInstanceAdapter>,
            ctx,
        )
        .for_each(|_| async {})
        .await;
}
