use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream::StreamExt;
use k8s_openapi::{
    apimachinery::pkg::apis::meta::v1::{Condition, Time},
    jiff::Timestamp,
};
use kube::{
    Client, Resource, ResourceExt,
    api::{Patch, PatchParams},
    runtime::{
        Controller,
        controller::{self, Action},
        events::{Event, EventType, Recorder, Reporter},
        watcher,
    },
};
use owo_colors::OwoColorize;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tokio::time::Duration;

use kopper_common::annotations;
use kopper_types::ResourcePhase;

use crate::keycloak::{Session, SessionPool};
use crate::resolve::Routing;
use crate::util::{
    self, Error, Retry,
    backoff::RECONCILE_BACKOFF,
    colors::{FG1, FG2},
    patch::{CommonStatus, KopperCr, patch_status},
};

pub mod status;

type ObjectKey = (&'static str, String, String);

/// Context injected with each `reconcile` and `on_error` invocation. Shared
/// by every kind controller in the process.
pub struct Context {
    /// Kubernetes client to make Kubernetes API requests with.
    pub client: Client,
    /// Process-wide pool of authenticated Keycloak admin sessions.
    pub pool: Arc<SessionPool>,
    /// Event sink for user-visible reconcile outcomes.
    pub recorder: Recorder,
    /// Restricts watches to one namespace when set.
    pub watch_namespace: Option<String>,
    /// Worker count per kind controller.
    pub concurrency: u16,

    backoff: Mutex<HashMap<ObjectKey, u32>>,
    last_action: Mutex<HashMap<ObjectKey, (String, Instant)>>,
}

impl Context {
    pub fn new(client: Client, watch_namespace: Option<String>, concurrency: u16) -> Self {
        let reporter = Reporter {
            controller: util::MANAGER_NAME.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Context {
            recorder: Recorder::new(client.clone(), reporter),
            client,
            pool: Arc::new(SessionPool::new()),
            watch_namespace,
            concurrency,
            backoff: Mutex::new(HashMap::new()),
            last_action: Mutex::new(HashMap::new()),
        }
    }

    async fn next_backoff(&self, key: &ObjectKey) -> Duration {
        let mut map = self.backoff.lock().await;
        let attempt = map.entry(key.clone()).or_insert(0);
        let delay = RECONCILE_BACKOFF.delay(*attempt);
        *attempt = attempt.saturating_add(1);
        delay
    }

    async fn reset_backoff(&self, key: &ObjectKey) {
        self.backoff.lock().await.remove(key);
    }

    /// Prints one colored action line per state change, deduplicating the
    /// steady-state chatter of periodic resyncs.
    async fn log_action(&self, key: &ObjectKey, action: &str) {
        let mut map = self.last_action.lock().await;
        let previous = map.insert(
            key.clone(),
            (action.to_string(), Instant::now()),
        );
        if let Some((last, at)) = previous
            && last == action
            && at.elapsed() < Duration::from_secs(300)
        {
            return;
        }
        println!(
            "🔧 {}{}{}{}{}{}{}",
            key.0.color(FG1),
            " ".color(FG1),
            key.1.color(FG2),
            "/".color(FG1),
            key.2.color(FG2),
            " ACTION: ".color(FG1),
            action.color(FG2),
        );
    }
}

/// What one successful sync did on the Keycloak side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Created,
    /// A pre-existing Keycloak object matched the adoption key and was taken
    /// over.
    Adopted,
    Updated,
    Unchanged,
}

impl SyncAction {
    fn to_str(self) -> &'static str {
        match self {
            SyncAction::Created => "Created",
            SyncAction::Adopted => "Adopted",
            SyncAction::Updated => "Updated",
            SyncAction::Unchanged => "Unchanged",
        }
    }
}

/// Result of an adapter sync, fed into the status write-back.
pub struct SyncOutcome<S> {
    pub action: SyncAction,
    pub handle: Option<String>,
    pub resource_path: Option<String>,
    /// Kind-specific status fields (version, service-account flag, ...).
    pub decorate: Option<Box<dyn FnOnce(&mut S) + Send>>,
}

impl<S> SyncOutcome<S> {
    pub fn new(action: SyncAction) -> Self {
        SyncOutcome {
            action,
            handle: None,
            resource_path: None,
            decorate: None,
        }
    }
}

pub type CrStatus<A> = <<A as Adapter>::Cr as KopperCr>::Status;

/// One kind's reconciliation behavior between session acquisition and status
/// write-back. Most kinds implement [`ObjectAdapter`] instead and inherit
/// the observe → diff → apply protocol.
#[async_trait]
pub trait Adapter: Send + Sync + Sized + 'static {
    type Cr: KopperCr;

    async fn sync(ctx: &Context, cr: &Self::Cr) -> Result<SyncOutcome<CrStatus<Self>>, Error>;

    /// Deletes the Keycloak counterpart; 404 counts as success.
    async fn finalize(ctx: &Context, cr: &Self::Cr) -> Result<(), Error>;
}

/// The uniform protocol for kinds that map onto one Keycloak object:
/// observe by handle, fall back to the adoption key, create or minimally
/// update, then run kind-specific side effects.
#[async_trait]
pub trait ObjectAdapter: Send + Sync + Sized + 'static {
    type Cr: KopperCr;
    /// Resolution result; usually [`Routing`], or a wrapper when the kind
    /// needs parent handles beyond the realm.
    type Resolved: Send + Sync;

    async fn resolve(ctx: &Context, cr: &Self::Cr) -> Result<Self::Resolved, Error>;

    fn routing(resolved: &Self::Resolved) -> &Routing;

    /// Desired Keycloak representation derived from the spec.
    fn desired(resolved: &Self::Resolved, cr: &Self::Cr) -> Result<Map<String, Value>, Error>;

    /// GET by the recorded handle; `None` falls through to the adoption key.
    async fn find_by_handle(
        session: &Session,
        resolved: &Self::Resolved,
        handle: &str,
    ) -> Result<Option<Value>, Error>;

    /// Adoption lookup by the kind's natural key.
    async fn find_by_key(
        session: &Session,
        resolved: &Self::Resolved,
        cr: &Self::Cr,
    ) -> Result<Option<Value>, Error>;

    async fn create(
        session: &Session,
        resolved: &Self::Resolved,
        desired: &Value,
        cr: &Self::Cr,
    ) -> Result<(), Error>;

    async fn update(
        session: &Session,
        resolved: &Self::Resolved,
        handle: &str,
        body: &Value,
    ) -> Result<(), Error>;

    async fn delete(
        session: &Session,
        resolved: &Self::Resolved,
        handle: &str,
    ) -> Result<(), Error>;

    /// The Keycloak-side handle inside an observed representation.
    fn handle_of(observed: &Value) -> Option<String> {
        observed
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Kind-specific keys excluded from drift detection.
    fn server_keys() -> &'static [&'static str] {
        &[]
    }

    fn resource_path(resolved: &Self::Resolved, handle: &str) -> Option<String>;

    /// Side effects after convergence (secret materialization, credential
    /// pushes). May return a status decorator.
    #[allow(clippy::type_complexity)]
    async fn post_sync(
        _ctx: &Context,
        _session: &Session,
        _resolved: &Self::Resolved,
        _cr: &Self::Cr,
        _observed: &Value,
        _action: SyncAction,
    ) -> Result<Option<Box<dyn FnOnce(&mut <Self::Cr as KopperCr>::Status) + Send>>, Error> {
        Ok(None)
    }
}

/// Implements [`Adapter`] for an [`ObjectAdapter`] by delegating to
/// [`object_sync`] and [`object_finalize`].
macro_rules! delegate_object_adapter {
    ($adapter:ty) => {
        #[async_trait::async_trait]
        impl crate::kernel::Adapter for $adapter {
            type Cr = <$adapter as crate::kernel::ObjectAdapter>::Cr;

            async fn sync(
                ctx: &crate::kernel::Context,
                cr: &Self::Cr,
            ) -> Result<
                crate::kernel::SyncOutcome<
                    <<$adapter as crate::kernel::ObjectAdapter>::Cr as crate::util::patch::KopperCr>::Status,
                >,
                crate::util::Error,
            > {
                crate::kernel::object_sync::<$adapter>(ctx, cr).await
            }

            async fn finalize(
                ctx: &crate::kernel::Context,
                cr: &Self::Cr,
            ) -> Result<(), crate::util::Error> {
                crate::kernel::object_finalize::<$adapter>(ctx, cr).await
            }
        }
    };
}
pub(crate) use delegate_object_adapter;

/// The observe → diff → apply protocol shared by every object-shaped kind.
pub async fn object_sync<T: ObjectAdapter>(
    ctx: &Context,
    cr: &T::Cr,
) -> Result<SyncOutcome<<T::Cr as KopperCr>::Status>, Error> {
    let resolved = T::resolve(ctx, cr).await?;
    let session = ctx
        .pool
        .acquire(&ctx.client, &T::routing(&resolved).instance)
        .await?;
    let desired = T::desired(&resolved, cr)?;

    let recorded_handle = cr.handle();
    let mut observed = match &recorded_handle {
        Some(handle) => T::find_by_handle(&session, &resolved, handle).await?,
        None => None,
    };
    let mut adopted = false;
    if observed.is_none() {
        observed = T::find_by_key(&session, &resolved, cr).await?;
        // A hit without (or despite) a recorded handle means the object
        // predates us or moved; adopt it by its natural key.
        adopted = observed.is_some();
    }

    let (observed, action) = match observed {
        Some(current) => match crate::diff::plan_update(&desired, &current, T::server_keys()) {
            Some(body) => {
                let handle = T::handle_of(&current).ok_or_else(|| Error::Keycloak {
                    status: 200,
                    text: "observed representation carries no handle".to_string(),
                })?;
                T::update(&session, &resolved, &handle, &body).await?;
                (body, SyncAction::Updated)
            }
            None if adopted => (current, SyncAction::Adopted),
            None => (current, SyncAction::Unchanged),
        },
        None => {
            let body = Value::Object(desired.clone());
            let action = match T::create(&session, &resolved, &body, cr).await {
                Ok(()) => SyncAction::Created,
                // Already exists: re-observe by the adoption key and
                // treat the existing object as canonical.
                Err(Error::Conflict(_)) => SyncAction::Adopted,
                Err(e) => return Err(e),
            };
            let current = T::find_by_key(&session, &resolved, cr)
                .await?
                .ok_or_else(|| Error::Keycloak {
                    status: 200,
                    text: "created object not found by its adoption key".to_string(),
                })?;
            (current, action)
        }
    };

    let handle = T::handle_of(&observed);
    let decorate = T::post_sync(ctx, &session, &resolved, cr, &observed, action).await?;
    Ok(SyncOutcome {
        action,
        resource_path: handle
            .as_deref()
            .and_then(|h| T::resource_path(&resolved, h)),
        handle,
        decorate,
    })
}

/// The deletion protocol shared by every object-shaped kind: delete by the
/// recorded handle, falling back to the adoption key.
pub async fn object_finalize<T: ObjectAdapter>(ctx: &Context, cr: &T::Cr) -> Result<(), Error> {
    let resolved = T::resolve(ctx, cr).await?;
    let session = ctx
        .pool
        .acquire(&ctx.client, &T::routing(&resolved).instance)
        .await?;
    let handle = match cr.handle() {
        Some(handle) => Some(handle),
        None => T::find_by_key(&session, &resolved, cr)
            .await?
            .and_then(|o| T::handle_of(&o)),
    };
    if let Some(handle) = handle {
        T::delete(&session, &resolved, &handle).await?;
    }
    Ok(())
}

fn ready_condition(
    ready: bool,
    reason: ResourcePhase,
    message: &str,
    generation: Option<i64>,
) -> Condition {
    Condition {
        last_transition_time: Time::from(Timestamp::now()),
        message: message.to_string(),
        observed_generation: generation,
        reason: reason.to_string(),
        status: if ready { "True" } else { "False" }.to_string(),
        type_: "Ready".to_string(),
    }
}

/// Replaces the matching condition, keeping the transition time when only
/// the attested generation or message moved.
fn upsert_condition(conditions: &mut Vec<Condition>, next: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == next.type_) {
        Some(existing) if existing.status == next.status && existing.reason == next.reason => {
            existing.observed_generation = next.observed_generation;
            existing.message = next.message;
        }
        Some(existing) => *existing = next,
        None => conditions.push(next),
    }
}

fn preserve_requested<K: KopperCr>(cr: &K) -> bool {
    cr.annotations()
        .get(annotations::PRESERVE_RESOURCE)
        .is_some_and(|v| v == "true")
}

async fn publish_event<K: KopperCr>(
    ctx: &Context,
    cr: &K,
    type_: EventType,
    reason: &str,
    note: String,
    action: &str,
) {
    let event = Event {
        type_,
        reason: reason.to_string(),
        note: Some(note),
        action: action.to_string(),
        secondary: None,
    };
    // Events are advisory; a failed publish never fails the reconcile.
    let _ = ctx.recorder.publish(&event, &cr.object_ref(&())).await;
}

/// Reconciliation entrypoint for one kind. Fetch is already done by the
/// controller machinery; this runs finalizer handling, the adapter sync
/// under the per-reconcile deadline, status write-back and requeue policy.
pub async fn reconcile<A: Adapter>(
    cr: Arc<A::Cr>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let namespace = cr.namespace();
    let name = cr.name_any();
    let key: ObjectKey = (
        A::Cr::kind_str(),
        namespace.clone().unwrap_or_default(),
        name.clone(),
    );

    if cr.meta().deletion_timestamp.is_some() {
        return finalize::<A>(&cr, &ctx, &key).await;
    }

    // Attach the finalizer before any Keycloak side effect; the patch
    // itself re-enqueues the object.
    if !cr.finalizers().iter().any(|f| f == util::FINALIZER) {
        let api = A::Cr::scoped_api(ctx.client.clone(), namespace.as_deref());
        let mut finalizers: Vec<String> = cr.finalizers().to_vec();
        finalizers.push(util::FINALIZER.to_string());
        let patch = json!({"metadata": {"finalizers": finalizers}});
        api.patch(
            &name,
            &PatchParams::apply(util::MANAGER_NAME),
            &Patch::Merge(&patch),
        )
        .await?;
        return Ok(Action::await_change());
    }

    let generation = cr.meta().generation;
    let outcome = match tokio::time::timeout(util::RECONCILE_DEADLINE, A::sync(&ctx, &cr)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(Error::DeadlineExceeded),
    };

    match outcome {
        Ok(outcome) => {
            ctx.reset_backoff(&key).await;
            ctx.log_action(&key, outcome.action.to_str()).await;
            if matches!(outcome.action, SyncAction::Created | SyncAction::Adopted) {
                publish_event(
                    &ctx,
                    cr.as_ref(),
                    EventType::Normal,
                    outcome.action.to_str(),
                    format!("{} '{}' synchronized with Keycloak", A::Cr::kind_str(), name),
                    "Reconciling",
                )
                .await;
            }
            patch_status(ctx.client.clone(), cr.as_ref(), move |status| {
                status.set_ready(true);
                status.set_phase(ResourcePhase::Ready);
                status.set_message(None);
                if outcome.handle.is_some() {
                    status.set_handle(outcome.handle);
                }
                if outcome.resource_path.is_some() {
                    status.set_resource_path(outcome.resource_path);
                }
                status.set_observed_generation(generation);
                upsert_condition(
                    status.conditions_mut(),
                    ready_condition(true, ResourcePhase::Ready, "reconciled", generation),
                );
                if let Some(decorate) = outcome.decorate {
                    decorate(status);
                }
            })
            .await?;
            Ok(Action::requeue(util::SYNC_INTERVAL))
        }
        // API-server trouble is framework-level; let on_error handle it
        // without attempting a status write that would fail the same way.
        Err(err @ Error::Kube { .. }) => Err(err),
        Err(err) => {
            let reason = err.reason();
            let message = err.to_string();
            ctx.log_action(&key, &reason.to_string()).await;
            publish_event(
                &ctx,
                cr.as_ref(),
                EventType::Warning,
                &reason.to_string(),
                message.clone(),
                "Reconciling",
            )
            .await;
            patch_status(ctx.client.clone(), cr.as_ref(), move |status| {
                status.set_ready(false);
                status.set_phase(reason);
                status.set_message(Some(message.clone()));
                upsert_condition(
                    status.conditions_mut(),
                    ready_condition(false, reason, &message, generation),
                );
            })
            .await?;
            let delay = match err.retry() {
                Retry::Fixed(duration) => duration,
                Retry::Backoff => ctx.next_backoff(&key).await,
            };
            Ok(Action::requeue(delay))
        }
    }
}

async fn finalize<A: Adapter>(
    cr: &Arc<A::Cr>,
    ctx: &Arc<Context>,
    key: &ObjectKey,
) -> Result<Action, Error> {
    if !cr.finalizers().iter().any(|f| f == util::FINALIZER) {
        return Ok(Action::await_change());
    }

    if preserve_requested(cr.as_ref()) {
        ctx.log_action(key, "Preserved").await;
    } else {
        match A::finalize(ctx, cr).await {
            Ok(()) => ctx.log_action(key, "Deleted").await,
            // The parent chain is gone or was never valid; there is no
            // session to delete through. Release the object.
            Err(Error::RefNotFound { .. }) | Err(Error::InvalidSpec(_)) => {
                ctx.log_action(key, "Orphaned").await;
            }
            // A parent exists but is not usable yet; retry rather than
            // orphaning the Keycloak object.
            Err(err @ Error::RefNotReady { .. }) => {
                patch_status(ctx.client.clone(), cr.as_ref(), |status| {
                    status.set_ready(false);
                    status.set_phase(ResourcePhase::Deleting);
                    status.set_message(Some(err.to_string()));
                })
                .await?;
                return Ok(Action::requeue(util::REF_WAIT));
            }
            Err(err @ Error::Kube { .. }) => return Err(err),
            Err(err) => {
                let message = err.to_string();
                patch_status(ctx.client.clone(), cr.as_ref(), move |status| {
                    status.set_ready(false);
                    status.set_phase(ResourcePhase::Deleting);
                    status.set_message(Some(message));
                })
                .await?;
                let delay = match err.retry() {
                    Retry::Fixed(duration) => duration,
                    Retry::Backoff => ctx.next_backoff(key).await,
                };
                return Ok(Action::requeue(delay));
            }
        }
    }

    // Materialized child Secrets are garbage-collected through their
    // ownerReferences once the object goes away.
    let namespace = cr.namespace();
    let finalizers: Vec<String> = cr
        .finalizers()
        .iter()
        .filter(|f| *f != util::FINALIZER)
        .cloned()
        .collect();
    let api = A::Cr::scoped_api(ctx.client.clone(), namespace.as_deref());
    let patch = json!({"metadata": {"finalizers": finalizers}});
    api.patch(
        &cr.name_any(),
        &PatchParams::apply(util::MANAGER_NAME),
        &Patch::Merge(&patch),
    )
    .await?;
    ctx.reset_backoff(key).await;
    Ok(Action::await_change())
}

/// Requeue policy for reconcile functions that errored out at the framework
/// level (API-server faults, status-write failures).
pub fn on_error<A: Adapter>(cr: Arc<A::Cr>, error: &Error, _ctx: Arc<Context>) -> Action {
    eprintln!(
        "{}",
        format!(
            "Reconciliation error for {} '{}': {:?}",
            A::Cr::kind_str(),
            cr.name_any(),
            error
        )
        .red()
    );
    Action::requeue(Duration::from_secs(5))
}

/// Default controller runner for kinds without extra watches.
pub async fn run_controller<A: Adapter>(ctx: Arc<Context>) {
    let api = A::Cr::scoped_api(ctx.client.clone(), ctx.watch_namespace.as_deref());
    Controller::new(api, watcher::Config::default())
        .with_config(controller::Config::default().concurrency(ctx.concurrency))
        .run(reconcile::<A>, on_error::<A>, ctx)
        .for_each(|_| async {})
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_keeps_transition_time_for_same_state() {
        let mut conditions = Vec::new();
        let first = ready_condition(true, ResourcePhase::Ready, "reconciled", Some(1));
        let stamp = first.last_transition_time.clone();
        upsert_condition(&mut conditions, first);
        let refreshed = Condition {
            last_transition_time: Time::from(
                Timestamp::now() + k8s_openapi::jiff::SignedDuration::from_secs(60),
            ),
            ..ready_condition(true, ResourcePhase::Ready, "reconciled", Some(2))
        };
        upsert_condition(&mut conditions, refreshed);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, stamp);
        assert_eq!(conditions[0].observed_generation, Some(2));
    }

    #[test]
    fn upsert_replaces_on_state_change() {
        let mut conditions = vec![ready_condition(
            true,
            ResourcePhase::Ready,
            "reconciled",
            Some(1),
        )];
        upsert_condition(
            &mut conditions,
            ready_condition(false, ResourcePhase::AuthFailed, "401", Some(2)),
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, "False");
        assert_eq!(conditions[0].reason, "AuthFailed");
    }

    #[test]
    fn preserve_annotation_requires_the_literal_true() {
        let mut cr = kopper_types::Realm::new("r1", kopper_types::RealmSpec::default());
        assert!(!preserve_requested(&cr));
        cr.metadata
            .annotations
            .get_or_insert_default()
            .insert(annotations::PRESERVE_RESOURCE.to_string(), "True".to_string());
        assert!(!preserve_requested(&cr));
        cr.metadata
            .annotations
            .get_or_insert_default()
            .insert(annotations::PRESERVE_RESOURCE.to_string(), "true".to_string());
        assert!(preserve_requested(&cr));
    }
}
