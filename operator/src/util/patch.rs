use super::MANAGER_NAME;
use k8s_openapi::{
    apimachinery::pkg::apis::meta::v1::{Condition, Time},
    jiff::Timestamp,
};
use kopper_types::ResourcePhase;
use kube::{
    Api, Client, ResourceExt,
    api::{Patch, PatchParams, Resource},
};
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;

use crate::util::Error;

/// Uniform view over the per-kind status structs. Every managed kind carries
/// the same core fields; the handle and resource path are kind-specific and
/// default to no-ops where a kind has neither.
pub trait CommonStatus {
    fn ready(&self) -> bool;
    fn set_ready(&mut self, ready: bool);
    fn phase(&self) -> ResourcePhase;
    fn set_phase(&mut self, phase: ResourcePhase);
    fn set_message(&mut self, message: Option<String>);
    fn set_observed_generation(&mut self, generation: Option<i64>);
    fn conditions_mut(&mut self) -> &mut Vec<Condition>;
    fn set_last_updated(&mut self, last_updated: Time);

    fn handle(&self) -> Option<String> {
        None
    }
    fn set_handle(&mut self, _handle: Option<String>) {}
    fn set_resource_path(&mut self, _path: Option<String>) {}
}

/// A custom resource the reconciler kernel can drive: scoped Api
/// construction plus access to its status object, initializing it with the
/// default value if it does not exist.
pub trait KopperCr:
    Resource<DynamicType = ()>
    + ResourceExt
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    type Status: CommonStatus
        + Clone
        + Debug
        + Default
        + PartialEq
        + Serialize
        + DeserializeOwned
        + Send
        + Sync;

    fn kind_str() -> &'static str;

    /// Api scoped to the object's namespace, or cluster-wide for
    /// cluster-scoped kinds (which ignore the namespace argument).
    fn scoped_api(client: Client, namespace: Option<&str>) -> Api<Self>;

    fn status_opt(&self) -> Option<&Self::Status>;

    fn mut_status(&mut self) -> &mut Self::Status;

    /// The Keycloak-side handle recorded in status, if any.
    fn handle(&self) -> Option<String> {
        self.status_opt().and_then(|s| s.handle())
    }

    fn is_ready(&self) -> bool {
        self.status_opt().is_some_and(|s| s.ready())
    }
}

/// Patch the resource's status subresource with the provided function. The
/// function is passed a mutable reference to the status object, which is to
/// be mutated in-place. Move closures are supported. A mutation that leaves
/// the status unchanged issues no API call and advances no timestamp.
pub async fn patch_status<K: KopperCr>(
    client: Client,
    instance: &K,
    f: impl FnOnce(&mut K::Status),
) -> Result<K, Error> {
    let mut modified = instance.clone();
    f(modified.mut_status());
    if instance.status_opt() == modified.status_opt() {
        return Ok(modified);
    }
    modified
        .mut_status()
        .set_last_updated(Time::from(Timestamp::now()));
    let patch = Patch::Json::<K>(json_patch::diff(
        &serde_json::to_value(instance)?,
        &serde_json::to_value(&modified)?,
    ));
    let name = instance.name_any();
    let api = K::scoped_api(client, instance.namespace().as_deref());
    Ok(api
        .patch_status(&name, &PatchParams::apply(MANAGER_NAME), &patch)
        .await?)
}
