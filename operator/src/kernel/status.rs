use kopper_types::*;
use kube::{Api, Client};

pub use crate::util::patch::{CommonStatus, KopperCr};

/// Accessors shared by every status struct. Expanded inside each
/// `CommonStatus` impl; handle and resource-path accessors stay per-kind.
macro_rules! core_status_methods {
    () => {
        fn ready(&self) -> bool {
            self.ready
        }
        fn set_ready(&mut self, ready: bool) {
            self.ready = ready;
        }
        fn phase(&self) -> ResourcePhase {
            self.status
        }
        fn set_phase(&mut self, phase: ResourcePhase) {
            self.status = phase;
        }
        fn set_message(&mut self, message: Option<String>) {
            self.message = message;
        }
        fn set_observed_generation(&mut self, generation: Option<i64>) {
            self.observed_generation = generation;
        }
        fn conditions_mut(
            &mut self,
        ) -> &mut Vec<k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition> {
            &mut self.conditions
        }
        fn set_last_updated(
            &mut self,
            last_updated: k8s_openapi::apimachinery::pkg::apis::meta::v1::Time,
        ) {
            self.last_updated = Some(last_updated);
        }
    };
}

/// Handle + resource-path accessors for kinds that record both.
macro_rules! handle_status_methods {
    ($field:ident) => {
        fn handle(&self) -> Option<String> {
            self.$field.clone()
        }
        fn set_handle(&mut self, handle: Option<String>) {
            self.$field = handle;
        }
        fn set_resource_path(&mut self, path: Option<String>) {
            self.resource_path = path;
        }
    };
}

impl CommonStatus for InstanceStatus {
    core_status_methods!();
}

impl CommonStatus for RealmStatus {
    core_status_methods!();
    handle_status_methods!(realm);
}

impl CommonStatus for ClientStatus {
    core_status_methods!();
    handle_status_methods!(client_uuid);
}

impl CommonStatus for UserStatus {
    core_status_methods!();
    handle_status_methods!(user_id);
}

impl CommonStatus for GroupStatus {
    core_status_methods!();
    handle_status_methods!(group_id);
}

impl CommonStatus for RoleStatus {
    core_status_methods!();
    handle_status_methods!(role_id);
}

impl CommonStatus for RoleMappingStatus {
    core_status_methods!();
}

impl CommonStatus for ClientScopeStatus {
    core_status_methods!();
    handle_status_methods!(scope_id);
}

impl CommonStatus for ProtocolMapperStatus {
    core_status_methods!();
    handle_status_methods!(mapper_id);
}

impl CommonStatus for IdentityProviderStatus {
    core_status_methods!();
    handle_status_methods!(alias);
}

impl CommonStatus for OrganizationStatus {
    core_status_methods!();
    handle_status_methods!(organization_id);
}

impl CommonStatus for ComponentStatus {
    core_status_methods!();
    handle_status_methods!(component_id);
}

impl CommonStatus for UserCredentialStatus {
    core_status_methods!();
}

macro_rules! impl_kopper_cr {
    (namespaced $cr:ty, $status:ty, $kind:literal) => {
        impl KopperCr for $cr {
            type Status = $status;

            fn kind_str() -> &'static str {
                $kind
            }

            fn scoped_api(client: Client, namespace: Option<&str>) -> Api<Self> {
                match namespace {
                    Some(ns) => Api::namespaced(client, ns),
                    None => Api::all(client),
                }
            }

            fn status_opt(&self) -> Option<&$status> {
                self.status.as_ref()
            }

            fn mut_status(&mut self) -> &mut $status {
                if self.status.is_none() {
                    self.status = Some(Default::default());
                }
                self.status.as_mut().unwrap()
            }
        }
    };
    (cluster $cr:ty, $status:ty, $kind:literal) => {
        impl KopperCr for $cr {
            type Status = $status;

            fn kind_str() -> &'static str {
                $kind
            }

            fn scoped_api(client: Client, _namespace: Option<&str>) -> Api<Self> {
                Api::all(client)
            }

            fn status_opt(&self) -> Option<&$status> {
                self.status.as_ref()
            }

            fn mut_status(&mut self) -> &mut $status {
                if self.status.is_none() {
                    self.status = Some(Default::default());
                }
                self.status.as_mut().unwrap()
            }
        }
    };
}

impl_kopper_cr!(namespaced Instance, InstanceStatus, "Instance");
impl_kopper_cr!(cluster ClusterInstance, InstanceStatus, "ClusterInstance");
impl_kopper_cr!(namespaced Realm, RealmStatus, "Realm");
impl_kopper_cr!(cluster ClusterRealm, RealmStatus, "ClusterRealm");
impl_kopper_cr!(namespaced kopper_types::Client, ClientStatus, "Client");
impl_kopper_cr!(namespaced User, UserStatus, "User");
impl_kopper_cr!(namespaced Group, GroupStatus, "Group");
impl_kopper_cr!(namespaced Role, RoleStatus, "Role");
impl_kopper_cr!(namespaced RoleMapping, RoleMappingStatus, "RoleMapping");
impl_kopper_cr!(namespaced ClientScope, ClientScopeStatus, "ClientScope");
impl_kopper_cr!(namespaced ProtocolMapper, ProtocolMapperStatus, "ProtocolMapper");
impl_kopper_cr!(namespaced IdentityProvider, IdentityProviderStatus, "IdentityProvider");
impl_kopper_cr!(namespaced Organization, OrganizationStatus, "Organization");
impl_kopper_cr!(namespaced Component, ComponentStatus, "Component");
impl_kopper_cr!(namespaced UserCredential, UserCredentialStatus, "UserCredential");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mut_status_initializes_default() {
        let mut cr = Realm::new("r1", RealmSpec::default());
        assert!(cr.status.is_none());
        cr.mut_status().set_ready(true);
        assert!(cr.status_opt().unwrap().ready());
    }

    #[test]
    fn handle_round_trips_through_the_trait() {
        let mut status = ClientStatus::default();
        assert_eq!(status.handle(), None);
        status.set_handle(Some("3f2a".to_string()));
        assert_eq!(status.handle(), Some("3f2a".to_string()));
        status.set_resource_path(Some("/realms/e2e/clients/3f2a".to_string()));
        assert_eq!(
            status.resource_path.as_deref(),
            Some("/realms/e2e/clients/3f2a")
        );
    }

    #[test]
    fn instance_status_has_no_handle() {
        let mut status = InstanceStatus::default();
        status.set_handle(Some("ignored".to_string()));
        assert_eq!(status.handle(), None);
    }
}
