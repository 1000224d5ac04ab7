mod client;
mod client_scope;
mod component;
mod group;
mod identity_provider;
mod instance;
mod organization;
mod phase;
mod protocol_mapper;
mod realm;
mod refs;
mod role;
mod role_mapping;
mod schema;
mod user;
mod user_credential;

pub use client::*;
pub use client_scope::*;
pub use component::*;
pub use group::*;
pub use identity_provider::*;
pub use instance::*;
pub use organization::*;
pub use phase::*;
pub use protocol_mapper::*;
pub use realm::*;
pub use refs::*;
pub use role::*;
pub use role_mapping::*;
pub use user::*;
pub use user_credential::*;

/// API group shared by every kind in this crate.
pub const API_GROUP: &str = "keycloak.kopper.io";

/// API version shared by every kind in this crate.
pub const API_VERSION: &str = "v1beta1";
