pub mod client;
pub mod client_scope;
pub mod component;
pub mod group;
pub mod identity_provider;
pub mod instance;
pub mod organization;
pub mod protocol_mapper;
pub mod realm;
pub mod role;
pub mod role_mapping;
pub mod user;
pub mod user_credential;
