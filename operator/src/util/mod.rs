use std::time::Duration;

pub mod backoff;
pub mod patch;

pub(crate) mod colors;

mod error;

pub use error::*;

/// Name of the kubernetes resource manager.
pub(crate) const MANAGER_NAME: &str = "kopper-operator";

/// Finalizer attached to every resource with Keycloak-side effects.
pub(crate) const FINALIZER: &str = "keycloak.kopper.io/finalizer";

/// Slow resync interval after a successful reconcile. Watches cover the
/// normal change paths; this catches drift introduced behind our back.
pub(crate) const SYNC_INTERVAL: Duration = Duration::from_secs(600);

/// Requeue interval while a referenced parent exists but is not Ready yet.
pub(crate) const REF_WAIT: Duration = Duration::from_secs(10);

/// Upper bound for one reconcile pass, network time included.
pub(crate) const RECONCILE_DEADLINE: Duration = Duration::from_secs(120);

/// SHA-256 over a secret value, hex encoded. Stored in status to detect
/// credential changes without persisting the credential itself.
pub fn hash_secret_value(value: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_hash_is_stable_and_value_sensitive() {
        let a = hash_secret_value("hunter2");
        assert_eq!(a, hash_secret_value("hunter2"));
        assert_ne!(a, hash_secret_value("hunter3"));
        assert_eq!(a.len(), 64);
    }
}
