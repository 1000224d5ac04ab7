use std::time::Duration;

use kopper_types::ResourcePhase;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Kubernetes reported error: {source}")]
    Kube {
        #[from]
        source: kube::Error,
    },

    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    #[error("referenced {kind} '{name}' not found")]
    RefNotFound { kind: &'static str, name: String },

    #[error("referenced {kind} '{name}' is not ready")]
    RefNotReady { kind: &'static str, name: String },

    #[error("authentication against Keycloak failed: {0}")]
    AuthFailed(String),

    #[error("Keycloak unreachable: {0}")]
    Unavailable(String),

    #[error("Keycloak reported a conflict: {0}")]
    Conflict(String),

    #[error("Keycloak returned {status}: {text}")]
    Keycloak { status: u16, text: String },

    #[error("secret error: {0}")]
    Secret(String),

    #[error("Keycloak {found} does not support {feature}")]
    UnsupportedVersion { feature: &'static str, found: String },

    #[error("reconcile deadline exceeded")]
    DeadlineExceeded,

    #[error("Json error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

/// How the kernel schedules the next attempt after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    Fixed(Duration),
    /// Exponential, per-object attempt counter, capped at five minutes.
    Backoff,
}

impl Error {
    /// The user-visible reason recorded in `status.status` and on the
    /// `Ready` condition.
    pub fn reason(&self) -> ResourcePhase {
        match self {
            Error::InvalidSpec(_) => ResourcePhase::InvalidSpec,
            Error::RefNotFound { .. } => ResourcePhase::RefNotFound,
            Error::RefNotReady { .. } => ResourcePhase::RefNotReady,
            Error::AuthFailed(_) => ResourcePhase::AuthFailed,
            Error::Unavailable(_) | Error::DeadlineExceeded => ResourcePhase::KeycloakUnavailable,
            Error::Conflict(_) => ResourcePhase::KeycloakConflict,
            Error::Secret(_) => ResourcePhase::SecretError,
            Error::UnsupportedVersion { .. } => ResourcePhase::UnsupportedVersion,
            Error::Kube { .. } | Error::Keycloak { .. } | Error::Json { .. } => {
                ResourcePhase::KeycloakError
            }
        }
    }

    pub fn retry(&self) -> Retry {
        match self {
            // Permanent until the user (or a parent resource) changes
            // something; poll slowly.
            Error::InvalidSpec(_)
            | Error::RefNotFound { .. }
            | Error::Secret(_)
            | Error::UnsupportedVersion { .. } => Retry::Fixed(Duration::from_secs(300)),
            Error::RefNotReady { .. } => Retry::Fixed(Duration::from_secs(10)),
            // Re-read and re-diff promptly; the object already exists.
            Error::Conflict(_) => Retry::Fixed(Duration::from_secs(2)),
            _ => Retry::Backoff,
        }
    }

    /// Whether a 404 from Keycloak produced this error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Keycloak { status: 404, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_follows_the_taxonomy() {
        let cases: Vec<(Error, ResourcePhase, Retry)> = vec![
            (
                Error::InvalidSpec("both refs set".into()),
                ResourcePhase::InvalidSpec,
                Retry::Fixed(Duration::from_secs(300)),
            ),
            (
                Error::RefNotFound {
                    kind: "Instance",
                    name: "ki".into(),
                },
                ResourcePhase::RefNotFound,
                Retry::Fixed(Duration::from_secs(300)),
            ),
            (
                Error::RefNotReady {
                    kind: "Realm",
                    name: "r1".into(),
                },
                ResourcePhase::RefNotReady,
                Retry::Fixed(Duration::from_secs(10)),
            ),
            (
                Error::AuthFailed("401".into()),
                ResourcePhase::AuthFailed,
                Retry::Backoff,
            ),
            (
                Error::Unavailable("connection refused".into()),
                ResourcePhase::KeycloakUnavailable,
                Retry::Backoff,
            ),
            (
                Error::Conflict("client already exists".into()),
                ResourcePhase::KeycloakConflict,
                Retry::Fixed(Duration::from_secs(2)),
            ),
            (
                Error::Keycloak {
                    status: 400,
                    text: "bad".into(),
                },
                ResourcePhase::KeycloakError,
                Retry::Backoff,
            ),
            (
                Error::Secret("missing key".into()),
                ResourcePhase::SecretError,
                Retry::Fixed(Duration::from_secs(300)),
            ),
            (
                Error::UnsupportedVersion {
                    feature: "organizations",
                    found: "25.0.1".into(),
                },
                ResourcePhase::UnsupportedVersion,
                Retry::Fixed(Duration::from_secs(300)),
            ),
        ];
        for (err, reason, retry) in cases {
            assert_eq!(err.reason(), reason, "{err}");
            assert_eq!(err.retry(), retry, "{err}");
        }
    }

    #[test]
    fn keycloak_404_is_not_found() {
        assert!(
            Error::Keycloak {
                status: 404,
                text: String::new()
            }
            .is_not_found()
        );
        assert!(
            !Error::Keycloak {
                status: 403,
                text: String::new()
            }
            .is_not_found()
        );
    }
}
