use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// User-visible lifecycle state of a managed resource. Reported verbatim in
/// `status.status` and as the reason on the `Ready` condition.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum ResourcePhase {
    #[default]
    Pending,
    Resolving,
    Creating,
    Updating,
    Ready,
    Deleting,
    InvalidSpec,
    RefNotFound,
    RefNotReady,
    AuthFailed,
    KeycloakUnavailable,
    KeycloakConflict,
    KeycloakError,
    SecretError,
    UnsupportedVersion,
}

impl ResourcePhase {
    /// Whether the phase represents an error sink rather than a step of the
    /// normal lifecycle. Error sinks are recoverable; the next reconcile
    /// re-evaluates the resource from scratch.
    pub fn is_error(&self) -> bool {
        !matches!(
            self,
            ResourcePhase::Pending
                | ResourcePhase::Resolving
                | ResourcePhase::Creating
                | ResourcePhase::Updating
                | ResourcePhase::Ready
                | ResourcePhase::Deleting
        )
    }
}

impl FromStr for ResourcePhase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ResourcePhase::Pending),
            "Resolving" => Ok(ResourcePhase::Resolving),
            "Creating" => Ok(ResourcePhase::Creating),
            "Updating" => Ok(ResourcePhase::Updating),
            "Ready" => Ok(ResourcePhase::Ready),
            "Deleting" => Ok(ResourcePhase::Deleting),
            "InvalidSpec" => Ok(ResourcePhase::InvalidSpec),
            "RefNotFound" => Ok(ResourcePhase::RefNotFound),
            "RefNotReady" => Ok(ResourcePhase::RefNotReady),
            "AuthFailed" => Ok(ResourcePhase::AuthFailed),
            "KeycloakUnavailable" => Ok(ResourcePhase::KeycloakUnavailable),
            "KeycloakConflict" => Ok(ResourcePhase::KeycloakConflict),
            "KeycloakError" => Ok(ResourcePhase::KeycloakError),
            "SecretError" => Ok(ResourcePhase::SecretError),
            "UnsupportedVersion" => Ok(ResourcePhase::UnsupportedVersion),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ResourcePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourcePhase::Pending => "Pending",
            ResourcePhase::Resolving => "Resolving",
            ResourcePhase::Creating => "Creating",
            ResourcePhase::Updating => "Updating",
            ResourcePhase::Ready => "Ready",
            ResourcePhase::Deleting => "Deleting",
            ResourcePhase::InvalidSpec => "InvalidSpec",
            ResourcePhase::RefNotFound => "RefNotFound",
            ResourcePhase::RefNotReady => "RefNotReady",
            ResourcePhase::AuthFailed => "AuthFailed",
            ResourcePhase::KeycloakUnavailable => "KeycloakUnavailable",
            ResourcePhase::KeycloakConflict => "KeycloakConflict",
            ResourcePhase::KeycloakError => "KeycloakError",
            ResourcePhase::SecretError => "SecretError",
            ResourcePhase::UnsupportedVersion => "UnsupportedVersion",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_strings_round_trip() {
        for phase in [
            ResourcePhase::Pending,
            ResourcePhase::Resolving,
            ResourcePhase::Creating,
            ResourcePhase::Updating,
            ResourcePhase::Ready,
            ResourcePhase::Deleting,
            ResourcePhase::InvalidSpec,
            ResourcePhase::RefNotFound,
            ResourcePhase::RefNotReady,
            ResourcePhase::AuthFailed,
            ResourcePhase::KeycloakUnavailable,
            ResourcePhase::KeycloakConflict,
            ResourcePhase::KeycloakError,
            ResourcePhase::SecretError,
            ResourcePhase::UnsupportedVersion,
        ] {
            assert_eq!(phase.to_string().parse::<ResourcePhase>(), Ok(phase));
        }
    }

    #[test]
    fn lifecycle_phases_are_not_errors() {
        assert!(!ResourcePhase::Ready.is_error());
        assert!(!ResourcePhase::Deleting.is_error());
        assert!(ResourcePhase::AuthFailed.is_error());
        assert!(ResourcePhase::InvalidSpec.is_error());
    }
}
