pub mod args;
pub mod shutdown;

/// Annotations recognized on any managed custom resource.
pub mod annotations {
    /// With the literal value `"true"` the finalizer leaves the Keycloak
    /// object in place when the custom resource is deleted. Any other value
    /// (including `"false"` or absence) triggers normal deletion.
    pub const PRESERVE_RESOURCE: &str = "keycloak.operator/preserve-resource";
}

/// Labels stamped onto objects the operator materializes.
pub mod labels {
    /// Marks Secrets created and managed by the operator.
    pub const MANAGED: &str = "keycloak.operator/managed";
}

pub fn init() {
    let disable_colors = ["1", "true"].contains(
        &std::env::var("DISABLE_COLORS")
            .unwrap_or_else(|_| String::new())
            .to_lowercase()
            .as_str(),
    );
    owo_colors::set_override(!disable_colors);
}

/// Touches the readiness file consumed by the container probe. Best effort;
/// outside a pod there is nothing to signal.
pub fn signal_ready() {
    let _ = std::fs::write("/etc/ready", "ready");
}
