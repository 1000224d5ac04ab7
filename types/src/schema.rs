use schemars::{Schema, SchemaGenerator, json_schema};

/// Schema for opaque Keycloak representation documents. The operator treats
/// them as structured JSON; the API server must not prune unknown fields.
pub fn preserve_unknown(_generator: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}
