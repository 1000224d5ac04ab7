use serde_json::{Map, Value};

use crate::util::Error;

/// Fields Keycloak fills in on every representation. Never part of a drift
/// decision, regardless of kind.
pub const SERVER_SET_KEYS: &[&str] = &[
    "id",
    "containerId",
    "createdTimestamp",
    "createdDate",
    "notBefore",
    "access",
];

/// Ordered lists Keycloak treats as sets. Compared order-insensitively so a
/// server-side reordering never produces an update.
pub const SET_LIKE_KEYS: &[&str] = &[
    "redirectUris",
    "webOrigins",
    "defaultClientScopes",
    "optionalClientScopes",
    "requiredActions",
    "realmRoles",
    "groups",
    "domains",
];

/// Interprets a CR's opaque `definition` as a JSON object. A missing
/// definition is an empty object; any other non-object shape is a user
/// error.
pub fn definition_object(definition: &Value) -> Result<Map<String, Value>, Error> {
    match definition {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map.clone()),
        other => Err(Error::InvalidSpec(format!(
            "definition must be a JSON object, found {}",
            json_type_name(other)
        ))),
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Null, empty object and empty array all coalesce with absence.
fn is_effectively_empty(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::Object(m) => m.is_empty(),
        _ => false,
    }
}

fn as_multiset(items: &[Value]) -> Vec<String> {
    let mut serialized: Vec<String> = items.iter().map(|v| v.to_string()).collect();
    serialized.sort();
    serialized
}

fn values_equal(key: &str, desired: &Value, observed: &Value) -> bool {
    match (desired, observed) {
        (Value::Array(d), Value::Array(o)) if SET_LIKE_KEYS.contains(&key) => {
            as_multiset(d) == as_multiset(o)
        }
        (Value::Object(d), Value::Object(o)) => !object_drifts(d, o, &[]),
        _ => desired == observed,
    }
}

fn key_differs(key: &str, desired: &Value, observed: Option<&Value>) -> bool {
    match observed {
        None | Some(Value::Null) => !is_effectively_empty(desired),
        Some(ov) => !values_equal(key, desired, ov),
    }
}

/// Desired-projected comparison: only keys present in the desired document
/// participate, so server-side extras never count as drift. Keys listed in
/// `server_keys` (on top of the global set) are skipped as well.
pub fn object_drifts(
    desired: &Map<String, Value>,
    observed: &Map<String, Value>,
    server_keys: &[&str],
) -> bool {
    desired.iter().any(|(key, desired_value)| {
        if desired_value.is_null()
            || SERVER_SET_KEYS.contains(&key.as_str())
            || server_keys.contains(&key.as_str())
        {
            return false;
        }
        key_differs(key, desired_value, observed.get(key))
    })
}

/// Computes the update body, if any: the observed representation overlaid
/// with the desired keys, so Keycloak-managed fields (the id included)
/// survive the PUT. `None` means observed already matches desired.
pub fn plan_update(
    desired: &Map<String, Value>,
    observed: &Value,
    server_keys: &[&str],
) -> Option<Value> {
    let observed_map = observed.as_object().cloned().unwrap_or_default();
    if !object_drifts(desired, &observed_map, server_keys) {
        return None;
    }
    let mut body = observed_map;
    for (key, value) in desired {
        if !value.is_null() {
            body.insert(key.clone(), value.clone());
        }
    }
    Some(Value::Object(body))
}

/// Recursively removes server-generated keys, nulls and empty containers.
/// Used by the export subsystem so emitted definitions re-create cleanly.
pub fn scrub(value: &mut Value, server_keys: &[&str]) {
    match value {
        Value::Object(map) => {
            map.retain(|key, _| {
                !SERVER_SET_KEYS.contains(&key.as_str()) && !server_keys.contains(&key.as_str())
            });
            for child in map.values_mut() {
                scrub(child, server_keys);
            }
            map.retain(|_, v| !is_effectively_empty(v));
        }
        Value::Array(items) => {
            for child in items.iter_mut() {
                scrub(child, server_keys);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn matching_documents_yield_no_update() {
        let desired = obj(json!({"enabled": true, "clientId": "app1"}));
        let observed = json!({
            "id": "3f2a", "clientId": "app1", "enabled": true,
            "surrogateAuthRequired": false,
        });
        assert_eq!(plan_update(&desired, &observed, &[]), None);
    }

    #[test]
    fn set_like_lists_ignore_order() {
        let desired = obj(json!({"redirectUris": ["https://a/cb", "https://b/cb"]}));
        let observed = json!({"redirectUris": ["https://b/cb", "https://a/cb"]});
        assert_eq!(plan_update(&desired, &observed, &[]), None);
    }

    #[test]
    fn set_like_lists_detect_membership_changes() {
        let desired = obj(json!({"webOrigins": ["https://a"]}));
        let observed = json!({"webOrigins": ["https://a", "https://b"]});
        assert!(plan_update(&desired, &observed, &[]).is_some());
    }

    #[test]
    fn null_and_absent_coalesce() {
        let desired = obj(json!({"description": null, "attributes": {}, "redirectUris": []}));
        let observed = json!({"id": "x"});
        assert_eq!(plan_update(&desired, &observed, &[]), None);
    }

    #[test]
    fn server_set_fields_never_drift() {
        let desired = obj(json!({"id": "desired-id", "enabled": true}));
        let observed = json!({"id": "real-id", "enabled": true, "createdTimestamp": 123});
        assert_eq!(plan_update(&desired, &observed, &[]), None);
    }

    #[test]
    fn update_body_preserves_observed_id_and_extras() {
        let desired = obj(json!({"enabled": false}));
        let observed = json!({"id": "3f2a", "enabled": true, "protocol": "openid-connect"});
        let body = plan_update(&desired, &observed, &[]).unwrap();
        assert_eq!(body["id"], "3f2a");
        assert_eq!(body["enabled"], false);
        assert_eq!(body["protocol"], "openid-connect");
    }

    #[test]
    fn nested_objects_compare_projected() {
        let desired = obj(json!({"attributes": {"pkce.code.challenge.method": "S256"}}));
        let observed = json!({
            "attributes": {
                "pkce.code.challenge.method": "S256",
                "client.secret.creation.time": "1700000000",
            }
        });
        assert_eq!(plan_update(&desired, &observed, &[]), None);

        let changed = obj(json!({"attributes": {"pkce.code.challenge.method": "plain"}}));
        assert!(plan_update(&changed, &observed, &[]).is_some());
    }

    #[test]
    fn kind_specific_server_keys_are_honored() {
        let desired = obj(json!({"realm": "e2e", "defaultRoles": ["offline_access"]}));
        let observed = json!({"realm": "e2e"});
        assert_eq!(plan_update(&desired, &observed, &["defaultRoles"]), None);
    }

    #[test]
    fn definition_object_rejects_non_objects() {
        assert!(definition_object(&json!(null)).unwrap().is_empty());
        assert_eq!(definition_object(&json!({"a": 1})).unwrap().len(), 1);
        assert!(matches!(
            definition_object(&json!([1, 2])),
            Err(Error::InvalidSpec(_))
        ));
    }

    #[test]
    fn scrub_removes_server_keys_recursively() {
        let mut value = json!({
            "id": "x",
            "clientId": "app1",
            "description": null,
            "attributes": {},
            "protocolMappers": [
                {"id": "y", "name": "aud", "config": {"claim.name": "aud"}}
            ],
        });
        scrub(&mut value, &[]);
        assert_eq!(
            value,
            json!({
                "clientId": "app1",
                "protocolMappers": [
                    {"name": "aud", "config": {"claim.name": "aud"}}
                ],
            })
        );
    }
}
