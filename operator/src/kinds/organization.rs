use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::{Map, Value, json};

use kopper_types::Organization;

use crate::kernel::{Context, ObjectAdapter};
use crate::keycloak::{Session, admin_path, encode};
use crate::resolve::{self, Routing};
use crate::util::Error;

/// Organizations exist since Keycloak 26.
const MIN_MAJOR_VERSION: u32 = 26;

pub fn effective_org_name(cr: &Organization) -> String {
    cr.spec.name.clone().unwrap_or_else(|| cr.name_any())
}

pub fn major_version(version: &str) -> Option<u32> {
    version.split('.').next()?.trim().parse().ok()
}

fn check_version(version: Option<&str>) -> Result<(), Error> {
    match version {
        Some(v) if major_version(v).is_some_and(|major| major < MIN_MAJOR_VERSION) => {
            Err(Error::UnsupportedVersion {
                feature: "organizations",
                found: v.to_string(),
            })
        }
        _ => Ok(()),
    }
}

fn desired_org(name: &str, definition: &Value) -> Result<Map<String, Value>, Error> {
    let mut desired = crate::diff::definition_object(definition)?;
    desired.insert("name".to_string(), json!(name));
    desired.entry("alias").or_insert(json!(name));
    // Keycloak 26 rejects organizations without a domain.
    let has_domain = desired
        .get("domains")
        .and_then(Value::as_array)
        .is_some_and(|d| !d.is_empty());
    if !has_domain {
        return Err(Error::InvalidSpec(
            "organization definition requires at least one entry in 'domains'".to_string(),
        ));
    }
    Ok(desired)
}

pub struct OrganizationAdapter;

#[async_trait]
impl ObjectAdapter for OrganizationAdapter {
    type Cr = Organization;
    type Resolved = Routing;

    async fn resolve(ctx: &Context, cr: &Organization) -> Result<Routing, Error> {
        let namespace = cr.namespace();
        let routing =
            resolve::resolve_realm(&ctx.client, &cr.spec.realm, namespace.as_deref()).await?;
        check_version(routing.version.as_deref())?;
        Ok(routing)
    }

    fn routing(resolved: &Routing) -> &Routing {
        resolved
    }

    fn desired(_resolved: &Routing, cr: &Organization) -> Result<Map<String, Value>, Error> {
        desired_org(&effective_org_name(cr), &cr.spec.definition)
    }

    async fn find_by_handle(
        session: &Session,
        resolved: &Routing,
        handle: &str,
    ) -> Result<Option<Value>, Error> {
        session
            .get_opt(&admin_path(&resolved.realm, &format!("/organizations/{handle}")))
            .await
    }

    async fn find_by_key(
        session: &Session,
        resolved: &Routing,
        cr: &Organization,
    ) -> Result<Option<Value>, Error> {
        let name = effective_org_name(cr);
        let path = admin_path(
            &resolved.realm,
            &format!("/organizations?search={}&exact=true", encode(&name)),
        );
        let found = session.get(&path).await?;
        Ok(found
            .as_array()
            .and_then(|orgs| {
                orgs.iter().find(|o| {
                    o.get("name").and_then(Value::as_str) == Some(name.as_str())
                        || o.get("alias").and_then(Value::as_str) == Some(name.as_str())
                })
            })
            .cloned())
    }

    async fn create(
        session: &Session,
        resolved: &Routing,
        desired: &Value,
        _cr: &Organization,
    ) -> Result<(), Error> {
        session
            .post(&admin_path(&resolved.realm, "/organizations"), desired)
            .await
    }

    async fn update(
        session: &Session,
        resolved: &Routing,
        handle: &str,
        body: &Value,
    ) -> Result<(), Error> {
        session
            .put(
                &admin_path(&resolved.realm, &format!("/organizations/{handle}")),
                body,
            )
            .await
    }

    async fn delete(session: &Session, resolved: &Routing, handle: &str) -> Result<(), Error> {
        session
            .delete(&admin_path(&resolved.realm, &format!("/organizations/{handle}")))
            .await
    }

    fn resource_path(resolved: &Routing, handle: &str) -> Option<String> {
        Some(format!("/realms/{}/organizations/{}", resolved.realm, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_below_26_are_rejected() {
        assert!(matches!(
            check_version(Some("25.0.6")),
            Err(Error::UnsupportedVersion { .. })
        ));
        assert!(check_version(Some("26.0.5")).is_ok());
        assert!(check_version(Some("27.1.0")).is_ok());
        assert!(check_version(None).is_ok());
    }

    #[test]
    fn major_version_parses_leading_component() {
        assert_eq!(major_version("26.0.5"), Some(26));
        assert_eq!(major_version("23.0.7.redhat-00001"), Some(23));
        assert_eq!(major_version("devel"), None);
    }

    #[test]
    fn organizations_require_a_domain() {
        assert!(matches!(
            desired_org("acme", &json!({})),
            Err(Error::InvalidSpec(_))
        ));
        let ok = desired_org("acme", &json!({"domains": [{"name": "acme.example"}]})).unwrap();
        assert_eq!(ok["name"], "acme");
        assert_eq!(ok["alias"], "acme");
    }
}

crate::kernel::delegate_object_adapter!(OrganizationAdapter);
