use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::{Map, Value, json};

use kopper_types::Group;

use crate::kernel::{Context, ObjectAdapter};
use crate::keycloak::{Session, admin_path, encode};
use crate::resolve::{self, Routing};
use crate::util::Error;

const GROUP_SERVER_KEYS: &[&str] = &["path", "subGroups", "subGroupCount"];

pub struct GroupResolved {
    pub routing: Routing,
    /// Keycloak id of the parent group when this group is nested.
    pub parent_id: Option<String>,
}

pub fn effective_group_name(cr: &Group) -> String {
    cr.spec.name.clone().unwrap_or_else(|| cr.name_any())
}

fn desired_group(name: &str, definition: &Value) -> Result<Map<String, Value>, Error> {
    let mut desired = crate::diff::definition_object(definition)?;
    desired.insert("name".to_string(), json!(name));
    Ok(desired)
}

fn named(groups: &Value, name: &str) -> Option<Value> {
    groups
        .as_array()
        .and_then(|list| {
            list.iter()
                .find(|g| g.get("name").and_then(Value::as_str) == Some(name))
        })
        .cloned()
}

/// Children of a group. Newer servers expose a dedicated endpoint; older
/// ones embed `subGroups` in the parent representation.
async fn children_of(session: &Session, realm: &str, parent_id: &str) -> Result<Value, Error> {
    let path = admin_path(realm, &format!("/groups/{parent_id}/children"));
    match session.request(reqwest::Method::GET, &path, None).await {
        Ok(children) => Ok(children.unwrap_or(Value::Null)),
        Err(e) if e.is_not_found() => {
            let parent = session
                .get(&admin_path(realm, &format!("/groups/{parent_id}")))
                .await?;
            Ok(parent.get("subGroups").cloned().unwrap_or(Value::Null))
        }
        Err(e) => Err(e),
    }
}

async fn find_top_level(session: &Session, realm: &str, name: &str) -> Result<Option<Value>, Error> {
    let path = admin_path(realm, &format!("/groups?search={}&exact=true", encode(name)));
    let found = session.get(&path).await?;
    Ok(named(&found, name))
}

pub struct GroupAdapter;

#[async_trait]
impl ObjectAdapter for GroupAdapter {
    type Cr = Group;
    type Resolved = GroupResolved;

    async fn resolve(ctx: &Context, cr: &Group) -> Result<GroupResolved, Error> {
        let namespace = cr.namespace();
        let routing =
            resolve::resolve_realm(&ctx.client, &cr.spec.realm, namespace.as_deref()).await?;
        let parent_id = match &cr.spec.parent_group_ref {
            Some(parent_ref) => {
                let (_, group_id) =
                    resolve::resolve_group(&ctx.client, parent_ref, namespace.as_deref()).await?;
                Some(group_id)
            }
            None => None,
        };
        Ok(GroupResolved { routing, parent_id })
    }

    fn routing(resolved: &GroupResolved) -> &Routing {
        &resolved.routing
    }

    fn desired(_resolved: &GroupResolved, cr: &Group) -> Result<Map<String, Value>, Error> {
        desired_group(&effective_group_name(cr), &cr.spec.definition)
    }

    async fn find_by_handle(
        session: &Session,
        resolved: &GroupResolved,
        handle: &str,
    ) -> Result<Option<Value>, Error> {
        session
            .get_opt(&admin_path(&resolved.routing.realm, &format!("/groups/{handle}")))
            .await
    }

    async fn find_by_key(
        session: &Session,
        resolved: &GroupResolved,
        cr: &Group,
    ) -> Result<Option<Value>, Error> {
        let name = effective_group_name(cr);
        match &resolved.parent_id {
            Some(parent_id) => {
                let children = children_of(session, &resolved.routing.realm, parent_id).await?;
                Ok(named(&children, &name))
            }
            None => find_top_level(session, &resolved.routing.realm, &name).await,
        }
    }

    async fn create(
        session: &Session,
        resolved: &GroupResolved,
        desired: &Value,
        _cr: &Group,
    ) -> Result<(), Error> {
        let path = match &resolved.parent_id {
            Some(parent_id) => {
                admin_path(&resolved.routing.realm, &format!("/groups/{parent_id}/children"))
            }
            None => admin_path(&resolved.routing.realm, "/groups"),
        };
        session.post(&path, desired).await
    }

    async fn update(
        session: &Session,
        resolved: &GroupResolved,
        handle: &str,
        body: &Value,
    ) -> Result<(), Error> {
        session
            .put(
                &admin_path(&resolved.routing.realm, &format!("/groups/{handle}")),
                body,
            )
            .await
    }

    async fn delete(
        session: &Session,
        resolved: &GroupResolved,
        handle: &str,
    ) -> Result<(), Error> {
        session
            .delete(&admin_path(&resolved.routing.realm, &format!("/groups/{handle}")))
            .await
    }

    fn server_keys() -> &'static [&'static str] {
        GROUP_SERVER_KEYS
    }

    fn resource_path(resolved: &GroupResolved, handle: &str) -> Option<String> {
        Some(format!(
            "/realms/{}/groups/{}",
            resolved.routing.realm, handle
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kopper_types::GroupSpec;

    #[test]
    fn group_name_defaults_to_object_name() {
        let cr = Group::new("team-a", GroupSpec::default());
        assert_eq!(effective_group_name(&cr), "team-a");
    }

    #[test]
    fn named_matches_exact_entries_only() {
        let groups = json!([
            {"id": "1", "name": "parent"},
            {"id": "2", "name": "parent-2"},
        ]);
        assert_eq!(named(&groups, "parent").unwrap()["id"], "1");
        assert_eq!(named(&groups, "nope"), None);
        assert_eq!(named(&Value::Null, "parent"), None);
    }

    #[test]
    fn group_path_is_a_server_key() {
        let desired = desired_group("child", &json!({})).unwrap();
        let observed = json!({"id": "2", "name": "child", "path": "/parent/child"});
        assert_eq!(
            crate::diff::plan_update(&desired, &observed, GROUP_SERVER_KEYS),
            None
        );
    }
}

crate::kernel::delegate_object_adapter!(GroupAdapter);
