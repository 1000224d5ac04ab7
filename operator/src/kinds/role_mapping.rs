use async_trait::async_trait;
use kube::ResourceExt;
use reqwest::Method;
use serde_json::{Value, json};

use kopper_types::{
    AssignedRole, RoleDesignation, RoleMapping, RoleMappingStatus, SubjectTarget,
};

use crate::kernel::{Adapter, Context, SyncAction, SyncOutcome};
use crate::keycloak::{Session, admin_path};
use crate::kinds::client::find_client_by_client_id;
use crate::kinds::role::find_role_by_name;
use crate::resolve::{self, Routing};
use crate::util::Error;

struct SubjectInfo {
    routing: Routing,
    /// Realm-relative prefix of the subject, `/users/{id}` or `/groups/{id}`.
    base: String,
}

/// The fully resolved role a mapping should bind.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RoleTarget {
    name: String,
    client_uuid: Option<String>,
}

impl RoleTarget {
    fn mapping_path(&self, realm: &str, subject_base: &str) -> String {
        match &self.client_uuid {
            Some(uuid) => admin_path(
                realm,
                &format!("{subject_base}/role-mappings/clients/{uuid}"),
            ),
            None => admin_path(realm, &format!("{subject_base}/role-mappings/realm")),
        }
    }
}

fn contains_role(mappings: &Value, name: &str) -> bool {
    mappings.as_array().is_some_and(|list| {
        list.iter()
            .any(|role| role.get("name").and_then(Value::as_str) == Some(name))
    })
}

async fn resolve_subject(ctx: &Context, cr: &RoleMapping) -> Result<SubjectInfo, Error> {
    let namespace = cr.namespace();
    match cr
        .spec
        .subject
        .target()
        .map_err(|e| Error::InvalidSpec(e.to_string()))?
    {
        SubjectTarget::User(user_ref) => {
            let (routing, user_id) =
                resolve::resolve_user(&ctx.client, user_ref, namespace.as_deref()).await?;
            Ok(SubjectInfo {
                routing,
                base: format!("/users/{user_id}"),
            })
        }
        SubjectTarget::Group(group_ref) => {
            let (routing, group_id) =
                resolve::resolve_group(&ctx.client, group_ref, namespace.as_deref()).await?;
            Ok(SubjectInfo {
                routing,
                base: format!("/groups/{group_id}"),
            })
        }
    }
}

/// Resolves the declared role designation. A literal `clientId` is looked up
/// through the session once the realm is known.
async fn resolve_target(
    ctx: &Context,
    session: &Session,
    realm: &str,
    cr: &RoleMapping,
) -> Result<RoleTarget, Error> {
    let namespace = cr.namespace();
    match cr
        .spec
        .role_designation()
        .map_err(|e| Error::InvalidSpec(e.to_string()))?
    {
        RoleDesignation::Inline(inline) => {
            let client_uuid = match (&inline.client_ref, &inline.client_id) {
                (Some(client_ref), _) => Some(
                    resolve::resolve_client(&ctx.client, client_ref, namespace.as_deref())
                        .await?
                        .uuid,
                ),
                (None, Some(client_id)) => {
                    let found = find_client_by_client_id(session, realm, client_id).await?;
                    Some(
                        found
                            .as_ref()
                            .and_then(|c| c.get("id"))
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .ok_or_else(|| Error::RefNotFound {
                                kind: "client",
                                name: client_id.clone(),
                            })?,
                    )
                }
                (None, None) => None,
            };
            Ok(RoleTarget {
                name: inline.name.clone(),
                client_uuid,
            })
        }
        RoleDesignation::Ref(role_ref) => {
            let resolved =
                resolve::resolve_role(&ctx.client, role_ref, namespace.as_deref()).await?;
            Ok(RoleTarget {
                name: resolved.name,
                client_uuid: resolved.client_uuid,
            })
        }
    }
}

/// Removes one role from the subject's mappings if it is currently present.
async fn remove_mapping(
    session: &Session,
    realm: &str,
    subject_base: &str,
    target: &RoleTarget,
) -> Result<bool, Error> {
    let Some(representation) =
        find_role_by_name(session, realm, target.client_uuid.as_deref(), &target.name).await?
    else {
        return Ok(false);
    };
    let path = target.mapping_path(realm, subject_base);
    let current = session.get(&path).await?;
    if !contains_role(&current, &target.name) {
        return Ok(false);
    }
    session
        .request(Method::DELETE, &path, Some(&json!([representation])))
        .await?;
    Ok(true)
}

pub struct RoleMappingAdapter;

#[async_trait]
impl Adapter for RoleMappingAdapter {
    type Cr = RoleMapping;

    async fn sync(
        ctx: &Context,
        cr: &RoleMapping,
    ) -> Result<SyncOutcome<RoleMappingStatus>, Error> {
        let subject = resolve_subject(ctx, cr).await?;
        let session = ctx
            .pool
            .acquire(&ctx.client, &subject.routing.instance)
            .await?;
        let realm = &subject.routing.realm;
        let target = resolve_target(ctx, &session, realm, cr).await?;

        let representation =
            find_role_by_name(&session, realm, target.client_uuid.as_deref(), &target.name)
                .await?
                .ok_or_else(|| Error::RefNotFound {
                    kind: "role",
                    name: target.name.clone(),
                })?;

        // A re-targeted mapping drops its predecessor first.
        let previous = cr.status.as_ref().and_then(|s| s.assigned.clone());
        let mut retargeted = false;
        if let Some(previous) = previous.as_ref() {
            let previous_target = RoleTarget {
                name: previous.role_name.clone(),
                client_uuid: previous.client_uuid.clone(),
            };
            if previous_target != target {
                retargeted = remove_mapping(&session, realm, &subject.base, &previous_target)
                    .await?;
            }
        }

        let path = target.mapping_path(realm, &subject.base);
        let current = session.get(&path).await?;
        let action = if !contains_role(&current, &target.name) {
            session.post(&path, &json!([representation])).await?;
            if previous.is_none() {
                SyncAction::Created
            } else {
                SyncAction::Updated
            }
        } else if retargeted {
            SyncAction::Updated
        } else {
            SyncAction::Unchanged
        };

        let mut outcome = SyncOutcome::new(action);
        let assigned = AssignedRole {
            role_name: target.name,
            client_uuid: target.client_uuid,
        };
        outcome.decorate = Some(Box::new(move |status: &mut RoleMappingStatus| {
            status.assigned = Some(assigned);
        }));
        Ok(outcome)
    }

    async fn finalize(ctx: &Context, cr: &RoleMapping) -> Result<(), Error> {
        let subject = resolve_subject(ctx, cr).await?;
        let session = ctx
            .pool
            .acquire(&ctx.client, &subject.routing.instance)
            .await?;
        let realm = &subject.routing.realm;
        // The recorded binding is authoritative; fall back to the spec for
        // mappings deleted before their first successful sync.
        let target = match cr.status.as_ref().and_then(|s| s.assigned.clone()) {
            Some(assigned) => RoleTarget {
                name: assigned.role_name,
                client_uuid: assigned.client_uuid,
            },
            None => match resolve_target(ctx, &session, realm, cr).await {
                Ok(target) => target,
                Err(_) => return Ok(()),
            },
        };
        remove_mapping(&session, realm, &subject.base, &target).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_paths_split_realm_and_client_scope() {
        let realm_role = RoleTarget {
            name: "editor".to_string(),
            client_uuid: None,
        };
        assert_eq!(
            realm_role.mapping_path("e2e", "/users/u1"),
            "/admin/realms/e2e/users/u1/role-mappings/realm"
        );
        let client_role = RoleTarget {
            name: "editor".to_string(),
            client_uuid: Some("c1".to_string()),
        };
        assert_eq!(
            client_role.mapping_path("e2e", "/groups/g1"),
            "/admin/realms/e2e/groups/g1/role-mappings/clients/c1"
        );
    }

    #[test]
    fn contains_role_matches_by_name() {
        let mappings = json!([{"id": "1", "name": "editor"}, {"id": "2", "name": "viewer"}]);
        assert!(contains_role(&mappings, "editor"));
        assert!(!contains_role(&mappings, "admin"));
        assert!(!contains_role(&Value::Null, "editor"));
    }

    #[test]
    fn retarget_detection_compares_name_and_scope() {
        let a = RoleTarget {
            name: "editor".to_string(),
            client_uuid: None,
        };
        let b = RoleTarget {
            name: "editor".to_string(),
            client_uuid: Some("c1".to_string()),
        };
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
