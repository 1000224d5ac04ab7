use anyhow::Context as _;
use kube::ResourceExt;
use serde::Serialize;
use serde_json::Value;

use kopper_common::args::ExportArgs;
use kopper_types::*;

use crate::diff::scrub;
use crate::keycloak::{Session, admin_path};

/// Clients Keycloak installs into every realm; never exported.
const BUILTIN_CLIENTS: &[&str] = &[
    "account",
    "account-console",
    "admin-cli",
    "broker",
    "realm-management",
    "security-admin-console",
];

/// Client scopes Keycloak installs into every realm; never exported.
const BUILTIN_SCOPES: &[&str] = &[
    "acr",
    "address",
    "basic",
    "email",
    "microprofile-jwt",
    "offline_access",
    "organization",
    "phone",
    "profile",
    "role_list",
    "roles",
    "saml_organization",
    "service_account",
    "web-origins",
];

fn builtin_role(name: &str, realm: &str) -> bool {
    name == "offline_access" || name == "uma_authorization" || name == format!("default-roles-{realm}")
}

/// Keys dropped from exported definitions on top of the global server-set
/// list.
const EXPORT_KEYS: &[&str] = &[
    "defaultRole",
    "defaultRoles",
    "keycloakVersion",
    "internalId",
    "path",
    "subGroups",
    "subGroupCount",
    "secret",
    "registrationAccessToken",
    "clientRole",
    "composite",
];

/// Lowercases a Keycloak name into a valid object name.
pub fn k8s_name(value: &str) -> String {
    let mut name: String = value
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    while name.contains("--") {
        name = name.replace("--", "-");
    }
    name.trim_matches(['-', '.']).to_string()
}

fn scrubbed(mut value: Value) -> Value {
    scrub(&mut value, EXPORT_KEYS);
    value
}

fn str_of(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

struct ExportNames {
    namespace: String,
    instance: String,
    realm_cr: String,
}

fn realm_selector(names: &ExportNames) -> RealmSelector {
    RealmSelector {
        realm_ref: Some(ObjectRef::new(&names.realm_cr)),
        cluster_realm_ref: None,
    }
}

fn with_namespace<K: kube::Resource<DynamicType = ()> + ResourceExt>(mut cr: K, ns: &str) -> K {
    cr.meta_mut().namespace = Some(ns.to_string());
    cr
}

fn instance_cr(args: &ExportArgs, names: &ExportNames) -> Instance {
    let spec = InstanceSpec {
        base_url: args.url.trim_end_matches('/').to_string(),
        credentials: InstanceCredentials {
            secret_ref: SecretRef {
                name: format!("{}-admin", names.instance),
                namespace: None,
                username_key: default_username_key(),
                password_key: default_password_key(),
            },
        },
        realm: args.admin_realm.clone(),
    };
    with_namespace(Instance::new(&names.instance, spec), &names.namespace)
}

fn realm_cr(names: &ExportNames, realm_name: &str, representation: Value) -> Realm {
    let spec = RealmSpec {
        instance: InstanceSelector {
            instance_ref: Some(ObjectRef::new(&names.instance)),
            cluster_instance_ref: None,
        },
        realm_name: Some(realm_name.to_string()),
        definition: scrubbed(representation),
    };
    with_namespace(Realm::new(&names.realm_cr, spec), &names.namespace)
}

fn client_cr(names: &ExportNames, representation: Value) -> Option<Client> {
    let client_id = str_of(&representation, "clientId")?;
    if BUILTIN_CLIENTS.contains(&client_id.as_str()) {
        return None;
    }
    let mut definition = scrubbed(representation);
    if let Some(map) = definition.as_object_mut() {
        map.remove("clientId");
    }
    let spec = ClientSpec {
        realm: realm_selector(names),
        client_id: Some(client_id.clone()),
        definition,
        client_secret_ref: None,
    };
    Some(with_namespace(
        Client::new(&k8s_name(&client_id), spec),
        &names.namespace,
    ))
}

fn scope_cr(names: &ExportNames, representation: Value) -> Option<ClientScope> {
    let name = str_of(&representation, "name")?;
    if BUILTIN_SCOPES.contains(&name.as_str()) {
        return None;
    }
    let protocol = str_of(&representation, "protocol");
    let mut definition = scrubbed(representation);
    if let Some(map) = definition.as_object_mut() {
        map.remove("name");
        map.remove("protocol");
    }
    let spec = ClientScopeSpec {
        realm: realm_selector(names),
        name: Some(name.clone()),
        protocol,
        definition,
    };
    Some(with_namespace(
        ClientScope::new(&k8s_name(&name), spec),
        &names.namespace,
    ))
}

/// Flattens a group tree into Group resources; children reference their
/// parent through `parentGroupRef`.
fn group_crs(names: &ExportNames, groups: &Value, parent: Option<&str>, out: &mut Vec<Group>) {
    let Some(list) = groups.as_array() else {
        return;
    };
    for group in list {
        let Some(name) = str_of(group, "name") else {
            continue;
        };
        let cr_name = match parent {
            Some(parent) => format!("{parent}-{}", k8s_name(&name)),
            None => k8s_name(&name),
        };
        let children = group.get("subGroups").cloned().unwrap_or(Value::Null);
        let mut definition = scrubbed(group.clone());
        if let Some(map) = definition.as_object_mut() {
            map.remove("name");
        }
        let spec = GroupSpec {
            realm: realm_selector(names),
            name: Some(name),
            parent_group_ref: parent.map(ObjectRef::new),
            definition,
        };
        out.push(with_namespace(Group::new(&cr_name, spec), &names.namespace));
        group_crs(names, &children, Some(&cr_name), out);
    }
}

fn role_cr(
    names: &ExportNames,
    realm_name: &str,
    client: Option<&str>,
    representation: Value,
) -> Option<Role> {
    let name = str_of(&representation, "name")?;
    if client.is_none() && builtin_role(&name, realm_name) {
        return None;
    }
    let mut definition = scrubbed(representation);
    if let Some(map) = definition.as_object_mut() {
        map.remove("name");
    }
    let cr_name = match client {
        Some(client) => format!("{}-{}", k8s_name(client), k8s_name(&name)),
        None => k8s_name(&name),
    };
    let spec = RoleSpec {
        realm: realm_selector(names),
        client_ref: client.map(|c| ObjectRef::new(k8s_name(c))),
        name: Some(name),
        definition,
    };
    Some(with_namespace(Role::new(&cr_name, spec), &names.namespace))
}

fn idp_cr(names: &ExportNames, representation: Value) -> Option<IdentityProvider> {
    let alias = str_of(&representation, "alias")?;
    let mut definition = scrubbed(representation);
    if let Some(map) = definition.as_object_mut() {
        map.remove("alias");
    }
    let spec = IdentityProviderSpec {
        realm: realm_selector(names),
        alias: Some(alias.clone()),
        definition,
    };
    Some(with_namespace(
        IdentityProvider::new(&k8s_name(&alias), spec),
        &names.namespace,
    ))
}

fn component_cr(names: &ExportNames, representation: Value) -> Option<Component> {
    let name = str_of(&representation, "name")?;
    let provider_type = str_of(&representation, "providerType")?;
    // Realm key material is server-generated noise in an export.
    if provider_type == "org.keycloak.keys.KeyProvider" {
        return None;
    }
    let mut definition = scrubbed(representation);
    if let Some(map) = definition.as_object_mut() {
        map.remove("name");
        map.remove("providerType");
        map.remove("parentId");
    }
    let spec = ComponentSpec {
        realm: realm_selector(names),
        name: Some(name.clone()),
        provider_type,
        parent_ref: None,
        definition,
    };
    Some(with_namespace(
        Component::new(&k8s_name(&name), spec),
        &names.namespace,
    ))
}

fn user_cr(names: &ExportNames, representation: Value) -> Option<User> {
    let username = str_of(&representation, "username")?;
    let definition = scrubbed(representation);
    let spec = UserSpec {
        realm: realm_selector(names),
        client_ref: None,
        definition,
        initial_password: None,
        user_secret: None,
    };
    Some(with_namespace(
        User::new(&k8s_name(&username), spec),
        &names.namespace,
    ))
}

struct Output {
    target: Option<std::path::PathBuf>,
    documents: Vec<(String, String)>,
}

impl Output {
    fn new(out: &str) -> anyhow::Result<Self> {
        let target = match out {
            "-" => None,
            dir => {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create output directory {dir}"))?;
                Some(std::path::PathBuf::from(dir))
            }
        };
        Ok(Output {
            target,
            documents: Vec::new(),
        })
    }

    fn push<T: Serialize>(&mut self, kind: &str, name: &str, cr: &T) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(cr).context("failed to serialize resource")?;
        self.documents
            .push((format!("{}-{}.yaml", kind.to_lowercase(), name), yaml));
        Ok(())
    }

    fn flush(self) -> anyhow::Result<()> {
        match self.target {
            None => {
                for (_, yaml) in &self.documents {
                    println!("---");
                    print!("{yaml}");
                }
            }
            Some(dir) => {
                for (file, yaml) in &self.documents {
                    let path = dir.join(file);
                    std::fs::write(&path, yaml)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                }
                eprintln!("wrote {} resources to {}", self.documents.len(), dir.display());
            }
        }
        Ok(())
    }
}

/// Walks one live realm and emits the custom resources that would re-create
/// it. Authentication works exactly like the operator's session pool.
pub async fn run(args: ExportArgs) -> anyhow::Result<()> {
    let session = Session::connect(&args.url, &args.admin_realm, &args.username, &args.password)
        .await
        .context("failed to authenticate against Keycloak")?;
    let realm = &args.realm;
    let names = ExportNames {
        namespace: args.namespace.clone(),
        instance: k8s_name(&args.instance_name),
        realm_cr: k8s_name(realm),
    };
    let mut output = Output::new(&args.out)?;

    output.push("Instance", &names.instance, &instance_cr(&args, &names))?;

    let realm_rep = session
        .get(&format!("/admin/realms/{realm}"))
        .await
        .context("failed to read realm")?;
    output.push("Realm", &names.realm_cr, &realm_cr(&names, realm, realm_rep))?;

    let clients = session.get(&admin_path(realm, "/clients")).await?;
    let mut exported_clients: Vec<(String, String)> = Vec::new();
    for representation in clients.as_array().cloned().unwrap_or_default() {
        let uuid = str_of(&representation, "id");
        if let Some(cr) = client_cr(&names, representation) {
            if let Some(uuid) = uuid {
                exported_clients.push((uuid, cr.spec.client_id.clone().unwrap_or_default()));
            }
            output.push("Client", &cr.name_any(), &cr)?;
        }
    }

    let scopes = session.get(&admin_path(realm, "/client-scopes")).await?;
    for representation in scopes.as_array().cloned().unwrap_or_default() {
        if let Some(cr) = scope_cr(&names, representation) {
            output.push("ClientScope", &cr.name_any(), &cr)?;
        }
    }

    let groups = session.get(&admin_path(realm, "/groups")).await?;
    let mut group_resources = Vec::new();
    group_crs(&names, &groups, None, &mut group_resources);
    for cr in &group_resources {
        output.push("Group", &cr.name_any(), cr)?;
    }

    let realm_roles = session.get(&admin_path(realm, "/roles")).await?;
    for representation in realm_roles.as_array().cloned().unwrap_or_default() {
        if let Some(cr) = role_cr(&names, realm, None, representation) {
            output.push("Role", &cr.name_any(), &cr)?;
        }
    }
    for (uuid, client_id) in &exported_clients {
        let roles = session
            .get(&admin_path(realm, &format!("/clients/{uuid}/roles")))
            .await?;
        for representation in roles.as_array().cloned().unwrap_or_default() {
            if let Some(cr) = role_cr(&names, realm, Some(client_id), representation) {
                output.push("Role", &cr.name_any(), &cr)?;
            }
        }
    }

    let providers = session
        .get(&admin_path(realm, "/identity-provider/instances"))
        .await?;
    for representation in providers.as_array().cloned().unwrap_or_default() {
        if let Some(cr) = idp_cr(&names, representation) {
            output.push("IdentityProvider", &cr.name_any(), &cr)?;
        }
    }

    let components = session.get(&admin_path(realm, "/components")).await?;
    for representation in components.as_array().cloned().unwrap_or_default() {
        if let Some(cr) = component_cr(&names, representation) {
            output.push("Component", &cr.name_any(), &cr)?;
        }
    }

    if args.include_users {
        let users = session
            .get(&admin_path(realm, "/users?max=1000"))
            .await?;
        for representation in users.as_array().cloned().unwrap_or_default() {
            if let Some(cr) = user_cr(&names, representation) {
                output.push("User", &cr.name_any(), &cr)?;
            }
        }
    }

    output.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names() -> ExportNames {
        ExportNames {
            namespace: "default".to_string(),
            instance: "keycloak".to_string(),
            realm_cr: "e2e".to_string(),
        }
    }

    #[test]
    fn k8s_names_are_rfc1123() {
        assert_eq!(k8s_name("My Client (dev)"), "my-client-dev");
        assert_eq!(k8s_name("app1"), "app1");
        assert_eq!(k8s_name("Ops / Admins"), "ops-admins");
    }

    #[test]
    fn builtin_clients_are_skipped() {
        assert!(client_cr(&names(), json!({"id": "1", "clientId": "admin-cli"})).is_none());
        let exported = client_cr(
            &names(),
            json!({"id": "2", "clientId": "app1", "enabled": true, "secret": "s3cr3t"}),
        )
        .unwrap();
        assert_eq!(exported.spec.client_id.as_deref(), Some("app1"));
        assert!(exported.spec.definition.get("secret").is_none());
        assert!(exported.spec.definition.get("id").is_none());
    }

    #[test]
    fn group_trees_flatten_with_parent_refs() {
        let tree = json!([
            {"id": "1", "name": "parent", "subGroups": [
                {"id": "2", "name": "child", "subGroups": []},
            ]},
        ]);
        let mut out = Vec::new();
        group_crs(&names(), &tree, None, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name_any(), "parent");
        assert!(out[0].spec.parent_group_ref.is_none());
        assert_eq!(out[1].name_any(), "parent-child");
        assert_eq!(
            out[1].spec.parent_group_ref.as_ref().unwrap().name,
            "parent"
        );
        assert!(out[1].spec.definition.get("subGroups").is_none());
    }

    #[test]
    fn default_realm_roles_are_skipped() {
        assert!(role_cr(&names(), "e2e", None, json!({"name": "default-roles-e2e"})).is_none());
        assert!(role_cr(&names(), "e2e", None, json!({"name": "offline_access"})).is_none());
        let exported = role_cr(&names(), "e2e", Some("app1"), json!({"name": "editor"})).unwrap();
        assert_eq!(exported.name_any(), "app1-editor");
        assert_eq!(exported.spec.client_ref.as_ref().unwrap().name, "app1");
    }

    #[test]
    fn key_providers_are_not_exported() {
        assert!(
            component_cr(
                &names(),
                json!({"id": "1", "name": "rsa-generated", "providerType": "org.keycloak.keys.KeyProvider"}),
            )
            .is_none()
        );
        let federation = component_cr(
            &names(),
            json!({
                "id": "2",
                "name": "ldap",
                "providerType": "org.keycloak.storage.UserStorageProvider",
                "config": {"vendor": ["other"]},
            }),
        )
        .unwrap();
        assert_eq!(
            federation.spec.provider_type,
            "org.keycloak.storage.UserStorageProvider"
        );
        assert!(federation.spec.definition.get("parentId").is_none());
    }
}
