use kube::CustomResourceExt;
use kopper_types::*;
use std::fs;

fn write_crd<K: CustomResourceExt>(plural: &str) {
    fs::write(
        format!("../crds/keycloak.kopper.io_{plural}.yaml"),
        serde_yaml::to_string(&K::crd()).unwrap(),
    )
    .unwrap();
}

fn main() {
    let _ = fs::create_dir("../crds");
    write_crd::<Instance>("instances");
    write_crd::<ClusterInstance>("clusterinstances");
    write_crd::<Realm>("realms");
    write_crd::<ClusterRealm>("clusterrealms");
    write_crd::<Client>("clients");
    write_crd::<User>("users");
    write_crd::<Group>("groups");
    write_crd::<Role>("roles");
    write_crd::<RoleMapping>("rolemappings");
    write_crd::<ClientScope>("clientscopes");
    write_crd::<ProtocolMapper>("protocolmappers");
    write_crd::<IdentityProvider>("identityproviders");
    write_crd::<Organization>("organizations");
    write_crd::<Component>("components");
    write_crd::<UserCredential>("usercredentials");
}
