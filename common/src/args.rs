use clap::Parser;

#[derive(Parser, Debug, Clone)]
pub struct OperatorArgs {
    /// Restrict watches to a single namespace. All namespaces when unset.
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Namespace holding the leader-election Lease.
    #[arg(long, env = "LEADER_ELECTION_NAMESPACE", default_value = "default")]
    pub leader_election_namespace: String,

    /// Worker count per kind controller.
    #[arg(long, env = "RECONCILE_CONCURRENCY", default_value_t = 4)]
    pub reconcile_concurrency: u16,

    /// Run without leader election (single-replica deployments and local
    /// development).
    #[arg(long, env = "DISABLE_LEADER_ELECTION", default_value_t = false)]
    pub disable_leader_election: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct ExportArgs {
    /// Root URL of the Keycloak server to export from.
    #[arg(long, env = "KEYCLOAK_INTERNAL_URL")]
    pub url: String,

    /// Admin username.
    #[arg(long, env = "KEYCLOAK_ADMIN_USERNAME", default_value = "admin")]
    pub username: String,

    /// Admin password.
    #[arg(long, env = "KEYCLOAK_ADMIN_PASSWORD")]
    pub password: String,

    /// Realm the admin user authenticates against.
    #[arg(long, env = "KEYCLOAK_ADMIN_REALM", default_value = "master")]
    pub admin_realm: String,

    /// Realm to export.
    #[arg(long)]
    pub realm: String,

    /// Instance name referenced by the emitted resources.
    #[arg(long, default_value = "keycloak")]
    pub instance_name: String,

    /// Namespace written into the emitted resources.
    #[arg(long, default_value = "default")]
    pub namespace: String,

    /// Also export realm users (can be large).
    #[arg(long, default_value_t = false)]
    pub include_users: bool,

    /// Output directory; `-` writes a multi-document stream to stdout.
    #[arg(long, default_value = "-")]
    pub out: String,
}
