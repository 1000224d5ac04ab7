use std::sync::Arc;

use clap::{Parser, Subcommand};
use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams, LeaseLockResult};
use owo_colors::OwoColorize;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use kopper_common::args::{ExportArgs, OperatorArgs};

mod diff;
mod export;
mod kernel;
mod keycloak;
mod kinds;
mod resolve;
mod secrets;
mod util;

use kernel::Context;
use kinds::{
    client_scope::ClientScopeAdapter,
    component::ComponentAdapter,
    group::GroupAdapter,
    identity_provider::IdentityProviderAdapter,
    organization::OrganizationAdapter,
    protocol_mapper::ProtocolMapperAdapter,
    realm::{ClusterRealmAdapter, RealmAdapter},
    role::RoleAdapter,
    role_mapping::RoleMappingAdapter,
};

#[derive(Parser)]
#[command(name = "kopper", about = "Keycloak configuration operator")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the operator controllers.
    Run(OperatorArgs),
    /// Export a live realm as custom resource YAML.
    Export(ExportArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kopper_common::init();
    match Cli::parse().command {
        Some(Command::Export(args)) => export::run(args).await,
        Some(Command::Run(args)) => run_operator(args).await,
        None => run_operator(OperatorArgs::parse_from(["kopper"])).await,
    }
}

/// Runs every kind controller until shutdown. The fleet shares one Context:
/// one Kubernetes client, one session pool, one event recorder.
async fn run_controllers(ctx: Arc<Context>) {
    println!("{}", "🚀 Controllers started.".green());
    tokio::join!(
        kinds::instance::run(ctx.clone()),
        kinds::instance::run_cluster(ctx.clone()),
        kernel::run_controller::<RealmAdapter>(ctx.clone()),
        kernel::run_controller::<ClusterRealmAdapter>(ctx.clone()),
        kinds::client::run(ctx.clone()),
        kinds::user::run(ctx.clone()),
        kernel::run_controller::<GroupAdapter>(ctx.clone()),
        kernel::run_controller::<RoleAdapter>(ctx.clone()),
        kernel::run_controller::<RoleMappingAdapter>(ctx.clone()),
        kernel::run_controller::<ClientScopeAdapter>(ctx.clone()),
        kernel::run_controller::<ProtocolMapperAdapter>(ctx.clone()),
        kernel::run_controller::<IdentityProviderAdapter>(ctx.clone()),
        kernel::run_controller::<OrganizationAdapter>(ctx.clone()),
        kernel::run_controller::<ComponentAdapter>(ctx.clone()),
        kinds::user_credential::run(ctx.clone()),
    );
}

async fn run_operator(args: OperatorArgs) -> anyhow::Result<()> {
    println!("{}", "⚙️ Starting Keycloak operator...".green());
    let client = Client::try_default().await?;
    let context = Arc::new(Context::new(
        client.clone(),
        args.watch_namespace.clone(),
        args.reconcile_concurrency,
    ));

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        kopper_common::shutdown::shutdown_signal().await;
        shutdown_signal.cancel();
    });
    kopper_common::signal_ready();

    if args.disable_leader_election {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = run_controllers(context.clone()) => {}
        }
        return Ok(());
    }

    // Unique identity per replica (Downward API POD_NAME is ideal).
    // Fallback to hostname if not present.
    let holder_id = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("kopper-operator-{}", uuid::Uuid::new_v4()));
    // TTL: how long leadership is considered valid without renewal.
    // Renew should happen well before TTL expires.
    let lease_ttl = Duration::from_secs(15);
    let renew_every = Duration::from_secs(5);
    let leadership = LeaseLock::new(
        client.clone(),
        &args.leader_election_namespace,
        LeaseLockParams {
            holder_id,
            lease_name: "kopper-operator-lock".to_string(),
            lease_ttl,
        },
    );

    // We run indefinitely; only the leader runs the controllers.
    // On leadership loss, we abort the controllers and go back to standby.
    let mut controller_task: Option<tokio::task::JoinHandle<()>> = None;
    let mut tick = tokio::time::interval(renew_every);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Some(task) = controller_task.take() {
                    task.abort();
                    task.await.ok();
                }
                break Ok(());
            },
            _ = tick.tick() => {}
        }
        let lease = match leadership.try_acquire_or_renew().await {
            Ok(lease) => lease,
            Err(e) => {
                // If we can't talk to the apiserver / update the Lease,
                // assume we are not safe to lead.
                eprintln!("leader election renew/acquire failed: {e}");
                if let Some(task) = controller_task.take() {
                    task.abort();
                    eprintln!("aborted controllers due to leader election error");
                }
                continue;
            }
        };
        if matches!(lease, LeaseLockResult::Acquired(_)) {
            if controller_task.is_none() {
                println!("{}", "👑 Acquired leadership; starting controllers".green());
                let context = context.clone();
                controller_task = Some(tokio::spawn(async move {
                    run_controllers(context).await;
                }));
            }
        } else if let Some(task) = controller_task.take() {
            eprintln!("lost leadership; stopping controllers");
            task.abort();
        }
    }
}
