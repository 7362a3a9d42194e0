//! nimbus-probe: wait for a cloud resource to settle.
//!
//! Runs the same convergence loop the resource controllers use against one
//! resource and reports where it ended up:
//! - Load balancers and their listeners or monitors (legacy or modern backend)
//! - NAS volume interfaces (`<volume>/<interface>`)
//! - Kubernetes clusters and their node groups (`<cluster>/<node group>`)

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nimbus_converge::lb::{LbApi, LbScope, RestLbApi, lb_pending};
use nimbus_converge::nas::{self, NasApi, NasInterfaceObserver, RestNasApi};
use nimbus_converge::nodegroup::{self, ClusterObserver, NodeGroupApi, NodeGroupObserver, RestNodeGroupApi};
use nimbus_converge::{
    CancelSignal, Canceller, CompositeId, ConvergeError, Observer, OperationSpec, ProviderConfig, RestClient,
    cancel_pair, wait_for_with_last,
};
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Resource convergence probe
#[derive(Parser, Debug)]
#[command(name = "nimbus-probe", version, about)]
struct Args {
    /// Provider config file (TOML)
    #[arg(short, long, env = "NIMBUS_CONFIG")]
    config: Option<PathBuf>,

    /// Control plane endpoint; overrides the config file
    #[arg(long, env = "NIMBUS_ENDPOINT")]
    endpoint: Option<String>,

    /// Use the modern load-balancer backend
    #[arg(long)]
    use_octavia: bool,

    /// Status to wait for (repeatable); defaults depend on the resource
    #[arg(long = "target", global = true)]
    targets: Vec<String>,

    /// Status that keeps the wait going (repeatable)
    #[arg(long = "pending", global = true)]
    pending: Vec<String>,

    /// Give up after this many seconds
    #[arg(long, default_value = "600", global = true)]
    timeout: u64,

    /// Seconds between probes; defaults depend on the resource
    #[arg(long, global = true)]
    interval: Option<u64>,

    /// Seconds to wait before the first probe
    #[arg(long, default_value = "0", global = true)]
    delay: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Wait for a load balancer or one of its components
    Loadbalancer {
        /// Load balancer ID
        id: String,

        /// Probe this listener instead of the load balancer itself
        #[arg(long, conflicts_with = "monitor")]
        listener: Option<String>,

        /// Probe this health monitor instead of the load balancer itself
        #[arg(long)]
        monitor: Option<String>,
    },

    /// Wait for a NAS volume interface (`<volume>/<interface>`)
    NasInterface {
        id: String,
    },

    /// Wait for a node group (`<cluster>/<node group>`)
    Nodegroup {
        id: String,
    },

    /// Wait for a Kubernetes cluster to finish a create or update
    Cluster {
        id: String,
    },
}

/// Defaults a subcommand contributes to the operation spec.
struct Defaults<'a> {
    targets: &'a [&'a str],
    pending: &'a [&'a str],
    interval: Duration,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nimbus_probe=info,nimbus_converge=info,reqwest=warn,hyper=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let client = RestClient::new(config.endpoint.clone(), config.request_timeout())
        .context("Failed to build HTTP client")?;

    info!("Endpoint: {}", config.endpoint);

    let (canceller, cancel) = cancel_pair();
    spawn_signal_handler(canceller)?;

    let status = match &args.command {
        Command::Loadbalancer { id, listener, monitor } => {
            let backend = config.backend();
            let (scope, target_id) = match (listener, monitor) {
                (Some(listener), _) => (LbScope::Listener, listener.as_str()),
                (None, Some(monitor)) => (LbScope::Monitor, monitor.as_str()),
                (None, None) => (LbScope::LoadBalancer, id.as_str()),
            };
            info!("Waiting for {} {} via {}", scope, target_id, backend);

            let api: Arc<dyn LbApi> = Arc::new(RestLbApi::new(client, backend));
            let observer = backend.lb_observer(api, id.as_str(), scope);
            let defaults = Defaults {
                targets: &[nimbus_converge::lb::ACTIVE],
                pending: &lb_pending(),
                interval: nimbus_converge::lb::controller::LB_POLL_INTERVAL,
            };
            let spec = build_spec(&args, &defaults)?;
            run(&spec, &observer, target_id, &cancel).await?
        }
        Command::NasInterface { id } => {
            let id: CompositeId = id.parse().context("Invalid NAS interface id")?;
            info!("Waiting for interface {} on volume {}", id.child(), id.parent());

            let api: Arc<dyn NasApi> = Arc::new(RestNasApi::new(client));
            let defaults = Defaults {
                targets: &[nas::ACTIVE],
                pending: &[nas::BUILDING],
                interval: nas::NAS_POLL_INTERVAL,
            };
            let spec = build_spec(&args, &defaults)?;
            run(&spec, &NasInterfaceObserver::new(api), &id.encode(), &cancel).await?
        }
        Command::Nodegroup { id } => {
            let id: CompositeId = id.parse().context("Invalid node group id")?;
            info!("Waiting for node group {} in cluster {}", id.child(), id.parent());

            let api: Arc<dyn NodeGroupApi> = Arc::new(RestNodeGroupApi::new(client));
            let defaults = Defaults {
                targets: &[nodegroup::CREATE_COMPLETE, nodegroup::UPDATE_COMPLETE],
                pending: &[nodegroup::CREATE_IN_PROGRESS, nodegroup::UPDATE_IN_PROGRESS],
                interval: nodegroup::UPDATE_TIMING.1,
            };
            let spec = build_spec(&args, &defaults)?;
            run(&spec, &NodeGroupObserver::new(api), &id.encode(), &cancel).await?
        }
        Command::Cluster { id } => {
            info!("Waiting for cluster {}", id);

            let api: Arc<dyn NodeGroupApi> = Arc::new(RestNodeGroupApi::new(client));
            let defaults = Defaults {
                targets: &[nodegroup::UPDATE_COMPLETE, nodegroup::CREATE_COMPLETE],
                pending: &[nodegroup::UPDATE_IN_PROGRESS, nodegroup::CREATE_IN_PROGRESS],
                interval: nodegroup::CLUSTER_TIMING.1,
            };
            let spec = build_spec(&args, &defaults)?;
            run(&spec, &ClusterObserver::new(api), id, &cancel).await?
        }
    };

    println!("{status}");
    Ok(())
}

fn load_config(args: &Args) -> Result<ProviderConfig> {
    let mut config = match &args.config {
        Some(path) => ProviderConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ProviderConfig::default(),
    };
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = endpoint.clone();
    }
    config.use_octavia |= args.use_octavia;
    Ok(config)
}

fn build_spec(args: &Args, defaults: &Defaults<'_>) -> Result<OperationSpec> {
    let targets: Vec<String> = if args.targets.is_empty() {
        defaults.targets.iter().map(|s| s.to_string()).collect()
    } else {
        args.targets.clone()
    };
    let pending: Vec<String> = if args.pending.is_empty() {
        defaults.pending.iter().map(|s| s.to_string()).collect()
    } else {
        args.pending.clone()
    };

    let spec = OperationSpec::new(targets, Duration::from_secs(args.timeout))
        .with_pending(pending)
        .with_initial_delay(Duration::from_secs(args.delay))
        .with_poll_interval(args.interval.map(Duration::from_secs).unwrap_or(defaults.interval));
    spec.validate().context("Invalid wait parameters")?;
    Ok(spec)
}

fn spawn_signal_handler(canceller: Canceller) -> Result<()> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = signal::ctrl_c() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
        canceller.cancel();
    });
    Ok(())
}

async fn run<O>(spec: &OperationSpec, observer: &O, id: &str, cancel: &CancelSignal) -> Result<String>
where
    O: Observer,
    O::Object: Debug,
{
    match wait_for_with_last(spec, observer, id, cancel).await {
        Ok(done) => {
            debug!(object = ?done.object, "converged");
            info!("{} reached {}", id, done.status);
            Ok(done.status)
        }
        Err(failure) => {
            debug!(object = ?failure.last, "last observed");
            let e = failure.error;
            let summary = match &e {
                ConvergeError::Timeout { .. } => "Resource did not settle in time",
                ConvergeError::DomainState { .. } => "Resource settled in a failure state",
                ConvergeError::Cancelled => "Wait interrupted",
                _ => "Wait failed",
            };
            warn!("{}: {}", summary, e);
            Err(anyhow::Error::new(e).context(format!("{summary}: {id}")))
        }
    }
}
