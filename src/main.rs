use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::runtime::controller::Action;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client, Resource, ResourceExt};
use std::fmt::Debug;
use std::sync::Arc;
use strato::cloud::http::GatewayClient;
use strato::cloud::template::ParameterDocumentRenderer;
use strato::config::OperatorConfig;
use strato::controller::sets::{Dependencies, ResourceSets, SetsConfig};
use strato::controller::{
    error_requeue, reconcile_cluster, reconcile_drain, reconcile_node_pool, Context,
    ReconcileError,
};
use strato::crd::cluster::TenantCluster;
use strato::crd::drainer::DrainerConfig;
use strato::crd::node_pool::NodePool;
use strato::ipam::lock::LeaseLocker;
use strato::server::{create_metrics, run_health_server, ReadinessState};
use strato::store::{KubeClusterStore, KubeStore};
use tracing::{error, info, warn};

/// Error policy shared by all controllers
///
/// Errors are expected and trigger retries, hence `warn!`. Configuration
/// errors fail the same way every time and back off longer.
pub fn error_policy<K: Resource>(
    obj: Arc<K>,
    error: &ReconcileError,
    _ctx: Arc<Context>,
) -> Action {
    warn!(
        object = %obj.name_any(),
        retryable = error.is_retryable(),
        "Reconcile error (will retry): {}",
        error
    );
    Action::requeue(error_requeue(error))
}

fn log_result<T: Debug, E>(controller: &'static str, res: Result<T, E>) {
    // Errors are logged in error_policy, no duplicate logging
    if let Ok(o) = res {
        info!(controller, "Reconciled: {:?}", o);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = strato::crd::OPERATOR_VERSION, "Starting strato operator");

    let config = match OperatorConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    let metrics = create_metrics()?;

    // Not ready until the controllers run
    let readiness = ReadinessState::new();

    let health_readiness = readiness.clone();
    let health_metrics = metrics.clone();
    let health_port = config.health_port;
    tokio::spawn(async move {
        if let Err(e) = run_health_server(health_port, health_readiness, health_metrics).await {
            warn!(error = %e, "Health server failed");
        }
    });
    info!(port = health_port, "Health server task spawned");

    let client = match Client::try_default().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to create Kubernetes client");
            return Err(e.into());
        }
    };
    info!("Connected to Kubernetes cluster");

    let cloud = GatewayClient::new(config.cloud_endpoint.clone())?;
    info!(endpoint = %config.cloud_endpoint, "Cloud gateway client configured");

    let deps = Dependencies {
        cloud: Arc::new(cloud),
        renderer: Arc::new(ParameterDocumentRenderer),
        clusters: Arc::new(KubeStore::<TenantCluster>::new(client.clone())),
        node_pools: Arc::new(KubeStore::<NodePool>::new(client.clone())),
        namespaces: Arc::new(KubeClusterStore::<Namespace>::new(client.clone())),
        drainer_configs: Arc::new(KubeStore::<DrainerConfig>::new(client.clone())),
        locker: Arc::new(LeaseLocker::new(
            client.clone(),
            &config.lease_namespace,
            config.holder_id.clone(),
        )),
        metrics: Some(metrics.clone()),
    };
    let sets = ResourceSets::new(
        &deps,
        &SetsConfig {
            cluster_ipam: config.cluster_ipam(),
            node_pool_ipam: config.node_pool_ipam(),
            retry: config.retry.clone(),
        },
    )?;
    info!(
        network = %config.ipam_network,
        cluster_prefix = config.cluster_prefix,
        node_pool_prefix = config.node_pool_prefix,
        holder = %config.holder_id,
        "Resource sets configured"
    );

    let ctx = Arc::new(Context::new(client.clone(), sets));

    readiness.set_ready();
    info!("Controllers ready, starting reconciliation loops");

    let clusters = Controller::new(
        Api::<TenantCluster>::all(client.clone()),
        watcher::Config::default(),
    )
    .run(reconcile_cluster, error_policy, ctx.clone())
    .for_each(|res| async move { log_result("cluster", res) });

    let node_pools = Controller::new(
        Api::<NodePool>::all(client.clone()),
        watcher::Config::default(),
    )
    .run(reconcile_node_pool, error_policy, ctx.clone())
    .for_each(|res| async move { log_result("nodepool", res) });

    let drain = Controller::new(Api::<NodePool>::all(client), watcher::Config::default())
        .run(reconcile_drain, error_policy, ctx)
        .for_each(|res| async move { log_result("drain", res) });

    futures::join!(clusters, node_pools, drain);

    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
