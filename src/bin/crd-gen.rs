use kube::CustomResourceExt;
use strato::crd::cluster::TenantCluster;
use strato::crd::drainer::DrainerConfig;
use strato::crd::node_pool::NodePool;

fn main() -> anyhow::Result<()> {
    // One JSON document per CRD (kubectl accepts JSON)
    for crd in [TenantCluster::crd(), NodePool::crd(), DrainerConfig::crd()] {
        let json = serde_json::to_string_pretty(&crd)?;
        println!("{}", json);
    }
    Ok(())
}
