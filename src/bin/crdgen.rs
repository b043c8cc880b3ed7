use kube::CustomResourceExt;
use cluster_gitops::crd::{AwsIamConfig, Cluster, GitOpsConfig};

fn main() -> anyhow::Result<()> {
    for crd in [Cluster::crd(), GitOpsConfig::crd(), AwsIamConfig::crd()] {
        println!("---");
        print!("{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
