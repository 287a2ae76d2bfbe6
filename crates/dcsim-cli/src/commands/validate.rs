use std::path::Path;

use anyhow::Context;
use dcsim_core::{load_requests, load_workload};

use super::load_config;

pub fn validate(config: Option<&Path>, workload: Option<&Path>, requests: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    println!(
        "✓ config: capacity {}, {} ticks, strategy {:?}",
        config.cluster.capacity, config.cluster.length, config.scheduling.strategy
    );

    if let Some(path) = workload {
        let workload =
            load_workload(path, &config).with_context(|| format!("loading workload {}", path.display()))?;
        println!("✓ workload: {} jobs", workload.jobs.len());
    }
    if let Some(path) = requests {
        let requests = load_requests(path).with_context(|| format!("loading requests {}", path.display()))?;
        println!("✓ requests: {}", requests.len());
    }
    Ok(())
}
